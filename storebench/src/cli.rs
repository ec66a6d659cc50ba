//! Command line interface.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;
use bytesize::ByteSize;
use storebench_backend::{InMemoryBackend, S3CompatibleBackend, SharedBackend};
use tokio_util::sync::CancellationToken;

use crate::checks;
use crate::config::{Config, Storage};
use crate::driver::{Driver, RunError};
use crate::observability;
use crate::report::{self, Verdict};
use crate::workload::{sub_group_name, top_group_name};

/// Throughput benchmark and functional verification for S3-compatible object storage.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    #[argh(subcommand)]
    pub command: Command,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Throughput(ThroughputCommand),
    Hierarchy(HierarchyCommand),
    Check(CheckCommand),
    Cleanup(CleanupCommand),
    Version(VersionCommand),
}

/// write, then read back and verify a batch of equally sized objects
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "throughput")]
struct ThroughputCommand {}

/// populate and enumerate a three-level group hierarchy
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "hierarchy")]
struct HierarchyCommand {}

/// run functional checks of basic object semantics
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "check")]
struct CheckCommand {}

/// delete everything below the key prefix and the hierarchy root
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "cleanup")]
struct CleanupCommand {}

/// print the storebench version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<ExitCode> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load(args.config.as_deref())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("main-rt")
        .enable_all()
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    let verdict = runtime.block_on(async move {
        let backend = build_backend(&config.backend)?;
        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
        let driver = Driver::new(backend, config.driver_config()).with_cancellation(cancel);

        let result = match args.command {
            Command::Throughput(ThroughputCommand {}) => throughput(&driver, &config).await,
            Command::Hierarchy(HierarchyCommand {}) => hierarchy(&driver, &config).await,
            Command::Check(CheckCommand {}) => check(&driver, &config).await,
            Command::Cleanup(CleanupCommand {}) => cleanup(&driver, &config).await,
            Command::Version(VersionCommand {}) => unreachable!(),
        };

        anyhow::Ok(result.unwrap_or_else(|err| Verdict::from_error(&err)))
    })?;

    verdict.print();
    Ok(if verdict.is_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn build_backend(storage: &Storage) -> Result<SharedBackend> {
    let backend: SharedBackend = match storage.s3_config() {
        Some(config) => Arc::new(
            S3CompatibleBackend::new(config).context("failed to configure the S3 backend")?,
        ),
        None => Arc::new(InMemoryBackend::new()),
    };
    Ok(backend)
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("Interrupted, stopping after the current operation");
        cancel.cancel();
    }
}

async fn throughput(driver: &Driver, config: &Config) -> Result<Verdict, RunError> {
    driver.prepare().await?;
    let spec = config.workload();

    println!(
        "Starting write benchmark: {} objects of {} each, {} in total",
        spec.object_count,
        ByteSize::b(spec.object_size),
        ByteSize::b(spec.total_bytes())
    );
    let written = driver.run_write(&spec).await?;
    report::print_report("Write", &written.report);

    println!(
        "Starting read benchmark: {} objects of {} each",
        spec.object_count,
        ByteSize::b(spec.object_size)
    );
    let read = driver.run_read(&spec, Some(&written.manifest)).await?;
    report::print_report("Read", &read);

    if config.cleanup {
        let deleted = driver.run_delete(&spec).await?;
        report::print_report("Cleanup", &deleted);
    }

    if let Some(verdict) = Verdict::check_report("read", &read) {
        return Ok(verdict);
    }
    Ok(Verdict::Passed(format!(
        "{} objects of {} written and verified",
        spec.object_count,
        ByteSize::b(spec.object_size)
    )))
}

async fn hierarchy(driver: &Driver, config: &Config) -> Result<Verdict, RunError> {
    driver.prepare().await?;
    let spec = config.hierarchy_spec();

    println!(
        "Creating hierarchy: {} x {} x {} leaves of {} each",
        spec.top_groups,
        spec.sub_groups,
        spec.leaves,
        ByteSize::b(spec.leaf_size)
    );
    let (populated, mut layout) = driver.run_hierarchy_populate(&spec).await?;
    report::print_report("Populate", &populated);

    println!("Listing all leaves");
    let listed = driver.run_hierarchy_list(&layout).await?;
    report::print_report("List", &listed);
    if let Some(verdict) = Verdict::check_report("list", &listed) {
        return Ok(verdict);
    }

    println!("Downloading a sample leaf");
    let sampled = driver.run_sample_read(&layout, spec.leaf_size).await?;
    report::print_report("Sample download", &sampled);
    if let Some(verdict) = Verdict::check_report("download", &sampled) {
        return Ok(verdict);
    }

    if config.hierarchy.delete_subgroup && spec.top_groups > 0 && spec.sub_groups > 0 {
        let group = layout.path(&format!("{}/{}", top_group_name(0), sub_group_name(0)));
        println!("Deleting {group}");
        driver.delete_group(&group).await?;
        layout.remove_subtree(&group);

        let relisted = driver.run_hierarchy_list(&layout).await?;
        report::print_report("List after delete", &relisted);
        if let Some(verdict) = Verdict::check_report("relist", &relisted) {
            return Ok(verdict);
        }
    }

    Ok(Verdict::Passed(format!(
        "{} leaves enumerated",
        layout.expected_count()
    )))
}

async fn check(driver: &Driver, config: &Config) -> Result<Verdict, RunError> {
    driver.prepare().await?;

    let results = checks::run_checks(driver, &config.key_prefix).await;
    report::print_checks(&results);

    let failed: Vec<_> = results
        .iter()
        .filter(|result| !result.passed())
        .map(|result| result.name)
        .collect();
    if failed.is_empty() {
        Ok(Verdict::Passed(format!("{} checks", results.len())))
    } else {
        Ok(Verdict::Failed {
            phase: "check".into(),
            reason: failed.join(", "),
        })
    }
}

async fn cleanup(driver: &Driver, config: &Config) -> Result<Verdict, RunError> {
    driver.prepare().await?;

    let mut deleted = 0;
    for prefix in [&config.key_prefix, &config.hierarchy.root] {
        let report = driver.run_cleanup(prefix).await?;
        report::print_report(&format!("Cleanup {prefix}"), &report);
        deleted += report.record.total_ops;
    }

    Ok(Verdict::Passed(format!("{deleted} objects deleted")))
}
