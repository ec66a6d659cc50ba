//! Functional checks of basic object semantics.
//!
//! Each check works below its own prefix and removes what it wrote, so the checks can run
//! against a shared namespace.

use std::fmt;

use bytes::Bytes;
use storebench_backend::{BackendError, path};
use thiserror::Error;

use crate::driver::{Driver, RunError};
use crate::metrics::OpKind;
use crate::payload::PayloadGenerator;
use crate::verify::{self, RoundTrip};
use crate::workload::WorkloadSpec;

const ROUND_TRIP_SIZE: u64 = 1024;
const LISTING_COUNT: u64 = 10;

/// Reason a functional check did not pass.
#[derive(Debug, Error)]
pub enum CheckError {
    /// The backend rejected an operation the check relies on.
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// A run used by the check ended early.
    #[error(transparent)]
    Run(#[from] RunError),
    /// The backend answered, but not as expected.
    #[error("{0}")]
    Unexpected(String),
}

/// Outcome of a single functional check.
#[derive(Debug)]
pub struct CheckResult {
    /// Short name of the check.
    pub name: &'static str,
    /// `Ok` if the check passed.
    pub outcome: Result<(), CheckError>,
}

impl CheckResult {
    /// Returns `true` if the check passed.
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Ok(()) => write!(f, "{}: ok", self.name),
            Err(err) => write!(f, "{}: {err}", self.name),
        }
    }
}

/// Runs all functional checks below `prefix`, in order.
pub async fn run_checks(driver: &Driver, prefix: &str) -> Vec<CheckResult> {
    let root = path::join(prefix, "checks");

    let mut results = vec![
        CheckResult {
            name: "round trip",
            outcome: round_trip(driver, &path::join(&root, "round-trip")).await,
        },
        CheckResult {
            name: "overwrite",
            outcome: overwrite(driver, &path::join(&root, "overwrite")).await,
        },
        CheckResult {
            name: "missing key",
            outcome: missing_key(driver, &path::join(&root, "missing")).await,
        },
    ];
    results.push(CheckResult {
        name: "listing",
        outcome: listing(driver, &path::join(&root, "listing")).await,
    });

    for result in &results {
        match &result.outcome {
            Ok(()) => tracing::info!(check = result.name, "Check passed"),
            Err(err) => tracing::error!(check = result.name, error = %err, "Check failed"),
        }
    }

    results
}

/// Writes a random object, reads it back byte for byte and deletes it again.
async fn round_trip(driver: &Driver, prefix: &str) -> Result<(), CheckError> {
    let key = path::join(prefix, "object.bin");
    let payload = PayloadGenerator::new().generate(ROUND_TRIP_SIZE);

    put(driver, &key, payload.clone()).await?;
    let read = get(driver, &key).await?;
    let outcome = verify::verify_round_trip(&payload, &read);
    if outcome != RoundTrip::Pass {
        return Err(CheckError::Unexpected(format!("read back differs: {outcome:?}")));
    }

    delete(driver, &key).await?;
    match get(driver, &key).await {
        Err(CheckError::Backend(err)) if err.is_not_found() => Ok(()),
        Err(err) => Err(err),
        Ok(_) => Err(CheckError::Unexpected(format!(
            "`{key}` is still readable after delete"
        ))),
    }
}

/// Overwrites an object with a payload of different size.
async fn overwrite(driver: &Driver, prefix: &str) -> Result<(), CheckError> {
    let key = path::join(prefix, "object.bin");
    let mut generator = PayloadGenerator::new();

    put(driver, &key, generator.generate(ROUND_TRIP_SIZE)).await?;
    let replacement = generator.generate(2 * ROUND_TRIP_SIZE);
    put(driver, &key, replacement.clone()).await?;

    let keys = list(driver, prefix).await?;
    if keys != [key.clone()] {
        return Err(CheckError::Unexpected(format!(
            "expected exactly `{key}` after overwrite, listed {keys:?}"
        )));
    }
    let read = get(driver, &key).await?;
    if verify::verify_round_trip(&replacement, &read) != RoundTrip::Pass {
        return Err(CheckError::Unexpected(format!(
            "expected the replacement of {} bytes, read {} bytes",
            replacement.len(),
            read.len()
        )));
    }

    delete(driver, &key).await
}

/// Reading a key that was never written yields `NotFound`.
async fn missing_key(driver: &Driver, prefix: &str) -> Result<(), CheckError> {
    let key = path::join(prefix, "never-written.bin");
    match get(driver, &key).await {
        Err(CheckError::Backend(err)) if err.is_not_found() => Ok(()),
        Err(err) => Err(err),
        Ok(payload) => Err(CheckError::Unexpected(format!(
            "read {} bytes from a key that was never written",
            payload.len()
        ))),
    }
}

/// Lists back exactly the keys written below a fresh prefix, then nothing after deleting them.
async fn listing(driver: &Driver, prefix: &str) -> Result<(), CheckError> {
    let spec = WorkloadSpec::new(prefix, 64, LISTING_COUNT);
    driver.run_write(&spec).await?;

    let listed = driver.run_list(&spec).await?;
    if !listed.is_completed() {
        return Err(CheckError::Unexpected(format!(
            "listing {} keys enumerated {:?}",
            spec.object_count, listed.enumerated
        )));
    }

    driver.run_delete(&spec).await?;
    let remaining = list(driver, prefix).await?;
    if !remaining.is_empty() {
        return Err(CheckError::Unexpected(format!(
            "{} keys left after delete",
            remaining.len()
        )));
    }

    Ok(())
}

async fn put(driver: &Driver, key: &str, payload: Bytes) -> Result<(), CheckError> {
    let namespace = &driver.config().namespace;
    let put = driver.backend().put_object(namespace, key, payload);
    Ok(driver.call(OpKind::Write, key, put).await?)
}

async fn get(driver: &Driver, key: &str) -> Result<Bytes, CheckError> {
    let namespace = &driver.config().namespace;
    let get = driver.backend().get_object(namespace, key);
    Ok(driver.call(OpKind::Read, key, get).await?)
}

async fn delete(driver: &Driver, key: &str) -> Result<(), CheckError> {
    let namespace = &driver.config().namespace;
    let delete = driver.backend().delete(namespace, key);
    Ok(driver.call(OpKind::Delete, key, delete).await?)
}

async fn list(driver: &Driver, prefix: &str) -> Result<Vec<String>, CheckError> {
    let namespace = &driver.config().namespace;
    let prefix = path::child_prefix(prefix);
    let list = driver.backend().list_keys(namespace, &prefix);
    Ok(driver.call(OpKind::List, &prefix, list).await?)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use storebench_backend::InMemoryBackend;

    use crate::driver::DriverConfig;

    use super::*;

    #[tokio::test]
    async fn all_checks_pass_in_memory() {
        let backend = InMemoryBackend::new();
        let driver = Driver::new(Arc::new(backend.clone()), DriverConfig::new("checks"));
        driver.prepare().await.unwrap();

        let results = run_checks(&driver, "bench").await;

        assert_eq!(results.len(), 4);
        for result in &results {
            assert!(result.passed(), "{result}");
        }
        assert!(backend.is_empty("checks"));
    }

    #[tokio::test]
    async fn round_trip_fails_without_namespace() {
        let driver = Driver::new(
            Arc::new(InMemoryBackend::new()),
            DriverConfig::new("unprepared"),
        );

        let err = round_trip(&driver, "bench").await.unwrap_err();
        assert!(matches!(err, CheckError::Backend(_)), "{err:?}");
    }
}
