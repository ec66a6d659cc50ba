//! Console output of runs and the final verdict.

use std::fmt;

use bytesize::ByteSize;
use yansi::Paint;

use crate::checks::CheckResult;
use crate::driver::{RunError, RunReport};
use crate::metrics::{Percentiles, Throughput};

/// Prints the metrics and findings of a run to stdout.
pub fn print_report(title: &str, report: &RunReport) {
    let record = &report.record;
    let summary = report.summary();

    println!();
    println!(
        "{} {} ({} objects x {})",
        "##".bold(),
        title.bold().blue(),
        record.object_count.bold(),
        ByteSize::b(record.object_size)
    );

    print!(
        "  {} {} ops, {} in {:.2}s",
        record.kind.verb(),
        summary.total_ops.bold(),
        ByteSize::b(summary.total_bytes),
        summary.elapsed_secs
    );
    if let Some(enumerated) = report.enumerated {
        print!(", {} enumerated", enumerated.bold());
    }
    println!();

    match summary.throughput {
        Throughput::Measured {
            mb_per_sec,
            ops_per_sec,
        } => println!(
            "  {:.2} MB/s, {:.2} operations/s",
            mb_per_sec.bold(),
            ops_per_sec
        ),
        Throughput::Unmeasurable => println!("  throughput {}", "unmeasurable".yellow()),
    }

    if let Some(latency) = summary.latency {
        print_percentiles(&latency);
    }

    let findings = &report.findings;
    if findings.passed() > 0 || !findings.is_clean() {
        print!("  {} verified", findings.passed().bold().green());
        if !findings.is_clean() {
            print!(
                ", {}",
                format!("{} FAILURES", findings.failures()).bold().red()
            );
        }
        println!();
    }
    for (kind, count) in findings.counts() {
        println!("    {kind}: {}", count.bold().red());
    }
    for sample in findings.samples() {
        println!("    - {} ({}): {}", sample.key, sample.kind, sample.detail);
    }
}

fn print_percentiles(latency: &Percentiles) {
    println!(
        "  avg: {:.2?}; p50: {:.2?}; p90: {:.2?}; p99: {:.2?}",
        latency.avg.bold(),
        latency.p50,
        latency.p90,
        latency.p99
    );
}

/// Prints the outcome of every functional check.
pub fn print_checks(results: &[CheckResult]) {
    println!();
    println!("{} {}", "##".bold(), "Functional checks".bold().blue());
    for result in results {
        match &result.outcome {
            Ok(()) => println!("  {} {}", "ok".green(), result.name),
            Err(err) => println!("  {} {}: {err}", "FAILED".bold().red(), result.name),
        }
    }
}

/// The single line that concludes an invocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// Every run completed and every check passed.
    Passed(String),
    /// Something failed.
    Failed {
        /// The phase that failed.
        phase: String,
        /// What went wrong.
        reason: String,
    },
}

impl Verdict {
    /// A failed verdict for a run that ended early.
    ///
    /// Backend failures are prefixed with their kind. A run aborted because the backend became
    /// unreachable or refused access is reported as a setup failure.
    pub fn from_error(err: &RunError) -> Self {
        let (phase, source) = match err {
            RunError::Setup(source) => ("setup".to_owned(), Some(source)),
            RunError::InvalidWorkload(_) => ("setup".to_owned(), None),
            RunError::Aborted { source, .. } if source.is_setup_failure() => {
                ("setup".to_owned(), Some(source))
            }
            RunError::Aborted { phase, source, .. } => (phase.to_string(), Some(source)),
            RunError::Cancelled { phase, .. } => (phase.to_string(), None),
        };

        let reason = match source {
            Some(source) => format!("{}: {err}", source.kind()),
            None => err.to_string(),
        };
        Self::Failed { phase, reason }
    }

    /// A failed verdict if `report` did not complete.
    pub fn check_report(phase: &str, report: &RunReport) -> Option<Self> {
        if report.is_completed() {
            return None;
        }

        let reason = report
            .findings
            .counts()
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect::<Vec<_>>()
            .join(", ");

        Some(Self::Failed {
            phase: phase.to_owned(),
            reason,
        })
    }

    /// Returns `true` for [`Verdict::Passed`].
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed(_))
    }

    /// Prints the verdict as the last line of output.
    pub fn print(&self) {
        println!();
        match self {
            Self::Passed(_) => println!("{}", self.bold().green()),
            Self::Failed { .. } => println!("{}", self.bold().red()),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed(message) => write!(f, "PASSED: {message}"),
            Self::Failed { phase, reason } => write!(f, "FAILED: {phase}: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use storebench_backend::BackendError;

    use crate::driver::RunState;
    use crate::metrics::{OpKind, RunRecord};
    use crate::verify::{FindingKind, Findings};

    use super::*;

    fn report(findings: Findings) -> RunReport {
        let state = if findings.is_clean() {
            RunState::Completed
        } else {
            RunState::Failed
        };
        RunReport {
            record: RunRecord::start(OpKind::Read, 3, 16),
            state,
            findings,
            enumerated: None,
        }
    }

    #[test]
    fn formats_final_line() {
        assert_eq!(
            Verdict::Passed("10 objects round-tripped".into()).to_string(),
            "PASSED: 10 objects round-tripped"
        );

        let err = RunError::Aborted {
            phase: OpKind::Write,
            completed: 3,
            source: BackendError::write_failed("bench/00003.bin", "connection reset"),
        };
        let verdict = Verdict::from_error(&err);
        assert!(!verdict.is_passed());
        assert!(verdict.to_string().starts_with("FAILED: write: WriteFailed: "));
    }

    #[test]
    fn setup_failures_name_their_kind() {
        let err = RunError::Setup(BackendError::permission_denied("HTTP 403: creating bucket"));
        assert_eq!(
            Verdict::from_error(&err).to_string(),
            "FAILED: setup: PermissionDenied: setup failed: permission denied: HTTP 403: creating bucket"
        );

        let err = RunError::Aborted {
            phase: OpKind::Read,
            completed: 0,
            source: BackendError::unavailable("connection refused"),
        };
        assert!(
            Verdict::from_error(&err)
                .to_string()
                .starts_with("FAILED: setup: BackendUnavailable: read aborted")
        );

        let err = RunError::Cancelled {
            phase: OpKind::Write,
            completed: 2,
        };
        assert_eq!(
            Verdict::from_error(&err).to_string(),
            "FAILED: write: write cancelled after 2 operations"
        );
    }

    #[test]
    fn completed_reports_have_no_verdict() {
        let mut findings = Findings::default();
        findings.pass();
        assert_eq!(Verdict::check_report("read", &report(findings)), None);
    }

    #[test]
    fn failed_reports_list_counts() {
        let mut findings = Findings::default();
        findings.fail(FindingKind::ContentMismatch, "a", "first difference at byte 0");
        findings.fail(FindingKind::ContentMismatch, "b", "first difference at byte 3");
        findings.fail(FindingKind::NotFound, "c", "not found");

        let verdict = Verdict::check_report("read", &report(findings)).unwrap();
        assert_eq!(
            verdict.to_string(),
            "FAILED: read: 2 ContentMismatch, 1 NotFound"
        );
    }
}
