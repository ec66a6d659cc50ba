//! Integrity checks for round trips and listings, and the findings they produce.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use storebench_backend::BackendError;

/// Maximum number of offending keys kept per run for the summary.
pub const MAX_SAMPLES: usize = 10;

/// How thoroughly read-back payloads are compared.
///
/// Retaining every written payload lets reads be compared byte for byte, at the cost of keeping
/// `object_count * object_size` bytes in memory. With [`VerifyMode::Size`] payloads are dropped
/// after the write and only their lengths are checked.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    /// Keep payloads and compare full contents.
    #[default]
    Content,
    /// Keep only payload lengths.
    Size,
}

/// Outcome of comparing a written payload with what was read back.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RoundTrip {
    /// Length and, where compared, content match.
    Pass,
    /// The payload came back with a different length.
    SizeMismatch {
        /// Length that was written.
        expected: u64,
        /// Length that was read.
        actual: u64,
    },
    /// Lengths agree but the bytes differ, starting at `offset`.
    ContentMismatch {
        /// Index of the first differing byte.
        offset: u64,
    },
}

/// Compares lengths first, then every byte.
pub fn verify_round_trip(written: &[u8], read: &[u8]) -> RoundTrip {
    if written.len() != read.len() {
        return RoundTrip::SizeMismatch {
            expected: written.len() as u64,
            actual: read.len() as u64,
        };
    }

    match written.iter().zip(read).position(|(a, b)| a != b) {
        Some(offset) => RoundTrip::ContentMismatch {
            offset: offset as u64,
        },
        None => RoundTrip::Pass,
    }
}

/// Checks only the length of a read-back payload.
pub fn verify_size(expected: u64, read: &[u8]) -> RoundTrip {
    let actual = read.len() as u64;
    if actual == expected {
        RoundTrip::Pass
    } else {
        RoundTrip::SizeMismatch { expected, actual }
    }
}

/// Outcome of comparing an expected key set with a listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Listing {
    /// Both sets are equal.
    Pass,
    /// The sets differ. At least one of the two fields is non-empty.
    Mismatch {
        /// Expected keys absent from the listing.
        missing: BTreeSet<String>,
        /// Listed keys that were not expected.
        unexpected: BTreeSet<String>,
    },
}

/// Compares the expected set of keys with the keys a listing returned.
pub fn verify_listing(expected: &BTreeSet<String>, actual: &BTreeSet<String>) -> Listing {
    let missing: BTreeSet<_> = expected.difference(actual).cloned().collect();
    let unexpected: BTreeSet<_> = actual.difference(expected).cloned().collect();

    if missing.is_empty() && unexpected.is_empty() {
        Listing::Pass
    } else {
        Listing::Mismatch {
            missing,
            unexpected,
        }
    }
}

/// Category of a failed check.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FindingKind {
    /// See [`RoundTrip::SizeMismatch`].
    SizeMismatch,
    /// See [`RoundTrip::ContentMismatch`].
    ContentMismatch,
    /// An expected key was absent from a listing.
    Missing,
    /// A listing returned a key that was not expected.
    Unexpected,
    /// The number of enumerated leaves differs from the expected count.
    LeafCount,
    /// A read failed because the object did not exist.
    NotFound,
    /// A read failed in transport or on the server.
    ReadFailed,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SizeMismatch => "SizeMismatch",
            Self::ContentMismatch => "ContentMismatch",
            Self::Missing => "Missing",
            Self::Unexpected => "Unexpected",
            Self::LeafCount => "LeafCount",
            Self::NotFound => "NotFound",
            Self::ReadFailed => "ReadFailed",
        };
        f.write_str(name)
    }
}

/// A single offending key, kept as an example in the summary.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sample {
    /// What went wrong.
    pub kind: FindingKind,
    /// The affected key.
    pub key: String,
    /// Human readable details.
    pub detail: String,
}

/// Passes and failures collected over one run.
///
/// Every failure is counted. Only the first [`MAX_SAMPLES`] are kept with their key.
#[derive(Clone, Debug, Default)]
pub struct Findings {
    passed: u64,
    counts: BTreeMap<FindingKind, u64>,
    samples: Vec<Sample>,
}

impl Findings {
    /// Records a successful check.
    pub fn pass(&mut self) {
        self.passed += 1;
    }

    /// Records a failed check.
    pub fn fail(&mut self, kind: FindingKind, key: &str, detail: impl Into<String>) {
        *self.counts.entry(kind).or_default() += 1;
        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(Sample {
                kind,
                key: key.to_owned(),
                detail: detail.into(),
            });
        }
    }

    /// Records the outcome of a round-trip comparison.
    pub fn round_trip(&mut self, key: &str, outcome: RoundTrip) {
        match outcome {
            RoundTrip::Pass => self.pass(),
            RoundTrip::SizeMismatch { expected, actual } => self.fail(
                FindingKind::SizeMismatch,
                key,
                format!("expected {expected} bytes, got {actual}"),
            ),
            RoundTrip::ContentMismatch { offset } => self.fail(
                FindingKind::ContentMismatch,
                key,
                format!("first difference at byte {offset}"),
            ),
        }
    }

    /// Records the outcome of a listing comparison, one finding per offending key.
    pub fn listing(&mut self, outcome: Listing) {
        match outcome {
            Listing::Pass => self.pass(),
            Listing::Mismatch {
                missing,
                unexpected,
            } => {
                for key in missing {
                    self.fail(FindingKind::Missing, &key, "expected but not listed");
                }
                for key in unexpected {
                    self.fail(FindingKind::Unexpected, &key, "listed but not expected");
                }
            }
        }
    }

    /// Records a failed read.
    pub fn read_error(&mut self, key: &str, error: &BackendError) {
        let kind = if error.is_not_found() {
            FindingKind::NotFound
        } else {
            FindingKind::ReadFailed
        };
        self.fail(kind, key, error.to_string());
    }

    /// Number of successful checks.
    pub fn passed(&self) -> u64 {
        self.passed
    }

    /// Number of failures of the given kind.
    pub fn count(&self, kind: FindingKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or_default()
    }

    /// Total number of failures.
    pub fn failures(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Returns `true` if nothing failed.
    pub fn is_clean(&self) -> bool {
        self.failures() == 0
    }

    /// Failure counts per kind.
    pub fn counts(&self) -> impl Iterator<Item = (FindingKind, u64)> + '_ {
        self.counts.iter().map(|(kind, count)| (*kind, *count))
    }

    /// Example failures, in the order they were recorded.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn round_trip_outcomes() {
        assert_eq!(verify_round_trip(b"oh hai!", b"oh hai!"), RoundTrip::Pass);
        assert_eq!(
            verify_round_trip(b"oh hai!", b"oh hai"),
            RoundTrip::SizeMismatch {
                expected: 7,
                actual: 6
            }
        );
        assert_eq!(
            verify_round_trip(b"oh hai!", b"oh bai!"),
            RoundTrip::ContentMismatch { offset: 3 }
        );
    }

    #[test]
    fn size_only_ignores_content() {
        assert_eq!(verify_size(3, b"abc"), RoundTrip::Pass);
        assert_eq!(
            verify_size(4, b"abc"),
            RoundTrip::SizeMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn listing_outcomes() {
        let expected = set(&["a", "b", "c"]);
        assert_eq!(verify_listing(&expected, &set(&["c", "b", "a"])), Listing::Pass);
        assert_eq!(
            verify_listing(&expected, &set(&["a", "b", "d"])),
            Listing::Mismatch {
                missing: set(&["c"]),
                unexpected: set(&["d"]),
            }
        );
        assert_eq!(
            verify_listing(&expected, &set(&["a"])),
            Listing::Mismatch {
                missing: set(&["b", "c"]),
                unexpected: set(&[]),
            }
        );
    }

    #[test]
    fn findings_keep_counts_beyond_samples() {
        let mut findings = Findings::default();
        findings.pass();
        for i in 0..25 {
            findings.round_trip(
                &format!("key-{i}"),
                RoundTrip::SizeMismatch {
                    expected: 2,
                    actual: 1,
                },
            );
        }
        findings.read_error("gone", &BackendError::not_found("gone"));

        assert_eq!(findings.passed(), 1);
        assert_eq!(findings.count(FindingKind::SizeMismatch), 25);
        assert_eq!(findings.count(FindingKind::NotFound), 1);
        assert_eq!(findings.failures(), 26);
        assert_eq!(findings.samples().len(), MAX_SAMPLES);
        assert_eq!(findings.samples()[0].key, "key-0");
        assert!(!findings.is_clean());
    }
}
