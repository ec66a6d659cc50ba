//! Synthetic payloads for write workloads.

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

/// Produces buffers of uniformly random bytes.
///
/// Content is not cryptographically strong. [`SmallRng`] is used because generating large
/// payloads must not dominate the benchmark.
#[derive(Debug, Clone)]
pub struct PayloadGenerator {
    rng: SmallRng,
}

impl PayloadGenerator {
    /// Creates a generator seeded from the thread-local RNG.
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    /// Creates a generator with deterministic output, for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Returns a fresh payload of exactly `size` bytes.
    pub fn generate(&mut self, size: u64) -> Bytes {
        let mut buf = vec![0; size as usize];
        self.rng.fill_bytes(&mut buf);
        buf.into()
    }
}

impl Default for PayloadGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_exact_size() {
        let mut generator = PayloadGenerator::new();
        for size in [1, 7, 1024, 256 * 1024] {
            assert_eq!(generator.generate(size).len() as u64, size);
        }
    }

    #[test]
    fn consecutive_payloads_differ() {
        let mut generator = PayloadGenerator::new();
        let first = generator.generate(1024);
        let second = generator.generate(1024);
        assert_ne!(first, second);
    }

    #[test]
    fn seeded_generators_agree() {
        let a = PayloadGenerator::with_seed(42).generate(64);
        let b = PayloadGenerator::with_seed(42).generate(64);
        assert_eq!(a, b);
    }
}
