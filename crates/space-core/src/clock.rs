//! Explicit suspension/injection points the core consumes (§9): a clock
//! returning milliseconds since epoch, and a CSPRNG. Neither is global state;
//! every operation that needs one takes it as a parameter.

use rand_core::RngCore;

/// Milliseconds-since-epoch clock.
pub trait Clock {
    /// Current time in milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

/// Cryptographically secure random byte source.
pub trait Csprng {
    /// Fill `dest` with random bytes.
    fn fill_bytes(&mut self, dest: &mut [u8]);
}

/// [`Clock`] backed by [`std::time::SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// [`Csprng`] backed by the OS random number generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRngHandle;

impl Csprng for OsRngHandle {
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        rand::rngs::OsRng.fill_bytes(dest);
    }
}

/// A fixed-time clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0
    }
}

/// A deterministic byte source for reproducible tests (cycles a fixed seed
/// through a counter — not secure, test-only).
#[derive(Debug, Clone)]
pub struct TestCsprng {
    counter: u64,
}

impl TestCsprng {
    pub fn new(seed: u64) -> Self {
        Self { counter: seed }
    }
}

impl Csprng for TestCsprng {
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            self.counter = self.counter.wrapping_mul(6364136223846793005).wrapping_add(1);
            let bytes = self.counter.to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}
