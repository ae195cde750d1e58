// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for one dispatcher.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	rotations: AtomicU64,
}
impl DispatchMetrics {
	/// Returns the number of HTTP attempts, retries included.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of requests that ended with a 2xx response.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of requests that ended without success.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns how often a rate-limited credential was rotated out.
	pub fn rotations(&self) -> u64 {
		self.rotations.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_rotation(&self) {
		self.rotations.fetch_add(1, Ordering::Relaxed);
	}
}
