//! Tunables shared by dispatchers, the hub, and health reporting.

// std
use std::time::Duration as StdDuration;
// self
use crate::_prelude::*;

/// Broker configuration with builder-style overrides.
///
/// Every field has a default, so partial JSON documents deserialize cleanly:
///
/// ```
/// let config: quota_broker::config::BrokerConfig =
/// 	serde_json::from_str(r#"{ "max_attempts": 5 }"#).unwrap();
///
/// assert_eq!(config.max_attempts, 5);
/// assert_eq!(config.backoff_base_ms, 1_000);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
	/// Attempts per dispatched request, including the first one.
	pub max_attempts: u32,
	/// Base of the linear backoff; attempt `k` waits `base * (k + 1)`.
	pub backoff_base_ms: u64,
	/// Per-call timeout enforced by the HTTP transport.
	pub request_timeout_ms: u64,
	/// Usage percent at which a platform turns from healthy to warning.
	pub health_warning_percent: u8,
	/// Usage percent at which a platform turns from warning to critical.
	pub health_critical_percent: u8,
}
impl BrokerConfig {
	/// Overrides the retry budget. Zero is clamped to one attempt.
	pub fn with_max_attempts(mut self, attempts: u32) -> Self {
		self.max_attempts = attempts.max(1);

		self
	}

	/// Overrides the backoff base.
	pub fn with_backoff_base(mut self, base: StdDuration) -> Self {
		self.backoff_base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);

		self
	}

	/// Overrides the per-call timeout.
	pub fn with_request_timeout(mut self, timeout: StdDuration) -> Self {
		self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

		self
	}

	/// Overrides the health thresholds (percent of total capacity).
	pub fn with_health_thresholds(mut self, warning: u8, critical: u8) -> Self {
		self.health_warning_percent = warning;
		self.health_critical_percent = critical.max(warning);

		self
	}

	/// Backoff base as a [`Duration`].
	pub fn backoff_base(&self) -> Duration {
		Duration::milliseconds(i64::try_from(self.backoff_base_ms).unwrap_or(i64::MAX))
	}

	/// Per-call timeout as a std duration, ready for the transport.
	pub fn request_timeout(&self) -> StdDuration {
		StdDuration::from_millis(self.request_timeout_ms)
	}
}
impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			backoff_base_ms: 1_000,
			request_timeout_ms: 30_000,
			health_warning_percent: 70,
			health_critical_percent: 90,
		}
	}
}
