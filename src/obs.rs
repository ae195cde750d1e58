//! Optional observability helpers for broker operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `quota_broker.op` with the `op` (operation)
//!   and `stage` (call site) fields, plus `warn` events for rate limits and swallowed failures.
//! - Enable `metrics` to increment the `quota_broker_op_total` counter for every
//!   attempt/success/failure/rotation, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Broker operations that carry spans and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Credential selection.
	Select,
	/// Usage counter and log maintenance.
	Track,
	/// Outbound marketplace call with retries.
	Dispatch,
	/// Fan-out over connected accounts.
	Aggregate,
	/// Health report assembly.
	Health,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::Select => "select",
			OpKind::Track => "track",
			OpKind::Dispatch => "dispatch",
			OpKind::Aggregate => "aggregate",
			OpKind::Health => "health",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation or one retry attempt.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure reported back to the caller.
	Failure,
	/// Credential rotated after an upstream rate limit.
	Rotation,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
			OpOutcome::Rotation => "rotation",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
