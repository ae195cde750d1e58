//! Retry policies composed by the dispatcher, plus the sleeping seam used for backoff.
//!
//! Rate limits and transient failures are handled by two independent policies. A
//! [`RetryPlan`] asks each policy in order and uses the first decision it gets, so swapping or
//! testing one policy never changes the other.

// self
use crate::{_prelude::*, dispatch::FailureKind};

/// Boxed future returned by [`Sleeper::sleep`].
pub type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + 'a + Send>>;

/// Suspends the dispatcher between attempts.
pub trait Sleeper
where
	Self: Send + Sync,
{
	/// Resolves after `delay`.
	fn sleep(&self, delay: Duration) -> SleepFuture<'_>;
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;
impl Sleeper for TokioSleeper {
	fn sleep(&self, delay: Duration) -> SleepFuture<'_> {
		Box::pin(tokio::time::sleep(delay.unsigned_abs()))
	}
}

/// Linear backoff: attempt `k` (0-indexed) waits `base * (k + 1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Backoff {
	base: Duration,
}
impl Backoff {
	/// Creates a linear backoff with the provided base delay.
	pub const fn linear(base: Duration) -> Self {
		Self { base }
	}

	/// Delay to wait after the failed attempt `attempt`.
	pub fn delay(&self, attempt: u32) -> Duration {
		let factor = i32::try_from(attempt.saturating_add(1)).unwrap_or(i32::MAX);

		self.base.saturating_mul(factor)
	}
}
impl Default for Backoff {
	fn default() -> Self {
		Self::linear(Duration::seconds(1))
	}
}

/// What the dispatcher does after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
	/// Wait, then select a fresh credential; the failed one has been marked exhausted.
	Rotate(Duration),
	/// Wait, then try again without rotating.
	Retry(Duration),
	/// Stop and report the failure.
	GiveUp,
}

/// One retry rule, consulted after every failed attempt.
pub trait RetryPolicy
where
	Self: Send + Sync,
{
	/// Returns a decision when the policy handles `failure`, `None` otherwise.
	///
	/// `attempt` is the 0-indexed attempt that just failed.
	fn decide(&self, failure: &FailureKind, attempt: u32, max_attempts: u32) -> Option<RetryDecision>;
}

/// Rotates to another credential after an upstream HTTP 429.
#[derive(Clone, Copy, Debug, Default)]
pub struct RotateOnRateLimit {
	/// Delay schedule between attempts.
	pub backoff: Backoff,
}
impl RetryPolicy for RotateOnRateLimit {
	fn decide(&self, failure: &FailureKind, attempt: u32, max_attempts: u32) -> Option<RetryDecision> {
		if !matches!(failure, FailureKind::RateLimited) {
			return None;
		}
		if attempt + 1 >= max_attempts {
			return Some(RetryDecision::GiveUp);
		}

		Some(RetryDecision::Rotate(self.backoff.delay(attempt)))
	}
}

/// Retries non-429 upstream errors and transport failures with the same credential.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryOnTransient {
	/// Delay schedule between attempts.
	pub backoff: Backoff,
}
impl RetryPolicy for RetryOnTransient {
	fn decide(&self, failure: &FailureKind, attempt: u32, max_attempts: u32) -> Option<RetryDecision> {
		if !matches!(failure, FailureKind::Upstream { .. } | FailureKind::Transport) {
			return None;
		}
		if attempt + 1 >= max_attempts {
			return Some(RetryDecision::GiveUp);
		}

		Some(RetryDecision::Retry(self.backoff.delay(attempt)))
	}
}

/// Ordered set of [`RetryPolicy`] rules. Failures no rule claims end the request.
#[derive(Clone)]
pub struct RetryPlan {
	policies: Vec<Arc<dyn RetryPolicy>>,
}
impl RetryPlan {
	/// Plan without rules; every failure is final.
	pub fn empty() -> Self {
		Self { policies: Vec::new() }
	}

	/// Rotation on 429 followed by transient retries, both on the same backoff.
	pub fn standard(backoff: Backoff) -> Self {
		Self::empty()
			.with_policy(RotateOnRateLimit { backoff })
			.with_policy(RetryOnTransient { backoff })
	}

	/// Appends a rule.
	pub fn with_policy(mut self, policy: impl 'static + RetryPolicy) -> Self {
		self.policies.push(Arc::new(policy));

		self
	}

	/// First decision any rule makes for `failure`.
	pub fn decide(&self, failure: &FailureKind, attempt: u32, max_attempts: u32) -> RetryDecision {
		self.policies
			.iter()
			.find_map(|policy| policy.decide(failure, attempt, max_attempts))
			.unwrap_or(RetryDecision::GiveUp)
	}
}
impl Default for RetryPlan {
	fn default() -> Self {
		Self::standard(Backoff::default())
	}
}
impl Debug for RetryPlan {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryPlan").field("policies", &self.policies.len()).finish()
	}
}
