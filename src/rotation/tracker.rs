//! Date-scoped usage counters and the append-only usage log.

// crates.io
use time::{Date, format_description::well_known::Rfc3339};
// self
use crate::{
	_prelude::*,
	key::{Credential, CredentialId, UsageLogEntry},
	obs::{self, OpKind},
	rotation,
	store::{CredentialStore, IncrementOutcome},
};

/// Maintains per-credential counters and the usage log through a [`CredentialStore`].
#[derive(Clone)]
pub struct UsageTracker {
	store: Arc<dyn CredentialStore>,
}
impl UsageTracker {
	/// Creates a tracker over the shared store.
	pub fn new(store: Arc<dyn CredentialStore>) -> Self {
		Self { store }
	}

	/// Store the tracker writes through.
	pub fn store(&self) -> &Arc<dyn CredentialStore> {
		&self.store
	}

	/// Resets every credential whose counters belong to a previous UTC day.
	///
	/// Concurrent callers may both run the reset; zeroing twice is harmless.
	pub async fn reset_daily_counters_if_needed(&self) -> Result<usize> {
		self.reset_daily_counters_at(rotation::today_utc()).await
	}

	/// Same as [`Self::reset_daily_counters_if_needed`] with an explicit date.
	pub async fn reset_daily_counters_at(&self, today: Date) -> Result<usize> {
		let reset = self.store.reset_stale(today).await?;

		if reset > 0 {
			obs::debug_event(OpKind::Track, format_args!("reset {reset} daily counter(s)"));
		}

		Ok(reset)
	}

	/// Adds one call to the credential's counter and returns the new value.
	///
	/// Uses the store's atomic increment. Stores without one fall back to fetch-then-save, which
	/// can undercount when several dispatchers bump the same credential at once.
	pub async fn increment_usage(&self, id: &CredentialId) -> Result<Option<u32>> {
		match self.store.increment_usage(id).await? {
			IncrementOutcome::Incremented(value) => Ok(Some(value)),
			IncrementOutcome::Missing => Ok(None),
			IncrementOutcome::Unsupported => {
				obs::debug_event(
					OpKind::Track,
					format_args!("store lacks atomic increment, updating {id} in place"),
				);

				let Some(mut credential) = self.store.fetch(id).await? else {
					return Ok(None);
				};

				credential.calls_used_today = credential.calls_used_today.saturating_add(1);

				let value = credential.calls_used_today;

				self.store.save(credential).await?;

				Ok(Some(value))
			},
		}
	}

	/// Appends to the usage log. Failures are reported through tracing and never returned.
	pub async fn log_usage(&self, entry: UsageLogEntry) {
		let id = entry.credential_id.clone();

		if let Err(e) = self.store.append_usage(entry).await {
			obs::warn_event(OpKind::Track, format_args!("usage log append for {id} failed: {e}"));
		}
	}

	/// Forces the counter to the daily limit after the marketplace reported a rate limit.
	pub async fn mark_exhausted(
		&self,
		id: &CredentialId,
		retry_after: Option<Duration>,
	) -> Result<Option<Credential>> {
		let mut note = format!("[{}] Marked exhausted after upstream HTTP 429", timestamp());

		if let Some(retry_after) = retry_after {
			note.push_str(&format!(" (retry after {}s)", retry_after.whole_seconds()));
		}

		Ok(self.store.mark_exhausted(id, note).await?)
	}

	/// Enables or disables a credential and records the reason in its notes.
	pub async fn set_active(
		&self,
		id: &CredentialId,
		active: bool,
		reason: &str,
	) -> Result<Option<Credential>> {
		let verb = if active { "Enabled" } else { "Disabled" };
		let note = format!("[{}] {verb}: {reason}", timestamp());

		Ok(self.store.set_active(id, active, note).await?)
	}
}
impl Debug for UsageTracker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("UsageTracker(..)")
	}
}

fn timestamp() -> String {
	let now = OffsetDateTime::now_utc();

	now.format(&Rfc3339).unwrap_or_else(|_| now.to_string())
}
