//! Storage contracts and built-in store implementations for pooled credentials.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// crates.io
use time::Date;
// self
use crate::{
	_prelude::*,
	key::{Credential, CredentialId, Platform, UsageLogEntry},
};

/// Boxed future returned by every [`CredentialStore`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract implemented by credential stores.
///
/// Mutations that touch counters (`reset_stale`, `increment_usage`, `mark_exhausted`) must be
/// applied by the backend in one step so concurrent dispatchers never lose updates.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Persists or replaces a credential.
	fn save(&self, credential: Credential) -> StoreFuture<'_, ()>;

	/// Fetches a credential by identifier, if present.
	fn fetch<'a>(&'a self, id: &'a CredentialId) -> StoreFuture<'a, Option<Credential>>;

	/// Lists credentials for a platform ordered by ascending `calls_used_today`, then id.
	fn list(&self, platform: Platform, filter: CredentialFilter) -> StoreFuture<'_, Vec<Credential>>;

	/// Zeroes counters of every credential whose `last_reset_at` precedes `today`.
	///
	/// Returns the number of credentials that were reset.
	fn reset_stale(&self, today: Date) -> StoreFuture<'_, usize>;

	/// Atomically adds one call to the credential's counter.
	///
	/// Backends without a native atomic increment keep the default, which reports
	/// [`IncrementOutcome::Unsupported`] so callers can fall back to read-then-write.
	fn increment_usage<'a>(&'a self, id: &'a CredentialId) -> StoreFuture<'a, IncrementOutcome> {
		let _ = id;

		Box::pin(async { Ok(IncrementOutcome::Unsupported) })
	}

	/// Forces the counter to the daily limit and appends `note` to the audit trail.
	fn mark_exhausted<'a>(
		&'a self,
		id: &'a CredentialId,
		note: String,
	) -> StoreFuture<'a, Option<Credential>>;

	/// Enables or disables a credential and appends `note` to the audit trail.
	fn set_active<'a>(
		&'a self,
		id: &'a CredentialId,
		active: bool,
		note: String,
	) -> StoreFuture<'a, Option<Credential>>;

	/// Appends an entry to the usage log.
	fn append_usage(&self, entry: UsageLogEntry) -> StoreFuture<'_, ()>;
}

/// Which credentials a [`CredentialStore::list`] call returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialFilter {
	/// Only credentials with `is_active == true`.
	#[default]
	Active,
	/// Every credential regardless of its active flag.
	All,
}
impl CredentialFilter {
	/// Returns `true` if the credential passes the filter.
	pub fn matches(self, credential: &Credential) -> bool {
		match self {
			Self::Active => credential.is_active,
			Self::All => true,
		}
	}
}

/// Result of an atomic usage increment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncrementOutcome {
	/// The counter was incremented; carries the new value.
	Incremented(u32),
	/// No credential matched the identifier.
	Missing,
	/// The backend has no atomic increment.
	Unsupported,
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Orders credentials least-used first with a stable id tiebreaker.
pub(crate) fn sort_least_used(credentials: &mut [Credential]) {
	credentials.sort_by(|a, b| {
		a.calls_used_today.cmp(&b.calls_used_today).then_with(|| a.id.cmp(&b.id))
	});
}
