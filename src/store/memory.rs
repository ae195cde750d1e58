//! Thread-safe in-memory [`CredentialStore`] implementation for local development and tests.

// crates.io
use time::Date;
// self
use crate::{
	_prelude::*,
	key::{Credential, CredentialId, Platform, UsageLogEntry},
	store::{
		CredentialFilter, CredentialStore, IncrementOutcome, StoreError, StoreFuture,
		sort_least_used,
	},
};

#[derive(Debug, Default)]
struct MemoryState {
	credentials: HashMap<CredentialId, Credential>,
	usage_log: Vec<UsageLogEntry>,
}

type StoreState = Arc<RwLock<MemoryState>>;

/// Thread-safe storage backend that keeps credentials and the usage log in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreState);
impl MemoryStore {
	/// Snapshot of the usage log in append order.
	pub fn usage_log(&self) -> Vec<UsageLogEntry> {
		self.0.read().usage_log.clone()
	}

	fn save_now(state: StoreState, credential: Credential) -> Result<(), StoreError> {
		state.write().credentials.insert(credential.id.clone(), credential);

		Ok(())
	}

	fn list_now(state: StoreState, platform: Platform, filter: CredentialFilter) -> Vec<Credential> {
		let mut credentials: Vec<Credential> = state
			.read()
			.credentials
			.values()
			.filter(|credential| credential.platform == platform && filter.matches(credential))
			.cloned()
			.collect();

		sort_least_used(&mut credentials);

		credentials
	}

	fn reset_now(state: StoreState, today: Date) -> usize {
		state
			.write()
			.credentials
			.values_mut()
			.map(|credential| credential.reset_if_stale(today))
			.filter(|reset| *reset)
			.count()
	}

	fn increment_now(state: StoreState, id: CredentialId) -> IncrementOutcome {
		match state.write().credentials.get_mut(&id) {
			Some(credential) => {
				credential.calls_used_today = credential.calls_used_today.saturating_add(1);

				IncrementOutcome::Incremented(credential.calls_used_today)
			},
			None => IncrementOutcome::Missing,
		}
	}

	fn update_now(
		state: StoreState,
		id: CredentialId,
		apply: impl FnOnce(&mut Credential),
	) -> Option<Credential> {
		let mut guard = state.write();

		match guard.credentials.get_mut(&id) {
			Some(credential) => {
				apply(credential);

				Some(credential.clone())
			},
			None => None,
		}
	}
}
impl CredentialStore for MemoryStore {
	fn save(&self, credential: Credential) -> StoreFuture<'_, ()> {
		let state = self.0.clone();

		Box::pin(async move { Self::save_now(state, credential) })
	}

	fn fetch<'a>(&'a self, id: &'a CredentialId) -> StoreFuture<'a, Option<Credential>> {
		let state = self.0.clone();
		let id = id.to_owned();

		Box::pin(async move { Ok(state.read().credentials.get(&id).cloned()) })
	}

	fn list(&self, platform: Platform, filter: CredentialFilter) -> StoreFuture<'_, Vec<Credential>> {
		let state = self.0.clone();

		Box::pin(async move { Ok(Self::list_now(state, platform, filter)) })
	}

	fn reset_stale(&self, today: Date) -> StoreFuture<'_, usize> {
		let state = self.0.clone();

		Box::pin(async move { Ok(Self::reset_now(state, today)) })
	}

	fn increment_usage<'a>(&'a self, id: &'a CredentialId) -> StoreFuture<'a, IncrementOutcome> {
		let state = self.0.clone();
		let id = id.to_owned();

		Box::pin(async move { Ok(Self::increment_now(state, id)) })
	}

	fn mark_exhausted<'a>(
		&'a self,
		id: &'a CredentialId,
		note: String,
	) -> StoreFuture<'a, Option<Credential>> {
		let state = self.0.clone();
		let id = id.to_owned();

		Box::pin(async move {
			Ok(Self::update_now(state, id, |credential| credential.mark_exhausted(&note)))
		})
	}

	fn set_active<'a>(
		&'a self,
		id: &'a CredentialId,
		active: bool,
		note: String,
	) -> StoreFuture<'a, Option<Credential>> {
		let state = self.0.clone();
		let id = id.to_owned();

		Box::pin(async move {
			Ok(Self::update_now(state, id, |credential| {
				credential.is_active = active;
				credential.append_note(&note);
			}))
		})
	}

	fn append_usage(&self, entry: UsageLogEntry) -> StoreFuture<'_, ()> {
		let state = self.0.clone();

		Box::pin(async move {
			state.write().usage_log.push(entry);

			Ok(())
		})
	}
}
