//! Least-used credential selection with a sticky per-platform choice.

// self
use crate::{
	_prelude::*,
	key::{Credential, CredentialId, Platform},
	obs::{self, OpKind, OpOutcome},
	rotation::UsageTracker,
	store::{CredentialFilter, CredentialStore},
};

/// Result of asking a [`KeySelector`] for a credential.
#[derive(Clone, Debug)]
pub enum KeySelection {
	/// A credential below the safety threshold.
	Available(Credential),
	/// Active credentials exist but every one is at or above the safety threshold.
	Exhausted,
	/// No active credential exists for the platform.
	NotConfigured,
}
impl KeySelection {
	/// Borrowed credential, if one was selected.
	pub fn credential(&self) -> Option<&Credential> {
		match self {
			Self::Available(credential) => Some(credential),
			_ => None,
		}
	}

	/// Owned credential, if one was selected.
	pub fn into_credential(self) -> Option<Credential> {
		match self {
			Self::Available(credential) => Some(credential),
			_ => None,
		}
	}

	/// Returns `true` when a credential was selected.
	pub fn is_available(&self) -> bool {
		matches!(self, Self::Available(_))
	}
}

/// Picks credentials for one platform.
///
/// The last successful pick is remembered and reused while a fresh store read still reports it
/// as available, which keeps concurrent requests from thrashing across the pool. When it falls
/// below the threshold (or gets marked exhausted after a 429) the selector moves to the
/// least-used active credential.
pub struct KeySelector {
	platform: Platform,
	tracker: UsageTracker,
	sticky: Mutex<Option<CredentialId>>,
}
impl KeySelector {
	/// Creates a selector scoped to `platform`.
	pub fn new(platform: Platform, tracker: UsageTracker) -> Self {
		Self { platform, tracker, sticky: Mutex::new(None) }
	}

	/// Platform served by this selector.
	pub fn platform(&self) -> Platform {
		self.platform
	}

	/// Tracker shared with the dispatcher.
	pub fn tracker(&self) -> &UsageTracker {
		&self.tracker
	}

	/// Identifier of the remembered credential, if any.
	pub fn sticky(&self) -> Option<CredentialId> {
		self.sticky.lock().clone()
	}

	fn store(&self) -> &Arc<dyn CredentialStore> {
		self.tracker.store()
	}

	/// Returns a credential with quota left, or why none could be chosen.
	pub async fn get_available_key(&self) -> Result<KeySelection> {
		obs::record_op_outcome(OpKind::Select, OpOutcome::Attempt);

		let span = obs::OpSpan::new(OpKind::Select, "get_available_key", self.platform.as_str());
		let result = span.instrument(self.select()).await;
		let outcome = match &result {
			Ok(KeySelection::Available(_)) => OpOutcome::Success,
			_ => OpOutcome::Failure,
		};

		obs::record_op_outcome(OpKind::Select, outcome);

		result
	}

	async fn select(&self) -> Result<KeySelection> {
		self.tracker.reset_daily_counters_if_needed().await?;

		let remembered = self.sticky();

		if let Some(id) = remembered {
			if let Some(credential) = self.fresh_available(&id).await? {
				return Ok(KeySelection::Available(credential));
			}

			obs::debug_event(OpKind::Select, format_args!("{id} no longer available, rotating"));
		}

		let candidates = self.store().list(self.platform, CredentialFilter::Active).await?;

		if candidates.is_empty() {
			*self.sticky.lock() = None;

			return Ok(KeySelection::NotConfigured);
		}

		match candidates.into_iter().find(Credential::is_available) {
			Some(credential) => {
				*self.sticky.lock() = Some(credential.id.clone());

				Ok(KeySelection::Available(credential))
			},
			None => {
				*self.sticky.lock() = None;

				obs::warn_event(
					OpKind::Select,
					format_args!("every {} credential is above the safety threshold", self.platform),
				);

				Ok(KeySelection::Exhausted)
			},
		}
	}

	/// Re-reads the credential and checks it is active, on this platform, and below threshold.
	///
	/// Unknown identifiers are reported as unavailable.
	pub async fn is_available(&self, id: &CredentialId) -> Result<bool> {
		Ok(self.fresh_available(id).await?.is_some())
	}

	async fn fresh_available(&self, id: &CredentialId) -> Result<Option<Credential>> {
		let credential = self.store().fetch(id).await?;

		Ok(credential.filter(|c| c.platform == self.platform && c.is_available()))
	}
}
impl Debug for KeySelector {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KeySelector")
			.field("platform", &self.platform)
			.field("sticky", &self.sticky())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{rotation, store::MemoryStore};

	fn credential(id: &str, platform: Platform, used: u32) -> Credential {
		Credential::builder(
			CredentialId::new(id).expect("Credential fixture should be valid."),
			platform,
		)
		.api_key(format!("{id}-key"))
		.daily_limit(100)
		.calls_used_today(used)
		.last_reset_at(rotation::today_utc())
		.build()
		.expect("Credential fixture should build.")
	}

	fn id(value: &str) -> CredentialId {
		CredentialId::new(value).expect("Credential fixture should be valid.")
	}

	async fn selector(credentials: Vec<Credential>) -> (KeySelector, MemoryStore) {
		let store = MemoryStore::default();

		for credential in credentials {
			store.save(credential).await.expect("Fixture save should succeed.");
		}

		let tracker = UsageTracker::new(Arc::new(store.clone()));

		(KeySelector::new(Platform::Ebay, tracker), store)
	}

	#[tokio::test]
	async fn picks_least_used_credential_below_threshold() {
		let (selector, _) = selector(vec![
			credential("a", Platform::Ebay, 95),
			credential("b", Platform::Ebay, 40),
			credential("c", Platform::Ebay, 10),
			credential("other", Platform::Etsy, 0),
		])
		.await;
		let picked = selector.get_available_key().await.unwrap().into_credential().unwrap();

		assert_eq!(picked.id.as_ref(), "c");
		assert_eq!(selector.sticky(), Some(id("c")));
	}

	#[tokio::test]
	async fn sticky_choice_survives_until_threshold() {
		let (selector, store) =
			selector(vec![credential("a", Platform::Ebay, 10), credential("b", Platform::Ebay, 20)])
				.await;

		assert_eq!(selector.get_available_key().await.unwrap().credential().unwrap().id, id("a"));

		// `a` is now busier than `b` but still below 90%, so it stays selected.
		store.save(credential("a", Platform::Ebay, 50)).await.unwrap();

		assert_eq!(selector.get_available_key().await.unwrap().credential().unwrap().id, id("a"));

		store.save(credential("a", Platform::Ebay, 90)).await.unwrap();

		assert_eq!(selector.get_available_key().await.unwrap().credential().unwrap().id, id("b"));
	}

	#[tokio::test]
	async fn distinguishes_exhausted_from_not_configured() {
		let (empty, _) = selector(vec![credential("etsy-only", Platform::Etsy, 0)]).await;

		assert!(matches!(empty.get_available_key().await.unwrap(), KeySelection::NotConfigured));

		let mut disabled = credential("off", Platform::Ebay, 0);

		disabled.is_active = false;

		let (inactive, _) = selector(vec![disabled]).await;

		assert!(matches!(inactive.get_available_key().await.unwrap(), KeySelection::NotConfigured));

		let (full, _) =
			selector(vec![credential("a", Platform::Ebay, 90), credential("b", Platform::Ebay, 100)])
				.await;

		assert!(matches!(full.get_available_key().await.unwrap(), KeySelection::Exhausted));
	}

	#[tokio::test]
	async fn stale_counters_are_reset_before_selection() {
		let mut yesterday = credential("a", Platform::Ebay, 100);

		yesterday.last_reset_at = rotation::today_utc().previous_day().expect("Date has a predecessor.");

		let (selector, _) = selector(vec![yesterday]).await;
		let picked = selector.get_available_key().await.unwrap().into_credential().unwrap();

		assert_eq!(picked.calls_used_today, 0);
		assert_eq!(picked.last_reset_at, rotation::today_utc());
	}

	#[tokio::test]
	async fn is_available_reads_fresh_state() {
		let (selector, store) = selector(vec![credential("a", Platform::Ebay, 0)]).await;

		assert!(selector.is_available(&id("a")).await.unwrap());

		selector.tracker().mark_exhausted(&id("a"), None).await.unwrap();

		assert!(!selector.is_available(&id("a")).await.unwrap());
		assert!(!selector.is_available(&id("missing")).await.unwrap());

		store.save(credential("etsy", Platform::Etsy, 0)).await.unwrap();

		assert!(!selector.is_available(&id("etsy")).await.unwrap());
	}
}
