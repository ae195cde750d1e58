//! Registry that maps platforms to their adapters.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	key::Platform,
	provider::{AmazonAdapter, EbayAdapter, EtsyAdapter, PlatformAdapter},
};

/// Immutable lookup table from [`Platform`] to its [`PlatformAdapter`].
///
/// Built once at startup and shared by every dispatcher. Registering an adapter for a
/// platform that already has one replaces it, which is how tests point a platform at a
/// mock server.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
	adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}
impl ProviderRegistry {
	/// Registry with every built-in adapter pointed at its production base URL.
	pub fn builtin() -> Self {
		Self::default()
			.register(EtsyAdapter::default())
			.register(EbayAdapter::default())
			.register(AmazonAdapter::default())
	}

	/// Adds or replaces the adapter for its platform.
	pub fn register(self, adapter: impl 'static + PlatformAdapter) -> Self {
		self.register_shared(Arc::new(adapter))
	}

	/// Adds or replaces an already shared adapter.
	pub fn register_shared(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
		self.adapters.insert(adapter.platform(), adapter);

		self
	}

	/// Returns the adapter for `platform`.
	pub fn get(&self, platform: Platform) -> Result<Arc<dyn PlatformAdapter>> {
		self.adapters
			.get(&platform)
			.cloned()
			.ok_or_else(|| ConfigError::UnsupportedPlatform { platform }.into())
	}

	/// Platforms with a registered adapter, in declaration order.
	pub fn platforms(&self) -> Vec<Platform> {
		Platform::ALL.into_iter().filter(|platform| self.adapters.contains_key(platform)).collect()
	}
}
impl Debug for ProviderRegistry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProviderRegistry").field("platforms", &self.platforms()).finish()
	}
}
