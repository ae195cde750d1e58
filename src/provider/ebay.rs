//! eBay Sell API adapter: bearer token only.

// self
use crate::{
	_prelude::*,
	key::{ApiSecret, Credential, Platform},
	provider::{PlatformAdapter, Resource, adapter},
};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://api.ebay.com";

/// Adapter for eBay.
#[derive(Clone, Debug)]
pub struct EbayAdapter {
	base_url: String,
}
impl EbayAdapter {
	/// Overrides the API root (sandbox, proxy, or mock server).
	pub fn with_base_url(mut self, url: Url) -> Result<Self> {
		self.base_url = adapter::base_url_string(url)?;

		Ok(self)
	}
}
impl Default for EbayAdapter {
	fn default() -> Self {
		Self { base_url: DEFAULT_BASE_URL.into() }
	}
}
impl PlatformAdapter for EbayAdapter {
	fn platform(&self) -> Platform {
		Platform::Ebay
	}

	fn base_url(&self) -> &str {
		&self.base_url
	}

	fn auth_headers(
		&self,
		credential: &Credential,
		access_token: Option<&ApiSecret>,
	) -> Vec<(String, String)> {
		vec![adapter::bearer_header(credential, access_token)]
	}

	// eBay scopes these resources to the token's seller, so the shop name is not in the path.
	fn endpoint_for(&self, resource: Resource, _shop: &str) -> Result<String> {
		Ok(match resource {
			Resource::Products => "/sell/inventory/v1/inventory_item".into(),
			Resource::Orders => "/sell/fulfillment/v1/order".into(),
			Resource::ShopInfo => "/sell/account/v1/privilege".into(),
		})
	}
}
