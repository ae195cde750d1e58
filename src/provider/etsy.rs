//! Etsy Open API v3 adapter: bearer token plus the application keystring.

// self
use crate::{
	_prelude::*,
	key::{ApiSecret, Credential, Platform},
	provider::{PlatformAdapter, Resource, adapter},
};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://openapi.etsy.com";

/// Adapter for Etsy. Requires `x-api-key` alongside the bearer token.
#[derive(Clone, Debug)]
pub struct EtsyAdapter {
	base_url: String,
}
impl EtsyAdapter {
	/// Overrides the API root (sandbox, proxy, or mock server).
	pub fn with_base_url(mut self, url: Url) -> Result<Self> {
		self.base_url = adapter::base_url_string(url)?;

		Ok(self)
	}
}
impl Default for EtsyAdapter {
	fn default() -> Self {
		Self { base_url: DEFAULT_BASE_URL.into() }
	}
}
impl PlatformAdapter for EtsyAdapter {
	fn platform(&self) -> Platform {
		Platform::Etsy
	}

	fn base_url(&self) -> &str {
		&self.base_url
	}

	fn auth_headers(
		&self,
		credential: &Credential,
		access_token: Option<&ApiSecret>,
	) -> Vec<(String, String)> {
		vec![
			adapter::bearer_header(credential, access_token),
			("x-api-key".into(), credential.api_key.expose().to_owned()),
		]
	}

	fn endpoint_for(&self, resource: Resource, shop: &str) -> Result<String> {
		let shop = adapter::shop_segment(Platform::Etsy, shop)?;

		Ok(match resource {
			Resource::Products => format!("/v3/application/shops/{shop}/listings/active"),
			Resource::Orders => format!("/v3/application/shops/{shop}/receipts"),
			Resource::ShopInfo => format!("/v3/application/shops/{shop}"),
		})
	}
}
