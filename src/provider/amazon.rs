//! Amazon Selling Partner API adapter: bearer token plus `x-amz-access-token`.

// self
use crate::{
	_prelude::*,
	key::{ApiSecret, Credential, Platform},
	provider::{PlatformAdapter, Resource, adapter},
};

/// North America production API root.
pub const DEFAULT_BASE_URL: &str = "https://sellingpartnerapi-na.amazon.com";

/// Adapter for Amazon SP-API.
///
/// The partner header carries the credential's secret when one is provisioned and falls back to
/// the key otherwise.
#[derive(Clone, Debug)]
pub struct AmazonAdapter {
	base_url: String,
}
impl AmazonAdapter {
	/// Overrides the API root (other regions, sandbox, or mock server).
	pub fn with_base_url(mut self, url: Url) -> Result<Self> {
		self.base_url = adapter::base_url_string(url)?;

		Ok(self)
	}
}
impl Default for AmazonAdapter {
	fn default() -> Self {
		Self { base_url: DEFAULT_BASE_URL.into() }
	}
}
impl PlatformAdapter for AmazonAdapter {
	fn platform(&self) -> Platform {
		Platform::Amazon
	}

	fn base_url(&self) -> &str {
		&self.base_url
	}

	fn auth_headers(
		&self,
		credential: &Credential,
		access_token: Option<&ApiSecret>,
	) -> Vec<(String, String)> {
		let partner = credential.api_secret.as_ref().unwrap_or(&credential.api_key);

		vec![
			adapter::bearer_header(credential, access_token),
			("x-amz-access-token".into(), partner.expose().to_owned()),
		]
	}

	fn endpoint_for(&self, resource: Resource, shop: &str) -> Result<String> {
		Ok(match resource {
			Resource::Products => {
				let shop = adapter::shop_segment(Platform::Amazon, shop)?;

				format!("/listings/2021-08-01/items/{shop}")
			},
			Resource::Orders => "/orders/v0/orders".into(),
			Resource::ShopInfo => "/sellers/v1/marketplaceParticipations".into(),
		})
	}
}
