//! Platform adapter hooks that shape marketplace requests.
//!
//! Each supported marketplace gets one [`PlatformAdapter`] implementation that knows its
//! base URL, its authentication header scheme, and where the shared [`Resource`] kinds live.
//! Dispatchers stay platform-agnostic and only talk to this trait.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	key::{ApiSecret, Credential, Platform},
};

/// Logical resources the aggregator can request from every marketplace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
	/// Product listings.
	Products,
	/// Orders or receipts.
	Orders,
	/// Shop or seller profile.
	ShopInfo,
}
impl Resource {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Resource::Products => "products",
			Resource::Orders => "orders",
			Resource::ShopInfo => "shop_info",
		}
	}
}
impl Display for Resource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Per-marketplace behavior consumed by dispatchers and the aggregator.
///
/// Implementors are required to be `Send + Sync` and must never log the secrets they are
/// handed. `resolve` has a default implementation that appends the endpoint to the base URL,
/// which is enough for every built-in adapter.
pub trait PlatformAdapter: Send + Sync {
	/// Marketplace served by the adapter.
	fn platform(&self) -> Platform;

	/// API root, without a trailing slash requirement.
	fn base_url(&self) -> &str;

	/// Authentication headers for a call made with `credential`.
	///
	/// `access_token` is the seller's OAuth token when the call acts on a connected account.
	fn auth_headers(
		&self,
		credential: &Credential,
		access_token: Option<&ApiSecret>,
	) -> Vec<(String, String)>;

	/// Relative endpoint path for `resource` on the given shop.
	///
	/// Implementations that place the shop in the path must pass it through [`shop_segment`].
	fn endpoint_for(&self, resource: Resource, shop: &str) -> Result<String>;

	/// Joins a relative endpoint onto the base URL.
	fn resolve(&self, endpoint: &str) -> Result<Url> {
		let base = self.base_url().trim_end_matches('/');
		let joined = format!("{base}/{}", endpoint.trim_start_matches('/'));

		Url::parse(&joined).map_err(|source| {
			ConfigError::InvalidEndpoint {
				platform: self.platform(),
				endpoint: endpoint.to_owned(),
				source,
			}
			.into()
		})
	}
}

/// `Authorization: Bearer` header using the account token, or the credential key otherwise.
pub fn bearer_header(credential: &Credential, access_token: Option<&ApiSecret>) -> (String, String) {
	let token = access_token.unwrap_or(&credential.api_key);

	("Authorization".into(), format!("Bearer {}", token.expose()))
}

/// Percent-encodes `shop` as exactly one path segment.
///
/// `/`, `?`, `#`, `%`, and every other byte outside `A-Z a-z 0-9 - . _ *` are escaped, so the
/// shop can neither leave its segment nor start a query or fragment. Names that the URL parser
/// would treat as dot segments are rejected.
pub fn shop_segment(platform: Platform, shop: &str) -> Result<String> {
	if matches!(shop, "" | "." | "..") {
		return Err(ConfigError::InvalidShopName { platform, shop: shop.to_owned() }.into());
	}

	// Form encoding writes spaces as `+`, which a path would read literally.
	Ok(url::form_urlencoded::byte_serialize(shop.as_bytes())
		.map(|chunk| if chunk == "+" { "%20" } else { chunk })
		.collect())
}

/// Validates an adapter base URL and normalizes it to a string.
pub(crate) fn base_url_string(url: Url) -> Result<String> {
	if url.cannot_be_a_base() {
		return Err(ConfigError::InvalidBaseUrl { url: url.to_string() }.into());
	}

	Ok(url.as_str().trim_end_matches('/').to_owned())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::key::CredentialId;

	struct FixedAdapter(&'static str);
	impl PlatformAdapter for FixedAdapter {
		fn platform(&self) -> Platform {
			Platform::Ebay
		}

		fn base_url(&self) -> &str {
			self.0
		}

		fn auth_headers(
			&self,
			credential: &Credential,
			access_token: Option<&ApiSecret>,
		) -> Vec<(String, String)> {
			vec![bearer_header(credential, access_token)]
		}

		fn endpoint_for(&self, resource: Resource, shop: &str) -> Result<String> {
			Ok(format!("/{}/{resource}", shop_segment(self.platform(), shop)?))
		}
	}

	#[test]
	fn resolve_tolerates_slashes_on_both_sides() {
		let adapter = FixedAdapter("https://api.example.com/v1/");
		let url = adapter.resolve("/orders?limit=5").expect("Endpoint should resolve.");

		assert_eq!(url.as_str(), "https://api.example.com/v1/orders?limit=5");

		let url = adapter.resolve("items").expect("Endpoint without slash should resolve.");

		assert_eq!(url.as_str(), "https://api.example.com/v1/items");
	}

	#[test]
	fn shop_names_stay_inside_their_segment() {
		let adapter = FixedAdapter("https://api.example.com/v1");
		let endpoint = adapter
			.endpoint_for(Resource::Orders, "../../admin?x=1#top/more shops+co")
			.expect("Hostile shop name should still encode.");
		let url = adapter.resolve(&endpoint).expect("Encoded endpoint should resolve.");

		assert_eq!(
			url.path(),
			"/v1/..%2F..%2Fadmin%3Fx%3D1%23top%2Fmore%20shops%2Bco/orders"
		);
		assert_eq!(url.query(), None);
		assert_eq!(url.fragment(), None);
		assert_eq!(
			url.path_segments().map(|segments| segments.count()),
			Some(3),
			"Shop must occupy exactly one segment."
		);
	}

	#[test]
	fn dot_segment_shop_names_are_rejected() {
		for shop in ["", ".", ".."] {
			let err = shop_segment(Platform::Etsy, shop).expect_err("Dot segment must be rejected.");

			assert!(matches!(err, Error::Config(ConfigError::InvalidShopName { .. })));
		}

		assert_eq!(
			shop_segment(Platform::Etsy, "craft.corner").expect("Dotted name should encode."),
			"craft.corner"
		);
	}

	#[test]
	fn resolve_reports_invalid_base() {
		let err = FixedAdapter("not a url").resolve("/x").expect_err("Invalid base must fail.");

		assert!(matches!(err, Error::Config(ConfigError::InvalidEndpoint { .. })));
	}

	#[test]
	fn bearer_prefers_account_token() {
		let credential = Credential::builder(
			CredentialId::new("ebay-1").expect("Credential fixture should be valid."),
			Platform::Ebay,
		)
		.api_key("app-key")
		.build()
		.expect("Credential fixture should build.");
		let token = ApiSecret::new("seller-token");

		assert_eq!(bearer_header(&credential, Some(&token)).1, "Bearer seller-token");
		assert_eq!(bearer_header(&credential, None).1, "Bearer app-key");
	}

	#[test]
	fn base_url_rejects_opaque_urls() {
		let opaque = Url::parse("mailto:ops@example.com").expect("Fixture URL should parse.");

		assert!(base_url_string(opaque).is_err());

		let normal = Url::parse("http://127.0.0.1:8080/").expect("Fixture URL should parse.");

		assert_eq!(
			base_url_string(normal).expect("Loopback URL should be accepted."),
			"http://127.0.0.1:8080"
		);
	}
}
