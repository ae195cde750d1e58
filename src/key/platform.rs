//! Marketplace identifiers supported by the broker.

// self
use crate::_prelude::*;

/// Supported marketplace integration targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
	/// Etsy Open API v3.
	Etsy,
	/// eBay Sell APIs.
	Ebay,
	/// Amazon Selling Partner API.
	Amazon,
}
impl Platform {
	/// Every supported platform, in declaration order.
	pub const ALL: [Platform; 3] = [Platform::Etsy, Platform::Ebay, Platform::Amazon];

	/// Returns a stable label suitable for storage keys, span fields, and metrics.
	pub const fn as_str(self) -> &'static str {
		match self {
			Platform::Etsy => "etsy",
			Platform::Ebay => "ebay",
			Platform::Amazon => "amazon",
		}
	}
}
impl Display for Platform {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Platform {
	type Err = UnknownPlatform;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|platform| platform.as_str().eq_ignore_ascii_case(s.trim()))
			.ok_or_else(|| UnknownPlatform { value: s.to_owned() })
	}
}

/// Error returned when parsing an unsupported platform label.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Unsupported platform `{value}`.")]
pub struct UnknownPlatform {
	/// Raw label that failed to parse.
	pub value: String,
}
