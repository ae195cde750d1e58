//! Broker-level error types shared across stores, adapters, and dispatchers.

// self
use crate::{_prelude::*, key::Platform};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Response payload did not match the requested type.
	#[error("Response payload could not be decoded at `{path}`: {message}.")]
	Decode {
		/// JSON path where decoding failed.
		path: String,
		/// Underlying serde message.
		message: String,
	},
}

/// Configuration and validation failures raised by the broker.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// No adapter is registered for the platform.
	#[error("No adapter is registered for platform `{platform}`.")]
	UnsupportedPlatform {
		/// Platform without an adapter.
		platform: Platform,
	},
	/// Endpoint cannot be joined onto the adapter base URL.
	#[error("Endpoint `{endpoint}` is not a valid path for {platform}.")]
	InvalidEndpoint {
		/// Platform whose base URL was used.
		platform: Platform,
		/// Offending endpoint.
		endpoint: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Adapter base URL cannot carry a path.
	#[error("Base URL `{url}` cannot be used as an API root.")]
	InvalidBaseUrl {
		/// Offending URL.
		url: String,
	},
	/// Shop name cannot be used as a path segment.
	#[error("Shop name `{shop}` is not a valid {platform} path segment.")]
	InvalidShopName {
		/// Platform whose endpoint was being built.
		platform: Platform,
		/// Offending shop name.
		shop: String,
	},
	/// Header name or value rejected by the transport. The value is never echoed.
	#[error("Header `{name}` is invalid and cannot be sent.")]
	InvalidHeader {
		/// Header name with control characters removed.
		name: String,
	},
}
impl ConfigError {
	/// Rejects the header `name` without echoing its value.
	pub fn invalid_header(name: &str) -> Self {
		Self::InvalidHeader { name: name.chars().filter(|c| !c.is_control()).collect() }
	}

	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Marketplace returned HTTP 429.
	#[error("Marketplace rate limit hit (HTTP 429).")]
	RateLimited {
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Marketplace returned a non-2xx status other than 429.
	#[error("Marketplace returned HTTP {status}: {message}.")]
	Upstream {
		/// HTTP status code.
		status: u16,
		/// Preview of the response body.
		message: String,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the marketplace.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The call exceeded the configured timeout.
	#[error("Marketplace call timed out.")]
	Timeout,
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e) }
	}
}
impl From<serde_path_to_error::Error<serde_json::Error>> for Error {
	fn from(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		Self::Decode { path: e.path().to_string(), message: e.inner().to_string() }
	}
}
