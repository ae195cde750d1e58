//! Transport primitives for outbound marketplace calls.
//!
//! The module exposes [`MarketplaceHttpClient`] alongside the plain request/response
//! types it exchanges, so downstream crates can plug in a custom HTTP stack (or a fake
//! for tests) without the dispatcher depending on reqwest. Implementations report
//! non-2xx statuses as ordinary responses carrying [`ResponseMetadata`]; only failures
//! that produced no response at all surface as [`TransportError`].

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")]
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
#[cfg(feature = "reqwest")] use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransportError},
};

/// Boxed future returned by [`MarketplaceHttpClient::execute`].
pub type HttpFuture<'a> =
	Pin<Box<dyn Future<Output = Result<OutboundResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP transports capable of calling marketplace APIs.
///
/// The trait is the dispatcher's only dependency on an HTTP stack. Implementations must be
/// `Send + Sync + 'static` so one client can be shared by every per-platform dispatcher
/// behind an `Arc`.
pub trait MarketplaceHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Sends the request and resolves once the full body has been read.
	fn execute(&self, request: OutboundRequest) -> HttpFuture<'_>;

	/// Rejects a header this transport could never send.
	///
	/// Dispatchers call this once per request before the first attempt, so a malformed header
	/// fails fast instead of burning retries. The default applies the HTTP field syntax: the
	/// name must be a non-empty token and the value must be visible ASCII, spaces, or tabs.
	fn check_header(&self, name: &str, value: &str) -> Result<(), ConfigError> {
		check_header_syntax(name, value)
	}
}

/// HTTP field syntax check shared by transports without a header type of their own.
pub fn check_header_syntax(name: &str, value: &str) -> Result<(), ConfigError> {
	let name_ok = !name.is_empty()
		&& name.bytes().all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));
	let value_ok = value.bytes().all(|b| b == b'\t' || (b' '..=b'~').contains(&b));

	if name_ok && value_ok { Ok(()) } else { Err(ConfigError::invalid_header(name)) }
}

/// HTTP methods used against marketplace APIs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
	/// `GET`.
	#[default]
	Get,
	/// `POST`.
	Post,
	/// `PUT`.
	Put,
	/// `PATCH`.
	Patch,
	/// `DELETE`.
	Delete,
}
impl HttpMethod {
	/// Returns the canonical method token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
		}
	}
}
impl Display for HttpMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully resolved outbound request.
#[derive(Clone)]
pub struct OutboundRequest {
	/// HTTP method.
	pub method: HttpMethod,
	/// Absolute URL.
	pub url: Url,
	/// Header pairs, auth headers included.
	pub headers: Vec<(String, String)>,
	/// Optional JSON body.
	pub body: Option<Vec<u8>>,
	/// Per-call timeout enforced by the transport.
	pub timeout: Option<std::time::Duration>,
}
impl OutboundRequest {
	/// Creates a request without headers, body, or timeout.
	pub fn new(method: HttpMethod, url: Url) -> Self {
		Self { method, url, headers: Vec::new(), body: None, timeout: None }
	}

	/// Returns the first header value matching `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}
impl Debug for OutboundRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let header_names: Vec<&str> = self.headers.iter().map(|(name, _)| name.as_str()).collect();

		f.debug_struct("OutboundRequest")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("headers", &header_names)
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// Metadata captured from a marketplace response for retry classification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
	/// HTTP status code.
	pub status: u16,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Response returned by a [`MarketplaceHttpClient`].
#[derive(Clone, Debug)]
pub struct OutboundResponse {
	/// Status and retry hints.
	pub metadata: ResponseMetadata,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl OutboundResponse {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a response with the given status and body.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { metadata: ResponseMetadata { status, retry_after: None }, body: body.into() }
	}

	/// Adds a Retry-After hint.
	pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
		self.metadata.retry_after = Some(retry_after);

		self
	}

	/// HTTP status code.
	pub fn status(&self) -> u16 {
		self.metadata.status
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.metadata.status)
	}

	/// Returns `true` for HTTP 429.
	pub fn is_rate_limited(&self) -> bool {
		self.metadata.status == 429
	}

	/// Parses the body as JSON. Empty bodies become `null`; non-JSON text becomes a string.
	pub fn json(&self) -> serde_json::Value {
		if self.body.iter().all(u8::is_ascii_whitespace) {
			return serde_json::Value::Null;
		}

		serde_json::from_slice(&self.body).unwrap_or_else(|_| {
			serde_json::Value::String(String::from_utf8_lossy(&self.body).into_owned())
		})
	}

	/// Truncated, lossy UTF-8 rendering of the body for error messages.
	pub fn body_preview(&self) -> String {
		let text = String::from_utf8_lossy(&self.body);

		if text.chars().count() <= Self::BODY_PREVIEW_LIMIT {
			return text.trim().to_owned();
		}

		let mut buf: String = text.chars().take(Self::BODY_PREVIEW_LIMIT).collect();

		buf.push('…');

		buf
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
		let method = match request.method {
			HttpMethod::Get => reqwest::Method::GET,
			HttpMethod::Post => reqwest::Method::POST,
			HttpMethod::Put => reqwest::Method::PUT,
			HttpMethod::Patch => reqwest::Method::PATCH,
			HttpMethod::Delete => reqwest::Method::DELETE,
		};
		let mut builder = self.0.request(method, request.url);

		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if let Some(body) = request.body {
			builder = builder.header(CONTENT_TYPE, "application/json").body(body);
		}
		if let Some(timeout) = request.timeout {
			builder = builder.timeout(timeout);
		}

		let response = builder.send().await?;
		let status = response.status().as_u16();
		let retry_after = parse_retry_after(response.headers());
		let body = response.bytes().await?.to_vec();

		Ok(OutboundResponse { metadata: ResponseMetadata { status, retry_after }, body })
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl MarketplaceHttpClient for ReqwestHttpClient {
	fn execute(&self, request: OutboundRequest) -> HttpFuture<'_> {
		Box::pin(self.send(request))
	}

	fn check_header(&self, name: &str, value: &str) -> Result<(), ConfigError> {
		HeaderName::from_bytes(name.as_bytes()).map_err(|_| ConfigError::invalid_header(name))?;
		HeaderValue::from_str(value).map_err(|_| ConfigError::invalid_header(name))?;

		Ok(())
	}
}

#[cfg(feature = "reqwest")]
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(i64::from(secs)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn json_handles_empty_and_plain_text_bodies() {
		assert_eq!(OutboundResponse::new(200, Vec::new()).json(), serde_json::Value::Null);
		assert_eq!(OutboundResponse::new(204, " \n").json(), serde_json::Value::Null);
		assert_eq!(
			OutboundResponse::new(200, "ok").json(),
			serde_json::Value::String("ok".into())
		);
		assert_eq!(
			OutboundResponse::new(200, "{\"count\":2}").json(),
			serde_json::json!({ "count": 2 })
		);
	}

	#[test]
	fn status_helpers_classify_responses() {
		let throttled = OutboundResponse::new(429, "slow down").with_retry_after(Duration::seconds(3));

		assert!(throttled.is_rate_limited());
		assert!(!throttled.is_success());
		assert_eq!(throttled.metadata.retry_after, Some(Duration::seconds(3)));
		assert!(OutboundResponse::new(201, "").is_success());
	}

	#[test]
	fn header_syntax_rejects_injection_and_bad_tokens() {
		assert!(check_header_syntax("Content-Language", "en-US").is_ok());
		assert!(check_header_syntax("X-Trace", "a\tb c").is_ok());

		for (name, value) in [("X-Bad", "a\nb"), ("X-Bad", "a\rb"), ("X Bad", "ok"), ("", "ok")] {
			assert!(
				matches!(check_header_syntax(name, value), Err(ConfigError::InvalidHeader { .. })),
				"{name:?}: {value:?} should be rejected."
			);
		}
	}

	#[test]
	fn body_preview_truncates_long_payloads() {
		let preview = OutboundResponse::new(500, "x".repeat(1_000)).body_preview();

		assert_eq!(preview.chars().count(), OutboundResponse::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}

	#[test]
	fn debug_hides_header_values() {
		let mut request = OutboundRequest::new(
			HttpMethod::Get,
			Url::parse("https://api.ebay.com/sell/inventory/v1/inventory_item")
				.expect("Fixture URL should parse."),
		);

		request.headers.push(("Authorization".into(), "Bearer secret-token".into()));

		let rendered = format!("{request:?}");

		assert!(rendered.contains("Authorization"));
		assert!(!rendered.contains("secret-token"));
		assert_eq!(request.header("authorization"), Some("Bearer secret-token"));
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn retry_after_accepts_delta_seconds() {
		let mut headers = HeaderMap::new();

		headers.insert(RETRY_AFTER, "7".parse().expect("Header fixture should parse."));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(7)));
	}
}
