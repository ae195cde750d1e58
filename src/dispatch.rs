//! Request dispatch with credential rotation and bounded retries.
//!
//! A [`RequestDispatcher`] serves one platform. Each attempt selects a credential through the
//! [`KeySelector`], sends the call through the adapter's auth scheme, and classifies the result:
//!
//! - 2xx: bump the usage counter, log, and return the payload.
//! - 429: mark the credential exhausted, then let [`RotateOnRateLimit`] decide.
//! - other failures: let [`RetryOnTransient`] decide, without rotating.
//!
//! No credential to select ends the request at once; after a 429 the replacement is chosen before
//! the backoff, so an emptied pool is reported without sleeping. Every path resolves to a
//! [`DispatchOutcome`]; `make_request` never returns an error.

mod metrics;
mod policy;

pub use metrics::*;
pub use policy::*;

// std
use std::time::Instant;
// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	config::BrokerConfig,
	error::{ConfigError, TransientError},
	http::{HttpMethod, MarketplaceHttpClient, OutboundRequest},
	key::{ApiSecret, Credential, CredentialId, Platform, UsageLogEntry, UserId},
	obs::{self, OpKind, OpOutcome},
	provider::{PlatformAdapter, Resource},
	rotation::{self, HealthReport, KeySelection, KeySelector, UsageTracker},
	store::CredentialStore,
};

/// Machine-readable reason attached to failed outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
	/// Active credentials exist but all are above the safety threshold.
	KeysExhausted,
	/// No active credential exists for the platform.
	NotConfigured,
	/// The marketplace kept answering HTTP 429.
	RateLimited,
	/// The marketplace answered with another non-2xx status.
	Upstream {
		/// Last HTTP status observed.
		status: u16,
	},
	/// No response arrived (network failure or timeout).
	Transport,
	/// The credential store could not be read.
	Storage,
	/// The request could not be built (unsupported platform, bad endpoint).
	Config,
}

/// Normalized result of a dispatched request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
	/// Whether a 2xx response was received.
	pub success: bool,
	/// Parsed response payload; `null` on failure.
	pub data: serde_json::Value,
	/// Human-readable failure description.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Duration of the successful call.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub response_time_ms: Option<u64>,
	/// Credential that served the successful call.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub credential_used: Option<CredentialId>,
	/// Machine-readable failure reason.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub failure: Option<FailureKind>,
	/// HTTP attempts made.
	pub attempts: u32,
}
impl DispatchOutcome {
	/// Successful outcome.
	pub fn succeeded(
		data: serde_json::Value,
		response_time_ms: u64,
		credential_used: CredentialId,
		attempts: u32,
	) -> Self {
		Self {
			success: true,
			data,
			error: None,
			response_time_ms: Some(response_time_ms),
			credential_used: Some(credential_used),
			failure: None,
			attempts,
		}
	}

	/// Failed outcome.
	pub fn failed(failure: FailureKind, error: impl Into<String>, attempts: u32) -> Self {
		Self {
			success: false,
			data: serde_json::Value::Null,
			error: Some(error.into()),
			response_time_ms: None,
			credential_used: None,
			failure: Some(failure),
			attempts,
		}
	}

	/// Decodes the payload into `T`, reporting the JSON path of the first mismatch.
	pub fn data_as<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		Ok(serde_path_to_error::deserialize(&self.data)?)
	}
}

/// One outbound call as requested by a caller.
#[derive(Clone, Debug)]
pub struct DispatchRequest {
	/// HTTP method.
	pub method: HttpMethod,
	/// Endpoint relative to the adapter base URL (query string allowed).
	pub endpoint: String,
	/// Optional JSON body.
	pub body: Option<serde_json::Value>,
	/// Extra headers sent after the auth headers.
	pub headers: Vec<(String, String)>,
	/// Seller access token of a connected account.
	pub access_token: Option<ApiSecret>,
	/// Overrides the configured attempt budget.
	pub max_attempts: Option<u32>,
}
impl DispatchRequest {
	/// Creates a request without body, headers, or token.
	pub fn new(method: HttpMethod, endpoint: impl Into<String>) -> Self {
		Self {
			method,
			endpoint: endpoint.into(),
			body: None,
			headers: Vec::new(),
			access_token: None,
			max_attempts: None,
		}
	}

	/// Shorthand for a `GET` request.
	pub fn get(endpoint: impl Into<String>) -> Self {
		Self::new(HttpMethod::Get, endpoint)
	}

	/// Attaches a JSON body.
	pub fn with_json(mut self, body: serde_json::Value) -> Self {
		self.body = Some(body);

		self
	}

	/// Adds an extra header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Acts on behalf of a connected account.
	pub fn with_access_token(mut self, token: ApiSecret) -> Self {
		self.access_token = Some(token);

		self
	}

	/// Overrides the attempt budget for this request.
	pub fn with_max_attempts(mut self, attempts: u32) -> Self {
		self.max_attempts = Some(attempts);

		self
	}
}

/// Sends requests for one platform, rotating credentials on rate limits.
pub struct RequestDispatcher {
	adapter: Arc<dyn PlatformAdapter>,
	selector: KeySelector,
	http_client: Arc<dyn MarketplaceHttpClient>,
	sleeper: Arc<dyn Sleeper>,
	plan: RetryPlan,
	config: BrokerConfig,
	metrics: Arc<DispatchMetrics>,
}
impl RequestDispatcher {
	/// Creates a dispatcher with the standard retry plan and the tokio sleeper.
	pub fn new(
		adapter: Arc<dyn PlatformAdapter>,
		store: Arc<dyn CredentialStore>,
		http_client: Arc<dyn MarketplaceHttpClient>,
		config: BrokerConfig,
	) -> Self {
		let platform = adapter.platform();
		let plan = RetryPlan::standard(Backoff::linear(config.backoff_base()));

		Self {
			adapter,
			selector: KeySelector::new(platform, UsageTracker::new(store)),
			http_client,
			sleeper: Arc::new(TokioSleeper),
			plan,
			config,
			metrics: Default::default(),
		}
	}

	/// Replaces the sleeper used between attempts.
	pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
		self.sleeper = sleeper;

		self
	}

	/// Replaces the retry plan.
	pub fn with_retry_plan(mut self, plan: RetryPlan) -> Self {
		self.plan = plan;

		self
	}

	/// Platform served by this dispatcher.
	pub fn platform(&self) -> Platform {
		self.adapter.platform()
	}

	/// Adapter used to shape requests.
	pub fn adapter(&self) -> &Arc<dyn PlatformAdapter> {
		&self.adapter
	}

	/// Credential selector for this platform.
	pub fn selector(&self) -> &KeySelector {
		&self.selector
	}

	/// Counters for this dispatcher.
	pub fn metrics(&self) -> &Arc<DispatchMetrics> {
		&self.metrics
	}

	/// Returns a credential with quota left, or why none could be chosen.
	pub async fn get_available_key(&self) -> Result<KeySelection> {
		self.selector.get_available_key().await
	}

	/// Capacity and usage report for this platform.
	pub async fn get_health_status(&self) -> HealthReport {
		rotation::get_health_status(self.selector.tracker(), self.platform(), &self.config).await
	}

	/// Fetches a logical resource for `shop`.
	pub async fn fetch_resource(
		&self,
		resource: Resource,
		shop: &str,
		access_token: Option<ApiSecret>,
		user_id: &UserId,
	) -> DispatchOutcome {
		let endpoint = match self.adapter.endpoint_for(resource, shop) {
			Ok(endpoint) => endpoint,
			Err(e) =>
				return self.record(DispatchOutcome::failed(FailureKind::Config, e.to_string(), 0)),
		};
		let mut request = DispatchRequest::get(endpoint);

		request.access_token = access_token;

		self.make_request(request, user_id).await
	}

	/// Sends `request`, rotating and retrying per the retry plan.
	pub async fn make_request(&self, request: DispatchRequest, user_id: &UserId) -> DispatchOutcome {
		let span = obs::OpSpan::new(OpKind::Dispatch, "make_request", self.platform().as_str());
		let outcome = span.instrument(self.run(request, user_id)).await;

		self.record(outcome)
	}

	fn record(&self, outcome: DispatchOutcome) -> DispatchOutcome {
		if outcome.success {
			self.metrics.record_success();
			obs::record_op_outcome(OpKind::Dispatch, OpOutcome::Success);
		} else {
			self.metrics.record_failure();
			obs::record_op_outcome(OpKind::Dispatch, OpOutcome::Failure);
		}

		outcome
	}

	// Auth headers built from stored credentials are not rechecked here; only caller input is.
	fn check_headers(&self, request: &DispatchRequest) -> Result<(), ConfigError> {
		for (name, value) in &request.headers {
			self.http_client.check_header(name, value)?;
		}
		if let Some(token) = &request.access_token {
			self.http_client.check_header("Authorization", token.expose())?;
		}

		Ok(())
	}

	async fn select(&self) -> Result<Credential, (FailureKind, String)> {
		let platform = self.platform();

		match self.selector.get_available_key().await {
			Ok(KeySelection::Available(credential)) => Ok(credential),
			Ok(KeySelection::Exhausted) => Err((
				FailureKind::KeysExhausted,
				format!("All {platform} API keys are exhausted for today."),
			)),
			Ok(KeySelection::NotConfigured) => Err((
				FailureKind::NotConfigured,
				format!("No active {platform} API keys are configured."),
			)),
			Err(e) => Err((FailureKind::Storage, e.to_string())),
		}
	}

	async fn run(&self, request: DispatchRequest, user_id: &UserId) -> DispatchOutcome {
		let platform = self.platform();
		let max_attempts = request.max_attempts.unwrap_or(self.config.max_attempts).max(1);
		let url = match self.adapter.resolve(&request.endpoint) {
			Ok(url) => url,
			Err(e) => return DispatchOutcome::failed(FailureKind::Config, e.to_string(), 0),
		};
		let body = match request.body.as_ref().map(serde_json::to_vec).transpose() {
			Ok(body) => body,
			Err(e) => return DispatchOutcome::failed(FailureKind::Config, e.to_string(), 0),
		};

		if let Err(e) = self.check_headers(&request) {
			return DispatchOutcome::failed(FailureKind::Config, e.to_string(), 0);
		}

		let tracker = self.selector.tracker();
		let mut last_failure = (FailureKind::Transport, String::new());
		let mut attempts = 0;

		for attempt in 0..max_attempts {
			let credential = match self.select().await {
				Ok(credential) => credential,
				Err((kind, message)) => return DispatchOutcome::failed(kind, message, attempts),
			};
			let mut outbound = OutboundRequest::new(request.method, url.clone());

			outbound.headers = self.adapter.auth_headers(&credential, request.access_token.as_ref());
			outbound.headers.extend(request.headers.iter().cloned());
			outbound.body = body.clone();
			outbound.timeout = Some(self.config.request_timeout());

			attempts += 1;
			self.metrics.record_attempt();
			obs::record_op_outcome(OpKind::Dispatch, OpOutcome::Attempt);

			let started = Instant::now();
			let result = self.http_client.execute(outbound).await;
			let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
			let entry = UsageLogEntry::new(
				credential.id.clone(),
				user_id.clone(),
				platform,
				request.endpoint.as_str(),
			)
			.with_response_time_ms(elapsed_ms);
			let failure = match result {
				Ok(response) if response.is_success() => {
					if let Err(e) = tracker.increment_usage(&credential.id).await {
						obs::warn_event(
							OpKind::Track,
							format_args!("usage increment for {} failed: {e}", credential.id),
						);
					}

					tracker.log_usage(entry.with_status(response.status())).await;

					return DispatchOutcome::succeeded(
						response.json(),
						elapsed_ms,
						credential.id,
						attempts,
					);
				},
				Ok(response) if response.is_rate_limited() => {
					let retry_after = response.metadata.retry_after;
					let error = TransientError::RateLimited { retry_after }.to_string();

					obs::warn_event(
						OpKind::Dispatch,
						format_args!("{} rate limited on attempt {}", credential.id, attempt + 1),
					);

					if let Err(e) = tracker.mark_exhausted(&credential.id, retry_after).await {
						obs::warn_event(
							OpKind::Track,
							format_args!("marking {} exhausted failed: {e}", credential.id),
						);
					}

					tracker.log_usage(entry.with_status(429).with_error(error.as_str())).await;

					(FailureKind::RateLimited, error)
				},
				Ok(response) => {
					let status = response.status();
					let error =
						TransientError::Upstream { status, message: response.body_preview() }
							.to_string();

					tracker.log_usage(entry.with_status(status).with_error(error.as_str())).await;

					(FailureKind::Upstream { status }, error)
				},
				Err(e) => {
					let error = Error::from(e).to_string();

					tracker.log_usage(entry.with_error(error.as_str())).await;

					(FailureKind::Transport, error)
				},
			};

			let decision = self.plan.decide(&failure.0, attempt, max_attempts);

			last_failure = failure;

			match decision {
				RetryDecision::Rotate(delay) => {
					// Look for a replacement first so an empty pool is reported without waiting.
					if let Err((kind, message)) = self.select().await {
						return DispatchOutcome::failed(kind, message, attempts);
					}

					self.metrics.record_rotation();
					obs::record_op_outcome(OpKind::Dispatch, OpOutcome::Rotation);
					self.sleeper.sleep(delay).await;
				},
				RetryDecision::Retry(delay) => {
					obs::debug_event(
						OpKind::Dispatch,
						format_args!(
							"retrying after {}ms: {}",
							delay.whole_milliseconds(),
							last_failure.1
						),
					);
					self.sleeper.sleep(delay).await;
				},
				RetryDecision::GiveUp => break,
			}
		}

		let (kind, message) = last_failure;

		DispatchOutcome::failed(
			kind,
			format!(
				"{platform} request to {} failed after {attempts} attempt(s): {message}",
				request.endpoint
			),
			attempts,
		)
	}
}
impl Debug for RequestDispatcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestDispatcher")
			.field("platform", &self.platform())
			.field("plan", &self.plan)
			.field("config", &self.config)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{RecordingSleeper, ScriptedHttpClient, credential, seeded_store, user},
		error::TransportError,
		http::OutboundResponse,
		provider::EbayAdapter,
		store::MemoryStore,
	};

	async fn setup(
		credentials: Vec<crate::key::Credential>,
		script: Vec<Result<OutboundResponse, TransportError>>,
	) -> (RequestDispatcher, MemoryStore, Arc<ScriptedHttpClient>, Arc<RecordingSleeper>) {
		let store = seeded_store(credentials).await;
		let http = Arc::new(ScriptedHttpClient::new(script));
		let sleeper = Arc::new(RecordingSleeper::default());
		let dispatcher = RequestDispatcher::new(
			Arc::new(EbayAdapter::default()),
			Arc::new(store.clone()),
			http.clone(),
			BrokerConfig::default(),
		)
		.with_sleeper(sleeper.clone());

		(dispatcher, store, http, sleeper)
	}

	#[tokio::test]
	async fn rate_limit_rotates_to_another_credential() {
		let (dispatcher, store, http, sleeper) = setup(
			vec![credential("first", Platform::Ebay, 0), credential("second", Platform::Ebay, 10)],
			vec![
				Ok(OutboundResponse::new(429, "slow down")),
				Ok(OutboundResponse::new(200, r#"{"total":3}"#)),
			],
		)
		.await;
		let request = DispatchRequest::get("/sell/fulfillment/v1/order");
		let outcome = dispatcher.make_request(request, &user()).await;

		assert!(outcome.success);
		assert_eq!(outcome.data, serde_json::json!({ "total": 3 }));
		assert_eq!(outcome.credential_used.as_deref(), Some("second"));
		assert_eq!(outcome.attempts, 2);

		let keys: Vec<String> = http
			.requests()
			.iter()
			.filter_map(|request| request.header("authorization").map(str::to_owned))
			.collect();

		assert_eq!(keys, ["Bearer first-key", "Bearer second-key"]);
		assert_eq!(sleeper.delays(), [Duration::seconds(1)]);
		assert_eq!(dispatcher.metrics().rotations(), 1);

		let first = store
			.fetch(&CredentialId::new("first").unwrap())
			.await
			.unwrap()
			.expect("First credential should exist.");
		let second = store
			.fetch(&CredentialId::new("second").unwrap())
			.await
			.unwrap()
			.expect("Second credential should exist.");

		assert_eq!(first.calls_used_today, first.daily_limit);
		assert_eq!(second.calls_used_today, 11);
		assert_eq!(store.usage_log().len(), 2);
	}

	#[tokio::test]
	async fn persistent_rate_limits_fail_after_budget() {
		let mut pool = Vec::new();

		for id in ["k1", "k2", "k3", "k4"] {
			pool.push(credential(id, Platform::Ebay, 0));
		}

		let (dispatcher, _, http, sleeper) = setup(
			pool,
			(0..4).map(|_| Ok(OutboundResponse::new(429, ""))).collect(),
		)
		.await;
		let outcome = dispatcher.make_request(DispatchRequest::get("/x"), &user()).await;

		assert!(!outcome.success);
		assert_eq!(outcome.failure, Some(FailureKind::RateLimited));
		assert_eq!(outcome.data, serde_json::Value::Null);
		assert_eq!(outcome.attempts, 3);
		assert_eq!(http.requests().len(), 3);
		assert_eq!(sleeper.delays(), [Duration::seconds(1), Duration::seconds(2)]);
	}

	#[tokio::test]
	async fn rate_limit_on_last_key_reports_exhaustion_without_backoff() {
		let (dispatcher, store, http, sleeper) = setup(
			vec![credential("only", Platform::Ebay, 0)],
			vec![Ok(OutboundResponse::new(429, "slow down"))],
		)
		.await;
		let outcome = dispatcher.make_request(DispatchRequest::get("/x"), &user()).await;

		assert_eq!(outcome.failure, Some(FailureKind::KeysExhausted));
		assert_eq!(outcome.attempts, 1);
		assert_eq!(http.requests().len(), 1);
		assert!(sleeper.delays().is_empty());
		assert_eq!(dispatcher.metrics().rotations(), 0);
		assert_eq!(store.usage_log().len(), 1);
	}

	#[tokio::test]
	async fn missing_credentials_fail_without_http() {
		let (dispatcher, _, http, sleeper) = setup(Vec::new(), Vec::new()).await;
		let outcome = dispatcher.make_request(DispatchRequest::get("/x"), &user()).await;

		assert_eq!(outcome.failure, Some(FailureKind::NotConfigured));
		assert_eq!(outcome.attempts, 0);
		assert!(http.requests().is_empty());
		assert!(sleeper.delays().is_empty());

		let (dispatcher, _, http, _) =
			setup(vec![credential("full", Platform::Ebay, 95)], Vec::new()).await;
		let outcome = dispatcher.make_request(DispatchRequest::get("/x"), &user()).await;

		assert_eq!(outcome.failure, Some(FailureKind::KeysExhausted));
		assert!(http.requests().is_empty());
	}

	#[tokio::test]
	async fn transient_errors_retry_with_same_credential() {
		let (dispatcher, store, http, sleeper) = setup(
			vec![credential("solo", Platform::Ebay, 0), credential("spare", Platform::Ebay, 50)],
			vec![
				Ok(OutboundResponse::new(503, "maintenance")),
				Err(TransportError::Timeout),
				Ok(OutboundResponse::new(200, "")),
			],
		)
		.await;
		let outcome = dispatcher.make_request(DispatchRequest::get("/x"), &user()).await;

		assert!(outcome.success);
		assert_eq!(outcome.data, serde_json::Value::Null);
		assert_eq!(outcome.credential_used.as_deref(), Some("solo"));
		assert!(
			http.requests().iter().all(|request| request.header("authorization")
				== Some("Bearer solo-key"))
		);
		assert_eq!(sleeper.delays(), [Duration::seconds(1), Duration::seconds(2)]);
		assert_eq!(dispatcher.metrics().rotations(), 0);

		let log = store.usage_log();

		assert_eq!(log.len(), 3);
		assert_eq!(log[0].status, Some(503));
		assert_eq!(log[1].status, None);
		assert!(log[2].is_success());
	}

	#[tokio::test]
	async fn request_shape_carries_timeout_body_and_headers() {
		let (dispatcher, _, http, _) = setup(
			vec![credential("solo", Platform::Ebay, 0)],
			vec![Ok(OutboundResponse::new(201, r#"{"id":"item-9"}"#))],
		)
		.await;
		let request = DispatchRequest::new(HttpMethod::Post, "/sell/inventory/v1/inventory_item")
			.with_json(serde_json::json!({ "sku": "mug-01" }))
			.with_header("Content-Language", "en-US")
			.with_access_token(ApiSecret::new("seller-oauth"));
		let outcome = dispatcher.make_request(request, &user()).await;

		#[derive(Debug, Deserialize)]
		struct Created {
			id: String,
		}

		assert_eq!(outcome.data_as::<Created>().expect("Payload should decode.").id, "item-9");

		let sent = &http.requests()[0];

		assert_eq!(sent.method, HttpMethod::Post);
		assert_eq!(sent.url.as_str(), "https://api.ebay.com/sell/inventory/v1/inventory_item");
		assert_eq!(sent.header("authorization"), Some("Bearer seller-oauth"));
		assert_eq!(sent.header("content-language"), Some("en-US"));
		assert_eq!(sent.timeout, Some(std::time::Duration::from_secs(30)));
		assert_eq!(sent.body.as_deref(), Some(br#"{"sku":"mug-01"}"#.as_slice()));
	}

	#[tokio::test]
	async fn malformed_caller_headers_fail_before_any_attempt() {
		let (dispatcher, store, http, sleeper) =
			setup(vec![credential("solo", Platform::Ebay, 0)], Vec::new()).await;
		let bad_value = DispatchRequest::get("/x").with_header("X-Bad", "a\nb");
		let outcome = dispatcher.make_request(bad_value, &user()).await;

		assert_eq!(outcome.failure, Some(FailureKind::Config));
		assert_eq!(outcome.attempts, 0);
		assert!(outcome.error.as_deref().is_some_and(|e| e.contains("X-Bad")));
		assert!(!outcome.error.as_deref().is_some_and(|e| e.contains("a\nb")));

		let bad_name = DispatchRequest::get("/x").with_header("X Bad", "ok");
		let bad_token = DispatchRequest::get("/x").with_access_token(ApiSecret::new("tok\r\nen"));

		for request in [bad_name, bad_token] {
			let outcome = dispatcher.make_request(request, &user()).await;

			assert_eq!(outcome.failure, Some(FailureKind::Config));
		}

		assert!(http.requests().is_empty());
		assert!(sleeper.delays().is_empty());
		assert!(store.usage_log().is_empty());
		assert_eq!(dispatcher.metrics().failures(), 3);
	}

	#[test]
	fn outcome_serializes_camel_case() {
		let outcome = DispatchOutcome::succeeded(
			serde_json::json!([]),
			12,
			CredentialId::new("etsy-1").unwrap(),
			1,
		);
		let json = serde_json::to_value(&outcome).expect("Outcome should serialize.");

		assert_eq!(json["responseTimeMs"], 12);
		assert_eq!(json["credentialUsed"], "etsy-1");
		assert!(json.get("error").is_none());

		let failed = serde_json::to_value(DispatchOutcome::failed(
			FailureKind::Upstream { status: 500 },
			"boom",
			3,
		))
		.expect("Outcome should serialize.");

		assert_eq!(failed["failure"], serde_json::json!({ "kind": "upstream", "status": 500 }));
	}
}
