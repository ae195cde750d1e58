//! Multi-platform fan-out and cross-marketplace statistics.
//!
//! [`MarketplaceHub`] is the application-wide registry: construct it once at startup and share
//! it. It owns the store, adapters, transport, and one lazily created [`RequestDispatcher`] per
//! platform, so every caller sees the same sticky selection and counters.

// crates.io
use futures::future;
// self
use crate::{
	_prelude::*,
	config::BrokerConfig,
	dispatch::{DispatchOutcome, DispatchRequest, FailureKind, RequestDispatcher, Sleeper},
	http::MarketplaceHttpClient,
	key::{ApiSecret, Platform, UserId},
	obs::{self, OpKind, OpOutcome},
	provider::{ProviderRegistry, Resource},
	rotation::{self, HealthReport, KeySelection, UsageTracker},
	store::CredentialStore,
};
#[cfg(feature = "reqwest")] use crate::{error::ConfigError, http::ReqwestHttpClient};

/// A seller's marketplace connection, supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ConnectedAccount {
	/// Marketplace of the account.
	pub platform: Platform,
	/// Shop or seller name used in endpoint paths.
	pub shop_name: String,
	/// OAuth access token issued to the seller.
	pub access_token: ApiSecret,
}
impl ConnectedAccount {
	/// Creates an account record.
	pub fn new(
		platform: Platform,
		shop_name: impl Into<String>,
		access_token: impl Into<String>,
	) -> Self {
		Self { platform, shop_name: shop_name.into(), access_token: ApiSecret::new(access_token) }
	}
}

/// One account's outcome in a fan-out, tagged with where it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResult {
	/// Marketplace of the account.
	pub platform: Platform,
	/// Shop or seller name.
	pub shop_name: String,
	/// Dispatch result for this account.
	#[serde(flatten)]
	pub outcome: DispatchOutcome,
}
impl AccountResult {
	/// Whether the account's call succeeded.
	pub fn success(&self) -> bool {
		self.outcome.success
	}
}

/// Per-account line of [`PlatformStats`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSummary {
	/// Marketplace of the account.
	pub platform: Platform,
	/// Shop or seller name.
	pub shop_name: String,
	/// Whether the account contributed to the totals.
	pub success: bool,
	/// Failure description for accounts left out of the totals.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

/// Totals over every successful account plus a visible count of the failed ones.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
	/// Sum of `products.len()`.
	pub total_products: u64,
	/// Sum of `total_revenue`.
	pub total_revenue: f64,
	/// Sum of `orders.len()`.
	pub total_orders: u64,
	/// Sum of `pending_orders`.
	pub pending_orders: u64,
	/// Accounts whose results are missing from the totals.
	pub failed_platforms: usize,
	/// Every account in input order.
	pub platforms: Vec<PlatformSummary>,
}

/// Sums the numeric fields of every successful result.
///
/// Reads `products` and `orders` as arrays (their lengths count), `total_revenue` and
/// `pending_orders` as numbers. Missing or mistyped fields contribute zero. Failed accounts
/// contribute nothing to the sums and are counted in `failed_platforms`.
pub fn aggregate_stats(results: &[AccountResult]) -> PlatformStats {
	let mut stats = PlatformStats::default();

	for result in results {
		stats.platforms.push(PlatformSummary {
			platform: result.platform,
			shop_name: result.shop_name.clone(),
			success: result.success(),
			error: result.outcome.error.clone(),
		});

		if !result.success() {
			stats.failed_platforms += 1;

			continue;
		}

		let data = &result.outcome.data;

		stats.total_products += array_len(data, "products");
		stats.total_revenue += number(data, "total_revenue");
		stats.total_orders += array_len(data, "orders");
		stats.pending_orders += number(data, "pending_orders").max(0.) as u64;
	}

	stats
}

fn array_len(data: &serde_json::Value, field: &str) -> u64 {
	data.get(field).and_then(serde_json::Value::as_array).map_or(0, |items| items.len() as u64)
}

fn number(data: &serde_json::Value, field: &str) -> f64 {
	match data.get(field) {
		Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.),
		// Some marketplaces send money as decimal strings.
		Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.),
		_ => 0.,
	}
}

/// Application-wide entry point for credential rotation and marketplace calls.
pub struct MarketplaceHub {
	store: Arc<dyn CredentialStore>,
	registry: ProviderRegistry,
	http_client: Arc<dyn MarketplaceHttpClient>,
	sleeper: Option<Arc<dyn Sleeper>>,
	config: BrokerConfig,
	dispatchers: Mutex<HashMap<Platform, Arc<RequestDispatcher>>>,
}
impl MarketplaceHub {
	/// Creates a hub over the given store, adapters, and transport.
	pub fn new(
		store: Arc<dyn CredentialStore>,
		registry: ProviderRegistry,
		http_client: Arc<dyn MarketplaceHttpClient>,
	) -> Self {
		Self {
			store,
			registry,
			http_client,
			sleeper: None,
			config: BrokerConfig::default(),
			dispatchers: Mutex::new(HashMap::new()),
		}
	}

	/// Creates a hub with a fresh reqwest client.
	#[cfg(feature = "reqwest")]
	pub fn with_reqwest(store: Arc<dyn CredentialStore>, registry: ProviderRegistry) -> Result<Self> {
		let client = ReqwestClient::builder().build().map_err(ConfigError::from)?;

		Ok(Self::new(store, registry, Arc::new(ReqwestHttpClient::with_client(client))))
	}

	/// Replaces the configuration. Dispatchers created earlier keep their settings.
	pub fn with_config(mut self, config: BrokerConfig) -> Self {
		self.config = config;

		self
	}

	/// Replaces the sleeper handed to new dispatchers.
	pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
		self.sleeper = Some(sleeper);

		self
	}

	/// Active configuration.
	pub fn config(&self) -> &BrokerConfig {
		&self.config
	}

	/// Tracker over the shared store, for manual enable/disable and resets.
	pub fn tracker(&self) -> UsageTracker {
		UsageTracker::new(self.store.clone())
	}

	/// Returns the platform's dispatcher, creating it on first use.
	pub fn dispatcher(&self, platform: Platform) -> Result<Arc<RequestDispatcher>> {
		let mut dispatchers = self.dispatchers.lock();

		if let Some(dispatcher) = dispatchers.get(&platform) {
			return Ok(dispatcher.clone());
		}

		let mut dispatcher = RequestDispatcher::new(
			self.registry.get(platform)?,
			self.store.clone(),
			self.http_client.clone(),
			self.config.clone(),
		);

		if let Some(sleeper) = &self.sleeper {
			dispatcher = dispatcher.with_sleeper(sleeper.clone());
		}

		let dispatcher = Arc::new(dispatcher);

		dispatchers.insert(platform, dispatcher.clone());

		Ok(dispatcher)
	}

	/// Returns a credential with quota left on `platform`, or why none could be chosen.
	pub async fn get_available_key(&self, platform: Platform) -> Result<KeySelection> {
		self.dispatcher(platform)?.get_available_key().await
	}

	/// Sends `request` to `platform`. Never fails; problems become a failed outcome.
	pub async fn make_request(
		&self,
		platform: Platform,
		request: DispatchRequest,
		user_id: &UserId,
	) -> DispatchOutcome {
		match self.dispatcher(platform) {
			Ok(dispatcher) => dispatcher.make_request(request, user_id).await,
			Err(e) => DispatchOutcome::failed(FailureKind::Config, e.to_string(), 0),
		}
	}

	/// Capacity and usage report for `platform`.
	pub async fn get_health_status(&self, platform: Platform) -> HealthReport {
		rotation::get_health_status(&self.tracker(), platform, &self.config).await
	}

	/// Health reports for every platform with a registered adapter.
	pub async fn get_all_health_status(&self) -> Vec<HealthReport> {
		future::join_all(
			self.registry.platforms().into_iter().map(|platform| self.get_health_status(platform)),
		)
		.await
	}

	/// Requests `resource` from every account concurrently.
	///
	/// Results keep the input order. One account failing never affects the others.
	pub async fn fetch_from_all_platforms(
		&self,
		accounts: &[ConnectedAccount],
		resource: Resource,
		user_id: &UserId,
	) -> Vec<AccountResult> {
		let span = obs::OpSpan::new(OpKind::Aggregate, "fetch_from_all_platforms", "all");

		obs::record_op_outcome(OpKind::Aggregate, OpOutcome::Attempt);

		let results = span
			.instrument(future::join_all(
				accounts.iter().map(|account| self.fetch_account(account, resource, user_id)),
			))
			.await;
		let failed = results.iter().filter(|result| !result.success()).count();

		if failed > 0 {
			obs::warn_event(
				OpKind::Aggregate,
				format_args!("{failed} of {} account(s) failed for {resource}", results.len()),
			);
			obs::record_op_outcome(OpKind::Aggregate, OpOutcome::Failure);
		} else {
			obs::record_op_outcome(OpKind::Aggregate, OpOutcome::Success);
		}

		results
	}

	async fn fetch_account(
		&self,
		account: &ConnectedAccount,
		resource: Resource,
		user_id: &UserId,
	) -> AccountResult {
		let outcome = match self.dispatcher(account.platform) {
			Ok(dispatcher) =>
				dispatcher
					.fetch_resource(
						resource,
						&account.shop_name,
						Some(account.access_token.clone()),
						user_id,
					)
					.await,
			Err(e) => DispatchOutcome::failed(FailureKind::Config, e.to_string(), 0),
		};

		AccountResult { platform: account.platform, shop_name: account.shop_name.clone(), outcome }
	}
}
impl Debug for MarketplaceHub {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let mut live: Vec<Platform> = self.dispatchers.lock().keys().copied().collect();

		live.sort_by_key(|platform| platform.as_str());

		f.debug_struct("MarketplaceHub")
			.field("registry", &self.registry)
			.field("config", &self.config)
			.field("dispatchers", &live)
			.finish()
	}
}
