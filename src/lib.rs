//! Multi-key quota broker for marketplace APIs: pooled credentials, least-used rotation on 429s,
//! daily usage accounting, and multi-shop fan-out behind one explicit hub.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod aggregate;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod key;
pub mod obs;
pub mod provider;
pub mod rotation;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// std
	use std::collections::VecDeque;
	// self
	#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
	use crate::{
		dispatch::{SleepFuture, Sleeper},
		error::TransportError,
		http::{HttpFuture, MarketplaceHttpClient, OutboundRequest, OutboundResponse},
		key::{Credential, CredentialId, Platform, UserId},
		provider::{AmazonAdapter, EbayAdapter, EtsyAdapter, ProviderRegistry},
		rotation,
		store::{CredentialStore, MemoryStore},
	};

	/// Transport that replays a fixed script of responses and records every request.
	///
	/// Once the script runs dry it answers HTTP 500 so a test that sends too many requests fails
	/// loudly instead of hanging.
	#[derive(Default)]
	pub struct ScriptedHttpClient {
		script: Mutex<VecDeque<Result<OutboundResponse, TransportError>>>,
		requests: Mutex<Vec<OutboundRequest>>,
	}
	impl ScriptedHttpClient {
		/// Creates a client that answers with `script` in order.
		pub fn new(script: Vec<Result<OutboundResponse, TransportError>>) -> Self {
			Self { script: Mutex::new(script.into()), requests: Mutex::default() }
		}

		/// Requests received so far, in order.
		pub fn requests(&self) -> Vec<OutboundRequest> {
			self.requests.lock().clone()
		}
	}
	impl MarketplaceHttpClient for ScriptedHttpClient {
		fn execute(&self, request: OutboundRequest) -> HttpFuture<'_> {
			self.requests.lock().push(request);

			let next = self
				.script
				.lock()
				.pop_front()
				.unwrap_or_else(|| Ok(OutboundResponse::new(500, "script exhausted")));

			Box::pin(async move { next })
		}
	}

	/// [`Sleeper`] that returns at once and remembers every requested delay.
	#[derive(Debug, Default)]
	pub struct RecordingSleeper {
		delays: Mutex<Vec<Duration>>,
	}
	impl RecordingSleeper {
		/// Delays requested so far, in order.
		pub fn delays(&self) -> Vec<Duration> {
			self.delays.lock().clone()
		}
	}
	impl Sleeper for RecordingSleeper {
		fn sleep(&self, delay: Duration) -> SleepFuture<'_> {
			self.delays.lock().push(delay);

			Box::pin(async {})
		}
	}

	/// Credential `id` with key `<id>-key`, a limit of 100 calls, and `used` calls today.
	pub fn credential(id: &str, platform: Platform, used: u32) -> Credential {
		Credential::builder(
			CredentialId::new(id).expect("Credential fixture id should be valid."),
			platform,
		)
		.name(format!("{platform} {id}"))
		.api_key(format!("{id}-key"))
		.daily_limit(100)
		.calls_used_today(used)
		.last_reset_at(rotation::today_utc())
		.build()
		.expect("Credential fixture should build.")
	}

	/// Acting user shared by tests.
	pub fn user() -> UserId {
		UserId::new("seller-1").expect("User fixture id should be valid.")
	}

	/// Memory store holding `credentials`.
	pub async fn seeded_store(credentials: Vec<Credential>) -> MemoryStore {
		let store = MemoryStore::default();

		for credential in credentials {
			store.save(credential).await.expect("Memory store save should succeed.");
		}

		store
	}

	/// Registry with every built-in adapter pointed at `base` (usually an `httpmock` server).
	pub fn mock_registry(base: &str) -> ProviderRegistry {
		let base = Url::parse(base).expect("Mock base URL should parse.");

		ProviderRegistry::default()
			.register(
				EtsyAdapter::default()
					.with_base_url(base.clone())
					.expect("Mock base URL should be accepted."),
			)
			.register(
				EbayAdapter::default()
					.with_base_url(base.clone())
					.expect("Mock base URL should be accepted."),
			)
			.register(
				AmazonAdapter::default().with_base_url(base).expect("Mock base URL should be accepted."),
			)
	}

	/// Reqwest transport with a short timeout for tests against `httpmock`.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.timeout(std::time::Duration::from_secs(5))
			.build()
			.expect("Failed to build Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}
}

mod _prelude {
	pub use std::{
		collections::HashMap,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
