//! Demonstrates the hub against a local mock marketplace: one key gets throttled and rotated out,
//! orders are fanned out over two shops, and the resulting stats and health report are printed.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use quota_broker::{
	aggregate::{ConnectedAccount, MarketplaceHub, aggregate_stats},
	key::{Credential, CredentialId, Platform, UserId},
	provider::{EbayAdapter, EtsyAdapter, ProviderRegistry, Resource},
	store::{CredentialStore, MemoryStore},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let base = Url::parse(&server.base_url())?;
	let store = Arc::new(MemoryStore::default());

	for (id, platform, key) in [
		("etsy-1", Platform::Etsy, "etsy-app-1"),
		("etsy-2", Platform::Etsy, "etsy-app-2"),
		("ebay-1", Platform::Ebay, "ebay-app-1"),
	] {
		let credential = Credential::builder(CredentialId::new(id)?, platform)
			.name(id)
			.api_key(key)
			.daily_limit(5_000)
			.build()?;

		store.save(credential).await?;
	}

	server
		.mock_async(|when, then| {
			when.method(GET).header("x-api-key", "etsy-app-1");
			then.status(429).header("retry-after", "60");
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/v3/application/shops/craftcorner/receipts");
			then.status(200).body("{\"orders\":[{\"receipt_id\":1},{\"receipt_id\":2}],\"pending_orders\":1}");
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(GET).path("/sell/fulfillment/v1/order");
			then.status(200).body("{\"orders\":[{\"orderId\":\"07-1\"}],\"total_revenue\":42.5}");
		})
		.await;

	let registry = ProviderRegistry::default()
		.register(EtsyAdapter::default().with_base_url(base.clone())?)
		.register(EbayAdapter::default().with_base_url(base)?);
	let hub = MarketplaceHub::with_reqwest(store.clone(), registry)?;
	let accounts = [
		ConnectedAccount::new(Platform::Etsy, "craftcorner", "seller-etsy-token"),
		ConnectedAccount::new(Platform::Ebay, "vintage-finds", "seller-ebay-token"),
	];
	let results =
		hub.fetch_from_all_platforms(&accounts, Resource::Orders, &UserId::new("demo-seller")?).await;

	println!("{}", serde_json::to_string_pretty(&results)?);
	println!("{}", serde_json::to_string_pretty(&aggregate_stats(&results))?);
	println!("{}", serde_json::to_string_pretty(&hub.get_health_status(Platform::Etsy).await)?);

	Ok(())
}
