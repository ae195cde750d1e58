#![cfg(feature = "test")]

// self
use quota_broker::{
	_preludet::*,
	aggregate::MarketplaceHub,
	error::TransportError,
	http::OutboundResponse,
	key::{CredentialId, Platform},
	provider::ProviderRegistry,
	rotation::{HealthStatus, KeySelection},
	store::{CredentialStore, MemoryStore},
};

fn id(value: &str) -> CredentialId {
	CredentialId::new(value).expect("Failed to build credential identifier for rotation tests.")
}

fn hub(store: MemoryStore, script: Vec<Result<OutboundResponse, TransportError>>) -> MarketplaceHub {
	MarketplaceHub::new(
		Arc::new(store),
		ProviderRegistry::builtin(),
		Arc::new(ScriptedHttpClient::new(script)),
	)
	.with_sleeper(Arc::new(RecordingSleeper::default()))
}

#[tokio::test]
async fn selection_honours_the_safety_buffer() {
	let store = seeded_store(vec![
		credential("etsy-89", Platform::Etsy, 89),
		credential("etsy-90", Platform::Etsy, 90),
	])
	.await;
	let hub = hub(store.clone(), Vec::new());
	let picked = hub
		.get_available_key(Platform::Etsy)
		.await
		.expect("Selection should succeed.")
		.into_credential()
		.expect("The 89% key is still below the buffer.");

	assert_eq!(picked.id, id("etsy-89"));

	hub.tracker().mark_exhausted(&id("etsy-89"), None).await.expect("Marking should succeed.");

	assert!(matches!(
		hub.get_available_key(Platform::Etsy).await.expect("Selection should succeed."),
		KeySelection::Exhausted
	));
	assert!(matches!(
		hub.get_available_key(Platform::Amazon).await.expect("Selection should succeed."),
		KeySelection::NotConfigured
	));
}

#[tokio::test]
async fn disabled_keys_are_skipped_and_can_return() {
	let store = seeded_store(vec![
		credential("ebay-a", Platform::Ebay, 0),
		credential("ebay-b", Platform::Ebay, 50),
	])
	.await;
	let hub = hub(store, Vec::new());
	let tracker = hub.tracker();

	tracker.set_active(&id("ebay-a"), false, "suspected leak").await.expect("Disable should succeed.");

	let picked = hub
		.get_available_key(Platform::Ebay)
		.await
		.expect("Selection should succeed.")
		.into_credential()
		.expect("The second key should be selected.");

	assert_eq!(picked.id, id("ebay-b"));

	let restored = tracker
		.set_active(&id("ebay-a"), true, "rotated upstream")
		.await
		.expect("Enable should succeed.")
		.expect("Credential should exist.");

	assert!(restored.notes.contains("Disabled: suspected leak"));
	assert!(restored.notes.contains("Enabled: rotated upstream"));
}

#[tokio::test]
async fn successful_calls_move_health_towards_critical() {
	let store = seeded_store(vec![credential("amz-1", Platform::Amazon, 68)]).await;
	let script = (0..2).map(|_| Ok(OutboundResponse::new(200, "{}"))).collect();
	let hub = hub(store, script);

	assert_eq!(hub.get_health_status(Platform::Amazon).await.status, HealthStatus::Healthy);

	for _ in 0..2 {
		let outcome = hub
			.make_request(
				Platform::Amazon,
				quota_broker::dispatch::DispatchRequest::get("/sellers/v1/marketplaceParticipations"),
				&user(),
			)
			.await;

		assert!(outcome.success);
	}

	let report = hub.get_health_status(Platform::Amazon).await;

	assert_eq!(report.status, HealthStatus::Warning);
	assert_eq!(report.remaining_calls, 30);
	assert_eq!(report.keys[0].calls_used_today, 70);
	assert_eq!(hub.get_health_status(Platform::Etsy).await.status, HealthStatus::Error);

	let all = hub.get_all_health_status().await;

	assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn yesterdays_usage_is_forgotten() {
	let mut stale = credential("etsy-1", Platform::Etsy, 100);

	stale.last_reset_at = stale.last_reset_at.previous_day().expect("Date has a predecessor.");

	let store = seeded_store(vec![stale]).await;
	let hub = hub(store.clone(), Vec::new());

	assert!(hub.get_available_key(Platform::Etsy).await.expect("Selection should succeed.").is_available());

	let refreshed = store
		.fetch(&id("etsy-1"))
		.await
		.expect("Fetch should succeed.")
		.expect("Credential should exist.");

	assert_eq!(refreshed.calls_used_today, 0);
}
