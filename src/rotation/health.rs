//! Per-platform capacity and usage reports.

// self
use crate::{
	_prelude::*,
	config::BrokerConfig,
	key::{Credential, CredentialId, Platform},
	obs::{self, OpKind, OpOutcome},
	rotation::UsageTracker,
	store::CredentialFilter,
};

/// Coarse health classification of a platform's credential pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
	/// Usage below the warning threshold.
	Healthy,
	/// Usage between the warning and critical thresholds.
	Warning,
	/// Usage at or above the critical threshold.
	Critical,
	/// No active credential, or the store could not be read.
	Error,
}

/// Redacted view of one credential inside a [`HealthReport`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyHealth {
	/// Credential identifier.
	pub id: CredentialId,
	/// Display name.
	pub name: String,
	/// Short hash of the API key so operators can tell keys apart without seeing them.
	pub fingerprint: String,
	/// Daily call budget.
	pub daily_limit: u32,
	/// Calls recorded today.
	pub calls_used_today: u32,
	/// Calls left before the hard limit.
	pub remaining_calls: u32,
	/// Used share of the daily limit, in percent.
	pub usage_percent: f64,
	/// Manual enable flag.
	pub is_active: bool,
	/// Whether selection would currently pick this key.
	pub is_available: bool,
}
impl From<&Credential> for KeyHealth {
	fn from(credential: &Credential) -> Self {
		Self {
			id: credential.id.clone(),
			name: credential.name.clone(),
			fingerprint: credential.api_key.fingerprint(),
			daily_limit: credential.daily_limit,
			calls_used_today: credential.calls_used_today,
			remaining_calls: credential.remaining_calls(),
			usage_percent: credential.usage_percent(),
			is_active: credential.is_active,
			is_available: credential.is_available(),
		}
	}
}

/// Capacity and usage summary for one platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
	/// Platform the report covers.
	pub platform: Platform,
	/// Sum of daily limits over active credentials.
	pub total_capacity: u64,
	/// Calls left today over active credentials.
	pub remaining_calls: u64,
	/// Used share of `total_capacity`, in percent.
	pub usage_percent: f64,
	/// Classification derived from `usage_percent`.
	pub status: HealthStatus,
	/// Every credential on the platform, active or not.
	pub keys: Vec<KeyHealth>,
	/// Store failure that prevented a full report.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}
impl HealthReport {
	/// Builds a report from the platform's credentials.
	pub fn from_credentials(
		platform: Platform,
		credentials: &[Credential],
		config: &BrokerConfig,
	) -> Self {
		let (capacity, used) = credentials
			.iter()
			.filter(|credential| credential.is_active)
			.fold((0_u64, 0_u64), |(capacity, used), credential| {
				(
					capacity + u64::from(credential.daily_limit),
					used + u64::from(credential.calls_used_today.min(credential.daily_limit)),
				)
			});
		let usage_percent =
			if capacity == 0 { 0. } else { used as f64 / capacity as f64 * 100. };
		let status = if capacity == 0 {
			HealthStatus::Error
		} else if usage_percent < f64::from(config.health_warning_percent) {
			HealthStatus::Healthy
		} else if usage_percent < f64::from(config.health_critical_percent) {
			HealthStatus::Warning
		} else {
			HealthStatus::Critical
		};

		Self {
			platform,
			total_capacity: capacity,
			remaining_calls: capacity - used,
			usage_percent,
			status,
			keys: credentials.iter().map(KeyHealth::from).collect(),
			error: None,
		}
	}

	/// Report for a platform whose credentials could not be read.
	pub fn failed(platform: Platform, error: impl Display) -> Self {
		Self {
			platform,
			total_capacity: 0,
			remaining_calls: 0,
			usage_percent: 0.,
			status: HealthStatus::Error,
			keys: Vec::new(),
			error: Some(error.to_string()),
		}
	}
}

/// Resets stale counters, then reports the platform's pool. Never fails; store errors become
/// [`HealthStatus::Error`] reports.
pub async fn get_health_status(
	tracker: &UsageTracker,
	platform: Platform,
	config: &BrokerConfig,
) -> HealthReport {
	let span = obs::OpSpan::new(OpKind::Health, "get_health_status", platform.as_str());

	span.instrument(async {
		let read = async {
			tracker.reset_daily_counters_if_needed().await?;

			Ok::<_, Error>(tracker.store().list(platform, CredentialFilter::All).await?)
		};

		match read.await {
			Ok(credentials) => {
				obs::record_op_outcome(OpKind::Health, OpOutcome::Success);

				HealthReport::from_credentials(platform, &credentials, config)
			},
			Err(e) => {
				obs::record_op_outcome(OpKind::Health, OpOutcome::Failure);
				obs::warn_event(OpKind::Health, format_args!("health read for {platform} failed: {e}"));

				HealthReport::failed(platform, e)
			},
		}
	})
	.await
}
