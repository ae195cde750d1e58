//! Append-only usage log entries.

// self
use crate::{
	_prelude::*,
	key::{CredentialId, Platform, UserId},
};

/// One outbound marketplace call as seen by the broker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UsageLogEntry {
	/// Credential that authenticated the call.
	pub credential_id: CredentialId,
	/// User on whose behalf the call was made.
	pub user_id: UserId,
	/// Target marketplace.
	pub platform: Platform,
	/// Relative endpoint path.
	pub endpoint: String,
	/// HTTP status, absent when the call failed before a response arrived.
	pub status: Option<u16>,
	/// Wall-clock duration of the call.
	pub response_time_ms: u64,
	/// Failure description for unsuccessful calls.
	pub error: Option<String>,
	/// When the entry was recorded.
	#[serde(with = "time::serde::rfc3339")]
	pub recorded_at: OffsetDateTime,
}
impl UsageLogEntry {
	/// Creates an entry stamped with the current UTC instant.
	pub fn new(
		credential_id: CredentialId,
		user_id: UserId,
		platform: Platform,
		endpoint: impl Into<String>,
	) -> Self {
		Self {
			credential_id,
			user_id,
			platform,
			endpoint: endpoint.into(),
			status: None,
			response_time_ms: 0,
			error: None,
			recorded_at: OffsetDateTime::now_utc(),
		}
	}

	/// Records the HTTP status.
	pub fn with_status(mut self, status: u16) -> Self {
		self.status = Some(status);

		self
	}

	/// Records the call duration.
	pub fn with_response_time_ms(mut self, millis: u64) -> Self {
		self.response_time_ms = millis;

		self
	}

	/// Records a failure description.
	pub fn with_error(mut self, error: impl Into<String>) -> Self {
		self.error = Some(error.into());

		self
	}

	/// Returns `true` for entries describing a 2xx response.
	pub fn is_success(&self) -> bool {
		matches!(self.status, Some(200..=299)) && self.error.is_none()
	}
}
