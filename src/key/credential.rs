//! Pooled marketplace credential records, quota helpers, and builders.

// crates.io
use time::Date;
// self
use crate::{
	_prelude::*,
	key::{CredentialId, Platform, secret::ApiSecret},
};

/// Share of the daily limit (in percent) a credential may consume before selection skips it.
pub const SAFETY_THRESHOLD_PERCENT: u64 = 90;

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no API key was provided.
	#[error("API key is required.")]
	MissingApiKey,
	/// Issued when the daily limit is zero.
	#[error("Daily limit must be positive.")]
	ZeroDailyLimit,
}

/// One rate-limited marketplace API key tracked with a daily call budget.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
	/// Unique identifier.
	pub id: CredentialId,
	/// Marketplace the key belongs to.
	pub platform: Platform,
	/// Human-readable display name.
	pub name: String,
	/// Application key sent to the marketplace.
	pub api_key: ApiSecret,
	/// Secondary partner secret for platforms that require one.
	pub api_secret: Option<ApiSecret>,
	/// Maximum number of calls the marketplace allows per day.
	pub daily_limit: u32,
	/// Calls recorded since `last_reset_at`.
	pub calls_used_today: u32,
	/// Manually disabled credentials are never selected.
	pub is_active: bool,
	/// UTC date of the last counter reset.
	pub last_reset_at: Date,
	/// Newline-separated audit trail of rotation and disable events.
	pub notes: String,
}
impl Credential {
	/// Returns a builder for a credential on the provided platform.
	pub fn builder(id: CredentialId, platform: Platform) -> CredentialBuilder {
		CredentialBuilder::new(id, platform)
	}

	/// Returns `true` while usage stays strictly below the safety threshold.
	pub fn has_quota(&self) -> bool {
		u64::from(self.calls_used_today) * 100
			< u64::from(self.daily_limit) * SAFETY_THRESHOLD_PERCENT
	}

	/// Returns `true` if the credential is active and below the safety threshold.
	pub fn is_available(&self) -> bool {
		self.is_active && self.has_quota()
	}

	/// Returns `true` once the counter reached the daily limit.
	pub fn is_exhausted(&self) -> bool {
		self.calls_used_today >= self.daily_limit
	}

	/// Calls left before the hard daily limit.
	pub fn remaining_calls(&self) -> u32 {
		self.daily_limit.saturating_sub(self.calls_used_today)
	}

	/// Usage relative to the daily limit, in percent.
	pub fn usage_percent(&self) -> f64 {
		if self.daily_limit == 0 {
			return 100.;
		}

		f64::from(self.calls_used_today) / f64::from(self.daily_limit) * 100.
	}

	/// Returns `true` if the counters belong to a day before `today`.
	pub fn needs_reset(&self, today: Date) -> bool {
		self.last_reset_at < today
	}

	/// Zeroes the counter when it belongs to a previous day. Returns whether a reset happened.
	pub fn reset_if_stale(&mut self, today: Date) -> bool {
		if !self.needs_reset(today) {
			return false;
		}

		self.calls_used_today = 0;
		self.last_reset_at = today;

		true
	}

	/// Forces the counter to the daily limit and records why.
	pub fn mark_exhausted(&mut self, note: &str) {
		self.calls_used_today = self.daily_limit;
		self.append_note(note);
	}

	/// Appends a line to the audit trail.
	pub fn append_note(&mut self, note: &str) {
		if !self.notes.is_empty() {
			self.notes.push('\n');
		}

		self.notes.push_str(note);
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("id", &self.id)
			.field("platform", &self.platform)
			.field("name", &self.name)
			.field("api_key", &"<redacted>")
			.field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
			.field("daily_limit", &self.daily_limit)
			.field("calls_used_today", &self.calls_used_today)
			.field("is_active", &self.is_active)
			.field("last_reset_at", &self.last_reset_at)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialBuilder {
	id: CredentialId,
	platform: Platform,
	name: Option<String>,
	api_key: Option<ApiSecret>,
	api_secret: Option<ApiSecret>,
	daily_limit: u32,
	calls_used_today: u32,
	is_active: bool,
	last_reset_at: Option<Date>,
}
impl CredentialBuilder {
	const DEFAULT_DAILY_LIMIT: u32 = 10_000;

	fn new(id: CredentialId, platform: Platform) -> Self {
		Self {
			id,
			platform,
			name: None,
			api_key: None,
			api_secret: None,
			daily_limit: Self::DEFAULT_DAILY_LIMIT,
			calls_used_today: 0,
			is_active: true,
			last_reset_at: None,
		}
	}

	/// Sets the display name (defaults to the identifier).
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());

		self
	}

	/// Provides the API key value.
	pub fn api_key(mut self, key: impl Into<String>) -> Self {
		self.api_key = Some(ApiSecret::new(key));

		self
	}

	/// Provides the partner secret value.
	pub fn api_secret(mut self, secret: impl Into<String>) -> Self {
		self.api_secret = Some(ApiSecret::new(secret));

		self
	}

	/// Sets the daily call limit (defaults to 10 000).
	pub fn daily_limit(mut self, limit: u32) -> Self {
		self.daily_limit = limit;

		self
	}

	/// Seeds the usage counter.
	pub fn calls_used_today(mut self, calls: u32) -> Self {
		self.calls_used_today = calls;

		self
	}

	/// Overrides the active flag.
	pub fn active(mut self, active: bool) -> Self {
		self.is_active = active;

		self
	}

	/// Sets the date of the last counter reset (defaults to today in UTC).
	pub fn last_reset_at(mut self, date: Date) -> Self {
		self.last_reset_at = Some(date);

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let api_key = self.api_key.ok_or(CredentialBuilderError::MissingApiKey)?;

		if self.daily_limit == 0 {
			return Err(CredentialBuilderError::ZeroDailyLimit);
		}

		Ok(Credential {
			name: self.name.unwrap_or_else(|| self.id.to_string()),
			id: self.id,
			platform: self.platform,
			api_key,
			api_secret: self.api_secret,
			daily_limit: self.daily_limit,
			calls_used_today: self.calls_used_today,
			is_active: self.is_active,
			last_reset_at: self.last_reset_at.unwrap_or_else(|| OffsetDateTime::now_utc().date()),
			notes: String::new(),
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn credential(limit: u32, used: u32) -> Credential {
		Credential::builder(
			CredentialId::new("etsy-a").expect("Credential fixture should be valid."),
			Platform::Etsy,
		)
		.api_key("key-a")
		.daily_limit(limit)
		.calls_used_today(used)
		.last_reset_at(macros::date!(2025 - 01 - 01))
		.build()
		.expect("Credential builder should succeed for quota tests.")
	}

	#[test]
	fn safety_threshold_is_exclusive_at_ninety_percent() {
		assert!(credential(100, 89).has_quota());
		assert!(!credential(100, 90).has_quota());
		assert!(!credential(100, 95).has_quota());
		assert!(credential(10, 8).has_quota());
		assert!(!credential(10, 9).has_quota());
	}

	#[test]
	fn inactive_credentials_are_never_available() {
		let mut record = credential(100, 0);

		assert!(record.is_available());

		record.is_active = false;

		assert!(!record.is_available());
	}

	#[test]
	fn reset_only_touches_stale_counters() {
		let mut record = credential(100, 50);

		assert!(!record.reset_if_stale(macros::date!(2025 - 01 - 01)));
		assert_eq!(record.calls_used_today, 50);
		assert!(record.reset_if_stale(macros::date!(2025 - 01 - 02)));
		assert_eq!(record.calls_used_today, 0);
		assert_eq!(record.last_reset_at, macros::date!(2025 - 01 - 02));
	}

	#[test]
	fn mark_exhausted_overrides_local_count() {
		let mut record = credential(500, 3);

		record.mark_exhausted("first");
		record.mark_exhausted("second");

		assert_eq!(record.calls_used_today, 500);
		assert!(record.is_exhausted());
		assert_eq!(record.remaining_calls(), 0);
		assert_eq!(record.notes, "first\nsecond");
	}

	#[test]
	fn builder_validates_inputs() {
		let id = CredentialId::new("ebay-a").expect("Credential fixture should be valid.");
		let err = Credential::builder(id.clone(), Platform::Ebay)
			.build()
			.expect_err("Builder should require an API key.");

		assert_eq!(err, CredentialBuilderError::MissingApiKey);

		let err = Credential::builder(id, Platform::Ebay)
			.api_key("k")
			.daily_limit(0)
			.build()
			.expect_err("Builder should reject a zero daily limit.");

		assert_eq!(err, CredentialBuilderError::ZeroDailyLimit);
	}

	#[test]
	fn debug_redacts_secrets() {
		let rendered = format!("{:?}", credential(10, 0));

		assert!(rendered.contains("<redacted>"));
		assert!(!rendered.contains("key-a"));
	}
}
