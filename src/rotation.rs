//! Credential rotation: selection, usage tracking, and health reporting.
//!
//! A [`KeySelector`] is scoped to one platform and owns the sticky choice for it. Every
//! selection first runs the [`UsageTracker`] daily reset so counters are never judged against a
//! previous day's budget. Health reports reuse the same reset and read path.

pub mod health;
pub mod selector;
pub mod tracker;

pub use health::*;
pub use selector::*;
pub use tracker::*;

// crates.io
use time::Date;
// self
use crate::_prelude::*;

/// Current UTC calendar date, the boundary used for daily counter resets.
pub fn today_utc() -> Date {
	OffsetDateTime::now_utc().date()
}
