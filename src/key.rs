//! Key-domain identifiers, platforms, credential records, and usage log entries.

pub mod credential;
pub mod id;
pub mod platform;
pub mod secret;
pub mod usage;

pub use credential::*;
pub use id::*;
pub use platform::*;
pub use secret::*;
pub use usage::*;
