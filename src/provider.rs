//! Marketplace adapters (behavior) and their registry.
//!
//! `adapter` defines [`PlatformAdapter`], the hook dispatchers use to resolve endpoints and
//! build per-platform authentication headers. `etsy`, `ebay`, and `amazon` hold the built-in
//! implementations, and `registry` maps each [`Platform`](crate::key::Platform) to one adapter.

pub mod adapter;
pub mod amazon;
pub mod ebay;
pub mod etsy;
pub mod registry;

pub use adapter::{PlatformAdapter, Resource, bearer_header, shop_segment};
pub use amazon::AmazonAdapter;
pub use ebay::EbayAdapter;
pub use etsy::EtsyAdapter;
pub use registry::ProviderRegistry;
