//! Client side of snitchr: store access, the realtime feed and the
//! optimistic list controller, plus geocoding and export helpers.

pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod feed;
pub mod geocoding;
pub mod http;
pub mod memory;
pub mod store;

pub use config::ClientConfig;
pub use controller::{ControllerConfig, ListController, ListEvent};
pub use error::{ClientError, StoreError};
pub use feed::{FeedEvent, FeedSubscription, WsFeed};
pub use http::HttpStore;
pub use memory::MemoryStore;
pub use store::{ConfessionStore, Page};
