#![allow(clippy::result_large_err)]
//! # esfeed Core
//!
//! Client for event stores that publish their streams as HTTP Atom feeds.
//!
//! ## Architecture
//!
//! - **Feed Client**: pooled HTTP transport, status mapping, gzip, retries
//! - **Slice Reader**: forward and backward pages with continuation numbers
//! - **Event Cursor**: buffered forward iteration with restart positioning
//! - **Catch-Up Subscription**: scheduled or manual delivery of new events
//! - **Telemetry**: structured logging and read-time histograms

pub mod config;
pub mod cursor;
pub mod error;
pub mod feed;
pub mod model;
pub mod store;
pub mod subscription;
pub mod telemetry;

pub use error::{BoxError, ErrorCode, ErrorSeverity, FeedError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{ClientConfig, Config, RetryConfig, SubscriptionConfig};
    pub use crate::cursor::EventCursor;
    pub use crate::error::{BoxError, ErrorCode, ErrorSeverity, FeedError, Result};
    pub use crate::feed::{FeedClient, SliceReader};
    pub use crate::model::{Event, EventEnvelope, Position, Slice};
    pub use crate::store::EventStoreClient;
    pub use crate::subscription::{
        default_error_handler, CatchUpSubscription, ErrorHandler, EventHandler, SubscriptionState,
    };
}
