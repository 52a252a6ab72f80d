//! Atom-feed access: transport, paging and wire helpers.

pub mod client;
pub(crate) mod payload;
pub mod reader;
pub mod retry;

pub use client::{FeedClient, ATOM_JSON, EVENTS_JSON, LONG_POLL_HEADER};
pub use reader::SliceReader;
pub use retry::{RetryPolicy, TransportFailure};
