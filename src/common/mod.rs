//! Common utilities shared by the authentication stack.
//!
//! Concurrency primitives for collapsing duplicate asynchronous work, and the
//! retry helper used by network transports.

pub mod dedup;
pub mod keyed;
pub mod retry;

// Re-export common types for easier access
pub use dedup::{AsyncDeduplicator, SharedFetch};
pub use keyed::{fetch_keyed, KeyedDeduplicator};
pub use retry::with_retry;
