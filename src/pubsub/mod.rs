//! C1: topic-scoped broadcast of `PublishedEvent`s to local subscribers.
//!
//! The contract is backend-agnostic: the in-memory implementation
//! (`memory::InMemoryPubSub`) is what every test and the default `Route`
//! configuration uses; an external broker backend is any other type
//! implementing `PubSub`, forwarding payloads as opaque JSON and delegating
//! pattern matching to its own facility.

mod glob;
pub mod memory;

pub use glob::glob_match;
pub use memory::InMemoryPubSub;

use crate::error::FirResult;
use async_trait::async_trait;
use fir_protocol::PublishedEvent;

/// Outcome of a publish: the in-memory backend distinguishes "delivered to
/// at least one subscriber" from "no one was listening" without treating
/// the latter as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    NoSubscribers,
}

/// A live subscription to one channel. Exactly one socket session owns each
/// subscription; `close` is idempotent and unblocks any pending `recv`.
#[async_trait]
pub trait Subscription: Send + std::fmt::Debug {
    async fn recv(&mut self) -> Option<PublishedEvent>;
    fn close(&mut self);
}

/// The pub/sub bus contract.
#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, channel: &str, event: PublishedEvent) -> FirResult<PublishOutcome>;
    async fn subscribe(&self, channel: &str) -> FirResult<Box<dyn Subscription>>;
    async fn has_subscribers(&self, pattern: &str) -> bool;
}
