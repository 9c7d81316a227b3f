use super::glob::glob_match;
use super::{PublishOutcome, PubSub, Subscription};
use crate::error::{FirError, FirResult};
use async_trait::async_trait;
use fir_protocol::PublishedEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

/// Capacity of each subscriber's inbound channel. A slow subscriber fills
/// its own channel and the delivery task sent to it simply waits -- it never
/// blocks delivery to any other subscriber.
const SUBSCRIBER_BUFFER: usize = 256;

#[derive(Debug)]
struct SubscriberHandle {
    id: u64,
    tx: mpsc::Sender<PublishedEvent>,
}

type Registry = Arc<RwLock<HashMap<String, Vec<SubscriberHandle>>>>;

/// In-memory pub/sub backend. One delivery task is spawned per subscriber on
/// every publish, so a slow receiver never serializes the publisher against
/// other subscribers of the same channel -- the isolation is the point, not
/// an accident of implementation.
#[derive(Clone, Default)]
pub struct InMemoryPubSub {
    channels: Registry,
    next_id: Arc<AtomicU64>,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PubSub for InMemoryPubSub {
    async fn publish(&self, channel: &str, event: PublishedEvent) -> FirResult<PublishOutcome> {
        if channel.is_empty() {
            return Err(FirError::EmptyChannel);
        }
        let subscribers = {
            let guard = self.channels.read().expect("pubsub registry poisoned");
            match guard.get(channel) {
                Some(subs) if !subs.is_empty() => subs
                    .iter()
                    .map(|s| s.tx.clone())
                    .collect::<Vec<_>>(),
                _ => return Ok(PublishOutcome::NoSubscribers),
            }
        };
        for tx in subscribers {
            let event = event.clone();
            tokio::spawn(async move {
                let _ = tx.send(event).await;
            });
        }
        Ok(PublishOutcome::Delivered)
    }

    async fn subscribe(&self, channel: &str) -> FirResult<Box<dyn Subscription>> {
        if channel.is_empty() {
            return Err(FirError::EmptyChannel);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.channels
            .write()
            .expect("pubsub registry poisoned")
            .entry(channel.to_owned())
            .or_default()
            .push(SubscriberHandle { id, tx });
        Ok(Box::new(MemorySubscription {
            id,
            channel: channel.to_owned(),
            rx,
            registry: self.channels.clone(),
            closed: false,
        }))
    }

    async fn has_subscribers(&self, pattern: &str) -> bool {
        let guard = self.channels.read().expect("pubsub registry poisoned");
        guard
            .iter()
            .any(|(channel, subs)| !subs.is_empty() && glob_match(pattern, channel))
    }
}

#[derive(Debug)]
struct MemorySubscription {
    id: u64,
    channel: String,
    rx: mpsc::Receiver<PublishedEvent>,
    registry: Registry,
    closed: bool,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn recv(&mut self) -> Option<PublishedEvent> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();
        if let Ok(mut guard) = self.registry.write() {
            if let Some(subs) = guard.get_mut(&self.channel) {
                subs.retain(|s| s.id != self.id);
            }
        }
    }
}

impl Drop for MemorySubscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fir_protocol::EventState;

    fn sample_event(id: &str) -> PublishedEvent {
        PublishedEvent {
            id: id.to_owned(),
            state: EventState::Ok,
            session_id: None,
            element_key: None,
            target: None,
            data: serde_json::json!({}),
            state_payload: None,
            field_errors: Default::default(),
        }
    }

    #[tokio::test]
    async fn publish_to_empty_channel_returns_no_subscribers_sentinel() {
        let bus = InMemoryPubSub::new();
        let outcome = bus.publish("room:1", sample_event("update")).await.unwrap();
        assert_eq!(outcome, PublishOutcome::NoSubscribers);
    }

    #[tokio::test]
    async fn publish_rejects_empty_channel_name() {
        let bus = InMemoryPubSub::new();
        let err = bus.publish("", sample_event("update")).await.unwrap_err();
        assert!(matches!(err, FirError::EmptyChannel));
        let err = bus.subscribe("").await.unwrap_err();
        assert!(matches!(err, FirError::EmptyChannel));
    }

    #[tokio::test]
    async fn two_subscribers_on_one_channel_each_receive_every_publish() {
        let bus = InMemoryPubSub::new();
        let mut sub1 = bus.subscribe("room:1").await.unwrap();
        let mut sub2 = bus.subscribe("room:1").await.unwrap();

        bus.publish("room:1", sample_event("a")).await.unwrap();
        bus.publish("room:1", sample_event("b")).await.unwrap();

        assert_eq!(sub1.recv().await.unwrap().id, "a");
        assert_eq!(sub1.recv().await.unwrap().id, "b");
        assert_eq!(sub2.recv().await.unwrap().id, "a");
        assert_eq!(sub2.recv().await.unwrap().id, "b");
    }

    #[tokio::test]
    async fn closing_a_subscription_is_idempotent_and_unblocks_recv() {
        let bus = InMemoryPubSub::new();
        let mut sub = bus.subscribe("room:1").await.unwrap();
        sub.close();
        sub.close();
        assert!(sub.recv().await.is_none());
        assert!(!bus.has_subscribers("room:*").await);
    }

    #[tokio::test]
    async fn has_subscribers_matches_glob_pattern_over_channel_names() {
        let bus = InMemoryPubSub::new();
        let _sub = bus.subscribe("sess-1:route-a").await.unwrap();
        assert!(bus.has_subscribers("sess-1:*").await);
        assert!(bus.has_subscribers("*:route-a").await);
        assert!(!bus.has_subscribers("sess-2:*").await);
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_delivery_to_others() {
        let bus = InMemoryPubSub::new();
        // sub1's channel capacity is small relative to bursts but each
        // delivery runs on its own task, so filling it doesn't stall sub2.
        let mut sub1 = bus.subscribe("room:1").await.unwrap();
        let mut sub2 = bus.subscribe("room:1").await.unwrap();

        for i in 0..300 {
            bus.publish("room:1", sample_event(&format!("evt-{i}")))
                .await
                .unwrap();
        }

        // sub2 drains promptly even though sub1 never reads.
        let got = tokio::time::timeout(std::time::Duration::from_secs(2), sub2.recv())
            .await
            .expect("sub2 should not be starved by sub1's backlog");
        assert_eq!(got.unwrap().id, "evt-0");
        drop(sub1);
    }
}
