//! Event fan-out.
//!
//! The hub keeps one rendezvous channel per subscriber. Each event is handed
//! to every current subscriber concurrently, and the next event waits until
//! all of them have taken it, so the slowest subscriber sets the pace.
//! Subscribers that join late see no history. Once the connection's stream
//! ends, every current and future subscriber observes the terminal error.
//!
//! [`EventHub::pump`] holds one event at a time: it takes the next event from
//! the connection only after every subscriber has taken the current one. The
//! socket reader is therefore at most one event ahead of the slowest
//! subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info};

use uw_core::error::{UwError, UwResult};
use uw_socket::handoff::{self, HandoffReceiver, HandoffSender};
use uw_socket::{ConnectionState, EventStream, InboundEvent, StreamEnd};

#[derive(Default)]
struct Registry {
    subscribers: HashMap<u64, HandoffSender<InboundEvent>>,
    terminal: Option<StreamEnd>,
}

struct Inner {
    registry: Mutex<Registry>,
    next_id: AtomicU64,
    finished: watch::Sender<bool>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            registry: Mutex::default(),
            next_id: AtomicU64::new(0),
            finished: watch::channel(false).0,
        }
    }
}

impl Inner {
    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn terminal_error(&self) -> UwError {
        self.registry()
            .terminal
            .clone()
            .unwrap_or(StreamEnd::Closed)
            .to_error()
    }
}

/// Registry of event subscribers. Cheap to clone; clones share subscribers.
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<Inner>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. It receives every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = handoff::channel();

        let mut registry = self.inner.registry();
        if registry.terminal.is_none() {
            registry.subscribers.insert(id, tx);
        }
        debug!("subscriber {id} registered ({} total)", registry.subscribers.len());

        Subscription {
            id,
            rx,
            hub: self.inner.clone(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry().subscribers.len()
    }

    /// Whether the stream behind this hub has ended.
    pub fn is_finished(&self) -> bool {
        self.inner.registry().terminal.is_some()
    }

    /// Hand `event` to every current subscriber and wait until all have
    /// taken it. Subscribers that went away are dropped from the registry.
    /// Returns how many subscribers took the event.
    pub async fn publish(&self, event: InboundEvent) -> usize {
        let targets: Vec<(u64, HandoffSender<InboundEvent>)> = self
            .inner
            .registry()
            .subscribers
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let results = join_all(targets.into_iter().map(|(id, tx)| {
            let event = event.clone();
            async move { (id, tx.send(event).await.is_ok()) }
        }))
        .await;

        let gone: Vec<u64> = results
            .iter()
            .filter(|(_, delivered)| !delivered)
            .map(|(id, _)| *id)
            .collect();
        if !gone.is_empty() {
            let mut registry = self.inner.registry();
            for id in &gone {
                registry.subscribers.remove(id);
            }
        }

        results.len() - gone.len()
    }

    /// End the hub. Every subscriber sees `end` as its terminal error, and
    /// an event still waiting in a publish is never handed out.
    pub fn finish(&self, end: StreamEnd) {
        {
            let mut registry = self.inner.registry();
            if registry.terminal.is_some() {
                return;
            }
            info!(
                "event hub finished ({} subscribers): {end:?}",
                registry.subscribers.len()
            );
            registry.terminal = Some(end);
            registry.subscribers.clear();
        }
        self.inner.finished.send_replace(true);
    }

    /// Forward `stream` into the hub until it ends.
    ///
    /// A publish still waiting on a slow subscriber is abandoned once the
    /// connection reaches a terminal state.
    pub async fn pump(self, mut stream: EventStream, mut states: watch::Receiver<ConnectionState>) {
        loop {
            let event = match stream.recv().await {
                Ok(event) => event,
                Err(_) => break,
            };
            tokio::select! {
                _ = terminal(&mut states) => {
                    debug!("connection ended during publish; dropping event");
                    break;
                }
                _ = self.publish(event) => {}
            }
        }
        self.finish(stream.end_reason());
    }
}

async fn terminal(states: &mut watch::Receiver<ConnectionState>) {
    let _ = states.wait_for(|s| s.is_terminal()).await.map(|_| ());
}

async fn done(finished: &mut watch::Receiver<bool>) {
    let _ = finished.wait_for(|done| *done).await.map(|_| ());
}

/// One subscriber's view of the event stream.
pub struct Subscription {
    id: u64,
    rx: HandoffReceiver<InboundEvent>,
    hub: Arc<Inner>,
}

impl Subscription {
    /// Next event, or the terminal error once the stream has ended.
    pub async fn recv(&mut self) -> UwResult<InboundEvent> {
        let mut finished = self.hub.finished.subscribe();
        tokio::select! {
            biased;
            _ = done(&mut finished) => {}
            event = self.rx.recv() => {
                if let Some(event) = event {
                    return Ok(event);
                }
            }
        }
        Err(self.hub.terminal_error())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.registry().subscribers.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn vote(value: i32) -> InboundEvent {
        InboundEvent::VoteCast {
            user_id: "u1".into(),
            value,
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_every_event() {
        let hub = EventHub::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move {
                let first = hub.publish(vote(1)).await;
                let second = hub.publish(vote(-1)).await;
                (first, second)
            })
        };

        assert_eq!(a.recv().await.unwrap(), vote(1));
        assert_eq!(b.recv().await.unwrap(), vote(1));
        assert_eq!(b.recv().await.unwrap(), vote(-1));
        assert_eq!(a.recv().await.unwrap(), vote(-1));
        assert_eq!(publisher.await.unwrap(), (2, 2));
    }

    #[tokio::test]
    async fn test_slowest_subscriber_sets_the_pace() {
        let hub = EventHub::new();
        let mut fast = hub.subscribe();
        let _slow = hub.subscribe();

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.publish(vote(1)).await })
        };
        assert_eq!(fast.recv().await.unwrap(), vote(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!publisher.is_finished());
        publisher.abort();
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let hub = EventHub::new();
        let mut kept = hub.subscribe();
        let dropped = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);
        drop(dropped);
        assert_eq!(hub.subscriber_count(), 1);

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.publish(vote(1)).await })
        };
        assert_eq!(kept.recv().await.unwrap(), vote(1));
        assert_eq!(publisher.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let hub = EventHub::new();
        assert_eq!(hub.publish(vote(1)).await, 0);
    }

    #[tokio::test]
    async fn test_finish_withdraws_event_waiting_in_publish() {
        let hub = EventHub::new();
        let mut sub = hub.subscribe();

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.publish(vote(1)).await })
        };
        // Let the publish park its event in the subscriber's slot.
        tokio::time::sleep(Duration::from_millis(20)).await;

        hub.finish(StreamEnd::Closed);
        assert!(matches!(sub.recv().await, Err(UwError::Closed)));
        assert!(matches!(sub.recv().await, Err(UwError::Closed)));
        publisher.abort();
    }

    #[tokio::test]
    async fn test_finish_reaches_current_and_late_subscribers() {
        let hub = EventHub::new();
        let mut early = hub.subscribe();

        hub.finish(StreamEnd::Failed("reset".into()));
        hub.finish(StreamEnd::Closed);
        assert!(hub.is_finished());

        let mut late = hub.subscribe();
        for sub in [&mut early, &mut late] {
            match timeout(Duration::from_secs(1), sub.recv()).await.unwrap() {
                Err(UwError::Transport(reason)) => assert_eq!(reason, "reset"),
                other => panic!("expected transport error, got {other:?}"),
            }
        }
        assert_eq!(hub.subscriber_count(), 0);
    }
}
