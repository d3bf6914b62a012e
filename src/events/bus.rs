//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! # Delivery Contract
//!
//! - [`EventBus::publish`] persists the event through the store first and
//!   only then fans it out. A persistence failure is logged and the event is
//!   still delivered to live subscribers.
//! - Every subscriber reads from its own bounded window of `capacity` events.
//!   Publishing never waits for subscribers.
//! - **Drop-oldest**: a subscriber that falls more than `capacity` events
//!   behind loses its oldest undelivered events. The next
//!   [`Subscription::recv`] then yields a single [`Delivery::Overflow`]
//!   carrying the number of events lost, before resuming with the oldest
//!   event still retained. The count covers every lost event, including
//!   ones the subscriber's filter would have rejected.

use super::{Event, EventFilter};
use crate::store::Store;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error};

/// Default per-subscriber queue length.
pub const DEFAULT_CAPACITY: usize = 256;

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Event(Event),
    /// The subscriber fell behind and `dropped` events were discarded.
    Overflow { dropped: u64 },
}

pub struct EventBus {
    sender: broadcast::Sender<Event>,
    store: Arc<dyn Store>,
}

impl EventBus {
    pub fn new(store: Arc<dyn Store>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, store }
    }

    /// Persists `event`, then delivers it to every matching subscriber.
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.store.save_notification(&event).await {
            error!(kind = %event.kind, "Failed to persist event: {}", e);
        }

        // A send error only means nobody is subscribed right now.
        let receivers = self.sender.send(event).unwrap_or(0);
        debug!(receivers, "Published event");
    }

    pub async fn publish_all(&self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.publish(event).await;
        }
    }

    /// Starts receiving events published from now on.
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live feed of matching events; dropping it unsubscribes
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
    filter: EventFilter,
}

impl Subscription {
    /// Waits for the next matching event or overflow marker. Returns `None`
    /// once the bus has been dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<Delivery> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(Delivery::Event(event)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(dropped)) => {
                    return Some(Delivery::Overflow { dropped })
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv). Returns `None` when
    /// nothing matching is queued.
    pub fn try_recv(&mut self) -> Option<Delivery> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(Delivery::Event(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(dropped)) => {
                    return Some(Delivery::Overflow { dropped })
                }
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}
