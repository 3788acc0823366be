//! # Notifications
//!
//! Multicast observer built on bounded `crossbeam` channels.
//!
//! ```text
//!              ┌──────────────┐
//!   emit(e) ──>│   Notifier   │──> Subscription #1 (first subscribed)
//!              │              │──> Subscription #2
//!              └──────────────┘──> ...
//! ```
//!
//! - Delivery order is subscription order.
//! - Dispatch walks a snapshot of the subscriber list, so unsubscribing while
//!   a dispatch is in flight cannot disturb it.
//! - Dropping a [`Subscription`] unsubscribes it; it is pruned before the next dispatch.
//! - A full subscriber channel evicts its OLDEST pending notification.

use std::sync::{Arc, Weak};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Handle identifying one subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Notifier-side record of a subscriber.
struct Subscriber<E> {
    id: SubscriptionId,
    sender: Sender<E>,
    /// Second receiver end, used only to evict the oldest entry when full.
    evictor: Receiver<E>,
    /// Dead once the subscription is dropped.
    alive: Weak<()>,
}

impl<E> Clone for Subscriber<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            sender: self.sender.clone(),
            evictor: self.evictor.clone(),
            alive: self.alive.clone(),
        }
    }
}

/// Outcome of one dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscribers that received the notification.
    pub delivered: usize,
    /// Older notifications evicted to make room.
    pub evicted: usize,
}

/// Multicast notifier for events of type `E`.
pub struct Notifier<E: Clone> {
    subscribers: Vec<Subscriber<E>>,
    next_id: u64,
    capacity: usize,
}

impl<E: Clone> Notifier<E> {
    /// Creates a notifier whose subscribers buffer up to `capacity` pending events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            next_id: 0,
            capacity: capacity.max(1),
        }
    }

    /// Adds a subscriber at the end of the delivery order.
    pub fn subscribe(&mut self) -> Subscription<E> {
        let (sender, receiver) = bounded(self.capacity);
        let token = Arc::new(());
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;

        self.subscribers.push(Subscriber {
            id,
            sender,
            evictor: receiver.clone(),
            alive: Arc::downgrade(&token),
        });

        Subscription {
            id,
            receiver,
            _token: token,
        }
    }

    /// Removes a subscriber. Returns false if it was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|s| s.alive.strong_count() > 0)
            .count()
    }

    /// Delivers `event` to every live subscriber in subscription order.
    pub fn emit(&mut self, event: &E) -> DispatchReport {
        self.subscribers.retain(|s| s.alive.strong_count() > 0);

        let snapshot = self.subscribers.clone();
        let mut report = DispatchReport::default();

        for subscriber in &snapshot {
            let mut pending = event.clone();
            loop {
                match subscriber.sender.try_send(pending) {
                    Ok(()) => {
                        report.delivered += 1;
                        break;
                    }
                    Err(TrySendError::Full(rejected)) => {
                        // Make room by dropping the oldest pending notification
                        if subscriber.evictor.try_recv().is_err() {
                            break;
                        }
                        report.evicted += 1;
                        pending = rejected;
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        }

        report
    }
}

/// Receiving end of a subscription. Dropping it unsubscribes.
pub struct Subscription<E> {
    id: SubscriptionId,
    receiver: Receiver<E>,
    _token: Arc<()>,
}

impl<E> Subscription<E> {
    /// Identifier usable with [`Notifier::unsubscribe`].
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Takes the oldest pending notification, if any.
    #[inline]
    pub fn try_recv(&self) -> Option<E> {
        self.receiver.try_recv().ok()
    }

    /// Takes every pending notification, oldest first.
    pub fn drain(&self) -> Vec<E> {
        self.receiver.try_iter().collect()
    }

    /// Number of pending notifications.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.receiver.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_in_subscription_order() {
        let mut notifier = Notifier::new(8);
        let first = notifier.subscribe();
        let second = notifier.subscribe();

        let report = notifier.emit(&1u32);
        notifier.emit(&2u32);

        assert_eq!(report.delivered, 2);
        assert!(first.id() < second.id());
        assert_eq!(first.drain(), vec![1, 2]);
        assert_eq!(second.drain(), vec![1, 2]);
    }

    #[test]
    fn test_dropped_subscription_is_pruned() {
        let mut notifier = Notifier::new(8);
        let keep = notifier.subscribe();
        let gone = notifier.subscribe();
        drop(gone);

        let report = notifier.emit(&7u32);

        assert_eq!(report.delivered, 1);
        assert_eq!(notifier.subscriber_count(), 1);
        assert_eq!(keep.try_recv(), Some(7));
    }

    #[test]
    fn test_unsubscribe() {
        let mut notifier = Notifier::new(8);
        let a = notifier.subscribe();
        let b = notifier.subscribe();

        assert!(notifier.unsubscribe(a.id()));
        assert!(!notifier.unsubscribe(a.id()));

        notifier.emit(&3u32);
        assert_eq!(a.pending(), 0);
        assert_eq!(b.pending(), 1);
    }

    #[test]
    fn test_full_channel_evicts_oldest() {
        let mut notifier = Notifier::new(2);
        let sub = notifier.subscribe();

        notifier.emit(&1u32);
        notifier.emit(&2u32);
        let report = notifier.emit(&3u32);

        assert_eq!(report.evicted, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(sub.drain(), vec![2, 3]);
    }
}
