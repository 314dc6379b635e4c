//! A registry of observers that are notified when a ledger changes.
//!
//! Observers register a callback for one half of a ledger, either the
//! aggregate or the transaction log, and get back a [Subscription] handle.
//! Stores publish to the broker after every mutation. The broker never holds
//! its own lock while running callbacks, so a callback may unsubscribe itself.
//!
//! Stores hold [SubscriptionBroker::hold_publication] from the start of a
//! mutation until its subscribers have been notified, and release their own
//! data lock before publishing. Callbacks may therefore read the store, but
//! must not change it or subscribe to it.

use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use crate::{aggregation::MonthAggregate, month::LedgerKey, transaction::Transaction};

/// Called with the latest totals of a ledger.
pub type AggregateCallback = Arc<dyn Fn(&MonthAggregate) + Send + Sync>;

/// Called with the latest transaction log of a ledger, newest first.
pub type TransactionsCallback = Arc<dyn Fn(&[Transaction]) + Send + Sync>;

type SubscriptionId = u64;

#[derive(Default)]
struct Listeners {
    aggregate: Vec<(SubscriptionId, AggregateCallback)>,
    transactions: Vec<(SubscriptionId, TransactionsCallback)>,
}

impl Listeners {
    fn is_empty(&self) -> bool {
        self.aggregate.is_empty() && self.transactions.is_empty()
    }
}

#[derive(Default)]
struct Registry {
    next_id: SubscriptionId,
    listeners: HashMap<LedgerKey, Listeners>,
}

impl Registry {
    fn issue_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        self.next_id
    }

    fn remove(&mut self, key: &LedgerKey, id: SubscriptionId) {
        let Some(listeners) = self.listeners.get_mut(key) else {
            return;
        };

        listeners.aggregate.retain(|(candidate, _)| *candidate != id);
        listeners.transactions.retain(|(candidate, _)| *candidate != id);

        if listeners.is_empty() {
            self.listeners.remove(key);
        }
    }
}

/// Keeps track of who is watching which ledger.
///
/// Cloning the broker is cheap and every clone shares the same registry.
#[derive(Clone, Default)]
pub struct SubscriptionBroker {
    registry: Arc<Mutex<Registry>>,
    publication: Arc<Mutex<()>>,
}

impl std::fmt::Debug for SubscriptionBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.lock();

        f.debug_struct("SubscriptionBroker")
            .field("ledgers", &registry.listeners.len())
            .finish()
    }
}

impl SubscriptionBroker {
    /// Create a broker with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    // Callbacks never run while the registry is locked, so a poisoned lock
    // still holds a consistent registry.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serialize publication: while the guard is held no other mutation can
    /// notify subscribers, so notifications arrive in the order the changes
    /// were made.
    ///
    /// A callback that panicked while the guard was held leaves nothing
    /// inconsistent behind, so a poisoned lock is recovered.
    pub fn hold_publication(&self) -> MutexGuard<'_, ()> {
        self.publication
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `on_change` to be called whenever the totals of `key` change.
    ///
    /// The callback is not called with the current totals, that is up to the
    /// store that owns the ledger.
    pub fn register_aggregate(
        &self,
        key: &LedgerKey,
        on_change: AggregateCallback,
    ) -> Subscription {
        let mut registry = self.lock();
        let id = registry.issue_id();
        registry
            .listeners
            .entry(key.clone())
            .or_default()
            .aggregate
            .push((id, on_change));

        self.subscription(key, id)
    }

    /// Register `on_change` to be called whenever the transaction log of `key` changes.
    ///
    /// The callback is not called with the current log, that is up to the
    /// store that owns the ledger.
    pub fn register_transactions(
        &self,
        key: &LedgerKey,
        on_change: TransactionsCallback,
    ) -> Subscription {
        let mut registry = self.lock();
        let id = registry.issue_id();
        registry
            .listeners
            .entry(key.clone())
            .or_default()
            .transactions
            .push((id, on_change));

        self.subscription(key, id)
    }

    fn subscription(&self, key: &LedgerKey, id: SubscriptionId) -> Subscription {
        Subscription {
            registry: Arc::downgrade(&self.registry),
            key: key.clone(),
            id,
        }
    }

    /// Notify the aggregate subscribers of `key`.
    pub fn publish_aggregate(&self, key: &LedgerKey, aggregate: &MonthAggregate) {
        let callbacks: Vec<AggregateCallback> = match self.lock().listeners.get(key) {
            Some(listeners) => listeners
                .aggregate
                .iter()
                .map(|(_, callback)| callback.clone())
                .collect(),
            None => return,
        };

        tracing::trace!(
            "Notifying {} aggregate subscriber(s) of {key}",
            callbacks.len()
        );

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(aggregate))).is_err() {
                tracing::error!("An aggregate subscriber of {key} panicked");
            }
        }
    }

    /// Notify the transaction log subscribers of `key`.
    pub fn publish_transactions(&self, key: &LedgerKey, transactions: &[Transaction]) {
        let callbacks: Vec<TransactionsCallback> = match self.lock().listeners.get(key) {
            Some(listeners) => listeners
                .transactions
                .iter()
                .map(|(_, callback)| callback.clone())
                .collect(),
            None => return,
        };

        tracing::trace!(
            "Notifying {} transaction subscriber(s) of {key}",
            callbacks.len()
        );

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(transactions))).is_err() {
                tracing::error!("A transaction subscriber of {key} panicked");
            }
        }
    }

    /// Whether anyone is watching the transaction log of `key`.
    ///
    /// Stores use this to skip reading the log when nobody needs it.
    pub fn has_transaction_subscribers(&self, key: &LedgerKey) -> bool {
        self.lock()
            .listeners
            .get(key)
            .is_some_and(|listeners| !listeners.transactions.is_empty())
    }

    /// The number of live subscriptions, of either kind, for `key`.
    pub fn subscriber_count(&self, key: &LedgerKey) -> usize {
        self.lock()
            .listeners
            .get(key)
            .map_or(0, |listeners| {
                listeners.aggregate.len() + listeners.transactions.len()
            })
    }
}

/// A handle to a registered callback.
///
/// Dropping the handle does not unsubscribe: call [Subscription::unsubscribe]
/// when the observer goes away.
#[derive(Debug, Clone)]
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    key: LedgerKey,
    id: SubscriptionId,
}

impl Subscription {
    /// Stop calling the callback this handle was issued for.
    ///
    /// Other subscriptions on the same ledger are unaffected. Calling this
    /// more than once has no further effect.
    pub fn unsubscribe(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };

        registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key, self.id);
    }

    /// The ledger this subscription is watching.
    pub fn key(&self) -> &LedgerKey {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::{
        Category, LedgerKey, MonthAggregate, SubscriptionBroker, Transaction, UserId,
        aggregation::delta, transaction::TransactionType,
    };

    fn key(user: &str) -> LedgerKey {
        LedgerKey::new(UserId::new(user), "january-2026".parse().unwrap())
    }

    fn totals_after(amount: f64) -> MonthAggregate {
        let mut aggregate = MonthAggregate::zero();
        aggregate.apply(Category::General, delta(TransactionType::Add, amount));
        aggregate
    }

    #[test]
    fn publishes_to_every_subscriber_of_the_key() {
        let broker = SubscriptionBroker::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        let first_sink = first.clone();
        let second_sink = second.clone();
        broker.register_aggregate(
            &key("alice"),
            Arc::new(move |aggregate: &MonthAggregate| {
                first_sink.lock().unwrap().push(aggregate.total_spent)
            }),
        );
        broker.register_aggregate(
            &key("alice"),
            Arc::new(move |aggregate: &MonthAggregate| {
                second_sink.lock().unwrap().push(aggregate.total_spent)
            }),
        );

        broker.publish_aggregate(&key("alice"), &totals_after(10.0));

        assert_eq!(*first.lock().unwrap(), vec![10.0]);
        assert_eq!(*second.lock().unwrap(), vec![10.0]);
    }

    #[test]
    fn does_not_publish_to_other_keys() {
        let broker = SubscriptionBroker::new();
        let calls = Arc::new(Mutex::new(0));
        let sink = calls.clone();
        broker.register_aggregate(
            &key("bob"),
            Arc::new(move |_: &MonthAggregate| *sink.lock().unwrap() += 1),
        );

        broker.publish_aggregate(&key("alice"), &totals_after(10.0));

        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn unsubscribe_removes_only_that_callback() {
        let broker = SubscriptionBroker::new();
        let kept = Arc::new(Mutex::new(0));
        let removed = Arc::new(Mutex::new(0));
        let kept_sink = kept.clone();
        let removed_sink = removed.clone();
        broker.register_aggregate(
            &key("alice"),
            Arc::new(move |_: &MonthAggregate| *kept_sink.lock().unwrap() += 1),
        );
        let subscription = broker.register_aggregate(
            &key("alice"),
            Arc::new(move |_: &MonthAggregate| *removed_sink.lock().unwrap() += 1),
        );

        subscription.unsubscribe();
        broker.publish_aggregate(&key("alice"), &totals_after(10.0));

        assert_eq!(*kept.lock().unwrap(), 1);
        assert_eq!(*removed.lock().unwrap(), 0);
        assert_eq!(broker.subscriber_count(&key("alice")), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let broker = SubscriptionBroker::new();
        let subscription =
            broker.register_transactions(&key("alice"), Arc::new(|_: &[Transaction]| {}));
        broker.register_transactions(&key("alice"), Arc::new(|_: &[Transaction]| {}));

        subscription.unsubscribe();
        subscription.unsubscribe();

        assert_eq!(broker.subscriber_count(&key("alice")), 1);
        assert!(broker.has_transaction_subscribers(&key("alice")));
    }

    #[test]
    fn unsubscribe_after_broker_is_dropped_is_a_no_op() {
        let broker = SubscriptionBroker::new();
        let subscription =
            broker.register_aggregate(&key("alice"), Arc::new(|_: &MonthAggregate| {}));

        drop(broker);

        subscription.unsubscribe();
    }

    #[test]
    fn callback_can_unsubscribe_itself() {
        let broker = SubscriptionBroker::new();
        let slot: Arc<Mutex<Option<crate::Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(Mutex::new(0));
        let callback_slot = slot.clone();
        let sink = calls.clone();
        let subscription = broker.register_aggregate(
            &key("alice"),
            Arc::new(move |_: &MonthAggregate| {
                *sink.lock().unwrap() += 1;
                if let Some(subscription) = callback_slot.lock().unwrap().take() {
                    subscription.unsubscribe();
                }
            }),
        );
        *slot.lock().unwrap() = Some(subscription);

        broker.publish_aggregate(&key("alice"), &totals_after(1.0));
        broker.publish_aggregate(&key("alice"), &totals_after(2.0));

        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(broker.subscriber_count(&key("alice")), 0);
    }

    #[test]
    fn panicking_subscriber_does_not_stop_the_others() {
        let broker = SubscriptionBroker::new();
        let calls = Arc::new(Mutex::new(0));
        let sink = calls.clone();
        broker.register_aggregate(
            &key("alice"),
            Arc::new(|_: &MonthAggregate| panic!("subscriber failed")),
        );
        broker.register_aggregate(
            &key("alice"),
            Arc::new(move |_: &MonthAggregate| *sink.lock().unwrap() += 1),
        );

        broker.publish_aggregate(&key("alice"), &totals_after(1.0));
        broker.publish_aggregate(&key("alice"), &totals_after(2.0));

        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn publication_lock_survives_a_panic() {
        let broker = SubscriptionBroker::new();
        let clone = broker.clone();

        let result = std::thread::spawn(move || {
            let _publishing = clone.hold_publication();
            panic!("subscriber failed");
        })
        .join();

        assert!(result.is_err());
        drop(broker.hold_publication());
    }
}
