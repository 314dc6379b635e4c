//! Implements the in-memory ledger store used when the durable backend is unavailable.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use time::OffsetDateTime;

use crate::{
    Error,
    aggregation::MonthAggregate,
    broker::{AggregateCallback, Subscription, SubscriptionBroker, TransactionsCallback},
    month::LedgerKey,
    store::{LedgerChange, LedgerSnapshot, LedgerStore},
    transaction::{NewTransaction, Transaction, TransactionId},
};

#[derive(Debug, Default)]
struct Ledger {
    aggregate: MonthAggregate,
    /// Newest first.
    log: Vec<Transaction>,
}

#[derive(Debug, Default)]
struct Ledgers {
    last_id: TransactionId,
    by_key: HashMap<LedgerKey, Ledger>,
}

/// Stores ledgers in the memory of the current process.
///
/// All reads and writes take one lock, so they are serialized. Subscribers
/// are notified after that lock is released but before the mutating call
/// returns. Nothing survives a restart.
///
/// Clones share the same ledgers and subscribers.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    ledgers: Arc<Mutex<Ledgers>>,
    broker: SubscriptionBroker,
}

impl MemoryLedgerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The broker that subscribers of this store are registered with.
    pub fn broker(&self) -> &SubscriptionBroker {
        &self.broker
    }

    fn lock(&self) -> Result<MutexGuard<'_, Ledgers>, Error> {
        self.ledgers.lock().map_err(|_| Error::LockError)
    }

    /// Copy what the subscribers of `key` need to see of `ledger`.
    fn change_of(&self, key: &LedgerKey, ledger: &Ledger) -> LedgerChange {
        LedgerChange {
            aggregate: Some(ledger.aggregate.clone()),
            transactions: self
                .broker
                .has_transaction_subscribers(key)
                .then(|| ledger.log.clone()),
        }
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn get_or_create(&self, key: &LedgerKey) -> Result<MonthAggregate, Error> {
        let mut ledgers = self.lock()?;
        let ledger = ledgers.by_key.entry(key.clone()).or_default();

        Ok(ledger.aggregate.clone())
    }

    fn append(&self, key: &LedgerKey, transaction: NewTransaction) -> Result<Transaction, Error> {
        let _publishing = self.broker.hold_publication();

        let (transaction, change) = {
            let mut ledgers = self.lock()?;
            ledgers.last_id += 1;
            let transaction = transaction.finalise(ledgers.last_id, OffsetDateTime::now_utc());

            let ledger = ledgers.by_key.entry(key.clone()).or_default();
            ledger
                .aggregate
                .apply(transaction.category, transaction.delta());
            ledger.log.insert(0, transaction.clone());

            (transaction, self.change_of(key, ledger))
        };

        tracing::debug!(
            "Appended transaction {} ({} {} to {}) to {key}",
            transaction.id,
            transaction.kind,
            transaction.amount,
            transaction.category
        );
        change.publish(&self.broker, key);

        Ok(transaction)
    }

    fn delete(&self, key: &LedgerKey, id: TransactionId) -> Result<Transaction, Error> {
        let _publishing = self.broker.hold_publication();

        let (transaction, change) = {
            let mut ledgers = self.lock()?;
            let ledger = ledgers.by_key.get_mut(key).ok_or(Error::NotFound)?;
            let position = ledger
                .log
                .iter()
                .position(|transaction| transaction.id == id)
                .ok_or(Error::NotFound)?;

            let transaction = ledger.log.remove(position);
            ledger
                .aggregate
                .apply(transaction.category, -transaction.delta());

            (transaction, self.change_of(key, ledger))
        };

        tracing::debug!("Deleted transaction {id} from {key}");
        change.publish(&self.broker, key);

        Ok(transaction)
    }

    fn snapshot(&self, key: &LedgerKey) -> Result<LedgerSnapshot, Error> {
        let ledgers = self.lock()?;

        Ok(ledgers
            .by_key
            .get(key)
            .map(|ledger| LedgerSnapshot {
                aggregate: ledger.aggregate.clone(),
                transactions: ledger.log.clone(),
            })
            .unwrap_or_default())
    }

    fn subscribe_aggregate(
        &self,
        key: &LedgerKey,
        on_change: AggregateCallback,
    ) -> Result<Subscription, Error> {
        // No change can be published between reading the initial state and registering.
        let _publishing = self.broker.hold_publication();
        let aggregate = self
            .lock()?
            .by_key
            .get(key)
            .map(|ledger| ledger.aggregate.clone())
            .unwrap_or_default();
        let subscription = self.broker.register_aggregate(key, on_change.clone());

        on_change(&aggregate);

        Ok(subscription)
    }

    fn subscribe_transactions(
        &self,
        key: &LedgerKey,
        on_change: TransactionsCallback,
    ) -> Result<Subscription, Error> {
        let _publishing = self.broker.hold_publication();
        let transactions = self
            .lock()?
            .by_key
            .get(key)
            .map(|ledger| ledger.log.clone())
            .unwrap_or_default();
        let subscription = self.broker.register_transactions(key, on_change.clone());

        on_change(&transactions);

        Ok(subscription)
    }
}
