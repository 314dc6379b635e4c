//! The ledger store trait and its two backends.
//!
//! A [LedgerStore] keeps, for every (user, month) key, the month's totals and
//! the log of transactions that produced them. [SqliteLedgerStore] is the
//! durable backend and [MemoryLedgerStore] is the fallback used when the
//! durable backend is not available. [Store] is the backend picked at startup.

mod memory;
mod sqlite;


pub use memory::MemoryLedgerStore;
pub use sqlite::SqliteLedgerStore;

use serde::Serialize;

use crate::{
    Error,
    aggregation::MonthAggregate,
    broker::{AggregateCallback, Subscription, SubscriptionBroker, TransactionsCallback},
    config::BackendConfig,
    month::LedgerKey,
    transaction::{NewTransaction, Transaction, TransactionId},
};

/// Stores monthly ledgers: an aggregate and an ordered transaction log per key.
///
/// Implementations must apply a transaction's delta to the aggregate together
/// with writing it to (or removing it from) the log, and must notify
/// subscribers of the key after every mutation.
pub trait LedgerStore {
    /// Get the totals for `key`, creating a zeroed ledger if there is none.
    ///
    /// Calling this repeatedly never resets an existing ledger.
    fn get_or_create(&self, key: &LedgerKey) -> Result<MonthAggregate, Error>;

    /// Write `transaction` to the head of the log of `key` and apply its delta to the totals.
    ///
    /// The ledger is created first if it does not exist yet.
    fn append(&self, key: &LedgerKey, transaction: NewTransaction) -> Result<Transaction, Error>;

    /// Remove the transaction `id` from the log of `key` and reverse its delta.
    ///
    /// The delta that is reversed is the one stored with the transaction, not
    /// one recomputed from the current totals.
    ///
    /// # Errors
    ///
    /// Returns [Error::NotFound] if `id` is not in the log of `key`.
    fn delete(&self, key: &LedgerKey, id: TransactionId) -> Result<Transaction, Error>;

    /// Read the totals and the log of `key`, newest transaction first.
    ///
    /// A ledger that does not exist reads as zero totals and an empty log; it is not created.
    fn snapshot(&self, key: &LedgerKey) -> Result<LedgerSnapshot, Error>;

    /// Call `on_change` with the current totals of `key` and again after every change to them.
    fn subscribe_aggregate(
        &self,
        key: &LedgerKey,
        on_change: AggregateCallback,
    ) -> Result<Subscription, Error>;

    /// Call `on_change` with the current log of `key` and again after every change to it.
    fn subscribe_transactions(
        &self,
        key: &LedgerKey,
        on_change: TransactionsCallback,
    ) -> Result<Subscription, Error>;
}

/// The state of one ledger at a point in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LedgerSnapshot {
    /// The month's totals.
    pub aggregate: MonthAggregate,
    /// The month's transactions, newest first.
    pub transactions: Vec<Transaction>,
}

/// What the subscribers of a ledger are sent after it changes.
///
/// Stores copy this out while holding their data lock and publish it once
/// the lock is released.
pub(crate) struct LedgerChange {
    /// The new totals, `None` if they could not be read back.
    pub(crate) aggregate: Option<MonthAggregate>,
    /// The new log, `None` if nobody is watching it or it could not be read back.
    pub(crate) transactions: Option<Vec<Transaction>>,
}

impl LedgerChange {
    pub(crate) fn publish(self, broker: &SubscriptionBroker, key: &LedgerKey) {
        if let Some(aggregate) = self.aggregate {
            broker.publish_aggregate(key, &aggregate);
        }

        if let Some(transactions) = self.transactions {
            broker.publish_transactions(key, &transactions);
        }
    }
}

/// The kinds of ledger backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Ledgers are kept in a SQLite database and survive restarts.
    Durable,
    /// Ledgers are kept in memory and are lost when the process exits.
    Fallback,
}

/// The ledger backend selected for this process.
#[derive(Debug, Clone)]
pub enum Store {
    /// The SQLite backed store.
    Durable(SqliteLedgerStore),
    /// The in-memory store.
    Fallback(MemoryLedgerStore),
}

impl Store {
    /// Pick the backend described by `config`.
    ///
    /// The durable backend is used when a database path is configured and the
    /// database can be opened. Otherwise the durable backend is unavailable
    /// and the in-memory fallback is used instead.
    pub fn select(config: &BackendConfig) -> Self {
        match Self::open_durable(config) {
            Ok(store) => {
                tracing::info!("Using the durable ledger backend");
                Store::Durable(store)
            }
            Err(error) => {
                tracing::warn!("{error}, falling back to the in-memory ledger backend");
                Store::Fallback(MemoryLedgerStore::new())
            }
        }
    }

    fn open_durable(config: &BackendConfig) -> Result<SqliteLedgerStore, Error> {
        let db_path = config.db_path.as_ref().ok_or_else(|| {
            Error::BackendUnavailable("no database path was configured".to_owned())
        })?;

        SqliteLedgerStore::open(db_path).map_err(|error| {
            Error::BackendUnavailable(format!(
                "could not open the database at {db_path:?}: {error}"
            ))
        })
    }

    /// Which kind of backend was selected.
    pub fn backend(&self) -> Backend {
        match self {
            Store::Durable(_) => Backend::Durable,
            Store::Fallback(_) => Backend::Fallback,
        }
    }
}

impl LedgerStore for Store {
    fn get_or_create(&self, key: &LedgerKey) -> Result<MonthAggregate, Error> {
        match self {
            Store::Durable(store) => store.get_or_create(key),
            Store::Fallback(store) => store.get_or_create(key),
        }
    }

    fn append(&self, key: &LedgerKey, transaction: NewTransaction) -> Result<Transaction, Error> {
        match self {
            Store::Durable(store) => store.append(key, transaction),
            Store::Fallback(store) => store.append(key, transaction),
        }
    }

    fn delete(&self, key: &LedgerKey, id: TransactionId) -> Result<Transaction, Error> {
        match self {
            Store::Durable(store) => store.delete(key, id),
            Store::Fallback(store) => store.delete(key, id),
        }
    }

    fn snapshot(&self, key: &LedgerKey) -> Result<LedgerSnapshot, Error> {
        match self {
            Store::Durable(store) => store.snapshot(key),
            Store::Fallback(store) => store.snapshot(key),
        }
    }

    fn subscribe_aggregate(
        &self,
        key: &LedgerKey,
        on_change: AggregateCallback,
    ) -> Result<Subscription, Error> {
        match self {
            Store::Durable(store) => store.subscribe_aggregate(key, on_change),
            Store::Fallback(store) => store.subscribe_aggregate(key, on_change),
        }
    }

    fn subscribe_transactions(
        &self,
        key: &LedgerKey,
        on_change: TransactionsCallback,
    ) -> Result<Subscription, Error> {
        match self {
            Store::Durable(store) => store.subscribe_transactions(key, on_change),
            Store::Fallback(store) => store.subscribe_transactions(key, on_change),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{Backend, BackendConfig, Store};

    #[test]
    fn falls_back_to_memory_without_a_database_path() {
        let store = Store::select(&BackendConfig::in_memory());

        assert_eq!(store.backend(), Backend::Fallback);
    }

    #[test]
    fn falls_back_to_memory_when_the_database_cannot_be_opened() {
        let directory = tempfile::tempdir().unwrap();
        let db_path = directory.path().join("missing").join("ledger.db");

        let store = Store::select(&BackendConfig::durable(db_path));

        assert_eq!(store.backend(), Backend::Fallback);
    }

    #[test]
    fn uses_the_durable_backend_when_configured() {
        let directory = tempfile::tempdir().unwrap();
        let db_path = directory.path().join("ledger.db");

        let store = Store::select(&BackendConfig::durable(db_path));

        assert_eq!(store.backend(), Backend::Durable);
    }

    mod selected_store {
        use crate::{BackendConfig, Store};

        crate::ledger_store_contract!(Store::select(&BackendConfig::in_memory()));
    }
}
