//! Implements a SQLite backed ledger store.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior};
use time::OffsetDateTime;

use crate::{
    Error,
    aggregation::MonthAggregate,
    broker::{AggregateCallback, Subscription, SubscriptionBroker, TransactionsCallback},
    category::Category,
    db::initialize,
    month::LedgerKey,
    store::{LedgerChange, LedgerSnapshot, LedgerStore},
    transaction::{NewTransaction, Transaction, TransactionId},
};

/// Stores ledgers in a SQLite database.
///
/// Totals are updated with in-place increments in the same SQL transaction
/// that writes or deletes the log entry, so concurrent writers (including
/// other processes sharing the database file) converge on the same totals.
/// Write transactions take the database write lock up front, so a busy
/// database is waited on rather than reported as an error.
/// Subscribers are only notified of changes made through this process.
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    connection: Arc<Mutex<Connection>>,
    broker: SubscriptionBroker,
}

impl SqliteLedgerStore {
    /// Create a store for the SQLite `connection`.
    ///
    /// This function will modify the database by adding the ledger tables if
    /// they do not exist yet.
    ///
    /// # Errors
    /// Returns an [Error::SqlError] if the database cannot be initialized.
    pub fn new(connection: Connection) -> Result<Self, Error> {
        initialize(&connection)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            broker: SubscriptionBroker::new(),
        })
    }

    /// Open (or create) the database file at `db_path` and create a store for it.
    ///
    /// # Errors
    /// Returns an [Error::SqlError] if the file cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, Error> {
        let connection = Connection::open(db_path)?;
        // Other processes may be writing to the same file.
        connection.busy_timeout(Duration::from_secs(5))?;

        Self::new(connection)
    }

    /// The broker that subscribers of this store are registered with.
    pub fn broker(&self) -> &SubscriptionBroker {
        &self.broker
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.connection.lock().map_err(|_| Error::LockError)
    }

    /// Read back the committed state of `key` for its subscribers.
    ///
    /// The change has already been committed, so a failure to read it back is
    /// logged rather than returned.
    fn change_of(&self, connection: &Connection, key: &LedgerKey) -> LedgerChange {
        let aggregate = match select_aggregate(connection, key) {
            Ok(aggregate) => Some(aggregate.unwrap_or_default()),
            Err(error) => {
                tracing::error!("Could not read the totals of {key} for subscribers: {error}");
                None
            }
        };

        let transactions = if self.broker.has_transaction_subscribers(key) {
            match select_transactions(connection, key) {
                Ok(transactions) => Some(transactions),
                Err(error) => {
                    tracing::error!(
                        "Could not read the transactions of {key} to notify subscribers: {error}"
                    );
                    None
                }
            }
        } else {
            None
        };

        LedgerChange {
            aggregate,
            transactions,
        }
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn get_or_create(&self, key: &LedgerKey) -> Result<MonthAggregate, Error> {
        let mut connection = self.lock()?;
        let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

        insert_month_if_missing(&tx, key)?;
        let aggregate = select_aggregate(&tx, key)?.ok_or(Error::NotFound)?;

        tx.commit()?;
        Ok(aggregate)
    }

    /// Create a new transaction in the database and add its delta to the totals.
    ///
    /// # Errors
    /// This function will return an [Error::SqlError] if there is some SQL error.
    fn append(&self, key: &LedgerKey, transaction: NewTransaction) -> Result<Transaction, Error> {
        let _publishing = self.broker.hold_publication();

        let (transaction, change) = {
            let mut connection = self.lock()?;
            let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

            insert_month_if_missing(&tx, key)?;
            let transaction = tx
                .prepare_cached(
                    "INSERT INTO \"transaction\"
                     (user_id, month_key, amount, category, type, comment, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     RETURNING id, amount, category, type, comment, created_at",
                )?
                .query_row(
                    (
                        key.user_id.as_str(),
                        key.month.to_string(),
                        transaction.amount(),
                        transaction.category(),
                        transaction.kind(),
                        transaction.comment(),
                        OffsetDateTime::now_utc(),
                    ),
                    map_transaction_row,
                )?;
            increment_totals(&tx, key, transaction.category, transaction.delta())?;

            tx.commit()?;

            let change = self.change_of(&connection, key);
            (transaction, change)
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

    /// Delete a transaction from the database and subtract its delta from the totals.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::NotFound] if `id` does not refer to a transaction of `key`,
    /// - or [Error::SqlError] if there is some other SQL error.
    fn delete(&self, key: &LedgerKey, id: TransactionId) -> Result<Transaction, Error> {
        let _publishing = self.broker.hold_publication();

        let (transaction, change) = {
            let mut connection = self.lock()?;
            let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let transaction = tx
                .prepare_cached(
                    "SELECT id, amount, category, type, comment, created_at FROM \"transaction\"
                     WHERE id = ?1 AND user_id = ?2 AND month_key = ?3",
                )?
                .query_row(
                    (id, key.user_id.as_str(), key.month.to_string()),
                    map_transaction_row,
                )?;
            tx.execute("DELETE FROM \"transaction\" WHERE id = ?1", (id,))?;
            increment_totals(&tx, key, transaction.category, -transaction.delta())?;

            tx.commit()?;

            let change = self.change_of(&connection, key);
            (transaction, change)
        };

        tracing::debug!("Deleted transaction {id} from {key}");
        change.publish(&self.broker, key);

        Ok(transaction)
    }

    fn snapshot(&self, key: &LedgerKey) -> Result<LedgerSnapshot, Error> {
        let connection = self.lock()?;

        Ok(LedgerSnapshot {
            aggregate: select_aggregate(&connection, key)?.unwrap_or_default(),
            transactions: select_transactions(&connection, key)?,
        })
    }

    fn subscribe_aggregate(
        &self,
        key: &LedgerKey,
        on_change: AggregateCallback,
    ) -> Result<Subscription, Error> {
        // No change can be published between reading the initial state and registering.
        let _publishing = self.broker.hold_publication();
        let aggregate = select_aggregate(&*self.lock()?, key)?.unwrap_or_default();
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
        let transactions = select_transactions(&*self.lock()?, key)?;
        let subscription = self.broker.register_transactions(key, on_change.clone());

        on_change(&transactions);

        Ok(subscription)
    }
}

fn insert_month_if_missing(connection: &Connection, key: &LedgerKey) -> Result<(), Error> {
    let month_key = key.month.to_string();

    connection
        .prepare_cached("INSERT OR IGNORE INTO month (user_id, month_key) VALUES (?1, ?2)")?
        .execute((key.user_id.as_str(), &month_key))?;

    let mut statement = connection.prepare_cached(
        "INSERT OR IGNORE INTO category_total (user_id, month_key, category) VALUES (?1, ?2, ?3)",
    )?;
    for category in Category::ALL {
        statement.execute((key.user_id.as_str(), &month_key, category))?;
    }

    Ok(())
}

fn increment_totals(
    connection: &Connection,
    key: &LedgerKey,
    category: Category,
    delta: f64,
) -> Result<(), Error> {
    let month_key = key.month.to_string();

    connection
        .prepare_cached(
            "UPDATE month SET total_spent = total_spent + ?3 WHERE user_id = ?1 AND month_key = ?2",
        )?
        .execute((key.user_id.as_str(), &month_key, delta))?;
    connection
        .prepare_cached(
            "UPDATE category_total SET total = total + ?4
             WHERE user_id = ?1 AND month_key = ?2 AND category = ?3",
        )?
        .execute((key.user_id.as_str(), &month_key, category, delta))?;

    Ok(())
}

fn select_aggregate(
    connection: &Connection,
    key: &LedgerKey,
) -> Result<Option<MonthAggregate>, Error> {
    let month_key = key.month.to_string();

    let total_spent: Option<f64> = connection
        .prepare_cached("SELECT total_spent FROM month WHERE user_id = ?1 AND month_key = ?2")?
        .query_row((key.user_id.as_str(), &month_key), |row| row.get(0))
        .optional()?;

    let Some(total_spent) = total_spent else {
        return Ok(None);
    };

    let mut aggregate = MonthAggregate {
        total_spent,
        ..MonthAggregate::zero()
    };
    let mut statement = connection.prepare_cached(
        "SELECT category, total FROM category_total WHERE user_id = ?1 AND month_key = ?2",
    )?;
    let rows = statement.query_map((key.user_id.as_str(), &month_key), |row| {
        Ok((row.get::<_, Category>(0)?, row.get::<_, f64>(1)?))
    })?;
    for row in rows {
        let (category, total) = row?;
        aggregate.categories.insert(category, total);
    }

    Ok(Some(aggregate))
}

fn select_transactions(
    connection: &Connection,
    key: &LedgerKey,
) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare_cached(
            "SELECT id, amount, category, type, comment, created_at FROM \"transaction\"
             WHERE user_id = ?1 AND month_key = ?2
             ORDER BY created_at DESC, id DESC",
        )?
        .query_map(
            (key.user_id.as_str(), key.month.to_string()),
            map_transaction_row,
        )?
        .map(|maybe_transaction| maybe_transaction.map_err(Error::from))
        .collect()
}

fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    Ok(Transaction {
        id: row.get(0)?,
        amount: row.get(1)?,
        category: row.get(2)?,
        kind: row.get(3)?,
        comment: row.get(4)?,
        created_at: row.get(5)?,
    })
}
