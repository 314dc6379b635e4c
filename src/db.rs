//! Sets up the SQLite schema used by the durable ledger store.

use rusqlite::{Connection, Error};

/// Create the ledger tables, if they do not already exist.
///
/// A month is one row in `month` plus one row per category in
/// `category_total`. Transactions reference their month so that the log and
/// the totals of a ledger always live under the same key.
///
/// # Errors
/// Returns an error if a table cannot be created or if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.execute_batch(
        "PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS month (
            user_id TEXT NOT NULL,
            month_key TEXT NOT NULL,
            total_spent REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, month_key)
        );

        CREATE TABLE IF NOT EXISTS category_total (
            user_id TEXT NOT NULL,
            month_key TEXT NOT NULL,
            category TEXT NOT NULL,
            total REAL NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, month_key, category),
            FOREIGN KEY (user_id, month_key) REFERENCES month(user_id, month_key)
                ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS \"transaction\" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            month_key TEXT NOT NULL,
            amount REAL NOT NULL CHECK (amount > 0),
            category TEXT NOT NULL,
            type TEXT NOT NULL CHECK (type IN ('add', 'remove')),
            comment TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id, month_key) REFERENCES month(user_id, month_key)
                ON UPDATE CASCADE ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_transaction_ledger
            ON \"transaction\" (user_id, month_key, created_at DESC, id DESC);",
    )
}
