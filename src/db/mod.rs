pub mod models;
pub mod queries;

use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("{0} title must not be empty")]
    EmptyTitle(&'static str),
}

pub type Result<T> = std::result::Result<T, StorageError>;

const SCHEMA_VERSION: i32 = 1;

pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        // WAL lets readers keep going while an import holds the write lock
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.register_functions()?;
        self.migrate()?;
        Ok(())
    }

    /// `casefold(text)`: Unicode lowercase, for titles like "Ātma" that
    /// SQLite's ASCII-only `lower()` leaves alone. NULL stays NULL.
    fn register_functions(&self) -> Result<()> {
        self.conn.create_scalar_function(
            "casefold",
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let text: Option<String> = ctx.get(0)?;
                Ok(text.map(|t| t.to_lowercase()))
            },
        )?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            return Err(StorageError::Migration(format!(
                "database schema v{version} is newer than supported v{SCHEMA_VERSION}"
            )));
        }
        if version < 1 {
            self.migrate_v1()?;
        }

        self.conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// V1: books → essays → recordings
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS books (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                title           TEXT NOT NULL,
                display_order   INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_books_title ON books(title);

            CREATE TABLE IF NOT EXISTS essays (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                book_id         INTEGER NOT NULL REFERENCES books(id),
                essay_number    TEXT NOT NULL DEFAULT '',
                title           TEXT NOT NULL,
                display_order   INTEGER NOT NULL DEFAULT 0
            );

            -- Natural key used for find-or-create; deliberately not UNIQUE
            CREATE INDEX IF NOT EXISTS idx_essays_natural
                ON essays(book_id, title, essay_number);

            CREATE TABLE IF NOT EXISTS recordings (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                essay_id        INTEGER NOT NULL REFERENCES essays(id),
                title           TEXT,
                reciter         TEXT,
                recorded_date   TEXT,
                duration        TEXT,
                file_path       TEXT,
                date_added      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_recordings_essay ON recordings(essay_id);
            ",
        )?;
        Ok(())
    }

    /// Run `f` inside one IMMEDIATE transaction. Commits when `f` returns
    /// `Ok`, rolls back (on drop) otherwise. Catalog writes issued through
    /// `db` inside `f` join this transaction instead of opening their own.
    pub fn transaction<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&Database) -> std::result::Result<T, E>,
        E: From<StorageError>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;
        let out = f(self)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(out)
    }

    /// Run a single logical write atomically, joining an enclosing
    /// transaction if one is already open on this connection.
    pub(crate) fn atomically<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        if !self.conn.is_autocommit() {
            return f(&self.conn);
        }
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run a multi-statement read against one consistent snapshot.
    pub(crate) fn snapshot<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        if !self.conn.is_autocommit() {
            return f(&self.conn);
        }
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Deferred)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_sets_user_version() {
        let db = Database::open_in_memory().unwrap();
        let version: i32 = db
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_reopen_on_disk_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.db");
        {
            let db = Database::open(&path).unwrap();
            db.find_or_create_book("The Aletheon").unwrap();
        }
        let db = Database::open(&path).unwrap();
        let books = db.list_books().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "The Aletheon");
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1).unwrap();
        }
        let err = Database::open(&path).err().unwrap();
        assert!(matches!(err, StorageError::Migration(_)));
    }

    #[test]
    fn test_casefold_handles_non_ascii() {
        let db = Database::open_in_memory().unwrap();
        let folded: String = db
            .conn
            .query_row("SELECT casefold('Ātma Nadi Shakti')", [], |row| row.get(0))
            .unwrap();
        assert_eq!(folded, "ātma nadi shakti");
        let null: Option<String> = db
            .conn
            .query_row("SELECT casefold(NULL)", [], |row| row.get(0))
            .unwrap();
        assert_eq!(null, None);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: std::result::Result<(), StorageError> = db.transaction(|db| {
            db.find_or_create_book("Half Imported")?;
            Err(StorageError::Migration("boom".into()))
        });
        assert!(result.is_err());
        assert!(db.list_books().unwrap().is_empty());
        assert!(db.conn.is_autocommit());
    }

    #[test]
    fn test_transaction_commits_on_success() {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .transaction(|db| -> Result<i64> {
                let book = db.find_or_create_book("Not-Two Is Peace")?;
                db.find_or_create_essay(book, "The Perfect Practice", "1")?;
                Ok(book)
            })
            .unwrap();
        assert!(db.get_book(id).unwrap().is_some());
    }
}
