use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;
use thiserror::Error;

/// Type of a pooled SQLite connection manager.
pub type SqliteConnectionManager = r2d2::ConnectionManager<SqliteConnection>;

/// Type for a SQLite connection pool.
pub type SqliteConnectionPool = r2d2::Pool<SqliteConnectionManager>;

/// Type of a connection checked out of a [SqliteConnectionPool].
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Migrations compiled into the library, applied in version order.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Schema version installed by the newest migration in [MIGRATIONS].
pub const CURRENT_SCHEMA_VERSION: i32 = 3;

/// URL of a private, in-memory SQLite database.
pub const IN_MEMORY_URL: &str = ":memory:";

#[derive(Clone, Error, Debug, PartialEq)]
pub enum DbError {
    #[error("The document could not be imported: {}", message)]
    Format { message: String },

    #[error("A write to '{}' violated a constraint. Root cause: {}.", collection, cause)]
    Constraint {
        collection: &'static str,
        cause: String,
    },

    #[error("The Bible store could not be opened. Root cause: {}.", cause)]
    StoreUnavailable { cause: String },

    #[error("There was a connection pool error. Root cause: {}.", cause)]
    ConnectionPool { cause: String },

    #[error("Index '{}' cannot be scanned with that key range.", index)]
    InvalidKeyRange { index: &'static str },

    #[error("'{}' was not found.", book)]
    BookNotFound { book: String },

    #[error("'{}' is not a valid Bible reference.", reference)]
    InvalidReference { reference: String },

    #[error("There was a database error. Root cause: {}.", cause)]
    Other { cause: String },
}

impl From<diesel::result::Error> for DbError {
    fn from(e: diesel::result::Error) -> Self {
        DbError::Other {
            cause: e.to_string(),
        }
    }
}

/// Pragmas applied to every connection handed out by a pool.
#[derive(Debug)]
struct ConnectionOptions {
    busy_timeout: Duration,
}

impl r2d2::CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {};",
            self.busy_timeout.as_millis()
        ))
        .map_err(r2d2::Error::QueryError)
    }
}

/// Builds a SQLite connection pool with the given URL.
///
/// Every connection to `:memory:` opens its own empty database, so an
/// in-memory pool holds exactly one connection that is never recycled.
pub fn build_pool(db_url: &str) -> Result<SqliteConnectionPool, DbError> {
    let builder = r2d2::Pool::builder().connection_customizer(Box::new(ConnectionOptions {
        busy_timeout: Duration::from_secs(5),
    }));
    let builder = if db_url == IN_MEMORY_URL {
        builder.max_size(1).idle_timeout(None).max_lifetime(None)
    } else {
        builder.max_size(15)
    };

    builder
        .build(SqliteConnectionManager::new(db_url))
        .map_err(|e| DbError::ConnectionPool {
            cause: e.to_string(),
        })
}

/// Switches a database file to write-ahead logging, so readers on other
/// connections keep seeing the last committed state while an import runs.
pub fn enable_wal(conn: &mut SqliteConnection) -> Result<(), DbError> {
    conn.batch_execute("PRAGMA journal_mode = WAL;")
        .map_err(|e| DbError::StoreUnavailable {
            cause: format!("Could not enable WAL journaling: {e}"),
        })
}

/// Establishes a non-pooled SQLite connection.
pub fn establish_connection(db_url: &str) -> Result<SqliteConnection, DbError> {
    SqliteConnection::establish(db_url).map_err(|e| DbError::StoreUnavailable {
        cause: format!("Error connecting to {db_url}: {e}"),
    })
}

/// Run any pending migrations, oldest first. Each migration runs in its own
/// transaction, so a failing step leaves the previous version installed.
pub fn run_migrations(conn: &mut SqliteConnection) -> Result<(), DbError> {
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| DbError::StoreUnavailable {
            cause: format!("Migration failed: {e}"),
        })?;

    if !applied.is_empty() {
        info!(
            "Applied {} migration(s), schema is now at version {}",
            applied.len(),
            schema_version(conn)?
        );
    }
    Ok(())
}

/// Returns the installed schema version, or 0 for a store that has never
/// been migrated.
pub fn schema_version(conn: &mut SqliteConnection) -> Result<i32, DbError> {
    let applied = conn
        .applied_migrations()
        .map_err(|e| DbError::StoreUnavailable {
            cause: e.to_string(),
        })?;

    Ok(applied
        .iter()
        .filter_map(|version| version.to_string().parse::<i32>().ok())
        .max()
        .unwrap_or(0))
}

pub mod import;
pub mod models;
pub mod records;
mod schema;
mod store;
mod sword_drill;

pub use import::{import_document, ImportPolicy, ImportProgress, ImportSummary};
pub use store::Store;
pub use sword_drill::{SwordDrill, SwordDrillable};

#[cfg(test)]
pub(crate) fn migrated_connection() -> SqliteConnection {
    let mut conn = establish_connection(IN_MEMORY_URL).unwrap();
    run_migrations(&mut conn).unwrap();
    conn
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewTranslation, NewVerse};
    use crate::records;

    const SAMPLE: &str = r#"<XMLBIBLE biblename="Sample">
        <BIBLEBOOK bnumber="1" bname="Genesis">
            <CHAPTER cnumber="1">
                <VERS vnumber="1">In the beginning</VERS>
                <VERS vnumber="2">text2</VERS>
            </CHAPTER>
        </BIBLEBOOK>
    </XMLBIBLE>"#;

    #[test]
    fn fresh_store_has_no_version() {
        let mut conn = establish_connection(IN_MEMORY_URL).unwrap();
        assert_eq!(schema_version(&mut conn).unwrap(), 0);
    }

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = migrated_connection();
        assert_eq!(schema_version(&mut conn).unwrap(), CURRENT_SCHEMA_VERSION);

        run_migrations(&mut conn).unwrap();
        assert_eq!(schema_version(&mut conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn upgrade_from_v1_keeps_data() {
        let mut conn = establish_connection(IN_MEMORY_URL).unwrap();
        conn.run_next_migration(MIGRATIONS).unwrap();
        assert_eq!(schema_version(&mut conn).unwrap(), 1);

        let id = records::insert_translation(
            &mut conn,
            &NewTranslation {
                name: "Legacy",
                status: "",
                link: "",
            },
        )
        .unwrap();
        let verses: Vec<NewVerse> = [(2, "second"), (1, "first")]
            .into_iter()
            .map(|(verse, words)| NewVerse {
                translation_id: id,
                book: 1,
                chapter: 3,
                verse,
                words,
            })
            .collect();
        records::insert_verses(&mut conn, &verses).unwrap();

        run_migrations(&mut conn).unwrap();
        assert_eq!(schema_version(&mut conn).unwrap(), CURRENT_SCHEMA_VERSION);

        // Legacy data predates the books table, so names are synthesized.
        let nav = SwordDrill::navigation(id, &mut conn).unwrap();
        assert_eq!(nav.len(), 1);
        assert_eq!(nav[0].book, "Book 1");
        assert_eq!(nav[0].chapters, vec![3]);

        let range = SwordDrill::verse_range(id, 1, 3, 1..=2, &mut conn).unwrap();
        let words: Vec<&str> = range.iter().map(|v| v.words.as_str()).collect();
        assert_eq!(words, vec!["first", "second"]);
    }

    #[test]
    fn upgraded_store_behaves_like_fresh_store() {
        let mut upgraded = establish_connection(IN_MEMORY_URL).unwrap();
        upgraded.run_next_migration(MIGRATIONS).unwrap();
        run_migrations(&mut upgraded).unwrap();
        let mut fresh = migrated_connection();

        let a = import_document(&mut upgraded, SAMPLE, ImportPolicy::Lenient, |_| {}).unwrap();
        let b = import_document(&mut fresh, SAMPLE, ImportPolicy::Lenient, |_| {}).unwrap();

        assert_eq!(
            SwordDrill::navigation(a.translation_id, &mut upgraded).unwrap(),
            SwordDrill::navigation(b.translation_id, &mut fresh).unwrap()
        );
        assert_eq!(
            SwordDrill::chapter(a.translation_id, 1, 1, &mut upgraded).unwrap(),
            SwordDrill::chapter(b.translation_id, 1, 1, &mut fresh).unwrap()
        );
    }
}
