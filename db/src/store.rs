use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use log::info;

use crate::models::{NavigationEntry, Translation, Verse};
use crate::{
    build_pool, enable_wal, establish_connection, import, run_migrations, DbError, ImportPolicy,
    ImportProgress, ImportSummary, PooledConnection, SqliteConnectionPool, SwordDrill,
    SwordDrillable, IN_MEMORY_URL,
};

lazy_static! {
    /// Stores opened by this process, keyed by database URL.
    static ref OPEN_STORES: Mutex<HashMap<String, Store>> = Mutex::new(HashMap::new());
}

fn unavailable(e: DbError) -> DbError {
    DbError::StoreUnavailable {
        cause: e.to_string(),
    }
}

struct StoreInner {
    url: String,
    pool: SqliteConnectionPool,
}

/// Handle to a migrated Bible store. Cloning is cheap and every clone
/// shares one connection pool.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Opens the store at `url`, creating and migrating it on first use.
    ///
    /// The first call for a URL migrates the database to the current schema
    /// version; later calls in the same process return the same live handle.
    /// Handles stay open until the process exits.
    pub fn open(url: &str) -> Result<Store, DbError> {
        let mut stores = OPEN_STORES.lock().map_err(|e| DbError::StoreUnavailable {
            cause: e.to_string(),
        })?;
        if let Some(store) = stores.get(url) {
            return Ok(store.clone());
        }

        let pool = if url == IN_MEMORY_URL {
            // The pool's only connection is the database, so migrate through it.
            let pool = build_pool(url).map_err(unavailable)?;
            let mut conn = pool.get().map_err(|e| DbError::StoreUnavailable {
                cause: e.to_string(),
            })?;
            run_migrations(&mut conn)?;
            drop(conn);
            pool
        } else {
            let mut conn = establish_connection(url)?;
            enable_wal(&mut conn)?;
            run_migrations(&mut conn)?;
            build_pool(url).map_err(unavailable)?
        };
        info!("Opened Bible store at {url}");

        let store = Store {
            inner: Arc::new(StoreInner {
                url: url.to_string(),
                pool,
            }),
        };
        stores.insert(url.to_string(), store.clone());
        Ok(store)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Checks a connection out of the store's pool.
    pub fn conn(&self) -> Result<PooledConnection, DbError> {
        self.inner.pool.get().map_err(|e| DbError::ConnectionPool {
            cause: e.to_string(),
        })
    }

    pub fn list_translations(&self) -> Result<Vec<Translation>, DbError> {
        SwordDrill::translations(&mut *self.conn()?)
    }

    pub fn navigation(&self, translation_id: i32) -> Result<Vec<NavigationEntry>, DbError> {
        SwordDrill::navigation(translation_id, &mut *self.conn()?)
    }

    pub fn verses_for_chapter(
        &self,
        translation_id: i32,
        book: i32,
        chapter: i32,
    ) -> Result<Vec<Verse>, DbError> {
        SwordDrill::chapter(translation_id, book, chapter, &mut *self.conn()?)
    }

    pub fn verses_by_range(
        &self,
        translation_id: i32,
        book: i32,
        chapter: i32,
        verses: RangeInclusive<i32>,
    ) -> Result<Vec<Verse>, DbError> {
        SwordDrill::verse_range(translation_id, book, chapter, verses, &mut *self.conn()?)
    }

    /// Imports a document; see [import_document](crate::import::import_document).
    pub fn import_document<F>(
        &self,
        text: &str,
        policy: ImportPolicy,
        on_progress: F,
    ) -> Result<ImportSummary, DbError>
    where
        F: FnMut(&ImportProgress),
    {
        import::import_document(&mut *self.conn()?, text, policy, on_progress)
    }
}
