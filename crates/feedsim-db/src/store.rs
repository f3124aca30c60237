//! The Store: open/initialize the database, transactional
//! append, ordered scan, projection reset.

use std::ops;
use std::path::{Path, PathBuf};

use feedsim_core::{EventKind, EventRecord, OpId, Seq, Tick};
use itertools::Itertools as _;
use redb_bincode::{ReadTransaction, WriteTransaction};
use snafu::ResultExt as _;
use tracing::{debug, instrument};

use crate::errors::{
    AlreadyInitializedSnafu, CommitSnafu, DatabaseSnafu, DbResult, JoinSnafu, TransactionSnafu,
};
use crate::tables::{self, ActionOutcomeRecord, MetaRecord};

pub(crate) const LOG_TARGET: &str = "feedsim::db";

/// Wraps a `redb` write transaction with commit-only hooks: hooks registered
/// via `on_commit` run only after `commit()` actually succeeds, so callers
/// can schedule notification side effects without risking them firing on a
/// rolled-back transaction.
pub struct WriteTransactionCtx {
    dbtx: WriteTransaction,
    on_commit: std::sync::Mutex<Vec<Box<dyn FnOnce() + 'static>>>,
}

impl From<WriteTransaction> for WriteTransactionCtx {
    fn from(dbtx: WriteTransaction) -> Self {
        Self {
            dbtx,
            on_commit: std::sync::Mutex::new(vec![]),
        }
    }
}

impl ops::Deref for WriteTransactionCtx {
    type Target = WriteTransaction;

    fn deref(&self) -> &Self::Target {
        &self.dbtx
    }
}

impl ops::DerefMut for WriteTransactionCtx {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.dbtx
    }
}

impl WriteTransactionCtx {
    pub fn on_commit(&self, f: impl FnOnce() + 'static) {
        self.on_commit
            .lock()
            .expect("locking failed")
            .push(Box::new(f));
    }

    fn commit(self) -> Result<(), redb::CommitError> {
        let Self { dbtx, on_commit } = self;

        dbtx.commit()?;

        for hook in on_commit.lock().expect("locking failed").drain(..) {
            hook();
        }
        Ok(())
    }
}

/// The event-sourced simulator's single database handle: the append-only
/// event log plus every projection table derived from it.
#[derive(Debug)]
pub struct Store {
    inner: redb_bincode::Database,
}

impl Store {
    pub async fn open(path: impl Into<PathBuf>) -> DbResult<Store> {
        let path = path.into();
        debug!(target: LOG_TARGET, path = %path.display(), "Opening database");

        let inner = tokio::task::spawn_blocking(move || redb::Database::create(path))
            .await
            .context(JoinSnafu)?
            .context(DatabaseSnafu)?;

        Ok(Store {
            inner: redb_bincode::Database::from(inner),
        })
    }

    pub async fn open_in_memory() -> DbResult<Store> {
        debug!(target: LOG_TARGET, "Opening in-memory database");
        let inner = redb::Database::builder()
            .create_with_backend(redb::backends::InMemoryBackend::new())
            .context(DatabaseSnafu)?;

        Ok(Store {
            inner: redb_bincode::Database::from(inner),
        })
    }

    const PROJECTION_TABLE_NAMES: &'static [&'static str] = &[
        "users",
        "posts",
        "comments",
        "votes",
        "follows",
        "timelines",
        "timeline_items",
    ];

    /// Drops a table by name regardless of its value type: `delete_table`
    /// only needs a `TableDefinition` with the right *name*, so a throwaway
    /// `&[u8] => &[u8]` definition works for any table.
    fn delete_table_by_name(tx: &WriteTransactionCtx, name: &str) -> DbResult<()> {
        let raw_def = redb::TableDefinition::<&[u8], &[u8]>::new(name);
        tx.as_raw().delete_table(raw_def)?;
        Ok(())
    }

    /// Creates schema for the event log and every projection table. If
    /// `force`, existing tables are dropped first; otherwise a database that
    /// already carries a `meta` row is rejected with `AlreadyInitialized`.
    #[instrument(skip(self))]
    pub async fn init(&self, force: bool) -> DbResult<()> {
        self.write_with(|tx| {
            let existing = {
                let meta_table = tx.open_table(&tables::meta::TABLE)?;
                meta_table.get(&())?.map(|g| g.value())
            };

            if let Some(meta) = existing {
                if meta.initialized && !force {
                    return AlreadyInitializedSnafu.fail();
                }
            }

            if force {
                Self::delete_table_by_name(tx, "events")?;
                Self::delete_table_by_name(tx, "events_by_op_id")?;
                for name in Self::PROJECTION_TABLE_NAMES {
                    Self::delete_table_by_name(tx, name)?;
                }
            }

            tx.open_table(&tables::events::TABLE)?;
            tx.open_table(&tables::events_by_op_id::TABLE)?;
            Self::open_projection_tables(tx)?;

            let mut meta_table = tx.open_table(&tables::meta::TABLE)?;
            meta_table.insert(
                &(),
                &MetaRecord {
                    initialized: true,
                    ..existing.unwrap_or_default()
                },
            )?;

            Ok(())
        })
        .await
    }

    fn open_projection_tables(tx: &WriteTransactionCtx) -> DbResult<()> {
        tx.open_table(&tables::users::TABLE)?;
        tx.open_table(&tables::posts::TABLE)?;
        tx.open_table(&tables::comments::TABLE)?;
        tx.open_table(&tables::votes::TABLE)?;
        tx.open_table(&tables::follows::TABLE)?;
        tx.open_table(&tables::timelines::TABLE)?;
        tx.open_table(&tables::timeline_items::TABLE)?;
        Ok(())
    }

    /// Deletes every projection row; leaves the event log untouched. Used
    /// before `replay_all` so the Reducer rebuilds projections purely from
    /// the log.
    pub(crate) fn truncate_projections_tx(tx: &WriteTransactionCtx) -> DbResult<()> {
        for name in Self::PROJECTION_TABLE_NAMES {
            Self::delete_table_by_name(tx, name)?;
        }
        Self::open_projection_tables(tx)?;

        let mut meta_table = tx.open_table(&tables::meta::TABLE)?;
        let mut meta = meta_table.get(&())?.map(|g| g.value()).unwrap_or_default();
        meta.current_tick = 0;
        meta.timeline_counter = 0;
        meta_table.insert(&(), &meta)?;
        Ok(())
    }

    pub async fn truncate_projections(&self) -> DbResult<()> {
        self.write_with(|tx| Self::truncate_projections_tx(tx)).await
    }

    pub(crate) fn read_meta_tx(tx: &impl crate::tables::meta::ReadableTable) -> DbResult<MetaRecord> {
        Ok(tx.get(&())?.map(|g| g.value()).unwrap_or_default())
    }

    pub async fn current_tick(&self) -> DbResult<Tick> {
        self.read_with(|tx| {
            let meta_table = tx.open_table(&tables::meta::TABLE)?;
            Ok(Tick(Self::read_meta_tx(&meta_table)?.current_tick))
        })
        .await
    }

    /// Appends `event` atomically: assigns the next `seq` and persists the
    /// row. Callers that also need the `events_by_op_id` index
    /// updated (action events) do so themselves, in the same transaction,
    /// once they know the `seq` this call assigned.
    pub(crate) fn append_tx(
        tx: &WriteTransactionCtx,
        kind: EventKind,
        tick: Tick,
        payload: String,
    ) -> DbResult<EventRecord> {
        let mut meta_table = tx.open_table(&tables::meta::TABLE)?;
        let mut meta = Self::read_meta_tx(&meta_table)?;

        let seq = Seq(meta.seq_hwm + 1);
        meta.seq_hwm = seq.0;
        meta_table.insert(&(), &meta)?;

        let record = EventRecord {
            seq,
            tick,
            kind,
            payload,
        };

        let mut events_table = tx.open_table(&tables::events::TABLE)?;
        events_table.insert(&seq, &record)?;

        Ok(record)
    }

    /// Idempotency lookup within an already-open write transaction;
    /// `lookup_op_id` below is the equivalent for callers that only need a
    /// standalone read transaction.
    pub(crate) fn lookup_op_id_tx(
        tx: &WriteTransactionCtx,
        op_id: &OpId,
    ) -> DbResult<Option<ActionOutcomeRecord>> {
        let table = tx.open_table(&tables::events_by_op_id::TABLE)?;
        Ok(table.get(op_id)?.map(|g| g.value()))
    }

    /// Ordered scan of the event log starting at `from_seq` (inclusive,
    /// `Seq(0)` meaning "from the start").
    pub async fn scan(&self, from_seq: Seq) -> DbResult<Vec<EventRecord>> {
        self.read_with(|tx| {
            let events_table = tx.open_table(&tables::events::TABLE)?;
            let lower = if from_seq.0 == 0 { Seq::FIRST } else { from_seq };
            Ok(events_table
                .range(lower..)?
                .map_ok(|(_, v)| v.value())
                .collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    pub async fn lookup_op_id(&self, op_id: &OpId) -> DbResult<Option<ActionOutcomeRecord>> {
        self.read_with(|tx| {
            let table = tx.open_table(&tables::events_by_op_id::TABLE)?;
            Ok(table.get(op_id)?.map(|g| g.value()))
        })
        .await
    }
}

impl Store {
    /// Scoped acquisition of a write transaction: runs `f`, commits on
    /// normal return, and never calls `on_commit` hooks if `f` fails or the
    /// commit itself fails.
    pub async fn transaction<T>(
        &self,
        f: impl FnOnce(&WriteTransactionCtx) -> DbResult<T>,
    ) -> DbResult<T> {
        self.write_with(f).await
    }

    pub async fn write_with<T>(
        &self,
        f: impl FnOnce(&WriteTransactionCtx) -> DbResult<T>,
    ) -> DbResult<T> {
        let inner = &self.inner;
        tokio::task::block_in_place(move || {
            let dbtx = WriteTransactionCtx::from(inner.begin_write().context(TransactionSnafu)?);
            let res = f(&dbtx)?;
            dbtx.commit().context(CommitSnafu)?;
            Ok(res)
        })
    }

    pub async fn read_with<T>(&self, f: impl FnOnce(&ReadTransaction) -> DbResult<T>) -> DbResult<T> {
        let inner = &self.inner;
        tokio::task::block_in_place(move || {
            let tx = inner.begin_read().context(TransactionSnafu)?;
            f(&tx)
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::errors::DbError;

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn open_creates_an_on_disk_file_and_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feedsim.redb");

        let store = Store::open(path.clone()).await.unwrap();
        store.init(false).await.unwrap();
        store
            .write_with(|tx| Store::append_tx(tx, EventKind::RunStarted, Tick(0), "{}".to_string()).map(|_| ()))
            .await
            .unwrap();
        drop(store);

        assert!(path.exists());

        // Reopening the same file must see the schema as already initialized.
        let reopened = Store::open(&path).await.unwrap();
        let result = reopened.init(false).await;
        assert!(matches!(result, Err(DbError::AlreadyInitialized { .. })));
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn init_without_force_on_fresh_db_succeeds_once() {
        let store = Store::open_in_memory().await.unwrap();
        store.init(false).await.unwrap();
        let second = store.init(false).await;
        assert!(matches!(second, Err(DbError::AlreadyInitialized { .. })));
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn init_with_force_recreates_schema() {
        let store = Store::open_in_memory().await.unwrap();
        store.init(false).await.unwrap();

        store
            .write_with(|tx| Store::append_tx(tx, EventKind::RunStarted, Tick(0), "{}".to_string()).map(|_| ()))
            .await
            .unwrap();

        store.init(true).await.unwrap();

        let events = store.scan(Seq(0)).await.unwrap();
        assert!(events.is_empty(), "force re-init must drop prior events");
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn scan_is_restartable_from_an_arbitrary_seq() {
        let store = Store::open_in_memory().await.unwrap();
        store.init(false).await.unwrap();

        for _ in 0..3 {
            store
                .write_with(|tx| Store::append_tx(tx, EventKind::AdvanceTick, Tick(0), "{}".to_string()).map(|_| ()))
                .await
                .unwrap();
        }

        let all = store.scan(Seq(0)).await.unwrap();
        assert_eq!(all.len(), 3);

        let from_second = store.scan(Seq(2)).await.unwrap();
        assert_eq!(from_second.len(), 2);
        assert_eq!(from_second[0].seq, Seq(2));
    }
}
