//! A single keyed table with optional JSON file backing

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::errors::FleetError;
use crate::filesys::file::File;

/// A row that can live in a `Table`
pub trait Record: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn record_id(&self) -> &str;
}

/// One row as it was before and after a write, kept until the write is on disk
struct Change<R> {
    id: String,
    before: Option<R>,
    after: Option<R>,
}

/// In-memory rows keyed by id with an optional JSON file behind them.
///
/// Regular mutations are written through: they hold the flush lock, write the
/// snapshot and undo themselves when the write fails. Deferred mutations only
/// mark the table dirty and reach disk with the next snapshot.
pub struct Table<R: Record> {
    name: &'static str,
    rows: RwLock<HashMap<String, R>>,
    file: Option<File>,
    flush_lock: Mutex<()>,
    dirty: AtomicBool,
    flushes: AtomicU64,
}

impl<R: Record> Table<R> {
    /// Create a table that is never persisted
    pub fn in_memory(name: &'static str) -> Self {
        Self::with_rows(name, HashMap::new(), None)
    }

    /// Open a table backed by `file`, loading existing rows
    pub async fn open(name: &'static str, file: File) -> Result<Self, FleetError> {
        let mut rows = HashMap::new();
        if file.exists().await {
            let records: Vec<R> = file.read_json().await.map_err(|e| {
                FleetError::StorageError(format!(
                    "failed to load table '{}' from {}: {}",
                    name,
                    file.path().display(),
                    e
                ))
            })?;
            for record in records {
                rows.insert(record.record_id().to_string(), record);
            }
        }
        debug!(table = name, rows = rows.len(), "Loaded table");

        Ok(Self::with_rows(name, rows, Some(file)))
    }

    fn with_rows(name: &'static str, rows: HashMap<String, R>, file: Option<File>) -> Self {
        Self {
            name,
            rows: RwLock::new(rows),
            file,
            flush_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
            flushes: AtomicU64::new(0),
        }
    }

    fn read_rows(&self) -> RwLockReadGuard<'_, HashMap<String, R>> {
        self.rows.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_rows(&self) -> RwLockWriteGuard<'_, HashMap<String, R>> {
        self.rows.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Get a row by id
    pub fn get(&self, id: &str) -> Option<R> {
        self.read_rows().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read_rows().contains_key(id)
    }

    /// All rows, in no particular order
    pub fn list(&self) -> Vec<R> {
        self.read_rows().values().cloned().collect()
    }

    /// Rows matching a predicate, in no particular order
    pub fn filter(&self, pred: impl Fn(&R) -> bool) -> Vec<R> {
        self.read_rows().values().filter(|r| pred(r)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read_rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deferred changes not yet on disk
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Snapshots successfully written since the table was opened
    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Acquire)
    }

    /// Insert or replace a row
    pub async fn upsert(&self, record: R) -> Result<R, FleetError> {
        let _flush = self.flush_lock.lock().await;
        let change = {
            let mut rows = self.write_rows();
            let id = record.record_id().to_string();
            let before = rows.insert(id.clone(), record.clone());
            Change {
                id,
                before,
                after: Some(record.clone()),
            }
        };
        self.write_through(vec![change]).await?;
        Ok(record)
    }

    /// Atomically insert or merge a row: `f` receives the current row, if any,
    /// and returns the row to store under `id`
    pub async fn merge(&self, id: &str, f: impl FnOnce(Option<&R>) -> R) -> Result<R, FleetError> {
        let _flush = self.flush_lock.lock().await;
        let (record, change) = {
            let mut rows = self.write_rows();
            let record = f(rows.get(id));
            let before = rows.insert(id.to_string(), record.clone());
            let change = Change {
                id: id.to_string(),
                before,
                after: Some(record.clone()),
            };
            (record, change)
        };
        self.write_through(vec![change]).await?;
        Ok(record)
    }

    /// Atomically mutate one row and write it through.
    ///
    /// `f` works on a copy; the copy replaces the stored row only when `f`
    /// returns `Ok` and the row actually changed. Returns `Ok(None)` when the
    /// row does not exist.
    pub async fn modify<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut R) -> Result<T, FleetError>,
    ) -> Result<Option<(T, R)>, FleetError> {
        let _flush = self.flush_lock.lock().await;
        let Some((out, row, change)) = self.apply(id, f)? else {
            return Ok(None);
        };
        if let Some(change) = change {
            self.write_through(vec![change]).await?;
        }
        Ok(Some((out, row)))
    }

    /// Like `modify`, but the change only marks the table dirty. It reaches
    /// disk with the next write-through or `flush_if_dirty`.
    pub fn modify_deferred<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut R) -> Result<T, FleetError>,
    ) -> Result<Option<(T, R)>, FleetError> {
        let Some((out, row, change)) = self.apply(id, f)? else {
            return Ok(None);
        };
        if change.is_some() && self.file.is_some() {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(Some((out, row)))
    }

    fn apply<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut R) -> Result<T, FleetError>,
    ) -> Result<Option<(T, R, Option<Change<R>>)>, FleetError> {
        let mut rows = self.write_rows();
        let Some(current) = rows.get_mut(id) else {
            return Ok(None);
        };
        let mut draft = current.clone();
        let out = f(&mut draft)?;
        if draft == *current {
            return Ok(Some((out, draft, None)));
        }
        let before = std::mem::replace(current, draft.clone());
        let change = Change {
            id: id.to_string(),
            before: Some(before),
            after: Some(draft.clone()),
        };
        Ok(Some((out, draft, Some(change))))
    }

    /// Delete a row, returning whether it existed
    pub async fn delete(&self, id: &str) -> Result<bool, FleetError> {
        let _flush = self.flush_lock.lock().await;
        let removed = self.write_rows().remove(id);
        let Some(before) = removed else {
            return Ok(false);
        };
        self.write_through(vec![Change {
            id: id.to_string(),
            before: Some(before),
            after: None,
        }])
        .await?;
        Ok(true)
    }

    /// Delete every row matching a predicate, returning the count removed
    pub async fn delete_where(&self, pred: impl Fn(&R) -> bool) -> Result<usize, FleetError> {
        let _flush = self.flush_lock.lock().await;
        let changes: Vec<Change<R>> = {
            let mut rows = self.write_rows();
            let ids: Vec<String> = rows
                .iter()
                .filter(|(_, r)| pred(r))
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    rows.remove(&id).map(|before| Change {
                        id,
                        before: Some(before),
                        after: None,
                    })
                })
                .collect()
        };
        let removed = changes.len();
        if removed > 0 {
            self.write_through(changes).await?;
        }
        Ok(removed)
    }

    /// Write the current snapshot, whether or not anything is dirty
    pub async fn persist(&self) -> Result<(), FleetError> {
        let _flush = self.flush_lock.lock().await;
        self.write_snapshot().await
    }

    /// Write the snapshot only when deferred changes are pending
    pub async fn flush_if_dirty(&self) -> Result<bool, FleetError> {
        if !self.is_dirty() {
            return Ok(false);
        }
        let _flush = self.flush_lock.lock().await;
        if !self.is_dirty() {
            return Ok(false);
        }
        self.write_snapshot().await?;
        Ok(true)
    }

    /// Persist after a mutation, undoing it when the write fails.
    /// The caller holds the flush lock.
    async fn write_through(&self, changes: Vec<Change<R>>) -> Result<(), FleetError> {
        if let Err(e) = self.write_snapshot().await {
            self.undo(changes);
            return Err(e);
        }
        Ok(())
    }

    /// Put back rows that still hold the value this write stored. A row that
    /// a deferred mutation touched since is left alone.
    fn undo(&self, changes: Vec<Change<R>>) {
        let mut rows = self.write_rows();
        for change in changes.into_iter().rev() {
            if rows.get(&change.id) != change.after.as_ref() {
                continue;
            }
            match change.before {
                Some(before) => {
                    rows.insert(change.id, before);
                }
                None => {
                    rows.remove(&change.id);
                }
            }
        }
        debug!(table = self.name, "Rolled back unpersisted write");
    }

    /// The caller holds the flush lock, so the last write to finish always
    /// carries the newest rows.
    async fn write_snapshot(&self) -> Result<(), FleetError> {
        let Some(file) = &self.file else {
            return Ok(());
        };

        let was_dirty = self.dirty.swap(false, Ordering::AcqRel);
        let records = {
            let rows = self.read_rows();
            let mut records: Vec<R> = rows.values().cloned().collect();
            records.sort_by(|a, b| a.record_id().cmp(b.record_id()));
            records
        };

        match file.write_json(&records).await {
            Ok(()) => {
                let flushes = self.flushes.fetch_add(1, Ordering::AcqRel) + 1;
                debug!(table = self.name, rows = records.len(), flushes, "Persisted table");
                Ok(())
            }
            Err(e) => {
                if was_dirty {
                    self.dirty.store(true, Ordering::Release);
                }
                error!(table = self.name, "Failed to persist table: {}", e);
                Err(FleetError::StorageError(format!(
                    "failed to persist table '{}': {}",
                    self.name, e
                )))
            }
        }
    }
}
