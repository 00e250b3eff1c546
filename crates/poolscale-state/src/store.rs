//! StateStore — redb-backed persistence for pause flags and metadata history.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(AUTOSCALER_PAUSED).map_err(map_err!(Table))?;
        txn.open_table(METADATA).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Pause flags ────────────────────────────────────────────────

    /// Pause autoscaling for `key`, optionally until `until` (unix seconds).
    pub fn pause_autoscaler(&self, key: &str, now: u64, until: Option<u64>) -> StateResult<()> {
        let record = PauseRecord {
            paused_at: now,
            expiration_timestamp: until,
        };
        let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(AUTOSCALER_PAUSED).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, ?until, "autoscaler paused");
        Ok(())
    }

    /// Remove the pause flag for `key`. Returns true if one existed.
    pub fn resume_autoscaler(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(AUTOSCALER_PAUSED).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "autoscaler resumed");
        Ok(existed)
    }

    /// The stored pause record for `key`, expired or not.
    pub fn autoscaler_pause(&self, key: &str) -> StateResult<Option<PauseRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AUTOSCALER_PAUSED).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: PauseRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Whether a pause for `key` is in effect at `now`.
    pub fn autoscaler_is_paused(&self, key: &str, now: u64) -> StateResult<bool> {
        Ok(self
            .autoscaler_pause(key)?
            .is_some_and(|record| record.is_active(now)))
    }

    // ── Metadata ───────────────────────────────────────────────────

    /// Record one metadata value.
    pub fn put_metadata(
        &self,
        metric: &str,
        dimensions: &str,
        timestamp: u64,
        value: f64,
    ) -> StateResult<()> {
        let key = metadata_key(metric, dimensions, timestamp);
        let point = MetadataPoint { timestamp, value };
        let bytes = serde_json::to_vec(&point).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(METADATA).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// All points for `metric`/`dimensions` with `start <= timestamp <= end`,
    /// oldest first.
    pub fn metadata_values(
        &self,
        metric: &str,
        dimensions: &str,
        start: u64,
        end: u64,
    ) -> StateResult<Vec<MetadataPoint>> {
        if start > end {
            return Ok(Vec::new());
        }
        let low = metadata_key(metric, dimensions, start);
        let high = metadata_key(metric, dimensions, end);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(METADATA).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range::<&str>(low.as_str()..=high.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let point: MetadataPoint =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(point);
        }
        Ok(results)
    }

    /// Delete points older than `before` across all metrics. Returns the
    /// number of points removed.
    pub fn prune_metadata(&self, before: u64) -> StateResult<u32> {
        let keys: Vec<String> = {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(METADATA).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let point: MetadataPoint =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if point.timestamp < before {
                    keys.push(key.value().to_string());
                }
            }
            keys
        };

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut count = 0u32;
        {
            let mut table = txn.open_table(METADATA).map_err(map_err!(Table))?;
            for key in &keys {
                if table.remove(key.as_str()).map_err(map_err!(Write))?.is_some() {
                    count += 1;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count, before, "metadata pruned");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIMS: &str = "cluster=norcal-prod,pool=batch.mesos";

    fn store() -> StateStore {
        StateStore::open_in_memory().unwrap()
    }

    // ── Pause flags ────────────────────────────────────────────────

    #[test]
    fn unpaused_by_default() {
        let store = store();
        assert!(!store.autoscaler_is_paused("a.b.mesos", 100).unwrap());
        assert!(store.autoscaler_pause("a.b.mesos").unwrap().is_none());
    }

    #[test]
    fn pause_and_resume() {
        let store = store();
        store.pause_autoscaler("a.b.mesos", 100, None).unwrap();
        assert!(store.autoscaler_is_paused("a.b.mesos", 10_000).unwrap());
        assert!(!store.autoscaler_is_paused("a.c.mesos", 10_000).unwrap());

        assert!(store.resume_autoscaler("a.b.mesos").unwrap());
        assert!(!store.autoscaler_is_paused("a.b.mesos", 10_000).unwrap());
        assert!(!store.resume_autoscaler("a.b.mesos").unwrap());
    }

    #[test]
    fn pause_with_expiration() {
        let store = store();
        store.pause_autoscaler("a.b.mesos", 100, Some(500)).unwrap();
        assert!(store.autoscaler_is_paused("a.b.mesos", 500).unwrap());
        assert!(!store.autoscaler_is_paused("a.b.mesos", 501).unwrap());
        // The record is kept after expiry.
        assert_eq!(
            store.autoscaler_pause("a.b.mesos").unwrap().unwrap().expiration_timestamp,
            Some(500)
        );
    }

    // ── Metadata ───────────────────────────────────────────────────

    #[test]
    fn metadata_window_is_inclusive_and_ordered() {
        let store = store();
        for ts in [300, 100, 200, 400] {
            store.put_metadata("cpus_total", DIMS, ts, ts as f64 / 10.0).unwrap();
        }
        let points = store.metadata_values("cpus_total", DIMS, 200, 300).unwrap();
        assert_eq!(
            points,
            vec![
                MetadataPoint { timestamp: 200, value: 20.0 },
                MetadataPoint { timestamp: 300, value: 30.0 },
            ]
        );
    }

    #[test]
    fn metadata_is_isolated_by_metric_and_dimensions() {
        let store = store();
        store.put_metadata("cpus_total", DIMS, 100, 1.0).unwrap();
        store.put_metadata("cpus_totally", DIMS, 100, 2.0).unwrap();
        store
            .put_metadata("cpus_total", "cluster=other,pool=batch.mesos", 100, 3.0)
            .unwrap();

        let points = store.metadata_values("cpus_total", DIMS, 0, 1_000).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, 1.0);
    }

    #[test]
    fn metadata_empty_or_inverted_window() {
        let store = store();
        store.put_metadata("mem_total", DIMS, 100, 1.0).unwrap();
        assert!(store.metadata_values("mem_total", DIMS, 200, 100).unwrap().is_empty());
        assert!(store.metadata_values("disk_total", DIMS, 0, 1_000).unwrap().is_empty());
    }

    #[test]
    fn prune_old_metadata() {
        let store = store();
        for ts in [100, 200, 300] {
            store.put_metadata("gpus_total", DIMS, ts, 1.0).unwrap();
        }
        assert_eq!(store.prune_metadata(250).unwrap(), 2);
        let points = store.metadata_values("gpus_total", DIMS, 0, 1_000).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].timestamp, 300);
    }

    #[test]
    fn on_disk_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");
        {
            let store = StateStore::open(&path).unwrap();
            store.pause_autoscaler("a.b.mesos", 1, None).unwrap();
            store.put_metadata("cpus_total", DIMS, 5, 2.5).unwrap();
        }
        let store = StateStore::open(&path).unwrap();
        assert!(store.autoscaler_is_paused("a.b.mesos", 2).unwrap());
        assert_eq!(store.metadata_values("cpus_total", DIMS, 0, 10).unwrap().len(), 1);
    }
}
