//! Whole-file persistence for the rate snapshot.

use crate::error::{RateError, Result};
use crate::model::RateSnapshot;
use anyhow::Context;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Reads and writes the rate cache as a single JSON document.
///
/// A missing file reads as an empty snapshot; writes go through a temp file
/// and rename so readers never observe a half-written document.
pub struct RateStore {
    path: PathBuf,
}

impl RateStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn load(&self) -> Result<RateSnapshot> {
        if !self.path.exists() {
            debug!("No rate snapshot at {}, starting empty", self.path.display());
            return Ok(RateSnapshot::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read rate snapshot: {}", self.path.display()))
            .map_err(RateError::StoreUnavailable)?;

        let snapshot = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse rate snapshot: {}", self.path.display()))
            .map_err(RateError::StoreUnavailable)?;
        debug!("Loaded rate snapshot from {}", self.path.display());
        Ok(snapshot)
    }

    pub fn save(&self, snapshot: &RateSnapshot) -> Result<()> {
        let write = || -> anyhow::Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }

            let contents = serde_json::to_string_pretty(snapshot)?;
            let tmp_path = self.path.with_extension("json.tmp");
            fs::write(&tmp_path, contents)
                .with_context(|| format!("Failed to write snapshot: {}", tmp_path.display()))?;
            fs::rename(&tmp_path, &self.path)
                .with_context(|| format!("Failed to replace snapshot: {}", self.path.display()))?;
            Ok(())
        };

        write().map_err(RateError::StoreUnavailable)?;
        debug!(
            "Persisted rate snapshot with {} entries to {}",
            snapshot.rates.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CachedRate;
    use chrono::Utc;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_loads_empty_snapshot() {
        let dir = tempdir().unwrap();
        let store = RateStore::new(dir.path().join("rates.json"));

        let snapshot = store.load().unwrap();
        assert!(snapshot.rates.is_empty());
        assert!(snapshot.global_last_updated.is_none());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = RateStore::new(dir.path().join("rates.json"));

        let now = Utc::now();
        let mut snapshot = RateSnapshot::default();
        snapshot.upsert(CachedRate::new(
            "bitcoin",
            HashMap::from([("usd".to_string(), 50000.0)]),
            now,
        ));
        snapshot.global_last_updated = Some(now);
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.rates.len(), 1);
        assert_eq!(loaded.entry("bitcoin").unwrap().currency_rate_map["usd"], 50000.0);
        assert_eq!(loaded.global_last_updated, Some(now));
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempdir().unwrap();
        let store = RateStore::new(dir.path().join("nested/data/rates.json"));

        store.save(&RateSnapshot::default()).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_corrupt_file_is_store_unavailable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rates.json");
        std::fs::write(&path, "not json").unwrap();

        let store = RateStore::new(path);
        let err = store.load().unwrap_err();
        assert!(matches!(err, RateError::StoreUnavailable(_)));
    }
}
