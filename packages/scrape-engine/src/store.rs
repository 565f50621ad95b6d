//! Record sink: the storage collaborator.
//!
//! The engine hands every accepted [`NormalizedRecord`] to a [`RecordSink`],
//! which upserts its rows by natural key and reports how many were new.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{NormalizedRecord, RecordRow};

/// Rows written by one upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
}

/// Insert-or-update by natural key.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn upsert(&self, record: &NormalizedRecord) -> Result<UpsertCounts, StoreError>;
}

/// In-memory sink for tests and test-mode runs.
///
/// Data is lost on drop.
pub struct MemoryRecordStore {
    rows: RwLock<HashMap<String, RecordRow>>,
    unavailable: AtomicBool,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Reject every upsert while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, natural_key: &str) -> Option<RecordRow> {
        self.rows.read().unwrap().get(natural_key).cloned()
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.rows.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.rows.write().unwrap().clear();
    }
}

#[async_trait]
impl RecordSink for MemoryRecordStore {
    async fn upsert(&self, record: &NormalizedRecord) -> Result<UpsertCounts, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::new("store unavailable"));
        }

        let mut counts = UpsertCounts::default();
        let mut rows = self.rows.write().unwrap();
        for row in record.rows() {
            match rows.insert(row.natural_key.clone(), row) {
                Some(_) => counts.updated += 1,
                None => counts.inserted += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Observation, Provenance, RecordData, StatisticsRecord, StrategyKind};

    fn record(periods: &[&str]) -> NormalizedRecord {
        NormalizedRecord::new(
            Provenance {
                source: "statistics".to_string(),
                target_key: "t1".to_string(),
                attempt_count: 1,
                strategy_used: StrategyKind::Mock,
                content_hash: Provenance::hash_content(&format!("{periods:?}")),
            },
            RecordData::Statistics(StatisticsRecord {
                table_id: "t1".to_string(),
                title: "GDP".to_string(),
                unit: None,
                observations: periods
                    .iter()
                    .map(|p| Observation {
                        period: p.to_string(),
                        value: 1.0,
                    })
                    .collect(),
            }),
        )
    }

    #[tokio::test]
    async fn test_upsert_counts_inserts_then_updates() {
        let store = MemoryRecordStore::new();

        let first = store.upsert(&record(&["2023 Q1", "2023 Q2"])).await.unwrap();
        assert_eq!(first, UpsertCounts { inserted: 2, updated: 0 });

        let second = store.upsert(&record(&["2023 Q2", "2023 Q3"])).await.unwrap();
        assert_eq!(second, UpsertCounts { inserted: 1, updated: 1 });

        assert_eq!(store.len(), 3);
        assert_eq!(
            store.keys(),
            vec!["statistics:t1:2023 Q1", "statistics:t1:2023 Q2", "statistics:t1:2023 Q3"]
        );
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects() {
        let store = MemoryRecordStore::new();
        store.set_unavailable(true);
        assert!(store.upsert(&record(&["2023 Q1"])).await.is_err());
        assert!(store.is_empty());
    }
}
