use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{AnalysisStore, StoreError, StoredAnalysis};
use crate::analysis::AnalysisRecord;

/// Process-local [`AnalysisStore`].
///
/// Every property id is treated as existing; an unknown id loads as an empty
/// record at version 0.
#[derive(Debug, Default)]
pub struct MemoryAnalysisStore {
    records: Mutex<HashMap<String, StoredAnalysis>>,
}

impl MemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, as if an earlier analysis had been stored.
    pub async fn insert(&self, property_id: &str, record: AnalysisRecord) {
        let mut records = self.records.lock().await;
        let entry = records.entry(property_id.to_string()).or_default();
        entry.record = Some(record);
        entry.version += 1;
        entry.updated_at = Some(Utc::now());
    }

    /// Number of successful writes for `property_id`.
    pub async fn version(&self, property_id: &str) -> i64 {
        self.records
            .lock()
            .await
            .get(property_id)
            .map_or(0, |s| s.version)
    }
}

#[async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn load(&self, property_id: &str) -> Result<StoredAnalysis, StoreError> {
        Ok(self
            .records
            .lock()
            .await
            .get(property_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn store(
        &self,
        property_id: &str,
        record: &AnalysisRecord,
        updated_at: DateTime<Utc>,
        expected_version: i64,
    ) -> Result<i64, StoreError> {
        let mut records = self.records.lock().await;
        let entry = records.entry(property_id.to_string()).or_default();
        if entry.version != expected_version {
            return Err(StoreError::Conflict {
                property_id: property_id.to_string(),
                expected: expected_version,
            });
        }

        entry.record = Some(record.clone());
        entry.version += 1;
        entry.updated_at = Some(updated_at);
        Ok(entry.version)
    }
}
