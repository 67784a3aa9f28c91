//! Persistence gateway for per-property analysis records.
//!
//! [`AnalysisStore`] is the seam to the record backend. Writes are guarded by
//! an optimistic version check: `store` only succeeds if nobody else wrote
//! since the matching `load`. Within one process, [`PropertyLocks`]
//! serializes the load/reconcile/store cycle per property so concurrent
//! requests queue instead of conflicting.

pub mod locks;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analysis::AnalysisRecord;

pub use locks::{PropertyLease, PropertyLocks};
pub use memory::MemoryAnalysisStore;
pub use postgres::PgAnalysisStore;

/// The persisted state of one property's analysis.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoredAnalysis {
    /// `None` before the first analysis.
    pub record: Option<AnalysisRecord>,
    /// Bumped by every successful store.
    pub version: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("property {0} not found")]
    PropertyNotFound(String),

    #[error("analysis for property {property_id} changed concurrently (expected version {expected})")]
    Conflict { property_id: String, expected: i64 },

    #[error("storage backend error: {0:#}")]
    Backend(#[from] anyhow::Error),
}

/// Read and versioned write of analysis records.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Current record and version for `property_id`.
    async fn load(&self, property_id: &str) -> Result<StoredAnalysis, StoreError>;

    /// Replace the record if its version is still `expected_version`,
    /// stamping `updated_at`. Returns the new version.
    async fn store(
        &self,
        property_id: &str,
        record: &AnalysisRecord,
        updated_at: DateTime<Utc>,
        expected_version: i64,
    ) -> Result<i64, StoreError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn AnalysisStore) {}
};
