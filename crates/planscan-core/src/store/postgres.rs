use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;

use planscan_db::queries::houses;

use super::{AnalysisStore, StoreError, StoredAnalysis};
use crate::analysis::AnalysisRecord;

/// [`AnalysisStore`] over the `houses.plan_analysis` column.
#[derive(Debug, Clone)]
pub struct PgAnalysisStore {
    pool: PgPool,
}

impl PgAnalysisStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalysisStore for PgAnalysisStore {
    async fn load(&self, property_id: &str) -> Result<StoredAnalysis, StoreError> {
        let row = houses::get_analysis(&self.pool, property_id)
            .await?
            .ok_or_else(|| StoreError::PropertyNotFound(property_id.to_string()))?;

        let record = match row.plan_analysis.map(|json| json.0) {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(other) => {
                // Not a record this service wrote; the next store replaces it.
                warn!(property_id, kind = %json_kind(&other), "ignoring non-object plan_analysis");
                None
            }
        };

        Ok(StoredAnalysis {
            record,
            version: row.analysis_version,
            updated_at: Some(row.updated_at),
        })
    }

    async fn store(
        &self,
        property_id: &str,
        record: &AnalysisRecord,
        updated_at: DateTime<Utc>,
        expected_version: i64,
    ) -> Result<i64, StoreError> {
        let value = Value::Object(record.clone());
        let rows =
            houses::update_analysis(&self.pool, property_id, &value, updated_at, expected_version)
                .await?;

        if rows == 0 {
            // Either the row is gone or another writer got there first.
            return if houses::house_exists(&self.pool, property_id).await? {
                Err(StoreError::Conflict {
                    property_id: property_id.to_string(),
                    expected: expected_version,
                })
            } else {
                Err(StoreError::PropertyNotFound(property_id.to_string()))
            };
        }

        Ok(expected_version + 1)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
