use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use sqlx::types::Json;

/// The plan-analysis columns of a `houses` row.
///
/// `plan_analysis` is `None` until the first analysis has been stored.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HouseAnalysis {
    pub id: String,
    pub plan_analysis: Option<Json<serde_json::Value>>,
    pub analysis_version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Row counts reported by `planscan db-init`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnalysisCoverage {
    pub houses: i64,
    pub analyzed: i64,
}
