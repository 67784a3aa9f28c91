//! Database query functions for the plan-analysis columns of `houses`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::models::{AnalysisCoverage, HouseAnalysis};

/// Insert a bare property row. Normally done by the registration flow.
pub async fn insert_house(pool: &PgPool, id: &str, plan_url: Option<&str>) -> Result<()> {
    sqlx::query("INSERT INTO houses (id, plan_url) VALUES ($1, $2)")
        .bind(id)
        .bind(plan_url)
        .execute(pool)
        .await
        .with_context(|| format!("failed to insert house {id}"))?;

    Ok(())
}

/// Fetch the analysis columns of a property. `None` when the row is absent.
pub async fn get_analysis(pool: &PgPool, id: &str) -> Result<Option<HouseAnalysis>> {
    let row = sqlx::query_as::<_, HouseAnalysis>(
        "SELECT id, plan_analysis, analysis_version, updated_at \
         FROM houses WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to fetch plan analysis for house {id}"))?;

    Ok(row)
}

/// Replace the stored analysis with optimistic locking on `analysis_version`.
///
/// Returns the number of rows updated: `0` means either the row is gone or
/// another writer bumped the version since `expected_version` was read.
pub async fn update_analysis(
    pool: &PgPool,
    id: &str,
    analysis: &serde_json::Value,
    updated_at: DateTime<Utc>,
    expected_version: i64,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE houses \
         SET plan_analysis = $1, \
             updated_at = $2, \
             analysis_version = analysis_version + 1 \
         WHERE id = $3 AND analysis_version = $4",
    )
    .bind(Json(analysis))
    .bind(updated_at)
    .bind(id)
    .bind(expected_version)
    .execute(pool)
    .await
    .with_context(|| format!("failed to update plan analysis for house {id}"))?;

    Ok(result.rows_affected())
}

/// Whether a property row exists.
pub async fn house_exists(pool: &PgPool, id: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM houses WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await
        .with_context(|| format!("failed to look up house {id}"))?;

    Ok(exists)
}

/// Count properties, and how many of them carry a stored analysis.
pub async fn analysis_coverage(pool: &PgPool) -> Result<AnalysisCoverage> {
    let (houses, analyzed): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(plan_analysis) FROM houses",
    )
    .fetch_one(pool)
    .await
    .context("failed to count houses")?;

    Ok(AnalysisCoverage { houses, analyzed })
}
