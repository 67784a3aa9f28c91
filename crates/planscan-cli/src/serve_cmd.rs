use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use planscan_core::analysis::{AnalysisMode, AnalysisRecord};
use planscan_core::image::{HttpObjectStore, ImageAcquirer};
use planscan_core::model::{GeminiClient, ModelInvoker};
use planscan_core::pipeline::{AnalysisError, AnalysisRequest, PlanAnalyzer};
use planscan_core::store::{AnalysisStore, PgAnalysisStore, StoreError};

use crate::config::PlanscanConfig;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    error: String,
    details: String,
    property_id: Option<String>,
}

impl AppError {
    pub fn validation(property_id: Option<String>, details: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: "Invalid request".to_string(),
            details: details.into(),
            property_id,
        }
    }

    pub fn not_found(property_id: &str, details: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: "Not found".to_string(),
            details: details.into(),
            property_id: Some(property_id.to_string()),
        }
    }

    pub fn analysis(property_id: &str, err: &AnalysisError) -> Self {
        Self {
            status: StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            error: err.label().to_string(),
            details: err.to_string(),
            property_id: Some(property_id.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({
            "error": self.error,
            "details": self.details,
            "propertyId": self.property_id.as_deref().unwrap_or("N/A"),
        });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub message: String,
    pub analysis: AnalysisRecord,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAnalysisResponse {
    pub property_id: String,
    pub analysis: AnalysisRecord,
    pub version: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// State and router
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<PlanAnalyzer>,
    pub store: Arc<dyn AnalysisStore>,
}

impl AppState {
    /// Wire the production collaborators from resolved config.
    pub fn from_config(config: &PlanscanConfig, pool: PgPool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("failed to build HTTP client")?;

        let store: Arc<dyn AnalysisStore> = Arc::new(PgAnalysisStore::new(pool));
        let acquirer = ImageAcquirer::new(
            Arc::new(HttpObjectStore::new(http.clone(), &config.storage_config)),
            http.clone(),
            config.storage_config.bucket.clone(),
            config.http_timeout,
        );
        let invoker = ModelInvoker::new(
            Arc::new(GeminiClient::new(http, &config.model_config)),
            config.model_config.primary_model.clone(),
            config.model_config.fallback_model.clone(),
        );

        Ok(Self {
            analyzer: Arc::new(
                PlanAnalyzer::new(acquirer, invoker, store.clone()).with_lock_wait(config.lock_wait),
            ),
            store,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/analyze-plan", post(analyze_plan))
        .route("/api/analyze", post(analyze_plan))
        .route("/api/properties/{id}/analysis", get(get_analysis))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("planscan serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("planscan serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Request parsing
// ---------------------------------------------------------------------------

/// First present, non-null field among `names`.
fn field<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| fields.get(*name).filter(|v| !v.is_null()))
}

/// Field as non-blank text. Numbers are accepted for ids.
fn field_text(fields: &Map<String, Value>, names: &[&str]) -> Option<String> {
    match field(fields, names)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Validate the analyze body. Legacy field names (`planUrl`, `houseId`,
/// `promptInstruction`) are accepted alongside the current ones.
fn parse_analyze_body(body: &[u8]) -> Result<AnalysisRequest, AppError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::validation(None, format!("request body is not valid JSON: {e}")))?;
    let Value::Object(fields) = value else {
        return Err(AppError::validation(None, "request body must be a JSON object"));
    };

    let property_id = field_text(&fields, &["propertyId", "houseId"]);
    let invalid = |details: String| AppError::validation(property_id.clone(), details);

    let image_ref = field_text(&fields, &["imageRef", "planUrl"]);
    let mode = field_text(&fields, &["mode"]);
    let (Some(image_ref), Some(id), Some(mode)) = (image_ref, property_id.clone(), mode) else {
        return Err(invalid("imageRef, propertyId and mode are required".to_string()));
    };
    let mode: AnalysisMode = mode.parse().map_err(|e| invalid(format!("{e}")))?;

    let context = match field(&fields, &["contextData"]) {
        None => None,
        Some(Value::Object(map)) => Some(map.clone()),
        Some(_) => return Err(invalid("contextData must be a JSON object".to_string())),
    };

    Ok(AnalysisRequest {
        image_ref,
        property_id: id,
        mode,
        context,
        instruction_override: field_text(&fields, &["instructionOverride", "promptInstruction"]),
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn analyze_plan(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<axum::response::Response, AppError> {
    let request = parse_analyze_body(&body).inspect_err(|e| {
        error!(
            property_id = e.property_id.as_deref().unwrap_or("N/A"),
            details = %e.details,
            "rejected analysis request"
        );
    })?;

    let outcome = state.analyzer.analyze(&request).await.map_err(|err| {
        error!(property_id = %request.property_id, error = %err, "plan analysis failed");
        AppError::analysis(&request.property_id, &err)
    })?;

    Ok(Json(AnalyzeResponse {
        success: true,
        message: format!("{} analysis saved", request.mode),
        analysis: outcome.record,
    })
    .into_response())
}

async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<axum::response::Response, AppError> {
    let stored = match state.store.load(&id).await {
        Ok(stored) => stored,
        Err(StoreError::PropertyNotFound(_)) => {
            return Err(AppError::not_found(&id, format!("property {id} not found")));
        }
        Err(err) => return Err(AppError::analysis(&id, &AnalysisError::from(err))),
    };
    let Some(analysis) = stored.record else {
        return Err(AppError::not_found(&id, format!("property {id} has no analysis yet")));
    };

    Ok(Json(StoredAnalysisResponse {
        property_id: id,
        analysis,
        version: stored.version,
        updated_at: stored.updated_at,
    })
    .into_response())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
