//! The analysis pipeline: acquire image, build prompt, call the model,
//! normalize, then load/reconcile/store under a per-property lease.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::analysis::{AnalysisMode, AnalysisRecord, AnalysisStatus, normalize, reconcile};
use crate::image::{AcquisitionError, ImageAcquirer};
use crate::model::{ModelError, ModelInvoker};
use crate::prompt::build_prompt;
use crate::store::{AnalysisStore, PropertyLocks, StoreError};

/// How long a request waits for another request on the same property.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(10);

/// One analysis request, already validated for shape.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub image_ref: String,
    pub property_id: String,
    pub mode: AnalysisMode,
    pub context: Option<Map<String, Value>>,
    pub instruction_override: Option<String>,
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    /// The merged record as persisted.
    pub record: AnalysisRecord,
    /// Model that produced the new section.
    pub model: String,
    pub status: AnalysisStatus,
    pub version: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("model API error on {model}{}: {detail}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Upstream {
        model: String,
        status: Option<u16>,
        detail: String,
    },

    #[error("model {model} returned an empty response")]
    EmptyResponse { model: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Persistence(String),
}

impl AnalysisError {
    /// Short label used as the `error` field of HTTP error bodies.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Invalid request",
            Self::Acquisition(_) => "Failed to acquire plan image",
            Self::Upstream { .. } => "Model API error",
            Self::EmptyResponse { .. } => "Empty model response",
            Self::Conflict(_) => "Concurrent update conflict",
            Self::Persistence(_) => "Failed to save analysis",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Conflict(_) => 409,
            _ => 500,
        }
    }
}

impl From<ModelError> for AnalysisError {
    fn from(err: ModelError) -> Self {
        match err {
            // Only reached when the fallback was not found either.
            ModelError::NotFound { model } => Self::Upstream {
                detail: format!("model {model} not found"),
                model,
                status: Some(404),
            },
            ModelError::Upstream {
                model,
                status,
                detail,
            } => Self::Upstream {
                model,
                status,
                detail,
            },
            ModelError::EmptyResponse { model } => Self::EmptyResponse { model },
        }
    }
}

impl From<StoreError> for AnalysisError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => Self::Conflict(err.to_string()),
            StoreError::PropertyNotFound(_) | StoreError::Backend(_) => {
                Self::Persistence(err.to_string())
            }
        }
    }
}

/// Runs analysis requests end to end.
#[derive(Clone)]
pub struct PlanAnalyzer {
    acquirer: ImageAcquirer,
    invoker: ModelInvoker,
    store: Arc<dyn AnalysisStore>,
    locks: PropertyLocks,
    lock_wait: Duration,
}

impl PlanAnalyzer {
    pub fn new(acquirer: ImageAcquirer, invoker: ModelInvoker, store: Arc<dyn AnalysisStore>) -> Self {
        Self {
            acquirer,
            invoker,
            store,
            locks: PropertyLocks::new(),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome, AnalysisError> {
        let property_id = request.property_id.as_str();
        let mode = request.mode;
        info!(property_id, %mode, image_ref = %request.image_ref, "starting plan analysis");

        let image = self.acquirer.acquire(&request.image_ref).await?;
        info!(
            property_id,
            mime_type = %image.mime_type,
            size_bytes = image.size_bytes(),
            "plan image acquired"
        );

        let prompt = build_prompt(
            mode,
            request.context.as_ref(),
            request.instruction_override.as_deref(),
        );
        let reply = self.invoker.invoke(&prompt, &image).await?;
        drop(image);

        let result = normalize(&reply.text, mode);
        let status = result.status();
        if status == AnalysisStatus::Degraded {
            warn!(property_id, %mode, model = %reply.model, "storing degraded analysis");
        }
        let section = result.into_section(&reply.model, Utc::now());

        let _lease = self
            .locks
            .acquire(property_id, self.lock_wait)
            .await
            .map_err(|e| AnalysisError::Conflict(e.to_string()))?;

        let current = self.store.load(property_id).await?;
        let record = reconcile(current.record, section);
        let version = self
            .store
            .store(property_id, &record, Utc::now(), current.version)
            .await?;

        info!(property_id, %mode, model = %reply.model, %status, version, "analysis saved");
        Ok(AnalysisOutcome {
            record,
            model: reply.model,
            status,
            version,
        })
    }
}
