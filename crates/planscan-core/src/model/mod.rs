//! Vision model invocation.
//!
//! [`GenerativeModel`] is the adapter seam for the model endpoint;
//! [`GeminiClient`] is the production implementation. [`ModelInvoker`] adds
//! the one-shot fallback: when the primary model name is reported as not
//! found, the same request is sent once to the fallback model. No other
//! failure is retried.

pub mod gemini;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::image::ImageAsset;
use crate::prompt::Prompt;

pub use gemini::GeminiClient;

/// Failure classes of a model call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// The named model does not exist or is not available to this key.
    #[error("model {model} not found")]
    NotFound { model: String },

    /// Any other failure: non-success status or transport error.
    #[error("model API error on {model}{}: {detail}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Upstream {
        model: String,
        status: Option<u16>,
        detail: String,
    },

    /// Success status, but no text in the response.
    #[error("model {model} returned an empty response")]
    EmptyResponse { model: String },
}

/// Adapter interface for a multimodal text-generation endpoint.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Send `prompt` and `image` to `model`, requesting JSON output, and
    /// return the generated text.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        image: &ImageAsset,
    ) -> Result<String, ModelError>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn GenerativeModel) {}
};

/// Endpoint settings and model names.
#[derive(Clone)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub primary_model: String,
    pub fallback_model: String,
    pub timeout: Duration,
}

impl ModelConfig {
    pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
    pub const DEFAULT_PRIMARY_MODEL: &str = "gemini-1.5-flash-002";
    pub const DEFAULT_FALLBACK_MODEL: &str = "gemini-1.5-pro-002";
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("primary_model", &self.primary_model)
            .field("fallback_model", &self.fallback_model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Generated text and the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub model: String,
}

/// Calls the primary model, falling back once on [`ModelError::NotFound`].
#[derive(Clone)]
pub struct ModelInvoker {
    client: Arc<dyn GenerativeModel>,
    primary_model: String,
    fallback_model: String,
}

impl ModelInvoker {
    pub fn new(
        client: Arc<dyn GenerativeModel>,
        primary_model: impl Into<String>,
        fallback_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            primary_model: primary_model.into(),
            fallback_model: fallback_model.into(),
        }
    }

    pub fn primary_model(&self) -> &str {
        &self.primary_model
    }

    pub async fn invoke(&self, prompt: &Prompt, image: &ImageAsset) -> Result<ModelReply, ModelError> {
        let text = prompt.combined();

        info!(model = %self.primary_model, "calling model");
        match self.client.generate(&self.primary_model, &text, image).await {
            Ok(reply) => Ok(ModelReply {
                text: reply,
                model: self.primary_model.clone(),
            }),
            Err(ModelError::NotFound { model }) => {
                warn!(
                    model = %model,
                    fallback = %self.fallback_model,
                    "model not found; retrying with fallback"
                );
                let reply = self
                    .client
                    .generate(&self.fallback_model, &text, image)
                    .await?;
                Ok(ModelReply {
                    text: reply,
                    model: self.fallback_model.clone(),
                })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Replays scripted outcomes and records which models were called.
    struct Scripted {
        outcomes: Mutex<VecDeque<Result<String, ModelError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(outcomes: Vec<Result<String, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerativeModel for Scripted {
        async fn generate(
            &self,
            model: &str,
            _prompt: &str,
            _image: &ImageAsset,
        ) -> Result<String, ModelError> {
            self.calls.lock().unwrap().push(model.to_string());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected extra model call")
        }
    }

    fn prompt() -> Prompt {
        Prompt {
            system: "sys".into(),
            user: "usr".into(),
        }
    }

    fn image() -> ImageAsset {
        ImageAsset {
            bytes: vec![1, 2, 3],
            mime_type: "image/png".into(),
        }
    }

    fn invoker(client: Arc<Scripted>) -> ModelInvoker {
        ModelInvoker::new(client, "primary", "fallback")
    }

    #[tokio::test]
    async fn primary_success_makes_one_call() {
        let client = Scripted::new(vec![Ok("{}".into())]);
        let reply = invoker(client.clone()).invoke(&prompt(), &image()).await.unwrap();
        assert_eq!(reply.model, "primary");
        assert_eq!(client.calls(), vec!["primary"]);
    }

    #[tokio::test]
    async fn not_found_falls_back_once() {
        let client = Scripted::new(vec![
            Err(ModelError::NotFound { model: "primary".into() }),
            Ok("{\"summary\":\"ok\"}".into()),
        ]);
        let reply = invoker(client.clone()).invoke(&prompt(), &image()).await.unwrap();
        assert_eq!(reply.model, "fallback");
        assert_eq!(reply.text, "{\"summary\":\"ok\"}");
        assert_eq!(client.calls(), vec!["primary", "fallback"]);
    }

    #[tokio::test]
    async fn fallback_not_found_is_not_chained() {
        let client = Scripted::new(vec![
            Err(ModelError::NotFound { model: "primary".into() }),
            Err(ModelError::NotFound { model: "fallback".into() }),
        ]);
        let err = invoker(client.clone()).invoke(&prompt(), &image()).await.unwrap_err();
        assert_eq!(err, ModelError::NotFound { model: "fallback".into() });
        assert_eq!(client.calls().len(), 2);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        for failure in [
            ModelError::Upstream {
                model: "primary".into(),
                status: Some(500),
                detail: "boom".into(),
            },
            ModelError::Upstream {
                model: "primary".into(),
                status: None,
                detail: "connection refused".into(),
            },
            ModelError::EmptyResponse { model: "primary".into() },
        ] {
            let client = Scripted::new(vec![Err(failure.clone())]);
            let err = invoker(client.clone()).invoke(&prompt(), &image()).await.unwrap_err();
            assert_eq!(err, failure);
            assert_eq!(client.calls(), vec!["primary"]);
        }
    }

    #[test]
    fn upstream_error_message_includes_status() {
        let err = ModelError::Upstream {
            model: "m".into(),
            status: Some(429),
            detail: "quota".into(),
        };
        assert_eq!(err.to_string(), "model API error on m (429): quota");
    }

    #[test]
    fn config_debug_redacts_key() {
        let config = ModelConfig {
            api_key: "AIza-secret".into(),
            base_url: ModelConfig::DEFAULT_BASE_URL.into(),
            primary_model: ModelConfig::DEFAULT_PRIMARY_MODEL.into(),
            fallback_model: ModelConfig::DEFAULT_FALLBACK_MODEL.into(),
            timeout: Duration::from_secs(60),
        };
        assert!(!format!("{config:?}").contains("AIza-secret"));
    }
}
