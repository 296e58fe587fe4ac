//! Language-model adapters.
//!
//! The runtime consumes models through the narrow [`LanguageModel`]
//! trait; [`registry::ModelRegistry`] lazily binds `(provider, modelId)`
//! pairs to handles with credentials resolved from configuration.
//! Concrete provider HTTP clients plug in through [`ModelFactory`]; the
//! crate ships [`scripted::ScriptedModel`] for tests and
//! [`scripted::EchoModel`] as the offline default.

pub mod registry;
pub mod scripted;

use std::sync::Arc;

use pa_domain::config::ProviderKind;
use pa_domain::stream::{BoxStream, ModelPart, ModelRequest};
use pa_domain::Result;

/// A bound, ready-to-call model handle.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Stream the model's response parts for one turn.
    async fn stream_turn(
        &self,
        req: ModelRequest,
    ) -> Result<BoxStream<'static, Result<ModelPart>>>;
}

/// Everything needed to construct a handle for one `(provider, modelId)`.
#[derive(Clone)]
pub struct ModelBinding {
    pub provider: ProviderKind,
    pub model_id: String,
    /// Resolved from the env var named by the provider's `apiKeyEnv`.
    pub api_key: Option<String>,
}

// Manual Debug so the resolved key never lands in logs.
impl std::fmt::Debug for ModelBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBinding")
            .field("provider", &self.provider)
            .field("model_id", &self.model_id)
            .field("api_key", &self.api_key.as_deref().map(|_| "***"))
            .finish()
    }
}

/// Constructs concrete handles; injected so the wiring (and tests) pick
/// the adapter set.
pub trait ModelFactory: Send + Sync {
    fn create(&self, binding: &ModelBinding) -> Result<Arc<dyn LanguageModel>>;
}

pub use registry::ModelRegistry;
pub use scripted::{EchoModel, OfflineFactory, ScriptedModel};
