//! Model registry.
//!
//! Resolves `(provider, modelId)` pairs to bound handles exactly once:
//! the first call reads the provider's API key from the environment
//! variable named in configuration and asks the factory for an adapter;
//! later calls reuse the cached handle.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use pa_domain::config::{Config, ProviderKind};
use pa_domain::Result;

use crate::{LanguageModel, ModelBinding, ModelFactory};

pub struct ModelRegistry {
    config: Arc<Config>,
    factory: Arc<dyn ModelFactory>,
    handles: RwLock<HashMap<(ProviderKind, String), Arc<dyn LanguageModel>>>,
}

impl ModelRegistry {
    pub fn new(config: Arc<Config>, factory: Arc<dyn ModelFactory>) -> Self {
        Self {
            config,
            factory,
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a handle, constructing and caching it on first use.
    pub fn resolve(
        &self,
        provider: ProviderKind,
        model_id: &str,
    ) -> Result<Arc<dyn LanguageModel>> {
        let key = (provider, model_id.to_owned());
        if let Some(handle) = self.handles.read().get(&key) {
            return Ok(handle.clone());
        }

        let api_key = self
            .config
            .providers
            .get(&provider)
            .and_then(|p| std::env::var(&p.api_key_env).ok());
        if api_key.is_none() {
            tracing::debug!(
                provider = %provider,
                model_id = %model_id,
                "no API key resolved for provider"
            );
        }

        let binding = ModelBinding {
            provider,
            model_id: model_id.to_owned(),
            api_key,
        };
        let handle = self.factory.create(&binding)?;

        let mut handles = self.handles.write();
        // Another caller may have raced the construction; keep theirs.
        let entry = handles.entry(key).or_insert(handle);
        Ok(entry.clone())
    }

    /// Number of distinct handles constructed so far.
    pub fn handle_count(&self) -> usize {
        self.handles.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::scripted::EchoModel;

    struct CountingFactory {
        created: AtomicUsize,
    }

    impl ModelFactory for CountingFactory {
        fn create(&self, _binding: &ModelBinding) -> Result<Arc<dyn LanguageModel>> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoModel::default()))
        }
    }

    #[test]
    fn resolve_caches_per_provider_and_model() {
        let factory = Arc::new(CountingFactory {
            created: AtomicUsize::new(0),
        });
        let registry = ModelRegistry::new(Arc::new(Config::default()), factory.clone());

        registry.resolve(ProviderKind::Anthropic, "m1").unwrap();
        registry.resolve(ProviderKind::Anthropic, "m1").unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        registry.resolve(ProviderKind::Anthropic, "m2").unwrap();
        registry.resolve(ProviderKind::Openai, "m1").unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
        assert_eq!(registry.handle_count(), 3);
    }
}
