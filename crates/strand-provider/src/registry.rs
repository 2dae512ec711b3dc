//! Provider registry.
//!
//! Maps wire APIs to adapter instances. Populated once during host setup
//! and read-only afterwards; the agent loop receives it by reference, so
//! tests can inject mock providers freely.

use std::sync::Arc;

use dashmap::DashMap;

use strand_protocol::{Api, ErrorKind, ProviderError};

use crate::anthropic::AnthropicProvider;
use crate::openai_chat::OpenAiChatProvider;
use crate::openai_responses::OpenAiResponsesProvider;
use crate::provider::Provider;

/// Registry of provider adapters keyed by [`Api`].
#[derive(Default)]
pub struct ProviderRegistry {
    providers: DashMap<Api, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with all built-in adapters registered.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(AnthropicProvider::new()));
        registry.register(Arc::new(OpenAiChatProvider::new()));
        registry.register(Arc::new(OpenAiResponsesProvider::new()));
        registry
    }

    /// Register an adapter under the API it reports. Replaces any previous
    /// adapter for that API.
    pub fn register(&self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.api(), provider);
    }

    /// Look up the adapter for `api`.
    pub fn get(&self, api: Api) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(&api)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                ProviderError::new(
                    ErrorKind::NoProvider,
                    format!("no provider registered for api `{api}`"),
                )
            })
    }
}
