//! The adapter seam between the resolver and concrete vendor APIs.

use std::collections::HashMap;

use async_trait::async_trait;

use super::capability::Capability;
use super::credentials::Secret;
use super::error::ProviderError;
use super::request::{FallbackRequest, Output};

/// A vendor API that serves one capability.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name as used in provider orders and credential config.
    fn name(&self) -> &str;

    fn capability(&self) -> Capability;

    /// Perform the request. `secret` is `None` for keyless providers.
    async fn invoke(
        &self,
        secret: Option<&Secret>,
        request: &FallbackRequest,
    ) -> Result<Output, ProviderError>;
}

/// Adapters keyed by capability and provider name.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<(Capability, String), Box<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same
    /// capability and name.
    pub fn register(&mut self, adapter: Box<dyn ProviderAdapter>) {
        let key = (adapter.capability(), adapter.name().to_string());
        if self.adapters.insert(key, adapter).is_some() {
            log::debug!("Replaced previously registered adapter");
        }
    }

    pub fn get(&self, capability: Capability, provider: &str) -> Option<&dyn ProviderAdapter> {
        self.adapters
            .get(&(capability, provider.to_string()))
            .map(|a| a.as_ref())
    }

    pub fn contains(&self, capability: Capability, provider: &str) -> bool {
        self.get(capability, provider).is_some()
    }
}
