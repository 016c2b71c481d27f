use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::auth::providers::AuthProvider;
use crate::error::{self, AuthResult};

/// Initial set of providers for an [`AuthProviderManager`]
pub struct AuthProviderManagerConfig<D: Send + Sync + 'static> {
    pub providers: Vec<Arc<dyn AuthProvider<D>>>,
}

impl<D: Send + Sync + 'static> Default for AuthProviderManagerConfig<D> {
    fn default() -> Self {
        Self { providers: Vec::new() }
    }
}

/// Runtime registry of providers keyed by provider id.
///
/// Entries keep insertion order; the first one is the default provider.
/// Lookups never fail, use [`resolve`](Self::resolve) when a provider is mandatory.
pub struct AuthProviderManager<D: Send + Sync + 'static> {
    providers: RwLock<Vec<Arc<dyn AuthProvider<D>>>>,
}

impl<D> AuthProviderManager<D>
where
    D: Send + Sync + 'static,
{
    pub fn new(config: AuthProviderManagerConfig<D>) -> Self {
        let manager = Self::empty();
        for provider in config.providers {
            manager.add_provider(provider);
        }
        manager
    }

    pub fn empty() -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
        }
    }

    pub fn get_provider(&self, provider_id: &str) -> Option<Arc<dyn AuthProvider<D>>> {
        self.providers
            .read()
            .iter()
            .find(|p| p.provider_id() == provider_id)
            .cloned()
    }

    /// First registered provider still present
    pub fn get_default_provider(&self) -> Option<Arc<dyn AuthProvider<D>>> {
        self.providers.read().first().cloned()
    }

    /// Insert a provider, replacing any entry with the same id in place
    pub fn add_provider(&self, provider: Arc<dyn AuthProvider<D>>) {
        let mut providers = self.providers.write();
        let provider_id = provider.provider_id().to_string();

        match providers.iter_mut().find(|p| p.provider_id() == provider_id) {
            Some(existing) => {
                debug!(provider = %provider_id, "Replacing registered auth provider");
                *existing = provider;
            }
            None => {
                info!(provider = %provider_id, "Registering auth provider");
                providers.push(provider);
            }
        }
    }

    /// Returns whether an entry existed and was removed
    pub fn remove_provider(&self, provider_id: &str) -> bool {
        let mut providers = self.providers.write();
        let before = providers.len();
        providers.retain(|p| p.provider_id() != provider_id);

        let removed = providers.len() != before;
        if removed {
            info!(provider = %provider_id, "Removed auth provider");
        }
        removed
    }

    pub fn has_provider(&self, provider_id: &str) -> bool {
        self.providers.read().iter().any(|p| p.provider_id() == provider_id)
    }

    /// Registered ids in insertion order
    pub fn provider_ids(&self) -> Vec<String> {
        self.providers
            .read()
            .iter()
            .map(|p| p.provider_id().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Strict lookup: `EMPTY_PROVIDER` if nothing is registered, `UNSUPPORTED_PROVIDER` if `provider_id` is unknown
    pub fn resolve(&self, provider_id: &str) -> AuthResult<Arc<dyn AuthProvider<D>>> {
        let providers = self.providers.read();
        if providers.is_empty() {
            return Err(error::empty_provider());
        }

        providers
            .iter()
            .find(|p| p.provider_id() == provider_id)
            .cloned()
            .ok_or_else(|| error::unsupported_provider(provider_id))
    }

    /// Strict default lookup: `EMPTY_PROVIDER` if nothing is registered
    pub fn resolve_default(&self) -> AuthResult<Arc<dyn AuthProvider<D>>> {
        self.get_default_provider().ok_or_else(error::empty_provider)
    }
}

impl<D> Default for AuthProviderManager<D>
where
    D: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::empty()
    }
}
