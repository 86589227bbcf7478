//! Resolver plus artifact cache, built once from config and environment.

use crate::cache::ArtifactCache;
use crate::config::Config;
use crate::fallback::{
    Capability, FallbackRequest, Output, ProviderError, ProviderStatus, ResolveError, Resolved,
    Resolver,
};
use crate::providers::{self, SEARCH_STEP};

/// Where an output came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Provider(String),
    Cache,
    /// A configured static default was used after every provider failed
    Default,
    /// Produced locally after every provider and default failed
    Generated,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Provider(name) => f.write_str(name),
            Source::Cache => f.write_str("cache"),
            Source::Default => f.write_str("default"),
            Source::Generated => f.write_str("generated"),
        }
    }
}

/// Output with its origin.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub output: Output,
    pub source: Source,
}

pub struct Relay {
    resolver: Resolver,
    cache: Option<ArtifactCache>,
    cache_max_mb: u64,
}

impl Relay {
    pub fn new(resolver: Resolver, cache: Option<ArtifactCache>, cache_max_mb: u64) -> Self {
        Self {
            resolver,
            cache,
            cache_max_mb,
        }
    }

    /// Build adapters, credentials and chains from config. Credentials are
    /// read through `lookup_var` once, here.
    pub fn from_config<F>(config: &Config, lookup_var: F) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let adapters = providers::build_registry(config)?;
        let credentials = providers::credential_store(config, lookup_var);
        let mut resolver = Resolver::new(credentials, adapters, config.resolver.settings());
        for capability in Capability::ALL {
            resolver = resolver.with_chain(capability, config.chains.get(capability).to_vec());
        }

        let cache = config.cache.enabled.then(|| {
            ArtifactCache::new(config.cache.dir.clone().unwrap_or_else(ArtifactCache::default_dir))
        });

        Ok(Self::new(resolver, cache, config.cache.max_size_mb))
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut Resolver {
        &mut self.resolver
    }

    pub fn cache(&self) -> Option<&ArtifactCache> {
        self.cache.as_ref()
    }

    pub fn report(&self) -> Vec<ProviderStatus> {
        self.resolver.report()
    }

    /// Serve from cache when allowed, otherwise resolve and cache the result.
    ///
    /// `order` overrides the configured chain for this call.
    pub async fn fetch(
        &mut self,
        request: &FallbackRequest,
        order: Option<&[String]>,
        use_cache: bool,
    ) -> Result<Fetched, ResolveError> {
        let cache = if use_cache { self.cache.as_ref() } else { None };

        if let Some(output) = cache.and_then(|c| c.get(request)) {
            log::info!("Using cached {} ({} bytes)", request.capability, output.len());
            return Ok(Fetched {
                output,
                source: Source::Cache,
            });
        }

        let order = match order {
            Some(order) => order.to_vec(),
            None => self
                .resolver
                .chain(request.capability)
                .filter(|chain| !chain.is_empty())
                .ok_or(ResolveError::NoChain(request.capability))?
                .to_vec(),
        };
        let resolved = self.resolve(request, &order).await?;

        let cache = if use_cache { self.cache.as_ref() } else { None };
        if let Some(cache) = cache {
            if let Err(e) = cache.store_with_cleanup(request, &resolved.output, self.cache_max_mb) {
                log::warn!("Failed to cache {} output: {}", request.capability, e);
            }
        }

        Ok(Fetched {
            output: resolved.output,
            source: Source::Provider(resolved.provider),
        })
    }

    /// Resolve over `order`. In an image generation order the `search` step
    /// hands the prompt to the image search chain before the providers
    /// after it are tried.
    async fn resolve(
        &mut self,
        request: &FallbackRequest,
        order: &[String],
    ) -> Result<Resolved, ResolveError> {
        let step = order.iter().position(|p| p == SEARCH_STEP);
        let Some(step) = step.filter(|_| request.capability == Capability::ImageGenerate) else {
            return self.resolver.resolve(request, order).await;
        };

        let mut attempts = Vec::new();
        let mut skipped = Vec::new();
        let mut absorb = |result: Result<Resolved, ResolveError>| match result {
            Ok(mut resolved) => {
                attempts.append(&mut resolved.attempts);
                resolved.attempts = std::mem::take(&mut attempts);
                skipped.append(&mut resolved.skipped);
                resolved.skipped = std::mem::take(&mut skipped);
                Some(resolved)
            }
            Err(ResolveError::Exhausted {
                attempts: a,
                skipped: s,
                ..
            }) => {
                attempts.extend(a);
                skipped.extend(s);
                None
            }
            Err(ResolveError::NoChain(capability)) => {
                log::warn!("No {} chain to fall through to", capability);
                None
            }
        };

        let (generators, rest) = (&order[..step], &order[step + 1..]);
        if !generators.is_empty() {
            if let Some(resolved) = absorb(self.resolver.resolve(request, generators).await) {
                return Ok(resolved);
            }
        }

        log::info!("Image generation unavailable; searching for '{}' instead", request.payload);
        let search = FallbackRequest {
            capability: Capability::ImageSearch,
            payload: request.payload.clone(),
            params: request.params.clone(),
        };
        if let Some(resolved) = absorb(self.resolver.resolve_default(&search).await) {
            return Ok(resolved);
        }

        if !rest.is_empty() {
            if let Some(resolved) = absorb(self.resolver.resolve(request, rest).await) {
                return Ok(resolved);
            }
        }

        Err(ResolveError::Exhausted {
            capability: request.capability,
            attempts,
            skipped,
        })
    }
}
