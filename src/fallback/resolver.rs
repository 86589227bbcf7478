//! The fallback resolver.
//!
//! Tries providers strictly one at a time, in the order given, and returns
//! the first non-empty output. Credential state lives in the resolver and is
//! mutated through `&mut self`, so a resolver is driven by one caller at a
//! time.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::adapter::AdapterRegistry;
use super::capability::Capability;
use super::credentials::{Availability, CredentialStore, SlotLease};
use super::error::{ProviderError, ResolveError};
use super::request::{Attempt, FallbackRequest, Output, Resolved, Skip, SkipReason};
use super::retry::{
    cooldown_for, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX, DEFAULT_MAX_TRANSIENT_STRIKES,
};

/// Default bound on a single adapter invocation (30 seconds).
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// What a failed invocation does to the credential that was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Any failure blacklists the credential for the rest of the run.
    Strict,
    /// Permanent failures blacklist, transient ones cool down, input-specific
    /// ones leave the credential alone.
    #[default]
    Classified,
}

/// Tunables for the resolver.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub call_timeout: Duration,
    pub policy: FailurePolicy,
    pub max_transient_strikes: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            policy: FailurePolicy::default(),
            max_transient_strikes: DEFAULT_MAX_TRANSIENT_STRIKES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

/// One row of the provider availability report.
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    pub capability: Capability,
    pub provider: String,
    pub has_adapter: bool,
    pub availability: Availability,
}

/// Resolves capability requests across an ordered list of providers.
pub struct Resolver {
    credentials: CredentialStore,
    adapters: AdapterRegistry,
    settings: ResolverSettings,
    chains: BTreeMap<Capability, Vec<String>>,
}

impl Resolver {
    pub fn new(
        credentials: CredentialStore,
        adapters: AdapterRegistry,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            credentials,
            adapters,
            settings,
            chains: BTreeMap::new(),
        }
    }

    /// Set the default provider order for a capability.
    pub fn with_chain(mut self, capability: Capability, order: Vec<String>) -> Self {
        self.chains.insert(capability, order);
        self
    }

    pub fn chain(&self, capability: Capability) -> Option<&[String]> {
        self.chains.get(&capability).map(Vec::as_slice)
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Resolve using the configured order for the request's capability.
    pub async fn resolve_default(
        &mut self,
        request: &FallbackRequest,
    ) -> Result<Resolved, ResolveError> {
        let order = self
            .chains
            .get(&request.capability)
            .filter(|order| !order.is_empty())
            .cloned()
            .ok_or(ResolveError::NoChain(request.capability))?;
        self.resolve(request, &order).await
    }

    /// Try each provider in `order` until one returns a non-empty output.
    ///
    /// Providers without an adapter or without a usable credential are
    /// skipped and not counted as attempts. A provider named twice is only
    /// considered once.
    pub async fn resolve(
        &mut self,
        request: &FallbackRequest,
        order: &[String],
    ) -> Result<Resolved, ResolveError> {
        let capability = request.capability;
        let mut attempts = Vec::new();
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();

        for provider in order {
            if !seen.insert(provider.as_str()) {
                continue;
            }

            let Some(adapter) = self.adapters.get(capability, provider) else {
                log::debug!("Skipping {}: no {} adapter", provider, capability);
                skipped.push(Skip {
                    provider: provider.clone(),
                    reason: SkipReason::NoAdapter,
                });
                continue;
            };

            let now = Instant::now();
            let Some(lease) = self.credentials.usable_slot(provider, now) else {
                let reason = skip_reason(self.credentials.availability(provider, now));
                log::debug!("Skipping {}: {:?}", provider, reason);
                skipped.push(Skip {
                    provider: provider.clone(),
                    reason,
                });
                continue;
            };

            log::debug!("Trying {} for {} with {}", provider, capability, lease.name);
            let outcome = match tokio::time::timeout(
                self.settings.call_timeout,
                adapter.invoke(lease.secret.as_ref(), request),
            )
            .await
            {
                Ok(Ok(output)) => check_output(capability, output),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(ProviderError::Timeout {
                    secs: self.settings.call_timeout.as_secs(),
                }),
            };

            match outcome {
                Ok(output) => {
                    self.credentials.mark_succeeded(&lease);
                    log::info!(
                        "{} resolved by {} ({} bytes, {} failed before)",
                        capability,
                        provider,
                        output.len(),
                        attempts.len()
                    );
                    return Ok(Resolved {
                        output,
                        provider: provider.clone(),
                        credential: lease.name,
                        attempts,
                        skipped,
                    });
                }
                Err(error) => {
                    let kind = error.kind();
                    log::warn!("{} provider {} failed ({}): {}", capability, provider, kind, error);
                    self.record_failure(&lease, &error);
                    attempts.push(Attempt {
                        provider: provider.clone(),
                        credential: lease.name,
                        kind,
                        message: error.to_string(),
                    });
                }
            }
        }

        log::error!(
            "All {} providers failed: {} attempted, {} skipped",
            capability,
            attempts.len(),
            skipped.len()
        );
        Err(ResolveError::Exhausted {
            capability,
            attempts,
            skipped,
        })
    }

    fn record_failure(&mut self, lease: &SlotLease, error: &ProviderError) {
        let kind = error.kind();
        match self.settings.policy {
            FailurePolicy::Strict => self.credentials.mark_failed(lease),
            FailurePolicy::Classified if kind.is_input_specific() => {}
            FailurePolicy::Classified if kind.is_transient() => {
                let strike = self.credentials.strikes(lease) + 1;
                let cooldown = cooldown_for(
                    strike,
                    error.retry_after_secs(),
                    self.settings.backoff_base,
                    self.settings.backoff_max,
                );
                let blacklisted = self.credentials.mark_transient(
                    lease,
                    cooldown,
                    self.settings.max_transient_strikes,
                    Instant::now(),
                );
                if blacklisted {
                    log::warn!(
                        "{} blacklisted after {} transient failures",
                        lease.name,
                        strike
                    );
                } else {
                    log::info!("{} cooling down for {:?}", lease.name, cooldown);
                }
            }
            FailurePolicy::Classified => {
                log::warn!("{} blacklisted for this run ({})", lease.name, kind);
                self.credentials.mark_failed(lease);
            }
        }
    }

    /// Availability of every provider named in the configured chains.
    pub fn report(&self) -> Vec<ProviderStatus> {
        let now = Instant::now();
        self.chains
            .iter()
            .flat_map(|(capability, order)| {
                order.iter().map(move |provider| ProviderStatus {
                    capability: *capability,
                    provider: provider.clone(),
                    has_adapter: self.adapters.contains(*capability, provider),
                    availability: self.credentials.availability(provider, now),
                })
            })
            .collect()
    }
}

fn skip_reason(availability: Availability) -> SkipReason {
    if availability.available == 0 {
        SkipReason::NoCredentials
    } else if availability.cooling_down > 0 {
        SkipReason::CoolingDown
    } else {
        SkipReason::AllFailed
    }
}

/// Reject empty outputs and outputs of the wrong shape.
fn check_output(capability: Capability, output: Output) -> Result<Output, ProviderError> {
    if output.is_empty() {
        return Err(ProviderError::EmptyResult);
    }
    let is_text = matches!(output, Output::Text(_));
    if is_text != capability.produces_text() {
        return Err(ProviderError::Malformed(format!(
            "{} provider returned {}",
            capability,
            if is_text { "text" } else { "bytes" }
        )));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_reason_no_credentials() {
        let a = Availability {
            configured: 2,
            ..Default::default()
        };
        assert_eq!(skip_reason(a), SkipReason::NoCredentials);
    }

    #[test]
    fn test_skip_reason_prefers_cooling_down() {
        let a = Availability {
            configured: 2,
            available: 2,
            failed: 1,
            cooling_down: 1,
        };
        assert_eq!(skip_reason(a), SkipReason::CoolingDown);
    }

    #[test]
    fn test_skip_reason_all_failed() {
        let a = Availability {
            configured: 1,
            available: 1,
            failed: 1,
            cooling_down: 0,
        };
        assert_eq!(skip_reason(a), SkipReason::AllFailed);
    }

    #[test]
    fn test_check_output_rejects_empty() {
        let result = check_output(Capability::Tts, Output::Bytes(Vec::new()));
        assert!(matches!(result, Err(ProviderError::EmptyResult)));
    }

    #[test]
    fn test_check_output_rejects_wrong_shape() {
        let result = check_output(Capability::TextGenerate, Output::Bytes(vec![1]));
        assert!(matches!(result, Err(ProviderError::Malformed(_))));

        let result = check_output(Capability::Tts, Output::Text("hi".to_string()));
        assert!(matches!(result, Err(ProviderError::Malformed(_))));
    }

    #[test]
    fn test_default_settings() {
        let s = ResolverSettings::default();
        assert_eq!(s.call_timeout, Duration::from_secs(30));
        assert_eq!(s.policy, FailurePolicy::Classified);
        assert_eq!(s.max_transient_strikes, 3);
    }
}
