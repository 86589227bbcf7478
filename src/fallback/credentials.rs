//! Credential slots and key rotation.
//!
//! Each provider owns an ordered list of slots, one per environment variable.
//! The first slot that is set and not failed (and not cooling down) is handed
//! to the adapter; when it fails it is blacklisted for the rest of the
//! process and the next slot takes over on the next call.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;

/// A secret value. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Per-slot state. `Failed` is terminal for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Ready { strikes: u32 },
    CoolingDown { until: Instant, strikes: u32 },
    Failed,
}

/// One named secret belonging to a provider.
#[derive(Debug, Clone)]
pub struct CredentialSlot {
    name: String,
    secret: Option<Secret>,
    state: SlotState,
}

impl CredentialSlot {
    fn new(name: impl Into<String>, secret: Option<Secret>) -> Self {
        Self {
            name: name.into(),
            secret,
            state: SlotState::Ready { strikes: 0 },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The variable was present and non-blank (always true for keyless slots).
    pub fn is_available(&self) -> bool {
        self.secret.is_some() || self.name.ends_with(KEYLESS_SUFFIX)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, SlotState::Failed)
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    fn strikes(&self) -> u32 {
        match self.state {
            SlotState::Ready { strikes } | SlotState::CoolingDown { strikes, .. } => strikes,
            SlotState::Failed => 0,
        }
    }

    fn is_usable(&self, now: Instant) -> bool {
        if !self.is_available() {
            return false;
        }
        match self.state {
            SlotState::Ready { .. } => true,
            SlotState::CoolingDown { until, .. } => now >= until,
            SlotState::Failed => false,
        }
    }
}

const KEYLESS_SUFFIX: &str = ":keyless";

/// A slot selected for one invocation.
#[derive(Debug, Clone)]
pub struct SlotLease {
    pub provider: String,
    pub index: usize,
    pub name: String,
    pub secret: Option<Secret>,
}

/// Summary of a provider's slots, for reporting and skip reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Availability {
    pub configured: usize,
    pub available: usize,
    pub failed: usize,
    pub cooling_down: usize,
}

impl Availability {
    pub fn usable(&self) -> usize {
        self.available - self.failed - self.cooling_down
    }
}

/// Slots for every known provider.
#[derive(Debug, Default)]
pub struct CredentialStore {
    providers: BTreeMap<String, Vec<CredentialSlot>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider whose slots come from the given variable names,
    /// resolved through `lookup`. Blank values count as absent.
    pub fn register<F>(&mut self, provider: &str, env_names: &[String], lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let slots = env_names
            .iter()
            .map(|name| {
                let secret = lookup(name)
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(Secret::new);
                CredentialSlot::new(name.clone(), secret)
            })
            .collect();
        self.providers.insert(provider.to_string(), slots);
    }

    /// Register a provider that needs no secret.
    pub fn register_keyless(&mut self, provider: &str) {
        let slot = CredentialSlot::new(format!("{}{}", provider, KEYLESS_SUFFIX), None);
        self.providers.insert(provider.to_string(), vec![slot]);
    }

    pub fn slots(&self, provider: &str) -> &[CredentialSlot] {
        self.providers
            .get(provider)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn availability(&self, provider: &str, now: Instant) -> Availability {
        let mut a = Availability::default();
        for slot in self.slots(provider) {
            a.configured += 1;
            if !slot.is_available() {
                continue;
            }
            a.available += 1;
            match slot.state {
                SlotState::Failed => a.failed += 1,
                SlotState::CoolingDown { until, .. } if now < until => a.cooling_down += 1,
                _ => {}
            }
        }
        a
    }

    /// First slot that is available, not failed and not cooling down.
    pub fn usable_slot(&self, provider: &str, now: Instant) -> Option<SlotLease> {
        self.slots(provider)
            .iter()
            .enumerate()
            .find(|(_, slot)| slot.is_usable(now))
            .map(|(index, slot)| SlotLease {
                provider: provider.to_string(),
                index,
                name: slot.name.clone(),
                secret: slot.secret.clone(),
            })
    }

    fn slot_mut(&mut self, lease: &SlotLease) -> Option<&mut CredentialSlot> {
        self.providers
            .get_mut(&lease.provider)
            .and_then(|slots| slots.get_mut(lease.index))
    }

    /// Blacklist a slot for the rest of the process.
    pub fn mark_failed(&mut self, lease: &SlotLease) {
        if let Some(slot) = self.slot_mut(lease) {
            slot.state = SlotState::Failed;
        }
    }

    /// Record a transient failure. Returns true when the slot reached
    /// `max_strikes` and was blacklisted instead of cooled down.
    pub fn mark_transient(
        &mut self,
        lease: &SlotLease,
        cooldown: Duration,
        max_strikes: u32,
        now: Instant,
    ) -> bool {
        let Some(slot) = self.slot_mut(lease) else {
            return false;
        };
        if slot.is_failed() {
            return true;
        }
        let strikes = slot.strikes() + 1;
        if strikes >= max_strikes {
            slot.state = SlotState::Failed;
            true
        } else {
            slot.state = SlotState::CoolingDown {
                until: now + cooldown,
                strikes,
            };
            false
        }
    }

    /// Consecutive transient failures recorded so far for the slot.
    pub fn strikes(&self, lease: &SlotLease) -> u32 {
        self.slots(&lease.provider)
            .get(lease.index)
            .map(CredentialSlot::strikes)
            .unwrap_or(0)
    }

    /// Clear the strike count after a success.
    pub fn mark_succeeded(&mut self, lease: &SlotLease) {
        if let Some(slot) = self.slot_mut(lease) {
            if !slot.is_failed() {
                slot.state = SlotState::Ready { strikes: 0 };
            }
        }
    }
}
