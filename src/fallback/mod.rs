//! Multi-provider fallback resolution.
//!
//! A capability request (speech, image, text) is served by the first provider
//! in a configured order that has a usable credential and returns a
//! non-empty result. Failed credentials are blacklisted for the rest of the
//! process, or cooled down when the failure is transient.

mod adapter;
mod capability;
mod credentials;
mod error;
mod request;
mod resolver;
pub mod retry;

pub use adapter::{AdapterRegistry, ProviderAdapter};
pub use capability::Capability;
pub use credentials::{Availability, CredentialSlot, CredentialStore, Secret, SlotLease, SlotState};
pub use error::{ErrorKind, ProviderError, ResolveError};
pub use request::{
    Attempt, Dimensions, FallbackRequest, Output, RequestParams, Resolved, Skip, SkipReason,
};
pub use resolver::{
    FailurePolicy, ProviderStatus, Resolver, ResolverSettings, DEFAULT_CALL_TIMEOUT,
};
