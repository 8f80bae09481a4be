//! gridscale-policy — typed scaling policies and where they come from.
//!
//! The orchestrator stores each policy as a loosely typed document shaped
//! by a declarative config parser (single-element lists wrapping maps,
//! numbers as floats). The [`Normalizer`] decodes that document into a
//! fully typed [`Policy`], reporting every malformed field at once, then
//! fills unset fields from local conventions derived from the job and its
//! task group ("canonicalization").
//!
//! # Data flow
//!
//! ```text
//! Orchestrator ──list/blocking list──▶ PolicySource::notify ──▶ Vec<PolicyListStub>
//!              ──get_policy─────────▶ Normalizer ──▶ Policy
//! ```
//!
//! A [`Policy`] is never cached: every `get` builds a fresh projection of
//! the orchestrator's current document.

pub mod error;
pub mod normalize;
pub mod source;
pub mod types;

pub use error::{FieldError, PolicyError, PolicyResult, ValidationErrors};
pub use normalize::{CanonicalDefaults, Normalizer};
pub use source::{OrchestratorPolicySource, PolicyNotifications, PolicySource};
pub use types::*;
