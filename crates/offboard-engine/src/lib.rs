//! Offboarding access discovery and remediation.
//!
//! - [`DiscoveryService`] inventories what a departed employee can still
//!   reach (OAuth grants, enterprise app assignments, sessions, devices),
//!   classifies each artifact's risk and derives findings.
//! - [`RemediationService`] revokes that access and reports one outcome per
//!   upstream call.
//! - [`OrchestratedCaseProvider`] wraps an external case store so every
//!   recorded remediation is also executed live, without a live failure
//!   ever blocking the record.
//!
//! Without identity-provider credentials the engine runs unconfigured:
//! discovery reports an error, remediation reports skipped successes and
//! no HTTP request is made.

mod config;
mod discovery;
mod engine;
mod error;
mod findings;
mod orchestration;
mod remediation;
pub mod risk;
mod types;

pub use config::EngineConfig;
pub use discovery::{DiscoveryContext, DiscoveryResult, DiscoveryService};
pub use engine::OffboardingEngine;
pub use error::{ConfigError, EngineError, EngineResult};
pub use findings::{derive_findings, OffboardingState};
pub use orchestration::{
    AppUserRecord, CaseAction, CaseProvider, CaseRecord, DashboardStats, EmployeeRecord,
    InMemoryCaseProvider, LiveLeg, OrchestratedCaseProvider, OrchestratedResponse, ProviderCall,
    ProviderResponse, RemediationOptions, ResponseStatus, RevokeScope, UserBundle,
};
pub use remediation::{RemediationAction, RemediationService};
pub use types::{
    AccessArtifact, ArtifactKind, ArtifactStatus, BundleResult, ConsentKind, Finding, FindingType,
    Identity, OpResult, RemediationOutcome, Resolution, RiskLevel, SourceError,
};
