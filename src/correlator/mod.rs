//! Turns raw filesystem notifications into trustworthy move records.
//!
//! Platforms report a cut-and-paste (or cross-directory drag) as an unrelated
//! delete followed by a create. The correlator holds deletions pending for a
//! debounce window and pairs them with later creations by comparing identity
//! signals captured before the file vanished.

pub mod config;
pub mod engine;
pub mod identity;
pub mod pending;

pub use config::CorrelatorConfig;
pub use engine::{Correlator, CorrelatorStats};
pub use identity::{IdentityScorer, IdentitySignals, MetadataScorer, NewEntry};
pub use pending::PendingDeletion;
