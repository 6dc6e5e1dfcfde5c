//! hearthsync — bidirectional sync core for a personal home dashboard.
//!
//! State (rooms, entities, dashboard layout, integration credentials) lives
//! in two places: an on-device redb store and a remote multi-tenant sync
//! API. This crate owns the reconciliation between them: pull-then-push
//! ordering, the empty-cloud migration path, field-scoped merges with
//! at-rest encryption of secrets, and batched idempotent upserts.
//!
//! - [`store::LocalStore`]: typed key-value access to on-device state
//! - [`secrets`]: encrypt/decrypt of integration secrets
//! - [`remote::HttpRemote`]: authenticated client for the sync API
//! - [`reconcile::Reconciler`]: the session orchestrator

pub mod config;
pub mod error;
pub mod model;
pub mod reconcile;
pub mod remote;
pub mod secrets;
pub mod store;

pub use error::SyncError;
pub use reconcile::{PushReport, Reconciler, SessionOutcome, SessionState, StepResult};
pub use remote::{HttpRemote, SyncBackend};
pub use store::{LocalStore, StoreKey};
