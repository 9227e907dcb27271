//! cnvrg reconcile: per-key reconciliation of `CnvrgApp` resources.
//!
//! A pass runs sync → reload → finalizer → RECONCILING → apply → registry →
//! HEALTHY against any [`cnvrg_store::ClusterStore`].

#![forbid(unsafe_code)]

pub mod config;
pub mod context;
pub mod defaults;
pub mod error;
pub mod finalizer;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod status;

pub use config::ReconcileConfig;
pub use context::PassContext;
pub use defaults::{DefaultsMerger, SyncOutcome};
pub use error::ReconcileError;
pub use finalizer::{FinalizerLifecycle, FinalizerState};
pub use orchestrator::{Outcome, Reconciler};
pub use pipeline::{ApplyPipeline, ApplyReport};
pub use registry::{Registry, RegistryChange};
pub use status::{StatusWrite, StatusWriter};
