use std::time::Instant;

use cnvrg_core::ObjectKey;
use tracing::{info_span, Span};
use uuid::Uuid;

/// State scoped to one reconciliation pass; threaded through every step.
#[derive(Debug, Clone)]
pub struct PassContext {
    pub key: ObjectKey,
    pub id: Uuid,
    pub span: Span,
    started: Instant,
}

impl PassContext {
    pub fn new(key: &ObjectKey) -> Self {
        let id = Uuid::new_v4();
        let span = info_span!("reconcile", ns = key.namespace.as_deref().unwrap_or(""), name = %key.name, pass = %id);
        Self { key: key.clone(), id, span, started: Instant::now() }
    }

    pub fn namespace(&self) -> &str { self.key.namespace.as_deref().unwrap_or_default() }

    pub fn elapsed_ms(&self) -> f64 { self.started.elapsed().as_secs_f64() * 1000.0 }
}
