//! Idempotent processed-event gate.
//!
//! Every handler checks the gate before doing any work and marks the
//! delivery processed only after the work succeeded. Existence of the
//! `(scope, key)` pair means "already applied": a replayed delivery is
//! acknowledged without side effects.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::Result;

/// Keyed existence store for processed deliveries.
#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Returns true if the `(scope, key)` pair was processed before.
    async fn already_processed(&self, scope: &str, key: &str) -> Result<bool>;

    /// Marks the `(scope, key)` pair as processed.
    async fn mark_processed(&self, scope: &str, key: &str) -> Result<()>;
}

/// In-memory gate for tests and the demo worker.
#[derive(Clone, Default)]
pub struct InMemoryProcessedEvents {
    seen: Arc<RwLock<HashSet<(String, String)>>>,
}

impl InMemoryProcessedEvents {
    /// Creates a new empty gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of recorded pairs.
    pub fn count(&self) -> usize {
        self.seen.read().unwrap().len()
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEvents {
    async fn already_processed(&self, scope: &str, key: &str) -> Result<bool> {
        Ok(self
            .seen
            .read()
            .unwrap()
            .contains(&(scope.to_string(), key.to_string())))
    }

    async fn mark_processed(&self, scope: &str, key: &str) -> Result<()> {
        self.seen
            .write()
            .unwrap()
            .insert((scope.to_string(), key.to_string()));
        Ok(())
    }
}
