//! Audit trail port.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SagaError;

/// One recorded audit entry.
#[derive(Debug, Clone)]
pub struct AuditRecord {
    pub kind: String,
    pub data: serde_json::Value,
    pub at: DateTime<Utc>,
}

/// Append-only audit sink. Every command transition is recorded regardless
/// of outcome.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Records an audit entry.
    async fn record(&self, kind: &str, data: serde_json::Value) -> Result<(), SagaError>;
}

/// In-memory audit log for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAudit {
    records: Arc<RwLock<Vec<AuditRecord>>>,
}

impl InMemoryAudit {
    /// Creates a new empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded entry.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().unwrap().clone()
    }

    /// Returns the kinds recorded, in order.
    pub fn kinds(&self) -> Vec<String> {
        self.records
            .read()
            .unwrap()
            .iter()
            .map(|r| r.kind.clone())
            .collect()
    }
}

#[async_trait]
impl AuditLog for InMemoryAudit {
    async fn record(&self, kind: &str, data: serde_json::Value) -> Result<(), SagaError> {
        self.records.write().unwrap().push(AuditRecord {
            kind: kind.to_string(),
            data,
            at: Utc::now(),
        });
        Ok(())
    }
}
