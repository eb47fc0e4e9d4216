//! Audit sink trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::FulfillmentError;

/// One recorded audit entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub category: String,
    pub actor: String,
    pub details: String,
}

/// Trait for recording who did what. Best effort: the orchestrator logs a
/// failure and continues.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(
        &self,
        category: &str,
        actor: &str,
        details: String,
    ) -> Result<(), FulfillmentError>;
}

/// In-memory audit sink for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditSink {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl InMemoryAuditSink {
    /// Creates a new in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().unwrap().clone()
    }

    /// Returns the entries for one category.
    pub fn entries_for(&self, category: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(
        &self,
        category: &str,
        actor: &str,
        details: String,
    ) -> Result<(), FulfillmentError> {
        self.entries.write().unwrap().push(AuditEntry {
            category: category.to_string(),
            actor: actor.to_string(),
            details,
        });
        Ok(())
    }
}
