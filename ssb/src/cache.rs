use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::model::{TableId, TableMetadata};

/// Short-lived, advisory cache of table metadata.
///
/// Entries only spare a round trip; callers must be prepared to refetch
/// whenever a cached entry disagrees with what they were asked to do.
#[derive(Debug)]
pub(crate) struct MetadataCache {
    ttl: Duration,
    entries: RwLock<HashMap<TableId, CachedMetadata>>,
}

#[derive(Debug)]
struct CachedMetadata {
    fetched_at: Instant,
    metadata: Arc<TableMetadata>,
}

impl MetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// A fresh entry, if there is one.
    pub async fn get(&self, table_id: &TableId) -> Option<Arc<TableMetadata>> {
        if !self.is_enabled() {
            return None;
        }
        let entries = self.entries.read().await;
        entries
            .get(table_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| Arc::clone(&entry.metadata))
    }

    pub async fn insert(&self, metadata: Arc<TableMetadata>) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
        entries.insert(
            metadata.table_id.clone(),
            CachedMetadata {
                fetched_at: Instant::now(),
                metadata,
            },
        );
    }
}
