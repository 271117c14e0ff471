//! In-process destination store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use viewsync_shared::{Document, Result};

use crate::DestinationStore;

/// `HashMap`-backed store for tests, demos, and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing documents.
    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        Self {
            docs: RwLock::new(docs.into_iter().map(|d| (d.id.clone(), d)).collect()),
        }
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    /// Stored ids in ascending order.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.docs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl DestinationStore for MemoryStore {
    async fn index(&self, document: &Document) -> Result<()> {
        self.docs
            .write()
            .await
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn unindex(&self, id: &str) -> Result<()> {
        self.docs.write().await.remove(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.docs.read().await.get(id).cloned())
    }
}
