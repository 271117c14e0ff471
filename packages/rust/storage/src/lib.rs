//! Destination stores for viewsync composite documents.
//!
//! [`DestinationStore`] is the only capability the engine needs from a store:
//! whole-document writes, removals, and point reads. Two adapters ship here:
//! - [`MemoryStore`]: in-process map
//! - [`SqlStore`]: embedded libSQL database with schema migrations

mod memory;
mod migrations;
mod sql;

use std::sync::Arc;

use async_trait::async_trait;
use viewsync_shared::{Document, Result};

pub use memory::MemoryStore;
pub use sql::SqlStore;

/// Where composite documents live.
///
/// Implementations own retry, timeout, and durability policy; the engine
/// never retries a failed call.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Write `document` in full, replacing any previous version.
    async fn index(&self, document: &Document) -> Result<()>;

    /// Remove the document with `id`. Removing an absent id is not an error.
    async fn unindex(&self, id: &str) -> Result<()>;

    /// Fetch the document with `id`, if stored.
    async fn get(&self, id: &str) -> Result<Option<Document>>;
}

#[async_trait]
impl<S: DestinationStore + ?Sized> DestinationStore for Arc<S> {
    async fn index(&self, document: &Document) -> Result<()> {
        (**self).index(document).await
    }

    async fn unindex(&self, id: &str) -> Result<()> {
        (**self).unindex(id).await
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        (**self).get(id).await
    }
}
