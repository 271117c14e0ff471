//! Registered fragment providers, keyed by fragment id.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use viewsync_shared::{RESERVED_FRAGMENT_IDS, Result, ViewSyncError};

use crate::fragment::{Fragment, Message, MessageSink};

/// Fragment providers in registration order.
///
/// Duplicate ids are rejected; there is no silent replacement.
pub struct FragmentRegistry<M: Message> {
    fragments: Vec<Arc<dyn Fragment<M>>>,
    by_id: HashMap<String, usize>,
}

impl<M: Message> FragmentRegistry<M> {
    pub fn new() -> Self {
        Self {
            fragments: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// Add a provider. Fails on a duplicate or reserved id.
    pub fn register(&mut self, fragment: Arc<dyn Fragment<M>>) -> Result<()> {
        let id = fragment.id().to_string();

        if id.is_empty() {
            return Err(ViewSyncError::config("fragment id must not be empty"));
        }
        if RESERVED_FRAGMENT_IDS.contains(&id.as_str()) {
            return Err(ViewSyncError::config(format!(
                "fragment id '{id}' is reserved for document metadata"
            )));
        }
        if self.by_id.contains_key(&id) {
            return Err(ViewSyncError::config(format!(
                "fragment id '{id}' is already registered"
            )));
        }

        debug!(fragment_id = %id, "registered fragment");
        self.by_id.insert(id, self.fragments.len());
        self.fragments.push(fragment);
        Ok(())
    }

    /// Run `init` on every provider, in registration order.
    pub async fn init_all(&self, sink: &MessageSink<M>) -> Result<()> {
        for fragment in &self.fragments {
            fragment.init(sink.clone()).await.map_err(|e| {
                ViewSyncError::config(format!(
                    "fragment '{}' failed to initialize: {e}",
                    fragment.id()
                ))
            })?;
        }
        info!(fragments = self.fragments.len(), "fragments initialized");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Fragment<M>>> {
        self.by_id.get(id).map(|&i| &self.fragments[i])
    }

    /// Providers in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Fragment<M>>> {
        self.fragments.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.fragments.iter().map(|f| f.id())
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

impl<M: Message> Default for FragmentRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FnFragment, TestMessage};

    fn fragment(id: &str) -> Arc<dyn Fragment<TestMessage>> {
        Arc::new(FnFragment::new(id))
    }

    #[test]
    fn keeps_registration_order() {
        let mut registry = FragmentRegistry::new();
        for id in ["status", "notes", "owner"] {
            registry.register(fragment(id)).unwrap();
        }
        assert_eq!(registry.ids().collect::<Vec<_>>(), vec!["status", "notes", "owner"]);
        assert_eq!(registry.len(), 3);
        assert!(registry.get("notes").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn rejects_duplicate_id() {
        let mut registry = FragmentRegistry::new();
        registry.register(fragment("status")).unwrap();

        let err = registry.register(fragment("status")).unwrap_err();
        assert!(matches!(err, ViewSyncError::Config { .. }));
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rejects_reserved_and_empty_ids() {
        let mut registry = FragmentRegistry::new();
        assert!(registry.register(fragment("id")).is_err());
        assert!(registry.register(fragment("_fragLastUpdate")).is_err());
        assert!(registry.register(fragment("")).is_err());
        assert!(registry.is_empty());
    }
}
