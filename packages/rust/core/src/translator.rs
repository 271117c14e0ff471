//! Message → per-fragment update intents.

use tracing::{error, trace};

use viewsync_shared::{FragmentUpdate, ViewSyncError};

use crate::fragment::Message;
use crate::registry::FragmentRegistry;

/// Asks every fragment to classify a message.
pub struct UpdateTranslator<'a, M: Message> {
    registry: &'a FragmentRegistry<M>,
}

impl<'a, M: Message> UpdateTranslator<'a, M> {
    pub fn new(registry: &'a FragmentRegistry<M>) -> Self {
        Self { registry }
    }

    /// Collect the intents produced for `message`, in registration order.
    ///
    /// A failing handler is logged and contributes nothing; the remaining
    /// fragments are still consulted.
    pub fn translate(&self, message: &M) -> Vec<FragmentUpdate> {
        let mut updates = Vec::new();

        for fragment in self.registry.iter() {
            match fragment.on_message(message) {
                Ok(Some(update)) => updates.push(FragmentUpdate {
                    fragment_id: fragment.id().to_string(),
                    update,
                }),
                Ok(None) => {}
                Err(source) => {
                    let err = ViewSyncError::FragmentHandler {
                        fragment_id: fragment.id().to_string(),
                        source,
                    };
                    error!(error = %err, "fragment handler failed, dropping its update");
                }
            }
        }

        trace!(updates = ?updates, "updates to be applied");
        updates
    }
}
