//! Fragment provider trait and the message sink handed to fragments at init.
//!
//! A fragment owns one named slice of every composite document. It knows how
//! to build that slice for a document id and how to classify change messages
//! into [`UpdateIntent`]s.

use std::sync::Weak;

use async_trait::async_trait;
use serde_json::Value;

use viewsync_shared::{FragmentError, Result, UpdateIntent, ViewSyncError};

use crate::reconciler::ReconcileReport;

/// Bound shared by every inbound message type.
///
/// Applications model their messages as a closed `enum`; each fragment
/// matches the variants it understands and ignores the rest.
pub trait Message: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Message for T {}

/// A provider of one document slice.
#[async_trait]
pub trait Fragment<M: Message>: Send + Sync {
    /// Unique identifier, also the document key the slice is stored under.
    fn id(&self) -> &str;

    /// One-time setup, called once by `ViewSync::start` in registration order.
    ///
    /// Fragments that subscribe to upstream change feeds keep `sink` and
    /// push messages through it.
    async fn init(&self, sink: MessageSink<M>) -> std::result::Result<(), FragmentError> {
        drop(sink);
        Ok(())
    }

    /// Classify `message`. Return `None` when it does not concern this fragment.
    ///
    /// Must not touch the destination store.
    fn on_message(&self, message: &M) -> std::result::Result<Option<UpdateIntent>, FragmentError>;

    /// Build the current slice for `document_id`, or `None` for no contribution.
    async fn build_fragment(
        &self,
        document_id: &str,
    ) -> std::result::Result<Option<Value>, FragmentError>;
}

/// Object-safe view of the orchestrator's message entry point.
#[async_trait]
pub(crate) trait MessageHandler<M: Message>: Send + Sync {
    async fn handle(&self, message: M) -> Result<ReconcileReport>;
}

/// Handle through which a fragment feeds messages back into the engine.
///
/// Holds a weak reference; a fragment keeping its sink does not keep the
/// orchestrator alive.
pub struct MessageSink<M: Message> {
    handler: Weak<dyn MessageHandler<M>>,
}

impl<M: Message> MessageSink<M> {
    pub(crate) fn new(handler: Weak<dyn MessageHandler<M>>) -> Self {
        Self { handler }
    }

    /// Reconcile `message`; resolves once every resulting mutation finished.
    pub async fn send(&self, message: M) -> Result<ReconcileReport> {
        let handler = self
            .handler
            .upgrade()
            .ok_or_else(|| ViewSyncError::config("message sink used after the engine was dropped"))?;
        handler.handle(message).await
    }

    /// Whether the engine behind this sink is still alive.
    pub fn is_connected(&self) -> bool {
        self.handler.strong_count() > 0
    }
}

impl<M: Message> Clone for MessageSink<M> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
        }
    }
}

impl<M: Message> std::fmt::Debug for MessageSink<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSink")
            .field("connected", &self.is_connected())
            .finish()
    }
}
