//! The public entry point: register fragments, start, index, unindex, and
//! reconcile change messages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{info, instrument, trace};
use uuid::Uuid;

use viewsync_shared::{Document, ReconcileConfig, Result, ViewSyncError};
use viewsync_storage::DestinationStore;

use crate::builder::DocumentBuilder;
use crate::fragment::{Fragment, Message, MessageHandler, MessageSink};
use crate::reconciler::{ReconcileReport, UpdateReconciler};
use crate::registry::FragmentRegistry;
use crate::sequencer::DocumentSequencer;
use crate::translator::UpdateTranslator;

/// Keeps composite documents in a destination store in sync with their fragments.
///
/// Register fragments while the engine is exclusively owned, then share it
/// behind an [`Arc`] and call [`ViewSync::start`].
///
/// ```rust,ignore
/// let mut engine = ViewSync::new(MemoryStore::new());
/// engine.register_fragment(StatusFragment::new(source.clone()))?
///       .register_fragment(NotesFragment::new(source))?;
/// let engine = Arc::new(engine);
/// engine.start().await?;
/// engine.index("app1").await?;
/// engine.on_message(&AppMessage::StatusUpdated { application_id: "app1".into() }).await?;
/// ```
pub struct ViewSync<M: Message, S: DestinationStore> {
    registry: FragmentRegistry<M>,
    store: S,
    sequencer: DocumentSequencer,
    config: ReconcileConfig,
    started: AtomicBool,
}

impl<M: Message, S: DestinationStore + 'static> ViewSync<M, S> {
    /// Create an engine over `store` with default reconcile settings.
    pub fn new(store: S) -> Self {
        Self::with_config(store, ReconcileConfig::default())
    }

    pub fn with_config(store: S, config: ReconcileConfig) -> Self {
        Self {
            registry: FragmentRegistry::new(),
            store,
            sequencer: DocumentSequencer::new(),
            config,
            started: AtomicBool::new(false),
        }
    }

    /// Register a fragment. Duplicate ids are a configuration error.
    pub fn register_fragment<F>(&mut self, fragment: F) -> Result<&mut Self>
    where
        F: Fragment<M> + 'static,
    {
        self.registry.register(Arc::new(fragment))?;
        Ok(self)
    }

    /// Register a fragment the caller keeps a handle to.
    pub fn register_shared(&mut self, fragment: Arc<dyn Fragment<M>>) -> Result<&mut Self> {
        self.registry.register(fragment)?;
        Ok(self)
    }

    /// Initialize every fragment once, in registration order, handing each
    /// a [`MessageSink`] bound to this engine.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ViewSyncError::config("engine already started"));
        }
        self.registry.init_all(&self.sink()).await?;
        info!(
            fragments = ?self.registry.ids().collect::<Vec<_>>(),
            "view sync started"
        );
        Ok(())
    }

    /// A sink that feeds messages into this engine.
    pub fn sink(self: &Arc<Self>) -> MessageSink<M> {
        let engine: Weak<Self> = Arc::downgrade(self);
        let handler: Weak<dyn MessageHandler<M>> = engine;
        MessageSink::new(handler)
    }

    /// Rebuild `document_id` from every fragment and overwrite it in the store.
    #[instrument(skip(self))]
    pub async fn index(&self, document_id: &str) -> Result<()> {
        let _permit = self.sequencer.acquire(document_id).await;
        trace!(document_id, "indexing");
        self.reconciler().rebuild(document_id).await
    }

    /// Remove `document_id` from the store.
    #[instrument(skip(self))]
    pub async fn unindex(&self, document_id: &str) -> Result<()> {
        let _permit = self.sequencer.acquire(document_id).await;
        trace!(document_id, "unindexing");
        self.store.unindex(document_id).await
    }

    /// Translate `message` into fragment intents and reconcile them.
    ///
    /// Resolves once every affected document has been mutated (or skipped).
    #[instrument(skip_all, fields(batch = %Uuid::now_v7()))]
    pub async fn on_message(&self, message: &M) -> Result<ReconcileReport> {
        let updates = UpdateTranslator::new(&self.registry).translate(message);
        if updates.is_empty() {
            return Ok(ReconcileReport::default());
        }
        self.reconciler().reconcile(&updates).await
    }

    /// Build the document for `document_id` without writing it.
    pub async fn build(&self, document_id: &str) -> Result<Document> {
        self.builder().build(document_id).await
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn registry(&self) -> &FragmentRegistry<M> {
        &self.registry
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    fn builder(&self) -> DocumentBuilder<'_, M> {
        DocumentBuilder::new(&self.registry, self.config.build_policy)
    }

    fn reconciler(&self) -> UpdateReconciler<'_, M, S> {
        UpdateReconciler::new(self.builder(), &self.store, &self.sequencer)
            .with_max_concurrent_documents(self.config.max_concurrent_documents)
    }
}

#[async_trait]
impl<M: Message, S: DestinationStore + 'static> MessageHandler<M> for ViewSync<M, S> {
    async fn handle(&self, message: M) -> Result<ReconcileReport> {
        self.on_message(&message).await
    }
}
