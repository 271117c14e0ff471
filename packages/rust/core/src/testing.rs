//! Test doubles shared by the core unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use viewsync_shared::{Document, FragmentError, Result, UpdateIntent, ViewSyncError};
use viewsync_storage::{DestinationStore, MemoryStore};

use crate::fragment::{Fragment, MessageSink};

/// Messages understood by the test fragments.
#[derive(Debug, Clone, PartialEq)]
pub enum TestMessage {
    StatusUpdated { application_id: String },
    NoteAdded { application_id: String },
    ApplicationArchived { application_id: String },
    Ping,
}

type HandlerFn = dyn Fn(&TestMessage) -> std::result::Result<Option<UpdateIntent>, FragmentError>
    + Send
    + Sync;
type BuildFn = dyn Fn(&str) -> std::result::Result<Option<Value>, FragmentError> + Send + Sync;

/// Closure-backed fragment.
pub struct FnFragment {
    id: String,
    handler: Box<HandlerFn>,
    build: Box<BuildFn>,
    build_delay: Option<Duration>,
    init_calls: Arc<AtomicUsize>,
    sink: Arc<Mutex<Option<MessageSink<TestMessage>>>>,
}

impl FnFragment {
    /// Fragment that ignores every message and contributes nothing.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            handler: Box::new(|_| Ok(None)),
            build: Box::new(|_| Ok(None)),
            build_delay: None,
            init_calls: Arc::new(AtomicUsize::new(0)),
            sink: Arc::new(Mutex::new(None)),
        }
    }

    pub fn on<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TestMessage) -> std::result::Result<Option<UpdateIntent>, FragmentError>
            + Send
            + Sync
            + 'static,
    {
        self.handler = Box::new(handler);
        self
    }

    pub fn building<F>(mut self, build: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<Option<Value>, FragmentError> + Send + Sync + 'static,
    {
        self.build = Box::new(build);
        self
    }

    /// Sleep before every build so concurrent callers interleave.
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = Some(delay);
        self
    }

    pub fn init_counter(&self) -> Arc<AtomicUsize> {
        self.init_calls.clone()
    }

    /// Slot receiving the sink passed to `init`.
    pub fn sink_slot(&self) -> Arc<Mutex<Option<MessageSink<TestMessage>>>> {
        self.sink.clone()
    }
}

#[async_trait]
impl Fragment<TestMessage> for FnFragment {
    fn id(&self) -> &str {
        &self.id
    }

    async fn init(&self, sink: MessageSink<TestMessage>) -> std::result::Result<(), FragmentError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock().map_err(|e| e.to_string())? = Some(sink);
        Ok(())
    }

    fn on_message(
        &self,
        message: &TestMessage,
    ) -> std::result::Result<Option<UpdateIntent>, FragmentError> {
        (self.handler)(message)
    }

    async fn build_fragment(
        &self,
        document_id: &str,
    ) -> std::result::Result<Option<Value>, FragmentError> {
        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }
        (self.build)(document_id)
    }
}

/// A store call observed by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Get(String),
    Index(String),
    Unindex(String),
}

/// Memory store that records every call and can be told to fail writes.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    calls: Mutex<Vec<StoreCall>>,
    fail_writes: AtomicBool,
    get_delay: Option<Duration>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(docs: impl IntoIterator<Item = Document>) -> Self {
        Self {
            inner: MemoryStore::with_documents(docs),
            ..Self::default()
        }
    }

    /// Make `index` and `unindex` fail with a storage error.
    pub fn failing_writes(self) -> Self {
        self.fail_writes.store(true, Ordering::SeqCst);
        self
    }

    /// Sleep inside `get` so read-modify-write cycles can interleave.
    pub fn with_get_delay(mut self, delay: Duration) -> Self {
        self.get_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Read a document without recording a call.
    pub async fn document(&self, id: &str) -> Option<Document> {
        self.inner.get(id).await.expect("memory store get")
    }

    pub async fn ids(&self) -> Vec<String> {
        self.inner.ids().await
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ViewSyncError::storage("simulated write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl DestinationStore for RecordingStore {
    async fn index(&self, document: &Document) -> Result<()> {
        self.record(StoreCall::Index(document.id.clone()));
        self.check_writes()?;
        self.inner.index(document).await
    }

    async fn unindex(&self, id: &str) -> Result<()> {
        self.record(StoreCall::Unindex(id.to_string()));
        self.check_writes()?;
        self.inner.unindex(id).await
    }

    async fn get(&self, id: &str) -> Result<Option<Document>> {
        self.record(StoreCall::Get(id.to_string()));
        if let Some(delay) = self.get_delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.get(id).await
    }
}
