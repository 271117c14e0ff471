//! Fragment-based view reconciliation for ViewSync.
//!
//! Composite documents in a destination store are assembled from named
//! fragments. Change messages are translated into per-fragment intents,
//! grouped per document, and applied as unindex, full rebuild, or
//! partial merge under a per-document lock.

pub mod builder;
pub mod fragment;
pub mod orchestrator;
pub mod reconciler;
pub mod registry;
pub mod sequencer;
pub mod translator;

#[cfg(test)]
mod testing;

pub use builder::{BuiltSlice, DocumentBuilder};
pub use fragment::{Fragment, Message, MessageSink};
pub use orchestrator::ViewSync;
pub use reconciler::{DocumentOutcome, ReconcileReport, Resolution, UpdateReconciler};
pub use registry::FragmentRegistry;
pub use sequencer::{DocumentPermit, DocumentSequencer};
pub use translator::UpdateTranslator;
