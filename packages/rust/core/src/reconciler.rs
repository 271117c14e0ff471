//! Update reconciliation: expand intents, group by document, resolve, apply.
//!
//! Each `(fragment, intent)` pair is expanded into one instruction per
//! document id. Instructions are grouped by document, and each group resolves
//! to exactly one mutation, decided from the complete group before any store
//! call is made:
//!
//! | actions in group                        | mutation                        |
//! |-----------------------------------------|---------------------------------|
//! | `unindex` + (`reindex`/`updateFragment`) | none, reported as a conflict    |
//! | `unindex`                               | remove                          |
//! | `reindex`                               | full rebuild                    |
//! | `updateFragment` only                   | merge named fragments, or full rebuild when absent |
//!
//! Groups reconcile concurrently; each one runs under its document's lock.

use std::collections::{BTreeMap, HashSet};

use chrono::Utc;
use futures::future::{join_all, try_join_all};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, trace, warn};

use viewsync_shared::{
    FragmentUpdate, RESERVED_FRAGMENT_IDS, Result, UpdateAction, UpdateInstruction, ViewSyncError,
};
use viewsync_storage::DestinationStore;

use crate::builder::{BuiltSlice, DocumentBuilder, build_slice};
use crate::fragment::{Fragment, Message};
use crate::sequencer::DocumentSequencer;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Removed from the store.
    Unindexed,
    /// Fully rebuilt and written.
    Reindexed,
    /// Fully rebuilt because a merge found no stored document.
    Rebuilt,
    /// Named fragments refreshed and merged into the stored document.
    Merged { fragments: Vec<String> },
    /// Nothing to merge (every named fragment was unknown).
    Unchanged,
    /// Unindex combined with an update; the store was not touched.
    Conflict,
}

/// Per-document outcomes of one reconciliation pass, ordered by document id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub outcomes: Vec<(String, DocumentOutcome)>,
}

impl ReconcileReport {
    /// Outcome recorded for `document_id`.
    pub fn outcome(&self, document_id: &str) -> Option<&DocumentOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == document_id)
            .map(|(_, outcome)| outcome)
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of documents whose instructions conflicted.
    pub fn conflicts(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == DocumentOutcome::Conflict)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Expand / group / resolve
// ---------------------------------------------------------------------------

/// Flatten multi-document intents into single-document instructions.
pub fn expand(updates: &[FragmentUpdate]) -> Vec<UpdateInstruction> {
    updates
        .iter()
        .flat_map(|fu| {
            fu.update.ids.iter().map(move |id| UpdateInstruction {
                document_id: id.clone(),
                fragment_id: fu.fragment_id.clone(),
                action: fu.update.action,
                fragment_data: fu.update.fragment_data.clone(),
            })
        })
        .collect()
}

/// Group instructions by document id, keeping translation order inside a group.
pub fn group(instructions: Vec<UpdateInstruction>) -> BTreeMap<String, Vec<UpdateInstruction>> {
    let mut groups: BTreeMap<String, Vec<UpdateInstruction>> = BTreeMap::new();
    for instruction in instructions {
        groups
            .entry(instruction.document_id.clone())
            .or_default()
            .push(instruction);
    }
    groups
}

/// One fragment to refresh during a merge.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentRefresh {
    pub fragment_id: String,
    /// Used verbatim instead of calling `build_fragment` when present.
    pub fragment_data: Option<Value>,
}

/// The single mutation chosen for a document group.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Conflict,
    Unindex,
    Reindex,
    Merge(Vec<FragmentRefresh>),
}

/// Decide the mutation for one document from its complete instruction group.
pub fn resolve(instructions: &[UpdateInstruction]) -> Resolution {
    let actions: HashSet<UpdateAction> = instructions.iter().map(|i| i.action).collect();

    if actions.contains(&UpdateAction::Unindex) {
        if actions.contains(&UpdateAction::Reindex)
            || actions.contains(&UpdateAction::UpdateFragment)
        {
            return Resolution::Conflict;
        }
        return Resolution::Unindex;
    }

    if actions.contains(&UpdateAction::Reindex) {
        return Resolution::Reindex;
    }

    // Distinct fragments in first-seen order; the last override wins.
    let mut refreshes: Vec<FragmentRefresh> = Vec::new();
    for instruction in instructions {
        match refreshes
            .iter_mut()
            .find(|r| r.fragment_id == instruction.fragment_id)
        {
            Some(existing) => {
                if instruction.fragment_data.is_some() {
                    existing.fragment_data = instruction.fragment_data.clone();
                }
            }
            None => refreshes.push(FragmentRefresh {
                fragment_id: instruction.fragment_id.clone(),
                fragment_data: instruction.fragment_data.clone(),
            }),
        }
    }
    Resolution::Merge(refreshes)
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Applies grouped instructions to the destination store.
pub struct UpdateReconciler<'a, M: Message, S: DestinationStore + ?Sized> {
    builder: DocumentBuilder<'a, M>,
    store: &'a S,
    sequencer: &'a DocumentSequencer,
    max_concurrent_documents: usize,
}

impl<'a, M: Message, S: DestinationStore + ?Sized> UpdateReconciler<'a, M, S> {
    pub fn new(
        builder: DocumentBuilder<'a, M>,
        store: &'a S,
        sequencer: &'a DocumentSequencer,
    ) -> Self {
        Self {
            builder,
            store,
            sequencer,
            max_concurrent_documents: 0,
        }
    }

    /// Cap how many documents reconcile at once (0 = unbounded).
    pub fn with_max_concurrent_documents(mut self, limit: usize) -> Self {
        self.max_concurrent_documents = limit;
        self
    }

    /// Reconcile a batch of fragment updates.
    ///
    /// Every document group runs to completion even if a sibling fails; the
    /// failures are then returned together as [`ViewSyncError::Batch`].
    pub async fn reconcile(&self, updates: &[FragmentUpdate]) -> Result<ReconcileReport> {
        let groups = group(expand(updates));
        if groups.is_empty() {
            return Ok(ReconcileReport::default());
        }

        let permits = (self.max_concurrent_documents > 0)
            .then(|| Semaphore::new(self.max_concurrent_documents));

        let tasks = groups.into_iter().map(|(document_id, instructions)| {
            let permits = permits.as_ref();
            async move {
                let result = match permits {
                    Some(limiter) => match limiter.acquire().await {
                        Ok(_held) => self.reconcile_document(&document_id, &instructions).await,
                        Err(_) => Err(ViewSyncError::config("reconcile concurrency limiter closed")),
                    },
                    None => self.reconcile_document(&document_id, &instructions).await,
                };
                (document_id, result)
            }
        });

        let mut report = ReconcileReport::default();
        let mut failures = Vec::new();
        for (document_id, result) in join_all(tasks).await {
            match result {
                Ok(outcome) => report.outcomes.push((document_id, outcome)),
                Err(e) => {
                    error!(document_id = %document_id, error = %e, "document reconciliation failed");
                    failures.push((document_id, e));
                }
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(ViewSyncError::Batch { failures })
        }
    }

    /// Resolve and apply one document group under its lock.
    #[instrument(skip_all, fields(document_id = %document_id))]
    pub async fn reconcile_document(
        &self,
        document_id: &str,
        instructions: &[UpdateInstruction],
    ) -> Result<DocumentOutcome> {
        trace!(?instructions, "applying updates to document");

        let resolution = resolve(instructions);
        let _permit = self.sequencer.acquire(document_id).await;

        match resolution {
            Resolution::Conflict => {
                let err = ViewSyncError::Conflict {
                    document_id: document_id.to_string(),
                };
                error!(error = %err, "combined unindex and index operations, skipping");
                Ok(DocumentOutcome::Conflict)
            }
            Resolution::Unindex => {
                info!(document_id, "unindexing document");
                self.store.unindex(document_id).await?;
                Ok(DocumentOutcome::Unindexed)
            }
            Resolution::Reindex => {
                trace!(document_id, "reindexing document");
                self.rebuild(document_id).await?;
                Ok(DocumentOutcome::Reindexed)
            }
            Resolution::Merge(refreshes) => self.merge(document_id, &refreshes).await,
        }
    }

    /// Full build and overwrite. Caller holds the document lock.
    pub(crate) async fn rebuild(&self, document_id: &str) -> Result<()> {
        let doc = self.builder.build(document_id).await?;
        trace!(document_id, "indexing rebuilt document");
        self.store.index(&doc).await
    }

    /// Refresh the named fragments in the stored document. Caller holds the lock.
    async fn merge(
        &self,
        document_id: &str,
        refreshes: &[FragmentRefresh],
    ) -> Result<DocumentOutcome> {
        let Some(mut doc) = self.store.get(document_id).await? else {
            trace!(document_id, "existing document missing, reindexing");
            self.rebuild(document_id).await?;
            return Ok(DocumentOutcome::Rebuilt);
        };

        let registry = self.builder.registry();
        let sources: Vec<(&str, SliceSource<'_, M>)> = refreshes
            .iter()
            .filter_map(|refresh| {
                let fragment_id = refresh.fragment_id.as_str();
                if RESERVED_FRAGMENT_IDS.contains(&fragment_id) {
                    warn!(
                        document_id,
                        fragment_id, "update names a reserved document key, skipping"
                    );
                    return None;
                }
                match (&refresh.fragment_data, registry.get(fragment_id)) {
                    (Some(data), _) => Some((fragment_id, SliceSource::Override(data))),
                    (None, Some(fragment)) => {
                        Some((fragment_id, SliceSource::Build(fragment.as_ref())))
                    }
                    (None, None) => {
                        warn!(
                            document_id,
                            fragment_id, "update names an unregistered fragment, skipping"
                        );
                        None
                    }
                }
            })
            .collect();

        if sources.is_empty() {
            return Ok(DocumentOutcome::Unchanged);
        }

        // Any failure leaves the stored document untouched.
        let slices = try_join_all(
            sources
                .into_iter()
                .map(|(fragment_id, source)| refresh_slice(fragment_id, source, document_id)),
        )
        .await?;

        let mut merged = Vec::with_capacity(slices.len());
        for slice in slices {
            match slice.value {
                Some(value) => doc.set_fragment(&slice.fragment_id, value, slice.built_at),
                None => doc.remove_fragment(&slice.fragment_id),
            }
            merged.push(slice.fragment_id);
        }

        trace!(document_id, fragments = ?merged, "updating merged document");
        self.store.index(&doc).await?;
        info!(document_id, fragments = ?merged, "merged fragments into document");
        Ok(DocumentOutcome::Merged { fragments: merged })
    }
}

/// Where a merged slice comes from.
enum SliceSource<'r, M: Message> {
    /// Override carried on the intent; the builder is not called.
    Override(&'r Value),
    Build(&'r dyn Fragment<M>),
}

async fn refresh_slice<M: Message>(
    fragment_id: &str,
    source: SliceSource<'_, M>,
    document_id: &str,
) -> Result<BuiltSlice> {
    match source {
        SliceSource::Override(data) => Ok(BuiltSlice {
            fragment_id: fragment_id.to_string(),
            value: Some(data.clone()),
            built_at: Utc::now(),
        }),
        SliceSource::Build(fragment) => build_slice(fragment, document_id).await,
    }
}
