//! Full and single-fragment document builds.
//!
//! A full build fans out to every registered fragment concurrently and
//! assembles the results by fragment id. Fragments that report no
//! contribution are left out of the document and of `_fragLastUpdate`.

use chrono::{DateTime, Utc};
use futures::future::{join_all, try_join_all};
use serde_json::Value;
use tracing::{trace, warn};

use viewsync_shared::{BuildPolicy, Document, Result, ViewSyncError};

use crate::fragment::{Fragment, Message};
use crate::registry::FragmentRegistry;

/// One fragment's build output, stamped with its completion time.
#[derive(Debug, Clone)]
pub struct BuiltSlice {
    pub fragment_id: String,
    pub value: Option<Value>,
    pub built_at: DateTime<Utc>,
}

/// Builds documents from the fragments in a registry.
pub struct DocumentBuilder<'a, M: Message> {
    registry: &'a FragmentRegistry<M>,
    policy: BuildPolicy,
}

impl<'a, M: Message> DocumentBuilder<'a, M> {
    pub fn new(registry: &'a FragmentRegistry<M>, policy: BuildPolicy) -> Self {
        Self { registry, policy }
    }

    /// Build the full document for `document_id`.
    ///
    /// Under [`BuildPolicy::FailFast`] the first fragment failure aborts the
    /// build. Under [`BuildPolicy::BestEffort`] failing fragments are omitted.
    pub async fn build(&self, document_id: &str) -> Result<Document> {
        let builds = self
            .registry
            .iter()
            .map(|fragment| build_slice(fragment.as_ref(), document_id));

        let slices = match self.policy {
            BuildPolicy::FailFast => try_join_all(builds).await?,
            BuildPolicy::BestEffort => join_all(builds)
                .await
                .into_iter()
                .filter_map(|result| match result {
                    Ok(slice) => Some(slice),
                    Err(e) => {
                        warn!(document_id, error = %e, "dropping failed fragment from build");
                        None
                    }
                })
                .collect(),
        };

        let mut doc = Document::new(document_id);
        for slice in slices {
            if let Some(value) = slice.value {
                doc.set_fragment(&slice.fragment_id, value, slice.built_at);
            }
        }

        trace!(
            document_id,
            fragments = doc.fragments.len(),
            "document built"
        );
        Ok(doc)
    }

    pub fn registry(&self) -> &'a FragmentRegistry<M> {
        self.registry
    }
}

/// Build one fragment's slice, attaching document and fragment context to failures.
pub async fn build_slice<M: Message>(
    fragment: &dyn Fragment<M>,
    document_id: &str,
) -> Result<BuiltSlice> {
    let value = fragment
        .build_fragment(document_id)
        .await
        .map_err(|source| ViewSyncError::FragmentBuild {
            fragment_id: fragment.id().to_string(),
            document_id: document_id.to_string(),
            source,
        })?;

    Ok(BuiltSlice {
        fragment_id: fragment.id().to_string(),
        value,
        built_at: Utc::now(),
    })
}
