//! Core domain types for viewsync composite documents and update intents.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Document key holding the document identifier.
pub const ID_KEY: &str = "id";

/// Document key holding per-fragment last-update timestamps.
pub const FRAG_LAST_UPDATE_KEY: &str = "_fragLastUpdate";

/// Fragment ids that would collide with document-level keys.
pub const RESERVED_FRAGMENT_IDS: [&str; 2] = [ID_KEY, FRAG_LAST_UPDATE_KEY];

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A composite document assembled from fragment slices.
///
/// Serializes flat: `{"id": .., "<fragment>": .., "_fragLastUpdate": {..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier.
    pub id: String,
    /// Last-update timestamp per contributing fragment.
    #[serde(rename = "_fragLastUpdate", default)]
    pub frag_last_update: BTreeMap<String, DateTime<Utc>>,
    /// Fragment slices keyed by fragment id.
    #[serde(flatten)]
    pub fragments: BTreeMap<String, Value>,
}

impl Document {
    /// Create an empty document with no fragment slices.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            frag_last_update: BTreeMap::new(),
            fragments: BTreeMap::new(),
        }
    }

    /// Set a fragment slice and stamp its last-update time.
    pub fn set_fragment(&mut self, fragment_id: &str, value: Value, at: DateTime<Utc>) {
        self.fragments.insert(fragment_id.to_string(), value);
        self.frag_last_update.insert(fragment_id.to_string(), at);
    }

    /// Drop a fragment slice along with its timestamp.
    pub fn remove_fragment(&mut self, fragment_id: &str) {
        self.fragments.remove(fragment_id);
        self.frag_last_update.remove(fragment_id);
    }

    /// Get a fragment slice by id.
    pub fn fragment(&self, fragment_id: &str) -> Option<&Value> {
        self.fragments.get(fragment_id)
    }
}

// ---------------------------------------------------------------------------
// Update intents
// ---------------------------------------------------------------------------

/// What a fragment wants done to the documents it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateAction {
    /// Remove the document from the store.
    Unindex,
    /// Rebuild the whole document.
    Reindex,
    /// Refresh only the emitting fragment's slice.
    UpdateFragment,
}

impl std::fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unindex => "unindex",
            Self::Reindex => "reindex",
            Self::UpdateFragment => "updateFragment",
        };
        f.write_str(s)
    }
}

/// A fragment's classification of an incoming message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateIntent {
    /// Action to apply.
    pub action: UpdateAction,
    /// Affected document ids (may be empty).
    #[serde(default)]
    pub ids: Vec<String>,
    /// Value to use for the fragment slice instead of rebuilding it.
    #[serde(
        rename = "fragmentData",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub fragment_data: Option<Value>,
}

impl UpdateIntent {
    /// Intent to remove the given documents.
    pub fn unindex<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_action(UpdateAction::Unindex, ids)
    }

    /// Intent to fully rebuild the given documents.
    pub fn reindex<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_action(UpdateAction::Reindex, ids)
    }

    /// Intent to refresh the emitting fragment's slice on the given documents.
    pub fn update_fragment<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_action(UpdateAction::UpdateFragment, ids)
    }

    /// Attach an override value for the fragment slice.
    pub fn with_fragment_data(mut self, data: Value) -> Self {
        self.fragment_data = Some(data);
        self
    }

    fn with_action<I, S>(action: UpdateAction, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            action,
            ids: ids.into_iter().map(Into::into).collect(),
            fragment_data: None,
        }
    }
}

/// An intent tagged with the fragment that emitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentUpdate {
    pub fragment_id: String,
    pub update: UpdateIntent,
}

/// Single-document expansion of an [`UpdateIntent`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateInstruction {
    pub document_id: String,
    pub fragment_id: String,
    pub action: UpdateAction,
    pub fragment_data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_serializes_flat() {
        let at = Utc::now();
        let mut doc = Document::new("app1");
        doc.set_fragment("status", json!(1), at);
        doc.set_fragment("notes", json!([{"note": "awesome app"}]), at);

        let value = serde_json::to_value(&doc).expect("serialize");
        assert_eq!(value["id"], "app1");
        assert_eq!(value["status"], 1);
        assert_eq!(value["notes"][0]["note"], "awesome app");
        assert!(value["_fragLastUpdate"]["status"].is_string());
        assert!(value["_fragLastUpdate"]["notes"].is_string());

        let parsed: Document = serde_json::from_value(value).expect("deserialize");
        assert_eq!(parsed, doc);
    }

    #[test]
    fn document_without_timestamps_parses() {
        let doc: Document =
            serde_json::from_value(json!({"id": "x", "status": 3})).expect("deserialize");
        assert_eq!(doc.fragment("status"), Some(&json!(3)));
        assert!(doc.frag_last_update.is_empty());
    }

    #[test]
    fn remove_fragment_drops_timestamp() {
        let mut doc = Document::new("a");
        doc.set_fragment("status", json!(1), Utc::now());
        doc.remove_fragment("status");
        assert!(doc.fragments.is_empty());
        assert!(doc.frag_last_update.is_empty());
    }

    #[test]
    fn intent_wire_shape() {
        let intent: UpdateIntent = serde_json::from_value(json!({
            "action": "updateFragment",
            "ids": ["app1", "app2"],
            "fragmentData": 5
        }))
        .expect("parse intent");
        assert_eq!(intent.action, UpdateAction::UpdateFragment);
        assert_eq!(intent.ids, vec!["app1", "app2"]);
        assert_eq!(intent.fragment_data, Some(json!(5)));

        let out = serde_json::to_value(UpdateIntent::unindex(["a"])).expect("serialize");
        assert_eq!(out, json!({"action": "unindex", "ids": ["a"]}));
    }

    #[test]
    fn action_display_matches_wire_names() {
        assert_eq!(UpdateAction::UpdateFragment.to_string(), "updateFragment");
        assert_eq!(UpdateAction::Reindex.to_string(), "reindex");
    }
}
