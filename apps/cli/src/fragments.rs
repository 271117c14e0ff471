//! Demo fragments backed by the JSON sources file, and the messages they react to.
//!
//! Both fragments re-read the sources file on every build so edits made
//! between commands are picked up.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use viewsync_core::Fragment;
use viewsync_shared::{FragmentError, UpdateIntent};

/// Change notifications accepted by `viewsync message`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum ChangeMessage {
    /// An application's status changed upstream. A `status` value, when
    /// present, is written as-is instead of re-reading the sources.
    #[serde(rename_all = "camelCase")]
    StatusUpdated {
        application_id: String,
        #[serde(default)]
        status: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    NoteAdded { application_id: String },
    #[serde(rename_all = "camelCase")]
    ApplicationArchived { application_id: String },
    #[serde(rename_all = "camelCase")]
    ApplicationCreated { application_id: String },
}

#[derive(Debug, Default, Deserialize)]
struct Sources {
    #[serde(default)]
    applications: Vec<Application>,
    #[serde(default)]
    notes: Vec<Note>,
}

#[derive(Debug, Deserialize)]
struct Application {
    id: String,
    status: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Note {
    id: String,
    application_id: String,
    note: String,
}

async fn read_sources(path: &Path) -> Result<Sources, FragmentError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("cannot read sources at {}: {e}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

/// The application's status code.
pub(crate) struct StatusFragment {
    sources: PathBuf,
}

impl StatusFragment {
    pub(crate) fn new(sources: impl Into<PathBuf>) -> Self {
        Self {
            sources: sources.into(),
        }
    }
}

#[async_trait]
impl Fragment<ChangeMessage> for StatusFragment {
    fn id(&self) -> &str {
        "status"
    }

    fn on_message(&self, message: &ChangeMessage) -> Result<Option<UpdateIntent>, FragmentError> {
        let intent = match message {
            ChangeMessage::StatusUpdated {
                application_id,
                status,
            } => {
                let intent = UpdateIntent::update_fragment([application_id.as_str()]);
                Some(match status {
                    Some(status) => intent.with_fragment_data(json!(status)),
                    None => intent,
                })
            }
            ChangeMessage::ApplicationArchived { application_id } => {
                Some(UpdateIntent::unindex([application_id.as_str()]))
            }
            ChangeMessage::ApplicationCreated { application_id } => {
                Some(UpdateIntent::reindex([application_id.as_str()]))
            }
            ChangeMessage::NoteAdded { .. } => None,
        };
        Ok(intent)
    }

    async fn build_fragment(&self, document_id: &str) -> Result<Option<Value>, FragmentError> {
        let sources = read_sources(&self.sources).await?;
        let status = sources
            .applications
            .into_iter()
            .find(|app| app.id == document_id)
            .map(|app| json!(app.status));
        debug!(document_id, found = status.is_some(), "built status");
        Ok(status)
    }
}

// ---------------------------------------------------------------------------
// notes
// ---------------------------------------------------------------------------

/// Every note attached to the application.
pub(crate) struct NotesFragment {
    sources: PathBuf,
}

impl NotesFragment {
    pub(crate) fn new(sources: impl Into<PathBuf>) -> Self {
        Self {
            sources: sources.into(),
        }
    }
}

#[async_trait]
impl Fragment<ChangeMessage> for NotesFragment {
    fn id(&self) -> &str {
        "notes"
    }

    fn on_message(&self, message: &ChangeMessage) -> Result<Option<UpdateIntent>, FragmentError> {
        Ok(match message {
            ChangeMessage::NoteAdded { application_id } => {
                Some(UpdateIntent::update_fragment([application_id.as_str()]))
            }
            _ => None,
        })
    }

    async fn build_fragment(&self, document_id: &str) -> Result<Option<Value>, FragmentError> {
        let sources = read_sources(&self.sources).await?;
        let notes: Vec<Value> = sources
            .notes
            .into_iter()
            .filter(|note| note.application_id == document_id)
            .map(|note| {
                json!({
                    "id": note.id,
                    "applicationId": note.application_id,
                    "note": note.note,
                })
            })
            .collect();
        Ok(Some(Value::Array(notes)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use viewsync_core::{DocumentOutcome, ViewSync};
    use viewsync_shared::UpdateAction;
    use viewsync_storage::MemoryStore;

    fn fixture() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/json/sources.fixture.json")
    }

    #[test]
    fn parses_tagged_messages() {
        let msg: ChangeMessage =
            serde_json::from_str(r#"{"type":"statusUpdated","applicationId":"app1"}"#).unwrap();
        assert_eq!(
            msg,
            ChangeMessage::StatusUpdated {
                application_id: "app1".into(),
                status: None
            }
        );

        let msg: ChangeMessage =
            serde_json::from_str(r#"{"type":"noteAdded","applicationId":"app2"}"#).unwrap();
        assert_eq!(
            msg,
            ChangeMessage::NoteAdded {
                application_id: "app2".into()
            }
        );

        assert!(serde_json::from_str::<ChangeMessage>(r#"{"type":"unknown"}"#).is_err());
    }

    #[test]
    fn status_handler_classifies_messages() {
        let status = StatusFragment::new(fixture());

        let intent = status
            .on_message(&ChangeMessage::StatusUpdated {
                application_id: "app1".into(),
                status: Some(5),
            })
            .unwrap()
            .expect("status update concerns status");
        assert_eq!(intent.action, UpdateAction::UpdateFragment);
        assert_eq!(intent.fragment_data, Some(json!(5)));

        let intent = status
            .on_message(&ChangeMessage::ApplicationArchived {
                application_id: "app1".into(),
            })
            .unwrap()
            .unwrap();
        assert_eq!(intent.action, UpdateAction::Unindex);

        assert!(
            status
                .on_message(&ChangeMessage::NoteAdded {
                    application_id: "app1".into()
                })
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn builds_from_fixture() {
        let notes = NotesFragment::new(fixture());
        let built = notes.build_fragment("app2").await.unwrap().unwrap();
        assert_eq!(built.as_array().map(Vec::len), Some(2));

        let status = StatusFragment::new(fixture());
        assert_eq!(status.build_fragment("app1").await.unwrap(), Some(json!(1)));
        assert_eq!(status.build_fragment("app9").await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_sources_file_fails_the_build() {
        let status = StatusFragment::new("does/not/exist.json");
        let err = status.build_fragment("app1").await.unwrap_err();
        assert!(err.to_string().contains("cannot read sources"));
    }

    #[tokio::test]
    async fn status_override_skips_sources() {
        let mut engine = ViewSync::new(MemoryStore::new());
        engine
            .register_fragment(StatusFragment::new(fixture()))
            .unwrap()
            .register_fragment(NotesFragment::new(fixture()))
            .unwrap();
        let engine = Arc::new(engine);
        engine.start().await.unwrap();

        engine.index("app1").await.unwrap();
        let report = engine
            .on_message(&ChangeMessage::StatusUpdated {
                application_id: "app1".into(),
                status: Some(7),
            })
            .await
            .unwrap();
        assert_eq!(
            report.outcome("app1"),
            Some(&DocumentOutcome::Merged {
                fragments: vec!["status".into()]
            })
        );

        let doc = engine.build("app1").await.unwrap();
        assert_eq!(doc.fragment("status"), Some(&json!(1)));

        let stored = viewsync_storage::DestinationStore::get(engine.store(), "app1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.fragment("status"), Some(&json!(7)));
        assert_eq!(stored.fragment("notes").and_then(Value::as_array).map(Vec::len), Some(1));
    }
}
