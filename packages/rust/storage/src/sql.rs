//! libSQL-backed destination store (embedded, offline mode).
//!
//! Documents are stored whole as their flat JSON body, keyed by id.
//!
//! **Access rules:**
//! - Engine processes: read-write via [`SqlStore::open`]
//! - Inspection tools: read-only via [`SqlStore::open_readonly`]

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database, params};
use tracing::instrument;

use viewsync_shared::{Document, Result, ViewSyncError};

use crate::DestinationStore;
use crate::migrations;

/// Destination store wrapping a libSQL database.
pub struct SqlStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl SqlStore {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ViewSyncError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(ViewSyncError::storage)?;

        let conn = db.connect().map_err(ViewSyncError::storage)?;

        let store = Self {
            db,
            conn,
            readonly: false,
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(ViewSyncError::storage)?;

        let conn = db.connect().map_err(ViewSyncError::storage)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ViewSyncError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ViewSyncError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Number of stored documents.
    pub async fn count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM documents", params![])
            .await
            .map_err(ViewSyncError::storage)?;

        match rows.next().await {
            Ok(Some(row)) => row.get::<u64>(0).map_err(ViewSyncError::storage),
            Ok(None) => Ok(0),
            Err(e) => Err(ViewSyncError::storage(e)),
        }
    }

    /// List stored document ids in ascending order.
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query("SELECT id FROM documents ORDER BY id", params![])
            .await
            .map_err(ViewSyncError::storage)?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await.map_err(ViewSyncError::storage)? {
            ids.push(row.get::<String>(0).map_err(ViewSyncError::storage)?);
        }
        Ok(ids)
    }
}

#[async_trait]
impl DestinationStore for SqlStore {
    #[instrument(skip_all, fields(id = %document.id))]
    async fn index(&self, document: &Document) -> Result<()> {
        self.check_writable()?;
        let body = serde_json::to_string(document)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO documents (id, body, indexed_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                   body = excluded.body,
                   indexed_at = excluded.indexed_at",
                params![document.id.as_str(), body, now],
            )
            .await
            .map_err(ViewSyncError::storage)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn unindex(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .await
            .map_err(ViewSyncError::storage)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<Option<Document>> {
        let mut rows = self
            .conn
            .query("SELECT body FROM documents WHERE id = ?1", params![id])
            .await
            .map_err(ViewSyncError::storage)?;

        match rows.next().await {
            Ok(Some(row)) => {
                let body: String = row.get(0).map_err(ViewSyncError::storage)?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(ViewSyncError::storage(e)),
        }
    }
}
