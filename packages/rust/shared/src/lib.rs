//! Shared types, error model, and configuration for viewsync.
//!
//! This crate is the foundation depended on by all other viewsync crates.
//! It provides:
//! - [`ViewSyncError`]: the unified error type
//! - Domain types ([`Document`], [`UpdateIntent`], [`UpdateInstruction`])
//! - Configuration ([`AppConfig`], [`ReconcileConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildPolicy, ReconcileConfig, SourcesConfig, StoreConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{FragmentError, Result, ViewSyncError};
pub use types::{
    Document, FRAG_LAST_UPDATE_KEY, FragmentUpdate, ID_KEY, RESERVED_FRAGMENT_IDS, UpdateAction,
    UpdateInstruction, UpdateIntent,
};
