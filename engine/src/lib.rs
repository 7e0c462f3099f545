//! # Vault Sync
//!
//! An offline-first sync engine that keeps local application state in step
//! with a single encrypted document on a remote server.
//!
//! The server only ever stores ciphertext. Encryption, transport and
//! authentication belong to the [`DocumentClient`] collaborator; this crate
//! decides *when* to pull and push, and how to reconcile the two copies.
//!
//! ## Design Principles
//!
//! - **Local first**: the [`LocalStateStore`] is authoritative and always
//!   usable offline. Sync is best effort and never surfaces errors to
//!   the caller.
//! - **One document**: the whole persisted state is written atomically as
//!   a single document guarded by an optimistic version check.
//! - **Pull before push**: local changes are only observed after the
//!   initial pull has been reconciled.
//! - **No lost updates**: a rejected write triggers a re-pull and merge,
//!   never a blind overwrite.
//!
//! ## Core Concepts
//!
//! ### Documents
//!
//! A [`Document`] carries a stable `uid`, a `version` that increases on
//! every successful write, and the decrypted content. A replace must name
//! the version it believes is current.
//!
//! ### Merge policy
//!
//! On pull, remote values overwrite local ones key by key, while keys the
//! remote document does not know about are kept (see [`merge_remote`]).
//!
//! ### Engine
//!
//! [`SyncEngine::start`] spawns the sync task and returns a [`SyncHandle`].
//! Local changes are debounced (2 s by default) into a single push of the
//! latest state. Failed pushes back off and retry (see [`RetryConfig`]).
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use vault_sync::{
//!     InMemoryCollection, LocalStateStore, MemoryStateStore, PersistedState, SyncConfig,
//!     SyncEngine,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let client = Arc::new(InMemoryCollection::<PersistedState>::new());
//! let store = Arc::new(MemoryStateStore::new());
//!
//! let engine = SyncEngine::new(SyncConfig::default(), client.clone(), store.clone());
//! let handle = engine.start();
//! assert!(handle.ready().await);
//!
//! let mut change = PersistedState::new();
//! change.insert("invoices".into(), json!([]));
//! store.set_state(change);
//!
//! handle.stop();
//! handle.join().await;
//! # }
//! ```

pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod hint;
pub mod merge;
pub mod state;
pub mod store;

// Re-export main types at crate root
pub use config::{RetryConfig, SyncConfig, DEFAULT_DEBOUNCE};
pub use document::{Document, DocumentClient, InMemoryCollection, ListOptions};
pub use engine::{SyncEngine, SyncHandle};
pub use error::{ClientError, ClientResult, Error, FailureKind, Result};
pub use hint::{FileHintStore, MemoryHintStore, UidHintStore, HINT_FORMAT_VERSION};
pub use merge::{is_unchanged, local_only_keys, merge_remote};
pub use state::{SyncPhase, SyncStatus};
pub use store::{Listener, LocalStateStore, MemoryStateStore, StateChange, Subscription};

/// The full application state snapshot, synchronized as one unit.
pub type PersistedState = serde_json::Map<String, serde_json::Value>;

/// Type aliases for clarity
pub type Uid = String;
pub type Version = u64;
pub type Revision = u64;
