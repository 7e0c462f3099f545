//! Sync engine state machine and observable status.

use crate::{PersistedState, Revision, Uid, Version};
use serde::Serialize;
use std::collections::BTreeSet;

/// Lifecycle phase of a sync engine run.
///
/// ```text
/// Idle ─start─▶ Pulling ─▶ Syncing ◀──────────────┐
///                             │ local change       │
///                             ▼                    │
///                        PushPending ─timer─▶ Pushing
///
/// any phase ─stop─▶ Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncPhase {
    /// Constructed, not started.
    Idle,
    /// Initial pull (or post-conflict re-pull) in progress.
    Pulling,
    /// Reconciled and listening for local changes.
    Syncing,
    /// A debounced push is armed.
    PushPending,
    /// A push is in flight.
    Pushing,
    /// Stopped. In-flight continuations become no-ops.
    Stopped,
}

impl SyncPhase {
    /// Returns true once the initial pull has settled and the run is alive.
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            SyncPhase::Syncing | SyncPhase::PushPending | SyncPhase::Pushing
        )
    }

    /// Returns true if network I/O is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncPhase::Pulling | SyncPhase::Pushing)
    }

    /// Checks whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SyncPhase) -> bool {
        use SyncPhase::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Stopped) => true,
            (Idle, Pulling) => true,
            (Pulling, Syncing) | (Pulling, PushPending) | (Pulling, Pushing) => true,
            (Syncing, PushPending) | (Syncing, Pushing) | (Syncing, Pulling) => true,
            (PushPending, PushPending) | (PushPending, Syncing) | (PushPending, Pushing) => true,
            (Pushing, Syncing) | (Pushing, PushPending) | (Pushing, Pulling) => true,
            _ => false,
        }
    }
}

/// Observable snapshot of a sync engine, for a sync indicator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Current phase
    pub phase: SyncPhase,
    /// Uid of the vault document, once known
    pub doc_uid: Option<Uid>,
    /// Last version observed as authoritative
    pub doc_version: Version,
    /// Successful writes (creates and replaces)
    pub pushes: u64,
    /// Version conflicts resolved by re-pulling
    pub conflicts: u64,
    /// Last failure, cleared by the next successful push or pull
    pub last_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            doc_uid: None,
            doc_version: 0,
            pushes: 0,
            conflicts: 0,
            last_error: None,
        }
    }
}

/// Engine-private bookkeeping for one run. Never persisted remotely.
#[derive(Debug, Default)]
pub(crate) struct SyncState {
    /// `None` only before the first successful create or pull.
    pub doc_uid: Option<Uid>,
    pub doc_version: Version,
    /// Last state known to match the remote document.
    pub last_pushed: Option<PersistedState>,
    /// Revisions produced by the engine's own `set_state` calls whose
    /// notifications have not arrived yet.
    pub own_revisions: BTreeSet<Revision>,
    pub initial_pull_done: bool,
}

impl SyncState {
    /// Record an authoritative document identity.
    pub fn observe(&mut self, uid: &str, version: Version) {
        if self.doc_uid.as_deref() != Some(uid) {
            self.doc_uid = Some(uid.to_string());
        }
        self.doc_version = version;
    }

    /// Forget the document (deleted remotely or signed out).
    pub fn forget_document(&mut self) {
        self.doc_uid = None;
        self.doc_version = 0;
        self.last_pushed = None;
    }

    /// Remember a revision written by the engine itself.
    pub fn record_own(&mut self, revision: Revision) {
        self.own_revisions.insert(revision);
    }

    /// Returns true, once, if a change at `revision` was caused by the
    /// engine. Other writers' revisions are never echoes, however they
    /// interleave with the engine's.
    pub fn take_echo(&mut self, revision: Revision) -> bool {
        self.own_revisions.remove(&revision)
    }
}
