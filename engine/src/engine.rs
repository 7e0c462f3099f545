//! The vault sync engine.
//!
//! A started engine is a single tokio task that exclusively owns the sync
//! bookkeeping. Store notifications and handle commands reach it over one
//! channel, and the debounce timer is a single optional deadline, so pushes
//! are strictly serialized without any locking around the sync state.
//!
//! # Lifecycle
//!
//! 1. Pull: fetch the hinted document directly, else list the collection.
//! 2. Reconcile: merge the remote document into the local store, or seed a
//!    new document from local state if none exists.
//! 3. Subscribe to local changes. Only now can local mutations be pushed.
//! 4. Each change (re)arms the debounce timer; when it fires, the latest
//!    local state is written with the last known version as the
//!    optimistic lock.
//! 5. A version conflict re-pulls and merges instead of overwriting.

use crate::config::SyncConfig;
use crate::document::{Document, DocumentClient, ListOptions};
use crate::error::{ClientError, ClientResult, Error, FailureKind, Result};
use crate::hint::{MemoryHintStore, UidHintStore};
use crate::merge::{is_unchanged, local_only_keys, merge_remote};
use crate::state::{SyncPhase, SyncState, SyncStatus};
use crate::store::{LocalStateStore, StateChange, Subscription};
use crate::{PersistedState, Uid};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Input to a running engine task.
#[derive(Debug)]
enum Command {
    /// The local store changed.
    Changed(StateChange),
    /// Explicit request to push `state` after the debounce interval.
    Schedule(PersistedState),
    /// Push now, skipping the debounce interval.
    Flush,
    Stop,
}

#[derive(Debug, Default)]
struct Shared {
    stopped: AtomicBool,
    ready: AtomicBool,
    /// The store subscription of the run, released by whoever stops it.
    subscription: Mutex<Option<Subscription>>,
}

impl Shared {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Keep `subscription` alive until the run stops. A run that already
    /// stopped releases it immediately.
    fn attach(&self, subscription: Subscription) {
        let rejected = {
            let mut slot = self.subscription.lock();
            if self.is_stopped() {
                Some(subscription)
            } else {
                *slot = Some(subscription);
                None
            }
        };
        drop(rejected);
    }

    /// Unsubscribe from the store, if still subscribed.
    fn detach(&self) {
        let subscription = self.subscription.lock().take();
        if let Some(mut subscription) = subscription {
            subscription.unsubscribe();
        }
    }
}

/// Handle to a running sync engine. Cloning is cheap.
///
/// [`SyncHandle::stop`] is the cleanup function of a run.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SyncStatus>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SyncHandle {
    /// Stop the engine.
    ///
    /// Unsubscribes from the store before returning and cancels the
    /// pending push timer. A request already in flight is not aborted; its
    /// result is discarded. Safe to call repeatedly, and before the initial
    /// pull has finished.
    pub fn stop(&self) {
        if !self.shared.stopped.swap(true, Ordering::SeqCst) {
            // The task may already be gone; the flag alone is enough then.
            let _ = self.commands.send(Command::Stop);
        }
        self.shared.detach();
    }

    /// Check if the engine was stopped.
    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// Ask for a debounced push because `state` changed.
    ///
    /// Ignored until the initial pull has completed, and after stop. The
    /// push itself always carries the store's state at the time the timer
    /// fires. Returns whether the request was accepted.
    pub fn schedule_push(&self, state: PersistedState) -> bool {
        if self.is_stopped() || !self.shared.ready.load(Ordering::SeqCst) {
            return false;
        }
        self.commands.send(Command::Schedule(state)).is_ok()
    }

    /// Push the current local state immediately.
    pub fn flush(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(Error::NotRunning);
        }
        self.commands
            .send(Command::Flush)
            .map_err(|_| Error::NotRunning)
    }

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// A receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Wait until the initial pull has settled.
    ///
    /// Returns false if the engine stopped first.
    pub async fn ready(&self) -> bool {
        let mut status = self.status.clone();
        let result = status
            .wait_for(|s| s.phase.is_ready() || s.phase == SyncPhase::Stopped)
            .await
            .map(|s| s.phase.is_ready());
        result.unwrap_or(false)
    }

    /// Wait for the engine task to exit.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Sync task ended abnormally");
            }
        }
    }
}

/// Keeps a [`LocalStateStore`] in sync with a single remote document.
pub struct SyncEngine<C, S> {
    config: SyncConfig,
    client: Arc<C>,
    store: Arc<S>,
    hints: Arc<dyn UidHintStore>,
    running: Mutex<Option<SyncHandle>>,
}

impl<C, S> SyncEngine<C, S>
where
    C: DocumentClient<PersistedState> + 'static,
    S: LocalStateStore,
{
    /// Create an engine. Nothing happens until [`start`](Self::start).
    pub fn new(config: SyncConfig, client: Arc<C>, store: Arc<S>) -> Self {
        Self {
            config,
            client,
            store,
            hints: Arc::new(MemoryHintStore::new()),
            running: Mutex::new(None),
        }
    }

    /// Use `hints` to remember the document uid across starts.
    pub fn with_hint_store(mut self, hints: Arc<dyn UidHintStore>) -> Self {
        self.hints = hints;
        self
    }

    /// Start syncing.
    ///
    /// Idempotent: while a run is active its handle is returned. Must be
    /// called from within a tokio runtime.
    pub fn start(&self) -> SyncHandle {
        let mut running = self.running.lock();
        if let Some(handle) = running.as_ref() {
            if !handle.is_stopped() {
                return handle.clone();
            }
        }

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SyncStatus::default());
        let shared = Arc::new(Shared::default());

        let worker = SyncWorker {
            config: self.config.clone(),
            client: self.client.clone(),
            store: self.store.clone(),
            hints: self.hints.clone(),
            shared: shared.clone(),
            status: status_tx,
            state: SyncState::default(),
            phase: SyncPhase::Idle,
            deadline: None,
            retry: None,
        };
        let listener_tx = commands_tx.downgrade();
        let task = tokio::spawn(worker.run(commands_rx, listener_tx));

        let handle = SyncHandle {
            shared,
            commands: commands_tx,
            status: status_rx,
            task: Arc::new(Mutex::new(Some(task))),
        };
        *running = Some(handle.clone());
        handle
    }

    /// The local store this engine synchronizes.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The document client this engine writes through.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }
}

impl<C, S> SyncEngine<C, S> {
    /// Handle of the current run, if one was started.
    pub fn handle(&self) -> Option<SyncHandle> {
        self.running.lock().clone()
    }

    /// Stop the current run, if any.
    pub fn stop(&self) {
        if let Some(handle) = self.running.lock().as_ref() {
            handle.stop();
        }
    }

    /// Stop syncing and forget the remembered document uid.
    pub fn sign_out(&self) -> Result<()> {
        self.stop();
        self.hints.clear()
    }
}

impl<C, S> Drop for SyncEngine<C, S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Consecutive failed pushes and their backoff schedule.
struct RetryStreak {
    backoff: ExponentialBackoff,
    attempts: u32,
}

struct SyncWorker<C, S> {
    config: SyncConfig,
    client: Arc<C>,
    store: Arc<S>,
    hints: Arc<dyn UidHintStore>,
    shared: Arc<Shared>,
    status: watch::Sender<SyncStatus>,
    state: SyncState,
    phase: SyncPhase,
    /// Single-slot push timer.
    deadline: Option<Instant>,
    retry: Option<RetryStreak>,
}

impl<C, S> SyncWorker<C, S>
where
    C: DocumentClient<PersistedState> + 'static,
    S: LocalStateStore,
{
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        listener_tx: mpsc::WeakUnboundedSender<Command>,
    ) {
        self.transition(SyncPhase::Pulling);

        let hint = self.load_hint().await;
        let pulled = self.pull(hint.clone()).await;
        if self.is_stopped() {
            debug!("Stopped during initial pull");
            self.finish();
            return;
        }

        let mut seed = false;
        match pulled {
            Ok(Some(document)) => self.apply_remote(document).await,
            Ok(None) => {
                info!("No remote vault document, seeding from local state");
                seed = true;
            }
            Err(e) if hint.is_none() => {
                warn!(error = %e, "Initial pull failed, seeding from local state");
                self.record_error(&e);
                seed = true;
            }
            Err(e) => {
                warn!(error = %e, "Initial pull failed, keeping local state");
                self.record_error(&e);
                // Version 0 never matches, so the first push re-pulls and
                // merges instead of creating a second document.
                if let Some(uid) = hint {
                    self.state.observe(&uid, 0);
                    self.publish_document();
                }
            }
        }
        self.state.initial_pull_done = true;

        // Subscribing only after the pull keeps stale pre-sync local state
        // from being pushed over a newer remote document.
        let shared = self.shared.clone();
        let subscription = self.store.subscribe(Arc::new(move |change: &StateChange| {
            if shared.is_stopped() {
                return;
            }
            if let Some(tx) = listener_tx.upgrade() {
                let _ = tx.send(Command::Changed(change.clone()));
            }
        }));
        self.shared.attach(subscription);
        self.shared.ready.store(true, Ordering::SeqCst);
        self.transition(SyncPhase::Syncing);

        if seed {
            self.push().await;
        }

        while !self.is_stopped() {
            let deadline = self.deadline;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Changed(change)) => self.on_change(change),
                    Some(Command::Schedule(state)) => self.schedule_push(&state),
                    Some(Command::Flush) => {
                        self.deadline = None;
                        self.push().await;
                    }
                    Some(Command::Stop) | None => break,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.deadline = None;
                    self.push().await;
                }
            }
        }

        self.finish();
    }

    fn on_change(&mut self, change: StateChange) {
        if self.state.take_echo(change.revision) {
            trace!(revision = change.revision, "Ignoring echo of merged remote state");
            return;
        }
        self.schedule_push(&change.state);
    }

    fn schedule_push(&mut self, state: &PersistedState) {
        if !self.state.initial_pull_done {
            return;
        }

        if is_unchanged(state, self.state.last_pushed.as_ref()) {
            // A change that was reverted within the window needs no push.
            if self.deadline.take().is_some() {
                self.transition(SyncPhase::Syncing);
            }
            return;
        }

        // A fresh local change starts a new failure streak.
        self.retry = None;
        self.deadline = Some(Instant::now() + self.config.debounce);
        self.transition(SyncPhase::PushPending);
    }

    async fn push(&mut self) {
        if self.is_stopped() {
            return;
        }

        let state = self.store.get_state();
        if self.state.doc_uid.is_some() && is_unchanged(&state, self.state.last_pushed.as_ref()) {
            self.transition(SyncPhase::Syncing);
            return;
        }

        self.transition(SyncPhase::Pushing);
        let expected_version = self.state.doc_version;
        let result = match self.state.doc_uid.clone() {
            None => self.client.create(state.clone()).await,
            Some(uid) => {
                self.client
                    .replace(&uid, state.clone(), expected_version)
                    .await
            }
        };

        if self.is_stopped() {
            debug!("Push finished after stop, discarding result");
            return;
        }

        match result {
            Ok(document) => {
                let created = self.state.doc_uid.is_none();
                self.state.observe(&document.uid, document.version);
                self.state.last_pushed = Some(state);
                self.retry = None;
                if created {
                    info!(doc_uid = %document.uid, "Created vault document");
                    self.save_hint(&document.uid).await;
                } else {
                    debug!(doc_uid = %document.uid, version = document.version, "Pushed vault document");
                }
                self.status.send_modify(|s| {
                    s.pushes += 1;
                    s.last_error = None;
                });
                self.publish_document();
                self.transition(SyncPhase::Syncing);
            }
            Err(e) => self.on_push_failure(e, expected_version).await,
        }
    }

    async fn on_push_failure(&mut self, error: ClientError, expected_version: u64) {
        match error.kind() {
            FailureKind::Conflict => {
                warn!(expected_version, error = %error, "Push rejected, re-pulling");
                self.status.send_modify(|s| s.conflicts += 1);
                self.resolve_conflict().await;
            }
            FailureKind::NotFound => {
                warn!(error = %error, "Vault document vanished, it will be recreated");
                self.state.forget_document();
                self.clear_hint().await;
                self.publish_document();
                self.record_error(&error);
                self.arm_retry();
            }
            FailureKind::Transient | FailureKind::Unclassified => {
                warn!(error = %error, "Push failed");
                self.record_error(&error);
                self.arm_retry();
            }
        }
    }

    /// Converge to the latest remote state after losing a write race.
    async fn resolve_conflict(&mut self) {
        self.transition(SyncPhase::Pulling);
        let pulled = self.pull(self.state.doc_uid.clone()).await;
        if self.is_stopped() {
            return;
        }

        match pulled {
            Ok(Some(document)) => {
                let remote = document.content.clone();
                self.apply_remote(document).await;

                // Local-only keys survived the merge but the server has
                // never seen them.
                let local = self.store.get_state();
                if local_only_keys(&local, &remote).next().is_some() {
                    self.state.last_pushed = Some(remote);
                    self.deadline = Some(Instant::now() + self.config.debounce);
                    self.transition(SyncPhase::PushPending);
                } else {
                    self.transition(SyncPhase::Syncing);
                }
            }
            Ok(None) => {
                warn!("Vault document missing after conflict, it will be recreated");
                self.state.forget_document();
                self.clear_hint().await;
                self.publish_document();
                self.arm_retry();
            }
            Err(e) => {
                warn!(error = %e, "Re-pull after conflict failed");
                self.record_error(&e);
                self.arm_retry();
            }
        }
    }

    /// Fetch the vault document: directly by uid if one is known, else by
    /// listing the collection.
    async fn pull(&mut self, uid: Option<Uid>) -> ClientResult<Option<Document<PersistedState>>> {
        if let Some(uid) = uid {
            match self.client.get(&uid).await {
                Ok(document) => return Ok(Some(document)),
                Err(e) => {
                    debug!(doc_uid = %uid, error = %e, "Direct fetch failed, listing collection");
                }
            }
            if self.is_stopped() {
                return Ok(None);
            }
        }

        let documents = self.client.list(ListOptions::limit(1)).await?;
        Ok(documents.into_iter().next())
    }

    /// Merge a pulled document into the local store.
    ///
    /// Only the remote content is written: the store's shallow merge lets
    /// remote keys win and leaves every other key alone, including keys
    /// another writer sets while this runs.
    async fn apply_remote(&mut self, document: Document<PersistedState>) {
        let Document { uid, version, content } = document;

        // What the store holds once the write lands, unless someone else
        // writes in between. Their keys then differ and get pushed.
        let local = self.store.get_state();
        self.state.last_pushed = Some(merge_remote(&local, &content));
        self.state.observe(&uid, version);

        let revision = self.store.set_state(content);
        if self.state.initial_pull_done {
            self.state.record_own(revision);
        }

        debug!(doc_uid = %uid, version, revision, "Merged remote vault document");
        self.status.send_modify(|s| s.last_error = None);
        self.publish_document();
        self.save_hint(&uid).await;
    }

    fn arm_retry(&mut self) {
        let retry = &self.config.retry;
        if !retry.enabled {
            self.transition(SyncPhase::Syncing);
            return;
        }

        let streak = self.retry.get_or_insert_with(|| RetryStreak {
            backoff: retry.backoff(),
            attempts: 0,
        });
        let delay = if streak.attempts < retry.max_attempts {
            streak.attempts += 1;
            streak.backoff.next_backoff().map(|delay| (streak.attempts, delay))
        } else {
            None
        };

        match delay {
            Some((attempt, delay)) => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying push");
                self.deadline = Some(Instant::now() + delay);
                self.transition(SyncPhase::PushPending);
            }
            None => {
                warn!("Giving up automatic push retries until the next local change");
                self.retry = None;
                self.transition(SyncPhase::Syncing);
            }
        }
    }

    /// Run a hint store operation on the blocking pool.
    async fn with_hints<R, F>(&self, op: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&dyn UidHintStore) -> Result<R> + Send + 'static,
    {
        let hints = self.hints.clone();
        tokio::task::spawn_blocking(move || op(hints.as_ref()))
            .await
            .map_err(|e| Error::Hint(e.to_string()))?
    }

    async fn load_hint(&self) -> Option<Uid> {
        match self.with_hints(|hints| hints.load()).await {
            Ok(uid) => uid,
            Err(e) => {
                warn!(error = %e, "Failed to read document uid hint");
                None
            }
        }
    }

    async fn save_hint(&self, uid: &str) {
        // sign_out clears the hint right after stopping.
        if self.is_stopped() {
            return;
        }
        let owned = uid.to_string();
        if let Err(e) = self.with_hints(move |hints| hints.save(&owned)).await {
            warn!(doc_uid = %uid, error = %e, "Failed to persist document uid hint");
        }
    }

    async fn clear_hint(&self) {
        if let Err(e) = self.with_hints(|hints| hints.clear()).await {
            warn!(error = %e, "Failed to clear document uid hint");
        }
    }

    fn record_error(&self, error: &ClientError) {
        let message = error.to_string();
        self.status.send_modify(|s| s.last_error = Some(message));
    }

    fn publish_document(&self) {
        let uid = self.state.doc_uid.clone();
        let version = self.state.doc_version;
        self.status.send_modify(|s| {
            s.doc_uid = uid;
            s.doc_version = version;
        });
    }

    fn transition(&mut self, next: SyncPhase) {
        if self.phase == next {
            return;
        }
        if !self.phase.can_transition_to(next) {
            debug!(from = ?self.phase, to = ?next, "Ignoring illegal phase transition");
            return;
        }
        trace!(from = ?self.phase, to = ?next, "Sync phase transition");
        self.phase = next;
        self.status.send_modify(|s| s.phase = next);
    }

    fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    fn finish(&mut self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        self.shared.detach();
        self.shared.ready.store(false, Ordering::SeqCst);
        self.deadline = None;
        self.transition(SyncPhase::Stopped);
        info!("Sync engine stopped");
    }
}
