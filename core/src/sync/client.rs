//! Client synchronization state machine
//!
//! `ClientDocument` owns one client's view of a document: its content, the
//! version it has fully applied, the queue of local operations the server
//! has not acknowledged yet, carets, and undo history.
//!
//! It performs no I/O. Every transition returns the `Effect`s the caller
//! must carry out (submit, pull, arm a timer, publish a caret, re-render).
//! `sync::session` drives it over an async channel; the WASM bindings hand
//! the effects to JavaScript.
//!
//! # Invariants
//!
//! - At most one operation is in flight, and it is always the head of the
//!   pending queue. It is never merged into by later edits.
//! - Once a remote operation lands while a submission is in flight, that
//!   submission is superseded: its answer only triggers a pull, and the
//!   queue is resubmitted from the caught-up version.
//! - `version` counts every operation applied (local acknowledged + remote)
//!   and is the tag on the next submission.
//! - Content equals the server state at `version` followed by the pending
//!   queue.
//!
//! # Example
//!
//! ```rust
//! use textsync_core::ot::Operation;
//! use textsync_core::sync::{ClientDocument, Effect};
//!
//! let mut client = ClientDocument::new("doc-1".to_string(), "car", 0);
//! let effects = client.perform(Operation::insert(1, "h")).unwrap();
//! assert_eq!(client.content(), "char");
//! assert!(matches!(effects[0], Effect::ScheduleSubmit { .. }));
//!
//! // Timer fired: the head is submitted tagged with version 0
//! let effects = client.submit_next();
//! assert_eq!(
//!     effects,
//!     vec![Effect::Submit { operation: Operation::insert(1, "h").with_version(0) }]
//! );
//! ```

use crate::awareness::{RemoteSelection, RemoteSelections, SelectionUpdate};
use crate::error::{Result, SyncError};
use crate::ot::{apply_operations, compose, transform, transform_offset, Operation, UndoItem, UndoStack};
use crate::protocol::{RejectReason, ServerMessage};
use crate::sync::config::SyncConfig;
use crate::{ClientID, DocumentID};
use ropey::Rope;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Where the client is in its submission cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Nothing pending, nothing in flight
    Idle,

    /// Exactly one operation in flight, awaiting ack or error
    Submitting,

    /// Operations buffered locally, none submitted yet
    Queued,
}

/// Work the caller must carry out after a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    /// Send to the server; the answer comes back as an ack or error
    Submit { operation: Operation },

    /// Pull every accepted operation with version >= `version`
    RequestSince { version: u64 },

    /// Call `submit_next` after `delay_ms`
    ScheduleSubmit { delay_ms: u64 },

    /// Broadcast our caret
    PublishSelection { update: SelectionUpdate },

    /// Remote (or compensating) operations were applied to the content
    Applied { operations: Vec<Operation> },

    /// Every local edit is acknowledged
    Synced { version: u64 },

    /// The server refused an operation for good; it was rolled back locally
    Rejected { operation: Operation, reason: String },
}

/// Read-only view handed to renderers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub content: String,
    pub version: u64,
    pub state: SyncState,
    pub selection_anchor: usize,
    pub selection_focus: usize,
    /// `(client_id, offset)` of every current remote caret, sorted by client
    pub remote_selections: Vec<(ClientID, usize)>,
    pub can_undo: bool,
    pub can_redo: bool,
    /// The last remote operations did not fit the local content
    pub diverged: bool,
}

#[derive(Debug, Clone)]
pub struct ClientDocument {
    client_id: ClientID,
    document_id: DocumentID,
    config: SyncConfig,

    content: Rope,
    version: u64,

    /// Not yet acknowledged; the head is in flight when `inflight` is set
    /// and the submission is not superseded
    pending: Vec<Operation>,
    inflight: bool,
    /// Remote operations were applied after the in-flight submission was
    /// sent; the server will refuse it and the head no longer matches it
    superseded: bool,

    /// A `ScheduleSubmit` is outstanding
    submit_scheduled: bool,
    /// A pull was requested after a rejection or gap; hold submissions
    awaiting_resync: bool,
    /// A gap was seen while an operation was in flight; pull after its ack
    needs_catch_up: bool,
    /// Applying remote operations failed; cleared by the next batch that fits
    diverged: bool,

    selection_anchor: usize,
    selection_focus: usize,
    remote_selections: RemoteSelections,

    undo_stack: UndoStack,
}

impl ClientDocument {
    /// Generate a fresh random client identity
    pub fn generate_client_id() -> ClientID {
        uuid::Uuid::new_v4().to_string()
    }

    /// Start from a snapshot of the server document at `version`,
    /// with a random client ID and default configuration
    pub fn new(document_id: DocumentID, content: &str, version: u64) -> Self {
        Self::with_options(
            Self::generate_client_id(),
            document_id,
            content,
            version,
            SyncConfig::default(),
        )
    }

    pub fn with_options(
        client_id: ClientID,
        document_id: DocumentID,
        content: &str,
        version: u64,
        config: SyncConfig,
    ) -> Self {
        Self {
            remote_selections: RemoteSelections::new(client_id.clone()),
            undo_stack: UndoStack::with_max_levels(config.max_undo_levels),
            client_id,
            document_id,
            config,
            content: Rope::from_str(content),
            version,
            pending: Vec::new(),
            inflight: false,
            superseded: false,
            submit_scheduled: false,
            awaiting_resync: false,
            needs_catch_up: false,
            diverged: false,
            selection_anchor: 0,
            selection_focus: 0,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn content(&self) -> String {
        self.content.to_string()
    }

    pub fn rope(&self) -> &Rope {
        &self.content
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Local operations not yet acknowledged, head first
    pub fn pending(&self) -> &[Operation] {
        &self.pending
    }

    /// The head as submitted, while the server has not answered it
    pub fn inflight(&self) -> Option<&Operation> {
        if self.submitting() {
            self.pending.first()
        } else {
            None
        }
    }

    pub fn state(&self) -> SyncState {
        if self.submitting() {
            SyncState::Submitting
        } else if self.pending.is_empty() {
            SyncState::Idle
        } else {
            SyncState::Queued
        }
    }

    /// Last remote operations could not be applied; see `resync`
    pub fn diverged(&self) -> bool {
        self.diverged
    }

    /// `(anchor, focus)`
    pub fn selection(&self) -> (usize, usize) {
        (self.selection_anchor, self.selection_focus)
    }

    pub fn remote_selections(&self) -> &RemoteSelections {
        &self.remote_selections
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo_stack
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo_stack.can_redo()
    }

    /// Remote carets announced within the configured timeout
    pub fn current_selections(&self) -> Vec<&RemoteSelection> {
        #[cfg(not(target_arch = "wasm32"))]
        let current = self
            .remote_selections
            .current(self.config.selection_timeout());
        #[cfg(target_arch = "wasm32")]
        let current = self
            .remote_selections
            .current(self.config.selection_timeout_ms);
        current
    }

    /// Forget remote carets that timed out; returns their client IDs
    #[cfg(not(target_arch = "wasm32"))]
    pub fn prune_selections(&mut self) -> Vec<ClientID> {
        self.remote_selections
            .remove_stale_clients(self.config.selection_timeout())
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut remote_selections: Vec<_> = self
            .current_selections()
            .into_iter()
            .map(|selection| (selection.client_id.clone(), selection.offset))
            .collect();
        remote_selections.sort();

        Snapshot {
            content: self.content(),
            version: self.version,
            state: self.state(),
            selection_anchor: self.selection_anchor,
            selection_focus: self.selection_focus,
            remote_selections,
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
            diverged: self.diverged,
        }
    }

    /// Apply a local edit and queue it for submission
    ///
    /// The operation must be valid against the current content; it is
    /// recorded for undo and composed with the queued (not in-flight) tail.
    pub fn perform(&mut self, mut op: Operation) -> Result<Vec<Effect>> {
        op.version = None;
        if op.is_empty() {
            return Ok(Vec::new());
        }
        self.apply_local(std::slice::from_ref(&op))?;
        self.undo_stack.performed_operation(&op);
        Ok(self.enqueue(vec![op]))
    }

    /// Undo the last step, submitted like any local edit
    ///
    /// Returns no effects when there is nothing to undo.
    pub fn undo(&mut self) -> Result<Vec<Effect>> {
        match self.undo_stack.pop_undo_item() {
            Some(item) => self.perform_history(item),
            None => Ok(Vec::new()),
        }
    }

    /// Redo the last undone step
    pub fn redo(&mut self) -> Result<Vec<Effect>> {
        match self.undo_stack.pop_redo_item() {
            Some(item) => self.perform_history(item),
            None => Ok(Vec::new()),
        }
    }

    fn perform_history(&mut self, item: UndoItem) -> Result<Vec<Effect>> {
        self.apply_local(&item)?;
        Ok(self.enqueue(item))
    }

    /// Scheduled submission timer fired
    pub fn submit_next(&mut self) -> Vec<Effect> {
        self.submit_scheduled = false;
        if self.inflight || self.awaiting_resync {
            return Vec::new();
        }
        self.submit_head()
    }

    /// The last `Submit` could not be delivered; retry after the backoff
    pub fn channel_unavailable(&mut self) -> Vec<Effect> {
        self.inflight = false;
        self.superseded = false;
        if self.submit_scheduled || self.pending.is_empty() {
            return Vec::new();
        }
        warn!(
            client_id = %self.client_id,
            pending = self.pending.len(),
            "Channel unavailable, retrying submission"
        );
        self.submit_scheduled = true;
        vec![Effect::ScheduleSubmit {
            delay_ms: self.config.reconnect_backoff_ms,
        }]
    }

    /// Dispatch a message from the operations channel
    pub fn handle_server_message(&mut self, msg: ServerMessage) -> Result<Vec<Effect>> {
        match msg {
            ServerMessage::Op { client_id, message } => {
                if client_id.as_deref() == Some(self.client_id.as_str()) {
                    return Ok(Vec::new());
                }
                self.receive_operations(message)
            }
            ServerMessage::Ack { message } => self.acknowledged(message),
            ServerMessage::Error { message, reason } => self.rejected(reason, &message),
        }
    }

    /// The in-flight operation was accepted as `op`
    pub fn acknowledged(&mut self, op: Operation) -> Result<Vec<Effect>> {
        if !self.inflight {
            warn!(client_id = %self.client_id, op = %op, "Ack with nothing in flight");
            return Ok(Vec::new());
        }
        if self.superseded || self.pending.is_empty() {
            warn!(client_id = %self.client_id, op = %op, "Ack for a superseded submission");
            return Ok(self.answer_superseded());
        }
        let accepted = op.version.ok_or(SyncError::MissingVersion)?;
        if accepted != self.version {
            warn!(
                client_id = %self.client_id,
                version = self.version,
                accepted,
                "Ack for a version other than the one submitted"
            );
        }

        self.inflight = false;
        self.pending.remove(0);
        self.version = accepted + 1;

        if self.needs_catch_up {
            self.needs_catch_up = false;
            return Ok(self.request_resync());
        }
        if self.pending.is_empty() {
            info!(client_id = %self.client_id, version = self.version, "Fully synced");
            return Ok(vec![Effect::Synced {
                version: self.version,
            }]);
        }
        Ok(self.submit_head())
    }

    /// The in-flight operation was refused
    ///
    /// A version conflict keeps the head for retry after pulling what we
    /// missed. An invalid operation is dropped and rolled back locally.
    pub fn rejected(&mut self, reason: RejectReason, message: &str) -> Result<Vec<Effect>> {
        if !self.inflight {
            warn!(client_id = %self.client_id, reason = message, "Rejection with nothing in flight");
            return Ok(Vec::new());
        }
        if self.superseded || self.pending.is_empty() {
            debug!(
                client_id = %self.client_id,
                version = self.version,
                reason = message,
                "Superseded submission refused, resynchronizing"
            );
            return Ok(self.answer_superseded());
        }
        self.inflight = false;

        match reason {
            RejectReason::VersionConflict => {
                debug!(
                    client_id = %self.client_id,
                    version = self.version,
                    reason = message,
                    "Submission rejected, resynchronizing"
                );
                Ok(self.request_resync())
            }
            RejectReason::Invalid => {
                let operation = self.pending.remove(0);
                error!(client_id = %self.client_id, op = %operation, reason = message, "Operation refused");

                // Roll the operation back underneath the rest of the queue
                let (rest, rollback) = transform(&self.pending, &[operation.invert()]);
                self.apply_local(&rollback)?;
                self.pending = rest;
                self.undo_stack.rejected_operations(&rollback);

                let mut effects = vec![
                    Effect::Rejected {
                        operation,
                        reason: message.to_string(),
                    },
                    Effect::Applied {
                        operations: rollback,
                    },
                ];
                effects.extend(self.schedule_submit());
                Ok(effects)
            }
        }
    }

    /// Remote operations arrived (broadcast or pull response)
    ///
    /// Operations older than our version are skipped. The rest must start at
    /// exactly our version and be contiguous; anything after a gap is
    /// dropped and pulled again. Applied operations are rebased over the
    /// pending queue and the queue over them.
    pub fn receive_operations(&mut self, ops: Vec<Operation>) -> Result<Vec<Effect>> {
        let mut batch = Vec::new();
        let mut expected = self.version;
        let mut gap = false;

        for op in ops {
            let Some(version) = op.version else {
                warn!(client_id = %self.client_id, op = %op, "Remote operation without version");
                continue;
            };
            if version < expected {
                continue;
            }
            if version > expected {
                gap = true;
                break;
            }
            expected += 1;
            batch.push(op);
        }

        let mut effects = Vec::new();
        if !batch.is_empty() {
            let (pending, theirs) = transform(&self.pending, &batch);
            if let Err(err) = self.apply_local(&theirs) {
                self.diverged = true;
                error!(
                    client_id = %self.client_id,
                    version = self.version,
                    error = %err,
                    "Remote operations do not fit local content"
                );
                return Err(err);
            }
            self.diverged = false;
            self.pending = pending;
            self.undo_stack.received_operations(&theirs);
            self.version = expected;
            if self.inflight && !self.superseded {
                debug!(client_id = %self.client_id, "In-flight submission superseded");
                self.superseded = true;
            }
            debug!(
                client_id = %self.client_id,
                version = self.version,
                applied = batch.len(),
                pending = self.pending.len(),
                "Applied remote operations"
            );
            effects.push(Effect::Applied { operations: theirs });
        }

        if gap {
            debug!(client_id = %self.client_id, version = self.version, "Gap in remote operations");
            if self.inflight {
                self.needs_catch_up = true;
            } else if !self.awaiting_resync {
                effects.extend(self.request_resync());
            }
        } else if self.awaiting_resync {
            self.awaiting_resync = false;
            effects.extend(self.schedule_submit());
        }
        Ok(effects)
    }

    /// Pull everything from our version again, unless a pull is outstanding
    ///
    /// Used after a server message could not be applied. A client that
    /// stays diverged after the pull keeps `diverged` set and stops
    /// submitting until it is rebuilt from a fresh snapshot.
    pub fn resync(&mut self) -> Vec<Effect> {
        if self.awaiting_resync {
            return Vec::new();
        }
        info!(client_id = %self.client_id, version = self.version, "Resynchronizing");
        self.request_resync()
    }

    /// Move our own caret; announces it when nothing is pending
    pub fn set_selection(&mut self, anchor: usize, focus: usize) -> Vec<Effect> {
        let length = self.content.len_chars();
        self.selection_anchor = anchor.min(length);
        self.selection_focus = focus.min(length);
        self.announce_selection()
            .map(|update| vec![Effect::PublishSelection { update }])
            .unwrap_or_default()
    }

    /// Our caret tagged with our version, unless local edits are pending
    /// (the position would be stale by the time peers see it)
    pub fn announce_selection(&self) -> Option<SelectionUpdate> {
        if !self.pending.is_empty() {
            return None;
        }
        Some(
            self.remote_selections
                .create_update(self.version, self.selection_focus),
        )
    }

    /// A peer announced its caret; kept only if made at our version
    pub fn receive_selection(&mut self, update: SelectionUpdate) -> bool {
        self.remote_selections
            .apply_update(update, self.version, &self.pending)
    }

    fn apply_local(&mut self, ops: &[Operation]) -> Result<()> {
        apply_operations(&mut self.content, ops)?;
        self.selection_anchor = transform_offset(self.selection_anchor, ops);
        self.selection_focus = transform_offset(self.selection_focus, ops);
        self.remote_selections.transform(ops);
        Ok(())
    }

    fn enqueue(&mut self, ops: Vec<Operation>) -> Vec<Effect> {
        // The in-flight head must stay exactly as submitted
        let keep = usize::from(self.submitting()).min(self.pending.len());
        let mut queued = self.pending.split_off(keep);
        for op in ops {
            queued = compose(queued, op);
        }
        self.pending.append(&mut queued);
        self.schedule_submit()
    }

    fn schedule_submit(&mut self) -> Vec<Effect> {
        if self.inflight || self.submit_scheduled || self.awaiting_resync || self.pending.is_empty()
        {
            return Vec::new();
        }
        self.submit_scheduled = true;
        vec![Effect::ScheduleSubmit {
            delay_ms: self.config.submit_delay_ms,
        }]
    }

    fn submit_head(&mut self) -> Vec<Effect> {
        let Some(head) = self.pending.first() else {
            return Vec::new();
        };
        let operation = head.clone().with_version(self.version);
        self.inflight = true;
        debug!(client_id = %self.client_id, op = %operation, "Submitting");
        vec![Effect::Submit { operation }]
    }

    fn submitting(&self) -> bool {
        self.inflight && !self.superseded
    }

    /// The server answered a submission that remote operations overtook
    fn answer_superseded(&mut self) -> Vec<Effect> {
        self.inflight = false;
        self.superseded = false;
        self.needs_catch_up = false;
        self.request_resync()
    }

    fn request_resync(&mut self) -> Vec<Effect> {
        self.awaiting_resync = true;
        vec![Effect::RequestSince {
            version: self.version,
        }]
    }
}
