//! Session actor
//!
//! Runs a `ClientDocument` on a tokio task: local commands arrive through a
//! `SessionHandle`, server traffic through the inbound stream, and the
//! effects the state machine returns are carried out against an
//! `OperationChannel`. After every transition the task publishes a
//! `Snapshot` on a watch channel for renderers.
//!
//! ```text
//!  SessionHandle ──commands──▶ ┌──────────────┐ ──submit/pull/caret──▶ OperationChannel
//!                              │   Session    │
//!  renderer ◀──watch<Snapshot>─└──────────────┘ ◀──────Inbound──────── server
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::channel::{Inbound, OperationChannel};
use super::client::{ClientDocument, Effect, Snapshot};
use crate::error::{Result, SyncError};
use crate::ot::Operation;

const COMMAND_BUFFER: usize = 64;

type Reply = oneshot::Sender<Result<()>>;

enum Command {
    Edit(Operation, Reply),
    Undo(Reply),
    Redo(Reply),
    SetSelection { anchor: usize, focus: usize },
    Shutdown,
}

/// Cloneable handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl SessionHandle {
    /// Apply a local edit; fails if it does not fit the current content
    pub async fn edit(&self, op: Operation) -> Result<()> {
        self.request(|reply| Command::Edit(op, reply)).await
    }

    pub async fn undo(&self) -> Result<()> {
        self.request(Command::Undo).await
    }

    pub async fn redo(&self) -> Result<()> {
        self.request(Command::Redo).await
    }

    pub async fn set_selection(&self, anchor: usize, focus: usize) -> Result<()> {
        self.commands
            .send(Command::SetSelection { anchor, focus })
            .await
            .map_err(|_| SyncError::SessionClosed)
    }

    /// Stop the session task; pending edits are abandoned
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| SyncError::SessionClosed)
    }

    /// Latest published state
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Observe every published state
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Wait until a published state satisfies `predicate`
    pub async fn wait_for(&self, predicate: impl FnMut(&Snapshot) -> bool) -> Result<Snapshot> {
        let mut snapshots = self.snapshots.clone();
        let snapshot = snapshots
            .wait_for(predicate)
            .await
            .map_err(|_| SyncError::SessionClosed)?;
        Ok(snapshot.clone())
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SyncError::SessionClosed)?;
        response.await.map_err(|_| SyncError::SessionClosed)?
    }
}

pub struct Session {
    client: ClientDocument,
    channel: Box<dyn OperationChannel>,
    commands: mpsc::Receiver<Command>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    inbound_open: bool,
    snapshots: watch::Sender<Snapshot>,
    submit_at: Option<Instant>,
    /// A pull that could not be sent: retry time and version
    pull_retry: Option<(Instant, u64)>,
}

impl Session {
    /// Spawn the session task on the current tokio runtime
    ///
    /// The task ends on `SessionHandle::shutdown` or when every handle is
    /// dropped.
    pub fn spawn(
        client: ClientDocument,
        channel: impl OperationChannel + 'static,
        inbound: mpsc::UnboundedReceiver<Inbound>,
    ) -> SessionHandle {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (snapshots, snapshots_rx) = watch::channel(client.snapshot());

        let session = Session {
            client,
            channel: Box::new(channel),
            commands,
            inbound,
            inbound_open: true,
            snapshots,
            submit_at: None,
            pull_retry: None,
        };
        tokio::spawn(session.run());

        SessionHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
        }
    }

    async fn run(mut self) {
        info!(
            client_id = %self.client.client_id(),
            document_id = %self.client.document_id(),
            version = self.client.version(),
            "Session started"
        );
        let mut heartbeat = time::interval(self.client.config().selection_heartbeat());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let submit_at = self.submit_at.unwrap_or_else(Instant::now);
            let pull_at = self.pull_retry.map(|(at, _)| at).unwrap_or_else(Instant::now);

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                inbound = self.inbound.recv(), if self.inbound_open => match inbound {
                    Some(msg) => self.handle_inbound(msg).await,
                    None => {
                        warn!(client_id = %self.client.client_id(), "Inbound stream closed");
                        self.inbound_open = false;
                    }
                },
                _ = time::sleep_until(submit_at), if self.submit_at.is_some() => {
                    self.submit_at = None;
                    let effects = self.client.submit_next();
                    self.run_effects(effects).await;
                }
                _ = time::sleep_until(pull_at), if self.pull_retry.is_some() => {
                    if let Some((_, version)) = self.pull_retry.take() {
                        self.run_effects(vec![Effect::RequestSince { version }]).await;
                    }
                }
                _ = heartbeat.tick() => self.heartbeat().await,
            }

            self.publish_snapshot();
        }

        info!(client_id = %self.client.client_id(), "Session stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        let (result, reply) = match command {
            Command::Edit(op, reply) => (self.client.perform(op), Some(reply)),
            Command::Undo(reply) => (self.client.undo(), Some(reply)),
            Command::Redo(reply) => (self.client.redo(), Some(reply)),
            Command::SetSelection { anchor, focus } => {
                (Ok(self.client.set_selection(anchor, focus)), None)
            }
            Command::Shutdown => return,
        };

        let result = match result {
            Ok(effects) => {
                self.run_effects(effects).await;
                Ok(())
            }
            Err(err) => Err(err),
        };
        if let Some(reply) = reply {
            // Callers observe the state their command produced
            self.publish_snapshot();
            // The caller may have stopped waiting
            let _ = reply.send(result);
        }
    }

    async fn handle_inbound(&mut self, msg: Inbound) {
        match msg {
            Inbound::Server(msg) => match self.client.handle_server_message(msg) {
                Ok(effects) => self.run_effects(effects).await,
                Err(err) => {
                    error!(
                        client_id = %self.client.client_id(),
                        error = %err,
                        "Failed to apply server message"
                    );
                    let effects = self.client.resync();
                    self.run_effects(effects).await;
                }
            },
            Inbound::Selection(update) => {
                if !self.client.receive_selection(update) {
                    debug!(client_id = %self.client.client_id(), "Selection update ignored");
                }
            }
        }
    }

    async fn heartbeat(&mut self) {
        let stale = self.client.prune_selections();
        if !stale.is_empty() {
            debug!(client_id = %self.client.client_id(), ?stale, "Pruned stale selections");
        }
        self.announce_selection().await;
    }

    async fn announce_selection(&mut self) {
        if let Some(update) = self.client.announce_selection() {
            self.run_effects(vec![Effect::PublishSelection { update }])
                .await;
        }
    }

    async fn run_effects(&mut self, effects: Vec<Effect>) {
        let mut queue = VecDeque::from(effects);

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Submit { operation } => {
                    if let Err(err) = self.channel.submit(&operation).await {
                        warn!(client_id = %self.client.client_id(), error = %err, "Submit failed");
                        queue.extend(self.client.channel_unavailable());
                    }
                }
                Effect::RequestSince { version } => {
                    if let Err(err) = self.channel.request_since(version).await {
                        warn!(client_id = %self.client.client_id(), error = %err, "Pull failed");
                        let retry = Instant::now() + self.client.config().reconnect_backoff();
                        self.pull_retry = Some((retry, version));
                    }
                }
                Effect::ScheduleSubmit { delay_ms } => {
                    self.submit_at = Some(Instant::now() + Duration::from_millis(delay_ms));
                }
                Effect::PublishSelection { update } => {
                    if let Err(err) = self.channel.publish_selection(&update).await {
                        debug!(client_id = %self.client.client_id(), error = %err, "Selection not published");
                    }
                }
                Effect::Applied { operations } => {
                    debug!(
                        client_id = %self.client.client_id(),
                        count = operations.len(),
                        "Remote operations applied"
                    );
                }
                Effect::Synced { version } => {
                    debug!(client_id = %self.client.client_id(), version, "Synced");
                    if let Some(update) = self.client.announce_selection() {
                        queue.push_back(Effect::PublishSelection { update });
                    }
                }
                Effect::Rejected { operation, reason } => {
                    warn!(
                        client_id = %self.client.client_id(),
                        op = %operation,
                        reason = %reason,
                        "Local edit rolled back"
                    );
                }
            }
        }
    }

    fn publish_snapshot(&self) {
        let snapshot = self.client.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{MemoryHub, SyncConfig};
    use crate::sync::client::SyncState;

    async fn start(hub: &MemoryHub, client_id: &str) -> (SessionHandle, crate::sync::MemoryChannel) {
        let document = hub.document("doc").await.unwrap();
        let (channel, inbound) = hub.connect("doc", client_id).await.unwrap();
        let client = ClientDocument::with_options(
            client_id.to_string(),
            "doc".to_string(),
            &document.content(),
            document.version(),
            SyncConfig::default(),
        );
        (Session::spawn(client, channel.clone(), inbound), channel)
    }

    #[tokio::test]
    async fn test_edit_reaches_server() {
        let hub = MemoryHub::new();
        hub.create_document("doc", "car").await;
        let (session, _) = start(&hub, "alice").await;

        session.edit(Operation::insert(1, "h")).await.unwrap();
        let snapshot = session
            .wait_for(|snapshot| snapshot.state == SyncState::Idle && snapshot.version == 1)
            .await
            .unwrap();
        assert_eq!(snapshot.content, "char");
        assert_eq!(hub.document("doc").await.unwrap().content(), "char");
    }

    #[tokio::test]
    async fn test_invalid_edit_reported() {
        let hub = MemoryHub::new();
        hub.create_document("doc", "car").await;
        let (session, _) = start(&hub, "alice").await;

        let err = session
            .edit(Operation::remove(0, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(session.snapshot().content, "car");
    }

    #[tokio::test]
    async fn test_divergence_surfaced() {
        let hub = MemoryHub::new();
        hub.create_document("doc", "car").await;
        let (bob, _) = start(&hub, "bob").await;

        // Alice was handed the wrong content for version 0
        let (channel, inbound) = hub.connect("doc", "alice").await.unwrap();
        let client = ClientDocument::with_options(
            "alice".to_string(),
            "doc".to_string(),
            "dog",
            0,
            SyncConfig::default(),
        );
        let alice = Session::spawn(client, channel, inbound);

        bob.edit(Operation::remove(0, "c")).await.unwrap();
        let snapshot = time::timeout(Duration::from_secs(5), alice.wait_for(|s| s.diverged))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.content, "dog");
        assert_eq!(snapshot.version, 0);
    }

    #[tokio::test]
    async fn test_closed_session() {
        let hub = MemoryHub::new();
        hub.create_document("doc", "").await;
        let (session, _) = start(&hub, "alice").await;

        session.shutdown().await.unwrap();
        session
            .wait_for(|_| false)
            .await
            .map(|_| ())
            .unwrap_err();
        assert_eq!(
            session.edit(Operation::insert(0, "a")).await,
            Err(SyncError::SessionClosed)
        );
    }
}
