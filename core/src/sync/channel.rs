//! Operations channel
//!
//! `OperationChannel` is the outbound half of a client's connection to the
//! server; everything the server sends back arrives as `Inbound` messages on
//! a stream the session owns.
//!
//! `MemoryHub` is an in-process server: it keeps the authoritative
//! `Document` for each topic and fans messages out to subscribed clients.
//! Client messages cross it as JSON frames, exactly as they would over a
//! socket.
//!
//! ## Usage
//!
//! ```rust
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use textsync_core::sync::{MemoryHub, OperationChannel};
//! use textsync_core::ot::Operation;
//!
//! let hub = MemoryHub::new();
//! hub.create_document("doc-1", "car").await;
//!
//! let (channel, mut inbox) = hub.connect("doc-1", "alice").await.unwrap();
//! channel.submit(&Operation::insert(1, "h").with_version(0)).await.unwrap();
//!
//! // The submitter hears the ack first, then the broadcast
//! let ack = inbox.recv().await.unwrap();
//! # let _ = ack;
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace, warn};

use crate::awareness::SelectionUpdate;
use crate::document::Document;
use crate::error::{Result, SyncError};
use crate::ot::Operation;
use crate::protocol::{decode_message, encode_message, ClientMessage, ServerMessage};
use crate::{ClientID, DocumentID};

/// Outbound connection to the server for one document
#[async_trait]
pub trait OperationChannel: Send + Sync {
    /// Whether messages can currently be delivered
    fn is_connected(&self) -> bool;

    /// Submit an operation tagged with the client's version; the answer
    /// comes back as `ServerMessage::Ack` or `ServerMessage::Error`
    async fn submit(&self, op: &Operation) -> Result<()>;

    /// Ask for every accepted operation with version >= `version`
    async fn request_since(&self, version: u64) -> Result<()>;

    /// Announce our caret to the other clients
    async fn publish_selection(&self, update: &SelectionUpdate) -> Result<()>;
}

/// Message delivered to a connected client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Operations topic: broadcasts, pull responses, acks and errors
    Server(ServerMessage),

    /// Selections topic
    Selection(SelectionUpdate),
}

struct Subscriber {
    tx: mpsc::UnboundedSender<Inbound>,
    online: Arc<AtomicBool>,
}

impl Subscriber {
    fn deliver(&self, msg: Inbound) -> bool {
        if !self.online.load(Ordering::SeqCst) {
            return true;
        }
        self.tx.send(msg).is_ok()
    }
}

struct Topic {
    document: Document,
    subscribers: HashMap<ClientID, Subscriber>,
}

impl Topic {
    fn send_to(&mut self, client_id: &str, msg: Inbound) {
        let delivered = self
            .subscribers
            .get(client_id)
            .map(|subscriber| subscriber.deliver(msg))
            .unwrap_or(true);
        if !delivered {
            debug!(client_id, "Subscriber gone, dropping");
            self.subscribers.remove(client_id);
        }
    }

    fn broadcast(&mut self, msg: Inbound, except: Option<&str>) {
        self.subscribers.retain(|client_id, subscriber| {
            if except == Some(client_id.as_str()) {
                return true;
            }
            subscriber.deliver(msg.clone())
        });
    }
}

/// In-process server hosting any number of documents
#[derive(Clone, Default)]
pub struct MemoryHub {
    topics: Arc<Mutex<HashMap<DocumentID, Topic>>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host a document starting at version 0
    pub async fn create_document(&self, document_id: &str, content: &str) {
        self.insert_document(Document::with_content(document_id.to_string(), content, 0))
            .await;
    }

    /// Host an existing document, replacing any previous one with that ID
    pub async fn insert_document(&self, document: Document) {
        let mut topics = self.topics.lock().await;
        topics.insert(
            document.id().clone(),
            Topic {
                document,
                subscribers: HashMap::new(),
            },
        );
    }

    /// Clone of the authoritative document
    pub async fn document(&self, document_id: &str) -> Option<Document> {
        let topics = self.topics.lock().await;
        topics.get(document_id).map(|topic| topic.document.clone())
    }

    /// Subscribe a client to a document's topics
    ///
    /// Fails with `ChannelUnavailable` when the document is not hosted.
    pub async fn connect(
        &self,
        document_id: &str,
        client_id: &str,
    ) -> Result<(MemoryChannel, mpsc::UnboundedReceiver<Inbound>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let online = Arc::new(AtomicBool::new(true));

        let mut topics = self.topics.lock().await;
        let topic = topics
            .get_mut(document_id)
            .ok_or(SyncError::ChannelUnavailable)?;
        topic.subscribers.insert(
            client_id.to_string(),
            Subscriber {
                tx,
                online: online.clone(),
            },
        );
        debug!(document_id, client_id, "Client connected");

        let channel = MemoryChannel {
            hub: self.clone(),
            document_id: document_id.to_string(),
            client_id: client_id.to_string(),
            online,
        };
        Ok((channel, rx))
    }

    /// Unsubscribe a client; its channel reports disconnected from now on
    pub async fn disconnect(&self, document_id: &str, client_id: &str) {
        let mut topics = self.topics.lock().await;
        if let Some(subscriber) = topics
            .get_mut(document_id)
            .and_then(|topic| topic.subscribers.remove(client_id))
        {
            subscriber.online.store(false, Ordering::SeqCst);
            debug!(document_id, client_id, "Client disconnected");
        }
    }

    /// Handle a JSON frame sent by `client_id`
    pub async fn receive_frame(&self, document_id: &str, client_id: &str, frame: &str) -> Result<()> {
        let msg: ClientMessage = decode_message(frame)?;
        trace!(document_id, client_id, ?msg, "Frame received");

        let mut topics = self.topics.lock().await;
        let topic = topics
            .get_mut(document_id)
            .ok_or(SyncError::ChannelUnavailable)?;

        match msg {
            ClientMessage::Submit { operation } => match topic.document.apply(operation) {
                Ok(accepted) => {
                    // Submitter hears the ack before the broadcast
                    topic.send_to(
                        client_id,
                        Inbound::Server(ServerMessage::Ack {
                            message: accepted.clone(),
                        }),
                    );
                    topic.broadcast(
                        Inbound::Server(ServerMessage::Op {
                            client_id: Some(client_id.to_string()),
                            message: vec![accepted],
                        }),
                        None,
                    );
                }
                Err(err) => {
                    warn!(document_id, client_id, error = %err, "Submission refused");
                    topic.send_to(client_id, Inbound::Server(ServerMessage::rejection(&err)));
                }
            },
            ClientMessage::Operations { version } => {
                let message = topic.document.operations_since(version).to_vec();
                topic.send_to(
                    client_id,
                    Inbound::Server(ServerMessage::Op {
                        client_id: None,
                        message,
                    }),
                );
            }
            ClientMessage::SetOffset(update) => {
                topic.broadcast(Inbound::Selection(update), Some(client_id));
            }
        }
        Ok(())
    }
}

/// A client's connection to a `MemoryHub` topic
#[derive(Clone)]
pub struct MemoryChannel {
    hub: MemoryHub,
    document_id: DocumentID,
    client_id: ClientID,
    online: Arc<AtomicBool>,
}

impl MemoryChannel {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Simulate losing (or regaining) the connection
    ///
    /// While offline nothing is sent and nothing is received; messages
    /// published meanwhile are lost to this client.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    async fn send(&self, msg: &ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(SyncError::ChannelUnavailable);
        }
        let frame = encode_message(msg)?;
        self.hub
            .receive_frame(&self.document_id, &self.client_id, &frame)
            .await
    }
}

#[async_trait]
impl OperationChannel for MemoryChannel {
    fn is_connected(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    async fn submit(&self, op: &Operation) -> Result<()> {
        self.send(&ClientMessage::Submit {
            operation: op.clone(),
        })
        .await
    }

    async fn request_since(&self, version: u64) -> Result<()> {
        self.send(&ClientMessage::Operations { version }).await
    }

    async fn publish_selection(&self, update: &SelectionUpdate) -> Result<()> {
        self.send(&ClientMessage::SetOffset(update.clone())).await
    }
}
