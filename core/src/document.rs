//! Authoritative document
//!
//! The server-side copy of a document: its content, its version, and the
//! append-only log of accepted operations. `version` always equals the number
//! of operations in the log, and an operation is accepted only if it was
//! built against exactly that version.
//!
//! # Example
//!
//! ```rust
//! use textsync_core::Document;
//!
//! let mut doc = Document::with_content("doc-1".to_string(), "car", 0);
//! let op = doc.generate_insert("h", 1);
//! doc.apply(op).unwrap();
//!
//! assert_eq!(doc.content(), "char");
//! assert_eq!(doc.version(), 1);
//!
//! // A second operation built against version 0 is now stale
//! let stale = textsync_core::ot::Operation::insert(0, "x").with_version(0);
//! assert!(doc.apply(stale).is_err());
//! ```

use crate::error::{Result, SyncError};
use crate::ot::{apply_operation, Operation};
use crate::DocumentID;
use ropey::Rope;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Document {
    id: DocumentID,
    content: Rope,
    version: u64,
    /// Accepted operations, in version order, starting at `base_version`
    log: Vec<Operation>,
    base_version: u64,
}

impl Document {
    /// Create an empty document at version 0
    pub fn new(id: DocumentID) -> Self {
        Self::with_content(id, "", 0)
    }

    /// Start from a snapshot; the log begins at `version`
    pub fn with_content(id: DocumentID, content: &str, version: u64) -> Self {
        Self {
            id,
            content: Rope::from_str(content),
            version,
            log: Vec::new(),
            base_version: version,
        }
    }

    pub fn id(&self) -> &DocumentID {
        &self.id
    }

    pub fn content(&self) -> String {
        self.content.to_string()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.content.len_chars()
    }

    pub fn is_empty(&self) -> bool {
        self.content.len_chars() == 0
    }

    /// Build an insert tagged with the current version
    pub fn generate_insert(&self, text: &str, offset: usize) -> Operation {
        Operation::insert(offset, text).with_version(self.version)
    }

    /// Build a remove tagged with the current version
    pub fn generate_remove(&self, text: &str, offset: usize) -> Operation {
        Operation::remove(offset, text).with_version(self.version)
    }

    /// Accept an operation
    ///
    /// The operation must be tagged with the current version and must apply
    /// cleanly to the current content. On success the accepted operation
    /// (with its version) is appended to the log and returned.
    pub fn apply(&mut self, op: Operation) -> Result<Operation> {
        let found = op.version.ok_or(SyncError::MissingVersion)?;
        if found != self.version {
            return Err(SyncError::VersionConflict {
                expected: self.version,
                found,
            });
        }

        apply_operation(&mut self.content, &op)?;
        self.version += 1;
        debug!(document_id = %self.id, version = self.version, op = %op, "Operation accepted");

        self.log.push(op.clone());
        Ok(op)
    }

    /// Accepted operations with version >= `version`, in order
    pub fn operations_since(&self, version: u64) -> &[Operation] {
        let start = version.saturating_sub(self.base_version) as usize;
        self.log.get(start..).unwrap_or(&[])
    }
}
