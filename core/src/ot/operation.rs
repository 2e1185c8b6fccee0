//! Operation: the atomic edit unit
//!
//! An operation either inserts `text` at `offset` or removes `text` starting
//! at `offset`. Removes carry the removed text itself, so every operation is
//! self-describing and can be inverted without consulting the document.
//!
//! Offsets and lengths count Unicode scalar values (chars), not bytes.
//!
//! # Example
//!
//! ```rust
//! use ropey::Rope;
//! use textsync_core::ot::{apply_operation, Operation};
//!
//! let mut content = Rope::from_str("car");
//! let op = Operation::insert(1, "h");
//! apply_operation(&mut content, &op).unwrap();
//! assert_eq!(content.to_string(), "char");
//!
//! apply_operation(&mut content, &op.invert()).unwrap();
//! assert_eq!(content.to_string(), "car");
//! ```

use crate::error::{Result, SyncError};
use ropey::Rope;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of edit an operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Insert,
    Remove,
}

impl OperationKind {
    /// The kind that undoes this one
    pub fn inverse(self) -> Self {
        match self {
            OperationKind::Insert => OperationKind::Remove,
            OperationKind::Remove => OperationKind::Insert,
        }
    }
}

/// A single insert or remove on flat text
///
/// `version` is assigned by the server when the operation is accepted and
/// means "this operation turns document state `version` into `version + 1`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireOperation", into = "WireOperation")]
pub struct Operation {
    pub kind: OperationKind,
    pub offset: usize,
    pub text: String,
    pub version: Option<u64>,
}

impl Operation {
    /// Insert `text` at char index `offset`
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::new(OperationKind::Insert, offset, text)
    }

    /// Remove `text`, which must start at char index `offset`
    pub fn remove(offset: usize, text: impl Into<String>) -> Self {
        Self::new(OperationKind::Remove, offset, text)
    }

    pub fn new(kind: OperationKind, offset: usize, text: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            text: text.into(),
            version: None,
        }
    }

    /// Build an operation from an untrusted signed offset
    pub fn try_new(kind: OperationKind, offset: i64, text: impl Into<String>) -> Result<Self> {
        let offset = usize::try_from(offset)
            .map_err(|_| SyncError::Validation(format!("negative offset {}", offset)))?;
        Ok(Self::new(kind, offset, text))
    }

    /// Tag with a server version
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn is_insert(&self) -> bool {
        self.kind == OperationKind::Insert
    }

    pub fn is_remove(&self) -> bool {
        self.kind == OperationKind::Remove
    }

    /// Length of `text` in chars
    pub fn len(&self) -> usize {
        char_len(&self.text)
    }

    /// Whether applying this operation changes nothing
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// First offset past the affected range
    pub fn end(&self) -> usize {
        self.offset + self.len()
    }

    /// Same offset and text, kind flipped
    ///
    /// The inverse is a fresh local edit and carries no version.
    pub fn invert(&self) -> Operation {
        Operation::new(self.kind.inverse(), self.offset, self.text.clone())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            OperationKind::Insert => "insert",
            OperationKind::Remove => "remove",
        };
        write!(f, "{} {:?} @{}", kind, self.text, self.offset)?;
        if let Some(version) = self.version {
            write!(f, " v{}", version)?;
        }
        Ok(())
    }
}

/// Wire payload of an operation
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireData {
    offset: i64,
    text: String,
}

/// Wire shape: `{"kind": "insert", "data": {"offset": 1, "text": "h"}, "version": 3}`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireOperation {
    kind: OperationKind,
    data: WireData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<u64>,
}

impl TryFrom<WireOperation> for Operation {
    type Error = SyncError;

    fn try_from(wire: WireOperation) -> Result<Self> {
        let op = Operation::try_new(wire.kind, wire.data.offset, wire.data.text)?;
        Ok(match wire.version {
            Some(version) => op.with_version(version),
            None => op,
        })
    }
}

impl From<Operation> for WireOperation {
    fn from(op: Operation) -> Self {
        WireOperation {
            kind: op.kind,
            data: WireData {
                offset: op.offset as i64,
                text: op.text,
            },
            version: op.version,
        }
    }
}

/// Apply an operation to content in place
///
/// Fails with `SyncError::Validation` if an insert lands beyond the end of
/// the content or a remove's text does not match the content at its offset.
/// Content is left untouched on failure.
pub fn apply_operation(content: &mut Rope, op: &Operation) -> Result<()> {
    let length = content.len_chars();
    if op.offset > length {
        return Err(SyncError::Validation(format!(
            "offset {} beyond content length {}",
            op.offset, length
        )));
    }
    if op.is_empty() {
        return Ok(());
    }

    match op.kind {
        OperationKind::Insert => {
            content.insert(op.offset, &op.text);
        }
        OperationKind::Remove => {
            let end = op.end();
            if end > length || content.slice(op.offset..end) != op.text.as_str() {
                return Err(SyncError::Validation(format!(
                    "remove of {:?} at {} does not match content",
                    op.text, op.offset
                )));
            }
            content.remove(op.offset..end);
        }
    }
    Ok(())
}

/// Apply several operations in order, all or nothing
pub fn apply_operations(content: &mut Rope, ops: &[Operation]) -> Result<()> {
    let mut staged = content.clone();
    for op in ops {
        apply_operation(&mut staged, op)?;
    }
    *content = staged;
    Ok(())
}

/// Number of chars in `text`
pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` after `chars` chars (clamped to the end)
pub(crate) fn split_at_char(text: &str, chars: usize) -> (&str, &str) {
    let byte = text
        .char_indices()
        .nth(chars)
        .map(|(index, _)| index)
        .unwrap_or(text.len());
    text.split_at(byte)
}
