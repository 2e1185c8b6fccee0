//! TextSync Core - Collaborative plain-text editing engine
//!
//! Compiled to both native and WASM. It implements:
//! - Insert/remove operations applied to a rope
//! - Operational transformation of operations and cursors
//! - Composition of typing runs and undo/redo under concurrent edits
//! - An authoritative, version-gated server document
//! - The client synchronization protocol (one operation in flight)
//! - Remote caret tracking
//!
//! # Examples
//!
//! ```rust
//! use textsync_core::ot::{transform, Operation};
//! use textsync_core::Document;
//!
//! let mut server = Document::with_content("doc-123".to_string(), "car", 0);
//!
//! // Two clients edit version 0 concurrently
//! let alice = vec![Operation::insert(1, "h")];
//! let bob = vec![Operation::insert(3, "t")];
//!
//! server.apply(alice[0].clone().with_version(0)).unwrap();
//!
//! // Bob's edit is rebased over Alice's before it can be accepted
//! let (_, rebased) = transform(&alice, &bob);
//! server.apply(rebased[0].clone().with_version(1)).unwrap();
//!
//! assert_eq!(server.content(), "chart");
//! ```

pub mod awareness;
pub mod document;
pub mod error;
pub mod ot;
pub mod protocol;
pub mod sync;

#[cfg(feature = "wasm")]
pub mod wasm;

// Re-exports for convenience
pub use document::Document;
pub use error::{Result, SyncError};
pub use ot::{Operation, OperationKind};
pub use sync::{ClientDocument, SyncConfig};

/// Client identifier type
pub type ClientID = String;

/// Document identifier type
pub type DocumentID = String;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_client_ids_differ() {
        let a: ClientID = ClientDocument::generate_client_id();
        let b: ClientID = ClientDocument::generate_client_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
