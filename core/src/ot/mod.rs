//! Operational transformation for flat text
//!
//! # Pieces
//!
//! - **Operation:** insert/remove carrying its own text, invertible
//! - **Transform:** rebase operations (and cursors) over concurrent edits
//! - **Compose:** fold typing and backspacing runs into single operations
//! - **UndoStack:** undo/redo history kept valid under remote edits
//!
//! # References
//!
//! - Ellis & Gibbs, "Concurrency Control in Groupware Systems" (1989)
//! - Jupiter: "High-Latency, Low-Bandwidth Windowing in the Jupiter
//!   Collaboration System" (1995)

mod compose;
mod operation;
mod transform;
mod undo;

pub use compose::{compose, compose_pair};
pub use operation::{apply_operation, apply_operations, Operation, OperationKind};
pub use transform::{transform, transform_offset, transform_operation, transform_pair, Transformed};
pub use undo::{UndoItem, UndoStack, DEFAULT_MAX_LEVELS};
