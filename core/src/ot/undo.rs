//! Undo/redo history under concurrent edits
//!
//! Each stack entry holds the operations that undo (or redo) one step,
//! expressed against the live content. Entries are ordered so that applying
//! them from the top down walks the document back through its history;
//! whenever a remote edit lands, every entry is transformed against it so
//! that undo keeps targeting the text the user actually changed.
//!
//! An entry whose target was already removed remotely transforms to nothing
//! and drops out of the stack.
//!
//! # Example
//!
//! ```rust
//! use textsync_core::ot::{Operation, UndoStack};
//!
//! let mut stack = UndoStack::new();
//! stack.performed_operation(&Operation::insert(0, "a"));
//!
//! // Someone else typed in front of our "a"
//! stack.received_operations(&[Operation::insert(0, "xy")]);
//!
//! assert_eq!(stack.pop_undo_item(), Some(vec![Operation::remove(2, "a")]));
//! assert!(stack.can_redo());
//! ```

use super::operation::Operation;
use super::transform::transform;

/// Operations undoing or redoing one step, in application order
pub type UndoItem = Vec<Operation>;

/// Default maximum number of undo levels
pub const DEFAULT_MAX_LEVELS: usize = 100;

#[derive(Debug, Clone)]
pub struct UndoStack {
    /// Most recent last
    undos: Vec<UndoItem>,

    /// Most recent last
    redos: Vec<UndoItem>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,
}

impl UndoStack {
    pub fn new() -> Self {
        Self::with_max_levels(DEFAULT_MAX_LEVELS)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undos: Vec::new(),
            redos: Vec::new(),
            max_levels,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undos.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redos.is_empty()
    }

    /// Undo entries, top of the stack first
    pub fn undos(&self) -> impl Iterator<Item = &UndoItem> {
        self.undos.iter().rev()
    }

    /// Redo entries, top of the stack first
    pub fn redos(&self) -> impl Iterator<Item = &UndoItem> {
        self.redos.iter().rev()
    }

    /// Record a fresh local edit; clears redo history
    pub fn performed_operation(&mut self, op: &Operation) {
        self.performed_operations(std::slice::from_ref(op));
    }

    /// Record several local edits as one undo step
    pub fn performed_operations(&mut self, ops: &[Operation]) {
        let item = invert_item(ops);
        if item.is_empty() {
            return;
        }
        self.undos.push(item);
        self.redos.clear();

        if self.max_levels > 0 && self.undos.len() > self.max_levels {
            let excess = self.undos.len() - self.max_levels;
            self.undos.drain(..excess);
        }
    }

    /// Rebase both stacks onto remote operations that were just applied
    pub fn received_operations(&mut self, ops: &[Operation]) {
        if ops.is_empty() {
            return;
        }
        transform_stack(&mut self.undos, ops);
        transform_stack(&mut self.redos, ops);
    }

    /// A local step was refused and `rollback` has been applied to undo it
    ///
    /// The entry recording that step is the one equal to the rollback as
    /// seen at its depth. It is dropped; the entries above it are rebased
    /// over the rollback and the ones below it are left alone. If no entry
    /// matches, every entry is rebased as for a remote edit.
    pub fn rejected_operations(&mut self, rollback: &[Operation]) {
        if rollback.is_empty() {
            return;
        }
        let mut remote = rollback.to_vec();
        let mut matched = None;
        for (index, item) in self.undos.iter_mut().enumerate().rev() {
            if *item == remote {
                matched = Some(index);
                break;
            }
            let (rebased, rest) = transform(item, &remote);
            *item = rebased;
            remote = rest;
        }
        if let Some(index) = matched {
            self.undos.remove(index);
        }
        self.undos.retain(|item| !item.is_empty());
        transform_stack(&mut self.redos, rollback);
    }

    /// Take the top undo entry; its inverse becomes the top redo entry
    pub fn pop_undo_item(&mut self) -> Option<UndoItem> {
        let item = self.undos.pop()?;
        self.redos.push(invert_item(&item));
        Some(item)
    }

    /// Take the top redo entry; its inverse becomes the top undo entry
    pub fn pop_redo_item(&mut self) -> Option<UndoItem> {
        let item = self.redos.pop()?;
        self.undos.push(invert_item(&item));
        Some(item)
    }

    pub fn clear(&mut self) {
        self.undos.clear();
        self.redos.clear();
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Inverse of a sequence: each operation inverted, order reversed
fn invert_item(ops: &[Operation]) -> UndoItem {
    ops.iter().rev().map(Operation::invert).collect()
}

/// Transform each entry (top first) against the still-current view of `ops`,
/// carrying the rebased view down to the next entry
fn transform_stack(stack: &mut Vec<UndoItem>, ops: &[Operation]) {
    let mut remote = ops.to_vec();
    for item in stack.iter_mut().rev() {
        let (rebased, rest) = transform(item, &remote);
        *item = rebased;
        remote = rest;
    }
    stack.retain(|item| !item.is_empty());
}
