//! Compose: merge adjacent same-kind edits
//!
//! Typing forward produces a run of inserts each starting where the last one
//! ended; backspacing produces a run of removes each ending where the last one
//! started. Folding those runs into single operations keeps the submission
//! queue and the server log short without changing the net effect.

use super::operation::{Operation, OperationKind};

/// Append `op` to `queued`, merging it into the last element when adjacent
pub fn compose(mut queued: Vec<Operation>, op: Operation) -> Vec<Operation> {
    match queued.pop() {
        None => queued.push(op),
        Some(last) => match compose_pair(&last, &op) {
            Some(merged) => queued.push(merged),
            None => {
                queued.push(last);
                queued.push(op);
            }
        },
    }
    queued
}

/// Merge `second`, applied right after `first`, into one operation if possible
pub fn compose_pair(first: &Operation, second: &Operation) -> Option<Operation> {
    match (first.kind, second.kind) {
        (OperationKind::Insert, OperationKind::Insert) if first.end() == second.offset => {
            Some(Operation {
                text: format!("{}{}", first.text, second.text),
                ..first.clone()
            })
        }
        (OperationKind::Remove, OperationKind::Remove) if second.end() == first.offset => {
            Some(Operation {
                text: format!("{}{}", second.text, first.text),
                ..second.clone()
            })
        }
        _ => None,
    }
}
