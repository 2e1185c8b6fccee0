//! Transform engine
//!
//! `transform_pair` rewrites one operation as if another had been applied
//! first. `transform` lifts that to two sequences built independently from
//! the same document state, and `transform_offset` moves a cursor through a
//! sequence.
//!
//! # Convergence
//!
//! For sequences `a` and `b` built on the same state `S`, with
//! `(a', b') = transform(a, b)`:
//!
//! ```text
//! S + a + b'  ==  S + b + a'
//! ```
//!
//! Ties between inserts at the same offset are broken in favour of the
//! first argument of `transform` ("ours"), so both sides of a transform
//! always agree on who yields.
//!
//! # Example
//!
//! ```rust
//! use textsync_core::ot::{transform, Operation};
//!
//! let ours = vec![Operation::insert(0, "Hello ")];
//! let theirs = vec![Operation::remove(0, "x")];
//! let (ours, theirs) = transform(&ours, &theirs);
//!
//! assert_eq!(ours, vec![Operation::insert(0, "Hello ")]);
//! assert_eq!(theirs, vec![Operation::remove(6, "x")]);
//! ```

use super::operation::{split_at_char, Operation, OperationKind};

/// Result of transforming one operation against another
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformed {
    /// The operation's effect was already achieved by the other one
    Noop,
    One(Operation),
    /// A remove cut in two by an insert landing inside its range; the
    /// second half is expressed relative to the content after the first
    Split(Operation, Operation),
}

impl Transformed {
    pub fn into_vec(self) -> Vec<Operation> {
        match self {
            Transformed::Noop => Vec::new(),
            Transformed::One(op) => vec![op],
            Transformed::Split(first, second) => vec![first, second],
        }
    }
}

/// Recompute `left` as if `right` had already been applied
///
/// `left_wins` resolves inserts at the same offset: the winner keeps its
/// offset, the loser shifts right.
pub fn transform_pair(left: &Operation, right: &Operation, left_wins: bool) -> Transformed {
    match (left.kind, right.kind) {
        (OperationKind::Insert, OperationKind::Insert) => insert_insert(left, right, left_wins),
        (OperationKind::Insert, OperationKind::Remove) => insert_remove(left, right),
        (OperationKind::Remove, OperationKind::Insert) => remove_insert(left, right),
        (OperationKind::Remove, OperationKind::Remove) => remove_remove(left, right),
    }
}

/// `transform_pair` flattened into zero, one or two operations
pub fn transform_operation(left: &Operation, right: &Operation, left_wins: bool) -> Vec<Operation> {
    transform_pair(left, right, left_wins).into_vec()
}

fn with_offset(op: &Operation, offset: usize) -> Operation {
    Operation {
        offset,
        ..op.clone()
    }
}

fn with_offset_and_text(op: &Operation, offset: usize, text: String) -> Operation {
    Operation {
        offset,
        text,
        ..op.clone()
    }
}

fn insert_insert(left: &Operation, right: &Operation, left_wins: bool) -> Transformed {
    if right.offset < left.offset || (right.offset == left.offset && !left_wins) {
        Transformed::One(with_offset(left, left.offset + right.len()))
    } else {
        Transformed::One(left.clone())
    }
}

fn insert_remove(left: &Operation, right: &Operation) -> Transformed {
    if left.offset >= right.end() {
        Transformed::One(with_offset(left, left.offset - right.len()))
    } else if left.offset > right.offset {
        // Insertion point was deleted; land at the edge of the hole
        Transformed::One(with_offset(left, right.offset))
    } else {
        Transformed::One(left.clone())
    }
}

fn remove_insert(left: &Operation, right: &Operation) -> Transformed {
    if right.offset <= left.offset {
        return Transformed::One(with_offset(left, left.offset + right.len()));
    }
    if right.offset >= left.end() || right.is_empty() {
        return Transformed::One(left.clone());
    }

    let (before, after) = split_at_char(&left.text, right.offset - left.offset);
    let first = with_offset_and_text(left, left.offset, before.to_string());
    // The second half sits after the inserted text, then slides left by
    // whatever `first` removes ahead of it.
    let second = with_offset_and_text(left, right.end(), after.to_string());
    match remove_remove(&second, &first) {
        Transformed::One(second) => Transformed::Split(first, second),
        other => other,
    }
}

fn remove_remove(left: &Operation, right: &Operation) -> Transformed {
    let (left_start, left_end) = (left.offset, left.end());
    let (right_start, right_end) = (right.offset, right.end());

    if right_start <= left_start && right_end >= left_end {
        return Transformed::Noop;
    }
    if right_start >= left_end {
        return Transformed::One(left.clone());
    }
    if right_end <= left_start {
        return Transformed::One(with_offset(left, left_start - right.len()));
    }

    // Overlap: keep only the part of our text outside their range
    let mut text = String::new();
    if right_start > left_start {
        text.push_str(split_at_char(&left.text, right_start - left_start).0);
    }
    if right_end < left_end {
        text.push_str(split_at_char(&left.text, right_end - left_start).1);
    }
    Transformed::One(with_offset_and_text(
        left,
        left_start.min(right_start),
        text,
    ))
}

/// Rebase two sequences built from the same document state against each other
///
/// Returns `(ours', theirs')` where `ours'` applies after `theirs` and
/// `theirs'` applies after `ours`. Each of our operations is folded through
/// every one of theirs in turn; the rebased copy of theirs it leaves behind
/// is what the next of ours is transformed against. A split on either side
/// is folded through the remainder element by element.
pub fn transform(ours: &[Operation], theirs: &[Operation]) -> (Vec<Operation>, Vec<Operation>) {
    match (ours, theirs) {
        ([], _) | (_, []) => (ours.to_vec(), theirs.to_vec()),
        ([our], [their]) => (
            transform_operation(our, their, true),
            transform_operation(their, our, false),
        ),
        ([_], [their, rest @ ..]) => {
            let (ours, mut rebased) = transform(ours, std::slice::from_ref(their));
            let (ours, rest) = transform(&ours, rest);
            rebased.extend(rest);
            (ours, rebased)
        }
        ([our, rest @ ..], _) => {
            let (mut rebased, theirs) = transform(std::slice::from_ref(our), theirs);
            let (rest, theirs) = transform(rest, &theirs);
            rebased.extend(rest);
            (rebased, theirs)
        }
    }
}

/// Move a cursor position through a sequence of operations
///
/// An insert at or before the cursor pushes it right, so a caret sitting
/// exactly where someone else types ends up after the new text. A remove
/// containing the cursor clamps it to the start of the removed range.
pub fn transform_offset(offset: usize, ops: &[Operation]) -> usize {
    ops.iter().fold(offset, |offset, op| match op.kind {
        OperationKind::Insert if op.offset <= offset => offset + op.len(),
        OperationKind::Remove if op.end() <= offset => offset - op.len(),
        OperationKind::Remove if op.offset < offset => op.offset,
        _ => offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ot::apply_operations;
    use ropey::Rope;

    fn one(op: Operation) -> Transformed {
        Transformed::One(op)
    }

    fn run(content: &str, ops: &[Operation]) -> String {
        let mut rope = Rope::from_str(content);
        apply_operations(&mut rope, ops).unwrap();
        rope.to_string()
    }

    fn assert_converges(base: &str, ours: &[Operation], theirs: &[Operation]) -> String {
        let (ours_t, theirs_t) = transform(ours, theirs);
        let mine = run(&run(base, ours), &theirs_t);
        let other = run(&run(base, theirs), &ours_t);
        assert_eq!(mine, other);
        mine
    }

    #[test]
    fn test_insert_against_insert() {
        let left = Operation::insert(2, "a");

        assert_eq!(
            transform_pair(&left, &Operation::insert(1, "bb"), true),
            one(Operation::insert(4, "a"))
        );
        assert_eq!(
            transform_pair(&left, &Operation::insert(2, "b"), false),
            one(Operation::insert(3, "a"))
        );
        assert_eq!(
            transform_pair(&left, &Operation::insert(2, "b"), true),
            one(Operation::insert(2, "a"))
        );
        assert_eq!(
            transform_pair(&left, &Operation::insert(3, "b"), true),
            one(Operation::insert(2, "a"))
        );
    }

    #[test]
    fn test_insert_against_remove() {
        let left = Operation::insert(2, "a");

        assert_eq!(
            transform_pair(&left, &Operation::remove(1, "b"), true),
            one(Operation::insert(1, "a"))
        );
        assert_eq!(
            transform_pair(&left, &Operation::remove(2, "b"), true),
            one(Operation::insert(2, "a"))
        );
        assert_eq!(
            transform_pair(&left, &Operation::remove(3, "b"), true),
            one(Operation::insert(2, "a"))
        );
        // Insertion point inside the deleted range clamps to its start
        assert_eq!(
            transform_pair(&Operation::insert(4, "a"), &Operation::remove(2, "xyz"), true),
            one(Operation::insert(2, "a"))
        );
    }

    #[test]
    fn test_remove_against_insert() {
        let left = Operation::remove(2, "a");

        assert_eq!(
            transform_pair(&left, &Operation::insert(1, "b"), true),
            one(Operation::remove(3, "a"))
        );
        assert_eq!(
            transform_pair(&left, &Operation::insert(2, "b"), true),
            one(Operation::remove(3, "a"))
        );
        assert_eq!(
            transform_pair(&left, &Operation::insert(3, "b"), true),
            one(Operation::remove(2, "a"))
        );
    }

    #[test]
    fn test_remove_split_by_insert() {
        let left = Operation::remove(2, "abc");
        let right = Operation::insert(3, "x");

        assert_eq!(
            transform_operation(&left, &right, true),
            vec![Operation::remove(2, "a"), Operation::remove(3, "bc")]
        );
        assert_eq!(run("..abc..", &[right.clone()]), "..axbc..");
        assert_eq!(
            run("..axbc..", &transform_operation(&left, &right, true)),
            "..x.."
        );
    }

    #[test]
    fn test_remove_against_remove() {
        let left = Operation::remove(2, "a");

        assert_eq!(
            transform_pair(&left, &Operation::remove(1, "b"), true),
            one(Operation::remove(1, "a"))
        );
        assert_eq!(
            transform_pair(&left, &Operation::remove(2, "a"), true),
            Transformed::Noop
        );
        assert_eq!(
            transform_pair(&left, &Operation::remove(3, "b"), true),
            one(Operation::remove(2, "a"))
        );
    }

    #[test]
    fn test_remove_against_overlapping_remove() {
        // "xxabcdeyy": left removes "abc", right removes "bcde"
        let left = Operation::remove(2, "abc");
        let right = Operation::remove(3, "bcde");
        assert_eq!(
            transform_pair(&left, &right, true),
            one(Operation::remove(2, "a"))
        );
        assert_eq!(
            transform_pair(&right, &left, false),
            one(Operation::remove(2, "de"))
        );

        // Right strictly inside left keeps both ends
        assert_eq!(
            transform_pair(&Operation::remove(1, "abcde"), &Operation::remove(2, "bc"), true),
            one(Operation::remove(1, "ade"))
        );

        // Right fully covers left
        assert_eq!(
            transform_pair(&Operation::remove(2, "bc"), &Operation::remove(1, "abcde"), true),
            Transformed::Noop
        );
    }

    #[test]
    fn test_transform_sequences() {
        let ours = vec![Operation::remove(1, "a"), Operation::insert(3, "s")];
        let theirs = vec![Operation::remove(3, "t"), Operation::insert(1, "h")];

        let (new_ours, new_theirs) = transform(&ours, &theirs);

        assert_eq!(
            new_ours,
            vec![Operation::remove(2, "a"), Operation::insert(3, "s")]
        );
        assert_eq!(
            new_theirs,
            vec![Operation::remove(2, "t"), Operation::insert(1, "h")]
        );
        assert_converges("cart", &ours, &theirs);
    }

    #[test]
    fn test_transform_empty_sides() {
        let ops = vec![Operation::insert(0, "a")];
        assert_eq!(transform(&ops, &[]), (ops.clone(), vec![]));
        assert_eq!(transform(&[], &ops), (vec![], ops.clone()));
    }

    #[test]
    fn test_transform_simultaneous_inserts_converge() {
        let result = assert_converges(
            "",
            &[Operation::insert(0, "ours")],
            &[Operation::insert(0, "theirs")],
        );
        assert_eq!(result, "ourstheirs");
    }

    #[test]
    fn test_transform_split_through_sequence() {
        // Our remove is split by their first insert, and both halves must
        // then be carried through their remaining operations.
        let base = "0123456789";
        let ours = vec![Operation::remove(2, "23456"), Operation::insert(2, "Z")];
        let theirs = vec![
            Operation::insert(4, "ab"),
            Operation::remove(0, "01"),
            Operation::insert(5, "Q"),
        ];
        assert_converges(base, &ours, &theirs);
        assert_converges(base, &theirs, &ours);
    }

    #[test]
    fn test_transform_noops_through_sequence() {
        let base = "hello world";
        let ours = vec![Operation::remove(6, "world"), Operation::insert(6, "rust")];
        let theirs = vec![Operation::remove(5, " world"), Operation::insert(5, "!")];
        let result = assert_converges(base, &ours, &theirs);
        assert!(result.starts_with("hello"));
    }

    #[test]
    fn test_transform_keeps_versions() {
        let left = Operation::remove(2, "abc").with_version(4);
        let split = transform_operation(&left, &Operation::insert(3, "x"), true);
        assert!(split.iter().all(|op| op.version == Some(4)));
    }

    #[test]
    fn test_transform_offset_sequence() {
        let ops = vec![
            Operation::insert(2, "a"),
            Operation::remove(1, "b"),
            Operation::insert(3, "c"),
        ];
        assert_eq!(transform_offset(2, &ops), 2);
        assert_eq!(transform_offset(3, &ops), 4);
        assert_eq!(transform_offset(4, &ops), 5);
    }

    #[test]
    fn test_transform_offset_insert() {
        let op = [Operation::insert(2, "c")];
        assert_eq!(transform_offset(4, &op), 5);
        assert_eq!(transform_offset(2, &op), 3);
        assert_eq!(transform_offset(1, &op), 1);

        assert_eq!(transform_offset(3, &[Operation::insert(1, "h")]), 4);
    }

    #[test]
    fn test_transform_offset_remove() {
        let op = [Operation::remove(2, "c")];
        assert_eq!(transform_offset(4, &op), 3);
        assert_eq!(transform_offset(2, &op), 2);

        // Cursor inside the removed range clamps to its start
        assert_eq!(transform_offset(4, &[Operation::remove(2, "cdef")]), 2);
    }
}
