//! Property-based test generators.
//!
//! Provides proptest strategies for document mutations and a deterministic
//! way to replay them against a read-write transaction.

use proptest::prelude::*;
use trunkdb_core::{NodeContent, NodeTrx};

/// One step of a generated editing session.
#[derive(Debug, Clone)]
pub enum Op {
    /// Insert as first child of the cursor node.
    InsertFirstChild(NodeContent),
    /// Insert as last child of the cursor node.
    InsertLastChild(NodeContent),
    /// Insert as right sibling of the cursor node.
    InsertRightSibling(NodeContent),
    /// Replace the value of the cursor node.
    SetValue(String),
    /// Rename the cursor node.
    SetName(String),
    /// Remove the subtree under the cursor.
    Remove,
    /// Move the cursor to its parent.
    MoveToParent,
    /// Move the cursor to its first child.
    MoveToFirstChild,
    /// Move the cursor to its right sibling.
    MoveToRightSibling,
    /// Move the cursor back to the document root.
    MoveToDocumentRoot,
}

/// Strategy for short object key names.
pub fn key_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["id", "name", "tags", "price", "author"]).prop_map(String::from)
}

/// Strategy for string values.
pub fn string_value_strategy() -> impl Strategy<Value = String> {
    "[a-z]{0,8}"
}

/// Strategy for JSON node contents.
pub fn json_content_strategy() -> impl Strategy<Value = NodeContent> {
    prop_oneof![
        2 => Just(NodeContent::object()),
        2 => Just(NodeContent::array()),
        3 => key_name_strategy().prop_map(NodeContent::object_key),
        2 => string_value_strategy().prop_map(NodeContent::string),
        1 => (-1000i32..1000).prop_map(|n| NodeContent::number(f64::from(n))),
        1 => any::<bool>().prop_map(NodeContent::boolean),
        1 => Just(NodeContent::null()),
    ]
}

/// Strategy for a single editing step on a JSON document.
pub fn json_op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => json_content_strategy().prop_map(Op::InsertFirstChild),
        2 => json_content_strategy().prop_map(Op::InsertLastChild),
        3 => json_content_strategy().prop_map(Op::InsertRightSibling),
        1 => string_value_strategy().prop_map(Op::SetValue),
        1 => key_name_strategy().prop_map(Op::SetName),
        1 => Just(Op::Remove),
        2 => Just(Op::MoveToParent),
        2 => Just(Op::MoveToFirstChild),
        1 => Just(Op::MoveToRightSibling),
        1 => Just(Op::MoveToDocumentRoot),
    ]
}

/// Strategy for an editing session of up to `max_len` steps.
pub fn json_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(json_op_strategy(), 1..=max_len)
}

/// Applies `op` to `wtx`.
///
/// Returns `true` if the document changed. Steps the node factory or the
/// transaction rejects leave the document untouched and return `false`,
/// so replaying the same steps on two resources gives the same documents.
pub fn apply_op(wtx: &mut NodeTrx, op: &Op) -> bool {
    match op {
        Op::InsertFirstChild(content) => wtx.insert_first_child(content).is_ok(),
        Op::InsertLastChild(content) => wtx.insert_last_child(content).is_ok(),
        Op::InsertRightSibling(content) => wtx.insert_right_sibling(content).is_ok(),
        Op::SetValue(value) => wtx.set_value(value).is_ok(),
        Op::SetName(name) => wtx.set_name(name).is_ok(),
        Op::Remove => wtx.remove().is_ok(),
        Op::MoveToParent => {
            wtx.move_to_parent();
            false
        }
        Op::MoveToFirstChild => {
            wtx.move_to_first_child();
            false
        }
        Op::MoveToRightSibling => {
            wtx.move_to_right_sibling();
            false
        }
        Op::MoveToDocumentRoot => {
            wtx.move_to_document_root();
            false
        }
    }
}
