//! Attribute-level diffing between prior and planned state.
//!
//! Unset values (`null`, `[]`, `{}`) compare equal to a missing key. Sets
//! compare without regard to order. A change to an attribute or block marked
//! `force_new` requires replacement.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::schema::{AttributeType, Block, NestedBlock};
use crate::types::AttributeChange;

/// The outcome of comparing two states against a schema block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    /// Changed attributes and blocks, sorted by path.
    pub changes: Vec<AttributeChange>,
    /// Paths whose change forces replacement.
    pub replace_paths: Vec<String>,
}

impl Diff {
    /// Whether any change forces replacement.
    pub fn requires_replace(&self) -> bool {
        !self.replace_paths.is_empty()
    }
}

/// Compare `prior` and `planned` attribute by attribute.
///
/// Computed attributes that are unset in `planned` are unknown until apply
/// and do not count as changes.
pub fn diff(block: &Block, prior: &Value, planned: &Value) -> Diff {
    let mut out = Diff::default();
    diff_block(block, prior, planned, "", &mut out);
    out.changes.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

fn diff_block(block: &Block, prior: &Value, planned: &Value, prefix: &str, out: &mut Diff) {
    let names: BTreeSet<&String> = block.attributes.keys().chain(block.blocks.keys()).collect();

    for name in names {
        let path = join(prefix, name);
        let before = normalized(prior.get(name.as_str()));
        let after = normalized(planned.get(name.as_str()));

        if let Some(attr) = block.attributes.get(name) {
            if attr.flags.computed && is_unknown(after) {
                continue;
            }
            if values_equal(&attr.attr_type, before, after) {
                continue;
            }
            if attr.force_new {
                out.replace_paths.push(path.clone());
            }
            out.changes.push(change(path, before, after));
        } else if let Some(nested) = block.blocks.get(name) {
            if before == after {
                continue;
            }
            if nested.force_new {
                out.replace_paths.push(path.clone());
            } else {
                nested_force_new(nested, before, after, &path, out);
            }
            out.changes.push(change(path, before, after));
        }
    }
}

/// Record force-new attributes that changed inside a nested block.
fn nested_force_new(
    nested: &NestedBlock,
    before: Option<&Value>,
    after: Option<&Value>,
    path: &str,
    out: &mut Diff,
) {
    let items = |v: Option<&Value>| -> Vec<Value> {
        match v {
            Some(Value::Array(items)) => items.clone(),
            Some(item @ Value::Object(_)) => vec![item.clone()],
            _ => Vec::new(),
        }
    };
    let (before, after) = (items(before), items(after));
    let empty = Value::Object(Default::default());

    for i in 0..before.len().max(after.len()) {
        let b = before.get(i).unwrap_or(&empty);
        let a = after.get(i).unwrap_or(&empty);
        let mut inner = Diff::default();
        diff_block(&nested.block, b, a, &format!("{path}.{i}"), &mut inner);
        out.replace_paths.extend(inner.replace_paths);
    }
}

fn change(path: String, before: Option<&Value>, after: Option<&Value>) -> AttributeChange {
    AttributeChange::new(path, before.cloned(), after.cloned())
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// `None` for values that carry no information.
pub fn normalized(value: Option<&Value>) -> Option<&Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) if items.is_empty() => None,
        Some(Value::Object(obj)) if obj.is_empty() => None,
        Some(v) => Some(v),
    }
}

/// Whether a planned value is still to be determined by the remote API.
pub fn is_unknown(value: Option<&Value>) -> bool {
    match normalized(value) {
        None => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn values_equal(attr_type: &AttributeType, before: Option<&Value>, after: Option<&Value>) -> bool {
    match (attr_type, before, after) {
        (AttributeType::Set(_), Some(Value::Array(b)), Some(Value::Array(a))) => {
            let key = |items: &[Value]| {
                let mut keys: Vec<String> = items.iter().map(Value::to_string).collect();
                keys.sort();
                keys.dedup();
                keys
            };
            key(b) == key(a)
        },
        _ => before == after,
    }
}
