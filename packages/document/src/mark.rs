use crate::schema::MarkKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Node and mark attributes.
pub type Attrs = BTreeMap<String, Value>;

/// Inline annotation attached to text (or, for node marks, to a node).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    pub kind: MarkKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: Attrs,
}

impl Mark {
    pub fn new(kind: MarkKind) -> Self {
        Self {
            kind,
            attrs: Attrs::new(),
        }
    }

    pub fn with_attrs(kind: MarkKind, attrs: Attrs) -> Self {
        Self { kind, attrs }
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// Add this mark to a sorted set, replacing any mark of the same kind.
    pub fn add_to_set(&self, set: &[Mark]) -> Vec<Mark> {
        let mut result = Vec::with_capacity(set.len() + 1);
        let mut placed = false;
        for other in set {
            if other == self {
                return set.to_vec();
            }
            if other.kind == self.kind {
                continue;
            }
            if !placed && other.kind > self.kind {
                result.push(self.clone());
                placed = true;
            }
            result.push(other.clone());
        }
        if !placed {
            result.push(self.clone());
        }
        result
    }

    /// Remove this exact mark from a set.
    pub fn remove_from_set(&self, set: &[Mark]) -> Vec<Mark> {
        set.iter().filter(|m| *m != self).cloned().collect()
    }

    pub fn is_in_set(&self, set: &[Mark]) -> bool {
        set.iter().any(|m| m == self)
    }

    pub fn same_set(a: &[Mark], b: &[Mark]) -> bool {
        a == b
    }
}

/// Find the mark of a given kind in a set.
pub fn find_mark(set: &[Mark], kind: MarkKind) -> Option<&Mark> {
    set.iter().find(|m| m.kind == kind)
}

/// Remove every mark of a given kind from a set.
pub fn remove_kind(set: &[Mark], kind: MarkKind) -> Vec<Mark> {
    set.iter().filter(|m| m.kind != kind).cloned().collect()
}
