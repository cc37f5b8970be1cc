use crate::error::{ReplaceError, ReplaceResult};
use crate::fragment::Fragment;
use crate::node::Node;
use serde::{Deserialize, Serialize};

/// A fragment that may be torn open at either end.
///
/// `open_start`/`open_end` record how many levels of the first/last node
/// chain are open, i.e. continue content outside the slice.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slice {
    pub content: Fragment,
    #[serde(default)]
    pub open_start: usize,
    #[serde(default)]
    pub open_end: usize,
}

impl Slice {
    pub fn new(content: Fragment, open_start: usize, open_end: usize) -> Self {
        Self {
            content,
            open_start,
            open_end,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn closed(content: Fragment) -> Self {
        Self::new(content, 0, 0)
    }

    /// Size the slice adds when inserted.
    pub fn size(&self) -> usize {
        self.content.size() - self.open_start - self.open_end
    }

    pub fn is_empty(&self) -> bool {
        self.content.size() == 0
    }

    /// Insert a fragment at a position relative to the slice start.
    pub fn insert_at(&self, pos: usize, fragment: &Fragment) -> Option<Slice> {
        let content = insert_into(&self.content, pos + self.open_start, fragment, None)?;
        Some(Slice::new(content, self.open_start, self.open_end))
    }

    /// Remove a flat range relative to the slice start.
    pub fn remove_between(&self, from: usize, to: usize) -> ReplaceResult<Slice> {
        let content = remove_range(&self.content, from + self.open_start, to + self.open_start)?;
        Ok(Slice::new(content, self.open_start, self.open_end))
    }

    /// The widest slice that opens a fragment as far as its edges allow.
    pub fn max_open(fragment: Fragment) -> Slice {
        let mut open_start = 0;
        let mut open_end = 0;
        let mut node = fragment.first_child();
        while let Some(n) = node {
            if n.is_leaf() {
                break;
            }
            open_start += 1;
            node = n.first_child();
        }
        let mut node = fragment.last_child();
        while let Some(n) = node {
            if n.is_leaf() {
                break;
            }
            open_end += 1;
            node = n.last_child();
        }
        Slice::new(fragment, open_start, open_end)
    }
}

fn remove_range(content: &Fragment, from: usize, to: usize) -> ReplaceResult<Fragment> {
    let (index, offset) = content.find_index(from, -1)?;
    let (index_to, offset_to) = content.find_index(to, -1)?;
    let child = content.maybe_child(index);
    if offset == from || child.map(Node::is_text).unwrap_or(true) {
        if offset_to != to && !content.child(index_to).is_text() {
            return Err(ReplaceError::NonFlatRange);
        }
        return Ok(content.cut(0, from).append(&content.cut(to, content.size())));
    }
    if index != index_to {
        return Err(ReplaceError::NonFlatRange);
    }
    let child = content.child(index);
    let inner = remove_range(child.content(), from - offset - 1, to - offset - 1)?;
    Ok(content.replace_child(index, child.copy(inner)))
}

fn insert_into(
    content: &Fragment,
    dist: usize,
    insert: &Fragment,
    parent: Option<&Node>,
) -> Option<Fragment> {
    let (index, offset) = content.find_index(dist, -1).ok()?;
    let child = content.maybe_child(index);
    if offset == dist || child.map(Node::is_text).unwrap_or(true) {
        if let Some(parent) = parent {
            if !parent.can_replace(index, index, insert) {
                return None;
            }
        }
        return Some(
            content
                .cut(0, dist)
                .append(insert)
                .append(&content.cut(dist, content.size())),
        );
    }
    let child = child?;
    let inner = insert_into(child.content(), dist - offset - 1, insert, Some(child))?;
    Some(content.replace_child(index, child.copy(inner)))
}
