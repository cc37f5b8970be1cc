//! # Open-slice replacement
//!
//! Replaces the range between two resolved positions with a slice whose
//! open sides are stitched onto the nodes around the range. The result is
//! validated on every rebuilt node; an invalid join is an error, never a
//! silently malformed tree.

use crate::error::{ReplaceError, ReplaceResult};
use crate::fragment::Fragment;
use crate::node::Node;
use crate::resolved::ResolvedPos;
use crate::slice::Slice;

pub fn replace(from: &ResolvedPos, to: &ResolvedPos, slice: &Slice) -> ReplaceResult<Node> {
    if slice.open_start > from.depth {
        return Err(ReplaceError::SliceTooDeep);
    }
    if from.depth - slice.open_start != to.depth.wrapping_sub(slice.open_end) {
        return Err(ReplaceError::InconsistentOpenDepths);
    }
    replace_outer(from, to, slice, 0)
}

fn replace_outer(
    from: &ResolvedPos,
    to: &ResolvedPos,
    slice: &Slice,
    depth: usize,
) -> ReplaceResult<Node> {
    let index = from.index(depth);
    let node = from.node(depth);
    if index == to.index(depth) && depth < from.depth - slice.open_start {
        let inner = replace_outer(from, to, slice, depth + 1)?;
        Ok(node.copy(node.content().replace_child(index, inner)))
    } else if slice.content.size() == 0 {
        close(node, replace_two_way(from, to, depth)?)
    } else if slice.open_start == 0
        && slice.open_end == 0
        && from.depth == depth
        && to.depth == depth
    {
        let parent = from.parent();
        let content = parent.content();
        close(
            parent,
            content
                .cut(0, from.parent_offset)
                .append(&slice.content)
                .append(&content.cut(to.parent_offset, content.size())),
        )
    } else {
        let (start, end) = prepare_slice_for_replace(slice, from)?;
        close(node, replace_three_way(from, &start, &end, to, depth)?)
    }
}

fn check_join(main: &Node, sub: &Node) -> ReplaceResult<()> {
    if !sub.kind().compatible_content(main.kind()) {
        return Err(ReplaceError::CannotJoin {
            main: main.kind().name().to_string(),
            sub: sub.kind().name().to_string(),
        });
    }
    Ok(())
}

fn joinable(before: &ResolvedPos, after: &ResolvedPos, depth: usize) -> ReplaceResult<Node> {
    let node = before.node(depth);
    check_join(node, after.node(depth))?;
    Ok(node.clone())
}

fn add_node(child: Node, target: &mut Vec<Node>) {
    if let Some(last) = target.last_mut() {
        if child.is_text() && last.is_text() && child.same_markup(last) {
            let joined = format!(
                "{}{}",
                last.text_str().unwrap_or_default(),
                child.text_str().unwrap_or_default()
            );
            *last = last.with_text(joined);
            return;
        }
    }
    target.push(child);
}

fn add_range(
    start: Option<&ResolvedPos>,
    end: Option<&ResolvedPos>,
    depth: usize,
    target: &mut Vec<Node>,
) {
    let node = match (end, start) {
        (Some(end), _) => end.node(depth),
        (None, Some(start)) => start.node(depth),
        (None, None) => return,
    };
    let mut start_index = 0;
    let end_index = end.map(|e| e.index(depth)).unwrap_or(node.child_count());
    if let Some(start) = start {
        start_index = start.index(depth);
        if start.depth > depth {
            start_index += 1;
        } else if start.text_offset() > 0 {
            if let Some(after) = start.node_after() {
                add_node(after, target);
            }
            start_index += 1;
        }
    }
    for i in start_index..end_index {
        add_node(node.child(i).clone(), target);
    }
    if let Some(end) = end {
        if end.depth == depth && end.text_offset() > 0 {
            if let Some(before) = end.node_before() {
                add_node(before, target);
            }
        }
    }
}

fn close(node: &Node, content: Fragment) -> ReplaceResult<Node> {
    if !node.valid_content(&content) {
        return Err(ReplaceError::invalid_content(node.kind().name()));
    }
    Ok(node.copy(content))
}

fn replace_three_way(
    from: &ResolvedPos,
    start: &ResolvedPos,
    end: &ResolvedPos,
    to: &ResolvedPos,
    depth: usize,
) -> ReplaceResult<Fragment> {
    let open_start = if from.depth > depth {
        Some(joinable(from, start, depth + 1)?)
    } else {
        None
    };
    let open_end = if to.depth > depth {
        Some(joinable(end, to, depth + 1)?)
    } else {
        None
    };

    let mut content = Vec::new();
    add_range(None, Some(from), depth, &mut content);
    match (&open_start, &open_end) {
        (Some(os), Some(oe)) if start.index(depth) == end.index(depth) => {
            check_join(os, oe)?;
            let inner = replace_three_way(from, start, end, to, depth + 1)?;
            add_node(close(os, inner)?, &mut content);
        }
        _ => {
            if let Some(os) = &open_start {
                let inner = replace_two_way(from, start, depth + 1)?;
                add_node(close(os, inner)?, &mut content);
            }
            add_range(Some(start), Some(end), depth, &mut content);
            if let Some(oe) = &open_end {
                let inner = replace_two_way(end, to, depth + 1)?;
                add_node(close(oe, inner)?, &mut content);
            }
        }
    }
    add_range(Some(to), None, depth, &mut content);
    Ok(Fragment::from_vec(content))
}

fn replace_two_way(from: &ResolvedPos, to: &ResolvedPos, depth: usize) -> ReplaceResult<Fragment> {
    let mut content = Vec::new();
    add_range(None, Some(from), depth, &mut content);
    if from.depth > depth {
        let kind = joinable(from, to, depth + 1)?;
        let inner = replace_two_way(from, to, depth + 1)?;
        add_node(close(&kind, inner)?, &mut content);
    }
    add_range(Some(to), None, depth, &mut content);
    Ok(Fragment::from_vec(content))
}

/// Wrap the slice in copies of the ancestors of `along` so its open sides can
/// be resolved like ordinary positions.
fn prepare_slice_for_replace(
    slice: &Slice,
    along: &ResolvedPos,
) -> ReplaceResult<(ResolvedPos, ResolvedPos)> {
    let extra = along.depth - slice.open_start;
    let parent = along.node(extra);
    let mut node = parent.copy(slice.content.clone());
    for i in (0..extra).rev() {
        node = along.node(i).copy(Fragment::from_node(node));
    }
    let start = node.resolve(slice.open_start + extra)?;
    let end = node.resolve(node.content().size() - slice.open_end - extra)?;
    Ok((start, end))
}
