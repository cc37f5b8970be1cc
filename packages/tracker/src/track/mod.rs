//! # Edit interception
//!
//! [`track`] turns a host edit into a tracked one. The host's steps are
//! walked last to first; each is undone on a working copy through its
//! inverse and the intended change is written back as annotated content.
//! Walking backwards keeps the "before" snapshot of every earlier step valid
//! while later ones are rewritten.
//!
//! A step whose inverse no longer applies is skipped with a warning and
//! stays in the result untracked. Only a corrupt shadow history fails the
//! whole edit.

mod around;
mod attrs;
mod marks;
mod replace;

use crate::config::{TrackConfig, TrackingStatus};
use crate::context::TrackContext;
use crate::error::{TrackError, TrackResult};
use crate::structure::{link_edit, pair_moves, MovePlan};
use redline_document::TRACKED_ATTR;
use redline_transform::{Mapping, Step, Transform};
use tracing::{debug, instrument, warn};

/// Steps of one edit tracked before giving up on the rest.
pub const MAX_TRACKED_STEPS: usize = 64;

/// Edit metadata naming a structural action. An edit carrying it is linked
/// as one structural change instead of being tracked step by step.
pub const STRUCTURE_ACTION_META: &str = "structureAction";

/// The host step being tracked, with the edit it belongs to.
pub(crate) struct HostStep<'a> {
    pub host: &'a Transform,
    pub index: usize,
    pub moves: &'a MovePlan,
}

impl HostStep<'_> {
    pub fn step(&self) -> &Step {
        &self.host.steps()[self.index]
    }

    /// Document the step was applied to.
    pub fn before(&self) -> &redline_document::Node {
        &self.host.docs()[self.index]
    }

    /// Mapping from the document right after the step to the working copy.
    pub fn mapping_after(&self, tr: &Transform) -> Mapping {
        tr.mapping().slice(self.index + 1)
    }

    /// The step's inverse, rebased onto the working copy. `None` when the
    /// range it restores no longer exists.
    pub fn inverse(&self, tr: &Transform) -> TrackResult<Option<Step>> {
        let inverse = self.step().invert(self.before())?;
        let mapped = inverse.map(&self.mapping_after(tr));
        if mapped.is_none() {
            warn!(index = self.index, step = self.step().name(), "inverse no longer maps, skipping");
        }
        Ok(mapped)
    }

    /// Start of the run of mark steps this step belongs to.
    pub fn mark_run_start(&self) -> usize {
        let steps = self.host.steps();
        let mut start = self.index;
        while start > 0 && is_mark_step(&steps[start - 1]) {
            start -= 1;
        }
        start
    }
}

fn is_mark_step(step: &Step) -> bool {
    matches!(
        step,
        Step::AddMark(_) | Step::RemoveMark(_) | Step::AddNodeMark(_) | Step::RemoveNodeMark(_)
    )
}

/// Steps that write annotations themselves are kept as they are.
fn passes_through(step: &Step) -> bool {
    match step {
        Step::AddMark(s) => s.mark.kind.is_tracking(),
        Step::RemoveMark(s) => s.mark.kind.is_tracking(),
        Step::AddNodeMark(s) => s.mark.kind.is_tracking(),
        Step::RemoveNodeMark(s) => s.mark.kind.is_tracking(),
        Step::Attr(s) => s.attr == TRACKED_ATTR,
        Step::Replace(_) | Step::ReplaceAround(_) => false,
    }
}

/// Rewrite the host edit `tr` so that its changes are recorded as pending
/// annotations by `config.author_id`.
#[instrument(level = "debug", skip_all, fields(steps = tr.steps().len()))]
pub fn track(tr: &Transform, config: &TrackConfig, ctx: &mut TrackContext) -> TrackResult<Transform> {
    match config.initial_tracking_status {
        TrackingStatus::Disabled => return Ok(tr.clone()),
        TrackingStatus::ViewOnly if tr.doc_changed() => return Err(TrackError::ReadOnly),
        TrackingStatus::ViewOnly | TrackingStatus::Enabled => {}
    }
    if !tr.doc_changed() {
        return Ok(tr.clone());
    }
    if let Some(key) = config.metas_to_skip_tracking.iter().find(|k| tr.has_meta(k)) {
        debug!(meta = %key, "edit skips tracking");
        return Ok(tr.clone());
    }
    if ctx.author_id != config.author_id {
        ctx.set_author(config.author_id.clone());
    }

    let mut tracked = tr.clone();
    if let Some(action) = tr.get_meta(STRUCTURE_ACTION_META).and_then(|v| v.as_str()) {
        link_edit(tr.before(), &mut tracked, action, ctx)?;
        return Ok(tracked);
    }

    let moves = pair_moves(tr, ctx);
    if !moves.is_empty() {
        debug!(
            origins = moves.origins.len(),
            destinations = moves.destinations.len(),
            "paired moves"
        );
    }
    for index in (0..tr.steps().len()).rev() {
        if tr.steps().len() - index > MAX_TRACKED_STEPS {
            warn!(remaining = index + 1, "too many steps, leaving the rest untracked");
            break;
        }
        let host = HostStep {
            host: tr,
            index,
            moves: &moves,
        };
        if passes_through(host.step()) {
            continue;
        }
        let checkpoint = tracked.clone();
        if let Err(err) = track_step(&mut tracked, &host, ctx) {
            if matches!(err, TrackError::MissingShadowEntry(_)) {
                return Err(err);
            }
            warn!(index, step = host.step().name(), error = %err, "step not tracked");
            tracked = checkpoint;
        }
    }
    Ok(tracked)
}

fn track_step(tr: &mut Transform, host: &HostStep, ctx: &mut TrackContext) -> TrackResult<()> {
    match host.step() {
        Step::Replace(step) => replace::track_replace(tr, host, step, ctx),
        Step::ReplaceAround(step) => around::track_replace_around(tr, host, step, ctx),
        Step::AddMark(step) => marks::track_add_mark(tr, host, step, ctx),
        Step::RemoveMark(step) => marks::track_remove_mark(tr, host, step, ctx),
        Step::AddNodeMark(step) => marks::track_add_node_mark(tr, host, step, ctx),
        Step::RemoveNodeMark(step) => marks::track_remove_node_mark(tr, host, step, ctx),
        Step::Attr(step) => attrs::track_attr_step(tr, host, step, ctx),
    }
}
