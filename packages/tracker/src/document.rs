//! A document under review, with its change collection kept current.

use crate::annotation::Status;
use crate::changes::{discover, ChangeSet};
use crate::config::{TrackConfig, TrackingStatus};
use crate::context::TrackContext;
use crate::dispose::set_status;
use crate::error::TrackResult;
use crate::repair::repair;
use crate::track::track;
use redline_document::Node;
use redline_transform::{StepResult, Transform};
use tracing::{debug, info};

/// Owns a document and routes every edit and review decision through the
/// tracker. After each one the change collection is rediscovered, and
/// repaired first if the document carries malformed annotations.
#[derive(Debug, Clone)]
pub struct TrackedDocument {
    doc: Node,
    changes: ChangeSet,
    config: TrackConfig,
    ctx: TrackContext,
    status: TrackingStatus,
}

impl TrackedDocument {
    pub fn new(doc: Node, config: TrackConfig) -> TrackResult<Self> {
        let ctx = TrackContext::new(config.author_id.clone());
        Self::with_context(doc, config, ctx)
    }

    /// Use `ctx` for ids and timestamps, e.g. a deterministic one in tests.
    pub fn with_context(doc: Node, config: TrackConfig, ctx: TrackContext) -> TrackResult<Self> {
        let status = config.initial_tracking_status;
        let mut document = Self {
            doc,
            changes: ChangeSet::default(),
            config,
            ctx,
            status,
        };
        document.refresh()?;
        Ok(document)
    }

    pub fn doc(&self) -> &Node {
        &self.doc
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn config(&self) -> &TrackConfig {
        &self.config
    }

    pub fn tracking_status(&self) -> TrackingStatus {
        self.status
    }

    pub fn set_tracking_status(&mut self, status: TrackingStatus) {
        info!(?status, "tracking status changed");
        self.status = status;
    }

    /// Hand the pen to another author.
    pub fn set_author(&mut self, author_id: impl Into<String>) {
        let author_id = author_id.into();
        self.ctx.set_author(author_id.clone());
        self.config.author_id = author_id;
    }

    /// Move a manual clock forward; used to tell sessions apart in tests.
    pub fn advance_clock(&mut self, ms: i64) {
        self.ctx.advance(ms);
    }

    /// A fresh edit on the current document.
    pub fn transform(&self) -> Transform {
        Transform::new(self.doc.clone())
    }

    /// Track the edit `tr`, which must start from the current document,
    /// and make its result current.
    pub fn apply(&mut self, tr: &Transform) -> TrackResult<()> {
        let config = self.config.clone().with_status(self.status);
        let tracked = track(tr, &config, &mut self.ctx)?;
        self.doc = tracked.doc().clone();
        self.refresh()
    }

    /// Build an edit with `edit` and apply it.
    pub fn edit<F>(&mut self, edit: F) -> TrackResult<()>
    where
        F: FnOnce(&mut Transform) -> StepResult<()>,
    {
        let mut tr = self.transform();
        edit(&mut tr)?;
        self.apply(&tr)
    }

    /// Decide the changes `ids`, reviewing as the current author.
    pub fn set_change_status(&mut self, ids: &[&str], status: Status) -> TrackResult<()> {
        let tr = set_status(&self.doc, &self.changes, ids, status, &self.ctx)?;
        self.doc = tr.doc().clone();
        self.refresh()
    }

    pub fn accept_all(&mut self) -> TrackResult<()> {
        self.decide_pending(Status::Accepted)
    }

    pub fn reject_all(&mut self) -> TrackResult<()> {
        self.decide_pending(Status::Rejected)
    }

    fn decide_pending(&mut self, status: Status) -> TrackResult<()> {
        let ids: Vec<String> = self
            .changes
            .pending()
            .into_iter()
            .map(|c| c.id.clone())
            .collect();
        if ids.is_empty() {
            return Ok(());
        }
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        self.set_change_status(&ids, status)
    }

    fn refresh(&mut self) -> TrackResult<()> {
        let changes = discover(&self.doc);
        match repair(&self.doc, &changes, &mut self.ctx)? {
            Some(tr) => {
                debug!("repaired malformed annotations");
                self.doc = tr.doc().clone();
                self.changes = discover(&self.doc);
            }
            None => self.changes = changes,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackError;
    use pretty_assertions::assert_eq;
    use redline_document::builders::*;

    fn document(start: Node) -> TrackedDocument {
        let ctx = TrackContext::deterministic("alice", "h", 0);
        TrackedDocument::with_context(start, TrackConfig::new("alice"), ctx).unwrap()
    }

    #[test]
    fn test_edit_refreshes_changes() {
        let mut d = document(doc(vec![p("abc")]));
        assert!(d.changes().is_empty());
        d.advance_clock(250);
        d.edit(|tr| tr.insert_text(2, "X").map(|_| ())).unwrap();
        assert_eq!(d.changes().len(), 1);
        assert_eq!(d.changes().pending().len(), 1);
        assert_eq!(d.changes().all()[0].data.created_at, Some(250));
    }

    #[test]
    fn test_accept_and_reject_all() {
        let mut d = document(doc(vec![p("abc")]));
        d.edit(|tr| tr.insert_text(2, "X").map(|_| ())).unwrap();
        let mut rejected = d.clone();
        d.accept_all().unwrap();
        assert_eq!(d.doc(), &doc(vec![p("aXbc")]));
        assert!(d.changes().is_empty());
        rejected.reject_all().unwrap();
        assert_eq!(rejected.doc(), &doc(vec![p("abc")]));
    }

    #[test]
    fn test_view_only_refuses_edits() {
        let mut d = document(doc(vec![p("abc")]));
        d.set_tracking_status(TrackingStatus::ViewOnly);
        assert_eq!(d.tracking_status(), TrackingStatus::ViewOnly);
        let result = d.edit(|tr| tr.insert_text(2, "X").map(|_| ()));
        assert_eq!(result, Err(TrackError::ReadOnly));
        assert_eq!(d.doc(), &doc(vec![p("abc")]));
    }

    #[test]
    fn test_disabled_passes_edits_through() {
        let mut d = document(doc(vec![p("abc")]));
        d.set_tracking_status(TrackingStatus::Disabled);
        d.edit(|tr| tr.insert_text(2, "X").map(|_| ())).unwrap();
        assert_eq!(d.doc(), &doc(vec![p("aXbc")]));
        assert!(d.changes().is_empty());
    }
}
