//! Provenance Writer - Atomic dual-write over store and mirror.
//!
//! The one place where the relational tables and the graph mirror are
//! mutated together. Callers stage a batch of operations, then `commit`
//! applies them in order to the store and the mirror under the caller's
//! write guard. Every applied operation is recorded in an undo journal; on
//! the first failure the journal is replayed in reverse and the error
//! propagates, so a batch is all-or-nothing and the mirror can never drift
//! from committed store state.
//!
//! Cascading deletes are exposed as their own single-operation commits:
//! validation happens before any mutation, so there is nothing to unwind.

use tracing::{debug, warn};

use crate::error::Result;
use crate::graph::{GraphMirror, GraphNode};
use crate::model::{
    Activity, Agent, Entity, InsertMode, NodeKind, RelationKind, Used, WasAssociatedWith,
    WasAttributedTo, WasDerivedFrom, WasGeneratedBy, WasInformedBy,
};
use crate::store::ProvenanceStore;

/// A single staged write.
#[derive(Debug, Clone)]
pub enum StagedOp {
    /// Insert an entity row and its mirror node.
    InsertEntity(Entity, InsertMode),
    /// Insert an activity row and its mirror node.
    InsertActivity(Activity, InsertMode),
    /// Insert an agent row and its mirror node.
    InsertAgent(Agent, InsertMode),
    /// Insert a generation row and its mirror edge.
    InsertWasGeneratedBy(WasGeneratedBy, InsertMode),
    /// Insert a usage row and its mirror edge.
    InsertUsed(Used, InsertMode),
    /// Insert an attribution row and its mirror edge.
    InsertWasAttributedTo(WasAttributedTo, InsertMode),
    /// Insert an association row and its mirror edge.
    InsertWasAssociatedWith(WasAssociatedWith, InsertMode),
    /// Insert a communication row and its mirror edge.
    InsertWasInformedBy(WasInformedBy, InsertMode),
    /// Insert a derivation row and its mirror edge.
    InsertWasDerivedFrom(WasDerivedFrom, InsertMode),
}

/// Inverse of an applied operation, for rollback.
#[derive(Debug)]
enum UndoOp {
    RemoveEntity(String),
    RemoveActivity(String),
    RemoveAgent(String),
    RemoveRelation(RelationKind, String, String),
}

/// Rows actually inserted by a committed batch, per table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitCounts {
    /// Entity rows inserted.
    pub entities: usize,
    /// Activity rows inserted.
    pub activities: usize,
    /// Agent rows inserted.
    pub agents: usize,
    /// Generation rows inserted.
    pub was_generated_by: usize,
    /// Usage rows inserted.
    pub used: usize,
    /// Attribution rows inserted.
    pub was_attributed_to: usize,
    /// Association rows inserted.
    pub was_associated_with: usize,
    /// Communication rows inserted.
    pub was_informed_by: usize,
    /// Derivation rows inserted.
    pub was_derived_from: usize,
}

/// Staged transaction over the provenance store and its graph mirror.
///
/// # Example
///
/// ```rust
/// use provdb::writer::ProvenanceWriter;
/// use provdb::model::{Entity, Activity, InsertMode, WasGeneratedBy};
/// use provdb::store::ProvenanceStore;
/// use provdb::graph::GraphMirror;
///
/// let mut store = ProvenanceStore::new();
/// let mut mirror = GraphMirror::new();
///
/// let mut writer = ProvenanceWriter::new();
/// writer.insert_entity(Entity::new("out1"), InsertMode::IgnoreConflict);
/// writer.insert_activity(Activity::new("act1", 0, 1).unwrap(), InsertMode::Strict);
/// writer.insert_was_generated_by(WasGeneratedBy {
///     entity_id: "out1".into(),
///     activity_id: "act1".into(),
/// });
/// let counts = writer.commit(&mut store, &mut mirror).unwrap();
/// assert_eq!(counts.entities, 1);
/// ```
#[derive(Debug, Default)]
pub struct ProvenanceWriter {
    ops: Vec<StagedOp>,
}

impl ProvenanceWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staged operations.
    pub fn staged_len(&self) -> usize {
        self.ops.len()
    }

    /// Stage an arbitrary operation.
    pub fn stage(&mut self, op: StagedOp) {
        self.ops.push(op);
    }

    /// Stage an entity insert.
    pub fn insert_entity(&mut self, entity: Entity, mode: InsertMode) {
        self.stage(StagedOp::InsertEntity(entity, mode));
    }

    /// Stage an activity insert.
    pub fn insert_activity(&mut self, activity: Activity, mode: InsertMode) {
        self.stage(StagedOp::InsertActivity(activity, mode));
    }

    /// Stage an agent insert.
    pub fn insert_agent(&mut self, agent: Agent, mode: InsertMode) {
        self.stage(StagedOp::InsertAgent(agent, mode));
    }

    /// Stage a strict generation-row insert.
    pub fn insert_was_generated_by(&mut self, row: WasGeneratedBy) {
        self.stage(StagedOp::InsertWasGeneratedBy(row, InsertMode::Strict));
    }

    /// Stage a strict usage-row insert.
    pub fn insert_used(&mut self, row: Used) {
        self.stage(StagedOp::InsertUsed(row, InsertMode::Strict));
    }

    /// Stage a strict attribution-row insert.
    pub fn insert_was_attributed_to(&mut self, row: WasAttributedTo) {
        self.stage(StagedOp::InsertWasAttributedTo(row, InsertMode::Strict));
    }

    /// Stage a strict association-row insert.
    pub fn insert_was_associated_with(&mut self, row: WasAssociatedWith) {
        self.stage(StagedOp::InsertWasAssociatedWith(row, InsertMode::Strict));
    }

    /// Stage a communication-row insert (insert-or-ignore, matching the
    /// inference path in ingestion which may stage repeats).
    pub fn insert_was_informed_by(&mut self, row: WasInformedBy) {
        self.stage(StagedOp::InsertWasInformedBy(row, InsertMode::IgnoreConflict));
    }

    /// Stage a strict derivation-row insert.
    pub fn insert_was_derived_from(&mut self, row: WasDerivedFrom) {
        self.stage(StagedOp::InsertWasDerivedFrom(row, InsertMode::Strict));
    }

    /// Apply all staged operations atomically.
    ///
    /// Operations are applied in staging order. On the first failure every
    /// already-applied operation is undone in reverse and the error is
    /// returned; neither the store nor the mirror retains any trace of the
    /// batch.
    pub fn commit(
        self,
        store: &mut ProvenanceStore,
        mirror: &mut GraphMirror,
    ) -> Result<CommitCounts> {
        let mut undo: Vec<UndoOp> = Vec::with_capacity(self.ops.len());
        let mut counts = CommitCounts::default();

        for op in &self.ops {
            if let Err(err) = Self::apply(op, store, mirror, &mut undo, &mut counts) {
                warn!(error = %err, applied = undo.len(), "rolling back provenance batch");
                Self::rollback(store, mirror, undo);
                return Err(err);
            }
        }

        debug!(
            ops = self.ops.len(),
            entities = counts.entities,
            relations = counts.was_generated_by
                + counts.used
                + counts.was_attributed_to
                + counts.was_associated_with
                + counts.was_informed_by
                + counts.was_derived_from,
            "provenance batch committed"
        );
        Ok(counts)
    }

    fn apply(
        op: &StagedOp,
        store: &mut ProvenanceStore,
        mirror: &mut GraphMirror,
        undo: &mut Vec<UndoOp>,
        counts: &mut CommitCounts,
    ) -> Result<()> {
        match op {
            StagedOp::InsertEntity(entity, mode) => {
                if store.insert_entity(entity.clone(), *mode)? {
                    undo.push(UndoOp::RemoveEntity(entity.id.clone()));
                    mirror.put_node(GraphNode {
                        id: entity.id.clone(),
                        kind: NodeKind::Entity,
                        label: entity.label.clone(),
                    });
                    counts.entities += 1;
                }
            }
            StagedOp::InsertActivity(activity, mode) => {
                if store.insert_activity(activity.clone(), *mode)? {
                    undo.push(UndoOp::RemoveActivity(activity.id.clone()));
                    mirror.put_node(GraphNode {
                        id: activity.id.clone(),
                        kind: NodeKind::Activity,
                        label: Some(activity.label.clone()),
                    });
                    counts.activities += 1;
                }
            }
            StagedOp::InsertAgent(agent, mode) => {
                if store.insert_agent(agent.clone(), *mode)? {
                    undo.push(UndoOp::RemoveAgent(agent.id.clone()));
                    mirror.put_node(GraphNode {
                        id: agent.id.clone(),
                        kind: NodeKind::Agent,
                        label: Some(agent.label.clone()),
                    });
                    counts.agents += 1;
                }
            }
            StagedOp::InsertWasGeneratedBy(row, mode) => {
                if store.insert_was_generated_by(row.clone(), *mode)? {
                    undo.push(UndoOp::RemoveRelation(
                        RelationKind::WasGeneratedBy,
                        row.entity_id.clone(),
                        row.activity_id.clone(),
                    ));
                    mirror.put_edge(
                        &row.entity_id,
                        &row.activity_id,
                        RelationKind::WasGeneratedBy,
                        None,
                    )?;
                    counts.was_generated_by += 1;
                }
            }
            StagedOp::InsertUsed(row, mode) => {
                if store.insert_used(row.clone(), *mode)? {
                    undo.push(UndoOp::RemoveRelation(
                        RelationKind::Used,
                        row.activity_id.clone(),
                        row.entity_id.clone(),
                    ));
                    mirror.put_edge(
                        &row.activity_id,
                        &row.entity_id,
                        RelationKind::Used,
                        Some(row.role.clone()),
                    )?;
                    counts.used += 1;
                }
            }
            StagedOp::InsertWasAttributedTo(row, mode) => {
                if store.insert_was_attributed_to(row.clone(), *mode)? {
                    undo.push(UndoOp::RemoveRelation(
                        RelationKind::WasAttributedTo,
                        row.entity_id.clone(),
                        row.agent_id.clone(),
                    ));
                    mirror.put_edge(
                        &row.entity_id,
                        &row.agent_id,
                        RelationKind::WasAttributedTo,
                        None,
                    )?;
                    counts.was_attributed_to += 1;
                }
            }
            StagedOp::InsertWasAssociatedWith(row, mode) => {
                if store.insert_was_associated_with(row.clone(), *mode)? {
                    undo.push(UndoOp::RemoveRelation(
                        RelationKind::WasAssociatedWith,
                        row.activity_id.clone(),
                        row.agent_id.clone(),
                    ));
                    mirror.put_edge(
                        &row.activity_id,
                        &row.agent_id,
                        RelationKind::WasAssociatedWith,
                        row.role.clone(),
                    )?;
                    counts.was_associated_with += 1;
                }
            }
            StagedOp::InsertWasInformedBy(row, mode) => {
                if store.insert_was_informed_by(row.clone(), *mode)? {
                    undo.push(UndoOp::RemoveRelation(
                        RelationKind::WasInformedBy,
                        row.informed_id.clone(),
                        row.informer_id.clone(),
                    ));
                    mirror.put_edge(
                        &row.informed_id,
                        &row.informer_id,
                        RelationKind::WasInformedBy,
                        None,
                    )?;
                    counts.was_informed_by += 1;
                }
            }
            StagedOp::InsertWasDerivedFrom(row, mode) => {
                if store.insert_was_derived_from(row.clone(), *mode)? {
                    undo.push(UndoOp::RemoveRelation(
                        RelationKind::WasDerivedFrom,
                        row.entity_id.clone(),
                        row.source_entity_id.clone(),
                    ));
                    mirror.put_edge(
                        &row.entity_id,
                        &row.source_entity_id,
                        RelationKind::WasDerivedFrom,
                        None,
                    )?;
                    counts.was_derived_from += 1;
                }
            }
        }
        Ok(())
    }

    fn rollback(store: &mut ProvenanceStore, mirror: &mut GraphMirror, undo: Vec<UndoOp>) {
        for op in undo.into_iter().rev() {
            match op {
                UndoOp::RemoveEntity(id) => {
                    store.remove_entity_row(&id);
                    mirror.remove_node(&id);
                }
                UndoOp::RemoveActivity(id) => {
                    store.remove_activity_row(&id);
                    mirror.remove_node(&id);
                }
                UndoOp::RemoveAgent(id) => {
                    store.remove_agent_row(&id);
                    mirror.remove_node(&id);
                }
                UndoOp::RemoveRelation(kind, left, right) => {
                    match kind {
                        RelationKind::WasGeneratedBy => {
                            store.remove_was_generated_by_row(&left, &right)
                        }
                        RelationKind::Used => store.remove_used_row(&left, &right),
                        RelationKind::WasAttributedTo => {
                            store.remove_was_attributed_to_row(&left, &right)
                        }
                        RelationKind::WasAssociatedWith => {
                            store.remove_was_associated_with_row(&left, &right)
                        }
                        RelationKind::WasInformedBy => {
                            store.remove_was_informed_by_row(&left, &right)
                        }
                        RelationKind::WasDerivedFrom => {
                            store.remove_was_derived_from_row(&left, &right)
                        }
                    }
                    mirror.remove_edge(&left, &right, kind);
                }
            }
        }
    }

    /// Delete an entity with cascading relation cleanup, keeping the mirror
    /// in sync. Single-operation commit.
    pub fn delete_entity(
        store: &mut ProvenanceStore,
        mirror: &mut GraphMirror,
        id: &str,
    ) -> Result<()> {
        store.delete_entity(id)?;
        mirror.remove_node(id);
        debug!(entity = id, "entity deleted with cascade");
        Ok(())
    }

    /// Delete an activity with cascading relation cleanup.
    pub fn delete_activity(
        store: &mut ProvenanceStore,
        mirror: &mut GraphMirror,
        id: &str,
    ) -> Result<()> {
        store.delete_activity(id)?;
        mirror.remove_node(id);
        debug!(activity = id, "activity deleted with cascade");
        Ok(())
    }

    /// Delete an agent with cascading relation cleanup.
    pub fn delete_agent(
        store: &mut ProvenanceStore,
        mirror: &mut GraphMirror,
        id: &str,
    ) -> Result<()> {
        store.delete_agent(id)?;
        mirror.remove_node(id);
        debug!(agent = id, "agent deleted with cascade");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn fresh() -> (ProvenanceStore, GraphMirror) {
        (ProvenanceStore::new(), GraphMirror::new())
    }

    #[test]
    fn test_commit_applies_store_and_mirror() {
        let (mut store, mut mirror) = fresh();

        let mut writer = ProvenanceWriter::new();
        writer.insert_entity(Entity::new("out1"), InsertMode::IgnoreConflict);
        writer.insert_entity(Entity::new("in1"), InsertMode::IgnoreConflict);
        writer.insert_activity(Activity::new("act1", 0, 30_000).unwrap(), InsertMode::Strict);
        writer.insert_was_generated_by(WasGeneratedBy {
            entity_id: "out1".into(),
            activity_id: "act1".into(),
        });
        writer.insert_used(Used {
            activity_id: "act1".into(),
            entity_id: "in1".into(),
            role: "input".into(),
        });

        let counts = writer.commit(&mut store, &mut mirror).unwrap();
        assert_eq!(counts.entities, 2);
        assert_eq!(counts.activities, 1);
        assert_eq!(counts.was_generated_by, 1);
        assert_eq!(counts.used, 1);

        assert_eq!(store.record_count(), 3);
        assert_eq!(mirror.node_count(), 3);
        assert_eq!(mirror.edge_count(), 2);
    }

    #[test]
    fn test_failed_batch_leaves_no_trace() {
        let (mut store, mut mirror) = fresh();

        let mut writer = ProvenanceWriter::new();
        writer.insert_entity(Entity::new("e1"), InsertMode::Strict);
        writer.insert_activity(Activity::new("a1", 0, 1).unwrap(), InsertMode::Strict);
        writer.insert_was_generated_by(WasGeneratedBy {
            entity_id: "e1".into(),
            activity_id: "a1".into(),
        });
        // references an activity nobody inserted
        writer.insert_used(Used {
            activity_id: "phantom".into(),
            entity_id: "e1".into(),
            role: "input".into(),
        });

        let err = writer.commit(&mut store, &mut mirror).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ReferentialIntegrity);

        assert_eq!(store.record_count(), 0);
        assert_eq!(store.relation_count(), 0);
        assert_eq!(mirror.node_count(), 0);
        assert_eq!(mirror.edge_count(), 0);
    }

    #[test]
    fn test_rollback_preserves_preexisting_rows() {
        let (mut store, mut mirror) = fresh();

        let mut writer = ProvenanceWriter::new();
        writer.insert_entity(Entity::new("keep"), InsertMode::Strict);
        writer.commit(&mut store, &mut mirror).unwrap();

        let mut writer = ProvenanceWriter::new();
        writer.insert_entity(Entity::new("new"), InsertMode::Strict);
        // strict re-insert of "keep" conflicts
        writer.insert_entity(Entity::new("keep"), InsertMode::Strict);
        let err = writer.commit(&mut store, &mut mirror).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Conflict);

        assert!(store.has_entity("keep"));
        assert!(!store.has_entity("new"));
        assert!(mirror.has_node("keep"));
        assert!(!mirror.has_node("new"));
    }

    #[test]
    fn test_insert_or_ignore_does_not_count() {
        let (mut store, mut mirror) = fresh();

        let mut writer = ProvenanceWriter::new();
        writer.insert_entity(Entity::new("e1"), InsertMode::IgnoreConflict);
        writer.commit(&mut store, &mut mirror).unwrap();

        let mut writer = ProvenanceWriter::new();
        writer.insert_entity(Entity::new("e1"), InsertMode::IgnoreConflict);
        let counts = writer.commit(&mut store, &mut mirror).unwrap();
        assert_eq!(counts.entities, 0);
        assert_eq!(store.record_count(), 1);
        assert_eq!(mirror.node_count(), 1);
    }

    #[test]
    fn test_delete_entity_syncs_mirror() {
        let (mut store, mut mirror) = fresh();

        let mut writer = ProvenanceWriter::new();
        writer.insert_entity(Entity::new("e1"), InsertMode::Strict);
        writer.insert_activity(Activity::new("a1", 0, 1).unwrap(), InsertMode::Strict);
        writer.insert_was_generated_by(WasGeneratedBy {
            entity_id: "e1".into(),
            activity_id: "a1".into(),
        });
        writer.commit(&mut store, &mut mirror).unwrap();

        ProvenanceWriter::delete_entity(&mut store, &mut mirror, "e1").unwrap();
        assert!(!store.has_entity("e1"));
        assert_eq!(store.relation_count(), 0);
        assert!(!mirror.has_node("e1"));
        assert_eq!(mirror.edge_count(), 0);
    }
}
