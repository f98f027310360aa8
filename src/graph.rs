//! Graph Mirror - Derived property-graph projection of the provenance store.
//!
//! Every entity/activity/agent row has a corresponding node keyed by the same
//! identifier, and every relation row a typed edge. The mirror supports the
//! pattern the lineage resolver needs: adjacency lookups in both directions
//! with the relation kind attached.
//!
//! The mirror is derived state. The store is authoritative; all mutators here
//! are `pub(crate)` and are invoked only by the synchronization mechanism
//! ([`ProvenanceWriter`](crate::writer::ProvenanceWriter)) or by the rebuild
//! path when a database is loaded from disk. Application code reads, never
//! writes.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{ProvError, Result};
use crate::model::{NodeKind, RelationKind};
use crate::store::ProvenanceStore;

/// Fixed name the mirrored graph is addressable under.
pub const GRAPH_NAME: &str = "prov";

/// A node in the mirror, keyed by the row identifier it mirrors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    /// Row identifier (same key as the relational table).
    pub id: String,
    /// Primary type label.
    pub kind: NodeKind,
    /// Display label, if the row carries one.
    pub label: Option<String>,
}

/// A typed edge in the mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    /// Relation kind the edge mirrors.
    pub kind: RelationKind,
    /// Role property, carried by usage and association edges.
    pub role: Option<String>,
}

/// Direction of an edge relative to a node during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    /// The node is the edge's source.
    Outgoing,
    /// The node is the edge's target.
    Incoming,
}

/// Property graph mirroring the provenance store.
#[derive(Debug, Default)]
pub struct GraphMirror {
    nodes: HashMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    edge_keys: HashSet<(String, String, RelationKind)>,
    /// node id -> indices into `edges` where the node is the source
    outgoing: HashMap<String, Vec<usize>>,
    /// node id -> indices into `edges` where the node is the target
    incoming: HashMap<String, Vec<usize>>,
}

impl GraphMirror {
    /// Create an empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the whole mirror from the authoritative store.
    ///
    /// Used when loading a database file: only the store is persisted, the
    /// mirror is a projection.
    pub(crate) fn rebuild_from(store: &ProvenanceStore) -> Self {
        let mut mirror = Self::new();

        for e in store.entities() {
            mirror.put_node(GraphNode {
                id: e.id.clone(),
                kind: NodeKind::Entity,
                label: e.label.clone(),
            });
        }
        for a in store.activities() {
            mirror.put_node(GraphNode {
                id: a.id.clone(),
                kind: NodeKind::Activity,
                label: Some(a.label.clone()),
            });
        }
        for ag in store.agents() {
            mirror.put_node(GraphNode {
                id: ag.id.clone(),
                kind: NodeKind::Agent,
                label: Some(ag.label.clone()),
            });
        }

        // Relation rows always reference existing records in a consistent
        // store, so these inserts cannot fail.
        for r in store.was_generated_by() {
            let _ = mirror.put_edge(&r.entity_id, &r.activity_id, RelationKind::WasGeneratedBy, None);
        }
        for r in store.used() {
            let _ = mirror.put_edge(
                &r.activity_id,
                &r.entity_id,
                RelationKind::Used,
                Some(r.role.clone()),
            );
        }
        for r in store.was_attributed_to() {
            let _ = mirror.put_edge(&r.entity_id, &r.agent_id, RelationKind::WasAttributedTo, None);
        }
        for r in store.was_associated_with() {
            let _ = mirror.put_edge(
                &r.activity_id,
                &r.agent_id,
                RelationKind::WasAssociatedWith,
                r.role.clone(),
            );
        }
        for r in store.was_informed_by() {
            let _ = mirror.put_edge(&r.informed_id, &r.informer_id, RelationKind::WasInformedBy, None);
        }
        for r in store.was_derived_from() {
            let _ = mirror.put_edge(
                &r.entity_id,
                &r.source_entity_id,
                RelationKind::WasDerivedFrom,
                None,
            );
        }

        mirror
    }

    // ------------------------------------------------------------------
    // Mutation (crate-internal; only the writer and rebuild path call these)
    // ------------------------------------------------------------------

    /// Insert or replace a node.
    pub(crate) fn put_node(&mut self, node: GraphNode) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Insert an edge. Fails with [`ProvError::SyncFailure`] when either
    /// endpoint node is missing — an edge must never be observable without
    /// its endpoints.
    pub(crate) fn put_edge(
        &mut self,
        from: &str,
        to: &str,
        kind: RelationKind,
        role: Option<String>,
    ) -> Result<()> {
        if !self.nodes.contains_key(from) {
            return Err(ProvError::SyncFailure(format!(
                "edge {} -> {} ({}): source node missing from mirror",
                from, to, kind
            )));
        }
        if !self.nodes.contains_key(to) {
            return Err(ProvError::SyncFailure(format!(
                "edge {} -> {} ({}): target node missing from mirror",
                from, to, kind
            )));
        }

        let key = (from.to_string(), to.to_string(), kind);
        if self.edge_keys.contains(&key) {
            // mirrored relation rows are unique; a repeat is a no-op
            return Ok(());
        }
        self.edge_keys.insert(key);

        let index = self.edges.len();
        self.edges.push(GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
            role,
        });
        self.outgoing.entry(from.to_string()).or_default().push(index);
        self.incoming.entry(to.to_string()).or_default().push(index);
        Ok(())
    }

    /// Remove an edge by its (from, to, kind) key.
    pub(crate) fn remove_edge(&mut self, from: &str, to: &str, kind: RelationKind) {
        let key = (from.to_string(), to.to_string(), kind);
        if self.edge_keys.remove(&key) {
            self.edges
                .retain(|e| !(e.from == from && e.to == to && e.kind == kind));
            self.reindex();
        }
    }

    /// Remove a node and detach every edge touching it.
    pub(crate) fn remove_node(&mut self, id: &str) {
        if self.nodes.remove(id).is_none() {
            return;
        }
        self.edges.retain(|e| e.from != id && e.to != id);
        self.edge_keys.retain(|(f, t, _)| f != id && t != id);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.outgoing.clear();
        self.incoming.clear();
        for (index, edge) in self.edges.iter().enumerate() {
            self.outgoing.entry(edge.from.clone()).or_default().push(index);
            self.incoming.entry(edge.to.clone()).or_default().push(index);
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Whether a node exists.
    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Iterate all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// Iterate all edges.
    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter()
    }

    /// Every edge touching `id`, with the neighbor id and the direction of
    /// the edge relative to `id`.
    pub fn neighbors<'a>(
        &'a self,
        id: &'a str,
    ) -> impl Iterator<Item = (&'a GraphEdge, &'a str, EdgeDirection)> + 'a {
        let out = self
            .outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&i| {
                let edge = &self.edges[i];
                (edge, edge.to.as_str(), EdgeDirection::Outgoing)
            });
        let inc = self
            .incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&i| {
                let edge = &self.edges[i];
                (edge, edge.from.as_str(), EdgeDirection::Incoming)
            });
        out.chain(inc)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
