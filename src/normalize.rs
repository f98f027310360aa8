//! Result Normalizer - Graph-engine records to the stable `{nodes, edges}` shape.
//!
//! Graph engines return vertices and edges carrying internal numeric ids,
//! label arrays, and open property maps. Callers (visualization, lineage
//! consumers) get a flat, stable contract instead: [`NormalizedNode`] with
//! `id`/`label`/`group` and [`NormalizedEdge`] with `from`/`to`/`label`.
//! Missing optional fields degrade gracefully — a node with no label falls
//! back to its identifier string.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A raw vertex record as produced by a graph engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawVertex {
    /// Engine-internal vertex id.
    pub internal_id: u64,
    /// Type labels attached to the vertex (first label is primary).
    #[serde(default)]
    pub labels: Vec<String>,
    /// Open property map; the row identifier lives under `"id"`.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A raw edge record as produced by a graph engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEdge {
    /// Engine-internal edge id.
    pub internal_id: u64,
    /// Row identifier of the source vertex.
    pub start: String,
    /// Row identifier of the target vertex.
    pub end: String,
    /// Edge type label.
    #[serde(default)]
    pub label: Option<String>,
    /// Open property map (e.g. a usage `role`).
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Application-facing node shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedNode {
    /// Row identifier.
    pub id: String,
    /// Display label; the identifier when the record had none.
    pub label: String,
    /// Lowercased primary type label, `"unknown"` when absent.
    pub group: String,
}

/// Application-facing edge shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEdge {
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    /// Edge label; empty labels are omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

fn string_property(properties: &Map<String, Value>, key: &str) -> Option<String> {
    properties.get(key).and_then(|v| match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Normalize a raw vertex.
///
/// The row identifier is read from the `"id"` property, falling back to the
/// engine-internal id when the property is absent.
pub fn normalize_vertex(vertex: &RawVertex) -> NormalizedNode {
    let id = string_property(&vertex.properties, "id")
        .unwrap_or_else(|| vertex.internal_id.to_string());
    let label = string_property(&vertex.properties, "label")
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| id.clone());
    let group = vertex
        .labels
        .first()
        .map(|l| l.to_lowercase())
        .unwrap_or_else(|| "unknown".to_string());

    NormalizedNode { id, label, group }
}

/// Normalize a raw edge. The `role` property, when present, overrides the
/// type label so that usage edges display their role.
pub fn normalize_edge(edge: &RawEdge) -> NormalizedEdge {
    let label = string_property(&edge.properties, "role")
        .or_else(|| edge.label.clone())
        .filter(|l| !l.is_empty());

    NormalizedEdge {
        from: edge.start.clone(),
        to: edge.end.clone(),
        label,
    }
}

/// Normalize a stream of vertex and edge records into the `{nodes, edges}`
/// contract, deduplicating nodes by id and edges by (from, to, label).
pub fn normalize_rows(
    vertices: &[RawVertex],
    edges: &[RawEdge],
) -> (Vec<NormalizedNode>, Vec<NormalizedEdge>) {
    let mut seen_nodes = std::collections::HashSet::new();
    let mut nodes = Vec::new();
    for vertex in vertices {
        let node = normalize_vertex(vertex);
        if seen_nodes.insert(node.id.clone()) {
            nodes.push(node);
        }
    }

    let mut seen_edges = std::collections::HashSet::new();
    let mut out_edges = Vec::new();
    for edge in edges {
        let normalized = normalize_edge(edge);
        let key = (
            normalized.from.clone(),
            normalized.to.clone(),
            normalized.label.clone(),
        );
        if seen_edges.insert(key) {
            out_edges.push(normalized);
        }
    }

    (nodes, out_edges)
}
