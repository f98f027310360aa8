//! Graph Query Functions - Named, versioned, parameterized traversal procedures.
//!
//! A fixed library of query procedures keyed by a stable name plus a version
//! suffix (`entity_lineage_v1`). Each procedure takes exactly one structured
//! JSON parameter object, deserialized into a typed parameter struct before
//! any graph access, and returns one JSON result with a `{nodes, edges}`
//! shape. Caller input is never spliced into query text — there is no query
//! text — so graph-query injection is impossible by construction, and
//! behavior changes ship as a new version suffix instead of mutating an
//! existing procedure under its callers.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//!
//! let registry = QueryRegistry::with_builtins();
//! let result = registry.run(
//!     &snapshot,
//!     "entity_lineage_v1",
//!     json!({"entityId": "out1", "maxDepth": 5}),
//! )?;
//! ```

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{ProvError, Result};
use crate::graph::GraphMirror;
use crate::lineage::{common_ancestors, entity_descendants, entity_lineage, LineageConfig};
use crate::model::NodeKind;
use crate::normalize::{normalize_rows, RawEdge, RawVertex};
use crate::store::ProvenanceStore;

/// Read-only view a query procedure executes against.
pub struct QuerySnapshot<'a> {
    /// Authoritative relational tables.
    pub store: &'a ProvenanceStore,
    /// Derived graph projection.
    pub mirror: &'a GraphMirror,
    /// Traversal depth bounds.
    pub lineage: &'a LineageConfig,
}

/// A named, versioned graph query procedure.
pub trait GraphQueryFn: Send + Sync {
    /// Stable procedure name including the version suffix.
    fn name(&self) -> &'static str;

    /// Execute against a read snapshot with one JSON parameter object.
    fn run(&self, snapshot: &QuerySnapshot<'_>, params: &Value) -> Result<Value>;
}

/// Registry of the available query procedures.
pub struct QueryRegistry {
    functions: HashMap<&'static str, Box<dyn GraphQueryFn>>,
}

impl QueryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Create a registry with the built-in procedures registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(EntityLineageV1));
        registry.register(Box::new(EntityDescendantsV1));
        registry.register(Box::new(CommonAncestorsV1));
        registry.register(Box::new(ProvGraphV1));
        registry
    }

    /// Register a procedure under its name.
    pub fn register(&mut self, function: Box<dyn GraphQueryFn>) {
        self.functions.insert(function.name(), function);
    }

    /// Names of all registered procedures.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Run the named procedure with the given parameter object.
    pub fn run(&self, snapshot: &QuerySnapshot<'_>, name: &str, params: Value) -> Result<Value> {
        let function = self.functions.get(name).ok_or_else(|| {
            ProvError::NotFound(format!("graph query function '{}' is not registered", name))
        })?;
        debug!(procedure = name, "running graph query function");
        function.run(snapshot, &params)
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ---------------------------------------------------------------------------
// entity_lineage_v1
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityLineageParams {
    entity_id: String,
    #[serde(default)]
    max_depth: Option<u32>,
}

/// Backward lineage traversal for one entity.
///
/// Parameters: `{entityId: string, maxDepth?: int}`. Result:
/// `{nodes: [{id, kind}], edges: [{from, to, label}]}`.
struct EntityLineageV1;

impl GraphQueryFn for EntityLineageV1 {
    fn name(&self) -> &'static str {
        "entity_lineage_v1"
    }

    fn run(&self, snapshot: &QuerySnapshot<'_>, params: &Value) -> Result<Value> {
        let params: EntityLineageParams =
            serde_json::from_value(params.clone()).map_err(|e| {
                ProvError::Validation(format!("invalid parameters for '{}': {}", self.name(), e))
            })?;

        let result = entity_lineage(
            snapshot.mirror,
            snapshot.lineage,
            &params.entity_id,
            params.max_depth,
        )?;
        Ok(serde_json::to_value(result)?)
    }
}

// ---------------------------------------------------------------------------
// entity_descendants_v1
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntityDescendantsParams {
    entity_id: String,
    #[serde(default)]
    max_depth: Option<u32>,
}

/// Forward traversal: everything downstream of one entity.
///
/// Parameters: `{entityId: string, maxDepth?: int}`.
struct EntityDescendantsV1;

impl GraphQueryFn for EntityDescendantsV1 {
    fn name(&self) -> &'static str {
        "entity_descendants_v1"
    }

    fn run(&self, snapshot: &QuerySnapshot<'_>, params: &Value) -> Result<Value> {
        let params: EntityDescendantsParams =
            serde_json::from_value(params.clone()).map_err(|e| {
                ProvError::Validation(format!("invalid parameters for '{}': {}", self.name(), e))
            })?;

        let result = entity_descendants(
            snapshot.mirror,
            snapshot.lineage,
            &params.entity_id,
            params.max_depth,
        )?;
        Ok(serde_json::to_value(result)?)
    }
}

// ---------------------------------------------------------------------------
// common_ancestors_v1
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommonAncestorsParams {
    entity_id_1: String,
    entity_id_2: String,
    #[serde(default)]
    max_depth: Option<u32>,
}

/// Ancestors shared by two entities, the pair itself excluded.
///
/// Parameters: `{entityId1: string, entityId2: string, maxDepth?: int}`.
struct CommonAncestorsV1;

impl GraphQueryFn for CommonAncestorsV1 {
    fn name(&self) -> &'static str {
        "common_ancestors_v1"
    }

    fn run(&self, snapshot: &QuerySnapshot<'_>, params: &Value) -> Result<Value> {
        let params: CommonAncestorsParams =
            serde_json::from_value(params.clone()).map_err(|e| {
                ProvError::Validation(format!("invalid parameters for '{}': {}", self.name(), e))
            })?;

        let result = common_ancestors(
            snapshot.mirror,
            snapshot.lineage,
            &params.entity_id_1,
            &params.entity_id_2,
            params.max_depth,
        )?;
        Ok(serde_json::to_value(result)?)
    }
}

// ---------------------------------------------------------------------------
// prov_graph_v1
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_max_items() -> usize {
    200
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProvGraphParams {
    #[serde(default = "default_true")]
    include_entities: bool,
    #[serde(default = "default_true")]
    include_activities: bool,
    #[serde(default = "default_true")]
    include_agents: bool,
    #[serde(default = "default_max_items")]
    max_items_per_type: usize,
}

/// Whole-graph snapshot in the normalized `{nodes, edges}` shape, bounded
/// per record type. Feeds graph visualization.
struct ProvGraphV1;

impl GraphQueryFn for ProvGraphV1 {
    fn name(&self) -> &'static str {
        "prov_graph_v1"
    }

    fn run(&self, snapshot: &QuerySnapshot<'_>, params: &Value) -> Result<Value> {
        let params: ProvGraphParams = serde_json::from_value(params.clone()).map_err(|e| {
            ProvError::Validation(format!("invalid parameters for '{}': {}", self.name(), e))
        })?;
        if params.max_items_per_type == 0 {
            return Err(ProvError::Validation(
                "maxItemsPerType must be at least 1".to_string(),
            ));
        }
        let max = params.max_items_per_type;

        let mut internal_id: u64 = 0;
        let mut next_id = || {
            internal_id += 1;
            internal_id
        };

        let mut vertices: Vec<RawVertex> = Vec::new();
        let include_kind = |kind: NodeKind| match kind {
            NodeKind::Entity => params.include_entities,
            NodeKind::Activity => params.include_activities,
            NodeKind::Agent => params.include_agents,
        };

        for kind in [NodeKind::Entity, NodeKind::Activity, NodeKind::Agent] {
            if !include_kind(kind) {
                continue;
            }
            for node in snapshot
                .mirror
                .nodes()
                .filter(|n| n.kind == kind)
                .take(max)
            {
                let mut properties = Map::new();
                properties.insert("id".to_string(), json!(node.id));
                if let Some(label) = &node.label {
                    properties.insert("label".to_string(), json!(label));
                }
                vertices.push(RawVertex {
                    internal_id: next_id(),
                    labels: vec![node.kind.as_str().to_string()],
                    properties,
                });
            }
        }

        let mut edges: Vec<RawEdge> = Vec::new();
        for edge in snapshot.mirror.edges().take(max.saturating_mul(6)) {
            let mut properties = Map::new();
            if let Some(role) = &edge.role {
                properties.insert("role".to_string(), json!(role));
            }
            edges.push(RawEdge {
                internal_id: next_id(),
                start: edge.from.clone(),
                end: edge.to.clone(),
                label: Some(edge.kind.label().to_string()),
                properties,
            });
        }

        let (nodes, edges) = normalize_rows(&vertices, &edges);
        Ok(json!({ "nodes": nodes, "edges": edges }))
    }
}
