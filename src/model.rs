//! Provenance Data Model
//!
//! W3C-PROV-style record types: entities, activities, agents, and the six
//! relation row types that connect them. These are the rows held by the
//! [`ProvenanceStore`](crate::store::ProvenanceStore); the graph mirror
//! projects them into nodes and edges keyed by the same identifiers.
//!
//! All records are immutable once ingested. Timestamps are epoch
//! milliseconds.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ProvError, Result};

/// Placeholder label for activities ingested without one.
pub const DEFAULT_ACTIVITY_LABEL: &str = "<Activity>";

/// Current time in epoch milliseconds.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// An immutable data artifact in the provenance graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Caller-assigned identifier (primary key).
    pub id: String,
    /// Optional display label.
    pub label: Option<String>,
    /// Open key/value metadata.
    #[serde(default)]
    pub metadata: Value,
    /// Creation timestamp (epoch ms).
    pub created_at: u64,
}

impl Entity {
    /// Create an entity with defaulted metadata and timestamp.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            metadata: Value::Object(Default::default()),
            created_at: now_ms(),
        }
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the metadata map.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A process instance that consumes and/or produces entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Caller-assigned identifier (primary key).
    pub id: String,
    /// Display label, defaulted to a placeholder.
    pub label: String,
    /// Start timestamp (epoch ms).
    pub started_at: u64,
    /// End timestamp (epoch ms). Invariant: `ended_at >= started_at`.
    pub ended_at: u64,
    /// Open key/value metadata.
    #[serde(default)]
    pub metadata: Value,
}

impl Activity {
    /// Create an activity, validating the time invariant.
    pub fn new(id: impl Into<String>, started_at: u64, ended_at: u64) -> Result<Self> {
        if ended_at < started_at {
            return Err(ProvError::Validation(format!(
                "activity ended_at ({}) precedes started_at ({})",
                ended_at, started_at
            )));
        }
        Ok(Self {
            id: id.into(),
            label: DEFAULT_ACTIVITY_LABEL.to_string(),
            started_at,
            ended_at,
            metadata: Value::Object(Default::default()),
        })
    }

    /// Set the display label. Empty labels keep the placeholder.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        if !label.is_empty() {
            self.label = label;
        }
        self
    }

    /// Set the metadata map.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// An actor attributed responsibility for entities/activities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// System-generated unique identifier.
    pub id: String,
    /// Display label.
    pub label: String,
    /// Open key/value metadata.
    #[serde(default)]
    pub metadata: Value,
    /// Creation timestamp (epoch ms).
    pub created_at: u64,
}

impl Agent {
    /// Create an agent with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            metadata: Value::Object(Default::default()),
            created_at: now_ms(),
        }
    }

    /// Create an agent with a generated UUID v4 identifier.
    pub fn generated() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// Set the display label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Set the metadata map.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The primary type of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// An entity node.
    Entity,
    /// An activity node.
    Activity,
    /// An agent node.
    Agent,
}

impl NodeKind {
    /// Human-readable kind name, as returned in lineage results.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Entity => "Entity",
            NodeKind::Activity => "Activity",
            NodeKind::Agent => "Agent",
        }
    }

    /// Lowercase group name used by normalized graph output.
    pub fn group(&self) -> &'static str {
        match self {
            NodeKind::Entity => "entity",
            NodeKind::Activity => "activity",
            NodeKind::Agent => "agent",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The six relation kinds of the provenance schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// Entity produced by activity.
    WasGeneratedBy,
    /// Activity consumed entity in a given role.
    Used,
    /// Entity attributed to agent.
    WasAttributedTo,
    /// Agent participated in activity.
    WasAssociatedWith,
    /// Causal activity-to-activity link (informed <- informer).
    WasInformedBy,
    /// Entity derived from a source entity.
    WasDerivedFrom,
}

impl RelationKind {
    /// Graph edge label for this relation kind.
    pub fn label(&self) -> &'static str {
        match self {
            RelationKind::WasGeneratedBy => "WAS_GENERATED_BY",
            RelationKind::Used => "USED",
            RelationKind::WasAttributedTo => "WAS_ATTRIBUTED_TO",
            RelationKind::WasAssociatedWith => "WAS_ASSOCIATED_WITH",
            RelationKind::WasInformedBy => "WAS_INFORMED_BY",
            RelationKind::WasDerivedFrom => "WAS_DERIVED_FROM",
        }
    }

    /// Whether edges of this kind represent data flow and belong in a
    /// lineage result. Attribution and association edges are structural.
    pub fn is_lineage(&self) -> bool {
        matches!(
            self,
            RelationKind::WasGeneratedBy | RelationKind::Used | RelationKind::WasDerivedFrom
        )
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// `was_generated_by(entity_id, activity_id)` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasGeneratedBy {
    /// Generated entity.
    pub entity_id: String,
    /// Generating activity.
    pub activity_id: String,
}

/// `used(activity_id, entity_id, role)` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Used {
    /// Consuming activity.
    pub activity_id: String,
    /// Consumed entity.
    pub entity_id: String,
    /// Role the entity played, defaulting to `"input"`.
    pub role: String,
}

impl Used {
    /// Default role for a used relation.
    pub const DEFAULT_ROLE: &'static str = "input";
}

/// `was_attributed_to(entity_id, agent_id)` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasAttributedTo {
    /// Attributed entity.
    pub entity_id: String,
    /// Responsible agent.
    pub agent_id: String,
}

/// `was_associated_with(activity_id, agent_id, role)` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasAssociatedWith {
    /// Activity the agent took part in.
    pub activity_id: String,
    /// Participating agent.
    pub agent_id: String,
    /// Optional participation role.
    pub role: Option<String>,
}

/// `was_informed_by(informed_id, informer_id)` row. Both sides are
/// activities; the informer causally precedes the informed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasInformedBy {
    /// Activity that received information.
    pub informed_id: String,
    /// Activity that supplied it.
    pub informer_id: String,
}

/// `was_derived_from(entity_id, source_entity_id)` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasDerivedFrom {
    /// Derived entity.
    pub entity_id: String,
    /// Source entity it was derived from.
    pub source_entity_id: String,
}

/// Conflict behavior for primary-key collisions on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Duplicate primary key is an error.
    Strict,
    /// Duplicate primary key is silently skipped (insert-or-ignore).
    IgnoreConflict,
}
