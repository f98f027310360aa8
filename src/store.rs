//! Provenance Store - Authoritative relational-style storage.
//!
//! Holds the three record tables (entities, activities, agents) and the six
//! relation tables, enforcing the referential constraints the schema would
//! carry in a relational database:
//!
//! - relation inserts fail when either endpoint row is absent,
//! - deleting a record cascades to every relation row referencing it,
//! - primary-key collisions are either rejected ([`InsertMode::Strict`]) or
//!   skipped ([`InsertMode::IgnoreConflict`]).
//!
//! The store is the single source of truth; the graph mirror in
//! [`graph`](crate::graph) is a derived projection and is rebuilt from the
//! store on load. Application code never mutates the store directly — all
//! writes go through the [`ProvenanceWriter`](crate::writer::ProvenanceWriter)
//! so the mirror stays consistent.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::{ProvError, Result};
use crate::model::{
    Activity, Agent, Entity, InsertMode, Used, WasAssociatedWith, WasAttributedTo, WasDerivedFrom,
    WasGeneratedBy, WasInformedBy,
};

/// Relational-style provenance tables with referential integrity.
///
/// Relation rows are kept in insertion order; composite-key uniqueness is
/// tracked by side indexes that are rebuilt after deserialization.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProvenanceStore {
    entities: HashMap<String, Entity>,
    activities: HashMap<String, Activity>,
    agents: HashMap<String, Agent>,

    was_generated_by: Vec<WasGeneratedBy>,
    used: Vec<Used>,
    was_attributed_to: Vec<WasAttributedTo>,
    was_associated_with: Vec<WasAssociatedWith>,
    was_informed_by: Vec<WasInformedBy>,
    was_derived_from: Vec<WasDerivedFrom>,

    // Composite-PK indexes, (left id, right id) per table. Not serialized;
    // rebuilt by `rebuild_indexes` after load.
    #[serde(skip)]
    wgb_keys: HashSet<(String, String)>,
    #[serde(skip)]
    used_keys: HashSet<(String, String)>,
    #[serde(skip)]
    wat_keys: HashSet<(String, String)>,
    #[serde(skip)]
    waw_keys: HashSet<(String, String)>,
    #[serde(skip)]
    wib_keys: HashSet<(String, String)>,
    #[serde(skip)]
    wdf_keys: HashSet<(String, String)>,
}

impl ProvenanceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the composite-key indexes from the relation rows.
    ///
    /// Must be called after deserializing a store from disk.
    pub(crate) fn rebuild_indexes(&mut self) {
        self.wgb_keys = self
            .was_generated_by
            .iter()
            .map(|r| (r.entity_id.clone(), r.activity_id.clone()))
            .collect();
        self.used_keys = self
            .used
            .iter()
            .map(|r| (r.activity_id.clone(), r.entity_id.clone()))
            .collect();
        self.wat_keys = self
            .was_attributed_to
            .iter()
            .map(|r| (r.entity_id.clone(), r.agent_id.clone()))
            .collect();
        self.waw_keys = self
            .was_associated_with
            .iter()
            .map(|r| (r.activity_id.clone(), r.agent_id.clone()))
            .collect();
        self.wib_keys = self
            .was_informed_by
            .iter()
            .map(|r| (r.informed_id.clone(), r.informer_id.clone()))
            .collect();
        self.wdf_keys = self
            .was_derived_from
            .iter()
            .map(|r| (r.entity_id.clone(), r.source_entity_id.clone()))
            .collect();
    }

    // ------------------------------------------------------------------
    // Record tables
    // ------------------------------------------------------------------

    /// Insert an entity. Returns `true` if a row was inserted, `false` if an
    /// existing row was kept under [`InsertMode::IgnoreConflict`].
    pub(crate) fn insert_entity(&mut self, entity: Entity, mode: InsertMode) -> Result<bool> {
        if self.entities.contains_key(&entity.id) {
            return match mode {
                InsertMode::Strict => Err(ProvError::Conflict(format!(
                    "entity '{}' already exists",
                    entity.id
                ))),
                InsertMode::IgnoreConflict => Ok(false),
            };
        }
        self.entities.insert(entity.id.clone(), entity);
        Ok(true)
    }

    /// Insert an activity.
    pub(crate) fn insert_activity(&mut self, activity: Activity, mode: InsertMode) -> Result<bool> {
        if self.activities.contains_key(&activity.id) {
            return match mode {
                InsertMode::Strict => Err(ProvError::Conflict(format!(
                    "activity '{}' already exists",
                    activity.id
                ))),
                InsertMode::IgnoreConflict => Ok(false),
            };
        }
        self.activities.insert(activity.id.clone(), activity);
        Ok(true)
    }

    /// Insert an agent.
    pub(crate) fn insert_agent(&mut self, agent: Agent, mode: InsertMode) -> Result<bool> {
        if self.agents.contains_key(&agent.id) {
            return match mode {
                InsertMode::Strict => Err(ProvError::Conflict(format!(
                    "agent '{}' already exists",
                    agent.id
                ))),
                InsertMode::IgnoreConflict => Ok(false),
            };
        }
        self.agents.insert(agent.id.clone(), agent);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Relation tables
    // ------------------------------------------------------------------

    fn require_entity(&self, id: &str) -> Result<()> {
        if !self.entities.contains_key(id) {
            return Err(ProvError::ReferentialIntegrity(format!(
                "entity '{}' does not exist",
                id
            )));
        }
        Ok(())
    }

    fn require_activity(&self, id: &str) -> Result<()> {
        if !self.activities.contains_key(id) {
            return Err(ProvError::ReferentialIntegrity(format!(
                "activity '{}' does not exist",
                id
            )));
        }
        Ok(())
    }

    fn require_agent(&self, id: &str) -> Result<()> {
        if !self.agents.contains_key(id) {
            return Err(ProvError::ReferentialIntegrity(format!(
                "agent '{}' does not exist",
                id
            )));
        }
        Ok(())
    }

    fn duplicate(table: &str, left: &str, right: &str) -> ProvError {
        ProvError::Conflict(format!("{}({}, {}) already exists", table, left, right))
    }

    /// Insert a generation row (entity produced by activity).
    pub(crate) fn insert_was_generated_by(
        &mut self,
        row: WasGeneratedBy,
        mode: InsertMode,
    ) -> Result<bool> {
        self.require_entity(&row.entity_id)?;
        self.require_activity(&row.activity_id)?;
        let key = (row.entity_id.clone(), row.activity_id.clone());
        if self.wgb_keys.contains(&key) {
            return match mode {
                InsertMode::Strict => Err(Self::duplicate("was_generated_by", &key.0, &key.1)),
                InsertMode::IgnoreConflict => Ok(false),
            };
        }
        self.wgb_keys.insert(key);
        self.was_generated_by.push(row);
        Ok(true)
    }

    /// Insert a usage row (activity consumed entity in a role).
    pub(crate) fn insert_used(&mut self, row: Used, mode: InsertMode) -> Result<bool> {
        self.require_activity(&row.activity_id)?;
        self.require_entity(&row.entity_id)?;
        let key = (row.activity_id.clone(), row.entity_id.clone());
        if self.used_keys.contains(&key) {
            return match mode {
                InsertMode::Strict => Err(Self::duplicate("used", &key.0, &key.1)),
                InsertMode::IgnoreConflict => Ok(false),
            };
        }
        self.used_keys.insert(key);
        self.used.push(row);
        Ok(true)
    }

    /// Insert an attribution row (entity attributed to agent).
    pub(crate) fn insert_was_attributed_to(
        &mut self,
        row: WasAttributedTo,
        mode: InsertMode,
    ) -> Result<bool> {
        self.require_entity(&row.entity_id)?;
        self.require_agent(&row.agent_id)?;
        let key = (row.entity_id.clone(), row.agent_id.clone());
        if self.wat_keys.contains(&key) {
            return match mode {
                InsertMode::Strict => Err(Self::duplicate("was_attributed_to", &key.0, &key.1)),
                InsertMode::IgnoreConflict => Ok(false),
            };
        }
        self.wat_keys.insert(key);
        self.was_attributed_to.push(row);
        Ok(true)
    }

    /// Insert an association row (agent participated in activity).
    pub(crate) fn insert_was_associated_with(
        &mut self,
        row: WasAssociatedWith,
        mode: InsertMode,
    ) -> Result<bool> {
        self.require_activity(&row.activity_id)?;
        self.require_agent(&row.agent_id)?;
        let key = (row.activity_id.clone(), row.agent_id.clone());
        if self.waw_keys.contains(&key) {
            return match mode {
                InsertMode::Strict => Err(Self::duplicate("was_associated_with", &key.0, &key.1)),
                InsertMode::IgnoreConflict => Ok(false),
            };
        }
        self.waw_keys.insert(key);
        self.was_associated_with.push(row);
        Ok(true)
    }

    /// Insert a communication row (informed activity <- informer activity).
    pub(crate) fn insert_was_informed_by(
        &mut self,
        row: WasInformedBy,
        mode: InsertMode,
    ) -> Result<bool> {
        self.require_activity(&row.informed_id)?;
        self.require_activity(&row.informer_id)?;
        let key = (row.informed_id.clone(), row.informer_id.clone());
        if self.wib_keys.contains(&key) {
            return match mode {
                InsertMode::Strict => Err(Self::duplicate("was_informed_by", &key.0, &key.1)),
                InsertMode::IgnoreConflict => Ok(false),
            };
        }
        self.wib_keys.insert(key);
        self.was_informed_by.push(row);
        Ok(true)
    }

    /// Insert a derivation row (entity derived from source entity).
    pub(crate) fn insert_was_derived_from(
        &mut self,
        row: WasDerivedFrom,
        mode: InsertMode,
    ) -> Result<bool> {
        self.require_entity(&row.entity_id)?;
        self.require_entity(&row.source_entity_id)?;
        let key = (row.entity_id.clone(), row.source_entity_id.clone());
        if self.wdf_keys.contains(&key) {
            return match mode {
                InsertMode::Strict => Err(Self::duplicate("was_derived_from", &key.0, &key.1)),
                InsertMode::IgnoreConflict => Ok(false),
            };
        }
        self.wdf_keys.insert(key);
        self.was_derived_from.push(row);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Cascading deletes
    // ------------------------------------------------------------------

    /// Delete an entity and every relation row referencing it.
    pub(crate) fn delete_entity(&mut self, id: &str) -> Result<()> {
        if self.entities.remove(id).is_none() {
            return Err(ProvError::NotFound(format!("entity '{}' not found", id)));
        }
        self.was_generated_by.retain(|r| r.entity_id != id);
        self.used.retain(|r| r.entity_id != id);
        self.was_attributed_to.retain(|r| r.entity_id != id);
        self.was_derived_from
            .retain(|r| r.entity_id != id && r.source_entity_id != id);
        self.wgb_keys.retain(|(e, _)| e != id);
        self.used_keys.retain(|(_, e)| e != id);
        self.wat_keys.retain(|(e, _)| e != id);
        self.wdf_keys.retain(|(e, s)| e != id && s != id);
        Ok(())
    }

    /// Delete an activity and every relation row referencing it.
    pub(crate) fn delete_activity(&mut self, id: &str) -> Result<()> {
        if self.activities.remove(id).is_none() {
            return Err(ProvError::NotFound(format!("activity '{}' not found", id)));
        }
        self.was_generated_by.retain(|r| r.activity_id != id);
        self.used.retain(|r| r.activity_id != id);
        self.was_associated_with.retain(|r| r.activity_id != id);
        self.was_informed_by
            .retain(|r| r.informed_id != id && r.informer_id != id);
        self.wgb_keys.retain(|(_, a)| a != id);
        self.used_keys.retain(|(a, _)| a != id);
        self.waw_keys.retain(|(a, _)| a != id);
        self.wib_keys.retain(|(l, r)| l != id && r != id);
        Ok(())
    }

    /// Delete an agent and every relation row referencing it.
    pub(crate) fn delete_agent(&mut self, id: &str) -> Result<()> {
        if self.agents.remove(id).is_none() {
            return Err(ProvError::NotFound(format!("agent '{}' not found", id)));
        }
        self.was_attributed_to.retain(|r| r.agent_id != id);
        self.was_associated_with.retain(|r| r.agent_id != id);
        self.wat_keys.retain(|(_, a)| a != id);
        self.waw_keys.retain(|(_, a)| a != id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Row-level removal (transaction rollback only)
    // ------------------------------------------------------------------
    //
    // These undo a single insert from the current transaction without the
    // cascade semantics of the public deletes. A record row removed here was
    // inserted in the same transaction and can have picked up relation rows
    // only from later staged ops, which the writer rolls back first.

    pub(crate) fn remove_entity_row(&mut self, id: &str) {
        self.entities.remove(id);
    }

    pub(crate) fn remove_activity_row(&mut self, id: &str) {
        self.activities.remove(id);
    }

    pub(crate) fn remove_agent_row(&mut self, id: &str) {
        self.agents.remove(id);
    }

    pub(crate) fn remove_was_generated_by_row(&mut self, entity_id: &str, activity_id: &str) {
        if self
            .wgb_keys
            .remove(&(entity_id.to_string(), activity_id.to_string()))
        {
            self.was_generated_by
                .retain(|r| !(r.entity_id == entity_id && r.activity_id == activity_id));
        }
    }

    pub(crate) fn remove_used_row(&mut self, activity_id: &str, entity_id: &str) {
        if self
            .used_keys
            .remove(&(activity_id.to_string(), entity_id.to_string()))
        {
            self.used
                .retain(|r| !(r.activity_id == activity_id && r.entity_id == entity_id));
        }
    }

    pub(crate) fn remove_was_attributed_to_row(&mut self, entity_id: &str, agent_id: &str) {
        if self
            .wat_keys
            .remove(&(entity_id.to_string(), agent_id.to_string()))
        {
            self.was_attributed_to
                .retain(|r| !(r.entity_id == entity_id && r.agent_id == agent_id));
        }
    }

    pub(crate) fn remove_was_associated_with_row(&mut self, activity_id: &str, agent_id: &str) {
        if self
            .waw_keys
            .remove(&(activity_id.to_string(), agent_id.to_string()))
        {
            self.was_associated_with
                .retain(|r| !(r.activity_id == activity_id && r.agent_id == agent_id));
        }
    }

    pub(crate) fn remove_was_informed_by_row(&mut self, informed_id: &str, informer_id: &str) {
        if self
            .wib_keys
            .remove(&(informed_id.to_string(), informer_id.to_string()))
        {
            self.was_informed_by
                .retain(|r| !(r.informed_id == informed_id && r.informer_id == informer_id));
        }
    }

    pub(crate) fn remove_was_derived_from_row(&mut self, entity_id: &str, source_entity_id: &str) {
        if self
            .wdf_keys
            .remove(&(entity_id.to_string(), source_entity_id.to_string()))
        {
            self.was_derived_from
                .retain(|r| !(r.entity_id == entity_id && r.source_entity_id == source_entity_id));
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Look up an entity by id.
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Look up an activity by id.
    pub fn activity(&self, id: &str) -> Option<&Activity> {
        self.activities.get(id)
    }

    /// Look up an agent by id.
    pub fn agent(&self, id: &str) -> Option<&Agent> {
        self.agents.get(id)
    }

    /// Whether an entity row exists.
    pub fn has_entity(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Whether an activity row exists.
    pub fn has_activity(&self, id: &str) -> bool {
        self.activities.contains_key(id)
    }

    /// Whether an agent row exists.
    pub fn has_agent(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    /// Iterate all entities.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Iterate all activities.
    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.values()
    }

    /// Iterate all agents.
    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// All generation rows.
    pub fn was_generated_by(&self) -> &[WasGeneratedBy] {
        &self.was_generated_by
    }

    /// All usage rows.
    pub fn used(&self) -> &[Used] {
        &self.used
    }

    /// All attribution rows.
    pub fn was_attributed_to(&self) -> &[WasAttributedTo] {
        &self.was_attributed_to
    }

    /// All association rows.
    pub fn was_associated_with(&self) -> &[WasAssociatedWith] {
        &self.was_associated_with
    }

    /// All communication rows.
    pub fn was_informed_by(&self) -> &[WasInformedBy] {
        &self.was_informed_by
    }

    /// All derivation rows.
    pub fn was_derived_from(&self) -> &[WasDerivedFrom] {
        &self.was_derived_from
    }

    /// Generation rows whose entity is one of `ids`.
    pub fn generated_by_for_entities(&self, ids: &HashSet<String>) -> Vec<&WasGeneratedBy> {
        self.was_generated_by
            .iter()
            .filter(|r| ids.contains(&r.entity_id))
            .collect()
    }

    /// Usage rows whose entity is one of `ids`.
    pub fn used_for_entities(&self, ids: &HashSet<String>) -> Vec<&Used> {
        self.used
            .iter()
            .filter(|r| ids.contains(&r.entity_id))
            .collect()
    }

    /// Total number of record rows (entities + activities + agents).
    pub fn record_count(&self) -> usize {
        self.entities.len() + self.activities.len() + self.agents.len()
    }

    /// Total number of relation rows across all six tables.
    pub fn relation_count(&self) -> usize {
        self.was_generated_by.len()
            + self.used.len()
            + self.was_attributed_to.len()
            + self.was_associated_with.len()
            + self.was_informed_by.len()
            + self.was_derived_from.len()
    }
}
