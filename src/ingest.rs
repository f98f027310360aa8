//! Ingestion Pipeline - Batch upload of one activity and its entities.
//!
//! Accepts a validated upload payload (a batch of role-tagged entities plus
//! one activity), derives the relation rows from each entity's role, and
//! commits the whole batch atomically through the provenance writer:
//!
//! - `"output"` entities get a generation row and an attribution row to the
//!   uploading agent,
//! - `"input"`, `"process"`, and any other role become usage rows with the
//!   role preserved,
//! - the activity is associated with the uploading agent,
//! - entities that already existed link the new activity to their prior
//!   generating/using activities through communication rows.
//!
//! Entity inserts are idempotent (insert-or-ignore); the activity insert is
//! strict, so re-uploading the same activity id fails with a conflict. On
//! any failure the batch rolls back and no partial provenance is visible.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info};

use crate::error::{ProvError, Result};
use crate::graph::GraphMirror;
use crate::model::{
    Activity, Agent, Entity, InsertMode, Used, WasAssociatedWith, WasAttributedTo, WasGeneratedBy,
    WasInformedBy,
};
use crate::store::ProvenanceStore;
use crate::writer::ProvenanceWriter;

/// Entity role within an upload batch.
pub mod role {
    /// Entity produced by the activity.
    pub const OUTPUT: &str = "output";
    /// Entity consumed by the activity.
    pub const INPUT: &str = "input";
    /// The process artifact (script, binary) that ran.
    pub const PROCESS: &str = "process";
}

/// One entity in an upload batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityInput {
    /// Caller-assigned entity identifier.
    pub id: String,
    /// Optional display label.
    #[serde(default)]
    pub label: Option<String>,
    /// Open metadata map.
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Role the entity played: `"output"`, `"input"`, `"process"`, or any
    /// other usage role. Omitted roles default to `"input"`.
    #[serde(default = "default_role")]
    pub role: String,
    /// Creation timestamp (epoch ms); defaults to now.
    #[serde(default)]
    pub created_at: Option<u64>,
}

fn default_role() -> String {
    Used::DEFAULT_ROLE.to_string()
}

/// The activity of an upload batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityInput {
    /// Caller-assigned activity identifier.
    pub id: String,
    /// Optional display label.
    #[serde(default)]
    pub label: Option<String>,
    /// Start timestamp (epoch ms).
    pub started_at: u64,
    /// End timestamp (epoch ms).
    pub ended_at: u64,
    /// Open metadata map.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// A full upload payload: entities plus the one activity connecting them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityUpload {
    /// Role-tagged entities.
    pub entities: Vec<EntityInput>,
    /// The activity that produced/consumed them.
    pub activity: ActivityInput,
}

/// Rows inserted by a successful upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCounts {
    /// New entity rows.
    pub entities: usize,
    /// New activity rows (always 1 on success).
    pub activities: usize,
    /// New association rows.
    pub was_associated_with: usize,
    /// New generation rows.
    pub was_generated_by: usize,
    /// New usage rows.
    pub used: usize,
    /// New communication rows inferred from pre-existing entities.
    pub was_informed_by: usize,
}

fn validate(input: &ActivityUpload) -> Result<()> {
    if input.activity.ended_at < input.activity.started_at {
        return Err(ProvError::Validation(format!(
            "activity '{}' ended_at ({}) precedes started_at ({})",
            input.activity.id, input.activity.ended_at, input.activity.started_at
        )));
    }

    let outputs = input
        .entities
        .iter()
        .filter(|e| e.role == role::OUTPUT)
        .count();
    if outputs == 0 {
        return Err(ProvError::Validation(
            "at least one output entity is required".to_string(),
        ));
    }

    let processes = input
        .entities
        .iter()
        .filter(|e| e.role == role::PROCESS)
        .count();
    if processes > 1 {
        return Err(ProvError::Validation(format!(
            "at most one process entity is allowed, got {}",
            processes
        )));
    }

    let mut seen = HashSet::new();
    for entity in &input.entities {
        if !seen.insert(entity.id.as_str()) {
            return Err(ProvError::Validation(format!(
                "duplicate entity id '{}' in batch",
                entity.id
            )));
        }
    }

    Ok(())
}

/// Ingest one upload batch atomically.
///
/// `agent_id` identifies the uploading caller; `None` creates a fresh agent
/// with a generated identifier. Returns the per-table inserted-row counts.
///
/// # Errors
///
/// - [`ProvError::Validation`] before any store access for a malformed batch.
/// - [`ProvError::Conflict`] when the activity id already exists.
/// - Any writer failure rolls back the whole batch.
pub fn upload_activity(
    store: &mut ProvenanceStore,
    mirror: &mut GraphMirror,
    input: &ActivityUpload,
    agent_id: Option<&str>,
) -> Result<UploadCounts> {
    validate(input)?;

    debug!(
        activity = %input.activity.id,
        entities = input.entities.len(),
        "ingesting activity batch"
    );

    // Pre-existing entities drive the informed-by inference below; snapshot
    // their relations before the batch mutates anything.
    let existing_ids: HashSet<String> = input
        .entities
        .iter()
        .filter(|e| store.has_entity(&e.id))
        .map(|e| e.id.clone())
        .collect();

    let mut writer = ProvenanceWriter::new();

    let agent = match agent_id {
        Some(id) => Agent::new(id),
        None => Agent::generated(),
    }
    .with_metadata(json!({"autoCreated": true}));
    let agent_key = agent.id.clone();
    writer.insert_agent(agent, InsertMode::IgnoreConflict);

    let process = input.entities.iter().find(|e| e.role == role::PROCESS);
    let label = match &input.activity.label {
        Some(l) if !l.is_empty() => l.clone(),
        _ => process
            .and_then(|p| p.label.as_ref())
            .map(|l| format!("Run {}", l))
            .unwrap_or_default(),
    };
    let mut activity = Activity::new(
        &input.activity.id,
        input.activity.started_at,
        input.activity.ended_at,
    )?
    .with_label(label);
    if let Some(metadata) = &input.activity.metadata {
        activity = activity.with_metadata(metadata.clone());
    }
    writer.insert_activity(activity, InsertMode::Strict);

    writer.insert_was_associated_with(WasAssociatedWith {
        activity_id: input.activity.id.clone(),
        agent_id: agent_key.clone(),
        role: None,
    });

    for entity_input in &input.entities {
        let mut entity = Entity::new(&entity_input.id);
        if let Some(label) = &entity_input.label {
            entity = entity.with_label(label.clone());
        }
        if let Some(metadata) = &entity_input.metadata {
            entity = entity.with_metadata(metadata.clone());
        }
        if let Some(created_at) = entity_input.created_at {
            entity.created_at = created_at;
        }
        writer.insert_entity(entity, InsertMode::IgnoreConflict);
    }

    for entity_input in &input.entities {
        if entity_input.role == role::OUTPUT {
            writer.insert_was_generated_by(WasGeneratedBy {
                entity_id: entity_input.id.clone(),
                activity_id: input.activity.id.clone(),
            });
            writer.insert_was_attributed_to(WasAttributedTo {
                entity_id: entity_input.id.clone(),
                agent_id: agent_key.clone(),
            });
        } else {
            writer.insert_used(Used {
                activity_id: input.activity.id.clone(),
                entity_id: entity_input.id.clone(),
                role: entity_input.role.clone(),
            });
        }
    }

    // Entities seen before connect this activity to the activities that
    // previously generated or used them.
    if !existing_ids.is_empty() {
        let mut informed: HashSet<String> = HashSet::new();
        for row in store.generated_by_for_entities(&existing_ids) {
            informed.insert(row.activity_id.clone());
        }
        for row in store.used_for_entities(&existing_ids) {
            informed.insert(row.activity_id.clone());
        }
        for informed_id in informed {
            if informed_id == input.activity.id {
                continue;
            }
            writer.insert_was_informed_by(WasInformedBy {
                informed_id,
                informer_id: input.activity.id.clone(),
            });
        }
    }

    let counts = writer.commit(store, mirror)?;
    let counts = UploadCounts {
        entities: counts.entities,
        activities: counts.activities,
        was_associated_with: counts.was_associated_with,
        was_generated_by: counts.was_generated_by,
        used: counts.used,
        was_informed_by: counts.was_informed_by,
    };

    info!(
        activity = %input.activity.id,
        entities = counts.entities,
        generated = counts.was_generated_by,
        used = counts.used,
        informed = counts.was_informed_by,
        "activity batch ingested"
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn upload(entities: Vec<EntityInput>, activity: ActivityInput) -> ActivityUpload {
        ActivityUpload { entities, activity }
    }

    fn entity(id: &str, role: &str) -> EntityInput {
        EntityInput {
            id: id.to_string(),
            label: None,
            metadata: None,
            role: role.to_string(),
            created_at: None,
        }
    }

    fn activity(id: &str, started_at: u64, ended_at: u64) -> ActivityInput {
        ActivityInput {
            id: id.to_string(),
            label: None,
            started_at,
            ended_at,
            metadata: None,
        }
    }

    fn fresh() -> (ProvenanceStore, GraphMirror) {
        (ProvenanceStore::new(), GraphMirror::new())
    }

    #[test]
    fn test_basic_scenario() {
        let (mut store, mut mirror) = fresh();
        let input = upload(
            vec![entity("out1", "output"), entity("in1", "input")],
            activity("act1", 1_000, 31_000),
        );

        let counts = upload_activity(&mut store, &mut mirror, &input, Some("user-1")).unwrap();
        assert_eq!(counts.entities, 2);
        assert_eq!(counts.activities, 1);
        assert_eq!(counts.was_generated_by, 1);
        assert_eq!(counts.used, 1);
        assert_eq!(counts.was_associated_with, 1);

        // relation rows derived from roles
        assert!(store
            .was_generated_by()
            .iter()
            .any(|r| r.entity_id == "out1" && r.activity_id == "act1"));
        assert!(store
            .used()
            .iter()
            .any(|r| r.activity_id == "act1" && r.entity_id == "in1" && r.role == "input"));

        // attribution and association to the uploading agent
        assert!(store
            .was_attributed_to()
            .iter()
            .any(|r| r.entity_id == "out1" && r.agent_id == "user-1"));
        assert!(store
            .was_associated_with()
            .iter()
            .any(|r| r.activity_id == "act1" && r.agent_id == "user-1"));

        // mirror reflects the batch
        assert!(mirror.has_node("out1"));
        assert!(mirror.has_node("act1"));
        assert!(mirror.has_node("user-1"));
    }

    #[test]
    fn test_malformed_activity_persists_nothing() {
        let (mut store, mut mirror) = fresh();
        let input = upload(
            vec![entity("out1", "output")],
            activity("act1", 31_000, 1_000),
        );

        let err = upload_activity(&mut store, &mut mirror, &input, None).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Validation);

        assert_eq!(store.record_count(), 0);
        assert_eq!(store.relation_count(), 0);
        assert_eq!(mirror.node_count(), 0);
    }

    #[test]
    fn test_requires_an_output() {
        let (mut store, mut mirror) = fresh();
        let input = upload(vec![entity("in1", "input")], activity("act1", 0, 1));
        let err = upload_activity(&mut store, &mut mirror, &input, None).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Validation);
    }

    #[test]
    fn test_rejects_multiple_process_entities() {
        let (mut store, mut mirror) = fresh();
        let input = upload(
            vec![
                entity("out1", "output"),
                entity("p1", "process"),
                entity("p2", "process"),
            ],
            activity("act1", 0, 1),
        );
        let err = upload_activity(&mut store, &mut mirror, &input, None).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Validation);
    }

    #[test]
    fn test_process_becomes_usage_with_role() {
        let (mut store, mut mirror) = fresh();
        let mut process = entity("script1", "process");
        process.label = Some("pipeline.py".to_string());
        let input = upload(
            vec![entity("out1", "output"), process],
            activity("act1", 0, 1),
        );

        upload_activity(&mut store, &mut mirror, &input, None).unwrap();
        assert!(store
            .used()
            .iter()
            .any(|r| r.entity_id == "script1" && r.role == "process"));

        // activity label derived from the process entity
        assert_eq!(store.activity("act1").unwrap().label, "Run pipeline.py");
    }

    #[test]
    fn test_duplicate_activity_conflicts_and_rolls_back() {
        let (mut store, mut mirror) = fresh();
        let input = upload(vec![entity("out1", "output")], activity("act1", 0, 1));
        upload_activity(&mut store, &mut mirror, &input, None).unwrap();

        let relations_before = store.relation_count();
        let second = upload(vec![entity("out2", "output")], activity("act1", 5, 6));
        let err = upload_activity(&mut store, &mut mirror, &second, None).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Conflict);

        // the failed batch left nothing behind
        assert!(!store.has_entity("out2"));
        assert_eq!(store.relation_count(), relations_before);
    }

    #[test]
    fn test_reingesting_entity_is_idempotent() {
        let (mut store, mut mirror) = fresh();
        let first = upload(vec![entity("shared", "output")], activity("act1", 0, 1));
        upload_activity(&mut store, &mut mirror, &first, Some("u")).unwrap();
        let created_at = store.entity("shared").unwrap().created_at;

        let second = upload(
            vec![entity("out2", "output"), entity("shared", "input")],
            activity("act2", 5, 6),
        );
        let counts = upload_activity(&mut store, &mut mirror, &second, Some("u")).unwrap();

        // "shared" was not re-inserted
        assert_eq!(counts.entities, 1);
        assert_eq!(store.entity("shared").unwrap().created_at, created_at);
    }

    #[test]
    fn test_informed_by_inferred_for_existing_entities() {
        let (mut store, mut mirror) = fresh();
        let first = upload(vec![entity("data", "output")], activity("producer", 0, 1));
        upload_activity(&mut store, &mut mirror, &first, Some("u")).unwrap();

        let second = upload(
            vec![entity("result", "output"), entity("data", "input")],
            activity("consumer", 5, 6),
        );
        let counts = upload_activity(&mut store, &mut mirror, &second, Some("u")).unwrap();

        assert_eq!(counts.was_informed_by, 1);
        assert!(store
            .was_informed_by()
            .iter()
            .any(|r| r.informed_id == "producer" && r.informer_id == "consumer"));
    }

    #[test]
    fn test_generated_agent_when_caller_unknown() {
        let (mut store, mut mirror) = fresh();
        let input = upload(vec![entity("out1", "output")], activity("act1", 0, 1));
        upload_activity(&mut store, &mut mirror, &input, None).unwrap();

        assert_eq!(store.agents().count(), 1);
        let agent = store.agents().next().unwrap();
        assert_eq!(agent.metadata["autoCreated"], true);
    }

    #[test]
    fn test_role_defaults_to_input() {
        let parsed: EntityInput = serde_json::from_value(json!({"id": "raw.csv"})).unwrap();
        assert_eq!(parsed.role, Used::DEFAULT_ROLE);

        let (mut store, mut mirror) = fresh();
        let input = upload(
            vec![entity("out1", "output"), parsed],
            activity("act1", 0, 1),
        );
        upload_activity(&mut store, &mut mirror, &input, None).unwrap();

        assert!(store
            .used()
            .iter()
            .any(|r| r.entity_id == "raw.csv" && r.role == "input"));
    }

    #[test]
    fn test_duplicate_ids_in_batch_rejected() {
        let (mut store, mut mirror) = fresh();
        let input = upload(
            vec![entity("x", "output"), entity("x", "input")],
            activity("act1", 0, 1),
        );
        let err = upload_activity(&mut store, &mut mirror, &input, None).unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Validation);
    }
}
