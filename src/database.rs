//! Database Management
//!
//! The database is the top-level handle over the provenance engine. It owns
//! the relational store, the derived graph mirror, and the query registry,
//! and serializes access to them behind a `parking_lot::RwLock`.
//!
//! # Overview
//!
//! A `ProvenanceDb` can be either:
//! - **File-backed**: Persisted to a single snapshot file on disk
//! - **In-memory**: Ephemeral storage for testing or temporary use
//!
//! # Example
//!
//! ```rust,no_run
//! use provdb::{ProvenanceDb, ActivityUpload, ActivityInput, EntityInput};
//!
//! let db = ProvenanceDb::open("prov.db")?;
//!
//! let upload = ActivityUpload {
//!     entities: vec![EntityInput {
//!         id: "out1".into(),
//!         label: Some("result table".into()),
//!         metadata: None,
//!         role: "output".into(),
//!         created_at: None,
//!     }],
//!     activity: ActivityInput {
//!         id: "act1".into(),
//!         label: None,
//!         started_at: 1_000,
//!         ended_at: 31_000,
//!         metadata: None,
//!     },
//! };
//! db.upload_activity(&upload, Some("analyst-1"))?;
//!
//! let lineage = db.entity_lineage("out1", Some(5))?;
//! db.save()?;
//! # Ok::<(), provdb::ProvError>(())
//! ```
//!
//! # Thread Safety
//!
//! `ProvenanceDb` uses `parking_lot::RwLock` internally. Lineage and graph
//! queries take a read lock and can run concurrently; uploads and deletes
//! take the write lock for the duration of their atomic batch.
//!
//! # Persistence
//!
//! Changes are not automatically persisted. Call `save()` to write a
//! snapshot to disk. Only the relational store is written; the graph mirror
//! is rebuilt from it on open.

use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::{ProvError, Result};
use crate::graph::GraphMirror;
use crate::ingest::{upload_activity, ActivityUpload, UploadCounts};
use crate::lineage::{
    common_ancestors, entity_descendants, entity_lineage, LineageConfig, LineageResult,
};
use crate::query::{QueryRegistry, QuerySnapshot};
use crate::storage::{load_store, save_store};
use crate::store::ProvenanceStore;
use crate::writer::ProvenanceWriter;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the snapshot file
    pub path: PathBuf,
    /// Whether to create if not exists
    pub create_if_missing: bool,
    /// Lineage traversal depth bounds
    pub lineage: LineageConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("prov.db"),
            create_if_missing: true,
            lineage: LineageConfig::default(),
        }
    }
}

impl DatabaseConfig {
    /// Create a new config with the given path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

/// Store plus derived mirror, mutated together under one lock.
struct DbState {
    store: ProvenanceStore,
    mirror: GraphMirror,
}

/// The main handle over the provenance engine.
///
/// Provides:
/// - Atomic ingestion of activity batches
/// - Lineage resolution and versioned graph queries
/// - Cascading record deletion
/// - Persistence to a single snapshot file
pub struct ProvenanceDb {
    /// `None` for in-memory databases
    path: Option<PathBuf>,
    /// Store and mirror behind one lock
    state: Arc<RwLock<DbState>>,
    /// Registered query procedures
    registry: QueryRegistry,
    /// Lineage depth bounds
    lineage: LineageConfig,
    /// Whether there are unsaved changes
    dirty: AtomicBool,
}

impl ProvenanceDb {
    /// Open or create a database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is corrupted or invalid, or
    /// on I/O failure.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(DatabaseConfig::new(path.as_ref()))
    }

    /// Open or create a database with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `create_if_missing` is false and no snapshot
    /// exists, or if the snapshot fails its integrity checks.
    #[instrument(skip(config), fields(path = ?config.path))]
    pub fn open_with_config(config: DatabaseConfig) -> Result<Self> {
        let exists = config.path.exists();
        info!(exists, "Opening database");

        if !exists && !config.create_if_missing {
            warn!("Database not found and create_if_missing is false");
            return Err(ProvError::InvalidDatabase(format!(
                "Database not found: {:?}",
                config.path
            )));
        }

        let store = if exists {
            load_store(&config.path)?
        } else {
            ProvenanceStore::new()
        };
        let mirror = GraphMirror::rebuild_from(&store);

        debug!(
            records = store.record_count(),
            relations = store.relation_count(),
            "database state ready"
        );

        Ok(Self {
            path: Some(config.path),
            state: Arc::new(RwLock::new(DbState { store, mirror })),
            registry: QueryRegistry::with_builtins(),
            lineage: config.lineage,
            dirty: AtomicBool::new(false),
        })
    }

    /// Create an ephemeral in-memory database.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Arc::new(RwLock::new(DbState {
                store: ProvenanceStore::new(),
                mirror: GraphMirror::new(),
            })),
            registry: QueryRegistry::with_builtins(),
            lineage: LineageConfig::default(),
            dirty: AtomicBool::new(false),
        }
    }

    /// Write a snapshot to disk. No-op for in-memory databases.
    ///
    /// # Errors
    ///
    /// Returns an error on serialization or I/O failure; the previous
    /// snapshot stays intact in that case.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            debug!("in-memory database, save skipped");
            return Ok(());
        };

        let state = self.state.read();
        save_store(path, &state.store)?;
        drop(state);

        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Whether there are changes not yet written to disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Ingest one activity batch atomically.
    ///
    /// See [`upload_activity`](crate::ingest::upload_activity) for the
    /// validation rules and relation derivation.
    pub fn upload_activity(
        &self,
        input: &ActivityUpload,
        agent_id: Option<&str>,
    ) -> Result<UploadCounts> {
        let mut state = self.state.write();
        let DbState { store, mirror } = &mut *state;
        let counts = upload_activity(store, mirror, input, agent_id)?;
        drop(state);

        self.dirty.store(true, Ordering::SeqCst);
        Ok(counts)
    }

    /// Resolve the lineage of an entity up to `max_depth` hops.
    pub fn entity_lineage(&self, entity_id: &str, max_depth: Option<u32>) -> Result<LineageResult> {
        let state = self.state.read();
        entity_lineage(&state.mirror, &self.lineage, entity_id, max_depth)
    }

    /// Resolve everything downstream of an entity up to `max_depth` hops.
    pub fn entity_descendants(
        &self,
        entity_id: &str,
        max_depth: Option<u32>,
    ) -> Result<LineageResult> {
        let state = self.state.read();
        entity_descendants(&state.mirror, &self.lineage, entity_id, max_depth)
    }

    /// Ancestors shared by two entities, the pair itself excluded.
    pub fn common_ancestors(
        &self,
        entity_id_1: &str,
        entity_id_2: &str,
        max_depth: Option<u32>,
    ) -> Result<LineageResult> {
        let state = self.state.read();
        common_ancestors(
            &state.mirror,
            &self.lineage,
            entity_id_1,
            entity_id_2,
            max_depth,
        )
    }

    /// Run a registered graph query procedure by name.
    pub fn run_query(&self, name: &str, params: Value) -> Result<Value> {
        let state = self.state.read();
        let snapshot = QuerySnapshot {
            store: &state.store,
            mirror: &state.mirror,
            lineage: &self.lineage,
        };
        self.registry.run(&snapshot, name, params)
    }

    /// Names of the registered query procedures.
    pub fn query_names(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    /// Delete an entity and every relation row referencing it.
    pub fn delete_entity(&self, id: &str) -> Result<()> {
        let mut state = self.state.write();
        let DbState { store, mirror } = &mut *state;
        ProvenanceWriter::delete_entity(store, mirror, id)?;
        drop(state);

        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Delete an activity and every relation row referencing it.
    pub fn delete_activity(&self, id: &str) -> Result<()> {
        let mut state = self.state.write();
        let DbState { store, mirror } = &mut *state;
        ProvenanceWriter::delete_activity(store, mirror, id)?;
        drop(state);

        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Delete an agent and every relation row referencing it.
    pub fn delete_agent(&self, id: &str) -> Result<()> {
        let mut state = self.state.write();
        let DbState { store, mirror } = &mut *state;
        ProvenanceWriter::delete_agent(store, mirror, id)?;
        drop(state);

        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Look up an entity row.
    pub fn entity(&self, id: &str) -> Option<crate::model::Entity> {
        self.state.read().store.entity(id).cloned()
    }

    /// Look up an activity row.
    pub fn activity(&self, id: &str) -> Option<crate::model::Activity> {
        self.state.read().store.activity(id).cloned()
    }

    /// Look up an agent row.
    pub fn agent(&self, id: &str) -> Option<crate::model::Agent> {
        self.state.read().store.agent(id).cloned()
    }

    /// Total record rows (entities + activities + agents).
    pub fn record_count(&self) -> usize {
        self.state.read().store.record_count()
    }

    /// Total relation rows across all six tables.
    pub fn relation_count(&self) -> usize {
        self.state.read().store.relation_count()
    }

    /// Run a closure against the store under the read lock.
    ///
    /// Escape hatch for reads the typed accessors do not cover.
    pub fn with_store<R>(&self, f: impl FnOnce(&ProvenanceStore) -> R) -> R {
        f(&self.state.read().store)
    }
}

// The registry holds trait objects, so Debug cannot be derived. Render the
// handle without touching the state lock.
impl fmt::Debug for ProvenanceDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvenanceDb")
            .field("path", &self.path)
            .field("procedures", &self.registry.names())
            .field("dirty", &self.dirty.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
