//! # ProvDB - Embedded Provenance Lineage Engine
//!
//! ProvDB is an embedded provenance store written in Rust. It keeps W3C
//! PROV-style records (entities, activities, agents) in authoritative
//! relational tables, mirrors them into a property graph, and answers
//! lineage questions through a fixed library of named, versioned graph
//! query procedures.
//!
//! ## Quick Start
//!
//! ```rust
//! use provdb::{ActivityInput, ActivityUpload, EntityInput, ProvenanceDb};
//!
//! fn main() -> provdb::Result<()> {
//!     // Create an in-memory database
//!     let db = ProvenanceDb::in_memory();
//!
//!     // Ingest one activity batch: what ran, what it read, what it wrote
//!     let upload = ActivityUpload {
//!         entities: vec![
//!             EntityInput {
//!                 id: "raw.csv".into(),
//!                 label: Some("raw data".into()),
//!                 metadata: None,
//!                 role: "input".into(),
//!                 created_at: None,
//!             },
//!             EntityInput {
//!                 id: "clean.parquet".into(),
//!                 label: Some("cleaned data".into()),
//!                 metadata: None,
//!                 role: "output".into(),
//!                 created_at: None,
//!             },
//!         ],
//!         activity: ActivityInput {
//!             id: "run-42".into(),
//!             label: Some("nightly clean".into()),
//!             started_at: 1_700_000_000_000,
//!             ended_at: 1_700_000_030_000,
//!             metadata: None,
//!         },
//!     };
//!     db.upload_activity(&upload, Some("analyst-1"))?;
//!
//!     // Walk upstream from an output
//!     let lineage = db.entity_lineage("clean.parquet", Some(5))?;
//!     for node in &lineage.nodes {
//!         println!("{} ({})", node.id, node.kind);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Atomic Ingestion**: One activity plus its entities commit as a unit;
//!   a failed batch leaves no partial provenance behind
//! - **Dual Representation**: Relational tables stay authoritative, the
//!   graph mirror serves traversal
//! - **Bounded Lineage**: Breadth-first upstream resolution with a default
//!   depth and a hard ceiling
//! - **Versioned Queries**: Procedures like `entity_lineage_v1` take one
//!   structured parameter object; there is no query text to inject into
//! - **Single-File Storage**: Checksummed snapshot format with atomic saves
//!
//! ## Persistence
//!
//! ```rust,no_run
//! use provdb::ProvenanceDb;
//!
//! fn main() -> provdb::Result<()> {
//!     let db = ProvenanceDb::open("prov.db")?;
//!     // ... ingest batches ...
//!     db.save()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

// ── Core ──────────────────────────────────────────────────────────────────────
// Fundamental types: records, relational store, graph mirror, errors.
pub mod error;
pub mod graph;
pub mod model;
pub mod store;
pub mod writer;

// ── Query & Lineage ──────────────────────────────────────────────────────────
pub mod lineage;
pub mod normalize;
pub mod query;

// ── Ingestion ────────────────────────────────────────────────────────────────
pub mod ingest;

// ── Storage & Database ───────────────────────────────────────────────────────
pub mod database;
pub mod storage;

// ── Stable API ───────────────────────────────────────────────────────────────
// These types form the core stable API surface. Breaking changes follow semver.
pub use database::{DatabaseConfig, ProvenanceDb};
pub use error::{ErrorCode, ProvError, Result};
pub use graph::{EdgeDirection, GraphEdge, GraphMirror, GraphNode};
pub use ingest::{ActivityInput, ActivityUpload, EntityInput, UploadCounts};
pub use lineage::{LineageConfig, LineageEdge, LineageNode, LineageResult};
pub use model::{
    Activity, Agent, Entity, NodeKind, RelationKind, Used, WasAssociatedWith, WasAttributedTo,
    WasDerivedFrom, WasGeneratedBy, WasInformedBy,
};
pub use normalize::{NormalizedEdge, NormalizedNode};
pub use query::{GraphQueryFn, QueryRegistry, QuerySnapshot};
pub use store::ProvenanceStore;
pub use writer::{CommitCounts, ProvenanceWriter, StagedOp};

/// Prelude module for convenient imports.
///
/// ```rust
/// use provdb::prelude::*;
/// ```
pub mod prelude {
    pub use crate::database::{DatabaseConfig, ProvenanceDb};
    pub use crate::error::{ProvError, Result};
    pub use crate::ingest::{ActivityInput, ActivityUpload, EntityInput};
    pub use crate::lineage::{LineageConfig, LineageResult};
    pub use crate::model::{NodeKind, RelationKind};
}
