//! FHIR profile tree views
//!
//! Reconciles the differential of a StructureDefinition against its snapshot
//! and derives the rows of a tree table for either view.
//!
//! A StructureDefinition states its elements twice: the snapshot lists every
//! element fully resolved, the differential only what the profile changes.
//! This crate pairs every differential element with the snapshot element it
//! overrides (its *backup node*), resolves `contentReference`/`nameReference`
//! links inside each tree, and walks the result into display rows with
//! indentation glyphs, icons and annotations.
//!
//! # Passes
//!
//! 1. [`builder`] turns flat element lists into [`TreeData`] trees.
//! 2. [`discriminator`] caches slice discriminator values.
//! 3. [`backup`] matches differential nodes to snapshot nodes.
//! 4. [`linked`] resolves same-tree links by id or by name.
//! 5. [`rows`] derives the table rows.
//!
//! [`Reconciler`] runs them in order. Every anomaly is reported through an
//! [`EventSink`]; whether it aborts is decided by the sink's [`EventPolicy`].
//!
//! # Example
//!
//! ```rust
//! use ferrum_models::StructureDefinition;
//! use ferrum_treeview::{EventRecorder, Reconciler, StaticExtensionTypes, TreeViewConfig};
//! use serde_json::json;
//!
//! let sd = StructureDefinition::from_value(&json!({
//!     "resourceType": "StructureDefinition",
//!     "url": "http://example.org/StructureDefinition/my-patient",
//!     "name": "MyPatient",
//!     "fhirVersion": "4.0.1",
//!     "snapshot": {"element": [
//!         {"id": "Patient", "path": "Patient", "min": 0, "max": "*"},
//!         {"id": "Patient.gender", "path": "Patient.gender", "min": 0, "max": "1", "type": [{"code": "code"}]}
//!     ]},
//!     "differential": {"element": [
//!         {"id": "Patient.gender", "path": "Patient.gender", "min": 1}
//!     ]}
//! }))
//! .unwrap();
//!
//! let config = TreeViewConfig::default();
//! let resolver = StaticExtensionTypes::new();
//! let mut events = EventRecorder::default();
//!
//! let profile = Reconciler::new(&config, &resolver).reconcile(&sd, &mut events).unwrap();
//! let rows = profile.differential_rows(&mut events).unwrap().unwrap();
//! assert_eq!(rows[1].cardinality.as_deref(), Some("1..1"));
//! ```

pub mod backup;
pub mod builder;
pub mod config;
pub mod discriminator;
pub mod error;
pub mod event;
pub mod extension;
pub mod linked;
pub mod node;
pub mod pipeline;
pub mod rows;
pub mod tree;

pub use backup::{resolve_backup_nodes, BackupNodeLocator};
pub use builder::{build_differential_tree, build_snapshot_tree};
pub use config::TreeViewConfig;
pub use discriminator::cache_discriminators;
pub use error::{Error, Result};
pub use event::{
    EventPolicy, EventRecorder, EventResponse, EventSink, RendererEvent, RendererEventType,
};
pub use extension::{
    ExtensionType, ExtensionTypeResolver, PermittedMissingExtensions, StaticExtensionTypes,
};
pub use linked::{resolve_linked_nodes, LinkKey};
pub use node::{DifferentialNode, ElementData, SnapshotNode, TreeNodeData};
pub use pipeline::{detect_version, ReconciledProfile, Reconciler};
pub use rows::{Annotation, AnnotationKind, Row, RowDeriver, RowIcon, TreeGlyph};
pub use tree::{NodeId, TreeData};
