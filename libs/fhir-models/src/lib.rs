//! FHIR data models
//!
//! This crate provides strongly-typed Rust structures for the parts of a FHIR
//! StructureDefinition that describe its element tree.
//!
//! # Module Organization
//!
//! - `common`: Version-agnostic models that read DSTU2, STU3, R4 and R5 JSON
//!
//! # Design Philosophy
//!
//! - **Version-agnostic core**: Fields renamed between versions are read from either spelling
//! - **Extensible**: `extensions` captures polymorphic `[x]` values and everything untyped
//! - **Flexible**: Can serialize/deserialize to/from JSON
//!
//! # Example
//!
//! ```rust
//! use ferrum_models::common::{StructureDefinition, StructureDefinitionKind};
//! use serde_json::json;
//!
//! let sd_json = json!({
//!     "resourceType": "StructureDefinition",
//!     "id": "Patient",
//!     "url": "http://hl7.org/fhir/StructureDefinition/Patient",
//!     "fhirVersion": "4.0.1",
//!     "name": "Patient",
//!     "kind": "resource",
//!     "type": "Patient"
//! });
//!
//! let sd = StructureDefinition::from_value(&sd_json).unwrap();
//! assert_eq!(sd.name, "Patient");
//! assert_eq!(sd.kind, Some(StructureDefinitionKind::Resource));
//! ```

pub mod common;

// Re-export commonly used types
pub use common::*;
