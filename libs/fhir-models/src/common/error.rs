//! Error types for FHIR models

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The JSON is not the resource type the caller asked for
    #[error("Invalid FHIR resource: {0}")]
    InvalidResource(String),

    /// An optional part of the resource that the caller needs is absent
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unsupported fhirVersion '{0}'")]
    UnsupportedFhirVersion(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
