//! Error types for tree reconciliation and row derivation

use crate::event::RendererEventType;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// No snapshot node, or more than one, matched a differential node
    #[error("No unique snapshot node for {path}: {reason}")]
    StructuralMismatch { path: String, reason: String },

    /// An event whose configured response is to abort
    #[error("{kind}: {message}")]
    Event {
        kind: RendererEventType,
        message: String,
    },

    #[error("Invalid tree: {0}")]
    InvalidTree(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Extension lookup failed for {url}: {reason}")]
    ExtensionLookup { url: String, reason: String },

    #[error("Model error: {0}")]
    Model(#[from] ferrum_models::Error),
}

impl Error {
    pub(crate) fn mismatch(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::StructuralMismatch {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The event kind behind this error, if it was raised through an event sink
    pub fn event_kind(&self) -> Option<RendererEventType> {
        match self {
            Error::Event { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}
