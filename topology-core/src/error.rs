//! Error types for topoload-core

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guids::Guid;
use crate::ids::TopoId;

/// Result type alias for topoload-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for topoload-core
#[derive(Debug, Error)]
pub enum Error {
    // =========================================================================
    // Resolution failures
    // =========================================================================
    /// Structural defect found before negotiation (no sink, no source, unbound node)
    #[error("Unsupported topology: {0}")]
    UnsupportedTopology(String),

    /// An output node is still bound to an unactivated sink activation object
    #[error("Output node {0:#x} is bound to a sink activation object")]
    SinkActivatesUnsupported(TopoId),

    /// No acceptable media type was found for a connection
    #[error("Invalid media type: {0}")]
    InvalidMediaType(String),

    /// A type enumeration ran out of candidates
    #[error("No more media types")]
    NoMoreTypes,

    /// The transform registry holds nothing able to bridge a connection
    #[error("No decoder or converter found: {0}")]
    CodecNotFound(String),

    /// A compressed type reached a connection that only allows converters
    #[error("Transform not possible for the current media type combination: {0}")]
    TransformNotPossible(String),

    /// A transform rejected the propagated device manager
    #[error("Device manager delivery to node {node:#x} failed: {reason}")]
    DeviceManagerDelivery {
        /// Node that rejected the message
        node: TopoId,
        /// Error reported by the transform
        reason: String,
    },

    // =========================================================================
    // Graph, attribute and component errors
    // =========================================================================
    /// Lookup found nothing (node id, connection, preferred type)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Index past the end of a collection
    #[error("Invalid index {0}")]
    InvalidIndex(u32),

    /// Operation not valid for this slot type
    #[error("Invalid type: {0}")]
    InvalidType(String),

    /// Operation not valid for this node kind
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Operation not implemented by this object
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Attribute key is absent
    #[error("Attribute {0} not found")]
    AttributeNotFound(Guid),

    /// Attribute key is present with a different value type
    #[error("Attribute {0} has a different type")]
    AttributeTypeMismatch(Guid),

    /// Node has no bound object
    #[error("No object bound to node")]
    ObjectNotSet,

    /// Capability query refused
    #[error("Interface not supported: {0}")]
    NoInterface(String),

    /// Transform stream has no current type
    #[error("Media type not set")]
    TypeNotSet,

    /// Handler has types but none is current
    #[error("Object not initialized")]
    NotInitialized,

    // =========================================================================
    // Configuration
    // =========================================================================
    /// Manifest parsing or validation error
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Loader configuration error
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Classification of a resolution outcome.
///
/// Stored on resolved topologies (as `Succeeded`) and reported by the CLI
/// for failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    /// Every connection resolved
    Succeeded,
    /// Structural topology defect
    UnsupportedTopology,
    /// Sink given as an activation object
    SinkActivatesUnsupported,
    /// No acceptable type
    InvalidMediaType,
    /// Enumeration exhausted
    NoMoreTypes,
    /// Registry exhausted
    CodecNotFound,
    /// Converter-only policy met a compressed type
    TransformNotPossible,
    /// Device manager rejected
    DeviceManagerDeliveryFailed,
    /// Any other failure
    Failed,
}

impl ResolutionStatus {
    /// Value stored in the `RESOLUTION_STATUS` topology attribute.
    pub fn as_u32(self) -> u32 {
        match self {
            ResolutionStatus::Succeeded => 0,
            ResolutionStatus::UnsupportedTopology => 1,
            ResolutionStatus::SinkActivatesUnsupported => 2,
            ResolutionStatus::InvalidMediaType => 3,
            ResolutionStatus::NoMoreTypes => 4,
            ResolutionStatus::CodecNotFound => 5,
            ResolutionStatus::TransformNotPossible => 6,
            ResolutionStatus::DeviceManagerDeliveryFailed => 7,
            ResolutionStatus::Failed => 0xff,
        }
    }
}

impl Error {
    /// Classify this error as a resolution outcome.
    pub fn status(&self) -> ResolutionStatus {
        match self {
            Error::UnsupportedTopology(_) => ResolutionStatus::UnsupportedTopology,
            Error::SinkActivatesUnsupported(_) => ResolutionStatus::SinkActivatesUnsupported,
            Error::InvalidMediaType(_) => ResolutionStatus::InvalidMediaType,
            Error::NoMoreTypes => ResolutionStatus::NoMoreTypes,
            Error::CodecNotFound(_) => ResolutionStatus::CodecNotFound,
            Error::TransformNotPossible(_) => ResolutionStatus::TransformNotPossible,
            Error::DeviceManagerDelivery { .. } => ResolutionStatus::DeviceManagerDeliveryFailed,
            _ => ResolutionStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(Error::NoMoreTypes.status(), ResolutionStatus::NoMoreTypes);
        assert_eq!(
            Error::CodecNotFound("h264".into()).status(),
            ResolutionStatus::CodecNotFound
        );
        assert_eq!(
            Error::SinkActivatesUnsupported(1).status(),
            ResolutionStatus::SinkActivatesUnsupported
        );
        assert_eq!(Error::TypeNotSet.status(), ResolutionStatus::Failed);
    }

    #[test]
    fn test_succeeded_is_zero() {
        assert_eq!(ResolutionStatus::Succeeded.as_u32(), 0);
    }
}
