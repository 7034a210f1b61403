//! Error types used across the crate.

use thiserror::Error;

use crate::backend::MapLib;
use crate::config::ConfigError;

/// Result of a construction call.
pub type Result<T, E = AzimuthError> = std::result::Result<T, E>;

/// Errors that abort a single layer or map construction call.
///
/// A construction that fails with any of these leaves the layer registry and any already
/// constructed map untouched.
#[derive(Debug, Error)]
pub enum AzimuthError {
    /// Neither an explicit `maplib` option nor a detectable backend global is available.
    #[error("no mapping library could be resolved")]
    MissingBackend,

    /// The requested layer kind has no builder for the selected backend.
    #[error("layer kind `{kind}` is not supported by {backend}")]
    UnsupportedLayerKind {
        /// Layer kind as written in the markup.
        kind: String,
        /// Backend the layer was requested for.
        backend: MapLib,
    },

    /// A map control name does not correspond to a control type of the backend.
    #[error("control `{control}` is not known to {backend}")]
    UnknownControl {
        /// Control name as written in the markup.
        control: String,
        /// Backend the map was requested for.
        backend: MapLib,
    },

    /// An option required by a builder is missing or has a value it cannot use.
    #[error("invalid option `{key}`: {reason}")]
    InvalidOption {
        /// Option key.
        key: String,
        /// Human readable explanation.
        reason: String,
    },

    /// Configuration defaults could not be read.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AzimuthError {
    pub(crate) fn invalid_option(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
