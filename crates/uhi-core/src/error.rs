//! Error taxonomy for the hotspot pipeline.
//!
//! Only conditions that end a run live here. Insufficient samples and skipped
//! fusion are ordinary outcomes (see `stats::SpatialStatsOutcome` and
//! `fusion::FusionOutcome`), not errors.

use crate::layers::LayerKind;
use crate::reduce::Reducer;

#[derive(Debug, thiserror::Error)]
pub enum UhiError {
    /// The city could not be resolved to a boundary.
    #[error("could not geocode city: {query}")]
    NotFound { query: String },

    /// A required layer or boundary source is unavailable and has no fallback.
    #[error("upstream data unavailable for {source_name}: {message}")]
    UpstreamData {
        source_name: String,
        message: String,
    },

    /// Too few valid pixels inside the AOI to reduce a layer, whether to a
    /// percentile threshold or to the mean elevation.
    #[error("{reducer} of {layer} undefined over the AOI: {valid} valid pixels, need at least {required}")]
    UndefinedReduction {
        layer: LayerKind,
        reducer: Reducer,
        valid: usize,
        required: usize,
    },

    /// Two grids that must share a geometry do not.
    #[error("grid mismatch: {0}")]
    GridMismatch(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl UhiError {
    pub(crate) fn upstream(source_name: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::UpstreamData {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, UhiError>;
