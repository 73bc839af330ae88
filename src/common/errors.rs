use std::path::PathBuf;

use thiserror::Error;

use crate::workflow::types::Orientation;

/// Error taxonomy for one watch session.
///
/// `ConfigInvalid` and `WatchSubscriptionFailed` are fatal and surface before
/// the loop starts; the remaining variants are per-file failures that the
/// dispatcher converts into status events without stopping the session.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("no usable {orientation} overlay ({detail})")]
    OverlayMissing {
        orientation: Orientation,
        detail: String,
    },

    #[error("failed to decode {path:?}: {cause:#}")]
    DecodeFailed { path: PathBuf, cause: anyhow::Error },

    #[error("failed to write output for {path:?}: {cause:#}")]
    EncodeFailed { path: PathBuf, cause: anyhow::Error },

    #[error("could not subscribe to filesystem events for {path:?}: {cause}")]
    WatchSubscriptionFailed {
        path: PathBuf,
        #[source]
        cause: notify::Error,
    },
}
