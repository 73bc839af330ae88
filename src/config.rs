use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::common::errors::PipelineError;
use crate::workflow::types::Orientation;

/// Immutable settings for one watch session, owned by the caller and passed
/// by value into the core at session start. The binary loads this from
/// `CAPTURE_*` environment variables; library callers construct it directly.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    pub source_folder: PathBuf,
    #[serde(default)]
    pub landscape_overlay: Option<PathBuf>,
    #[serde(default)]
    pub portrait_overlay: Option<PathBuf>,
    pub output_folder: PathBuf,
    #[serde(default)]
    pub file_prefix: String,
    /// Also run the one-time scan of files already present in the source
    /// folder when the session starts.
    #[serde(default)]
    pub process_backlog: bool,
}

impl WatchConfig {
    /// Fail fast before any watching begins; per-file problems (an overlay
    /// that disappears later) are not checked here.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.source_folder.is_dir() {
            return Err(PipelineError::ConfigInvalid(format!(
                "source folder {:?} does not exist or is not a directory",
                self.source_folder
            )));
        }
        if !self.output_folder.is_dir() {
            return Err(PipelineError::ConfigInvalid(format!(
                "output folder {:?} does not exist or is not a directory",
                self.output_folder
            )));
        }
        if self.overlay_for(Orientation::Landscape).is_none()
            && self.overlay_for(Orientation::Portrait).is_none()
        {
            return Err(PipelineError::ConfigInvalid(
                "at least one overlay (landscape or portrait) must be configured".into(),
            ));
        }
        Ok(())
    }

    /// The configured overlay path for `orientation`, treating an empty path
    /// the same as an unset one.
    pub fn overlay_for(&self, orientation: Orientation) -> Option<&Path> {
        let path = match orientation {
            Orientation::Landscape => self.landscape_overlay.as_deref(),
            Orientation::Portrait => self.portrait_overlay.as_deref(),
        };
        path.filter(|p| !p.as_os_str().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base_config(source: &Path, output: &Path) -> WatchConfig {
        WatchConfig {
            source_folder: source.to_path_buf(),
            landscape_overlay: Some(PathBuf::from("/overlays/l.png")),
            portrait_overlay: None,
            output_folder: output.to_path_buf(),
            file_prefix: String::new(),
            process_backlog: false,
        }
    }

    #[test]
    fn valid_config_passes() {
        let tmp = TempDir::new().unwrap();
        let config = base_config(tmp.path(), tmp.path());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_source_folder_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut config = base_config(tmp.path(), tmp.path());
        config.source_folder = tmp.path().join("nope");
        assert!(matches!(
            config.validate(),
            Err(PipelineError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn config_without_any_overlay_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut config = base_config(tmp.path(), tmp.path());
        config.landscape_overlay = None;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn empty_overlay_path_counts_as_unset() {
        let tmp = TempDir::new().unwrap();
        let mut config = base_config(tmp.path(), tmp.path());
        config.landscape_overlay = Some(PathBuf::new());
        assert!(config.overlay_for(Orientation::Landscape).is_none());
        assert!(matches!(
            config.validate(),
            Err(PipelineError::ConfigInvalid(_))
        ));
    }
}
