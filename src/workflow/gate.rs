//! Readiness gate - decides whether a candidate path is a stable,
//! processable image file
//!
//! A filesystem creation event can fire while the writer (camera import
//! tool, OS copy) is still streaming bytes, so eligibility and stability are
//! checked separately: the gate is cheap and synchronous, the stability wait
//! polls until the file size stops moving.

use std::fs;
use std::path::Path;
use std::thread::sleep;

use anyhow::{Context, Result, bail};

use crate::common::{PROCESSED_MARKER, SIZE_PROBE_ATTEMPTS, SIZE_PROBE_INTERVAL, VALID_IMAGE_EXTENSIONS};
use crate::utils::PathExt;

/// Why a path is not processable, or `None` if it is.
pub fn rejection_reason(path: &Path) -> Option<&'static str> {
    if !path.is_file() {
        return Some("not a regular file");
    }
    if !VALID_IMAGE_EXTENSIONS.contains(&path.ext_lower().as_str()) {
        return Some("extension is not a processable image type");
    }
    let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or_default();
    if file_name.contains(PROCESSED_MARKER) {
        return Some("already carries the processed marker");
    }
    None
}

pub fn is_processable(path: &Path) -> bool {
    rejection_reason(path).is_none()
}

/// Block until two consecutive size probes agree (and the file is non-empty),
/// returning the settled size. Gives up after a bounded number of probes so a
/// writer that never finishes cannot stall the session forever.
pub fn wait_for_stable_size(path: &Path) -> Result<u64> {
    let mut last_size = None;

    for _ in 0..SIZE_PROBE_ATTEMPTS {
        let size = fs::metadata(path)
            .context(format!(
                "failed to stat {:?} while waiting for it to settle",
                path
            ))?
            .len();

        if last_size == Some(size) && size > 0 {
            return Ok(size);
        }
        last_size = Some(size);
        sleep(SIZE_PROBE_INTERVAL);
    }

    bail!(
        "file {:?} did not settle after {} probes",
        path,
        SIZE_PROBE_ATTEMPTS
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn only_configured_extensions_pass() {
        let tmp = TempDir::new().unwrap();
        for name in ["notes.txt", "anim.gif", "photo.jpg", "shot.JPEG", "frame.png"] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }

        let accepted: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| is_processable(p))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();

        assert_eq!(accepted.len(), 3);
        assert!(!accepted.contains(&"notes.txt".to_string()));
        assert!(!accepted.contains(&"anim.gif".to_string()));
    }

    #[test]
    fn own_output_is_never_reprocessed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("photo_processed.jpg");
        fs::write(&path, b"x").unwrap();
        assert_eq!(
            rejection_reason(&path),
            Some("already carries the processed marker")
        );
    }

    #[test]
    fn directories_and_missing_paths_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("album.jpg");
        fs::create_dir(&dir).unwrap();
        assert!(!is_processable(&dir));
        assert!(!is_processable(&tmp.path().join("nowhere.jpg")));
    }

    #[test]
    fn settled_file_reports_stable_size() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("done.jpg");
        fs::write(&path, vec![0u8; 1024]).unwrap();
        assert_eq!(wait_for_stable_size(&path).unwrap(), 1024);
    }

    #[test]
    fn vanished_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(wait_for_stable_size(&tmp.path().join("ghost.jpg")).is_err());
    }
}
