use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Pixel orientation of a photo after EXIF rotation has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Landscape,
    Portrait,
}

impl Orientation {
    /// Landscape iff strictly wider than tall; square images count as portrait.
    pub fn from_dimensions(width: u32, height: u32) -> Self {
        if width > height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One per-file transition reported by the dispatcher. This is the only
/// channel by which a caller learns of progress on the watch-driven path.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// A qualifying file passed the readiness gate and will be composited.
    Detected { path: PathBuf },
    /// The gate rejected the file; a normal terminal state, not an error.
    Skipped { path: PathBuf, reason: String },
    Succeeded { path: PathBuf, output: PathBuf },
    Failed { path: PathBuf, detail: String },
}

pub type StatusSink = Arc<dyn Fn(StatusEvent) + Send + Sync>;

/// Session-scoped progress counters. The backlog scan and the notify thread
/// can report at overlapping times, hence the atomics; increment-only.
#[derive(Debug, Default)]
pub struct RunState {
    pub running: AtomicBool,
    total_detected: AtomicU64,
    total_processed: AtomicU64,
}

impl RunState {
    pub fn mark_detected(&self) {
        self.total_detected.fetch_add(1, Ordering::SeqCst);
    }

    pub fn mark_processed(&self) {
        self.total_processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn detected(&self) -> u64 {
        self.total_detected.load(Ordering::SeqCst)
    }

    pub fn processed(&self) -> u64 {
        self.total_processed.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Explicit cancellation token shared between the watch loop, the backlog
/// scan and the session handle. The backlog scan checks it between files;
/// an in-flight composite is not preemptible.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wider_than_tall_is_landscape() {
        assert_eq!(
            Orientation::from_dimensions(1920, 1080),
            Orientation::Landscape
        );
    }

    #[test]
    fn taller_than_wide_is_portrait() {
        assert_eq!(
            Orientation::from_dimensions(1080, 1920),
            Orientation::Portrait
        );
    }

    #[test]
    fn square_resolves_to_portrait() {
        assert_eq!(
            Orientation::from_dimensions(1000, 1000),
            Orientation::Portrait
        );
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
