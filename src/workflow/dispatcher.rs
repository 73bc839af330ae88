//! Per-file dispatch - gates, composites and reports exactly one file
//!
//! State machine per file:
//! `Detected -> Gating -> {Skipped | Compositing -> {Succeeded | Failed}}`.
//! Every terminal transition is reported through the status sink; failures
//! are per-file and never escape to the watch loop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::thread::sleep;
use std::time::Instant;

use log::{debug, warn};

use crate::common::errors::PipelineError;
use crate::common::{DECODE_RETRY_DELAY, DECODE_RETRY_LIMIT, DEDUP_WINDOW};
use crate::config::WatchConfig;
use crate::workflow::compositor::composite;
use crate::workflow::gate::{rejection_reason, wait_for_stable_size};
use crate::workflow::types::{CancelToken, Orientation, RunState, StatusEvent, StatusSink};

pub struct Dispatcher {
    config: WatchConfig,
    state: Arc<RunState>,
    token: CancelToken,
    sink: StatusSink,
    recently_dispatched: Mutex<HashMap<PathBuf, Instant>>,
}

impl Dispatcher {
    pub fn new(
        config: WatchConfig,
        state: Arc<RunState>,
        token: CancelToken,
        sink: StatusSink,
    ) -> Self {
        Self {
            config,
            state,
            token,
            sink,
            recently_dispatched: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Run the full state machine for one detected filesystem event.
    /// Attempted at most once per event; repeated events for the same path
    /// inside the dedup window are dropped (create+rename double fire).
    pub fn process_one(&self, path: &Path) {
        if self.token.is_cancelled() {
            return;
        }

        if let Some(reason) = rejection_reason(path) {
            debug!("Skipping {:?}: {}", path, reason);
            self.emit(StatusEvent::Skipped {
                path: path.to_path_buf(),
                reason: reason.to_string(),
            });
            return;
        }

        if !self.first_dispatch(path) {
            debug!("Duplicate event for {:?} inside dedup window, ignoring", path);
            return;
        }

        self.state.mark_detected();
        self.emit(StatusEvent::Detected {
            path: path.to_path_buf(),
        });

        match self.run_composite(path) {
            Ok(output) => {
                self.state.mark_processed();
                self.emit(StatusEvent::Succeeded {
                    path: path.to_path_buf(),
                    output,
                });
            }
            Err(err) => {
                self.emit(StatusEvent::Failed {
                    path: path.to_path_buf(),
                    detail: format!("{err:#}"),
                });
            }
        }
    }

    /// Wait for the file to settle, then composite, retrying decode failures
    /// a bounded number of times: the creation event may have fired before
    /// the writer finished.
    fn run_composite(&self, path: &Path) -> Result<PathBuf, PipelineError> {
        wait_for_stable_size(path).map_err(|cause| PipelineError::DecodeFailed {
            path: path.to_path_buf(),
            cause,
        })?;

        let mut attempt = 0;
        loop {
            let result = composite(
                path,
                self.config.overlay_for(Orientation::Landscape),
                self.config.overlay_for(Orientation::Portrait),
                &self.config.output_folder,
                &self.config.file_prefix,
            );
            match result {
                Err(PipelineError::DecodeFailed { .. }) if attempt < DECODE_RETRY_LIMIT => {
                    attempt += 1;
                    warn!(
                        "Attempt {}/{} could not decode {:?} (file may still be in flight), retrying in {:?}",
                        attempt, DECODE_RETRY_LIMIT, path, DECODE_RETRY_DELAY
                    );
                    sleep(DECODE_RETRY_DELAY);
                }
                other => return other,
            }
        }
    }

    /// True exactly once per path within the dedup window. Stale entries are
    /// purged on each call so the map stays bounded by recent activity.
    fn first_dispatch(&self, path: &Path) -> bool {
        let mut recent = self.recently_dispatched.lock().unwrap();
        let now = Instant::now();
        recent.retain(|_, seen| now.duration_since(*seen) < DEDUP_WINDOW);
        if recent.contains_key(path) {
            return false;
        }
        recent.insert(path.to_path_buf(), now);
        true
    }

    fn emit(&self, event: StatusEvent) {
        (self.sink)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::fs;
    use tempfile::TempDir;

    struct Harness {
        _tmp: TempDir,
        source_dir: PathBuf,
        output_dir: PathBuf,
        dispatcher: Dispatcher,
        events: Arc<Mutex<Vec<StatusEvent>>>,
        state: Arc<RunState>,
    }

    fn harness() -> Harness {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("source");
        let output_dir = tmp.path().join("output");
        fs::create_dir(&source_dir).unwrap();
        fs::create_dir(&output_dir).unwrap();

        let landscape = tmp.path().join("L.png");
        let portrait = tmp.path().join("P.png");
        RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]))
            .save(&landscape)
            .unwrap();
        RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255]))
            .save(&portrait)
            .unwrap();

        let config = WatchConfig {
            source_folder: source_dir.clone(),
            landscape_overlay: Some(landscape),
            portrait_overlay: Some(portrait),
            output_folder: output_dir.clone(),
            file_prefix: String::new(),
            process_backlog: false,
        };

        let events: Arc<Mutex<Vec<StatusEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink: StatusSink = {
            let events = events.clone();
            Arc::new(move |event| events.lock().unwrap().push(event))
        };
        let state = Arc::new(RunState::default());

        Harness {
            _tmp: tmp,
            source_dir,
            output_dir,
            dispatcher: Dispatcher::new(config, state.clone(), CancelToken::new(), sink),
            events,
            state,
        }
    }

    fn write_jpg(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([10, 10, 10]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn successful_file_reports_detected_then_succeeded() {
        let h = harness();
        let path = write_jpg(&h.source_dir, "a.jpg", 64, 32);

        h.dispatcher.process_one(&path);

        let events = h.events.lock().unwrap();
        assert!(matches!(events[0], StatusEvent::Detected { .. }));
        assert!(matches!(events[1], StatusEvent::Succeeded { .. }));
        assert_eq!(h.state.detected(), 1);
        assert_eq!(h.state.processed(), 1);
        assert!(h.output_dir.join("a_processed.jpg").is_file());
    }

    #[test]
    fn unqualified_file_is_skipped_without_counting() {
        let h = harness();
        let path = h.source_dir.join("notes.txt");
        fs::write(&path, b"hello").unwrap();

        h.dispatcher.process_one(&path);

        let events = h.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StatusEvent::Skipped { .. }));
        assert_eq!(h.state.detected(), 0);
        assert_eq!(fs::read_dir(&h.output_dir).unwrap().count(), 0);
    }

    #[test]
    fn failure_is_isolated_and_does_not_poison_later_files() {
        let h = harness();
        let bad = h.source_dir.join("bad.jpg");
        fs::write(&bad, b"not a jpeg at all").unwrap();

        h.dispatcher.process_one(&bad);

        {
            let events = h.events.lock().unwrap();
            assert!(matches!(events.last(), Some(StatusEvent::Failed { .. })));
        }
        assert_eq!(h.state.processed(), 0);

        let good = write_jpg(&h.source_dir, "good.jpg", 48, 24);
        h.dispatcher.process_one(&good);

        assert_eq!(h.state.processed(), 1);
        assert!(h.output_dir.join("good_processed.jpg").is_file());
    }

    #[test]
    fn duplicate_event_inside_window_is_dispatched_once() {
        let h = harness();
        let path = write_jpg(&h.source_dir, "a.jpg", 64, 32);

        h.dispatcher.process_one(&path);
        h.dispatcher.process_one(&path);

        let detected = h
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, StatusEvent::Detected { .. }))
            .count();
        assert_eq!(detected, 1);
        assert_eq!(h.state.detected(), 1);
    }

    #[test]
    fn cancelled_dispatcher_emits_nothing() {
        let h = harness();
        let path = write_jpg(&h.source_dir, "a.jpg", 64, 32);

        h.dispatcher.token.cancel();
        h.dispatcher.process_one(&path);

        assert!(h.events.lock().unwrap().is_empty());
        assert_eq!(fs::read_dir(&h.output_dir).unwrap().count(), 0);
    }
}
