//! Directory watch loop - bridges filesystem notifications into the dispatcher
//!
//! Includes:
//! - Non-recursive notify subscription on the source folder
//! - Single dispatch loop consuming a channel of discrete change events
//! - Optional one-time backlog scan of pre-existing files
//! - Non-blocking session stop via a shared cancellation token

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};

use log::{info, warn};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use path_clean::PathClean;
use walkdir::WalkDir;

use crate::common::EVENT_POLL_INTERVAL;
use crate::common::errors::PipelineError;
use crate::config::WatchConfig;
use crate::workflow::dispatcher::Dispatcher;
use crate::workflow::types::{CancelToken, RunState, StatusSink};

/// Handle to a running watch session. Dropping the handle cancels the
/// session; `stop` does the same without waiting for in-flight work.
#[derive(Debug)]
pub struct WatchSession {
    token: CancelToken,
    state: Arc<RunState>,
    worker: Option<JoinHandle<()>>,
    backlog: Option<JoinHandle<()>>,
}

impl WatchSession {
    /// Signal the loop to exit. Non-blocking: an in-flight composite is not
    /// interrupted, but no new file will be dispatched once this returns.
    pub fn stop(&self) {
        self.token.cancel();
        self.state.running.store(false, Ordering::SeqCst);
    }

    pub fn state(&self) -> Arc<RunState> {
        self.state.clone()
    }

    /// Block until the session ends (i.e. until `stop` is called from
    /// another thread or the process is killed).
    pub fn join(mut self) {
        if let Some(handle) = self.backlog.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Validate the configuration, attach the filesystem subscription and start
/// the dispatch loop (plus the backlog scan if configured). Fails fast with
/// `ConfigInvalid` or `WatchSubscriptionFailed` before anything runs.
pub fn start_watching(config: WatchConfig, sink: StatusSink) -> Result<WatchSession, PipelineError> {
    config.validate()?;

    let state = Arc::new(RunState::default());
    let token = CancelToken::new();
    let dispatcher = Arc::new(Dispatcher::new(
        config.clone(),
        state.clone(),
        token.clone(),
        sink,
    ));

    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher =
        notify::recommended_watcher(tx).map_err(|cause| PipelineError::WatchSubscriptionFailed {
            path: config.source_folder.clone(),
            cause,
        })?;
    watcher
        .watch(&config.source_folder, RecursiveMode::NonRecursive)
        .map_err(|cause| PipelineError::WatchSubscriptionFailed {
            path: config.source_folder.clone(),
            cause,
        })?;

    state.running.store(true, Ordering::SeqCst);
    info!("Watching {:?} for new images", config.source_folder);

    let backlog = config.process_backlog.then(|| {
        let dispatcher = dispatcher.clone();
        let token = token.clone();
        let source = config.source_folder.clone();
        thread::spawn(move || scan_backlog(&source, &dispatcher, &token))
    });

    let worker = thread::spawn({
        let token = token.clone();
        let state = state.clone();
        move || {
            // The subscription lives exactly as long as the dispatch loop.
            let _watcher = watcher;
            event_loop(&rx, &dispatcher, &token);
            state.running.store(false, Ordering::SeqCst);
        }
    });

    Ok(WatchSession {
        token,
        state,
        worker: Some(worker),
        backlog,
    })
}

/// Consume change events until cancelled. The idle wait polls so the token
/// is observed promptly even when the folder stays quiet.
fn event_loop(
    rx: &Receiver<notify::Result<Event>>,
    dispatcher: &Dispatcher,
    token: &CancelToken,
) {
    while !token.is_cancelled() {
        match rx.recv_timeout(EVENT_POLL_INTERVAL) {
            Ok(Ok(event)) => dispatch_event(&event, dispatcher, token),
            Ok(Err(e)) => warn!("Watch backend reported an error: {e}"),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Hand qualifying arrival events to the dispatcher. Only creations and
/// moves *into* the folder count; a rename that carries both endpoints
/// contributes its destination path only.
fn dispatch_event(event: &Event, dispatcher: &Dispatcher, token: &CancelToken) {
    let arrivals: &[PathBuf] = match &event.kind {
        EventKind::Create(_) => &event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => &event.paths,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            &event.paths[event.paths.len().saturating_sub(1)..]
        }
        _ => return,
    };

    for path in arrivals {
        if token.is_cancelled() {
            return;
        }
        dispatcher.process_one(&path.clean());
    }
}

/// One-time scan of files already present in the source folder, in stable
/// name order, funneled through the same dispatcher as live events. Checks
/// the token between files so a stop is honored promptly.
fn scan_backlog(source: &Path, dispatcher: &Dispatcher, token: &CancelToken) {
    info!("Scanning for existing files in {:?}", source);

    for entry in WalkDir::new(source)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        if token.is_cancelled() {
            info!("Backlog scan stopped before completion");
            return;
        }
        match entry {
            Ok(entry) if entry.file_type().is_file() => dispatcher.process_one(entry.path()),
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable directory entry: {e}"),
        }
    }

    info!(
        "Finished processing existing files ({} processed)",
        dispatcher.state().processed()
    );
}
