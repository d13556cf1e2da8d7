//! File watching for config and credential rotation.
//!
//! [`FsWatcher::new`] registers every path or none of them. The open watcher
//! yields change events and backend errors on two separate streams until it
//! is closed.

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Something the watcher reported.
#[derive(Debug)]
pub enum WatchNotice {
    Changed(Event),
    Failed(notify::Error),
}

/// Errors building a watcher.
#[derive(Debug)]
pub enum WatchError {
    /// The watch backend itself could not be created.
    Init { source: notify::Error },
    /// A path could not be registered. Nothing stays registered.
    Register {
        path: PathBuf,
        source: notify::Error,
    },
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchError::Init { source } => {
                write!(f, "failed to create file watcher: {}", source)
            }
            WatchError::Register { path, source } => {
                write!(f, "failed to watch {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WatchError::Init { source } => Some(source),
            WatchError::Register { source, .. } => Some(source),
        }
    }
}

/// An open set of watch registrations. Call [`FsWatcher::close`] when done.
pub struct FsWatcher {
    watcher: RecommendedWatcher,
    registered: Vec<PathBuf>,
    events: mpsc::UnboundedReceiver<Event>,
    errors: mpsc::UnboundedReceiver<notify::Error>,
}

impl fmt::Debug for FsWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsWatcher")
            .field("registered", &self.registered)
            .finish_non_exhaustive()
    }
}

impl FsWatcher {
    /// Watch `paths`, in order. If any registration fails, the ones already
    /// made are released (last first) along with the backend before the
    /// error is returned.
    pub fn new<P: AsRef<Path>>(paths: &[P]) -> Result<Self, WatchError> {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();

        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    if event_tx.send(event).is_err() {
                        tracing::debug!("watch event dropped because the watcher is closed");
                    }
                }
                Err(e) => {
                    if error_tx.send(e).is_err() {
                        tracing::debug!("watch error dropped because the watcher is closed");
                    }
                }
            })
            .map_err(|source| WatchError::Init { source })?;

        let mut registered: Vec<PathBuf> = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            if let Err(source) = watcher.watch(path, RecursiveMode::NonRecursive) {
                release(&mut watcher, &registered);
                return Err(WatchError::Register {
                    path: path.to_path_buf(),
                    source,
                });
            }
            tracing::debug!(path = %path.display(), "watching path");
            registered.push(path.to_path_buf());
        }

        Ok(Self {
            watcher,
            registered,
            events,
            errors,
        })
    }

    /// Paths currently registered, in registration order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.registered
    }

    /// Next change event, or `None` once the backend is gone.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Next asynchronous backend error.
    pub async fn next_error(&mut self) -> Option<notify::Error> {
        self.errors.recv().await
    }

    /// Whichever of the event and error streams produces first.
    pub async fn next_notice(&mut self) -> Option<WatchNotice> {
        tokio::select! {
            Some(event) = self.events.recv() => Some(WatchNotice::Changed(event)),
            Some(error) = self.errors.recv() => Some(WatchNotice::Failed(error)),
            else => None,
        }
    }

    /// Release every registration and the backend.
    pub fn close(mut self) {
        release(&mut self.watcher, &self.registered);
        tracing::debug!(paths = self.registered.len(), "closed file watcher");
    }
}

fn release(watcher: &mut RecommendedWatcher, registered: &[PathBuf]) {
    for path in registered.iter().rev() {
        if let Err(e) = watcher.unwatch(path) {
            tracing::warn!(error = %e, path = %path.display(), "failed to release watch");
        }
    }
}
