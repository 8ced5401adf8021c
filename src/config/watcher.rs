//! File watcher for the active configuration file.
//!
//! Watches the file's parent directory (non-recursively, so editors that save
//! by rename keep working) through a debounced notifier, then filters each
//! debounced batch down to writes on that file. One batch produces at most one
//! reload, so a burst of saves is seen once.
//!
//! The listener runs on its own thread. [`WatchHandle::stop`] stops the
//! debouncer, signals shutdown and joins the thread, so nothing fires after it
//! returns.

use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, Result};

thread_local! {
    static ON_LISTENER: Cell<bool> = const { Cell::new(false) };
}

/// Whether the current thread is a watch listener (i.e. we are inside a change callback).
pub(crate) fn on_listener_thread() -> bool {
    ON_LISTENER.with(Cell::get)
}

/// Configuration for the file watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Quiet period after the last event before a burst is delivered as one batch.
    pub debounce_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(100),
        }
    }
}

enum WatchMessage {
    Fs(DebounceEventResult),
    Shutdown,
}

/// Handle to a running listener. Exactly one exists per active watch.
pub(crate) struct WatchHandle {
    target: PathBuf,
    debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
    tx: mpsc::Sender<WatchMessage>,
    cancelled: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Start watching `file`, calling `on_write` once per debounced write batch.
    pub(crate) fn start<F>(file: &Path, config: WatcherConfig, on_write: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let target = std::fs::canonicalize(file).map_err(|e| ConfigError::file(file, e))?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));

        let (tx, rx) = mpsc::channel();
        let notify_tx = tx.clone();
        let mut debouncer = new_debouncer(
            config.debounce_duration,
            None,
            move |result: DebounceEventResult| {
                // Receiver gone means the listener already exited
                let _ = notify_tx.send(WatchMessage::Fs(result));
            },
        )?;
        debouncer.watch(&dir, RecursiveMode::NonRecursive)?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let listener = Listener {
            target: target.clone(),
            cancelled: Arc::clone(&cancelled),
            on_write,
        };
        let thread = thread::Builder::new()
            .name("confstack-watch".into())
            .spawn(move || {
                ON_LISTENER.with(|flag| flag.set(true));
                listener.run(rx);
            })?;

        info!(path = %target.display(), "Watching config file");
        Ok(Self {
            target,
            debouncer: Some(debouncer),
            tx,
            cancelled,
            thread: Some(thread),
        })
    }

    /// Stop the listener and wait for it to exit.
    ///
    /// Called from the listener thread itself (inside a change callback), the
    /// thread is detached instead; it exits as soon as the callback returns.
    pub(crate) fn stop(mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(debouncer) = self.debouncer.take() {
            debouncer.stop();
        }
        let _ = self.tx.send(WatchMessage::Shutdown);

        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                debug!(path = %self.target.display(), "Config watcher stopped from its own callback");
                return;
            }
            if thread.join().is_err() {
                error!(path = %self.target.display(), "Config watcher thread panicked");
            }
        }
        info!(path = %self.target.display(), "Config watcher stopped");
    }
}

struct Listener<F> {
    target: PathBuf,
    cancelled: Arc<AtomicBool>,
    on_write: F,
}

impl<F: FnMut()> Listener<F> {
    fn run(mut self, rx: mpsc::Receiver<WatchMessage>) {
        loop {
            match rx.recv() {
                Ok(WatchMessage::Fs(Ok(events))) => {
                    let Some(event) = events.iter().find(|e| self.is_write(&e.event)) else {
                        continue;
                    };
                    debug!(
                        path = %self.target.display(),
                        kind = ?event.event.kind,
                        batch = events.len(),
                        "Config write detected"
                    );
                    if self.cancelled.load(Ordering::SeqCst) {
                        break;
                    }
                    (self.on_write)();
                }
                Ok(WatchMessage::Fs(Err(errors))) => {
                    for e in errors {
                        warn!(path = %self.target.display(), error = %e, "File watcher error");
                    }
                }
                Ok(WatchMessage::Shutdown) | Err(_) => break,
            }
        }
        debug!(path = %self.target.display(), "Config watcher loop exited");
    }

    fn is_write(&self, event: &notify::Event) -> bool {
        is_write_kind(&event.kind)
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == self.target.file_name())
    }
}

/// Event kinds that mean the file content may have changed.
fn is_write_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Name(
                RenameMode::To | RenameMode::Both | RenameMode::Any
            ))
    )
}
