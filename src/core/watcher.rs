//! File system watcher.
//!
//! Lifecycle: `Idle -> Watching -> Stopping -> Stopped`.
//!
//! [`Watcher::start`] registers every non-ignored directory of the project, watches the
//! primary metadata directory for `HEAD` updates, synchronizes branch state, takes one
//! snapshot and then hands events to a dedicated thread. File events are debounced into
//! snapshots; `HEAD` events go to branch-change handling and never count as file
//! changes.
//!
//! [`Watcher::stop`] is synchronous: once it returns no further snapshot can start.

use crate::core::{
    debounce::Debouncer,
    engine::TimeMachine,
    error::{Result, TimeMachineError},
    ignore::IgnoreEngine,
};
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Events buffered between the notification backend and the event loop. Overflow is
/// dropped: any single surviving event re-arms the same pending snapshot.
const EVENT_BUFFER: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Watching,
    Stopping,
    Stopped,
}

/// State shared between the watcher handle, its event loop and debounce timers.
struct Shared {
    engine: Arc<TimeMachine>,
    debouncer: Debouncer,
    shutting_down: AtomicBool,
    /// Held for the duration of every snapshot so `stop` can wait one out.
    snapshot_lock: Mutex<()>,
    snapshots_taken: AtomicUsize,
    watched_dirs: AtomicUsize,
    head_file: PathBuf,
}

impl Shared {
    fn take_snapshot(&self) {
        let _guard = self.snapshot_lock.lock();
        if self.shutting_down.load(Ordering::SeqCst) {
            log::debug!("Skipping snapshot, watcher is shutting down");
            return;
        }

        match self.engine.create_snapshot(None) {
            Ok(Some(snapshot)) => {
                self.snapshots_taken.fetch_add(1, Ordering::SeqCst);
                log::debug!("Watcher snapshot {}", snapshot.short_id());
            }
            Ok(None) => {}
            Err(e) => log::warn!("Snapshot failed: {e}"),
        }
    }

    fn schedule_snapshot(self: &Arc<Self>) {
        let shared = Arc::clone(self);
        self.debouncer.trigger(move || shared.take_snapshot());
    }

    fn handle_branch_change(&self) {
        if let Err(e) = self.engine.branches().handle_branch_change() {
            log::warn!("Branch change handling failed: {e}");
        }
    }

    fn handle_event(self: &Arc<Self>, watcher: &mut RecommendedWatcher, event: Event) {
        // reads (including git's own while staging) are not changes
        if matches!(event.kind, EventKind::Access(_)) {
            return;
        }

        let ignore = self.engine.ignore();
        let git_dir = self.engine.context().git_dir();
        let mut head_changed = false;
        let mut files_changed = false;

        for path in &event.paths {
            if *path == self.head_file {
                head_changed = true;
                continue;
            }
            if path.starts_with(git_dir) {
                continue;
            }

            if path == ignore.ignore_file() {
                if let Err(e) = ignore.reload_ignore_file() {
                    log::warn!("Could not reload ignore rules: {e}");
                }
            }

            if matches!(event.kind, EventKind::Create(_)) && path.is_dir() && ignore.should_descend(path) {
                let added = register_tree(watcher, path, ignore);
                self.watched_dirs.fetch_add(added, Ordering::SeqCst);
            }

            if !ignore.should_ignore(path) {
                files_changed = true;
            }
        }

        if head_changed {
            self.handle_branch_change();
        }
        if files_changed {
            self.schedule_snapshot();
        }
    }
}

pub struct Watcher {
    shared: Arc<Shared>,
    state: Mutex<WatcherState>,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watcher {
    pub fn new(engine: Arc<TimeMachine>) -> Self {
        let delay = engine.settings().debounce_delay();
        let head_file = engine.context().head_file();
        Self {
            shared: Arc::new(Shared {
                engine,
                debouncer: Debouncer::new(delay),
                shutting_down: AtomicBool::new(false),
                snapshot_lock: Mutex::new(()),
                snapshots_taken: AtomicUsize::new(0),
                watched_dirs: AtomicUsize::new(0),
                head_file,
            }),
            state: Mutex::new(WatcherState::Idle),
            stop_tx: None,
            handle: None,
        }
    }

    pub fn state(&self) -> WatcherState {
        *self.state.lock()
    }

    /// Snapshots committed by this watcher, including the one taken on start.
    pub fn snapshots_taken(&self) -> usize {
        self.shared.snapshots_taken.load(Ordering::SeqCst)
    }

    pub fn watched_directories(&self) -> usize {
        self.shared.watched_dirs.load(Ordering::SeqCst)
    }

    pub fn start(&mut self) -> Result<()> {
        {
            let state = self.state.lock();
            if matches!(*state, WatcherState::Watching | WatcherState::Stopping) {
                return Err(TimeMachineError::WatcherAlreadyRunning);
            }
        }

        let engine = &self.shared.engine;
        engine.context().ensure_initialized()?;
        self.shared.shutting_down.store(false, Ordering::SeqCst);

        let (event_tx, event_rx) = bounded::<notify::Result<Event>>(EVENT_BUFFER);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Err(TrySendError::Full(_)) = event_tx.try_send(res) {
                log::debug!("Event buffer full, dropping event");
            }
        })?;

        let root = engine.context().root().to_path_buf();
        let registered = register_tree(&mut watcher, &root, engine.ignore());
        self.shared.watched_dirs.store(registered, Ordering::SeqCst);
        watcher.watch(engine.context().git_dir(), RecursiveMode::NonRecursive)?;
        log::info!("Watching {registered} directories under {}", root.display());

        self.shared.handle_branch_change();
        self.shared.take_snapshot();

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("timemachine-watcher".to_string())
            .spawn(move || run_event_loop(watcher, event_rx, stop_rx, shared))?;

        self.stop_tx = Some(stop_tx);
        self.handle = Some(handle);
        *self.state.lock() = WatcherState::Watching;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != WatcherState::Watching {
                return Err(TimeMachineError::WatcherNotRunning);
            }
            *state = WatcherState::Stopping;
        }

        self.shared.shutting_down.store(true, Ordering::SeqCst);
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Watcher event loop panicked");
            }
        }

        self.shared.debouncer.cancel();
        // wait out a snapshot that was already running
        drop(self.shared.snapshot_lock.lock());

        *self.state.lock() = WatcherState::Stopped;
        log::info!("Watcher stopped");
        Ok(())
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if self.state() == WatcherState::Watching {
            let _ = self.stop();
        }
    }
}

fn run_event_loop(
    mut watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
    stop: Receiver<()>,
    shared: Arc<Shared>,
) {
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(events) -> message => match message {
                Ok(Ok(event)) => shared.handle_event(&mut watcher, event),
                Ok(Err(e)) => log::warn!("File watch error: {e}"),
                Err(_) => break,
            },
        }
    }
    // dropping the backend closes the notification source
    drop(watcher);
    log::debug!("Watcher event loop exited");
}

/// Watch `dir` and every directory below it that may hold included files, one level
/// at a time. Registration failures are logged and skipped. Returns the number
/// registered.
fn register_tree(watcher: &mut RecommendedWatcher, dir: &Path, ignore: &IgnoreEngine) -> usize {
    let mut pending = vec![dir.to_path_buf()];
    let mut registered = 0;

    while let Some(dir) = pending.pop() {
        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            log::warn!("Could not watch {}: {e}", dir.display());
            continue;
        }
        registered += 1;

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Could not list {}: {e}", dir.display());
                continue;
            }
        };
        for entry in entries.flatten() {
            // symlinked directories are not followed
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let path = entry.path();
            if is_dir && ignore.should_descend(&path) {
                pending.push(path);
            }
        }
    }

    registered
}
