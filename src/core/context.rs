//! Long-lived project state shared by every engine component.
//!
//! # Public API
//! - [`ProjectContext`]: Project root, primary and shadow metadata locations,
//!   initialization flag and the lock-protected branch cache
//! - [`BranchState`]: Cached view of the primary and shadow active branches
//!
//! The context is created once per process by walking up from a directory until the
//! primary repository is found, then shared behind an `Arc`.

use crate::core::error::{Result, TimeMachineError};
use git2::Repository;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Directory inside the primary metadata directory that holds the shadow store.
pub const SHADOW_DIR_NAME: &str = "timemachine_snapshots";

pub const DEFAULT_BRANCH_CACHE_TTL: Duration = Duration::from_secs(30);

/// Cached branch pair. `synced` is only meaningful while the cache is fresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchState {
    pub current_branch: Option<String>,
    pub shadow_branch: Option<String>,
    pub synced: bool,
    /// Primary HEAD target when the pair was read. A different target means the user
    /// switched branches since, whatever the TTL says.
    pub primary_head: Option<String>,
    pub cached_at: Option<Instant>,
    pub ttl: Duration,
}

impl BranchState {
    pub fn new(ttl: Duration) -> Self {
        Self {
            current_branch: None,
            shadow_branch: None,
            synced: false,
            primary_head: None,
            cached_at: None,
            ttl,
        }
    }

    pub fn is_fresh(&self) -> bool {
        match self.cached_at {
            Some(at) => at.elapsed() < self.ttl,
            None => false,
        }
    }

    /// Store a freshly read branch pair and restamp the cache.
    pub fn record(&mut self, current: String, shadow: String) {
        self.synced = current == shadow;
        self.current_branch = Some(current);
        self.shadow_branch = Some(shadow);
        self.cached_at = Some(Instant::now());
    }

    pub fn invalidate(&mut self) {
        self.cached_at = None;
        self.primary_head = None;
    }

    /// Whether the recorded primary HEAD target still matches `head`. A pair read
    /// without a HEAD target never matches.
    pub fn head_matches(&self, head: &str) -> bool {
        self.primary_head.as_deref() == Some(head)
    }
}

pub struct ProjectContext {
    root: PathBuf,
    git_dir: PathBuf,
    shadow_dir: PathBuf,
    initialized: AtomicBool,
    /// Written only by the branch lifecycle manager.
    pub branch_state: RwLock<BranchState>,
    /// Last primary branch observed by branch-change handling.
    pub last_known_branch: Mutex<Option<String>>,
    /// Serializes shadow store mutations (staging, commits, restores, branch
    /// switches, maintenance). Taken before any other lock of this context.
    store_lock: Mutex<()>,
}

impl ProjectContext {
    /// Locate the primary repository containing `start`, walking parent directories.
    pub fn discover<P: AsRef<Path>>(start: P) -> Result<Self> {
        let repo = Repository::discover(start).map_err(|_| TimeMachineError::NotInGitRepo)?;
        let root = repo
            .workdir()
            .ok_or(TimeMachineError::NoWorkingDirectory)?
            .to_path_buf();
        let git_dir = repo.path().to_path_buf();
        Ok(Self::from_paths(root, git_dir))
    }

    pub fn from_paths(root: PathBuf, git_dir: PathBuf) -> Self {
        let root = strip_trailing_separator(root);
        let git_dir = strip_trailing_separator(git_dir);
        let shadow_dir = git_dir.join(SHADOW_DIR_NAME);
        let initialized = shadow_dir.join("HEAD").is_file();
        log::debug!(
            "Project root {}, shadow store {} (initialized: {initialized})",
            root.display(),
            shadow_dir.display()
        );

        Self {
            root,
            git_dir,
            shadow_dir,
            initialized: AtomicBool::new(initialized),
            branch_state: RwLock::new(BranchState::new(DEFAULT_BRANCH_CACHE_TTL)),
            last_known_branch: Mutex::new(None),
            store_lock: Mutex::new(()),
        }
    }

    pub fn with_branch_ttl(self, ttl: Duration) -> Self {
        self.branch_state.write().ttl = ttl;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn shadow_dir(&self) -> &Path {
        &self.shadow_dir
    }

    /// The file whose changes signal a branch switch in the primary store.
    pub fn head_file(&self) -> PathBuf {
        self.git_dir.join("HEAD")
    }

    /// Exclusive access to the shadow store for one mutating operation.
    pub fn lock_store(&self) -> MutexGuard<'_, ()> {
        self.store_lock.lock()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(TimeMachineError::NotInitialized)
        }
    }
}

// git2 reports directories with a trailing slash
fn strip_trailing_separator(path: PathBuf) -> PathBuf {
    path.components().collect()
}
