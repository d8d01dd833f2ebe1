//! Domain-specific error types and error handling utilities.
//!
//! This module defines [`TimeMachineError`] which covers every failure mode of the
//! snapshot engine. It uses `thiserror` for ergonomic error definitions and includes
//! constructors for the failures that carry context.
//!
//! # Public API
//! - [`TimeMachineError`]: Main error enum covering all failure modes
//! - [`Result<T>`]: Type alias for `std::result::Result<T, TimeMachineError>`
//!
//! # Error Categories
//! - **Environment**: not inside a project, shadow store missing or already present
//! - **External process**: git invocations that fail, time out or cannot start
//! - **Branch state**: stale or unusable branch cache, failed resynchronization
//! - **Snapshots**: unknown snapshot identifiers
//! - **Ignore rules / config / watching**: I/O and parse failures

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Domain-specific error types for git-timemachine
#[derive(Error, Debug)]
pub enum TimeMachineError {
    // Environment errors
    #[error("Not in a git repository")]
    NotInGitRepo,

    #[error("Repository has no working directory")]
    NoWorkingDirectory,

    #[error("Time machine is not initialized. Run 'git-timemachine init' first.")]
    NotInitialized,

    #[error("Time machine is already initialized at '{path}'")]
    AlreadyInitialized { path: PathBuf },

    #[error("Git repository error: {0}")]
    GitRepo(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // External process errors
    #[error("git {command} failed: {output}")]
    GitCommandFailed { command: String, output: String },

    #[error("git {command} timed out after {}s", timeout.as_secs())]
    GitCommandTimeout { command: String, timeout: Duration },

    #[error("Failed to run git {command}: {source}")]
    GitCommandSpawn {
        command: String,
        source: std::io::Error,
    },

    // Branch state errors
    #[error("Branch state cache is empty or expired")]
    BranchCacheStale,

    #[error("Branch name is not set for the {store} store")]
    BranchNameUnset { store: &'static str },

    #[error("Failed to synchronize shadow branch with '{branch}': {message}")]
    BranchSyncFailed { branch: String, message: String },

    // Snapshot errors
    #[error("Snapshot not found: {id}")]
    SnapshotNotFound { id: String },

    // Ignore rules
    #[error("Failed to read ignore file '{path}': {source}")]
    IgnoreFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    // Watcher errors
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Watcher is already running")]
    WatcherAlreadyRunning,

    #[error("Watcher is not running")]
    WatcherNotRunning,

    // Configuration errors
    #[error("Could not find configuration directory")]
    ConfigDirectoryNotFound,

    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    // JSON serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results using TimeMachineError
pub type Result<T> = std::result::Result<T, TimeMachineError>;

impl TimeMachineError {
    /// Create a git command failure carrying the captured combined output
    pub fn git_command_failed(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::GitCommandFailed {
            command: command.into(),
            output: output.into(),
        }
    }

    /// Create a git command timeout error
    pub fn git_command_timeout(command: impl Into<String>, timeout: Duration) -> Self {
        Self::GitCommandTimeout {
            command: command.into(),
            timeout,
        }
    }

    /// Create an error for a git process that could not be started
    pub fn git_command_spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::GitCommandSpawn {
            command: command.into(),
            source,
        }
    }

    /// Create a snapshot not found error
    pub fn snapshot_not_found(id: impl Into<String>) -> Self {
        Self::SnapshotNotFound { id: id.into() }
    }

    /// Create a branch synchronization failure
    pub fn branch_sync_failed(branch: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BranchSyncFailed {
            branch: branch.into(),
            message: message.into(),
        }
    }

    /// Create an ignore file read error
    pub fn ignore_file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IgnoreFileRead {
            path: path.into(),
            source,
        }
    }

    /// Create a config read error
    pub fn config_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigRead {
            path: path.into(),
            source,
        }
    }

    /// Create a config parse error
    pub fn config_parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::ConfigParse {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means the process environment is unusable for the engine
    /// (as opposed to a transient store or branch failure).
    pub fn is_environment_error(&self) -> bool {
        matches!(
            self,
            Self::NotInGitRepo
                | Self::NoWorkingDirectory
                | Self::NotInitialized
                | Self::AlreadyInitialized { .. }
        )
    }
}
