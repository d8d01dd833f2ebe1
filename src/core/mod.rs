//! Core functionality for git-timemachine.
//!
//! This module provides the snapshot engine: ignore rules, debouncing, the shadow
//! store, branch lifecycle tracking, the file system watcher and output helpers.

pub mod branch;
pub mod config;
pub mod context;
pub mod debounce;
pub mod dirs;
pub mod engine;
pub mod error;
pub mod git;
pub mod ignore;
pub mod output;
pub mod snapshot;
pub mod stats;
pub mod watcher;

// === Error handling ===
// Core error types and result type used throughout the application
pub use error::{Result, TimeMachineError};

// === Configuration ===
pub use config::Settings;

// === Engine ===
// Project context, shadow store, branch lifecycle and the facade combining them
pub use branch::{BranchContext, BranchManager};
pub use context::{BranchState, ProjectContext};
pub use engine::TimeMachine;
pub use git::{GitManager, ShadowStore};

// === Snapshots ===
pub use snapshot::{ChangeKind, ChangedFile, Snapshot, SnapshotDetails};

// === Ignore rules ===
pub use ignore::{CacheLimits, CacheStats, IgnoreEngine, IgnorePattern};

// === Watching ===
pub use debounce::Debouncer;
pub use watcher::{Watcher, WatcherState};

// === Utilities ===
pub use stats::{tree_stats, TreeStats};

// === Output formatting ===
// Unified output formatting for consistent CLI presentation
pub use output::{
    format_changed_file, format_field, format_snapshot_line, print_error, print_info,
    print_section_header, print_success, print_warning,
};
