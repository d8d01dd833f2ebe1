//! git-timemachine - automatic, branch-aware snapshots of a git working tree.
//!
//! Snapshots are commits in a shadow repository stored inside the project's `.git`
//! directory. They never touch the project's own index, branches or history.
//!
//! # Public API
//! The main public interface is re-exported from the [`core`] module, which provides:
//! - The [`TimeMachine`] engine and its shadow store
//! - Branch lifecycle tracking
//! - Ignore rule matching
//! - The debounced file system watcher
//! - Error handling and result types

pub mod commands;
pub mod core;

// Re-export the core public API for external users
pub use core::{
    // Branch lifecycle
    BranchContext,
    BranchManager,
    // Ignore rules
    CacheLimits,
    Debouncer,
    // Shadow store
    GitManager,
    IgnoreEngine,
    ProjectContext,
    // Error handling
    Result,
    Settings,
    ShadowStore,
    // Snapshots
    Snapshot,
    SnapshotDetails,
    TimeMachine,
    TimeMachineError,
    // Watching
    Watcher,
    WatcherState,
};
