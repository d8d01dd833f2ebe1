//! The snapshot engine as one object.
//!
//! [`TimeMachine`] wires the project context, ignore engine, shadow store and branch
//! manager together and exposes the operations the CLI and the watcher drive.
//! Every operation that mutates the shadow store runs under
//! [`ProjectContext::lock_store`], so a snapshot, a restore, maintenance and a
//! branch switch never interleave.

use crate::core::{
    branch::{BranchContext, BranchManager},
    config::Settings,
    context::ProjectContext,
    error::Result,
    git::{GitManager, ShadowStore},
    ignore::{CacheLimits, IgnoreEngine},
    snapshot::{Snapshot, SnapshotDetails},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct TimeMachine {
    context: Arc<ProjectContext>,
    settings: Settings,
    ignore: Arc<IgnoreEngine>,
    git: Arc<GitManager>,
    branches: Arc<BranchManager>,
}

impl TimeMachine {
    /// Open the project containing `start`.
    pub fn open<P: AsRef<Path>>(start: P, settings: Settings) -> Result<Self> {
        let context = ProjectContext::discover(start)?;
        Ok(Self::with_context(context, settings))
    }

    pub fn with_context(context: ProjectContext, settings: Settings) -> Self {
        let context = Arc::new(context.with_branch_ttl(settings.branch_cache_ttl()));
        let limits = CacheLimits {
            max_entries: settings.cache_max_entries,
            max_memory_bytes: settings.cache_max_memory_bytes(),
        };
        let ignore = Arc::new(IgnoreEngine::new(context.root(), limits));
        let git = Arc::new(GitManager::new(
            Arc::clone(&context),
            Arc::clone(&ignore),
            &settings,
        ));
        let store: Arc<dyn ShadowStore> = git.clone();
        let branches = Arc::new(BranchManager::new(Arc::clone(&context), store));

        Self {
            context,
            settings,
            ignore,
            git,
            branches,
        }
    }

    pub fn context(&self) -> &Arc<ProjectContext> {
        &self.context
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn ignore(&self) -> &Arc<IgnoreEngine> {
        &self.ignore
    }

    pub fn git(&self) -> &Arc<GitManager> {
        &self.git
    }

    pub fn branches(&self) -> &Arc<BranchManager> {
        &self.branches
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_initialized()
    }

    pub fn initialize(&self) -> Result<()> {
        let _store = self.context.lock_store();
        self.git.initialize()?;
        if let Err(e) = self.branches.refresh_branch_state() {
            log::warn!("Could not read branch state after init: {e}");
        }
        Ok(())
    }

    /// Snapshot the work tree if it changed. Branch state problems are logged and do
    /// not block the snapshot.
    pub fn create_snapshot(&self, message: Option<&str>) -> Result<Option<Snapshot>> {
        self.context.ensure_initialized()?;
        let _store = self.context.lock_store();
        if let Err(e) = self.branches.ensure_valid_branch_state() {
            log::warn!("Branch state check failed, snapshotting on current shadow branch: {e}");
        }
        self.git.create_snapshot(message)
    }

    pub fn list_snapshots(&self, limit: usize, path_filter: Option<&Path>) -> Result<Vec<Snapshot>> {
        self.git.list_snapshots(limit, path_filter)
    }

    pub fn show_snapshot(&self, id: &str) -> Result<SnapshotDetails> {
        self.git.show_snapshot(id)
    }

    pub fn restore_snapshot(&self, id: &str, files: &[PathBuf]) -> Result<()> {
        self.context.ensure_initialized()?;
        let _store = self.context.lock_store();
        if let Err(e) = self.branches.ensure_valid_branch_state() {
            log::warn!("Branch state check failed before restore: {e}");
        }
        self.git.restore_snapshot(id, files)
    }

    pub fn ensure_valid_branch_state(&self) -> Result<()> {
        self.context.ensure_initialized()?;
        let _store = self.context.lock_store();
        self.branches.ensure_valid_branch_state()
    }

    pub fn get_branch_context(&self) -> Result<BranchContext> {
        self.context.ensure_initialized()?;
        self.branches.get_branch_context()
    }

    pub fn snapshot_count(&self) -> Result<usize> {
        self.git.snapshot_count()
    }

    /// Prune the current shadow branch and collect garbage. Returns the number of
    /// snapshots removed.
    pub fn cleanup(&self) -> Result<usize> {
        self.context.ensure_initialized()?;
        let _store = self.context.lock_store();
        self.git.run_maintenance()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::TimeMachineError;
    use std::process::Command;
    use tempfile::TempDir;

    fn setup_engine() -> Result<(TempDir, TimeMachine)> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path();
        for args in [
            vec!["init"],
            vec!["symbolic-ref", "HEAD", "refs/heads/main"],
            vec!["config", "user.name", "Test User"],
            vec!["config", "user.email", "test@example.com"],
        ] {
            Command::new("git").args(&args).current_dir(path).output()?;
        }
        let engine = TimeMachine::open(path, Settings::default())?;
        Ok((temp_dir, engine))
    }

    #[test]
    fn test_uninitialized_engine_refuses_operations() -> Result<()> {
        let (_temp_dir, engine) = setup_engine()?;
        assert!(!engine.is_initialized());
        assert!(matches!(
            engine.create_snapshot(None),
            Err(TimeMachineError::NotInitialized)
        ));
        assert!(matches!(
            engine.get_branch_context(),
            Err(TimeMachineError::NotInitialized)
        ));
        assert!(matches!(engine.cleanup(), Err(TimeMachineError::NotInitialized)));
        Ok(())
    }

    #[test]
    fn test_snapshot_follows_primary_branch() -> Result<()> {
        let (temp_dir, engine) = setup_engine()?;
        engine.initialize()?;
        let root = temp_dir.path();

        std::fs::write(root.join("a.txt"), "main")?;
        engine.create_snapshot(Some("on main"))?;

        Command::new("git")
            .args(["symbolic-ref", "HEAD", "refs/heads/feature"])
            .current_dir(root)
            .output()?;

        std::fs::write(root.join("a.txt"), "feature")?;
        engine.create_snapshot(Some("on feature"))?;

        let context = engine.get_branch_context()?;
        assert_eq!(context.current, "feature");
        assert_eq!(context.shadow, "feature");
        assert!(context.synced);

        let messages: Vec<_> = engine
            .list_snapshots(0, None)?
            .into_iter()
            .map(|s| s.message)
            .collect();
        assert_eq!(messages, vec!["on feature", "on main"]);
        Ok(())
    }

    #[test]
    fn test_external_checkout_shows_drift_until_synced() -> Result<()> {
        let (temp_dir, engine) = setup_engine()?;
        engine.initialize()?;
        assert!(engine.get_branch_context()?.synced);

        Command::new("git")
            .args(["symbolic-ref", "HEAD", "refs/heads/feature"])
            .current_dir(temp_dir.path())
            .output()?;

        let context = engine.get_branch_context()?;
        assert_eq!(context.current, "feature");
        assert_eq!(context.shadow, "main");
        assert!(!context.synced);

        engine.ensure_valid_branch_state()?;
        let context = engine.get_branch_context()?;
        assert_eq!(context.shadow, "feature");
        assert!(context.synced);
        Ok(())
    }

    #[test]
    fn test_snapshot_waits_for_store_lock() -> Result<()> {
        let (temp_dir, engine) = setup_engine()?;
        engine.initialize()?;
        std::fs::write(temp_dir.path().join("a.txt"), "a")?;
        let engine = Arc::new(engine);

        let guard = engine.context().lock_store();
        let handle = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || engine.create_snapshot(Some("locked out")))
        };
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert_eq!(engine.snapshot_count()?, 0);

        drop(guard);
        let snapshot = handle.join().expect("snapshot thread panicked")?;
        assert!(snapshot.is_some());
        assert_eq!(engine.snapshot_count()?, 1);
        Ok(())
    }

    #[test]
    fn test_cleanup_without_history() -> Result<()> {
        let (_temp_dir, engine) = setup_engine()?;
        engine.initialize()?;
        assert_eq!(engine.cleanup()?, 0);
        Ok(())
    }
}
