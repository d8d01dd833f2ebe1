//! Branch state lifecycle.
//!
//! Keeps the shadow store's active branch aligned with the primary repository's.
//! Branch switches in the primary happen outside this program, so the cached pair in
//! [`BranchState`](crate::core::context::BranchState) is only trusted for its TTL and
//! only while the primary HEAD still has the target it had when the pair was read.
//!
//! States per branch pair:
//! - **Stale**: cache empty, expired or read before the primary HEAD last moved
//! - **Synced**: both stores on the same branch
//! - **Drifted**: the stores disagree
//!
//! Snapshot-producing paths call [`BranchManager::ensure_valid_branch_state`] right
//! before committing, holding [`ProjectContext::lock_store`]; read-only paths call
//! [`BranchManager::get_branch_context`].

use crate::core::{
    context::ProjectContext,
    error::{Result, TimeMachineError},
    git::ShadowStore,
};
use std::sync::Arc;

/// Consistent snapshot of the branch pair, read under one lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchContext {
    pub current: String,
    pub shadow: String,
    pub synced: bool,
}

pub struct BranchManager {
    context: Arc<ProjectContext>,
    store: Arc<dyn ShadowStore>,
}

impl BranchManager {
    pub fn new(context: Arc<ProjectContext>, store: Arc<dyn ShadowStore>) -> Self {
        Self { context, store }
    }

    /// Re-read both active branches and restamp the cache.
    pub fn refresh_branch_state(&self) -> Result<()> {
        let mut state = self.context.branch_state.write();
        let head = self.store.primary_head()?;
        let current = self.store.current_branch()?;
        let shadow = self.store.current_shadow_branch()?;
        log::debug!("Branch state refreshed: primary '{current}', shadow '{shadow}'");
        state.record(current, shadow);
        state.primary_head = Some(head);
        Ok(())
    }

    /// Fails when the cache is stale or a branch name is missing. Never mutates.
    /// Reads the primary HEAD file but starts no process.
    pub fn validate_branch_state(&self) -> Result<()> {
        self.read_context().map(|_| ())
    }

    fn read_context(&self) -> Result<BranchContext> {
        let state = self.context.branch_state.read();
        if !state.is_fresh() {
            return Err(TimeMachineError::BranchCacheStale);
        }
        let head = self.store.primary_head()?;
        if !state.head_matches(&head) {
            log::debug!("Primary HEAD moved to '{head}' since the branch pair was read");
            return Err(TimeMachineError::BranchCacheStale);
        }

        let current = state
            .current_branch
            .clone()
            .filter(|name| !name.is_empty())
            .ok_or(TimeMachineError::BranchNameUnset { store: "primary" })?;
        let shadow = state
            .shadow_branch
            .clone()
            .filter(|name| !name.is_empty())
            .ok_or(TimeMachineError::BranchNameUnset { store: "shadow" })?;

        Ok(BranchContext {
            current,
            shadow,
            synced: state.synced,
        })
    }

    /// Validate, refreshing once if needed, then resynchronize on drift.
    pub fn ensure_valid_branch_state(&self) -> Result<()> {
        if let Err(e) = self.validate_branch_state() {
            log::debug!("Branch state invalid ({e}), refreshing");
            self.refresh_branch_state()?;
            self.validate_branch_state()?;
        }

        let synced = self.context.branch_state.read().synced;
        if !synced {
            self.ensure_branch_sync()?;
        }
        Ok(())
    }

    /// Move the shadow store onto the primary's branch, creating it if needed.
    pub fn ensure_branch_sync(&self) -> Result<()> {
        let mut state = self.context.branch_state.write();
        if state.synced && state.is_fresh() {
            return Ok(());
        }

        let current = state
            .current_branch
            .clone()
            .ok_or(TimeMachineError::BranchNameUnset { store: "primary" })?;

        log::info!(
            "Switching shadow branch from '{}' to '{current}'",
            state.shadow_branch.as_deref().unwrap_or("<unknown>")
        );
        self.store
            .switch_shadow_branch(&current)
            .map_err(|e| TimeMachineError::branch_sync_failed(&current, e.to_string()))?;

        let shadow = self.store.current_shadow_branch()?;
        state.record(current.clone(), shadow);
        if !state.synced {
            return Err(TimeMachineError::branch_sync_failed(
                current,
                "shadow store did not switch",
            ));
        }
        Ok(())
    }

    pub fn invalidate_branch_cache(&self) {
        self.context.branch_state.write().invalidate();
    }

    /// Current branch pair, refreshing the cache first when it is stale.
    pub fn get_branch_context(&self) -> Result<BranchContext> {
        match self.read_context() {
            Ok(context) => Ok(context),
            Err(_) => {
                self.refresh_branch_state()?;
                self.read_context()
            }
        }
    }

    /// React to a change of the primary repository's HEAD file. Waits for any
    /// in-flight store mutation so a snapshot never straddles a branch switch.
    pub fn handle_branch_change(&self) -> Result<()> {
        let _store = self.context.lock_store();
        let mut last_known = self.context.last_known_branch.lock();
        let current = self.store.current_branch()?;

        match last_known.as_deref() {
            Some(previous) if previous == current => {
                log::debug!("HEAD updated, still on branch '{current}'");
            }
            Some(previous) => log::info!("Branch changed: '{previous}' -> '{current}'"),
            None => log::info!("Active branch is '{current}'"),
        }
        *last_known = Some(current);

        self.invalidate_branch_cache();
        self.ensure_valid_branch_state()
    }

    /// Last primary branch seen by branch-change handling.
    pub fn last_known_branch(&self) -> Option<String> {
        self.context.last_known_branch.lock().clone()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::snapshot::Snapshot;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory store tracking only branch names.
    #[derive(Default)]
    pub(crate) struct MockStore {
        pub primary: Mutex<String>,
        pub shadow: Mutex<Option<String>>,
        pub branches: Mutex<HashSet<String>>,
        pub switches: AtomicUsize,
        pub fail_switch: AtomicBool,
    }

    impl MockStore {
        pub fn on(primary: &str, shadow: &str) -> Self {
            let store = Self::default();
            *store.primary.lock() = primary.to_string();
            *store.shadow.lock() = Some(shadow.to_string());
            store.branches.lock().insert(shadow.to_string());
            store
        }
    }

    impl ShadowStore for MockStore {
        fn stage_all(&self) -> Result<()> {
            Ok(())
        }

        fn has_staged_changes(&self) -> Result<bool> {
            Ok(false)
        }

        fn commit(&self, _message: &str) -> Result<String> {
            Ok("0".repeat(40))
        }

        fn log(&self, _limit: usize, _path: Option<&Path>) -> Result<Vec<Snapshot>> {
            Ok(Vec::new())
        }

        fn restore(&self, id: &str, _files: &[PathBuf]) -> Result<()> {
            Err(TimeMachineError::snapshot_not_found(id))
        }

        fn current_branch(&self) -> Result<String> {
            Ok(self.primary.lock().clone())
        }

        fn primary_head(&self) -> Result<String> {
            Ok(format!("ref: refs/heads/{}", self.primary.lock()))
        }

        fn current_shadow_branch(&self) -> Result<String> {
            self.shadow
                .lock()
                .clone()
                .ok_or(TimeMachineError::BranchNameUnset { store: "shadow" })
        }

        fn switch_shadow_branch(&self, branch: &str) -> Result<()> {
            if self.fail_switch.load(Ordering::SeqCst) {
                return Err(TimeMachineError::git_command_failed("symbolic-ref", "locked"));
            }
            self.switches.fetch_add(1, Ordering::SeqCst);
            self.branches.lock().insert(branch.to_string());
            *self.shadow.lock() = Some(branch.to_string());
            Ok(())
        }
    }

    fn manager_with(store: Arc<MockStore>, ttl: Duration) -> BranchManager {
        let context = ProjectContext::from_paths(
            PathBuf::from("/tmp/project"),
            PathBuf::from("/tmp/project/.git"),
        )
        .with_branch_ttl(ttl);
        BranchManager::new(Arc::new(context), store)
    }

    #[test]
    fn test_validate_fails_before_first_refresh() {
        let manager = manager_with(Arc::new(MockStore::on("main", "main")), Duration::from_secs(30));
        assert!(matches!(
            manager.validate_branch_state(),
            Err(TimeMachineError::BranchCacheStale)
        ));
    }

    #[test]
    fn test_refresh_marks_synced_pair() -> Result<()> {
        let manager = manager_with(Arc::new(MockStore::on("main", "main")), Duration::from_secs(30));
        manager.refresh_branch_state()?;
        manager.validate_branch_state()?;

        let context = manager.get_branch_context()?;
        assert_eq!(context.current, "main");
        assert_eq!(context.shadow, "main");
        assert!(context.synced);
        Ok(())
    }

    #[test]
    fn test_ensure_valid_switches_on_drift() -> Result<()> {
        let store = Arc::new(MockStore::on("feature", "main"));
        let manager = manager_with(Arc::clone(&store), Duration::from_secs(30));

        manager.ensure_valid_branch_state()?;

        assert_eq!(store.current_shadow_branch()?, "feature");
        assert!(store.branches.lock().contains("feature"));
        assert_eq!(store.switches.load(Ordering::SeqCst), 1);
        assert!(manager.get_branch_context()?.synced);
        Ok(())
    }

    #[test]
    fn test_synced_state_does_not_switch() -> Result<()> {
        let store = Arc::new(MockStore::on("main", "main"));
        let manager = manager_with(Arc::clone(&store), Duration::from_secs(30));

        manager.ensure_valid_branch_state()?;
        manager.ensure_valid_branch_state()?;
        assert_eq!(store.switches.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn test_external_switch_reported_as_drift_within_ttl() -> Result<()> {
        let store = Arc::new(MockStore::on("main", "main"));
        let manager = manager_with(Arc::clone(&store), Duration::from_secs(30));
        manager.ensure_valid_branch_state()?;

        *store.primary.lock() = "topic".to_string();
        assert!(matches!(
            manager.validate_branch_state(),
            Err(TimeMachineError::BranchCacheStale)
        ));

        let context = manager.get_branch_context()?;
        assert_eq!(context.current, "topic");
        assert_eq!(context.shadow, "main");
        assert!(!context.synced);
        assert_eq!(store.switches.load(Ordering::SeqCst), 0);

        manager.ensure_valid_branch_state()?;
        assert_eq!(store.current_shadow_branch()?, "topic");
        assert!(manager.get_branch_context()?.synced);
        Ok(())
    }

    #[test]
    fn test_branch_change_waits_for_store_lock() -> Result<()> {
        let store = Arc::new(MockStore::on("main", "main"));
        let manager = Arc::new(manager_with(Arc::clone(&store), Duration::from_secs(30)));
        *store.primary.lock() = "feature".to_string();

        let guard = manager.context.lock_store();
        let handle = {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || manager.handle_branch_change())
        };
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(store.switches.load(Ordering::SeqCst), 0);
        assert_eq!(store.current_shadow_branch()?, "main");

        drop(guard);
        handle.join().expect("thread panicked")?;
        assert_eq!(store.switches.load(Ordering::SeqCst), 1);
        assert_eq!(store.current_shadow_branch()?, "feature");
        Ok(())
    }

    #[test]
    fn test_expired_cache_picks_up_switch() -> Result<()> {
        let store = Arc::new(MockStore::on("main", "main"));
        let manager = manager_with(Arc::clone(&store), Duration::from_millis(20));
        manager.ensure_valid_branch_state()?;

        *store.primary.lock() = "topic".to_string();
        std::thread::sleep(Duration::from_millis(40));

        manager.ensure_valid_branch_state()?;
        assert_eq!(store.current_shadow_branch()?, "topic");
        Ok(())
    }

    #[test]
    fn test_zero_ttl_never_validates() {
        let manager = manager_with(Arc::new(MockStore::on("main", "main")), Duration::ZERO);
        assert!(matches!(
            manager.get_branch_context(),
            Err(TimeMachineError::BranchCacheStale)
        ));
    }

    #[test]
    fn test_failed_switch_is_reported() {
        let store = Arc::new(MockStore::on("feature", "main"));
        store.fail_switch.store(true, Ordering::SeqCst);
        let manager = manager_with(Arc::clone(&store), Duration::from_secs(30));

        let result = manager.ensure_valid_branch_state();
        assert!(matches!(result, Err(TimeMachineError::BranchSyncFailed { .. })));
        assert!(!manager.context.branch_state.read().synced);
    }

    #[test]
    fn test_unset_shadow_branch_fails_refresh() {
        let store = Arc::new(MockStore::on("main", "main"));
        *store.shadow.lock() = None;
        let manager = manager_with(store, Duration::from_secs(30));

        assert!(matches!(
            manager.ensure_valid_branch_state(),
            Err(TimeMachineError::BranchNameUnset { store: "shadow" })
        ));
    }

    #[test]
    fn test_handle_branch_change_tracks_last_known() -> Result<()> {
        let store = Arc::new(MockStore::on("main", "main"));
        let manager = manager_with(Arc::clone(&store), Duration::from_secs(30));

        manager.handle_branch_change()?;
        assert_eq!(manager.last_known_branch().as_deref(), Some("main"));

        *store.primary.lock() = "release".to_string();
        manager.handle_branch_change()?;
        assert_eq!(manager.last_known_branch().as_deref(), Some("release"));
        assert_eq!(store.current_shadow_branch()?, "release");
        Ok(())
    }

    #[test]
    fn test_concurrent_handling_converges() -> Result<()> {
        let store = Arc::new(MockStore::on("main", "main"));
        let manager = Arc::new(manager_with(Arc::clone(&store), Duration::from_secs(30)));
        *store.primary.lock() = "feature".to_string();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || manager.handle_branch_change())
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread panicked")?;
        }

        let context = manager.get_branch_context()?;
        assert_eq!(context.current, "feature");
        assert_eq!(context.shadow, "feature");
        assert!(context.synced);
        Ok(())
    }
}
