//! Shadow store operations.
//!
//! This module provides [`GitManager`], the only component that talks to the shadow
//! store. The shadow store is a regular git repository whose metadata lives under the
//! primary repository's metadata directory and whose work tree is the project root.
//! Every invocation passes both locations explicitly, so no command can fall back to
//! operating on the primary repository.
//!
//! # Public API
//! - [`ShadowStore`]: Narrow store interface (stage, commit, log, restore, branches)
//! - [`GitManager`]: `git`-process implementation plus the snapshot operations
//!
//! # Failure semantics
//! A failing git process is reported with its captured output. Nothing is retried
//! here; each call is bounded by the configured timeout.

use crate::core::{
    config::Settings,
    context::ProjectContext,
    error::{Result, TimeMachineError},
    ignore::IgnoreEngine,
    snapshot::{auto_snapshot_message, ChangeKind, ChangedFile, Snapshot, SnapshotDetails},
};
use git2::{ErrorCode, Repository};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Identity used when the primary repository has none configured.
const FALLBACK_USER_NAME: &str = "git-timemachine";
const FALLBACK_USER_EMAIL: &str = "git-timemachine@localhost";

const LOG_FORMAT: &str = "--format=%H%x1f%ct%x1f%s";
const FIELD_SEPARATOR: char = '\x1f';

const MAX_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Storage operations the rest of the engine relies on. [`GitManager`] implements it
/// with `git` processes; tests substitute in-memory stores.
pub trait ShadowStore: Send + Sync {
    /// Stage every non-excluded file of the work tree, including untracked ones.
    fn stage_all(&self) -> Result<()>;
    /// Whether the staged tree differs from the last snapshot.
    fn has_staged_changes(&self) -> Result<bool>;
    /// Commit the staged tree and return the new commit id.
    fn commit(&self, message: &str) -> Result<String>;
    /// Snapshots newest first. `limit == 0` means unbounded.
    fn log(&self, limit: usize, path: Option<&Path>) -> Result<Vec<Snapshot>>;
    /// Overwrite work tree files with their content in `id`. Empty `files` means all.
    fn restore(&self, id: &str, files: &[PathBuf]) -> Result<()>;
    /// Active branch of the primary repository.
    fn current_branch(&self) -> Result<String>;
    /// Raw target of the primary repository's HEAD. Changes whenever the user
    /// switches branches or detaches, without spawning a process.
    fn primary_head(&self) -> Result<String>;
    /// Active branch of the shadow store.
    fn current_shadow_branch(&self) -> Result<String>;
    /// Point the shadow store at `branch`, creating it when missing.
    fn switch_shadow_branch(&self, branch: &str) -> Result<()>;
}

/// Captured result of one git process.
#[derive(Debug)]
struct GitOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl GitOutput {
    fn combined(&self) -> String {
        let stdout = self.stdout.trim();
        let stderr = self.stderr.trim();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, _) => stderr.to_string(),
            (false, true) => stdout.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

pub struct GitManager {
    context: Arc<ProjectContext>,
    ignore: Arc<IgnoreEngine>,
    timeout: Option<Duration>,
    cleanup_threshold: usize,
    max_commits: usize,
    snapshots_created: AtomicUsize,
}

impl GitManager {
    pub fn new(context: Arc<ProjectContext>, ignore: Arc<IgnoreEngine>, settings: &Settings) -> Self {
        Self {
            context,
            ignore,
            timeout: settings.git_command_timeout(),
            cleanup_threshold: settings.git_cleanup_threshold,
            max_commits: settings.git_max_commits,
            snapshots_created: AtomicUsize::new(0),
        }
    }

    pub fn context(&self) -> &ProjectContext {
        &self.context
    }

    /// Build a git command bound to the shadow store and the project work tree.
    fn shadow_command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg(format!("--git-dir={}", self.context.shadow_dir().display()))
            .arg(format!("--work-tree={}", self.context.root().display()))
            .args(["-c", "core.quotepath=off"])
            .args(args)
            .current_dir(self.context.root())
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .env_remove("GIT_INDEX_FILE")
            .env_remove("GIT_OBJECT_DIRECTORY")
            .env_remove("GIT_PREFIX");
        cmd
    }

    fn run(&self, args: &[&str]) -> Result<GitOutput> {
        self.run_with_env(args, &[])
    }

    fn run_with_env(&self, args: &[&str], envs: &[(&str, &str)]) -> Result<GitOutput> {
        let mut cmd = self.shadow_command(args);
        for (key, value) in envs {
            cmd.env(key, value);
        }
        let label = args.join(" ");
        log::debug!("git {label}");
        run_with_timeout(cmd, &label, self.timeout)
    }

    /// Run a git command that must succeed; returns its stdout.
    fn git(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        if !output.success {
            return Err(TimeMachineError::git_command_failed(
                args.join(" "),
                output.combined(),
            ));
        }
        Ok(output.stdout)
    }

    fn has_head(&self) -> Result<bool> {
        Ok(self.run(&["rev-parse", "--verify", "--quiet", "HEAD"])?.success)
    }

    /// Create the shadow store, copy the author identity from the primary repository
    /// and mark the context initialized.
    pub fn initialize(&self) -> Result<()> {
        if self.context.is_initialized() {
            return Err(TimeMachineError::AlreadyInitialized {
                path: self.context.shadow_dir().to_path_buf(),
            });
        }

        std::fs::create_dir_all(self.context.shadow_dir())?;
        self.git(&["init", "--quiet"])?;

        let (name, email) = self.primary_identity();
        self.git(&["config", "user.name", &name])?;
        self.git(&["config", "user.email", &email])?;
        self.git(&["config", "commit.gpgsign", "false"])?;

        match self.current_branch() {
            Ok(branch) => {
                let reference = format!("refs/heads/{branch}");
                self.git(&["symbolic-ref", "HEAD", &reference])?;
            }
            Err(e) => log::warn!("Could not read primary branch, keeping shadow default: {e}"),
        }

        self.sync_exclude_file()?;
        self.context.mark_initialized();
        log::info!(
            "Initialized shadow store at {}",
            self.context.shadow_dir().display()
        );
        Ok(())
    }

    fn primary_identity(&self) -> (String, String) {
        let config = Repository::open(self.context.git_dir()).and_then(|repo| repo.config());
        let lookup = |key: &str| {
            config
                .as_ref()
                .ok()
                .and_then(|config| config.get_string(key).ok())
                .filter(|value| !value.trim().is_empty())
        };

        (
            lookup("user.name").unwrap_or_else(|| FALLBACK_USER_NAME.to_string()),
            lookup("user.email").unwrap_or_else(|| FALLBACK_USER_EMAIL.to_string()),
        )
    }

    /// Mirror the ignore engine's rules into the shadow store's exclude file so
    /// staging skips exactly what the engine skips.
    pub fn sync_exclude_file(&self) -> Result<()> {
        let info_dir = self.context.shadow_dir().join("info");
        std::fs::create_dir_all(&info_dir)?;
        let mut content = String::from("# Generated by git-timemachine\n");
        content.push_str(&self.ignore.exclude_rules());
        std::fs::write(info_dir.join("exclude"), content)?;
        Ok(())
    }

    /// Stage the work tree and commit it if it differs from the last snapshot.
    /// Returns `None` when nothing changed.
    pub fn create_snapshot(&self, message: Option<&str>) -> Result<Option<Snapshot>> {
        self.context.ensure_initialized()?;
        self.sync_exclude_file()?;
        self.stage_all()?;

        if !self.has_staged_changes()? {
            log::debug!("No changes since last snapshot");
            return Ok(None);
        }

        let message = match message {
            Some(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => auto_snapshot_message(),
        };
        let id = self.commit(&message)?;
        let snapshot = self
            .read_snapshot(&id)?
            .ok_or_else(|| TimeMachineError::snapshot_not_found(&id))?;
        log::info!("Created snapshot {} ({})", snapshot.short_id(), snapshot.message);

        let created = self.snapshots_created.fetch_add(1, Ordering::SeqCst) + 1;
        if self.cleanup_threshold > 0 && created % self.cleanup_threshold == 0 {
            if let Err(e) = self.run_maintenance() {
                log::warn!("Shadow store maintenance failed: {e}");
            }
        }

        Ok(Some(snapshot))
    }

    pub fn list_snapshots(&self, limit: usize, path_filter: Option<&Path>) -> Result<Vec<Snapshot>> {
        self.context.ensure_initialized()?;
        self.log(limit, path_filter)
    }

    pub fn restore_snapshot(&self, id: &str, files: &[PathBuf]) -> Result<()> {
        self.context.ensure_initialized()?;
        self.restore(id, files)
    }

    pub fn show_snapshot(&self, id: &str) -> Result<SnapshotDetails> {
        self.context.ensure_initialized()?;
        let full_id = self.resolve_snapshot(id)?;
        let snapshot = self
            .read_snapshot(&full_id)?
            .ok_or_else(|| TimeMachineError::snapshot_not_found(id))?;

        let output = self.git(&[
            "diff-tree",
            "--no-commit-id",
            "--name-status",
            "-r",
            "--root",
            "-M",
            &full_id,
        ])?;
        let files = output.lines().filter_map(parse_name_status).collect();

        Ok(SnapshotDetails { snapshot, files })
    }

    pub fn snapshot_count(&self) -> Result<usize> {
        self.context.ensure_initialized()?;
        if !self.has_head()? {
            return Ok(0);
        }
        let output = self.git(&["rev-list", "--count", "HEAD"])?;
        parse_count(&output)
    }

    /// Full commit id for a user supplied snapshot reference.
    fn resolve_snapshot(&self, id: &str) -> Result<String> {
        if id.trim().is_empty() || id.starts_with('-') {
            return Err(TimeMachineError::snapshot_not_found(id));
        }
        let revision = format!("{id}^{{commit}}");
        let output = self.run(&["rev-parse", "--verify", "--quiet", &revision])?;
        if !output.success {
            return Err(TimeMachineError::snapshot_not_found(id));
        }
        Ok(output.stdout.trim().to_string())
    }

    fn read_snapshot(&self, id: &str) -> Result<Option<Snapshot>> {
        let output = self.git(&["log", "-1", LOG_FORMAT, id, "--"])?;
        Ok(output.lines().find_map(parse_log_line))
    }

    fn relative_to_root(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.strip_prefix(self.context.root())
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| path.to_path_buf())
        } else {
            path.to_path_buf()
        }
    }

    /// Prune history to the configured size and let git collect garbage.
    pub fn run_maintenance(&self) -> Result<usize> {
        let pruned = self.prune_history(self.max_commits)?;
        if pruned > 0 {
            self.git(&["reflog", "expire", "--expire=now", "--all"])?;
            self.git(&["gc", "--prune=now", "--quiet"])?;
        } else {
            self.git(&["gc", "--auto", "--quiet"])?;
        }
        log::info!("Shadow store maintenance finished ({pruned} snapshots pruned)");
        Ok(pruned)
    }

    /// Rewrite the current shadow branch so only its newest `keep` snapshots remain.
    /// Trees, messages, authors and dates are preserved; commit ids change. Returns
    /// the number of snapshots dropped.
    pub fn prune_history(&self, keep: usize) -> Result<usize> {
        self.context.ensure_initialized()?;
        if keep == 0 || !self.has_head()? {
            return Ok(0);
        }

        let total = self.snapshot_count()?;
        if total <= keep {
            return Ok(0);
        }

        let branch = self.current_shadow_branch()?;
        let old_head = self.git(&["rev-parse", "HEAD"])?.trim().to_string();
        let keep_arg = keep.to_string();
        let kept = self.git(&["rev-list", "--first-parent", "--reverse", "-n", &keep_arg, "HEAD"])?;

        let mut parent: Option<String> = None;
        for id in kept.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let meta = self.git(&[
                "log",
                "-1",
                "--format=%T%x1f%an%x1f%ae%x1f%aI%x1f%cn%x1f%ce%x1f%cI%x1f%B",
                id,
                "--",
            ])?;
            let fields: Vec<&str> = meta.splitn(8, FIELD_SEPARATOR).collect();
            let [tree, author, author_email, author_date, committer, committer_email, committer_date, message] =
                fields[..]
            else {
                return Err(TimeMachineError::git_command_failed(
                    "log",
                    format!("unexpected commit metadata for {id}"),
                ));
            };

            let message = message.trim_end();
            let mut args = vec!["commit-tree", tree];
            if let Some(parent) = parent.as_deref() {
                args.extend(["-p", parent]);
            }
            args.extend(["-m", message]);

            let output = self.run_with_env(
                &args,
                &[
                    ("GIT_AUTHOR_NAME", author),
                    ("GIT_AUTHOR_EMAIL", author_email),
                    ("GIT_AUTHOR_DATE", author_date),
                    ("GIT_COMMITTER_NAME", committer),
                    ("GIT_COMMITTER_EMAIL", committer_email),
                    ("GIT_COMMITTER_DATE", committer_date),
                ],
            )?;
            if !output.success {
                return Err(TimeMachineError::git_command_failed(
                    "commit-tree",
                    output.combined(),
                ));
            }
            parent = Some(output.stdout.trim().to_string());
        }

        let Some(new_head) = parent else {
            return Ok(0);
        };
        let reference = format!("refs/heads/{branch}");
        self.git(&["update-ref", &reference, &new_head, &old_head])?;

        let pruned = total - keep;
        log::info!("Pruned {pruned} old snapshots from shadow branch '{branch}'");
        Ok(pruned)
    }
}

impl ShadowStore for GitManager {
    fn stage_all(&self) -> Result<()> {
        self.git(&["add", "--all"])?;
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        if !self.has_head()? {
            let staged = self.git(&["ls-files", "--cached"])?;
            return Ok(!staged.trim().is_empty());
        }

        let output = self.run(&["diff", "--cached", "--quiet", "HEAD", "--"])?;
        match output.code {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(TimeMachineError::git_command_failed(
                "diff --cached",
                output.combined(),
            )),
        }
    }

    fn commit(&self, message: &str) -> Result<String> {
        self.git(&[
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "--no-verify",
            "-m",
            message,
        ])?;
        Ok(self.git(&["rev-parse", "HEAD"])?.trim().to_string())
    }

    fn log(&self, limit: usize, path: Option<&Path>) -> Result<Vec<Snapshot>> {
        if !self.has_head()? {
            return Ok(Vec::new());
        }

        let limit_arg = format!("-n{limit}");
        let mut args = vec!["log", LOG_FORMAT];
        if limit > 0 {
            args.push(&limit_arg);
        }

        let filter = path.map(|p| self.relative_to_root(p).to_string_lossy().into_owned());
        args.push("--");
        if let Some(filter) = filter.as_deref() {
            args.push(filter);
        }

        let output = self.git(&args)?;
        Ok(output.lines().filter_map(parse_log_line).collect())
    }

    fn restore(&self, id: &str, files: &[PathBuf]) -> Result<()> {
        let full_id = self.resolve_snapshot(id)?;
        let source = format!("--source={full_id}");

        let targets: Vec<String> = if files.is_empty() {
            vec![".".to_string()]
        } else {
            files
                .iter()
                .map(|file| self.relative_to_root(file).to_string_lossy().into_owned())
                .collect()
        };

        // --worktree alone leaves the shadow index untouched
        let mut args = vec!["restore", source.as_str(), "--worktree", "--"];
        args.extend(targets.iter().map(String::as_str));
        self.git(&args)?;

        log::info!(
            "Restored {} from snapshot {}",
            if files.is_empty() {
                "all files".to_string()
            } else {
                format!("{} file(s)", files.len())
            },
            &full_id[..full_id.len().min(7)]
        );
        Ok(())
    }

    fn current_branch(&self) -> Result<String> {
        let repo = Repository::open(self.context.git_dir())?;
        let branch = match repo.head() {
            Ok(head) if head.is_branch() => head
                .shorthand()
                .map(str::to_string)
                .ok_or(TimeMachineError::BranchNameUnset { store: "primary" }),
            Ok(head) => {
                let oid = head
                    .target()
                    .ok_or(TimeMachineError::BranchNameUnset { store: "primary" })?
                    .to_string();
                Ok(format!("detached-{}", &oid[..7]))
            }
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                // fresh repository: HEAD names a branch without commits
                let head = repo.find_reference("HEAD")?;
                head.symbolic_target()
                    .and_then(|target| target.strip_prefix("refs/heads/"))
                    .map(str::to_string)
                    .ok_or(TimeMachineError::BranchNameUnset { store: "primary" })
            }
            Err(e) => Err(e.into()),
        };
        branch
    }

    fn primary_head(&self) -> Result<String> {
        let head = std::fs::read_to_string(self.context.head_file())?;
        Ok(head.trim().to_string())
    }

    fn current_shadow_branch(&self) -> Result<String> {
        let output = self.run(&["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        let branch = output.stdout.trim();
        if !output.success || branch.is_empty() {
            return Err(TimeMachineError::BranchNameUnset { store: "shadow" });
        }
        Ok(branch.to_string())
    }

    fn switch_shadow_branch(&self, branch: &str) -> Result<()> {
        let reference = format!("refs/heads/{branch}");
        let exists = self
            .run(&["show-ref", "--verify", "--quiet", &reference])?
            .success;

        if !exists && self.has_head()? {
            self.git(&["branch", branch])
                .map_err(|e| TimeMachineError::branch_sync_failed(branch, e.to_string()))?;
            log::info!("Created shadow branch '{branch}'");
        }

        // ref-level switch: the work tree belongs to the user and is never checked out
        self.git(&["symbolic-ref", "HEAD", &reference])?;
        if self.has_head()? {
            self.git(&["read-tree", "HEAD"])?;
        } else {
            self.git(&["read-tree", "--empty"])?;
        }

        log::debug!("Shadow store now on branch '{branch}'");
        Ok(())
    }
}

fn parse_count(output: &str) -> Result<usize> {
    output.trim().parse().map_err(|_| {
        TimeMachineError::git_command_failed(
            "rev-list --count",
            format!("unexpected output '{}'", output.trim()),
        )
    })
}

fn parse_log_line(line: &str) -> Option<Snapshot> {
    let mut fields = line.splitn(3, FIELD_SEPARATOR);
    let id = fields.next()?.trim();
    let secs = fields.next()?.trim().parse::<i64>().ok()?;
    let message = fields.next().unwrap_or("");
    if id.is_empty() {
        return None;
    }
    Some(Snapshot::from_unix(id, message, secs))
}

fn parse_name_status(line: &str) -> Option<ChangedFile> {
    let mut fields = line.split('\t');
    let status = fields.next()?;
    // renames list the old path first; report where the content lives now
    let path = fields.last()?;
    Some(ChangedFile {
        kind: ChangeKind::from_status_letter(status),
        path: PathBuf::from(path),
    })
}

fn drain<R: Read + Send + 'static>(source: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut source) = source {
            let _ = source.read_to_end(&mut buffer);
        }
        buffer
    })
}

/// Run `cmd` to completion, killing it once `timeout` elapses.
fn run_with_timeout(mut cmd: Command, label: &str, timeout: Option<Duration>) -> Result<GitOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| TimeMachineError::git_command_spawn(label, e))?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match timeout {
        None => child.wait()?,
        Some(limit) => {
            let deadline = Instant::now() + limit;
            let mut interval = Duration::from_millis(1);
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    log::error!("git {label} exceeded {}s, killed", limit.as_secs());
                    return Err(TimeMachineError::git_command_timeout(label, limit));
                }
                thread::sleep(interval);
                interval = (interval * 2).min(MAX_POLL_INTERVAL);
            }
        }
    };

    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    Ok(GitOutput {
        success: status.success(),
        code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}
