//! Scratch repository management for integration tests.

#![allow(dead_code)]

use anyhow::{bail, Result};
use assert_cmd::prelude::*;
use git_timemachine::{Settings, TimeMachine};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// A temporary primary repository. The TempDir must be kept alive for the duration
/// of the test to prevent cleanup.
pub struct TestRepo {
    pub temp_dir: TempDir,
    pub path: PathBuf,
    /// Scratch config directory so tests never read the user's settings.
    pub config_home: TempDir,
}

impl TestRepo {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git_dir(&self) -> PathBuf {
        self.path.join(".git")
    }

    /// Open an engine on this repository with default settings.
    pub fn engine(&self) -> Result<TimeMachine> {
        Ok(TimeMachine::open(&self.path, Settings::default())?)
    }

    /// Command running the binary inside this repository.
    pub fn command(&self) -> Result<Command> {
        let mut cmd = Command::cargo_bin("git-timemachine")?;
        cmd.current_dir(&self.path)
            .env("XDG_CONFIG_HOME", self.config_home.path())
            .env("NO_COLOR", "1");
        Ok(cmd)
    }
}

/// Run git in `repo_path`, failing on a non-zero exit. Returns stdout.
pub fn git(repo_path: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()?;
    if !output.status.success() {
        bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Every file path recorded in snapshot `id`, read straight from the shadow store.
pub fn snapshot_tree(repo: &TestRepo, id: &str) -> Result<Vec<String>> {
    let git_dir = format!("--git-dir={}", repo.git_dir().join("timemachine_snapshots").display());
    let tree = git(
        repo.path(),
        &[&git_dir, "ls-tree", "-r", "--full-tree", "--name-only", id],
    )?;
    Ok(tree.lines().map(str::to_string).collect())
}

/// Fresh repository on branch `main` with a configured identity and no commits.
pub fn setup_test_repo() -> Result<TestRepo> {
    let temp_dir = TempDir::new()?;
    let config_home = TempDir::new()?;
    let path = temp_dir.path().to_path_buf();

    git(&path, &["init", "--quiet"])?;
    git(&path, &["symbolic-ref", "HEAD", "refs/heads/main"])?;
    git(&path, &["config", "user.name", "Test User"])?;
    git(&path, &["config", "user.email", "test@example.com"])?;
    git(&path, &["config", "commit.gpgsign", "false"])?;

    Ok(TestRepo {
        temp_dir,
        path,
        config_home,
    })
}

/// Repository with one commit containing `initial.txt`.
pub fn setup_test_repo_with_initial_commit() -> Result<TestRepo> {
    let repo = setup_test_repo()?;
    create_file(&repo.path, "initial.txt", "initial content\n")?;
    git(&repo.path, &["add", "initial.txt"])?;
    git(&repo.path, &["commit", "--quiet", "-m", "Initial commit"])?;
    Ok(repo)
}

/// Write `content` to `filename`, creating parent directories.
pub fn create_file(repo_path: &Path, filename: &str, content: &str) -> Result<()> {
    let path = repo_path.join(filename);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

pub fn read_file(repo_path: &Path, filename: &str) -> Result<String> {
    Ok(fs::read_to_string(repo_path.join(filename))?)
}

pub fn remove_file(repo_path: &Path, filename: &str) -> Result<()> {
    fs::remove_file(repo_path.join(filename))?;
    Ok(())
}
