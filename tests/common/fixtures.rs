//! Prepared repository states.

#![allow(dead_code)]

use super::repository::*;
use anyhow::Result;
use git_timemachine::TimeMachine;

/// Everything observable about the primary repository's own version control state.
#[derive(Debug, PartialEq, Eq)]
pub struct PrimaryState {
    pub index: Vec<u8>,
    pub head: String,
    pub log: String,
    pub staged: String,
    pub branches: String,
}

impl PrimaryState {
    pub fn capture(repo: &TestRepo) -> Result<Self> {
        let index_path = repo.git_dir().join("index");
        let index = if index_path.exists() {
            std::fs::read(index_path)?
        } else {
            Vec::new()
        };

        Ok(Self {
            index,
            head: std::fs::read_to_string(repo.git_dir().join("HEAD"))?,
            log: git(repo.path(), &["log", "--all", "--format=%H %s"]).unwrap_or_default(),
            staged: git(repo.path(), &["diff", "--cached", "--name-status"])?,
            branches: git(repo.path(), &["branch", "--list"])?,
        })
    }
}

/// Committed primary repository with an initialized time machine.
pub fn initialized_repo() -> Result<(TestRepo, TimeMachine)> {
    let repo = setup_test_repo_with_initial_commit()?;
    let engine = repo.engine()?;
    engine.initialize()?;
    Ok((repo, engine))
}

/// Initialized repository with two snapshots of `doc.txt`: "first" then "second".
/// Returns the id of the first snapshot.
pub fn repo_with_two_snapshots() -> Result<(TestRepo, TimeMachine, String)> {
    let (repo, engine) = initialized_repo()?;

    create_file(repo.path(), "doc.txt", "first version\n")?;
    let first = engine
        .create_snapshot(Some("first"))?
        .ok_or_else(|| anyhow::anyhow!("first snapshot was not created"))?;

    create_file(repo.path(), "doc.txt", "second version\n")?;
    engine
        .create_snapshot(Some("second"))?
        .ok_or_else(|| anyhow::anyhow!("second snapshot was not created"))?;

    Ok((repo, engine, first.id))
}
