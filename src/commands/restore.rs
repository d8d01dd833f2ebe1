use crate::commands::{open_engine, resolve_user_path};
use crate::core::{error::Result, print_info, print_success};
use std::path::PathBuf;

/// Overwrite working tree files with their content in snapshot `id`. The staging
/// area and history of both repositories are left alone.
pub fn execute_restore(id: &str, files: Vec<PathBuf>) -> Result<()> {
    let engine = open_engine()?;
    let files = files
        .iter()
        .map(|file| resolve_user_path(file))
        .collect::<Result<Vec<_>>>()?;

    engine.restore_snapshot(id, &files)?;

    if files.is_empty() {
        print_success(&format!("Restored working tree from snapshot {id}"));
    } else {
        print_success(&format!(
            "Restored {} file(s) from snapshot {id}",
            files.len()
        ));
    }
    print_info("Your index and commits are unchanged; the next snapshot records this state.");
    Ok(())
}
