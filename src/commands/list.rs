use crate::commands::{open_engine, resolve_user_path};
use crate::core::{error::Result, format_snapshot_line, print_info, print_section_header};
use std::path::PathBuf;

pub fn execute_list(limit: usize, path: Option<PathBuf>) -> Result<()> {
    let engine = open_engine()?;
    let filter = path.as_deref().map(resolve_user_path).transpose()?;

    let snapshots = engine.list_snapshots(limit, filter.as_deref())?;
    if snapshots.is_empty() {
        print_info("No snapshots yet.");
        return Ok(());
    }

    print_section_header("Snapshots");
    for snapshot in &snapshots {
        println!("{}", format_snapshot_line(snapshot));
    }
    println!();
    Ok(())
}
