use crate::commands::open_engine;
use crate::core::{error::Result, print_success};

pub fn execute_clean() -> Result<()> {
    let engine = open_engine()?;
    let pruned = engine.cleanup()?;
    let remaining = engine.snapshot_count()?;

    print_success(&format!(
        "Cleaned shadow store: {pruned} snapshot(s) pruned, {remaining} kept"
    ));
    println!();
    Ok(())
}
