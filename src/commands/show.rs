use crate::commands::open_engine;
use crate::core::{error::Result, format_changed_file, format_field, print_section_header};
use colored::*;

pub fn execute_show(id: &str) -> Result<()> {
    let engine = open_engine()?;
    let details = engine.show_snapshot(id)?;
    let snapshot = &details.snapshot;

    print_section_header(&format!("Snapshot {}", snapshot.short_id()));
    println!("{}", format_field("Id", &snapshot.id, 8));
    println!(
        "{}",
        format_field(
            "Date",
            &format!("{} ({})", snapshot.local_time(), snapshot.relative_time()),
            8
        )
    );
    println!("{}", format_field("Message", &snapshot.message, 8));

    if details.files.is_empty() {
        println!("\n  {}", "No file changes".bright_black());
    } else {
        println!();
        for file in &details.files {
            println!("{}", format_changed_file(file));
        }
    }
    println!();
    Ok(())
}
