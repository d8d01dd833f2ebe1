use crate::commands::open_engine;
use crate::core::{
    error::Result,
    format_field, format_snapshot_line, print_info, print_section_header, print_warning,
    stats::tree_stats,
};
use colored::*;

const LABEL_WIDTH: usize = 16;

pub fn execute_status() -> Result<()> {
    let engine = open_engine()?;
    let context = engine.context();

    print_section_header("Time machine");
    println!(
        "{}",
        format_field("Project", &context.root().display().to_string(), LABEL_WIDTH)
    );

    if !engine.is_initialized() {
        println!(
            "{}",
            format_field("Store", &"not initialized".red().to_string(), LABEL_WIDTH)
        );
        print_info("Run 'git-timemachine init' to create the snapshot store.");
        return Ok(());
    }

    println!(
        "{}",
        format_field("Store", &context.shadow_dir().display().to_string(), LABEL_WIDTH)
    );

    match engine.get_branch_context() {
        Ok(branches) => {
            let sync = if branches.synced {
                "in sync".green()
            } else {
                "drifted, resyncs on next snapshot".yellow()
            };
            println!("{}", format_field("Branch", &branches.current, LABEL_WIDTH));
            println!(
                "{}",
                format_field(
                    "Shadow branch",
                    &format!("{} ({sync})", branches.shadow),
                    LABEL_WIDTH
                )
            );
        }
        Err(e) => print_warning(&format!("Branch state unavailable: {e}")),
    }

    let count = engine.snapshot_count()?;
    println!("{}", format_field("Snapshots", &count.to_string(), LABEL_WIDTH));

    let ignore = engine.ignore();
    let stats = tree_stats(context.root(), ignore);
    println!(
        "{}",
        format_field(
            "Tracked files",
            &format!(
                "{} files in {} directories, {}",
                stats.files,
                stats.directories,
                stats.human_size()
            ),
            LABEL_WIDTH
        )
    );
    println!(
        "{}",
        format_field("Ignore rules", &ignore.pattern_count().to_string(), LABEL_WIDTH)
    );

    let cache = ignore.cache_stats();
    log::debug!(
        "Ignore cache: {} entries, ~{} bytes, {} hits, {} misses",
        cache.entries,
        cache.memory_bytes,
        cache.hits,
        cache.misses
    );

    if let Some(latest) = engine.list_snapshots(1, None)?.first() {
        print_section_header("Latest snapshot");
        println!("{}", format_snapshot_line(latest));
    }
    println!();
    Ok(())
}
