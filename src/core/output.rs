//! Terminal output helpers shared by all commands.
//!
//! Colors: red for errors, yellow for warnings, green for success, bright_black for
//! secondary details such as ids and timestamps. Every message is surrounded by a
//! blank line so command output stands apart from the shell prompt.

use crate::core::snapshot::{ChangeKind, ChangedFile, Snapshot};
use colored::*;

/// Prints `✕ Error: <message>` in red.
pub fn print_error(message: &str) {
    eprintln!("\n{} {}\n", "✕ Error:".red(), message.white());
}

pub fn print_warning(message: &str) {
    eprintln!("\n{} {}", "! Warning:".yellow(), message.white());
}

/// Prints `✓ <message>` with a green checkmark.
pub fn print_success(message: &str) {
    println!("\n{} {}", "✓".green(), message.white());
}

pub fn print_info(message: &str) {
    println!("\n{}\n", message.white());
}

/// Prints `<header>:` on its own line.
pub fn print_section_header(header: &str) {
    println!("\n{}:\n", header.white());
}

/// `<label>  <value>` with the label padded to `width`.
pub fn format_field(label: &str, value: &str, width: usize) -> String {
    let label = format!("{label:<width$}");
    format!("  {}  {}", label.bright_black(), value.white())
}

/// One line of snapshot listing: short id, local time, relative time, message.
pub fn format_snapshot_line(snapshot: &Snapshot) -> String {
    format!(
        "  {}  {}  {}  {}",
        snapshot.short_id().yellow(),
        snapshot.local_time().bright_black(),
        format!("({})", snapshot.relative_time()).bright_black(),
        snapshot.message.white()
    )
}

pub fn format_changed_file(file: &ChangedFile) -> String {
    let label = format!("{:<9}", file.kind.label());
    let label = match file.kind {
        ChangeKind::Added => label.green(),
        ChangeKind::Modified => label.yellow(),
        ChangeKind::Deleted => label.red(),
        ChangeKind::Renamed => label.cyan(),
        ChangeKind::Other => label.bright_black(),
    };
    format!("  {}  {}", label, file.path.display())
}
