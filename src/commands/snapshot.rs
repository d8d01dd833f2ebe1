use crate::commands::open_engine;
use crate::core::{error::Result, print_info, print_success};

pub fn execute_snapshot(message: Option<String>) -> Result<()> {
    let engine = open_engine()?;

    match engine.create_snapshot(message.as_deref())? {
        Some(snapshot) => {
            print_success(&format!(
                "Created snapshot {} {}",
                snapshot.short_id(),
                snapshot.message
            ));
            println!();
        }
        None => print_info("No changes since the last snapshot."),
    }
    Ok(())
}
