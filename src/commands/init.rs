use crate::commands::open_engine;
use crate::core::{error::Result, print_info, print_success};

pub fn execute_init() -> Result<()> {
    let engine = open_engine()?;

    if engine.is_initialized() {
        print_info(&format!(
            "Time machine already initialized at {}",
            engine.context().shadow_dir().display()
        ));
        return Ok(());
    }

    engine.initialize()?;
    print_success(&format!(
        "Initialized time machine in {}",
        engine.context().root().display()
    ));
    print_info("Run 'git-timemachine start' to begin taking snapshots.");
    Ok(())
}
