use crate::commands::open_engine;
use crate::core::{
    error::{Result, TimeMachineError},
    print_info, print_success,
    watcher::Watcher,
};
use crossbeam_channel::bounded;
use std::sync::Arc;

/// Watch the project in the foreground until interrupted.
pub fn execute_start() -> Result<()> {
    let engine = Arc::new(open_engine()?);
    engine.context().ensure_initialized()?;

    let (signal_tx, signal_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = signal_tx.try_send(());
    })
    .map_err(|e| TimeMachineError::Io(std::io::Error::other(e.to_string())))?;

    let mut watcher = Watcher::new(Arc::clone(&engine));
    watcher.start()?;
    print_success(&format!(
        "Watching {} ({} directories)",
        engine.context().root().display(),
        watcher.watched_directories()
    ));
    print_info("Press Ctrl-C to stop.");

    let _ = signal_rx.recv();
    log::info!("Interrupt received, stopping watcher");
    watcher.stop()?;

    print_success(&format!(
        "Stopped. {} snapshot(s) taken this session.",
        watcher.snapshots_taken()
    ));
    println!();
    Ok(())
}
