pub mod clean;
pub mod init;
pub mod list;
pub mod restore;
pub mod show;
pub mod snapshot;
pub mod start;
pub mod status;

pub use clean::*;
pub use init::*;
pub use list::*;
pub use restore::*;
pub use show::*;
pub use snapshot::*;
pub use start::*;
pub use status::*;

use crate::core::{config::Settings, engine::TimeMachine, error::Result};
use std::env;
use std::path::{Path, PathBuf};

/// Open the project containing the current directory with the user's settings.
pub(crate) fn open_engine() -> Result<TimeMachine> {
    let settings = Settings::load()?;
    let current_dir = env::current_dir()?;
    TimeMachine::open(&current_dir, settings)
}

/// Resolve a user supplied path against the current directory.
pub(crate) fn resolve_user_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}
