//! Size and count of the files a snapshot would contain.

use crate::core::ignore::IgnoreEngine;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

impl TreeStats {
    /// `bytes` rendered with a binary unit, e.g. "1.5 MiB".
    pub fn human_size(&self) -> String {
        const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
        let mut size = self.bytes as f64;
        let mut unit = 0;
        while size >= 1024.0 && unit < UNITS.len() - 1 {
            size /= 1024.0;
            unit += 1;
        }
        if unit == 0 {
            format!("{} {}", self.bytes, UNITS[0])
        } else {
            format!("{size:.1} {}", UNITS[unit])
        }
    }
}

/// Walk `root` skipping everything `ignore` excludes. Unreadable entries are skipped.
/// Symbolic links are counted as files and never followed.
pub fn tree_stats(root: &Path, ignore: &IgnoreEngine) -> TreeStats {
    let mut stats = TreeStats::default();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("Skipping {}: {e}", dir.display());
                continue;
            }
        };

        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if file_type.is_dir() {
                if !ignore.should_ignore_entry(&path, true) {
                    stats.directories += 1;
                }
                // an ignored directory may still hold re-included files
                if ignore.should_descend(&path) {
                    pending.push(path);
                }
                continue;
            }

            if !ignore.should_ignore_entry(&path, false) {
                stats.files += 1;
                stats.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ignore::CacheLimits;
    use tempfile::TempDir;

    #[test]
    fn test_counts_only_included_entries() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("src/nested"))?;
        std::fs::create_dir_all(root.join("target/debug"))?;
        std::fs::create_dir_all(root.join(".git"))?;
        std::fs::write(root.join("src/main.rs"), "12345")?;
        std::fs::write(root.join("src/nested/mod.rs"), "123")?;
        std::fs::write(root.join("target/debug/app"), "binary")?;
        std::fs::write(root.join(".git/HEAD"), "ref: refs/heads/main")?;
        std::fs::write(root.join("notes.log"), "log")?;

        let ignore = IgnoreEngine::from_rules(root, "target/\n*.log\n", CacheLimits::default());
        let stats = tree_stats(root, &ignore);

        assert_eq!(stats.files, 2);
        assert_eq!(stats.directories, 2);
        assert_eq!(stats.bytes, 8);
        Ok(())
    }

    #[test]
    fn test_counts_files_re_included_below_ignored_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("build/deep"))?;
        std::fs::write(root.join("build/keep.txt"), "12")?;
        std::fs::write(root.join("build/out.o"), "binary")?;
        std::fs::write(root.join("build/deep/cache.bin"), "binary")?;

        let ignore = IgnoreEngine::from_rules(root, "build/\n!build/keep.txt\n", CacheLimits::default());
        let stats = tree_stats(root, &ignore);

        assert_eq!(stats.files, 1);
        assert_eq!(stats.directories, 0);
        assert_eq!(stats.bytes, 2);
        Ok(())
    }

    #[test]
    fn test_human_size() {
        let small = TreeStats { bytes: 512, ..TreeStats::default() };
        assert_eq!(small.human_size(), "512 B");
        let large = TreeStats { bytes: 3 * 1024 * 1024 / 2, ..TreeStats::default() };
        assert_eq!(large.human_size(), "1.5 MiB");
    }
}
