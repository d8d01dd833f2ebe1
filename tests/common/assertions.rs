//! Output predicates for CLI tests.

#![allow(dead_code)]

use predicates::prelude::*;
use predicates::str::ContainsPredicate;

pub fn not_in_git_repo() -> ContainsPredicate {
    predicate::str::contains("Not in a git repository")
}

pub fn not_initialized() -> ContainsPredicate {
    predicate::str::contains("not initialized")
}

pub fn success_mark() -> ContainsPredicate {
    predicate::str::contains("✓")
}

pub fn snapshot_not_found() -> ContainsPredicate {
    predicate::str::contains("Snapshot not found")
}

pub fn no_changes() -> ContainsPredicate {
    predicate::str::contains("No changes since the last snapshot")
}
