//! Shared test utilities for git-timemachine
//!
//! Integration tests run against real git repositories in temporary directories.

pub mod assertions;
pub mod fixtures;
pub mod repository;
