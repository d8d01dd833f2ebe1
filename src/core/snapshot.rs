//! Snapshot records read back from the shadow store.
//!
//! # Public API
//! - [`Snapshot`]: One immutable commit of the shadow store
//! - [`ChangedFile`] / [`ChangeKind`]: Paths touched by a snapshot
//! - [`SnapshotDetails`]: A snapshot together with its changed paths
//! - [`auto_snapshot_message`]: Message used when none is supplied

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Prefix of every autogenerated snapshot message.
pub const AUTO_MESSAGE_PREFIX: &str = "Auto-snapshot";

/// Timestamp layout used in autogenerated snapshot messages.
pub const AUTO_MESSAGE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Full commit identifier in the shadow store
    pub id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    pub fn short_id(&self) -> &str {
        let end = self.id.len().min(7);
        &self.id[..end]
    }

    /// Build a snapshot from a unix timestamp in seconds. Out-of-range values
    /// clamp to the epoch.
    pub fn from_unix(id: impl Into<String>, message: impl Into<String>, secs: i64) -> Self {
        let timestamp = Utc.timestamp_opt(secs, 0).single().unwrap_or_default();
        Self {
            id: id.into(),
            message: message.into(),
            timestamp,
        }
    }

    pub fn local_time(&self) -> String {
        self.timestamp
            .with_timezone(&Local)
            .format(AUTO_MESSAGE_TIME_FORMAT)
            .to_string()
    }

    pub fn relative_time(&self) -> String {
        format_relative(self.timestamp, Utc::now())
    }
}

/// Human readable distance between `then` and `now`, e.g. "5 minutes ago".
pub fn format_relative(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    if secs < 0 {
        return "in the future".to_string();
    }

    let (value, unit) = match secs {
        0..=59 => return "just now".to_string(),
        60..=3_599 => (secs / 60, "minute"),
        3_600..=86_399 => (secs / 3_600, "hour"),
        86_400..=2_591_999 => (secs / 86_400, "day"),
        2_592_000..=31_535_999 => (secs / 2_592_000, "month"),
        _ => (secs / 31_536_000, "year"),
    };

    if value == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{value} {unit}s ago")
    }
}

pub fn auto_snapshot_message() -> String {
    format!(
        "{} {}",
        AUTO_MESSAGE_PREFIX,
        Local::now().format(AUTO_MESSAGE_TIME_FORMAT)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Other,
}

impl ChangeKind {
    /// Map a `git diff --name-status` letter to a change kind.
    pub fn from_status_letter(letter: &str) -> Self {
        match letter.chars().next() {
            Some('A') => ChangeKind::Added,
            Some('M') | Some('T') => ChangeKind::Modified,
            Some('D') => ChangeKind::Deleted,
            Some('R') | Some('C') => ChangeKind::Renamed,
            _ => ChangeKind::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Renamed => "renamed",
            ChangeKind::Other => "changed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDetails {
    pub snapshot: Snapshot,
    pub files: Vec<ChangedFile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_relative_time_buckets() {
        let now = Utc::now();
        assert_eq!(format_relative(now, now), "just now");
        assert_eq!(format_relative(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(format_relative(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(format_relative(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(format_relative(now - Duration::days(2), now), "2 days ago");
        assert_eq!(format_relative(now + Duration::hours(1), now), "in the future");
    }

    #[test]
    fn test_short_id() {
        let snapshot = Snapshot::from_unix("0123456789abcdef", "msg", 0);
        assert_eq!(snapshot.short_id(), "0123456");

        let tiny = Snapshot::from_unix("abc", "msg", 0);
        assert_eq!(tiny.short_id(), "abc");
    }

    #[test]
    fn test_auto_message_format() {
        let message = auto_snapshot_message();
        assert!(message.starts_with("Auto-snapshot "));
        let stamp = message.trim_start_matches("Auto-snapshot ");
        assert!(chrono::NaiveDateTime::parse_from_str(stamp, AUTO_MESSAGE_TIME_FORMAT).is_ok());
    }

    #[test]
    fn test_change_kind_letters() {
        assert_eq!(ChangeKind::from_status_letter("A"), ChangeKind::Added);
        assert_eq!(ChangeKind::from_status_letter("M"), ChangeKind::Modified);
        assert_eq!(ChangeKind::from_status_letter("D"), ChangeKind::Deleted);
        assert_eq!(ChangeKind::from_status_letter("R100"), ChangeKind::Renamed);
        assert_eq!(ChangeKind::from_status_letter("X"), ChangeKind::Other);
    }
}
