//! Capability traits consumed by the reboot core.
//!
//! Concrete probes, reboot primitives, journals and uptime sources live in the
//! daemon crate; the core only depends on these interfaces. In-memory
//! implementations for tests are in [`crate::fakes`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Health probe for one monitored condition.
///
/// An `Err` is neither healthy nor unhealthy: the condition moves to its
/// error state and needs a fresh success streak afterwards.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Stable name, used as the condition name and metric label
    fn name(&self) -> &str;

    /// Returns `Ok(true)` when no reboot is needed from this checker's view
    async fn is_healthy(&self) -> Result<bool>;
}

/// Gate evaluated before every probe invocation.
pub trait Precondition: Send + Sync {
    fn allowed(&self) -> bool;
}

/// The physical reboot primitive.
#[async_trait]
pub trait Reboot: Send + Sync {
    async fn reboot(&self) -> Result<()>;
}

/// Append-only audit trail of reboot decisions.
#[async_trait]
pub trait Journal: Send + Sync {
    async fn record(&self, entry: &JournalEntry) -> Result<()>;
}

/// Source of the current system uptime.
pub trait UptimeSource: Send + Sync {
    fn uptime(&self) -> Result<Duration>;
}

/// Audit record written right before the reboot primitive is invoked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub group: String,
    pub action: String,
}

impl JournalEntry {
    pub fn reboot_requested(group: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            group: group.to_string(),
            action: "reboot".to_string(),
        }
    }
}

impl fmt::Display for JournalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Group '{}' requested {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, false),
            self.group,
            self.action
        )
    }
}

/// Journal used when no audit file is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopJournal;

#[async_trait]
impl Journal for NoopJournal {
    async fn record(&self, _entry: &JournalEntry) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_journal_entry_display() {
        let entry = JournalEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 4, 5, 6).unwrap(),
            group: "updates".to_string(),
            action: "reboot".to_string(),
        };
        assert_eq!(
            entry.to_string(),
            "2024-03-01T04:05:06+00:00 Group 'updates' requested reboot"
        );
    }

    #[test]
    fn test_journal_entry_serialization() {
        let entry = JournalEntry::reboot_requested("kernel");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"group\":\"kernel\""));
        assert!(json.contains("\"action\":\"reboot\""));

        let back: JournalEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }
}
