//! Reboot journal - append-only JSONL record of granted reboot requests

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reboot_common::{Journal, JournalEntry};
use std::path::{Path, PathBuf};
use tokio::fs::{create_dir_all, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Journal backed by a file, one JSON object per line
#[derive(Debug)]
pub struct FileJournal {
    log_path: PathBuf,
}

impl FileJournal {
    pub fn new(log_path: &Path) -> Result<Self> {
        if log_path.as_os_str().is_empty() {
            bail!("Empty journal file provided");
        }

        info!("Journal initialized: {}", log_path.display());
        Ok(Self {
            log_path: log_path.to_path_buf(),
        })
    }

    /// Read all journal entries, skipping lines that do not parse
    pub async fn read_all(&self) -> Result<Vec<JournalEntry>> {
        if !tokio::fs::try_exists(&self.log_path).await.unwrap_or(false) {
            return Ok(vec![]);
        }

        let content = tokio::fs::read_to_string(&self.log_path)
            .await
            .context("Failed to read journal")?;

        let entries = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable journal line: {}", e);
                    None
                }
            })
            .collect();

        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

#[async_trait]
impl Journal for FileJournal {
    async fn record(&self, entry: &JournalEntry) -> Result<()> {
        if let Some(dir) = self.log_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            create_dir_all(dir)
                .await
                .context("Failed to create journal directory")?;
        }

        let json = serde_json::to_string(entry)? + "\n";

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await
            .context("Failed to open journal")?;

        file.write_all(json.as_bytes())
            .await
            .context("Failed to write journal entry")?;

        file.sync_all().await.context("Failed to sync journal")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_journal_appends() {
        let temp_dir = TempDir::new().unwrap();
        let journal = FileJournal::new(&temp_dir.path().join("nested/journal.jsonl")).unwrap();

        assert!(journal.read_all().await.unwrap().is_empty());

        journal.record(&JournalEntry::reboot_requested("updates")).await.unwrap();
        journal.record(&JournalEntry::reboot_requested("kernel")).await.unwrap();

        let entries = journal.read_all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].group, "updates");
        assert_eq!(entries[1].group, "kernel");
        assert_eq!(entries[1].action, "reboot");
    }

    #[tokio::test]
    async fn test_garbage_lines_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal.jsonl");
        std::fs::write(&path, "not json\n\n").unwrap();

        let journal = FileJournal::new(&path).unwrap();
        journal.record(&JournalEntry::reboot_requested("updates")).await.unwrap();

        let entries = journal.read_all().await.unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_empty_path_rejected() {
        assert!(FileJournal::new(Path::new("")).is_err());
    }
}
