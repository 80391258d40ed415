//! Publish history and daily site-link state
//!
//! The ledger is a JSON-lines file that only ever grows: one
//! [`HistoryRecord`] per successful publish. Appends are single
//! `write_all` calls of a complete line, so a crash can at worst leave a
//! torn final line, which [`HistoryLedger::open`] skips on the next start.
//! The next append after such a line starts on a fresh line.
//!
//! The [`SiteUsageMark`] is a separate one-slot file answering "was the
//! site link already posted today" without scanning the ledger.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Result, StorageError};

/// Words shorter than this are ignored by overlap detection
pub const MIN_WORD_LEN: usize = 4;

/// Collapse whitespace and case-fold
pub fn normalize_for_fingerprint(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Hex SHA-256 of the normalized text
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(normalize_for_fingerprint(text).as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Lowercased words with surrounding punctuation stripped
pub fn content_words(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.chars().count() >= MIN_WORD_LEN)
        .collect()
}

/// First `max_chars` characters of `text`
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: DateTime<Utc>,
    pub fingerprint: String,
    pub preview: String,
    pub published_ids: Vec<String>,
    pub site_link_used: bool,
}

impl HistoryRecord {
    /// Calendar day of the record in local time
    pub fn local_date(&self) -> NaiveDate {
        self.timestamp.with_timezone(&Local).date_naive()
    }
}

/// Append-only publish ledger
#[derive(Debug, Default)]
pub struct HistoryLedger {
    path: Option<PathBuf>,
    records: Vec<HistoryRecord>,
    fingerprints: HashSet<String>,
    /// The file ends in a torn line without its newline
    torn_tail: bool,
}

impl HistoryLedger {
    /// Ledger with no backing file
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the ledger at `path`; a missing file is an empty ledger
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the file exists but cannot be read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut ledger = Self {
            path: Some(path.clone()),
            ..Self::default()
        };

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No history at {}, starting empty", path.display());
                return Ok(ledger);
            }
            Err(e) => return Err(StorageError::Io(e).into()),
        };
        ledger.torn_tail = !content.is_empty() && !content.ends_with('\n');

        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(line) {
                Ok(record) => ledger.push(record),
                Err(e) => warn!(
                    "Skipping unreadable history line {} in {}: {}",
                    index + 1,
                    path.display(),
                    e
                ),
            }
        }

        debug!("Loaded {} history record(s)", ledger.records.len());
        Ok(ledger)
    }

    fn push(&mut self, record: HistoryRecord) {
        self.fingerprints.insert(record.fingerprint.clone());
        self.records.push(record);
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record a publish of `text` that produced `published_ids`
    pub fn record(
        &mut self,
        text: &str,
        published_ids: Vec<String>,
        site_link_used: bool,
        preview_len: usize,
    ) -> Result<HistoryRecord> {
        let record = HistoryRecord {
            timestamp: Utc::now(),
            fingerprint: fingerprint(text),
            preview: preview(text, preview_len),
            published_ids,
            site_link_used,
        };
        self.append(record.clone())?;
        Ok(record)
    }

    /// Persist `record` as one line, then make it visible to queries
    pub fn append(&mut self, record: HistoryRecord) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(StorageError::Io)?;
            }
            let mut line = String::new();
            if self.torn_tail {
                line.push('\n');
            }
            line.push_str(&serde_json::to_string(&record).map_err(StorageError::Json)?);
            line.push('\n');

            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(StorageError::Io)?;
            file.write_all(line.as_bytes()).map_err(StorageError::Io)?;
            file.sync_data().map_err(StorageError::Io)?;
            self.torn_tail = false;
        }
        self.push(record);
        Ok(())
    }

    /// Union of content words from the previews of the last `n` records
    pub fn recent_words(&self, n: usize) -> HashSet<String> {
        self.records
            .iter()
            .rev()
            .take(n)
            .flat_map(|r| content_words(&r.preview))
            .collect()
    }

    /// Whether any record on `date` carried the site link
    pub fn site_link_used_on(&self, date: NaiveDate) -> bool {
        self.records
            .iter()
            .rev()
            .take_while(|r| r.local_date() >= date)
            .any(|r| r.site_link_used && r.local_date() == date)
    }
}

/// Single-slot daily flag for the site link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteUsageMark {
    pub date: NaiveDate,
    pub used: bool,
}

impl SiteUsageMark {
    pub fn used_on(&self, date: NaiveDate) -> bool {
        self.date == date && self.used
    }
}

/// File holding the current [`SiteUsageMark`]
#[derive(Debug, Clone)]
pub struct SiteUsageStore {
    path: PathBuf,
}

impl SiteUsageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Current mark; missing or unreadable files count as no mark
    pub fn load(&self) -> Option<SiteUsageMark> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Could not read {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(mark) => Some(mark),
            Err(e) => {
                warn!("Ignoring malformed {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub fn used_on(&self, date: NaiveDate) -> bool {
        self.load().map(|m| m.used_on(date)).unwrap_or(false)
    }

    /// Overwrite the mark
    pub fn store(&self, mark: SiteUsageMark) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }
        let json = serde_json::to_string(&mark).map_err(StorageError::Json)?;
        fs::write(&self.path, json).map_err(StorageError::Io)?;
        Ok(())
    }

    pub fn mark_used(&self, date: NaiveDate) -> Result<()> {
        self.store(SiteUsageMark { date, used: true })
    }
}
