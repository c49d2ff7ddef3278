use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::trace;

use crate::error::{HistoryError, Result};
use crate::model::ConversationEntry;

/// Returned by a scan visitor to keep reading or end the scan early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanControl {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Records handed to the visitor.
    pub entries: usize,
    /// Non-blank lines that did not parse as a record.
    pub malformed: usize,
}

/// Streams every record of a JSONL log through `visit`.
///
/// Blank and malformed lines (including a partially flushed last line) are
/// skipped. Fails only when the file cannot be opened or read.
pub fn scan<F>(path: &Path, mut visit: F) -> Result<ScanStats>
where
    F: FnMut(ConversationEntry) -> ScanControl,
{
    let file = File::open(path).map_err(|source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let mut stats = ScanStats::default();

    for (line_idx, line) in reader.split(b'\n').enumerate() {
        let line = line.map_err(|source| HistoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        let Some(entry) = parse_entry_line(trimmed) else {
            trace!(path = %path.display(), line = line_idx + 1, "skipping malformed line");
            stats.malformed += 1;
            continue;
        };

        stats.entries += 1;
        if visit(entry) == ScanControl::Stop {
            break;
        }
    }

    Ok(stats)
}

pub fn count_entries(path: &Path) -> Result<usize> {
    scan(path, |_| ScanControl::Continue).map(|stats| stats.entries)
}

pub fn first_entry(path: &Path) -> Result<Option<ConversationEntry>> {
    let mut first = None;
    scan(path, |entry| {
        first = Some(entry);
        ScanControl::Stop
    })?;
    Ok(first)
}

fn parse_entry_line(line: &[u8]) -> Option<ConversationEntry> {
    if line.first() != Some(&b'{') {
        return None;
    }
    serde_json::from_slice(line).ok()
}
