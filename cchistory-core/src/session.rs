use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::jsonl::{self, ScanControl};
use crate::model::EntryKind;
use crate::paths::list_session_files;

pub const SESSIONS_INDEX_FILE: &str = "sessions-index.json";
const FIRST_PROMPT_CHARS: usize = 200;

/// Metadata for one session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(rename = "sessionId")]
    pub id: String,
    #[serde(rename = "fullPath")]
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub entry_count: usize,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    /// Whether the log holds at least one user or assistant record.
    #[serde(skip)]
    pub has_conversation: bool,
}

#[derive(Debug, Deserialize)]
struct SessionsIndex {
    #[serde(default)]
    entries: Vec<SessionIndexEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionIndexEntry {
    session_id: String,
    #[serde(default)]
    first_prompt: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    message_count: usize,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    modified: Option<String>,
}

impl SessionIndexEntry {
    fn into_summary(self, path: PathBuf) -> SessionSummary {
        SessionSummary {
            id: self.session_id,
            path,
            first_prompt: self.first_prompt.filter(|prompt| !prompt.is_empty()),
            summary: self.summary.filter(|summary| !summary.is_empty()),
            entry_count: self.message_count,
            created: self.created.as_deref().and_then(parse_index_time),
            modified: self.modified.as_deref().and_then(parse_index_time),
            has_conversation: true,
        }
    }
}

/// Reads one session log: entry count, first/last timestamps and the first user prompt.
pub fn summarize_session(session_id: &str, path: &Path) -> Result<SessionSummary> {
    let mut summary = SessionSummary {
        id: session_id.to_string(),
        path: path.to_path_buf(),
        first_prompt: None,
        summary: None,
        entry_count: 0,
        created: None,
        modified: None,
        has_conversation: false,
    };
    let mut first_seen = false;

    let stats = jsonl::scan(path, |entry| {
        let timestamp = entry.parsed_timestamp();
        if !first_seen {
            first_seen = true;
            summary.created = timestamp;
        }
        if timestamp.is_some() {
            summary.modified = timestamp;
        }

        match entry.kind {
            EntryKind::User => {
                summary.has_conversation = true;
                if summary.first_prompt.is_none() {
                    let text = entry.text_content();
                    if !text.trim().is_empty() {
                        summary.first_prompt = Some(truncate_text(&text, FIRST_PROMPT_CHARS));
                    }
                }
            }
            EntryKind::Assistant => summary.has_conversation = true,
            _ => {}
        }
        ScanControl::Continue
    })?;

    summary.entry_count = stats.entries;
    Ok(summary)
}

/// Every session of a project, most recently active first.
///
/// Sessions listed in `sessions-index.json` take their metadata from the
/// index; the rest are scanned, and those without any user or assistant
/// record are left out. Unreadable logs are skipped.
pub fn list_sessions(project_dir: &Path) -> Result<Vec<SessionSummary>> {
    let mut index = read_sessions_index(project_dir);
    let mut sessions = Vec::new();

    for (session_id, path) in list_session_files(project_dir)? {
        if let Some(entry) = index.remove(&session_id) {
            sessions.push(entry.into_summary(path));
            continue;
        }

        match summarize_session(&session_id, &path) {
            Ok(summary) if summary.has_conversation => sessions.push(summary),
            Ok(_) => {}
            Err(err) => {
                debug!(session_id = %session_id, error = %err, "skipping unreadable session log");
            }
        }
    }

    sessions.sort_by(|left, right| right.modified.cmp(&left.modified));
    Ok(sessions)
}

fn read_sessions_index(project_dir: &Path) -> HashMap<String, SessionIndexEntry> {
    let path = project_dir.join(SESSIONS_INDEX_FILE);
    let Ok(content) = fs::read_to_string(&path) else {
        return HashMap::new();
    };

    match serde_json::from_str::<SessionsIndex>(&content) {
        Ok(index) => index
            .entries
            .into_iter()
            .map(|entry| (entry.session_id.clone(), entry))
            .collect(),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "ignoring unparsable sessions index");
            HashMap::new()
        }
    }
}

fn parse_index_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Collapses whitespace and cuts `input` to `max_chars` characters, marking a cut with `...`.
pub fn truncate_text(input: &str, max_chars: usize) -> String {
    let normalized = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() <= max_chars {
        return normalized;
    }

    let mut out = normalized.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}
