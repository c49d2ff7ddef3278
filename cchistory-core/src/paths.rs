use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{HistoryError, Result};

pub const JSONL_EXTENSION: &str = "jsonl";
pub const SUBAGENTS_DIR: &str = "subagents";
pub const AGENT_FILE_PREFIX: &str = "agent-";

/// Encodes a filesystem path as a Claude project directory name.
///
/// `:`, `\`, `/` and `.` all become `-`, so the mapping is not reversible.
pub fn encode_path(path: &str) -> String {
    path.chars()
        .map(|ch| match ch {
            ':' | '\\' | '/' | '.' => '-',
            other => other,
        })
        .collect()
}

pub fn session_file(project_dir: &Path, session_id: &str) -> PathBuf {
    project_dir.join(format!("{session_id}.{JSONL_EXTENSION}"))
}

/// Directory holding a session's `subagents/` tree.
pub fn session_dir(project_dir: &Path, session_id: &str) -> PathBuf {
    project_dir.join(session_id)
}

/// Every `<sessionId>.jsonl` directly inside `project_dir`, sorted by session ID.
///
/// A missing project directory yields an empty list.
pub fn list_session_files(project_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let entries = match fs::read_dir(project_dir) {
        Ok(entries) => entries,
        Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(HistoryError::Io {
                path: project_dir.to_path_buf(),
                source,
            });
        }
    };

    let mut sessions = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let is_jsonl = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == JSONL_EXTENSION);
            let session_id = path.file_stem()?.to_str()?.to_string();
            is_jsonl.then_some((session_id, path))
        })
        .collect::<Vec<_>>();
    sessions.sort_by(|(left, _), (right, _)| left.cmp(right));
    Ok(sessions)
}
