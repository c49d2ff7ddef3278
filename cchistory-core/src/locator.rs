use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::jsonl;
use crate::model::Agent;
use crate::paths::{AGENT_FILE_PREFIX, JSONL_EXTENSION, SUBAGENTS_DIR};

/// Spawn generations explored below a session (`subagents/agent-<id>/subagents/...`).
pub const MAX_NESTING_DEPTH: usize = 3;

const AGENT_TYPE_PREFIXES: &[(&str, &str)] = &[
    ("aprompt_suggestion-", "prompt_suggestion"),
    ("aexplore-", "explore"),
    ("acompact-", "compact"),
];

/// An agent log found on disk, before its contents are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentFile {
    pub id: String,
    pub path: PathBuf,
    /// Spawn generation: 0 for agents directly under the session.
    pub nesting: usize,
}

/// Enumerates every agent log under `session_dir`, at most
/// [`MAX_NESTING_DEPTH`] generations deep.
///
/// Within one `subagents/` directory, agent files come first in file-name
/// order, then the nested directories. Deeper levels are ignored silently and
/// a missing `subagents/` directory yields nothing.
pub fn locate_agent_files(session_dir: &Path) -> Vec<AgentFile> {
    let subagents_dir = session_dir.join(SUBAGENTS_DIR);
    if !subagents_dir.is_dir() {
        return Vec::new();
    }

    // Level n files sit at walk depth 2n+1: subagents/agent-x/subagents/agent-y.jsonl
    WalkDir::new(&subagents_dir)
        .max_depth(2 * MAX_NESTING_DEPTH - 1)
        .sort_by(|left, right| {
            left.file_type()
                .is_dir()
                .cmp(&right.file_type().is_dir())
                .then_with(|| left.file_name().cmp(right.file_name()))
        })
        .into_iter()
        .filter_entry(is_nested_agent_path)
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!(dir = %subagents_dir.display(), error = %err, "skipping unreadable agent entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && entry.depth() % 2 == 1)
        .filter_map(|entry| {
            let id = agent_id_from_path(entry.path())?;
            Some(AgentFile {
                id,
                nesting: entry.depth() / 2,
                path: entry.into_path(),
            })
        })
        .collect()
}

/// Agent records for every located agent file. Unreadable files are kept with
/// zero entries so no discovered agent goes missing.
pub fn discover_agents(session_dir: &Path) -> Vec<Agent> {
    locate_agent_files(session_dir)
        .into_iter()
        .map(load_agent)
        .collect()
}

/// Looks up one agent by exact ID, also accepting the `agent-` file prefix.
pub fn find_agent(session_dir: &Path, agent_id: &str) -> Option<Agent> {
    let files = locate_agent_files(session_dir);
    let normalized = normalize_agent_id(agent_id);

    files
        .iter()
        .position(|file| file.id == agent_id)
        .or_else(|| files.iter().position(|file| file.id == normalized))
        .map(|idx| load_agent(files[idx].clone()))
}

pub fn parse_agent_type(agent_id: &str) -> String {
    AGENT_TYPE_PREFIXES
        .iter()
        .find(|(prefix, _)| agent_id.starts_with(prefix))
        .map(|(_, agent_type)| (*agent_type).to_string())
        .unwrap_or_default()
}

fn load_agent(file: AgentFile) -> Agent {
    let entry_count = jsonl::count_entries(&file.path).unwrap_or_else(|err| {
        debug!(agent_id = %file.id, error = %err, "cannot count agent entries");
        0
    });
    let session_id = jsonl::first_entry(&file.path)
        .ok()
        .flatten()
        .and_then(|entry| entry.session_id)
        .unwrap_or_default();

    Agent {
        agent_type: parse_agent_type(&file.id),
        id: file.id,
        session_id,
        file_path: file.path,
        entry_count,
    }
}

fn is_nested_agent_path(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }

    let Some(name) = entry.file_name().to_str() else {
        return false;
    };
    if entry.depth() % 2 == 1 {
        name.starts_with(AGENT_FILE_PREFIX)
    } else {
        name == SUBAGENTS_DIR
    }
}

fn agent_id_from_path(path: &Path) -> Option<String> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(JSONL_EXTENSION) {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.strip_prefix(AGENT_FILE_PREFIX))
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
}

fn normalize_agent_id(agent_id: &str) -> &str {
    agent_id.strip_prefix(AGENT_FILE_PREFIX).unwrap_or(agent_id)
}
