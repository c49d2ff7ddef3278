use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::error::{HistoryError, Result};
use crate::jsonl::{self, ScanControl};
use crate::locator::{find_agent, locate_agent_files};
use crate::model::{ConversationEntry, EntryKind};
use crate::paths::{session_dir, session_file};
use crate::search::{compile_tool_input, normalize_tool_types};
use crate::session::list_sessions;

/// Logs read by [`query_entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryScope {
    /// Every listed session of the project, most recent first.
    Project { include_agents: bool },
    Session {
        session_id: String,
        include_agents: bool,
    },
    /// One agent log, wherever it sits under the session.
    Agent {
        session_id: String,
        agent_id: String,
    },
}

/// Entry filters. Unset or empty criteria impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub kinds: Vec<EntryKind>,
    /// Tool names, compared case-insensitively.
    pub tool_types: Vec<String>,
    /// Regex matched against every string field of every tool input.
    pub tool_input_pattern: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

struct EntryFilter<'a> {
    options: &'a QueryOptions,
    tool_types: BTreeSet<String>,
    tool_input: Option<Regex>,
}

impl<'a> EntryFilter<'a> {
    fn new(options: &'a QueryOptions) -> Result<Self> {
        Ok(Self {
            options,
            tool_types: normalize_tool_types(&options.tool_types),
            tool_input: compile_tool_input(options.tool_input_pattern.as_deref())?,
        })
    }

    fn accepts(&self, entry: &ConversationEntry) -> bool {
        if !self.options.kinds.is_empty() && !self.options.kinds.contains(&entry.kind) {
            return false;
        }
        if !self.in_window(entry.parsed_timestamp()) {
            return false;
        }
        if self.tool_types.is_empty() && self.tool_input.is_none() {
            return true;
        }

        let calls = entry.tool_calls();
        if !self.tool_types.is_empty()
            && !calls
                .iter()
                .any(|tool| self.tool_types.contains(&tool.name.to_ascii_lowercase()))
        {
            return false;
        }
        self.tool_input.as_ref().is_none_or(|regex| {
            calls
                .iter()
                .any(|tool| tool.input.values().any(|value| regex.is_match(value)))
        })
    }

    /// With either bound set, entries without a usable timestamp are excluded.
    fn in_window(&self, timestamp: Option<DateTime<Utc>>) -> bool {
        let (start, end) = (self.options.start_time, self.options.end_time);
        if start.is_none() && end.is_none() {
            return true;
        }
        let Some(ts) = timestamp else {
            return false;
        };
        start.is_none_or(|start| ts >= start) && end.is_none_or(|end| ts <= end)
    }
}

/// Reads the entries of `scope` that pass `options`, in file order.
///
/// Main session logs come before their agents' logs, which follow locator
/// order. Unreadable agent logs, and unreadable sessions in a project-wide
/// query, are skipped.
pub fn query_entries(
    project_dir: &Path,
    scope: &QueryScope,
    options: &QueryOptions,
) -> Result<Vec<ConversationEntry>> {
    if !project_dir.is_dir() {
        return Err(HistoryError::ProjectNotFound {
            path: project_dir.to_path_buf(),
        });
    }
    let filter = EntryFilter::new(options)?;

    match scope {
        QueryScope::Project { include_agents } => {
            let mut entries = Vec::new();
            for session in list_sessions(project_dir)? {
                match query_session(project_dir, &session.id, *include_agents, &filter) {
                    Ok(found) => entries.extend(found),
                    Err(err) => {
                        debug!(session_id = %session.id, error = %err, "skipping unreadable session");
                    }
                }
            }
            Ok(entries)
        }
        QueryScope::Session {
            session_id,
            include_agents,
        } => query_session(project_dir, session_id, *include_agents, &filter),
        QueryScope::Agent {
            session_id,
            agent_id,
        } => {
            let agent = find_agent(&session_dir(project_dir, session_id), agent_id).ok_or_else(|| {
                HistoryError::AgentNotFound {
                    session_id: session_id.clone(),
                    agent_id: agent_id.clone(),
                }
            })?;
            filter_log(&agent.file_path, &filter)
        }
    }
}

fn query_session(
    project_dir: &Path,
    session_id: &str,
    include_agents: bool,
    filter: &EntryFilter<'_>,
) -> Result<Vec<ConversationEntry>> {
    let path = session_file(project_dir, session_id);
    if !path.is_file() {
        return Err(HistoryError::SessionNotFound {
            session_id: session_id.to_string(),
        });
    }

    let mut entries = filter_log(&path, filter)?;
    if !include_agents {
        return Ok(entries);
    }

    for file in locate_agent_files(&session_dir(project_dir, session_id)) {
        match filter_log(&file.path, filter) {
            Ok(found) => entries.extend(found),
            Err(err) => {
                debug!(agent_id = %file.id, error = %err, "skipping unreadable agent log");
            }
        }
    }
    Ok(entries)
}

fn filter_log(path: &Path, filter: &EntryFilter<'_>) -> Result<Vec<ConversationEntry>> {
    let mut entries = Vec::new();
    jsonl::scan(path, |entry| {
        if filter.accepts(&entry) {
            entries.push(entry);
        }
        ScanControl::Continue
    })?;
    Ok(entries)
}
