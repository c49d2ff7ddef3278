use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use crate::error::{HistoryError, Result};
use crate::jsonl::{self, ScanControl};
use crate::locator::{locate_agent_files, parse_agent_type};
use crate::model::{AgentMatch, EntryKind, FindAgentsOptions};
use crate::paths::{list_session_files, session_dir};
use crate::pattern::matches_file_pattern;

/// Criteria compiled once per search. Empty strings count as unset.
struct Criteria<'a> {
    options: &'a FindAgentsOptions,
    explored: Option<&'a str>,
    tool_types: BTreeSet<String>,
    tool_input: Option<Regex>,
}

impl Criteria<'_> {
    fn in_window(&self, timestamp: Option<DateTime<Utc>>) -> bool {
        if let Some(start) = self.options.start_time
            && timestamp.is_none_or(|ts| ts < start)
        {
            return false;
        }
        if let Some(end) = self.options.end_time
            && timestamp.is_some_and(|ts| ts > end)
        {
            return false;
        }
        true
    }

    fn accepts(&self, files: &BTreeSet<String>, tools: &BTreeSet<String>, input_matched: bool) -> bool {
        if self.explored.is_some() && files.is_empty() {
            return false;
        }
        if !self.tool_types.is_empty() && self.tool_types.is_disjoint(tools) {
            return false;
        }
        self.tool_input.is_none() || input_matched
    }
}

/// Finds the sessions and agents of a project whose activity meets every given criterion.
///
/// Main session logs take part as agents with an empty agent ID. Criteria are
/// applied to tool calls made within the time window; the reported
/// `created`/`modified` span covers every entry regardless. Results are
/// ordered by `modified`, most recent first. Unreadable logs are skipped.
pub fn find_agents(project_dir: &Path, options: &FindAgentsOptions) -> Result<Vec<AgentMatch>> {
    if !project_dir.is_dir() {
        return Err(HistoryError::ProjectNotFound {
            path: project_dir.to_path_buf(),
        });
    }

    let criteria = Criteria {
        options,
        explored: options
            .explored_pattern
            .as_deref()
            .filter(|pattern| !pattern.is_empty()),
        tool_types: normalize_tool_types(&options.tool_types),
        tool_input: compile_tool_input(options.tool_input_pattern.as_deref())?,
    };

    let mut sessions = list_session_files(project_dir)?;
    if let Some(session_id) = options.session_id.as_deref().filter(|id| !id.is_empty()) {
        sessions.retain(|(id, _)| id == session_id);
    }

    let mut matches = Vec::new();
    for (session_id, session_path) in sessions {
        matches.extend(check_agent_file(&criteria, project_dir, &session_id, "", &session_path));

        for file in locate_agent_files(&session_dir(project_dir, &session_id)) {
            matches.extend(check_agent_file(&criteria, project_dir, &session_id, &file.id, &file.path));
        }
    }

    matches.sort_by(|left, right| right.modified.cmp(&left.modified));
    Ok(matches)
}

/// Lowercased tool names with blanks dropped.
pub(crate) fn normalize_tool_types(tool_types: &[String]) -> BTreeSet<String> {
    tool_types
        .iter()
        .map(|tool| tool.trim().to_ascii_lowercase())
        .filter(|tool| !tool.is_empty())
        .collect()
}

pub(crate) fn compile_tool_input(pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern
        .filter(|pattern| !pattern.is_empty())
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| HistoryError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
        })
        .transpose()
}

fn check_agent_file(
    criteria: &Criteria<'_>,
    project_dir: &Path,
    session_id: &str,
    agent_id: &str,
    path: &Path,
) -> Option<AgentMatch> {
    let explored_pattern = criteria.explored;
    let mut created: Option<DateTime<Utc>> = None;
    let mut modified: Option<DateTime<Utc>> = None;
    let mut matched_files = BTreeSet::new();
    let mut matched_tools = BTreeSet::new();
    let mut input_matched = false;

    let scanned = jsonl::scan(path, |entry| {
        let timestamp = entry.parsed_timestamp();
        if let Some(ts) = timestamp {
            created = Some(created.map_or(ts, |first| first.min(ts)));
            modified = Some(modified.map_or(ts, |last| last.max(ts)));
        }

        if !criteria.in_window(timestamp) || entry.kind != EntryKind::Assistant {
            return ScanControl::Continue;
        }

        for tool in entry.tool_calls() {
            matched_tools.insert(tool.name.to_ascii_lowercase());

            if let Some(pattern) = explored_pattern
                && tool.kind.is_file_operation()
                && let Some(file_path) = tool.file_path()
                && matches_file_pattern(file_path, pattern)
            {
                matched_files.insert(file_path.to_string());
            }

            if let Some(regex) = &criteria.tool_input
                && tool.input.values().any(|value| regex.is_match(value))
            {
                input_matched = true;
            }
        }
        ScanControl::Continue
    });

    let stats = match scanned {
        Ok(stats) => stats,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "skipping unreadable log during search");
            return None;
        }
    };

    if stats.entries == 0 || !criteria.accepts(&matched_files, &matched_tools, input_matched) {
        return None;
    }

    Some(AgentMatch {
        agent_id: agent_id.to_string(),
        session_id: session_id.to_string(),
        project_path: project_dir.to_path_buf(),
        jsonl_path: path.to_path_buf(),
        entry_count: stats.entries,
        agent_type: parse_agent_type(agent_id),
        matched_files,
        matched_tools,
        created,
        modified,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    use super::find_agents;
    use crate::error::HistoryError;
    use crate::model::FindAgentsOptions;

    fn tool_entry(uuid: &str, timestamp: &str, name: &str, input: serde_json::Value) -> String {
        let value = json!({
            "uuid": uuid,
            "type": "assistant",
            "sessionId": "s1",
            "timestamp": timestamp,
            "message": {
                "role": "assistant",
                "content": [{"type": "tool_use", "id": format!("tu-{uuid}"), "name": name, "input": input}]
            }
        });
        format!("{value}\n")
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, content).expect("write");
    }

    /// Session s1 with three agents: a1 reads a Go file, a2 greps and runs tests, a3 is nested.
    fn fixture(project: &Path) {
        write(
            &project.join("s1.jsonl"),
            &tool_entry("m1", "2026-01-15T10:00:00Z", "Bash", json!({"command": "ls"})),
        );
        let subagents = project.join("s1/subagents");
        write(
            &subagents.join("agent-a1.jsonl"),
            &tool_entry("a1-1", "2026-01-15T10:05:00Z", "Read", json!({"file_path": "/repo/src/main.go"})),
        );
        write(
            &subagents.join("agent-a2.jsonl"),
            &format!(
                "{}{}",
                tool_entry("a2-1", "2026-01-15T11:00:00Z", "Grep", json!({"pattern": "TODO", "path": "/repo"})),
                tool_entry("a2-2", "2026-01-15T11:30:00Z", "Bash", json!({"command": "go test ./..."})),
            ),
        );
        write(
            &subagents.join("agent-a1/subagents/agent-a3.jsonl"),
            &tool_entry("a3-1", "2026-01-15T12:00:00Z", "Edit", json!({"file_path": "/repo/pkg/util.go"})),
        );
    }

    fn ids(matches: &[crate::model::AgentMatch]) -> Vec<&str> {
        matches.iter().map(|found| found.agent_id.as_str()).collect()
    }

    #[test]
    fn no_criteria_returns_everything_newest_first() {
        let temp = tempdir().expect("tempdir");
        fixture(temp.path());

        let matches = find_agents(temp.path(), &FindAgentsOptions::default()).expect("search");
        assert_eq!(ids(&matches), vec!["a3", "a2", "a1", ""]);
        assert!(matches[3].is_main_session());
        assert_eq!(matches[1].entry_count, 2);
        assert_eq!(
            matches[1].created,
            Some(Utc.with_ymd_and_hms(2026, 1, 15, 11, 0, 0).single().expect("ts"))
        );
    }

    #[test]
    fn explored_pattern_collects_matching_files() {
        let temp = tempdir().expect("tempdir");
        fixture(temp.path());

        let options = FindAgentsOptions {
            explored_pattern: Some("*.go".to_string()),
            ..FindAgentsOptions::default()
        };
        let matches = find_agents(temp.path(), &options).expect("search");
        assert_eq!(ids(&matches), vec!["a3", "a1"]);
        assert!(matches[1].matched_files.contains("/repo/src/main.go"));
    }

    #[test]
    fn tool_types_are_case_insensitive() {
        let temp = tempdir().expect("tempdir");
        fixture(temp.path());

        let options = FindAgentsOptions {
            tool_types: vec!["BASH".to_string()],
            ..FindAgentsOptions::default()
        };
        let matches = find_agents(temp.path(), &options).expect("search");
        assert_eq!(ids(&matches), vec!["a2", ""]);
        assert!(matches[0].matched_tools.contains("grep"));
    }

    #[test]
    fn tool_input_regex_searches_every_string_field() {
        let temp = tempdir().expect("tempdir");
        fixture(temp.path());

        let options = FindAgentsOptions {
            tool_input_pattern: Some("go test".to_string()),
            ..FindAgentsOptions::default()
        };
        assert_eq!(ids(&find_agents(temp.path(), &options).expect("search")), vec!["a2"]);
    }

    #[test]
    fn time_window_limits_which_tool_calls_count() {
        let temp = tempdir().expect("tempdir");
        fixture(temp.path());

        let options = FindAgentsOptions {
            tool_types: vec!["bash".to_string()],
            start_time: Some(Utc.with_ymd_and_hms(2026, 1, 15, 11, 15, 0).single().expect("ts")),
            ..FindAgentsOptions::default()
        };
        let matches = find_agents(temp.path(), &options).expect("search");
        assert_eq!(ids(&matches), vec!["a2"]);
        assert_eq!(matches[0].matched_tools.len(), 1);
    }

    #[test]
    fn session_scope_limits_results() {
        let temp = tempdir().expect("tempdir");
        fixture(temp.path());
        write(
            &temp.path().join("s2.jsonl"),
            &tool_entry("x1", "2026-02-01T00:00:00Z", "Bash", json!({"command": "pwd"})),
        );

        let scoped = FindAgentsOptions {
            session_id: Some("s2".to_string()),
            ..FindAgentsOptions::default()
        };
        let matches = find_agents(temp.path(), &scoped).expect("search");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].session_id, "s2");

        let missing = FindAgentsOptions {
            session_id: Some("nope".to_string()),
            ..FindAgentsOptions::default()
        };
        assert!(find_agents(temp.path(), &missing).expect("search").is_empty());
    }

    #[test]
    fn empty_criteria_impose_no_constraint() {
        let temp = tempdir().expect("tempdir");
        fixture(temp.path());
        let everything = ids(&find_agents(temp.path(), &FindAgentsOptions::default()).expect("search"))
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let blanks = [
            FindAgentsOptions {
                explored_pattern: Some(String::new()),
                ..FindAgentsOptions::default()
            },
            FindAgentsOptions {
                tool_types: vec![String::new(), " ".to_string()],
                ..FindAgentsOptions::default()
            },
            FindAgentsOptions {
                tool_input_pattern: Some(String::new()),
                ..FindAgentsOptions::default()
            },
        ];
        for options in &blanks {
            let matches = find_agents(temp.path(), options).expect("search");
            assert_eq!(ids(&matches), everything, "{options:?}");
        }
    }

    #[test]
    fn invalid_regex_is_rejected_up_front() {
        let temp = tempdir().expect("tempdir");
        fixture(temp.path());

        let options = FindAgentsOptions {
            tool_input_pattern: Some("(unclosed".to_string()),
            ..FindAgentsOptions::default()
        };
        let err = find_agents(temp.path(), &options).expect_err("invalid regex");
        assert!(matches!(err, HistoryError::InvalidPattern { .. }));
    }

    #[test]
    fn missing_project_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let err = find_agents(&temp.path().join("absent"), &FindAgentsOptions::default())
            .expect_err("missing project");
        assert!(matches!(err, HistoryError::ProjectNotFound { .. }));
    }

    #[test]
    fn empty_logs_never_match() {
        let temp = tempdir().expect("tempdir");
        write(&temp.path().join("s1.jsonl"), "\n\n");
        assert!(find_agents(temp.path(), &FindAgentsOptions::default()).expect("search").is_empty());
    }
}
