use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{HistoryError, Result};
use crate::model::{AgentMatch, ConversationEntry, TreeNode};
use crate::session::{SessionSummary, truncate_text};

const LIST_PROMPT_CHARS: usize = 50;

static DOT_ID_UNSAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("valid regex"));

#[derive(Serialize)]
struct MatchesEnvelope<'a> {
    agents: &'a [AgentMatch],
}

#[derive(Serialize)]
struct PathReport<'a> {
    path: &'a Path,
    exists: bool,
}

pub fn render_tree_ascii(tree: &TreeNode) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Session: {}", tree.session_id);
    let _ = writeln!(
        output,
        "├── Main conversation ({} entries)",
        tree.entry_count
    );

    for (idx, child) in tree.children.iter().enumerate() {
        write_ascii_node(&mut output, child, "", idx + 1 == tree.children.len());
    }
    output
}

fn write_ascii_node(output: &mut String, node: &TreeNode, prefix: &str, is_last: bool) {
    let connector = if is_last { "└── " } else { "├── " };
    let _ = writeln!(output, "{prefix}{connector}{}", node_label(node, " "));

    let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
    let _ = writeln!(output, "{child_prefix}└── {} entries", node.entry_count);

    for (idx, child) in node.children.iter().enumerate() {
        write_ascii_node(output, child, &child_prefix, idx + 1 == node.children.len());
    }
}

/// GraphViz digraph of the tree, one box per session or agent.
pub fn render_tree_dot(tree: &TreeNode) -> String {
    let mut output = String::new();
    output.push_str("digraph AgentTree {\n");
    output.push_str("  rankdir=TB;\n");
    output.push_str("  node [shape=box];\n\n");

    let root_id = dot_id("session", &tree.session_id);
    let _ = writeln!(
        output,
        "  {root_id} [label=\"Session\\n{}\\n({} entries)\"];",
        escape_dot_label(&tree.session_id),
        tree.entry_count
    );
    for child in &tree.children {
        write_dot_node(&mut output, child, &root_id);
    }

    output.push_str("}\n");
    output
}

fn write_dot_node(output: &mut String, node: &TreeNode, parent_id: &str) {
    let node_id = dot_id("agent", &node.agent_id);
    let _ = writeln!(
        output,
        "  {node_id} [label=\"{}\\n{} entries\"];",
        escape_dot_label(&node_label(node, "\\n")),
        node.entry_count
    );
    let _ = writeln!(output, "  {parent_id} -> {node_id};");

    for child in &node.children {
        write_dot_node(output, child, &node_id);
    }
}

fn dot_id(kind: &str, id: &str) -> String {
    format!("{kind}_{}", DOT_ID_UNSAFE.replace_all(id, "_"))
}

fn escape_dot_label(label: &str) -> String {
    label.replace('"', "\\\"")
}

fn node_label(node: &TreeNode, separator: &str) -> String {
    if node.agent_type.is_empty() {
        node.agent_id.clone()
    } else {
        format!("{}{separator}({})", node.agent_id, node.agent_type)
    }
}

pub fn tree_to_json(tree: &TreeNode) -> Result<String> {
    to_pretty_json(tree)
}

pub fn render_matches_list(matches: &[AgentMatch]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Found {} matching agents:\n", matches.len());

    for found in matches {
        let agent = if found.is_main_session() {
            "(main session)"
        } else {
            found.agent_id.as_str()
        };
        let _ = writeln!(output, "Agent: {agent}");
        let _ = writeln!(output, "  Session: {}", found.session_id);
        let _ = writeln!(output, "  Path: {}", found.jsonl_path.display());
        let _ = writeln!(output, "  Entries: {}", found.entry_count);
        if !found.matched_files.is_empty() {
            let files = found.matched_files.iter().cloned().collect::<Vec<_>>();
            let _ = writeln!(output, "  Files: {}", files.join(", "));
        }
        if !found.matched_tools.is_empty() {
            let tools = found
                .matched_tools
                .iter()
                .map(|tool| capitalize_first(tool))
                .collect::<Vec<_>>();
            let _ = writeln!(output, "  Tools: {}", tools.join(", "));
        }
        let _ = writeln!(output, "  Created: {}", format_time(found.created));
        output.push('\n');
    }
    output
}

/// Matches wrapped as `{"agents": [...]}`.
pub fn matches_to_json(matches: &[AgentMatch]) -> Result<String> {
    to_pretty_json(&MatchesEnvelope { agents: matches })
}

/// One line per session: ID, last activity, entry count and a prompt preview.
pub fn render_sessions_list(sessions: &[SessionSummary]) -> String {
    let mut output = String::new();
    for session in sessions {
        let prompt = session
            .first_prompt
            .as_deref()
            .map(|prompt| truncate_text(prompt, LIST_PROMPT_CHARS))
            .unwrap_or_default();
        let _ = writeln!(
            output,
            "{}  {}  {} entries  {prompt}",
            session.id,
            format_time(session.modified),
            session.entry_count
        );
    }
    output
}

pub fn sessions_to_json(sessions: &[SessionSummary]) -> Result<String> {
    to_pretty_json(sessions)
}

/// One line per entry: `[HH:MM:SS] kind: text`, with the text cut to
/// `limit` characters unless `limit` is 0.
pub fn render_entries_list(entries: &[ConversationEntry], limit: usize) -> String {
    let mut output = String::new();
    for entry in entries {
        let time = entry.parsed_timestamp().map_or_else(
            || "--:--:--".to_string(),
            |ts| ts.format("%H:%M:%S").to_string(),
        );
        let text = entry.text_content();
        let text = match limit {
            0 => text.split_whitespace().collect::<Vec<_>>().join(" "),
            max => truncate_text(&text, max),
        };
        let _ = writeln!(output, "[{time}] {}: {text}", entry.kind);
    }
    output
}

/// Entry count, time span and a per-kind breakdown.
pub fn render_entries_summary(entries: &[ConversationEntry]) -> String {
    let timestamps = entries
        .iter()
        .filter_map(ConversationEntry::parsed_timestamp)
        .collect::<Vec<_>>();
    let mut by_kind = BTreeMap::<String, usize>::new();
    for entry in entries {
        *by_kind.entry(entry.kind.to_string()).or_default() += 1;
    }

    let mut output = String::new();
    let _ = writeln!(output, "Total entries: {}", entries.len());
    let _ = writeln!(
        output,
        "Time range: {} to {}",
        format_time(timestamps.iter().min().copied()),
        format_time(timestamps.iter().max().copied())
    );
    output.push_str("\nBreakdown by type:\n");
    for (kind, count) in by_kind {
        let _ = writeln!(output, "  {kind}: {count}");
    }
    output
}

pub fn entries_to_json(entries: &[ConversationEntry]) -> Result<String> {
    to_pretty_json(entries)
}

/// A resolved storage path as `{"path": ..., "exists": ...}`.
pub fn path_to_json(path: &Path) -> Result<String> {
    to_pretty_json(&PathReport {
        path,
        exists: path.exists(),
    })
}

fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|err| HistoryError::Serialization(err.to_string()))
}

fn format_time(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp.map_or_else(
        || "unknown".to_string(),
        |ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

fn capitalize_first(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    use super::{
        matches_to_json, path_to_json, render_entries_list, render_entries_summary,
        render_matches_list, render_tree_ascii, render_tree_dot,
    };
    use crate::model::{AgentMatch, ConversationEntry, TreeNode};

    fn node(agent_id: &str, agent_type: &str, entries: usize, children: Vec<TreeNode>) -> TreeNode {
        TreeNode {
            agent_id: agent_id.to_string(),
            session_id: "s-1".to_string(),
            file_path: PathBuf::from(format!("/p/s-1/subagents/agent-{agent_id}.jsonl")),
            entry_count: entries,
            agent_type: agent_type.to_string(),
            is_root: agent_id.is_empty(),
            children,
            parent_uuid: String::new(),
            uuid: String::new(),
        }
    }

    fn sample_tree() -> TreeNode {
        node(
            "",
            "",
            10,
            vec![
                node(
                    "a1",
                    "",
                    4,
                    vec![node("aexplore-2", "explore", 2, Vec::new())],
                ),
                node("a3", "", 1, Vec::new()),
            ],
        )
    }

    #[test]
    fn ascii_tree_uses_box_connectors() {
        let rendered = render_tree_ascii(&sample_tree());
        let expected = "\
Session: s-1
├── Main conversation (10 entries)
├── a1
│   └── 4 entries
│   └── aexplore-2 (explore)
│       └── 2 entries
└── a3
    └── 1 entries
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn dot_tree_links_parents_to_children() {
        let rendered = render_tree_dot(&sample_tree());
        assert!(rendered.starts_with("digraph AgentTree {\n"));
        assert!(rendered.contains("session_s_1 -> agent_a1;"));
        assert!(rendered.contains("agent_a1 -> agent_aexplore_2;"));
        assert!(rendered.contains("label=\"aexplore-2\\n(explore)\\n2 entries\""));
        assert!(rendered.trim_end().ends_with('}'));
    }

    #[test]
    fn match_list_labels_main_sessions() {
        let found = AgentMatch {
            agent_id: String::new(),
            session_id: "s-1".to_string(),
            project_path: PathBuf::from("/p"),
            jsonl_path: PathBuf::from("/p/s-1.jsonl"),
            entry_count: 3,
            agent_type: String::new(),
            matched_files: BTreeSet::new(),
            matched_tools: BTreeSet::from(["bash".to_string(), "read".to_string()]),
            created: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).single(),
            modified: None,
        };

        let list = render_matches_list(std::slice::from_ref(&found));
        assert!(list.starts_with("Found 1 matching agents:\n\n"));
        assert!(list.contains("Agent: (main session)"));
        assert!(list.contains("  Tools: Bash, Read"));
        assert!(list.contains("  Created: 2026-01-15T10:00:00Z"));

        let json = serde_json::from_str::<Value>(&matches_to_json(&[found]).expect("json"))
            .expect("parse");
        assert_eq!(json["agents"][0]["jsonlPath"], "/p/s-1.jsonl");
        assert_eq!(json["agents"][0]["matchedTools"][1], "read");
        assert!(json["agents"][0].get("matchedFiles").is_none());
    }

    #[test]
    fn empty_match_list_is_an_empty_array() {
        let json =
            serde_json::from_str::<Value>(&matches_to_json(&[]).expect("json")).expect("parse");
        assert_eq!(json["agents"], Value::Array(Vec::new()));
    }

    #[test]
    fn path_report_flags_missing_paths() {
        let json = serde_json::from_str::<Value>(
            &path_to_json(std::path::Path::new("/definitely/not/here.jsonl")).expect("json"),
        )
        .expect("parse");
        assert_eq!(json["path"], "/definitely/not/here.jsonl");
        assert_eq!(json["exists"], false);
    }

    fn entries() -> Vec<ConversationEntry> {
        [
            serde_json::json!({
                "type": "user",
                "timestamp": "2026-01-15T10:00:00Z",
                "message": {"content": "first line\nsecond line of a long prompt"}
            }),
            serde_json::json!({"type": "assistant", "timestamp": "2026-01-15T10:05:30Z", "message": {"content": "ok"}}),
            serde_json::json!({"type": "user"}),
        ]
        .into_iter()
        .map(|value| serde_json::from_value(value).expect("entry"))
        .collect()
    }

    #[test]
    fn entry_list_truncates_unless_limit_is_zero() {
        let sample = entries();
        let expected = "\
[10:00:00] user: first line...
[10:05:30] assistant: ok
[--:--:--] user: 
";
        assert_eq!(render_entries_list(&sample, 10), expected);
        assert!(
            render_entries_list(&sample, 0)
                .starts_with("[10:00:00] user: first line second line of a long prompt\n")
        );
    }

    #[test]
    fn entry_summary_counts_kinds() {
        let summary = render_entries_summary(&entries());
        let expected = "\
Total entries: 3
Time range: 2026-01-15T10:00:00Z to 2026-01-15T10:05:30Z

Breakdown by type:
  assistant: 1
  user: 2
";
        assert_eq!(summary, expected);
    }
}
