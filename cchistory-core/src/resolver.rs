use std::path::Path;

use crate::error::{HistoryError, Result};
use crate::locator::{discover_agents, locate_agent_files};
use crate::model::{AmbiguousCandidate, IdKind};
use crate::paths::{list_session_files, session_dir, session_file};
use crate::session::{summarize_session, truncate_text};
use crate::spawn::spawn_descriptions;

const DETAIL_PREVIEW_CHARS: usize = 60;
const UNKNOWN_DATE: &str = "unknown";

/// Expands a session ID prefix to the one full session ID it names.
///
/// Matching is a case-sensitive `starts_with`, so a full ID resolves to
/// itself. Two or more matches fail with every candidate listed, newest first.
pub fn resolve_session_id(project_dir: &Path, prefix: &str) -> Result<String> {
    if prefix.is_empty() {
        return Err(HistoryError::EmptyPrefix {
            kind: IdKind::Session,
        });
    }

    let mut matches = find_matching_session_ids(project_dir, prefix)?;
    match matches.len() {
        0 => Err(HistoryError::NoMatchingSession {
            prefix: prefix.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        _ => Err(HistoryError::AmbiguousSession {
            prefix: prefix.to_string(),
            candidates: session_candidates(project_dir, matches),
        }),
    }
}

/// Expands an agent ID prefix within one session. Candidates of an ambiguous
/// prefix are listed in ID order.
pub fn resolve_agent_id(project_dir: &Path, session_id: &str, prefix: &str) -> Result<String> {
    if prefix.is_empty() {
        return Err(HistoryError::EmptyPrefix { kind: IdKind::Agent });
    }
    if session_id.is_empty() {
        return Err(HistoryError::MissingSessionId);
    }

    let mut matches = find_matching_agent_ids(project_dir, session_id, prefix);
    match matches.len() {
        0 => Err(HistoryError::NoMatchingAgent {
            prefix: prefix.to_string(),
            session_id: session_id.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        _ => Err(HistoryError::AmbiguousAgent {
            prefix: prefix.to_string(),
            session_id: session_id.to_string(),
            candidates: agent_candidates(project_dir, session_id, &matches),
        }),
    }
}

pub fn find_matching_session_ids(project_dir: &Path, prefix: &str) -> Result<Vec<String>> {
    Ok(list_session_files(project_dir)?
        .into_iter()
        .map(|(session_id, _)| session_id)
        .filter(|session_id| session_id.starts_with(prefix))
        .collect())
}

/// Agent IDs of the session starting with `prefix`, sorted and deduplicated.
pub fn find_matching_agent_ids(project_dir: &Path, session_id: &str, prefix: &str) -> Vec<String> {
    let mut ids = locate_agent_files(&session_dir(project_dir, session_id))
        .into_iter()
        .map(|file| file.id)
        .filter(|agent_id| agent_id.starts_with(prefix))
        .collect::<Vec<_>>();
    ids.sort();
    ids.dedup();
    ids
}

fn session_candidates(project_dir: &Path, session_ids: Vec<String>) -> Vec<AmbiguousCandidate> {
    let mut described = session_ids
        .into_iter()
        .map(|session_id| {
            let summary = summarize_session(&session_id, &session_file(project_dir, &session_id)).ok();
            let created = summary.as_ref().and_then(|summary| summary.created);

            let mut details = vec![(
                "Date",
                created.map_or_else(|| UNKNOWN_DATE.to_string(), |ts| ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
            )];
            if let Some(summary) = &summary {
                if let Some(prompt) = &summary.first_prompt {
                    details.push(("Prompt", truncate_text(prompt, DETAIL_PREVIEW_CHARS)));
                }
                details.push(("Entries", summary.entry_count.to_string()));
            }

            (created, AmbiguousCandidate { id: session_id, details })
        })
        .collect::<Vec<_>>();

    described.sort_by(|(left, _), (right, _)| right.cmp(left));
    described.into_iter().map(|(_, candidate)| candidate).collect()
}

fn agent_candidates(project_dir: &Path, session_id: &str, agent_ids: &[String]) -> Vec<AmbiguousCandidate> {
    let agents = discover_agents(&session_dir(project_dir, session_id));
    let descriptions = spawn_descriptions(&session_file(project_dir, session_id), &agents);

    agent_ids
        .iter()
        .map(|agent_id| {
            let mut details = Vec::new();
            if let Some(agent) = agents.iter().find(|agent| &agent.id == agent_id) {
                if !agent.agent_type.is_empty() {
                    details.push(("Type", agent.agent_type.clone()));
                }
                details.push(("Entries", agent.entry_count.to_string()));
            }
            if let Some(description) = descriptions.get(agent_id) {
                details.push(("Description", truncate_text(description, DETAIL_PREVIEW_CHARS)));
            }
            AmbiguousCandidate {
                id: agent_id.clone(),
                details,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use serde_json::json;
    use tempfile::tempdir;

    use super::{resolve_agent_id, resolve_session_id};
    use crate::error::HistoryError;

    const SESSION_A: &str = "cd2e9388-3108-40e5-b41b-79497cbb58b4";
    const SESSION_B: &str = "cd2e4f21-aaaa-4bbb-8ccc-000000000001";
    const SESSION_C: &str = "f00dcafe-0000-4000-8000-000000000002";

    fn write_session(project: &Path, session_id: &str, timestamp: &str, prompt: &str) {
        let line = json!({
            "type": "user",
            "uuid": format!("u-{session_id}"),
            "sessionId": session_id,
            "timestamp": timestamp,
            "message": {"role": "user", "content": prompt}
        });
        fs::write(project.join(format!("{session_id}.jsonl")), format!("{line}\n")).expect("write");
    }

    fn project() -> tempfile::TempDir {
        let temp = tempdir().expect("tempdir");
        write_session(temp.path(), SESSION_A, "2026-01-10T09:00:00Z", "Refactor the parser");
        write_session(temp.path(), SESSION_B, "2026-01-12T09:00:00Z", "Add export command");
        write_session(temp.path(), SESSION_C, "2026-01-14T09:00:00Z", "Unrelated");
        temp
    }

    #[test]
    fn unique_prefix_resolves() {
        let temp = project();
        assert_eq!(resolve_session_id(temp.path(), "f00d").expect("resolve"), SESSION_C);
        assert_eq!(resolve_session_id(temp.path(), "cd2e9").expect("resolve"), SESSION_A);
    }

    #[test]
    fn full_id_resolves_to_itself() {
        let temp = project();
        let resolved = resolve_session_id(temp.path(), SESSION_B).expect("resolve");
        assert_eq!(resolved, SESSION_B);
        assert_eq!(resolve_session_id(temp.path(), &resolved).expect("again"), SESSION_B);
    }

    #[test]
    fn ambiguous_prefix_lists_every_candidate() {
        let temp = project();
        let err = resolve_session_id(temp.path(), "cd2e").expect_err("ambiguous");
        let message = err.to_string();

        assert!(message.contains(SESSION_A));
        assert!(message.contains(SESSION_B));
        assert!(message.contains("Please provide more characters"));
        assert!(message.contains("Prompt: Add export command"));

        let ids = err
            .candidates()
            .iter()
            .map(|candidate| candidate.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![SESSION_B, SESSION_A]);
    }

    #[test]
    fn prefixes_are_case_sensitive() {
        let temp = project();
        let err = resolve_session_id(temp.path(), "CD2E").expect_err("no match");
        assert!(matches!(err, HistoryError::NoMatchingSession { .. }));
        assert!(err.is_not_found());
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let temp = project();
        let err = resolve_session_id(temp.path(), "").expect_err("empty");
        assert_eq!(err.to_string(), "session ID prefix cannot be empty");
    }

    #[test]
    fn resolves_agents_within_a_session() {
        let temp = project();
        let subagents = temp.path().join(SESSION_A).join("subagents");
        fs::create_dir_all(subagents.join("agent-a12eb64/subagents")).expect("mkdir");
        fs::write(subagents.join("agent-a12eb64.jsonl"), "{\"type\":\"user\"}\n").expect("write");
        fs::write(subagents.join("agent-a12f000.jsonl"), "{\"type\":\"user\"}\n").expect("write");
        fs::write(
            subagents.join("agent-a12eb64/subagents/agent-b777.jsonl"),
            "{\"type\":\"user\"}\n",
        )
        .expect("write");

        assert_eq!(resolve_agent_id(temp.path(), SESSION_A, "a12e").expect("agent"), "a12eb64");
        assert_eq!(resolve_agent_id(temp.path(), SESSION_A, "b7").expect("nested"), "b777");

        let err = resolve_agent_id(temp.path(), SESSION_A, "a12").expect_err("ambiguous");
        let message = err.to_string();
        assert!(message.contains("a12eb64") && message.contains("a12f000"));
        assert!(message.contains("Entries: 1"));

        let err = resolve_agent_id(temp.path(), "", "a12").expect_err("session required");
        assert!(matches!(err, HistoryError::MissingSessionId));

        let err = resolve_agent_id(temp.path(), SESSION_A, "zz").expect_err("no match");
        assert!(matches!(err, HistoryError::NoMatchingAgent { .. }));
    }
}
