use std::fmt::Write as _;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::{AmbiguousCandidate, IdKind};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("{kind} ID prefix cannot be empty")]
    EmptyPrefix { kind: IdKind },

    #[error("session ID is required to resolve agent ID")]
    MissingSessionId,

    #[error("no session found with ID prefix {prefix:?}")]
    NoMatchingSession { prefix: String },

    #[error("no agent found with ID prefix {prefix:?} in session {session_id}")]
    NoMatchingAgent { prefix: String, session_id: String },

    #[error(
        "ambiguous session ID prefix {prefix:?} matches {} sessions:\n\n{}Please provide more characters to uniquely identify the session.",
        .candidates.len(),
        render_candidates(.candidates)
    )]
    AmbiguousSession {
        prefix: String,
        candidates: Vec<AmbiguousCandidate>,
    },

    #[error(
        "ambiguous agent ID prefix {prefix:?} matches {} agents in session {session_id}:\n\n{}Please provide more characters to uniquely identify the agent.",
        .candidates.len(),
        render_candidates(.candidates)
    )]
    AmbiguousAgent {
        prefix: String,
        session_id: String,
        candidates: Vec<AmbiguousCandidate>,
    },

    #[error("project not found: {path}")]
    ProjectNotFound { path: PathBuf },

    #[error("no sessions found in project: {path}")]
    NoSessions { path: PathBuf },

    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("agent {agent_id} not found in session {session_id}")]
    AgentNotFound {
        session_id: String,
        agent_id: String,
    },

    #[error("pattern {pattern}: invalid regex: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown entry type: {name}")]
    UnknownEntryType { name: String },

    #[error("could not parse time: {input}")]
    InvalidTime { input: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("cannot determine home directory")]
    HomeDirectoryNotFound,

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HistoryError {
    /// Candidate IDs carried by an ambiguity error, empty for every other kind.
    pub fn candidates(&self) -> &[AmbiguousCandidate] {
        match self {
            Self::AmbiguousSession { candidates, .. } | Self::AmbiguousAgent { candidates, .. } => {
                candidates
            }
            _ => &[],
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NoMatchingSession { .. }
                | Self::NoMatchingAgent { .. }
                | Self::ProjectNotFound { .. }
                | Self::NoSessions { .. }
                | Self::SessionNotFound { .. }
                | Self::AgentNotFound { .. }
        )
    }
}

fn render_candidates(candidates: &[AmbiguousCandidate]) -> String {
    let mut output = String::new();
    for candidate in candidates {
        let _ = writeln!(output, "  {}", candidate.id);
        for (label, value) in &candidate.details {
            let _ = writeln!(output, "    {label}: {value}");
        }
        output.push('\n');
    }
    output
}

pub type Result<T> = std::result::Result<T, HistoryError>;
