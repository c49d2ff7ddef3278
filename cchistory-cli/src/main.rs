mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cchistory_core::{
    EntryKind, FindAgentsOptions, HistoryError, HistoryRoots, QueryOptions, QueryScope, ToolKind,
    build_tree, entries_to_json, find_agent, find_agents, list_sessions, matches_to_json,
    path_to_json, query_entries, render_entries_list, render_entries_summary, render_matches_list,
    render_sessions_list, render_tree_ascii, render_tree_dot, resolve_agent_id, resolve_session_id,
    sessions_to_json, tree_to_json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;

#[derive(Debug, Parser)]
#[command(name = "cchistory", version, about = "Explore Claude Code session and agent history")]
struct Cli {
    /// Claude data directory (defaults to $CLAUDE_CONFIG_DIR or ~/.claude)
    #[arg(long, global = true)]
    claude_dir: Option<PathBuf>,

    /// Show debug logging on stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the agent hierarchy of a session
    Tree {
        project_path: PathBuf,

        /// Session ID or unique prefix (defaults to the most recent session)
        #[arg(long)]
        session: Option<String>,

        #[arg(long, value_enum, default_value_t = TreeFormat::Ascii)]
        format: TreeFormat,
    },

    /// Find sessions and agents by files explored, tools used or time range
    FindAgent {
        project_path: PathBuf,

        /// Glob matched against files touched by file tools, e.g. "**/*.go"
        #[arg(long)]
        explored: Option<String>,

        /// Tool names, comma separated (case-insensitive)
        #[arg(long, value_delimiter = ',')]
        tool: Vec<String>,

        /// Regex matched against tool input values
        #[arg(long)]
        tool_match: Option<String>,

        /// Only count activity at or after this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Only count activity at or before this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Limit the search to one session (ID or unique prefix)
        #[arg(long)]
        session: Option<String>,

        #[arg(long, value_enum, default_value_t = ListFormat::List)]
        format: ListFormat,
    },

    /// Filter conversation entries by type, tool, tool input or time range
    Query {
        project_path: PathBuf,

        /// Only entries at or after this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        start: Option<String>,

        /// Only entries at or before this time (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        end: Option<String>,

        /// Entry types, comma separated: user, assistant, system, queue-operation
        #[arg(long = "type", value_delimiter = ',')]
        entry_types: Vec<String>,

        /// Tool names, comma separated (case-insensitive)
        #[arg(long, value_delimiter = ',')]
        tool: Vec<String>,

        /// Regex matched against tool input values
        #[arg(long)]
        tool_match: Option<String>,

        /// Session ID or unique prefix (defaults to every session)
        #[arg(long)]
        session: Option<String>,

        /// Read one agent's log instead of the session's (ID or unique prefix)
        #[arg(long, requires = "session", conflicts_with = "include_agents")]
        agent: Option<String>,

        /// Also read every agent log under each session
        #[arg(long)]
        include_agents: bool,

        /// Characters of text shown per entry in list format (0 for no limit)
        #[arg(long, default_value_t = 100)]
        limit: usize,

        #[arg(long, value_enum, default_value_t = QueryFormat::List)]
        format: QueryFormat,
    },

    /// Print the storage path of a project, session or agent
    Resolve {
        project_path: PathBuf,

        /// Session ID or unique prefix
        #[arg(long)]
        session: Option<String>,

        /// Agent ID or unique prefix (requires --session)
        #[arg(long, requires = "session")]
        agent: Option<String>,

        #[arg(long, value_enum, default_value_t = PathFormat::Path)]
        format: PathFormat,
    },

    /// List the sessions of a project, most recent first
    List {
        project_path: PathBuf,

        #[arg(long, value_enum, default_value_t = ListFormat::List)]
        format: ListFormat,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TreeFormat {
    Ascii,
    Json,
    Dot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ListFormat {
    List,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum QueryFormat {
    List,
    Json,
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PathFormat {
    Path,
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> cchistory_core::Result<()> {
    let roots = match cli.claude_dir {
        Some(dir) => HistoryRoots::new(dir),
        None => HistoryRoots::from_env_or_home()?,
    };

    match cli.command {
        Command::Tree {
            project_path,
            session,
            format,
        } => run_tree(&roots, &project_path, session.as_deref(), format),
        Command::FindAgent {
            project_path,
            explored,
            tool,
            tool_match,
            start,
            end,
            session,
            format,
        } => {
            let project_dir = roots.project_dir(&project_path)?;
            let session_id = session
                .as_deref()
                .map(|prefix| resolve_session_id(&project_dir, prefix))
                .transpose()?;
            warn_unknown_tools(&tool);

            let options = FindAgentsOptions {
                explored_pattern: explored,
                tool_types: tool,
                tool_input_pattern: tool_match,
                start_time: start.as_deref().map(parse_time_bound).transpose()?,
                end_time: end.as_deref().map(parse_time_bound).transpose()?,
                session_id,
            };
            run_find_agent(&project_dir, &options, format)
        }
        Command::Query {
            project_path,
            start,
            end,
            entry_types,
            tool,
            tool_match,
            session,
            agent,
            include_agents,
            limit,
            format,
        } => {
            let project_dir = roots.project_dir(&project_path)?;
            if !project_dir.is_dir() {
                return Err(HistoryError::ProjectNotFound { path: project_dir });
            }
            let scope = query_scope(&project_dir, session.as_deref(), agent.as_deref(), include_agents)?;
            warn_unknown_tools(&tool);

            let options = QueryOptions {
                kinds: parse_entry_kinds(&entry_types)?,
                tool_types: tool,
                tool_input_pattern: tool_match,
                start_time: start.as_deref().map(parse_time_bound).transpose()?,
                end_time: end.as_deref().map(parse_time_bound).transpose()?,
            };
            let entries = query_entries(&project_dir, &scope, &options)?;

            if entries.is_empty() && format != QueryFormat::Json {
                eprintln!("No entries found matching criteria");
                return Ok(());
            }
            match format {
                QueryFormat::List => print!("{}", render_entries_list(&entries, limit)),
                QueryFormat::Json => println!("{}", entries_to_json(&entries)?),
                QueryFormat::Summary => print!("{}", render_entries_summary(&entries)),
            }
            Ok(())
        }
        Command::Resolve {
            project_path,
            session,
            agent,
            format,
        } => {
            let path = resolve_storage_path(&roots, &project_path, session.as_deref(), agent.as_deref())?;
            match format {
                PathFormat::Path => {
                    if !path.exists() {
                        warn!(path = %path.display(), "path does not exist");
                    }
                    println!("{}", path.display());
                }
                PathFormat::Json => println!("{}", path_to_json(&path)?),
            }
            Ok(())
        }
        Command::List {
            project_path,
            format,
        } => {
            let project_dir = roots.project_dir(&project_path)?;
            if !project_dir.is_dir() {
                return Err(HistoryError::ProjectNotFound { path: project_dir });
            }
            let sessions = list_sessions(&project_dir)?;
            match format {
                ListFormat::List => print!("{}", render_sessions_list(&sessions)),
                ListFormat::Json => println!("{}", sessions_to_json(&sessions)?),
            }
            Ok(())
        }
    }
}

fn run_tree(
    roots: &HistoryRoots,
    project_path: &Path,
    session: Option<&str>,
    format: TreeFormat,
) -> cchistory_core::Result<()> {
    let project_dir = roots.project_dir(project_path)?;
    if !project_dir.is_dir() {
        return Err(HistoryError::ProjectNotFound { path: project_dir });
    }

    let session_id = match session {
        Some(prefix) => resolve_session_id(&project_dir, prefix)?,
        None => list_sessions(&project_dir)?
            .into_iter()
            .next()
            .map(|latest| latest.id)
            .ok_or_else(|| HistoryError::NoSessions {
                path: project_dir.clone(),
            })?,
    };

    let tree = build_tree(&project_dir, &session_id)?;
    match format {
        TreeFormat::Ascii => print!("{}", render_tree_ascii(&tree)),
        TreeFormat::Json => println!("{}", tree_to_json(&tree)?),
        TreeFormat::Dot => print!("{}", render_tree_dot(&tree)),
    }
    Ok(())
}

fn run_find_agent(
    project_dir: &Path,
    options: &FindAgentsOptions,
    format: ListFormat,
) -> cchistory_core::Result<()> {
    let matches = find_agents(project_dir, options)?;

    match format {
        ListFormat::Json => println!("{}", matches_to_json(&matches)?),
        ListFormat::List if matches.is_empty() => eprintln!("No agents found matching criteria"),
        ListFormat::List => print!("{}", render_matches_list(&matches)),
    }
    Ok(())
}

fn warn_unknown_tools(tools: &[String]) {
    for name in tools.iter().filter(|name| !name.trim().is_empty() && !ToolKind::is_known(name.trim())) {
        warn!(tool = %name, "unknown tool type; matching it anyway");
    }
}

fn query_scope(
    project_dir: &Path,
    session: Option<&str>,
    agent: Option<&str>,
    include_agents: bool,
) -> cchistory_core::Result<QueryScope> {
    let Some(session_prefix) = session else {
        return Ok(QueryScope::Project { include_agents });
    };

    let session_id = resolve_session_id(project_dir, session_prefix)?;
    Ok(match agent {
        Some(agent_prefix) => QueryScope::Agent {
            agent_id: resolve_agent_id(project_dir, &session_id, agent_prefix)?,
            session_id,
        },
        None => QueryScope::Session {
            session_id,
            include_agents,
        },
    })
}

fn resolve_storage_path(
    roots: &HistoryRoots,
    project_path: &Path,
    session: Option<&str>,
    agent: Option<&str>,
) -> cchistory_core::Result<PathBuf> {
    let project_dir = roots.project_dir(project_path)?;
    let Some(session_prefix) = session else {
        return Ok(project_dir);
    };

    let session_id = resolve_session_id(&project_dir, session_prefix)?;
    let Some(agent_prefix) = agent else {
        return Ok(cchistory_core::paths::session_file(&project_dir, &session_id));
    };

    let agent_id = resolve_agent_id(&project_dir, &session_id, agent_prefix)?;
    let session_dir = cchistory_core::paths::session_dir(&project_dir, &session_id);
    find_agent(&session_dir, &agent_id)
        .map(|agent| agent.file_path)
        .ok_or(HistoryError::AgentNotFound {
            session_id,
            agent_id,
        })
}

fn parse_entry_kinds(names: &[String]) -> cchistory_core::Result<Vec<EntryKind>> {
    names
        .iter()
        .map(String::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            EntryKind::from_filter_name(name).ok_or_else(|| HistoryError::UnknownEntryType {
                name: name.to_string(),
            })
        })
        .collect()
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD`; the last two are read as UTC.
fn parse_time_bound(input: &str) -> cchistory_core::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(ts.and_utc());
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
        .ok_or_else(|| HistoryError::InvalidTime {
            input: input.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use cchistory_core::EntryKind;
    use chrono::{TimeZone, Utc};

    use super::{parse_entry_kinds, parse_time_bound};

    #[test]
    fn parses_supported_time_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 1, 30, 0, 0, 0).single().expect("ts");
        assert_eq!(parse_time_bound("2026-01-30").expect("date"), expected);
        assert_eq!(parse_time_bound("2026-01-30T00:00:00").expect("naive"), expected);
        assert_eq!(parse_time_bound("2026-01-30T02:00:00+02:00").expect("rfc3339"), expected);
    }

    #[test]
    fn rejects_unparsable_times() {
        let err = parse_time_bound("yesterday").expect_err("invalid");
        assert_eq!(err.to_string(), "could not parse time: yesterday");
    }

    #[test]
    fn entry_kinds_are_validated() {
        let names = ["user".to_string(), " queue-operation".to_string(), String::new()];
        assert_eq!(
            parse_entry_kinds(&names).expect("kinds"),
            vec![EntryKind::User, EntryKind::QueueOperation]
        );

        let err = parse_entry_kinds(&["summary".to_string()]).expect_err("unknown");
        assert_eq!(err.to_string(), "unknown entry type: summary");
    }
}
