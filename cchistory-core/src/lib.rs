pub mod error;
pub mod jsonl;
pub mod locator;
pub mod model;
pub mod paths;
pub mod pattern;
pub mod query;
pub mod render;
pub mod resolver;
pub mod roots;
pub mod search;
pub mod session;
pub mod spawn;
pub mod tree;

pub use error::{HistoryError, Result};
pub use locator::{discover_agents, find_agent, locate_agent_files};
pub use model::{
    Agent, AgentMatch, AmbiguousCandidate, ConversationEntry, EntryKind, FindAgentsOptions, IdKind,
    SpawnDescriptor, SpawnLink, ToolKind, ToolUse, TreeNode,
};
pub use pattern::matches_file_pattern;
pub use query::{QueryOptions, QueryScope, query_entries};
pub use render::{
    entries_to_json, matches_to_json, path_to_json, render_entries_list, render_entries_summary,
    render_matches_list, render_sessions_list, render_tree_ascii, render_tree_dot,
    sessions_to_json, tree_to_json,
};
pub use resolver::{resolve_agent_id, resolve_session_id};
pub use roots::HistoryRoots;
pub use search::find_agents;
pub use session::{SessionSummary, list_sessions};
pub use spawn::{collect_spawn_links, detect_spawn};
pub use tree::{build_tree, flatten, total_entries};
