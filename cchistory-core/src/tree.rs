use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::error::{HistoryError, Result};
use crate::jsonl;
use crate::locator::discover_agents;
use crate::model::TreeNode;
use crate::paths::{session_dir, session_file};
use crate::spawn::collect_spawn_links;

/// Builds the agent hierarchy of one session.
///
/// The root stands for the session log itself; every agent log under the
/// session directory becomes exactly one node. Spawn links decide where a node
/// hangs; agents whose parent cannot be resolved, or whose link would close a
/// cycle, hang directly under the root. A missing session log yields a root
/// with zero entries. Only an unreadable session log is an error.
pub fn build_tree(project_dir: &Path, session_id: &str) -> Result<TreeNode> {
    let session_path = session_file(project_dir, session_id);
    let entry_count = match jsonl::count_entries(&session_path) {
        Ok(count) => count,
        Err(HistoryError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => 0,
        Err(err) => return Err(err),
    };

    let mut root = TreeNode {
        agent_id: String::new(),
        session_id: session_id.to_string(),
        file_path: session_path.clone(),
        entry_count,
        agent_type: String::new(),
        is_root: true,
        children: Vec::new(),
        parent_uuid: String::new(),
        uuid: session_id.to_string(),
    };

    let agents = discover_agents(&session_dir(project_dir, session_id));
    if agents.is_empty() {
        return Ok(root);
    }

    let links = collect_spawn_links(&session_path, &agents);
    let mut nodes = Vec::with_capacity(agents.len());
    let mut sources = Vec::with_capacity(agents.len());
    for agent in agents {
        let link = links.get(&agent.id);
        sources.push(link.and_then(|link| link.source_agent.clone()));
        nodes.push(TreeNode {
            session_id: if agent.session_id.is_empty() {
                session_id.to_string()
            } else {
                agent.session_id
            },
            file_path: agent.file_path,
            entry_count: agent.entry_count,
            agent_type: agent.agent_type,
            is_root: false,
            children: Vec::new(),
            parent_uuid: link.map(|link| link.parent_uuid.clone()).unwrap_or_default(),
            uuid: link.map(|link| link.spawn_uuid.clone()).unwrap_or_default(),
            agent_id: agent.id,
        });
    }

    let parents = resolve_parents(&nodes, &sources, session_id);

    let mut children_of = vec![Vec::new(); nodes.len()];
    let mut root_children = Vec::new();
    for (idx, parent) in parents.iter().enumerate() {
        match parent {
            Some(parent) => children_of[*parent].push(idx),
            None => root_children.push(idx),
        }
    }

    let mut slots = nodes.into_iter().map(Some).collect::<Vec<_>>();
    root.children = root_children
        .into_iter()
        .filter_map(|idx| assemble(idx, &mut slots, &children_of))
        .collect();

    Ok(root)
}

/// Resolves each node's parent index, `None` meaning the root.
///
/// Lookup order: parent UUID as an agent ID, then as a spawn UUID, then the
/// agent whose log held the spawn. A candidate is accepted only if walking its
/// already-resolved ancestors never leads back to the node itself.
fn resolve_parents(nodes: &[TreeNode], sources: &[Option<String>], session_id: &str) -> Vec<Option<usize>> {
    let mut by_agent_id = HashMap::new();
    let mut by_uuid = HashMap::new();
    for (idx, node) in nodes.iter().enumerate() {
        by_agent_id.entry(node.agent_id.as_str()).or_insert(idx);
        if !node.uuid.is_empty() {
            by_uuid.entry(node.uuid.as_str()).or_insert(idx);
        }
    }

    let candidates = nodes
        .iter()
        .zip(sources)
        .enumerate()
        .map(|(idx, (node, source))| {
            let parent_uuid = node.parent_uuid.as_str();
            if parent_uuid.is_empty() || parent_uuid == session_id || parent_uuid == node.agent_id {
                return None;
            }

            by_agent_id
                .get(parent_uuid)
                .or_else(|| by_uuid.get(parent_uuid))
                .or_else(|| source.as_deref().and_then(|source| by_agent_id.get(source)))
                .copied()
                .filter(|parent| *parent != idx)
        })
        .collect::<Vec<_>>();

    let mut parents = candidates;
    for idx in 0..parents.len() {
        if parents[idx].is_some() && closes_cycle(&parents, idx) {
            debug!(agent_id = %nodes[idx].agent_id, parent_uuid = %nodes[idx].parent_uuid, "spawn link forms a cycle; attaching to root");
            parents[idx] = None;
        }
    }

    for (node, parent) in nodes.iter().zip(&parents) {
        if parent.is_none() && !node.parent_uuid.is_empty() && node.parent_uuid != session_id {
            debug!(agent_id = %node.agent_id, parent_uuid = %node.parent_uuid, "unresolved spawn parent; attaching to root");
        }
    }

    parents
}

fn closes_cycle(parents: &[Option<usize>], start: usize) -> bool {
    let mut visited = HashSet::from([start]);
    let mut current = parents[start];
    while let Some(idx) = current {
        if idx == start {
            return true;
        }
        if !visited.insert(idx) {
            // A loop elsewhere; it is broken when its own members are checked.
            return false;
        }
        current = parents[idx];
    }
    false
}

fn assemble(idx: usize, slots: &mut [Option<TreeNode>], children_of: &[Vec<usize>]) -> Option<TreeNode> {
    let mut node = slots[idx].take()?;
    node.children = children_of[idx]
        .iter()
        .filter_map(|child| assemble(*child, slots, children_of))
        .collect();
    Some(node)
}

/// All nodes of the tree in pre-order, root first.
pub fn flatten(root: &TreeNode) -> Vec<&TreeNode> {
    let mut nodes = Vec::new();
    push_pre_order(root, &mut nodes);
    nodes
}

fn push_pre_order<'a>(node: &'a TreeNode, nodes: &mut Vec<&'a TreeNode>) {
    nodes.push(node);
    for child in &node.children {
        push_pre_order(child, nodes);
    }
}

pub fn total_entries(root: &TreeNode) -> usize {
    flatten(root).iter().map(|node| node.entry_count).sum()
}
