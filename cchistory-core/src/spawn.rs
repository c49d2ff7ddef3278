use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::jsonl::{self, ScanControl};
use crate::model::{Agent, ConversationEntry, SpawnDescriptor, SpawnLink};

pub const STATUS_ASYNC_LAUNCHED: &str = "async_launched";

/// A record announcing that an agent was launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnEvent {
    pub agent_id: String,
    pub spawn_uuid: String,
    pub parent_assistant_uuid: Option<String>,
    pub descriptor: SpawnDescriptor,
}

/// Returns the spawn carried by `entry`, if it is one: a spawn descriptor with
/// status `async_launched` and a non-empty agent ID.
pub fn detect_spawn(entry: &ConversationEntry) -> Option<SpawnEvent> {
    let descriptor = entry.spawn_descriptor()?;
    if descriptor.status != STATUS_ASYNC_LAUNCHED || descriptor.spawned_agent_id.is_empty() {
        return None;
    }

    Some(SpawnEvent {
        agent_id: descriptor.spawned_agent_id.clone(),
        spawn_uuid: entry.uuid.clone(),
        parent_assistant_uuid: entry
            .parent_assistant_uuid
            .clone()
            .filter(|uuid| !uuid.is_empty()),
        descriptor,
    })
}

/// Spawn links for a whole session, keyed by spawned agent ID.
///
/// The session log is scanned first, then each agent log in the given order.
/// A spawn found inside an agent's log without a parent assistant UUID is
/// attributed to that agent. When an agent ID is spawned more than once the
/// last one scanned wins. Unreadable logs are skipped.
pub fn collect_spawn_links(session_path: &Path, agents: &[Agent]) -> HashMap<String, SpawnLink> {
    let mut links = HashMap::new();

    for_each_spawn(session_path, |event| {
        let parent_uuid = event.parent_assistant_uuid.unwrap_or_default();
        links.insert(
            event.agent_id.clone(),
            SpawnLink {
                agent_id: event.agent_id,
                spawn_uuid: event.spawn_uuid,
                parent_uuid,
                source_agent: None,
            },
        );
    });

    for agent in agents {
        for_each_spawn(&agent.file_path, |event| {
            let parent_uuid = event
                .parent_assistant_uuid
                .unwrap_or_else(|| agent.id.clone());
            links.insert(
                event.agent_id.clone(),
                SpawnLink {
                    agent_id: event.agent_id,
                    spawn_uuid: event.spawn_uuid,
                    parent_uuid,
                    source_agent: Some(agent.id.clone()),
                },
            );
        });
    }

    links
}

/// Spawn descriptions by agent ID across the session and agent logs, last one wins.
pub fn spawn_descriptions(session_path: &Path, agents: &[Agent]) -> HashMap<String, String> {
    let mut descriptions = HashMap::new();
    let paths = std::iter::once(session_path).chain(agents.iter().map(|agent| agent.file_path.as_path()));

    for path in paths {
        for_each_spawn(path, |event| {
            if !event.descriptor.description.is_empty() {
                descriptions.insert(event.agent_id, event.descriptor.description);
            }
        });
    }

    descriptions
}

fn for_each_spawn<F>(path: &Path, mut on_spawn: F)
where
    F: FnMut(SpawnEvent),
{
    if !path.exists() {
        return;
    }

    let scanned = jsonl::scan(path, |entry| {
        if let Some(event) = detect_spawn(&entry) {
            on_spawn(event);
        }
        ScanControl::Continue
    });

    if let Err(err) = scanned {
        debug!(path = %path.display(), error = %err, "skipping unreadable log while collecting spawns");
    }
}
