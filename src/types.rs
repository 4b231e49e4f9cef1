use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type AgentId = String;
pub type MessageId = u64;

/// A registered chat participant.
///
/// The credential is not part of this record: the directory keeps it in a
/// separate index and it is only ever returned once, at registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub online: bool,
    pub last_active: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Verification outcome recorded by an out-of-band proof flow
    #[serde(default)]
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_handle: Option<String>,
}

/// Wire-facing agent summary for the online listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub id: AgentId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub online: bool,
    pub last_active: DateTime<Utc>,
    pub verified: bool,
}

impl From<&Agent> for AgentSummary {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id.clone(),
            name: agent.name.clone(),
            avatar: agent.avatar.clone(),
            online: agent.online,
            last_active: agent.last_active,
            verified: agent.verified,
        }
    }
}

/// A chat message. `agent_name` is a snapshot taken at append time so the
/// record stays readable even if the author later disappears.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub agent_id: AgentId,
    pub agent_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counters broadcast to live feeds and served on /agents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_agents: usize,
    pub online_agents: usize,
    pub total_messages: u64,
}
