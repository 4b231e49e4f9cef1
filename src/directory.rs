//! In-memory agent directory: identity, credential, presence.

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::auth;
use crate::error::ApiError;
use crate::types::{Agent, AgentId, AgentSummary};

const NAME_MIN: usize = 2;
const NAME_MAX: usize = 32;
const AVATAR_MAX: usize = 64;

#[derive(Default)]
struct DirectoryInner {
    agents: HashMap<AgentId, Agent>,
    /// credential -> agent id; the only place credentials are stored
    credentials: HashMap<String, AgentId>,
}

/// Registry of every agent the relay has ever seen.
///
/// Agents are never removed at runtime; presence is the only state that decays.
#[derive(Clone, Default)]
pub struct AgentDirectory {
    inner: Arc<RwLock<DirectoryInner>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new agent and mint its credential.
    ///
    /// The credential is returned exactly once; it is not part of the `Agent`
    /// record and no other operation ever reveals it.
    pub async fn register(
        &self,
        name: &str,
        avatar: Option<String>,
    ) -> Result<(Agent, String), ApiError> {
        validate_name(name)?;
        if let Some(ref avatar) = avatar {
            if avatar.chars().count() > AVATAR_MAX {
                return Err(ApiError::Validation(format!(
                    "avatar must be at most {AVATAR_MAX} characters"
                )));
            }
        }

        let mut inner = self.inner.write().await;

        let name_lower = name.to_lowercase();
        if inner
            .agents
            .values()
            .any(|a| a.name.to_lowercase() == name_lower)
        {
            return Err(ApiError::NameTaken(name.to_string()));
        }

        // Collision odds are negligible at 128 bits, but uniqueness is part of
        // the contract, so check anyway
        let credential = loop {
            let candidate = auth::mint_credential();
            if !inner.credentials.contains_key(&candidate) {
                break candidate;
            }
        };

        let now = Utc::now();
        let agent = Agent {
            id: ulid::Ulid::new().to_string(),
            name: name.to_string(),
            avatar,
            online: true,
            last_active: now,
            created_at: now,
            verified: false,
            verified_handle: None,
        };

        inner
            .credentials
            .insert(credential.clone(), agent.id.clone());
        inner.agents.insert(agent.id.clone(), agent.clone());

        tracing::info!(agent_id = %agent.id, name = %agent.name, "agent registered");
        Ok((agent, credential))
    }

    /// Look up an agent by credential.
    ///
    /// Success doubles as a liveness signal: the agent is marked online and its
    /// last-activity timestamp refreshed.
    pub async fn authenticate(&self, credential: &str) -> Result<Agent, ApiError> {
        let mut inner = self.inner.write().await;

        let agent_id = inner
            .credentials
            .get(credential)
            .cloned()
            .ok_or(ApiError::Unauthorized)?;

        let agent = inner
            .agents
            .get_mut(&agent_id)
            .ok_or(ApiError::Unauthorized)?;

        agent.online = true;
        agent.last_active = Utc::now();
        Ok(agent.clone())
    }

    /// Explicit presence clear. Idempotent; unknown ids are a no-op.
    pub async fn mark_offline(&self, agent_id: &str) {
        let mut inner = self.inner.write().await;
        if let Some(agent) = inner.agents.get_mut(agent_id) {
            agent.online = false;
        }
    }

    /// Flip presence to offline for agents idle longer than `threshold`.
    ///
    /// Called from read paths instead of a dedicated timer; presence only
    /// needs to be accurate when somebody looks at it.
    pub async fn sweep_presence(&self, threshold: Duration) {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(threshold).unwrap_or_else(|_| ChronoDuration::seconds(300));
        let mut inner = self.inner.write().await;
        for agent in inner.agents.values_mut() {
            if agent.online && agent.last_active < cutoff {
                agent.online = false;
            }
        }
    }

    /// Online agents sorted by name for deterministic display.
    pub async fn list_online(&self, presence_threshold: Duration) -> Vec<AgentSummary> {
        self.sweep_presence(presence_threshold).await;

        let inner = self.inner.read().await;
        let mut online: Vec<AgentSummary> = inner
            .agents
            .values()
            .filter(|a| a.online)
            .map(AgentSummary::from)
            .collect();
        online.sort_by(|a, b| a.name.cmp(&b.name));
        online
    }

    /// Record the outcome of an out-of-band verification proof flow.
    pub async fn set_verification(&self, agent_id: &str, handle: String) -> Result<(), ApiError> {
        let mut inner = self.inner.write().await;
        let agent = inner
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| ApiError::Validation("unknown agent".to_string()))?;
        agent.verified = true;
        agent.verified_handle = Some(handle);
        Ok(())
    }

    pub async fn total_agents(&self) -> usize {
        self.inner.read().await.agents.len()
    }

    pub async fn online_count(&self, presence_threshold: Duration) -> usize {
        self.sweep_presence(presence_threshold).await;
        let inner = self.inner.read().await;
        inner.agents.values().filter(|a| a.online).count()
    }
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    let len = name.chars().count();
    if len < NAME_MIN || len > NAME_MAX {
        return Err(ApiError::Validation(format!(
            "name must be {NAME_MIN}-{NAME_MAX} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ApiError::Validation(
            "name may only contain letters, digits, underscore, and hyphen".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn test_register_returns_wellformed_credential() {
        let directory = AgentDirectory::new();
        let (agent, credential) = directory.register("Bot1", None).await.unwrap();

        assert_eq!(agent.name, "Bot1");
        assert!(agent.online);
        assert!(auth::looks_like_credential(&credential));
    }

    #[tokio::test]
    async fn test_name_conflict_is_case_insensitive() {
        let directory = AgentDirectory::new();
        directory.register("Bot1", None).await.unwrap();

        let err = directory.register("bot1", None).await.unwrap_err();
        assert!(matches!(err, ApiError::NameTaken(_)));

        let err = directory.register("BOT1", None).await.unwrap_err();
        assert!(matches!(err, ApiError::NameTaken(_)));
    }

    #[tokio::test]
    async fn test_name_validation() {
        let directory = AgentDirectory::new();

        assert!(matches!(
            directory.register("a", None).await.unwrap_err(),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            directory.register(&"x".repeat(33), None).await.unwrap_err(),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            directory.register("has space", None).await.unwrap_err(),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            directory.register("émoji", None).await.unwrap_err(),
            ApiError::Validation(_)
        ));

        assert!(directory.register("ok_name-2", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_avatar_length_bound() {
        let directory = AgentDirectory::new();
        let err = directory
            .register("Bot1", Some("x".repeat(65)))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        assert!(directory
            .register("Bot2", Some("x".repeat(64)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_credentials_never_collide() {
        let directory = AgentDirectory::new();
        let mut seen = std::collections::HashSet::new();
        for i in 0..50 {
            let (_, credential) = directory.register(&format!("agent{i}"), None).await.unwrap();
            assert!(seen.insert(credential));
        }
    }

    #[tokio::test]
    async fn test_authenticate_refreshes_presence() {
        let directory = AgentDirectory::new();
        let (agent, credential) = directory.register("Bot1", None).await.unwrap();

        directory.mark_offline(&agent.id).await;
        assert_eq!(directory.online_count(THRESHOLD).await, 0);

        let authed = directory.authenticate(&credential).await.unwrap();
        assert!(authed.online);
        assert_eq!(directory.online_count(THRESHOLD).await, 1);
    }

    #[tokio::test]
    async fn test_authenticate_unknown_credential() {
        let directory = AgentDirectory::new();
        directory.register("Bot1", None).await.unwrap();

        let err = directory
            .authenticate("agt_00000000000000000000000000000000")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[tokio::test]
    async fn test_mark_offline_is_idempotent() {
        let directory = AgentDirectory::new();
        let (agent, _) = directory.register("Bot1", None).await.unwrap();

        directory.mark_offline(&agent.id).await;
        directory.mark_offline(&agent.id).await;
        directory.mark_offline("no-such-id").await;

        assert_eq!(directory.online_count(THRESHOLD).await, 0);
    }

    #[tokio::test]
    async fn test_sweep_flips_stale_agents_offline() {
        let directory = AgentDirectory::new();
        directory.register("Bot1", None).await.unwrap();

        assert_eq!(directory.online_count(THRESHOLD).await, 1);

        // Zero threshold makes everything stale
        directory.sweep_presence(Duration::ZERO).await;
        assert_eq!(directory.online_count(THRESHOLD).await, 0);
    }

    #[tokio::test]
    async fn test_list_online_sorted_by_name() {
        let directory = AgentDirectory::new();
        directory.register("zeta", None).await.unwrap();
        directory.register("alpha", None).await.unwrap();
        directory.register("Mid", None).await.unwrap();

        let online = directory.list_online(THRESHOLD).await;
        let names: Vec<&str> = online.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Mid", "alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_set_verification() {
        let directory = AgentDirectory::new();
        let (agent, _) = directory.register("Bot1", None).await.unwrap();

        directory
            .set_verification(&agent.id, "@bot1".to_string())
            .await
            .unwrap();

        let online = directory.list_online(THRESHOLD).await;
        assert!(online[0].verified);
    }
}
