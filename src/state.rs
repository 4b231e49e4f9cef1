//! Shared application state, constructed once at startup and handed to every
//! handler behind an `Arc`.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::directory::AgentDirectory;
use crate::error::ApiError;
use crate::hub::{BroadcastHub, FeedGuard, Frame};
use crate::limits::RateLimiter;
use crate::messages::{MessageLog, RangeQuery};
use crate::types::{Agent, Message, StatsSnapshot};

pub struct AppState {
    pub config: Config,
    pub directory: AgentDirectory,
    pub messages: MessageLog,
    pub hub: Arc<BroadcastHub>,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let hub = Arc::new(BroadcastHub::new(
            config.max_feed_connections,
            config.max_feed_per_ip,
            config.feed_queue_depth,
        ));
        Self {
            directory: AgentDirectory::new(),
            messages: MessageLog::new(config.retain_messages),
            hub,
            limiter: RateLimiter::new(),
            config,
        }
    }

    /// Register a new agent, subject to the per-source registration limit.
    pub async fn register_agent(
        &self,
        source: IpAddr,
        name: &str,
        avatar: Option<String>,
    ) -> Result<(Agent, String), ApiError> {
        let allowed = self
            .limiter
            .allow(
                &format!("reg:{source}"),
                self.config.registrations_per_hour,
                Duration::from_secs(3600),
            )
            .await;
        if !allowed {
            tracing::warn!(ip = %source, "registration rate limited");
            return Err(ApiError::RateLimited { retry_after: 3600 });
        }

        self.directory.register(name, avatar).await
    }

    /// Append a message for an already-authenticated agent and fan it out.
    pub async fn post_message(&self, agent: &Agent, content: &str) -> Result<Message, ApiError> {
        let allowed = self
            .limiter
            .allow(
                &format!("msg:{}", agent.id),
                self.config.messages_per_minute,
                Duration::from_secs(60),
            )
            .await;
        if !allowed {
            tracing::warn!(agent = %agent.name, "message rate limited");
            return Err(ApiError::RateLimited { retry_after: 60 });
        }

        let message = self.messages.append(&agent.id, &agent.name, content).await?;
        self.hub.broadcast(Frame::message(&message));
        tracing::debug!(id = message.id, agent = %agent.name, "message appended");
        Ok(message)
    }

    /// Admit a live feed connection, seeding it with the history replay.
    pub async fn open_feed(
        &self,
        source: IpAddr,
    ) -> Result<(FeedGuard, mpsc::Receiver<Frame>), ApiError> {
        let history = self.messages.recent(self.config.history_replay).await;
        self.hub.subscribe(source, Frame::history(&history))
    }

    /// Paged message fetch with the limit clamped to the configured maximum.
    pub async fn list_messages(&self, mut query: RangeQuery) -> Vec<Message> {
        query.limit = query.limit.min(self.config.page_limit_max);
        self.messages.range(query).await
    }

    pub async fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_agents: self.directory.total_agents().await,
            online_agents: self
                .directory
                .online_count(self.config.presence_timeout)
                .await,
            total_messages: self.messages.total_appended().await,
        }
    }
}
