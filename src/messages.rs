//! Append-only message log with monotonic ids and cursor range queries.
//!
//! Retention is a fixed ring: oldest entries beyond the bound are dropped.
//! Ids keep counting past the trim horizon, so `totalMessages` in stats and
//! cursor arithmetic stay correct for the lifetime of the process.

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::ApiError;
use crate::types::{Message, MessageId};

const CONTENT_MAX: usize = 2000;

struct LogInner {
    /// Ascending by id
    entries: VecDeque<Message>,
    next_id: MessageId,
}

/// Range query, already validated by the API layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct RangeQuery {
    pub before: Option<MessageId>,
    pub after: Option<MessageId>,
    pub limit: usize,
}

#[derive(Clone)]
pub struct MessageLog {
    inner: Arc<RwLock<LogInner>>,
    retain: usize,
}

impl MessageLog {
    pub fn new(retain: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(LogInner {
                entries: VecDeque::new(),
                next_id: 1,
            })),
            retain,
        }
    }

    /// Append a message, assigning the next id.
    ///
    /// Id assignment and the push happen under one write lock, so concurrent
    /// appends can neither share an id nor appear reordered to a reader.
    pub async fn append(
        &self,
        agent_id: &str,
        agent_name: &str,
        content: &str,
    ) -> Result<Message, ApiError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ApiError::Validation("message content is empty".to_string()));
        }
        if content.chars().count() > CONTENT_MAX {
            return Err(ApiError::Validation(format!(
                "message content exceeds {CONTENT_MAX} characters"
            )));
        }

        let mut inner = self.inner.write().await;
        let message = Message {
            id: inner.next_id,
            agent_id: agent_id.to_string(),
            agent_name: agent_name.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        inner.next_id += 1;
        inner.entries.push_back(message.clone());

        while inner.entries.len() > self.retain {
            inner.entries.pop_front();
        }

        Ok(message)
    }

    /// Fetch a page of messages, always returned oldest-first.
    ///
    /// No cursor: the `limit` most recent. `after`: ids greater than the
    /// cursor, ascending. `before`: ids less than the cursor, picked
    /// newest-first internally and reversed on the way out.
    pub async fn range(&self, query: RangeQuery) -> Vec<Message> {
        let inner = self.inner.read().await;
        let entries = &inner.entries;

        match (query.before, query.after) {
            (None, Some(after)) => entries
                .iter()
                .filter(|m| m.id > after)
                .take(query.limit)
                .cloned()
                .collect(),
            (Some(before), None) => {
                let mut page: Vec<Message> = entries
                    .iter()
                    .rev()
                    .filter(|m| m.id < before)
                    .take(query.limit)
                    .cloned()
                    .collect();
                page.reverse();
                page
            }
            _ => {
                // Both cursors is rejected upstream; treat as no cursor here
                let skip = entries.len().saturating_sub(query.limit);
                entries.iter().skip(skip).cloned().collect()
            }
        }
    }

    /// The `n` most recent messages, oldest-first (history replay).
    pub async fn recent(&self, n: usize) -> Vec<Message> {
        self.range(RangeQuery {
            limit: n,
            ..Default::default()
        })
        .await
    }

    /// Total messages ever appended (survives ring trimming).
    pub async fn total_appended(&self) -> u64 {
        self.inner.read().await.next_id - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(before: Option<u64>, after: Option<u64>, limit: usize) -> RangeQuery {
        RangeQuery {
            before,
            after,
            limit,
        }
    }

    #[tokio::test]
    async fn test_ids_start_at_one_and_increase() {
        let log = MessageLog::new(500);

        let m1 = log.append("a1", "Bot1", "hello").await.unwrap();
        let m2 = log.append("a1", "Bot1", "world").await.unwrap();
        assert_eq!(m1.id, 1);
        assert_eq!(m2.id, 2);
    }

    #[tokio::test]
    async fn test_content_validation() {
        let log = MessageLog::new(500);

        assert!(matches!(
            log.append("a1", "Bot1", "").await.unwrap_err(),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            log.append("a1", "Bot1", "   \n\t ").await.unwrap_err(),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            log.append("a1", "Bot1", &"x".repeat(2001)).await.unwrap_err(),
            ApiError::Validation(_)
        ));

        // Bound applies after trimming
        let padded = format!("  {}  ", "x".repeat(2000));
        let msg = log.append("a1", "Bot1", &padded).await.unwrap();
        assert_eq!(msg.content.chars().count(), 2000);
    }

    #[tokio::test]
    async fn test_ring_trims_oldest() {
        let log = MessageLog::new(3);
        for i in 0..5 {
            log.append("a1", "Bot1", &format!("m{i}")).await.unwrap();
        }

        let all = log.range(query(None, None, 10)).await;
        let ids: Vec<u64> = all.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(log.total_appended().await, 5);
    }

    #[tokio::test]
    async fn test_no_cursor_returns_most_recent_oldest_first() {
        let log = MessageLog::new(500);
        for i in 0..10 {
            log.append("a1", "Bot1", &format!("m{i}")).await.unwrap();
        }

        let page = log.range(query(None, None, 3)).await;
        let ids: Vec<u64> = page.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![8, 9, 10]);
    }

    #[tokio::test]
    async fn test_after_cursor_ascending() {
        let log = MessageLog::new(500);
        for i in 0..10 {
            log.append("a1", "Bot1", &format!("m{i}")).await.unwrap();
        }

        let page = log.range(query(None, Some(4), 3)).await;
        let ids: Vec<u64> = page.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![5, 6, 7]);

        let rest = log.range(query(None, Some(7), 100)).await;
        let ids: Vec<u64> = rest.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![8, 9, 10]);
    }

    #[tokio::test]
    async fn test_before_cursor_scrollback() {
        let log = MessageLog::new(500);
        for i in 0..10 {
            log.append("a1", "Bot1", &format!("m{i}")).await.unwrap();
        }

        // Nearest to the cursor, oldest-first on the way out
        let page = log.range(query(Some(8), None, 3)).await;
        let ids: Vec<u64> = page.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![5, 6, 7]);

        let top = log.range(query(Some(2), None, 5)).await;
        let ids: Vec<u64> = top.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn test_after_pagination_has_no_gaps_or_duplicates() {
        let log = MessageLog::new(500);
        for i in 0..25 {
            log.append("a1", "Bot1", &format!("m{i}")).await.unwrap();
        }

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let page = log.range(query(None, Some(cursor), 7)).await;
            if page.is_empty() {
                break;
            }
            cursor = page.last().unwrap().id;
            seen.extend(page.into_iter().map(|m| m.id));
        }

        assert_eq!(seen, (1..=25).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_concurrent_appends_unique_increasing_ids() {
        let log = MessageLog::new(10_000);
        let mut handles = Vec::new();
        for t in 0..8 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    log.append("a", &format!("Bot{t}"), &format!("m{i}"))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let all = log.range(query(None, None, 10_000)).await;
        let ids: Vec<u64> = all.iter().map(|m| m.id).collect();
        assert_eq!(ids, (1..=400).collect::<Vec<u64>>());
    }
}
