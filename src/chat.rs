//! Crew chat polling.
//!
//! The crew center has no push channel for chat, so this service polls the
//! message and broadcast endpoints on an interval and re-emits only when the
//! merged payload actually changed.

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api_client::{ApiClient, ChatMessage};

const CHAT_CHANNEL_SIZE: usize = 16;

/// Merge pilot messages and admin broadcasts into one display list.
/// Broadcasts are tagged as admin traffic.
fn merge_messages(messages: Vec<ChatMessage>, broadcasts: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let mut merged = messages;
    merged.extend(broadcasts.into_iter().map(|b| {
        let user = if b.user.is_empty() {
            "ADMIN".to_string()
        } else {
            b.user
        };
        ChatMessage {
            user,
            text: b.text,
            time: b.time,
            is_admin: true,
        }
    }));
    merged
}

/// Polls chat and broadcasts, emitting the merged list on change
pub struct ChatService {
    api: ApiClient,
    poll_interval: Duration,
}

impl ChatService {
    pub fn new(api: ApiClient, poll_secs: u64) -> Self {
        Self {
            api,
            poll_interval: Duration::from_secs(poll_secs.max(1)),
        }
    }

    async fn fetch_once(&self) -> Option<Vec<ChatMessage>> {
        let messages = match self.api.chat_list().await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Chat fetch failed: {}", e);
                return None;
            }
        };
        let broadcasts = self.api.broadcasts().await.unwrap_or_default();
        Some(merge_messages(messages, broadcasts))
    }

    /// Spawn the polling task; subscribers receive each changed message list
    pub fn start(self) -> (broadcast::Receiver<Vec<ChatMessage>>, JoinHandle<()>) {
        let (tx, rx) = broadcast::channel(CHAT_CHANNEL_SIZE);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            let mut last: Option<Vec<ChatMessage>> = None;

            loop {
                interval.tick().await;
                let Some(merged) = self.fetch_once().await else {
                    continue;
                };
                if last.as_ref() == Some(&merged) {
                    continue;
                }
                debug!("Chat updated ({} messages)", merged.len());
                last = Some(merged.clone());
                if tx.send(merged).is_err() {
                    // Nobody is listening anymore
                    return;
                }
            }
        });

        (rx, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(user: &str, text: &str, is_admin: bool) -> ChatMessage {
        ChatMessage {
            user: user.to_string(),
            text: text.to_string(),
            time: None,
            is_admin,
        }
    }

    #[test]
    fn test_merge_tags_broadcasts_as_admin() {
        let merged = merge_messages(
            vec![msg("ACV042", "bonjour", false)],
            vec![msg("", "maintenance tonight", false)],
        );
        assert_eq!(merged.len(), 2);
        assert!(!merged[0].is_admin);
        assert!(merged[1].is_admin);
        assert_eq!(merged[1].user, "ADMIN");
    }

    #[test]
    fn test_merge_keeps_broadcast_author_when_present() {
        let merged = merge_messages(vec![], vec![msg("OPS", "new schedule", false)]);
        assert_eq!(merged[0].user, "OPS");
        assert!(merged[0].is_admin);
    }

    #[test]
    fn test_change_detection_equality() {
        let a = vec![msg("ACV042", "bonjour", false)];
        let b = vec![msg("ACV042", "bonjour", false)];
        // Same payload compares equal, so the poller will not re-emit it
        assert_eq!(a, b);
        let c = vec![msg("ACV042", "bonsoir", false)];
        assert_ne!(a, c);
    }
}
