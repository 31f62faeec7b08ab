use tokio::sync::broadcast;
use tracing::debug;

use crate::events::PageMessage;
use crate::Result;

/// The page's broadcast message channel.
///
/// Every posted message reaches every listener subscribed at the time of
/// posting, including the poster's own listeners.
#[derive(Debug, Clone)]
pub struct PageChannel {
    tx: broadcast::Sender<PageMessage>,
}

impl PageChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Broadcasts `message`; returns how many listeners it reached.
    pub fn post_message(&self, message: PageMessage) -> usize {
        let kind = message.type_name();
        match self.tx.send(message) {
            Ok(reached) => {
                debug!(message_type = kind, reached, "Posted page message");
                reached
            }
            Err(_) => {
                debug!(message_type = kind, "Posted page message with no listeners");
                0
            }
        }
    }

    /// Parses and broadcasts a raw JSON message posted by page scripts.
    pub fn post_raw(&self, json: &str) -> Result<usize> {
        let message = serde_json::from_str::<PageMessage>(json).map_err(|e| {
            let head: String = json.chars().take(120).collect();
            debug!(error = %e, raw = %head, "Dropping unparseable page message");
            e
        })?;
        Ok(self.post_message(message))
    }

    /// Registers a new listener.
    pub fn subscribe(&self) -> broadcast::Receiver<PageMessage> {
        self.tx.subscribe()
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for PageChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_raw_broadcasts_parsed_message() {
        let channel = PageChannel::default();
        let mut rx = channel.subscribe();

        let reached = channel
            .post_raw(r#"{"type":"INTERACTION_COMPLETE","timestamp":"t","success":true}"#)
            .unwrap();
        assert_eq!(reached, 1);
        assert_eq!(
            rx.recv().await.unwrap(),
            PageMessage::InteractionComplete {
                timestamp: "t".to_string(),
                success: true,
                error: None,
            }
        );
    }

    #[test]
    fn test_post_raw_rejects_garbage() {
        let channel = PageChannel::default();
        assert!(channel.post_raw("not json").is_err());
        assert!(channel.post_raw(r#"{"no_type":true}"#).is_err());
    }

    #[test]
    fn test_listener_count_tracks_drops() {
        let channel = PageChannel::default();
        assert_eq!(channel.listener_count(), 0);
        let rx = channel.subscribe();
        assert_eq!(channel.listener_count(), 1);
        drop(rx);
        assert_eq!(channel.listener_count(), 0);
        assert_eq!(
            channel.post_message(PageMessage::CaptureScreenshot {
                timestamp: "t".into()
            }),
            0
        );
    }
}
