//! Push payload handling and notification click routing.
//!
//! Inbound push payloads become displayed notifications; a missing or
//! malformed payload degrades to the configured defaults and is never
//! fatal. Displayed notifications are traced, kept in a bounded feed for
//! polling clients, and broadcast to live subscribers.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const FEED_CAP: usize = 32;

/// Wire shape of a push payload. Every field is optional.
#[derive(Debug, Default, Deserialize)]
struct PushPayload {
    title: Option<String>,
    body: Option<String>,
    url: Option<String>,
}

/// An action button attached to a notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// A displayed notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Target opened when the notification is tapped.
    pub url: String,
    pub actions: Vec<NotificationAction>,
}

/// What a client should do after a notification click.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ClientCommand {
    OpenWindow { url: String },
}

pub struct NotificationBridge {
    default_title: String,
    default_body: String,
    feed: Mutex<VecDeque<Notification>>,
    tx: broadcast::Sender<Notification>,
}

impl NotificationBridge {
    pub fn new(default_title: String, default_body: String) -> Self {
        let (tx, _) = broadcast::channel(FEED_CAP);
        Self { default_title, default_body, feed: Mutex::new(VecDeque::new()), tx }
    }

    /// Convert an inbound push payload into a displayed notification.
    pub fn on_push(&self, payload: Option<&[u8]>) -> Notification {
        let parsed = payload
            .and_then(|bytes| serde_json::from_slice::<PushPayload>(bytes).ok())
            .unwrap_or_default();

        let notification = Notification {
            title: parsed.title.unwrap_or_else(|| self.default_title.clone()),
            body: parsed.body.unwrap_or_else(|| self.default_body.clone()),
            url: parsed.url.unwrap_or_else(|| "/".to_string()),
            actions: vec![
                NotificationAction { action: "view".to_string(), title: "View".to_string() },
                NotificationAction { action: "dismiss".to_string(), title: "Dismiss".to_string() },
            ],
        };

        self.display(notification.clone());
        notification
    }

    /// Display a locally-originated notification (e.g. media saved).
    pub fn announce(&self, title: &str, body: &str, url: &str) -> Notification {
        let notification = Notification {
            title: title.to_string(),
            body: body.to_string(),
            url: url.to_string(),
            actions: vec![NotificationAction { action: "view".to_string(), title: "View".to_string() }],
        };
        self.display(notification.clone());
        notification
    }

    fn display(&self, notification: Notification) {
        tracing::info!(title = %notification.title, url = %notification.url, "displaying notification");

        if let Ok(mut feed) = self.feed.lock() {
            if feed.len() == FEED_CAP {
                feed.pop_front();
            }
            feed.push_back(notification.clone());
        }

        // No live subscribers is fine.
        let _ = self.tx.send(notification);
    }

    /// Route a notification click. A `view` action or a default tap opens
    /// the target; `dismiss` (or anything unknown) does nothing further.
    pub fn on_click(&self, action: Option<&str>, url: &str) -> Option<ClientCommand> {
        match action {
            None | Some("view") => Some(ClientCommand::OpenWindow { url: url.to_string() }),
            Some(_) => None,
        }
    }

    /// Recently displayed notifications, oldest first.
    pub fn recent(&self) -> Vec<Notification> {
        self.feed
            .lock()
            .map(|feed| feed.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Subscribe to notifications displayed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}
