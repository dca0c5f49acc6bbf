//! Notification channels with severity routing and digest batching.
//!
//! Critical notifications fan out to every channel, warnings go to the
//! primary channel only, and informational ones queue into a digest that
//! flushes on an interval.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{AdapterError, AdapterResult};

/// HTTP budget for webhook posts.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Notification severity, driving the routing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// One outgoing notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub severity: Severity,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(title: &str, body: &str, severity: Severity) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            severity,
            event: None,
            data: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_event(mut self, event: &str) -> Self {
        self.event = Some(event.to_string());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// A notification sink.
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    fn send(&self, notification: &Notification) -> AdapterResult<()>;
}

/// Sink that writes into the tracing log. Always available; the default
/// primary channel.
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&self, notification: &Notification) -> AdapterResult<()> {
        match notification.severity {
            Severity::Critical | Severity::Warning => warn!(
                title = notification.title,
                body = notification.body,
                "notification"
            ),
            Severity::Info => info!(
                title = notification.title,
                body = notification.body,
                "notification"
            ),
        }
        Ok(())
    }
}

/// JSON webhook sink.
pub struct WebhookChannel {
    name: String,
    url: String,
}

impl WebhookChannel {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }
}

impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, notification: &Notification) -> AdapterResult<()> {
        // The blocking client refuses to run on a tokio runtime thread, so
        // the request is made from a plain scoped thread.
        std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let client = reqwest::blocking::Client::builder()
                        .timeout(WEBHOOK_TIMEOUT)
                        .build()
                        .map_err(|e| AdapterError::Io(e.to_string()))?;
                    let response = client
                        .post(&self.url)
                        .json(notification)
                        .send()
                        .map_err(|e| {
                            if e.is_timeout() {
                                AdapterError::Timeout(format!("webhook {}", self.name))
                            } else {
                                AdapterError::Io(e.to_string())
                            }
                        })?;
                    if !response.status().is_success() {
                        return Err(AdapterError::Io(format!(
                            "webhook {} returned {}",
                            self.name,
                            response.status()
                        )));
                    }
                    Ok(())
                })
                .join()
                .unwrap_or_else(|_| Err(AdapterError::Io("webhook thread panicked".into())))
        })
    }
}

/// Buffered informational notifications awaiting a digest flush.
#[derive(Default)]
pub struct DigestQueue {
    pending: Mutex<Vec<Notification>>,
}

impl DigestQueue {
    pub fn push(&self, notification: Notification) {
        self.pending.lock().expect("digest lock").push(notification);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().expect("digest lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the queue into one combined notification, `None` when empty.
    pub fn drain_into_digest(&self) -> Option<Notification> {
        let mut pending = self.pending.lock().expect("digest lock");
        if pending.is_empty() {
            return None;
        }
        let items: Vec<Notification> = pending.drain(..).collect();
        let body = items
            .iter()
            .map(|n| format!("- {}: {}", n.title, n.body))
            .collect::<Vec<_>>()
            .join("\n");
        Some(Notification::new(
            &format!("digest ({} items)", items.len()),
            &body,
            Severity::Info,
        ))
    }
}

/// Routes by severity: critical → all, warning → primary, info → digest.
pub struct NotificationRouter {
    channels: Vec<Box<dyn NotificationChannel>>,
    primary: String,
    digest: DigestQueue,
}

impl NotificationRouter {
    pub fn new(channels: Vec<Box<dyn NotificationChannel>>, primary: &str) -> Self {
        Self {
            channels,
            primary: primary.to_string(),
            digest: DigestQueue::default(),
        }
    }

    pub fn digest_len(&self) -> usize {
        self.digest.len()
    }

    /// Route one notification. Channel failures are logged, never raised —
    /// a broken sink must not take down the PM loop.
    pub fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Critical => {
                for channel in &self.channels {
                    self.try_send(channel.as_ref(), &notification);
                }
            }
            Severity::Warning => {
                if let Some(primary) = self.primary_channel() {
                    self.try_send(primary, &notification);
                }
            }
            Severity::Info => self.digest.push(notification),
        }
    }

    /// Flush the digest to the primary channel.
    pub fn flush_digest(&self) {
        let Some(digest) = self.digest.drain_into_digest() else {
            return;
        };
        if let Some(primary) = self.primary_channel() {
            self.try_send(primary, &digest);
        }
    }

    fn primary_channel(&self) -> Option<&dyn NotificationChannel> {
        self.channels
            .iter()
            .find(|c| c.name() == self.primary)
            .or_else(|| self.channels.first())
            .map(|c| c.as_ref())
    }

    fn try_send(&self, channel: &dyn NotificationChannel, notification: &Notification) {
        if let Err(e) = channel.send(notification) {
            warn!(channel = channel.name(), error = %e, "notification send failed");
        }
    }
}
