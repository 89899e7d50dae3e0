//! Outbound notifications (Slack/Mattermost compatible webhooks).
//!
//! Delivery is best effort: failures are logged and never retried, so a dead
//! chat server cannot hold up a repair.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::container::Container;
use crate::policy::{Policy, PolicyError};

/// How chatty the notifications of a container are. A message goes out when
/// its own level is at or below the configured one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotifyLevel {
    Error = 1,
    Info = 2,
    Debug = 3,
}

impl FromStr for NotifyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ERROR" => Ok(NotifyLevel::Error),
            "INFO" => Ok(NotifyLevel::Info),
            "DEBUG" => Ok(NotifyLevel::Debug),
            other => Err(format!("Unknown notification level \"{other}\"")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifyPayload {
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    async fn post(&self, url: &str, payload: &NotifyPayload) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, Default)]
pub struct WebhookTransport {
    client: reqwest::Client,
}

#[async_trait]
impl Transport for WebhookTransport {
    async fn post(&self, url: &str, payload: &NotifyPayload) -> Result<(), NotifyError> {
        self.client
            .post(url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Notifier {
    transport: Arc<dyn Transport>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn container_was_removed(&self, container: &Container) {
        self.send(
            container.name(),
            container.policy(),
            "[:warning:] Container was removed",
            NotifyLevel::Debug,
            "",
        )
        .await;
    }

    pub async fn container_was_restarted(&self, container: &Container, log: &str) {
        self.send(
            container.name(),
            container.policy(),
            "[:warning:] Container was restarted",
            NotifyLevel::Debug,
            log,
        )
        .await;
    }

    pub async fn multiple_failures_happened(&self, container: &Container, log: &str) {
        self.send(
            container.name(),
            container.policy(),
            "[:exclamation:] Multiple restart failures happened",
            NotifyLevel::Info,
            log,
        )
        .await;
    }

    pub async fn max_restarts_reached(&self, container: &Container, log: &str) {
        self.send(
            container.name(),
            container.policy(),
            "[:exclamation:] Max restarts reached, will wait longer till next try",
            NotifyLevel::Error,
            log,
        )
        .await;
    }

    pub async fn not_touching_anymore(&self, container: &Container) {
        self.send(
            container.name(),
            container.policy(),
            "[:skull:] Too many failed restarts, not touching the container anymore",
            NotifyLevel::Error,
            "",
        )
        .await;
    }

    pub async fn container_is_back_alive(&self, container: &Container) {
        self.send(
            container.name(),
            container.policy(),
            "[:white_check_mark:] Container is back alive",
            NotifyLevel::Info,
            "",
        )
        .await;
    }

    pub async fn invalid_configuration(&self, name: &str, policy: &Policy, error: &PolicyError) {
        let message = format!("[:exclamation:] Invalid configuration, not managing the container: {error}");
        self.send(name, policy, &message, NotifyLevel::Error, "")
            .await;
    }

    async fn send(&self, name: &str, policy: &Policy, message: &str, level: NotifyLevel, log: &str) {
        if level > policy.notify_level || policy.notify_url.is_empty() {
            return;
        }

        let payload = NotifyPayload {
            text: format_text(name, message, log),
        };

        if let Err(e) = self.transport.post(&policy.notify_url, &payload).await {
            log::warn!(
                "Unable to post a notification to \"{}\": {e}",
                policy.notify_url
            );
        }
    }
}

fn format_text(name: &str, message: &str, log: &str) -> String {
    if log.is_empty() {
        format!("**{name}:** {message}")
    } else {
        format!("**{name}:** {message}\n\n```\n{log}\n```")
    }
}

#[cfg(test)]
pub use recording::RecordingTransport;


#[cfg(test)]
mod tests {
    use super::*;

    fn container(level: NotifyLevel, url: &str) -> Container {
        let policy = Policy {
            notify_level: level,
            notify_url: url.to_string(),
            ..Policy::default()
        };
        Container::new("app_web_1", "running", 0, "", None, policy)
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("debug".parse::<NotifyLevel>(), Ok(NotifyLevel::Debug));
        assert_eq!(" Info ".parse::<NotifyLevel>(), Ok(NotifyLevel::Info));
        assert_eq!("ERROR".parse::<NotifyLevel>(), Ok(NotifyLevel::Error));
        assert!("LOUD".parse::<NotifyLevel>().is_err());
    }

    #[tokio::test]
    async fn test_messages_are_filtered_by_level() {
        let transport = Arc::new(RecordingTransport::default());
        let notifier = Notifier::new(transport.clone());
        let container = container(NotifyLevel::Info, "http://chat.local/hook");

        notifier.container_was_restarted(&container, "log").await;
        notifier.multiple_failures_happened(&container, "").await;
        notifier.max_restarts_reached(&container, "").await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "http://chat.local/hook");
        assert!(sent[0].1.contains("Multiple restart failures"));
        assert!(sent[1].1.contains("Max restarts reached"));
    }

    #[tokio::test]
    async fn test_nothing_is_sent_without_url() {
        let transport = Arc::new(RecordingTransport::default());
        let notifier = Notifier::new(transport.clone());
        let container = container(NotifyLevel::Debug, "");

        notifier.container_was_removed(&container).await;
        notifier.not_touching_anymore(&container).await;

        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_text_format() {
        assert_eq!(
            format_text("app_web_1", "Container was restarted", ""),
            "**app_web_1:** Container was restarted"
        );
        assert_eq!(
            format_text("app_web_1", "Container was restarted", "boom"),
            "**app_web_1:** Container was restarted\n\n```\nboom\n```"
        );
    }
}
