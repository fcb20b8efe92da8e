// ABOUTME: Best-effort delivery of deployment and rollback outcomes.
// ABOUTME: Always logs through tracing; optionally POSTs JSON to a webhook via curl.

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::process::{CommandRunner, ExternalCommand, ProcessError};
use crate::types::{EnvironmentName, VersionId};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Deployment,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub event: Event,
    pub status: Status,
    pub environment: EnvironmentName,
    pub version_id: VersionId,
    pub message: String,
}

impl Notification {
    pub fn new(
        event: Event,
        status: Status,
        environment: &EnvironmentName,
        version_id: &VersionId,
        detail: Option<&str>,
    ) -> Self {
        let verb = match (event, status) {
            (Event::Deployment, Status::Succeeded) => "deployed to",
            (Event::Deployment, Status::Failed) => "failed to deploy to",
            (Event::Rollback, Status::Succeeded) => "restored on",
            (Event::Rollback, Status::Failed) => "failed to restore on",
        };
        let mut message = format!("{version_id} {verb} {environment}");
        if let Some(detail) = detail {
            message.push_str(": ");
            message.push_str(detail);
        }
        Self {
            event,
            status,
            environment: environment.clone(),
            version_id: version_id.clone(),
            message,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook delivery failed: {0}")]
    Webhook(#[from] ProcessError),

    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes outcomes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification.status {
            Status::Succeeded => tracing::info!(
                environment = %notification.environment,
                version = %notification.version_id,
                "{}",
                notification.message
            ),
            Status::Failed => tracing::error!(
                environment = %notification.environment,
                version = %notification.version_id,
                "{}",
                notification.message
            ),
        }
        Ok(())
    }
}

/// POSTs the notification as JSON.
pub struct WebhookNotifier {
    url: String,
    runner: Arc<dyn CommandRunner>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            url: url.into(),
            runner,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = serde_json::to_string(notification)?;
        // The URL carries the hook secret; it travels on stdin, never argv.
        let config = format!(
            "url = {}\ndata = {}\n",
            curl_config_string(&self.url),
            curl_config_string(&body)
        );
        let cmd = ExternalCommand::new("curl")
            .args(["-sS", "--fail", "-X", "POST", "-H", "Content-Type: application/json"])
            .args(["--max-time", "10", "--config", "-"])
            .stdin(config)
            .timeout(WEBHOOK_TIMEOUT);
        self.runner.run(&cmd).await?;
        Ok(())
    }
}

fn curl_config_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Delivers to every notifier; failures are logged and swallowed.
#[derive(Default)]
pub struct Notifiers {
    targets: Vec<Box<dyn Notifier>>,
}

impl Notifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: impl Notifier + 'static) -> Self {
        self.targets.push(Box::new(notifier));
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Deliver and report how many notifiers failed.
    pub async fn deliver(&self, notification: &Notification) -> usize {
        let mut failures = 0;
        for target in &self.targets {
            if let Err(e) = target.notify(notification).await {
                tracing::warn!(environment = %notification.environment, "notification not delivered: {}", e);
                failures += 1;
            }
        }
        failures
    }
}

#[async_trait]
impl Notifier for Notifiers {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.deliver(notification).await;
        Ok(())
    }
}
