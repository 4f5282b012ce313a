//! Notifier wiring for the engine.
//!
//! Notifications are published to NATS when a URL is configured and only
//! logged otherwise. Delivery to farmers (mail, push, in-game inbox) is
//! the job of whatever subscribes to the subjects.
//!
//! # Subject Convention
//!
//! - **Publish:** `{prefix}.{farmer_id}.{kind}`, e.g.
//!   `homestead.notifications.0191....needs_water`
//! - **Payload:** the [`Notification`] as JSON

use homestead_core::{LogNotifier, Notifier, NotifyError};
use homestead_types::Notification;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Subject a notification is published on.
pub fn notification_subject(prefix: &str, notification: &Notification) -> String {
    format!(
        "{prefix}.{}.{}",
        notification.farmer,
        notification.kind.as_str()
    )
}

/// Publishes notifications to NATS.
pub struct NatsNotifier {
    /// The NATS client connection.
    client: async_nats::Client,
    /// Subject prefix, without a trailing dot.
    prefix: String,
}

impl NatsNotifier {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the connection fails.
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, EngineError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| EngineError::Nats {
                message: format!("failed to connect to NATS at {url}: {e}"),
            })?;
        Ok(Self {
            client,
            prefix: prefix.trim_end_matches('.').to_owned(),
        })
    }

    /// Flush buffered publishes.
    async fn flush(&self) {
        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "failed to flush NATS notifications");
        }
    }
}

impl Notifier for NatsNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let subject = notification_subject(&self.prefix, notification);
        let payload = serde_json::to_vec(notification).map_err(|e| NotifyError::Transport {
            message: format!("failed to serialize notification: {e}"),
        })?;
        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| NotifyError::Transport {
                message: format!("failed to publish to {subject}: {e}"),
            })?;
        debug!(subject = %subject, "notification published");
        Ok(())
    }
}

/// The notifier the engine runs with.
pub enum EngineNotifier {
    /// Log only.
    Log(LogNotifier),
    /// Publish to NATS.
    Nats(NatsNotifier),
}

impl EngineNotifier {
    /// Pick the notifier for the configured NATS URL.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if a URL is set but unreachable.
    pub async fn from_config(nats_url: &str, prefix: &str) -> Result<Self, EngineError> {
        if nats_url.is_empty() {
            info!("no NATS URL configured, notifications will only be logged");
            return Ok(Self::Log(LogNotifier));
        }
        info!(nats_url, subject_prefix = prefix, "connecting notifier to NATS");
        Ok(Self::Nats(NatsNotifier::connect(nats_url, prefix).await?))
    }

    /// Flush anything still buffered before shutdown.
    pub async fn flush(&self) {
        if let Self::Nats(nats) = self {
            nats.flush().await;
        }
    }
}

impl Notifier for EngineNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        match self {
            Self::Log(log) => log.notify(notification).await,
            Self::Nats(nats) => nats.notify(notification).await,
        }
    }
}
