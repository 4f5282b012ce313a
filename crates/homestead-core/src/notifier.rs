//! The notification-trigger contract.
//!
//! The core decides *when* a farmer should hear about a crop; delivering
//! the message is somebody else's job. A [`Notifier`] receives one
//! [`Notification`] per qualifying transition, only after the transition
//! has been persisted, so a lost race never produces a notification.

use core::future::Future;

use tokio::sync::mpsc;
use tracing::info;

use homestead_types::Notification;

/// Errors a notifier can report. They are logged by callers, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The receiving side has gone away.
    #[error("notification channel closed")]
    Closed,

    /// The transport rejected or failed to send the message.
    #[error("notification transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },
}

/// Delivers crop lifecycle notifications to farmers.
pub trait Notifier: Send + Sync + 'static {
    /// Hand one notification to the delivery mechanism.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the notification could not be queued.
    fn notify(
        &self,
        notification: &Notification,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Writes notifications to the log and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            farmer = %notification.farmer,
            crop = %notification.crop,
            kind = notification.kind.as_str(),
            at = %notification.at,
            "crop notification"
        );
        Ok(())
    }
}

/// Forwards notifications into an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiver that observes it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.tx
            .send(notification.clone())
            .map_err(|_closed| NotifyError::Closed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use homestead_types::{CropId, FarmerId, NotificationKind};

    use super::*;

    fn ready() -> Notification {
        Notification {
            farmer: FarmerId::new(),
            kind: NotificationKind::Ready,
            crop: CropId::new(),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn channel_notifier_forwards() {
        let (notifier, mut rx) = ChannelNotifier::channel();
        let note = ready();
        notifier.notify(&note).await.unwrap();
        assert_eq!(rx.recv().await, Some(note));
    }

    #[tokio::test]
    async fn channel_notifier_reports_closed_receiver() {
        let (notifier, rx) = ChannelNotifier::channel();
        drop(rx);
        assert!(matches!(
            notifier.notify(&ready()).await,
            Err(NotifyError::Closed)
        ));
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(LogNotifier.notify(&ready()).await.is_ok());
    }
}
