//! Background notification delivery.
//!
//! Operations enqueue [`Notification`]s on a bounded channel and return
//! immediately. A single background task drains the channel and hands each
//! message to the configured [`Notifier`]. Nothing that happens here is ever
//! reported back to the operation that produced the message.

use crate::metrics::LendingMetrics;
use lending_core::notification::{Notification, Notifier, NotifyError, Recipient};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 256;

/// Sending half of the notification queue.
///
/// Cheap to clone; every clone feeds the same background task. The task stops
/// once all dispatchers are dropped and the queue is drained.
#[derive(Clone, Debug)]
pub struct NotificationDispatcher {
    sender: mpsc::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Spawn the delivery task on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn spawn(notifier: Arc<dyn Notifier>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<Notification>(capacity);

        let handle = tokio::spawn(async move {
            while let Some(notification) = receiver.recv().await {
                let recipient = describe(&notification.recipient);
                match notifier.send(notification).await {
                    Ok(()) => {
                        LendingMetrics::record_notification_sent();
                        tracing::debug!(recipient = %recipient, "Notification delivered");
                    },
                    Err(error) => {
                        LendingMetrics::record_notification_dropped("delivery_failed");
                        tracing::warn!(
                            recipient = %recipient,
                            error = %error,
                            "Notification delivery failed"
                        );
                    },
                }
            }
            tracing::debug!("Notification queue closed");
        });

        (Self { sender }, handle)
    }

    /// Queue a notification without waiting.
    ///
    /// Returns `false` when the message was dropped because the queue is full
    /// or the delivery task is gone.
    pub fn dispatch(&self, notification: Notification) -> bool {
        match self.sender.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(notification)) => {
                LendingMetrics::record_notification_dropped("queue_full");
                tracing::warn!(
                    recipient = %describe(&notification.recipient),
                    "Notification queue full, dropping message"
                );
                false
            },
            Err(TrySendError::Closed(notification)) => {
                LendingMetrics::record_notification_dropped("queue_closed");
                tracing::warn!(
                    recipient = %describe(&notification.recipient),
                    "Notification queue closed, dropping message"
                );
                false
            },
        }
    }
}

fn describe(recipient: &Recipient) -> String {
    match recipient {
        Recipient::User { user_id, .. } => format!("user:{user_id}"),
        Recipient::Staff => "staff".to_string(),
    }
}

/// Notifier that writes every message to the log.
///
/// Used when no Telegram bot is configured. See
/// [`TelegramNotifier`](crate::telegram::TelegramNotifier).
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            match &notification.recipient {
                Recipient::User { user_id, email } => {
                    tracing::info!(
                        user_id = %user_id,
                        email = %email,
                        text = %notification.text,
                        "Notification"
                    );
                },
                Recipient::Staff => {
                    tracing::info!(text = %notification.text, "Staff notification");
                },
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use lending_testing::RecordingNotifier;

    #[tokio::test]
    async fn test_dispatch_delivers_in_order() {
        let notifier = RecordingNotifier::new();
        let (dispatcher, _task) = NotificationDispatcher::spawn(Arc::new(notifier.clone()), 8);

        assert!(dispatcher.dispatch(Notification::no_overdue()));
        assert!(dispatcher.dispatch(Notification {
            recipient: Recipient::Staff,
            text: "second".to_string(),
        }));

        let sent = notifier.wait_for(2).await;
        assert_eq!(sent[0].text, "No overdue borrowings for today!");
        assert_eq!(sent[1].text, "second");
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let notifier = RecordingNotifier::new();
        notifier.fail_all(true);
        let (dispatcher, task) = NotificationDispatcher::spawn(Arc::new(notifier.clone()), 8);

        assert!(dispatcher.dispatch(Notification::no_overdue()));
        drop(dispatcher);

        // Task keeps running past the failure and exits once the queue closes
        task.await.unwrap();
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_closed_queue_drops_message() {
        let (dispatcher, task) = NotificationDispatcher::spawn(Arc::new(LogNotifier), 1);
        task.abort();
        let _ = task.await;

        assert!(!dispatcher.dispatch(Notification::no_overdue()));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.send(Notification::no_overdue()).await.is_ok());
    }
}
