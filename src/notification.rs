//! Outbound notifications
//!
//! Dispatch is fire-and-forget: the triggering operation has already
//! committed by the time a notification is sent, and a delivery failure is
//! only logged.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;
use crate::guardian::model::GuardianRole;

/// Events that reach users outside the API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    GuardianInvited {
        guardian_id: Uuid,
        care_subject_id: Uuid,
        invitee_id: Uuid,
        invitee_email: String,
        inviter_id: Uuid,
        role: GuardianRole,
    },
    VerificationCodeIssued {
        email: String,
        code: String,
    },
}

/// Delivery backend for notifications
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notification: Notification) -> Result<()>;
}

/// Writes notifications to the log instead of delivering them
pub struct LogNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for LogNotificationDispatcher {
    async fn dispatch(&self, notification: Notification) -> Result<()> {
        match &notification {
            Notification::GuardianInvited {
                guardian_id,
                invitee_email,
                role,
                ..
            } => log::info!(
                "Notify {}: invited as {} guardian ({})",
                invitee_email,
                role,
                guardian_id
            ),
            Notification::VerificationCodeIssued { email, .. } => {
                log::info!("Notify {}: verification code issued", email)
            }
        }
        Ok(())
    }
}

/// Shared reference to a notification dispatcher
pub type SharedNotifier = Arc<dyn NotificationDispatcher>;

/// Send without waiting; failures are logged and dropped
pub fn dispatch_detached(notifier: &SharedNotifier, notification: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        if let Err(e) = notifier.dispatch(notification).await {
            log::warn!("Notification delivery failed: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CareHubError;
    use tokio::sync::mpsc;

    struct ChannelNotifier(mpsc::UnboundedSender<Notification>);

    #[async_trait]
    impl NotificationDispatcher for ChannelNotifier {
        async fn dispatch(&self, notification: Notification) -> Result<()> {
            self.0
                .send(notification)
                .map_err(|e| CareHubError::InternalError(e.to_string()))
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl NotificationDispatcher for FailingNotifier {
        async fn dispatch(&self, _notification: Notification) -> Result<()> {
            Err(CareHubError::InternalError("smtp down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_dispatch_detached_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier: SharedNotifier = Arc::new(ChannelNotifier(tx));
        let notification = Notification::VerificationCodeIssued {
            email: "a@example.com".to_string(),
            code: "123456".to_string(),
        };

        dispatch_detached(&notifier, notification.clone());
        assert_eq!(rx.recv().await, Some(notification));
    }

    #[tokio::test]
    async fn test_failed_dispatch_is_swallowed() {
        let notifier: SharedNotifier = Arc::new(FailingNotifier);
        dispatch_detached(
            &notifier,
            Notification::VerificationCodeIssued {
                email: "a@example.com".to_string(),
                code: "000000".to_string(),
            },
        );
        tokio::task::yield_now().await;
    }

    #[test]
    fn test_notification_json_shape() {
        let json = serde_json::to_value(Notification::VerificationCodeIssued {
            email: "a@example.com".to_string(),
            code: "123456".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "verification_code_issued");
        assert_eq!(json["code"], "123456");
    }
}
