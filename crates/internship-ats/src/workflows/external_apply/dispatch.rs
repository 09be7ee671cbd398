use std::sync::Arc;

use tracing::{info, warn};

use crate::config::NotificationConfig;

use super::repository::{AnalyticsEvent, AnalyticsSink, Notification, NotificationDispatcher};

/// Best-effort delivery of notifications and analytics. Called only after the
/// primary write has committed; failures are logged and dropped.
pub struct SideEffects<N, E> {
    notifier: Arc<N>,
    analytics: Arc<E>,
    delivery: NotificationConfig,
}

impl<N, E> SideEffects<N, E>
where
    N: NotificationDispatcher,
    E: AnalyticsSink,
{
    pub fn new(notifier: Arc<N>, analytics: Arc<E>, delivery: NotificationConfig) -> Self {
        Self {
            notifier,
            analytics,
            delivery,
        }
    }

    /// Returns how many notifications were handed off successfully.
    pub fn notify(&self, notifications: Vec<Notification>) -> usize {
        if notifications.is_empty() {
            return 0;
        }

        let count = notifications.len();
        let kind = notifications[0].kind;
        let email_copies = notifications.clone();

        match self.notifier.dispatch(notifications) {
            Ok(()) => {
                for notification in &email_copies {
                    self.email_stub(notification);
                }
                count
            }
            Err(error) => {
                warn!(
                    notification_type = kind.label(),
                    count,
                    %error,
                    "notification dispatch failed"
                );
                0
            }
        }
    }

    pub fn track(&self, event: AnalyticsEvent) {
        let name = event.name.clone();
        if let Err(error) = self.analytics.track(event) {
            warn!(event = %name, %error, "analytics event dropped");
        }
    }

    // No email provider is wired up yet; record what would have been sent.
    fn email_stub(&self, notification: &Notification) {
        if !self.delivery.email_enabled {
            info!(
                notification_type = notification.kind.label(),
                user_id = %notification.user_id,
                title = %notification.title,
                "email stub disabled"
            );
            return;
        }

        info!(
            from = self.delivery.email_from.as_deref().unwrap_or("unset"),
            notification_type = notification.kind.label(),
            user_id = %notification.user_id,
            title = %notification.title,
            "email stub enabled_no_provider"
        );
    }
}
