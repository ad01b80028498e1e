/// Cross-conversation alerts and the global unread counter
///
/// The global counter is separate from the per-conversation counts the
/// registry keeps; only an explicit caller action clears it.
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Fallback when a notification carries no sender identity
const GENERIC_SENDER: &str = "Someone";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    NewMessage,
    ChannelError,
    Degraded,
    Restored,
}

#[derive(Debug, Clone)]
pub struct Alert {
    pub kind: AlertKind,
    pub text: String,
}

#[derive(Default)]
pub struct NotificationRelay {
    unread: AtomicU32,
    alerts: Mutex<Vec<Alert>>,
}

impl NotificationRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// A message arrived for a conversation the user is not viewing
    pub fn notify_message(&self, sender_name: Option<&str>) {
        self.unread.fetch_add(1, Ordering::SeqCst);
        self.push(Alert {
            kind: AlertKind::NewMessage,
            text: format!(
                "New message from {}",
                sender_name.unwrap_or(GENERIC_SENDER)
            ),
        });
    }

    /// Transient channel-level error
    pub fn notify_error(&self, message: &str) {
        self.push(Alert {
            kind: AlertKind::ChannelError,
            text: message.to_string(),
        });
    }

    /// Persistent but non-blocking connectivity warning; the connection
    /// manager de-duplicates it per outage
    pub fn notify_degraded(&self) {
        self.push(Alert {
            kind: AlertKind::Degraded,
            text: "Connection lost, retrying in the background".to_string(),
        });
    }

    pub fn notify_restored(&self) {
        self.push(Alert {
            kind: AlertKind::Restored,
            text: "Connection restored".to_string(),
        });
    }

    pub fn unread(&self) -> u32 {
        self.unread.load(Ordering::SeqCst)
    }

    /// Explicit reset; viewing a conversation does not touch this counter
    pub fn clear_unread(&self) {
        self.unread.store(0, Ordering::SeqCst);
    }

    /// Drain pending alerts for display
    pub fn take_alerts(&self) -> Vec<Alert> {
        std::mem::take(&mut self.alerts.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn push(&self, alert: Alert) {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unread_counts_up_and_clears_only_explicitly() {
        let relay = NotificationRelay::new();
        relay.notify_message(Some("Dana"));
        relay.notify_message(None);
        assert_eq!(relay.unread(), 2);

        // Draining alerts is a display action; the counter stays put
        assert_eq!(relay.take_alerts().len(), 2);
        assert_eq!(relay.unread(), 2);

        relay.clear_unread();
        assert_eq!(relay.unread(), 0);
    }

    #[test]
    fn missing_sender_name_falls_back_to_generic() {
        let relay = NotificationRelay::new();
        relay.notify_message(None);
        relay.notify_message(Some("Dana"));

        let alerts = relay.take_alerts();
        assert_eq!(alerts[0].text, "New message from Someone");
        assert_eq!(alerts[1].text, "New message from Dana");
        assert!(alerts.iter().all(|a| a.kind == AlertKind::NewMessage));
    }

    #[test]
    fn take_alerts_drains_the_queue_in_order() {
        let relay = NotificationRelay::new();
        relay.notify_degraded();
        relay.notify_restored();
        relay.notify_error("room unavailable");

        let kinds: Vec<_> = relay.take_alerts().iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AlertKind::Degraded, AlertKind::Restored, AlertKind::ChannelError]
        );
        assert!(relay.take_alerts().is_empty());
    }
}
