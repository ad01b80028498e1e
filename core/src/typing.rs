/// Typing indicator signaling
///
/// Outbound: every keystroke emits a typing-start (redundant emits are
/// fine, and no-ops while disconnected) and re-arms the inactivity timer;
/// the timer owns the stop emission. Inbound: a single "someone is
/// typing" slot for the active conversation.
use crate::connection::EventSink;
use crate::events::ClientEvent;
use crate::model::TypingState;
use crate::stream::ActiveConversation;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

struct Inner {
    timer: Option<JoinHandle<()>>,
    /// Conversation the pending stop emission belongs to; `None` means no
    /// stop is owed, which is what makes the stop exactly-once
    armed_for: Option<String>,
    display: TypingState,
}

pub struct TypingCoordinator {
    sink: Arc<dyn EventSink>,
    current_user: String,
    timeout: Duration,
    active: ActiveConversation,
    inner: Arc<Mutex<Inner>>,
}

impl TypingCoordinator {
    pub fn new(
        sink: Arc<dyn EventSink>,
        current_user: &str,
        timeout: Duration,
        active: ActiveConversation,
    ) -> Self {
        Self {
            sink,
            current_user: current_user.to_string(),
            timeout,
            active,
            inner: Arc::new(Mutex::new(Inner {
                timer: None,
                armed_for: None,
                display: TypingState::default(),
            })),
        }
    }

    /// Local keystroke in the compose field: signal typing-start and
    /// (re)arm the inactivity timer
    pub fn keystroke(&self) {
        let conversation_id = match self.active.get() {
            Some(id) => id,
            None => return,
        };

        self.sink.emit(ClientEvent::TypingStart {
            conversation_id: conversation_id.clone(),
        });

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.armed_for = Some(conversation_id.clone());

        let sink = self.sink.clone();
        let shared = self.inner.clone();
        let timeout = self.timeout;
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let owed = {
                let mut inner = shared.lock().unwrap_or_else(|e| e.into_inner());
                inner.timer = None;
                inner.armed_for.take()
            };
            if let Some(conversation_id) = owed {
                sink.emit(ClientEvent::TypingStop { conversation_id });
            }
        }));
    }

    /// Cancel the pending timer and emit the owed typing-stop immediately.
    /// Used on manual send, conversation switch and teardown; a no-op when
    /// no stop is owed, so the stop never double-fires.
    pub fn stop_now(&self) {
        let owed = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(timer) = inner.timer.take() {
                timer.abort();
            }
            inner.armed_for.take()
        };
        if let Some(conversation_id) = owed {
            self.sink.emit(ClientEvent::TypingStop { conversation_id });
        }
    }

    /// Inbound typing-start; only the other party in the active
    /// conversation may occupy the slot
    pub fn apply_start(&self, conversation_id: &str, user_id: &str, user_name: Option<&str>) {
        if user_id == self.current_user || !self.active.is(conversation_id) {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.display = TypingState {
            is_typing: true,
            typing_user_name: Some(
                user_name
                    .map(str::to_string)
                    .unwrap_or_else(|| user_id.to_string()),
            ),
        };
    }

    /// Inbound typing-stop clears the slot
    pub fn apply_stop(&self, conversation_id: &str, user_id: &str) {
        if user_id == self.current_user || !self.active.is(conversation_id) {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.display = TypingState::default();
    }

    /// Settle outbound state and clear the displayed indicator; called
    /// when the active conversation changes
    pub fn reset(&self) {
        self.stop_now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.display = TypingState::default();
    }

    pub fn state(&self) -> TypingState {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .display
            .clone()
    }
}
