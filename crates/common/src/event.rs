use std::sync::mpsc::Sender;

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Completion events the core publishes to an externally-owned channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// The set or content of snapshots on disk changed; UI layers should refresh.
    SnapshotsChanged,
    /// Fire-and-forget user-facing message.
    Notification { level: NotifyLevel, message: String },
}

impl CoreEvent {
    pub fn notify(level: NotifyLevel, message: impl Into<String>) -> Self {
        Self::Notification {
            level,
            message: message.into(),
        }
    }
}

/// Where the core sends completion events. Publishing never fails from the
/// caller's point of view; a closed channel simply drops the event.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: CoreEvent);
}

impl EventSink for Sender<CoreEvent> {
    fn publish(&self, event: CoreEvent) {
        if self.send(event).is_err() {
            tracing::debug!("event receiver dropped; event discarded");
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: CoreEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn channel_sink_delivers_in_order() {
        let (tx, rx) = mpsc::channel();
        tx.publish(CoreEvent::SnapshotsChanged);
        tx.publish(CoreEvent::notify(NotifyLevel::Success, "done"));
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], CoreEvent::SnapshotsChanged);
    }

    #[test]
    fn closed_channel_does_not_panic() {
        let (tx, rx) = mpsc::channel::<CoreEvent>();
        drop(rx);
        tx.publish(CoreEvent::SnapshotsChanged);
    }
}
