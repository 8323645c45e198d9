//! Event sink for operator-visible notifications.
//!
//! Whenever a reconcile invocation ends with a recorded error, the
//! controller mirrors the error's reason and message as a warning event so
//! operators watching events see the same information as those polling
//! object status.

use cascade_api::ObjectRef;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: &'static str,
    pub object: ObjectRef,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

pub trait EventRecorder: Send + Sync {
    fn event(
        &self,
        kind: &'static str,
        object: &ObjectRef,
        event_type: EventType,
        reason: &str,
        message: &str,
    );
}

/// Recorder that forwards events to the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogRecorder;

impl EventRecorder for LogRecorder {
    fn event(
        &self,
        kind: &'static str,
        object: &ObjectRef,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) {
        match event_type {
            EventType::Warning => {
                tracing::warn!(kind, object = %object, reason, "{message}");
            }
            EventType::Normal => {
                tracing::info!(kind, object = %object, reason, "{message}");
            }
        }
    }
}

/// Recorder that keeps events in memory, for tests.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<Event>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("recorder poisoned").clone()
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().expect("recorder poisoned"))
    }
}

impl EventRecorder for MemoryRecorder {
    fn event(
        &self,
        kind: &'static str,
        object: &ObjectRef,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) {
        self.events.lock().expect("recorder poisoned").push(Event {
            kind,
            object: object.clone(),
            event_type,
            reason: reason.to_owned(),
            message: message.to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_recorder_collects_events() {
        let recorder = MemoryRecorder::new();
        let obj = ObjectRef::new("test1", "root");
        recorder.event("executions", &obj, EventType::Warning, "ReconcileFailed", "boom");

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Warning);
        assert_eq!(events[0].reason, "ReconcileFailed");
        assert_eq!(events[0].object, obj);
    }

    #[test]
    fn take_drains_events() {
        let recorder = MemoryRecorder::new();
        let obj = ObjectRef::new("test1", "root");
        recorder.event("executions", &obj, EventType::Normal, "Reconciled", "done");
        assert_eq!(recorder.take().len(), 1);
        assert!(recorder.events().is_empty());
    }
}
