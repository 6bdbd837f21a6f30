//! Process-wide event bus.
//!
//! Every event is written to `tracing`, kept in a bounded history for
//! `RecentEvents`, and broadcast to live subscribers (the D-Bus `Event`
//! signal).

use chrono::{DateTime, Local};
use hwsense_hw::{trace_event, Event, EventSink};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// An event with the time it was emitted.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub at: DateTime<Local>,
    pub event: Event,
}

/// Fans events out to tracing, history and subscribers.
pub struct EventBus {
    tx: broadcast::Sender<RecordedEvent>,
    history: Mutex<VecDeque<RecordedEvent>>,
    capacity: usize,
}

impl EventBus {
    /// Creates a bus keeping up to `history` recent events.
    pub fn new(history: usize) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history)),
            capacity: history,
        }
    }

    /// Subscribes to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RecordedEvent> {
        self.tx.subscribe()
    }

    /// Returns up to `count` most recent events, oldest first.
    pub fn recent(&self, count: usize) -> Vec<RecordedEvent> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let skip = history.len().saturating_sub(count);
        history.iter().skip(skip).cloned().collect()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: Event) {
        trace_event(&event);

        let recorded = RecordedEvent {
            at: Local::now(),
            event,
        };

        if self.capacity > 0 {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() == self.capacity {
                history.pop_front();
            }
            history.push_back(recorded.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(recorded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwsense_hw::EventLevel;

    #[test]
    fn test_history_is_bounded() {
        let bus = EventBus::new(3);
        for i in 0..5 {
            bus.emit(Event::info(format!("event {}", i)));
        }

        let recent: Vec<_> = bus.recent(10).into_iter().map(|r| r.event.message).collect();
        assert_eq!(recent, vec!["event 2", "event 3", "event 4"]);

        let last: Vec<_> = bus.recent(1).into_iter().map(|r| r.event.message).collect();
        assert_eq!(last, vec!["event 4"]);
    }

    #[test]
    fn test_zero_history() {
        let bus = EventBus::new(0);
        bus.emit(Event::warning("dropped"));
        assert!(bus.recent(5).is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(Event::fatal("halted").with_device("GPU"));

        let event = rx.recv().await.unwrap().event;
        assert_eq!(event.level, EventLevel::Fatal);
        assert_eq!(event.device.as_deref(), Some("GPU"));
    }
}
