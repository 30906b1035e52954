use std::sync::mpsc;

use thiserror::Error;

use crate::handler::HandlerEvent;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("event queue is closed")]
    Closed,
}

/// Creates a bounded event queue. A zero capacity is raised to one.
pub fn event_queue(capacity: usize) -> (EventSender, EventQueue) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::sync_channel::<HandlerEvent>(capacity);
    (EventSender { tx }, EventQueue { rx, capacity })
}

/// Producer side of an event queue, cloned by every change detector.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::SyncSender<HandlerEvent>,
}

impl EventSender {
    /// Enqueues an event, blocking while the queue is full.
    pub fn send(&self, event: HandlerEvent) -> Result<(), QueueError> {
        self.tx.send(event).map_err(|_| QueueError::Closed)
    }
}

/// Consumer side of an event queue, owned by the handler loop.
#[derive(Debug)]
pub struct EventQueue {
    rx: mpsc::Receiver<HandlerEvent>,
    capacity: usize,
}

impl EventQueue {
    /// Blocks for the next event; `None` once every sender is gone.
    pub fn recv(&self) -> Option<HandlerEvent> {
        self.rx.recv().ok()
    }

    pub fn try_recv(&self) -> Option<HandlerEvent> {
        self.rx.try_recv().ok()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::{event_queue, QueueError};
    use crate::field::Fields;
    use crate::handler::HandlerEvent;

    fn create(table: &str) -> HandlerEvent {
        HandlerEvent::CreateTable {
            table_name: table.to_string(),
            fields: Fields::new(),
        }
    }

    #[test]
    fn queue_preserves_order_and_ends_when_senders_drop() {
        let (tx, queue) = event_queue(4);
        tx.send(create("a")).expect("send a");
        tx.send(create("b")).expect("send b");
        drop(tx);

        assert_eq!(queue.recv().map(|e| e.table_name().to_string()), Some("a".into()));
        assert_eq!(queue.recv().map(|e| e.table_name().to_string()), Some("b".into()));
        assert!(queue.recv().is_none());
    }

    #[test]
    fn send_fails_after_queue_is_dropped() {
        let (tx, queue) = event_queue(0);
        assert_eq!(queue.capacity(), 1);
        drop(queue);
        assert_eq!(tx.send(create("a")), Err(QueueError::Closed));
    }
}
