//! Core handler contracts shared by every befh event sink.
//!
//! Includes the field/value wrappers produced by change detection, the
//! `Handler` capability trait and the queue that feeds handlers with events.

pub mod field;
pub mod handler;
pub mod queue;

pub use field::{Field, FieldValue, Fields, TIMESTAMP_FORMAT};
pub use handler::{dispatch, run_handler, Handler, HandlerEvent};
pub use queue::{event_queue, EventQueue, EventSender, QueueError};
