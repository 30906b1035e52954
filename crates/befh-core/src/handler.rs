use serde::{Deserialize, Serialize};

use crate::field::Fields;
use crate::queue::EventQueue;

/// Change event routed to a handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HandlerEvent {
    CreateTable {
        table_name: String,
        #[serde(default)]
        fields: Fields,
    },
    Insert {
        table_name: String,
        fields: Fields,
    },
}

impl HandlerEvent {
    pub fn table_name(&self) -> &str {
        match self {
            HandlerEvent::CreateTable { table_name, .. }
            | HandlerEvent::Insert { table_name, .. } => table_name,
        }
    }
}

/// Capability contract implemented by every event sink.
pub trait Handler {
    /// Error that aborts the handler loop.
    type Error;

    /// Binds the handler to the queue it will be fed from.
    fn load(&mut self, queue: &EventQueue);

    /// Prepares the sink for a newly detected table.
    fn create_table(&mut self, table_name: &str, fields: &Fields) -> Result<(), Self::Error>;

    /// Forwards one inserted row.
    fn insert(&mut self, table_name: &str, fields: &Fields) -> Result<(), Self::Error>;
}

/// Routes a single event to the matching handler operation.
pub fn dispatch<H: Handler + ?Sized>(
    handler: &mut H,
    event: &HandlerEvent,
) -> Result<(), H::Error> {
    match event {
        HandlerEvent::CreateTable { table_name, fields } => {
            handler.create_table(table_name, fields)
        }
        HandlerEvent::Insert { table_name, fields } => handler.insert(table_name, fields),
    }
}

/// Drains `queue` into `handler` in arrival order.
///
/// Returns the number of dispatched events once every sender is dropped, or
/// the first handler error.
pub fn run_handler<H: Handler + ?Sized>(
    handler: &mut H,
    queue: &EventQueue,
) -> Result<u64, H::Error> {
    let mut handled = 0_u64;
    while let Some(event) = queue.recv() {
        dispatch(handler, &event)?;
        handled = handled.saturating_add(1);
    }
    Ok(handled)
}
