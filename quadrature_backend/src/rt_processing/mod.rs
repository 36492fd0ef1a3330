pub mod deadline;
pub mod handler_slot;

pub use deadline::{DeadlineMonitor, DeadlineSnapshot, FillGuard};
pub use handler_slot::HandlerSlot;
