//! L0 of the fabric: reliable, ordered, length-prefixed message carriers.

pub mod frame;
pub mod listener;

pub use frame::{CarrierEvent, CarrierHandle, CarrierInbox, CloseReason, spawn_carrier};
pub use listener::CarrierListener;
