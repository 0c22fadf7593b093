//! The protocol engine: MAC scheduler, per-user RRC state machines and the
//! station dispatch loop that ties them to the outside layers.

pub mod dispatch;
pub mod mac;
pub mod rrc;

pub use dispatch::Stack;
