//! Domain events shared contract.

pub mod event;

pub use event::Event;
