// Context Engine — stateful layers composed by the manager.
// Everything with behaviour lives here; atoms/ only holds the data it moves.

pub mod cache;
pub mod emotion;
pub mod events;
pub mod flow;
pub mod manager;
pub mod memory;
pub mod monitor;
pub mod telemetry;
pub mod validation;
