// Status model for the farm engine
//
// Two independent machines: the federation service run state (per node and
// aggregate) and the configuration lifecycle. Neither shares a table with the
// other; they only meet in the observer stream.

pub mod events;
pub mod states;

pub use events::{StatusEvent, TransitionSource};
pub use states::{ConfigStatus, ServiceStatus};
