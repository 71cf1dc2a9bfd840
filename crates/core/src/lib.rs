#![forbid(unsafe_code)]

pub mod gate;
pub mod model;
pub mod quiz;
mod reset;
pub mod reveal;
pub mod time;

pub use gate::{BlockBehavior, BlockRegistry, GateRejection, ResetScope};
pub use time::Clock;
