//! Core traits and types shared by the CPU and machine crates.
//!
//! The CPU sees the outside world only through [`Bus`]. Memory, ports and
//! contention all hang off that one trait; machines decide how to route them.

mod bus;
mod clock;
mod observable;

pub use bus::{Bus, BusError, SimpleBus};
pub use clock::MasterClock;
pub use observable::{Observable, Value};
