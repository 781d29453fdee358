//! Engine: the lister handle and the supervisor that schedules it.

pub mod control;
pub mod lister;

pub use control::{Supervisor, SupervisorConfig};
pub use lister::{DrainReport, Lister};
