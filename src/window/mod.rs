//! Sliding monitoring window over the candidate room list

mod range;
mod scheduler;

pub use range::{compute_range, next_start, prev_start};
pub use scheduler::{RotationDirection, RotationReport, WindowScheduler, WindowStatus};
