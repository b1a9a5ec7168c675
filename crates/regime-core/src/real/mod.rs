pub mod calculator;

pub use calculator::{calculate_real, compute_year, loss_offset, RealPeriod};
