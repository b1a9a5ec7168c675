pub mod calculator;

pub use calculator::{calculate_presumido, compute_year};
