pub mod calculator;

pub use calculator::{calculate_simples, effective_rate, SimplesRate};
