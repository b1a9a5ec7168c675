pub mod brackets;
pub mod break_even;
pub mod classify;
pub mod regimes;
pub mod summary;
