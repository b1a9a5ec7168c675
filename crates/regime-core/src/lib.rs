pub mod activity;
pub mod config;
pub mod context;
pub mod error;
pub mod levies;
pub mod region;
pub mod schedule;
pub mod types;

#[cfg(feature = "simples")]
pub mod simples;

#[cfg(feature = "presumido")]
pub mod presumido;

#[cfg(feature = "real")]
pub mod real;

#[cfg(feature = "breakeven")]
pub mod breakeven;

#[cfg(feature = "advice")]
pub mod advice;

#[cfg(feature = "summary")]
pub mod summary;

pub use config::TaxConfig;
pub use error::TaxError;
pub use types::*;

/// Standard result type for all regime computations
pub type TaxResult<T> = Result<T, TaxError>;
