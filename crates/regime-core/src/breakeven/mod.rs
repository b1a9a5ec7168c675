pub mod analyzer;

pub use analyzer::{
    analyze_break_even, estimate_margin, find, BreakEvenInput, BreakEvenRequest, BreakEvenResult,
    MarginSample,
};
