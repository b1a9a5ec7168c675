pub mod builder;

pub use builder::{build_summary, rank_regimes, MarginSource, RegimeRank, TaxProfileInput, TaxSummary};
