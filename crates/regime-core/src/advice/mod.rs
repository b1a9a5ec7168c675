pub mod aggregator;
pub mod capabilities;
pub mod opportunities;

pub use aggregator::{build, normalize_title, AdviceReport, OpportunityLevel};
pub use capabilities::{AdvisorModule, Availability, Capabilities, ModuleStatus};
pub use opportunities::{
    AdviceCategory, AdviceItem, CompensationContext, EquityPosition, ImpactKind,
    OwnerCompensation,
};
