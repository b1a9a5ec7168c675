pub mod code;
pub mod resolver;
pub mod rules;

pub use code::{ActivityCode, Category};
pub use resolver::{classify_activity, Classification, ClassifyInput, RuleResolver};
pub use rules::{ActivityRule, PrefixRule, RuleTables, SourceTier, TaxRuleSet};
