//! Request preparation shared by the public entry points.

use crate::activity::{RuleResolver, TaxRuleSet};
use crate::config::TaxConfig;
use crate::region::{resolve_region, RegionTaxProfile};
use crate::types::RegimeInput;
use crate::TaxResult;

/// Ruleset and region resolved for one request, plus the disclaimers they
/// produced.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub ruleset: TaxRuleSet,
    pub region: RegionTaxProfile,
    pub warnings: Vec<String>,
}

pub fn prepare(input: &RegimeInput, config: &TaxConfig) -> TaxResult<Prepared> {
    input.validate()?;
    let resolver = RuleResolver::new(config.rules.clone());
    Ok(prepare_with(&resolver, &input.activity_code, input.category, input.region.as_deref(), config))
}

pub fn prepare_with(
    resolver: &RuleResolver,
    activity_code: &str,
    category: Option<crate::activity::Category>,
    region: Option<&str>,
    config: &TaxConfig,
) -> Prepared {
    let ruleset = resolver.resolve(activity_code, category);
    let (region, region_warning) = resolve_region(&config.regions, region);

    let mut warnings = Vec::new();
    if ruleset.source_tier.is_fallback() {
        if let Some(note) = &ruleset.note {
            warnings.push(note.clone());
        }
    }
    if let Some(w) = region_warning {
        warnings.push(w);
    }
    Prepared {
        ruleset,
        region,
        warnings,
    }
}
