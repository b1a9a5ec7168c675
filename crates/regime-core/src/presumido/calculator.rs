//! Lucro Presumido: IRPJ and CSLL on a statutory share of revenue, PIS and
//! COFINS under the cumulative system.

use std::time::Instant;

use rust_decimal::Decimal;
use tracing::debug;

use crate::activity::TaxRuleSet;
use crate::config::TaxConfig;
use crate::context::prepare;
use crate::levies::{
    income_tax, payroll_charges, service_revenue, service_tax, social_contribution, turnover_base,
};
use crate::region::RegionTaxProfile;
use crate::types::{
    annualized, with_metadata, ComputationOutput, FiscalPeriodInput, PeriodResult, Regime,
    RegimeInput, RegimeResult, TaxBreakdown,
};
use crate::TaxResult;

/// Taxes for one period under Lucro Presumido.
pub fn compute_period(
    index: usize,
    period: &FiscalPeriodInput,
    ruleset: &TaxRuleSet,
    region: &RegionTaxProfile,
    config: &TaxConfig,
) -> PeriodResult {
    let rates = &config.rates;

    let income_base = period.revenue * ruleset.income_tax_presumption_rate;
    let (irpj, irpj_surtax) = income_tax(income_base, period.months, rates);

    let social_base = period.revenue * ruleset.social_contribution_presumption_rate;
    let csll = social_contribution(social_base, rates);

    let base = turnover_base(period);
    let pis = base * rates.pis_cumulative;
    let cofins = base * rates.cofins_cumulative;

    let breakdown = TaxBreakdown {
        irpj,
        irpj_surtax,
        csll,
        pis,
        cofins,
        payroll_charges: payroll_charges(period.payroll, &rates.payroll),
        iss: service_tax(service_revenue(period, ruleset), region.iss_rate),
        das: Decimal::ZERO,
    };

    PeriodResult::new(
        period.display_label(index),
        period.months,
        period.revenue,
        breakdown,
        &period.withheld,
    )
}

/// Lucro Presumido for a single period.
pub fn compute(
    period: &FiscalPeriodInput,
    ruleset: &TaxRuleSet,
    region: &RegionTaxProfile,
    config: &TaxConfig,
) -> RegimeResult {
    compute_year(std::slice::from_ref(period), ruleset, region, config)
}

/// Lucro Presumido across the fiscal year, per-kind totals summed over
/// the periods.
pub fn compute_year(
    periods: &[FiscalPeriodInput],
    ruleset: &TaxRuleSet,
    region: &RegionTaxProfile,
    config: &TaxConfig,
) -> RegimeResult {
    let annual_revenue = annualized(periods, |p| p.revenue);
    if annual_revenue > config.rates.presumed_revenue_limit {
        return RegimeResult::ineligible(
            Regime::LucroPresumido,
            format!(
                "Annual revenue {} exceeds the Lucro Presumido limit of {}",
                annual_revenue.round_dp(2),
                config.rates.presumed_revenue_limit
            ),
        );
    }

    let results: Vec<PeriodResult> = periods
        .iter()
        .enumerate()
        .map(|(i, p)| compute_period(i, p, ruleset, region, config))
        .collect();

    let mut notes = Vec::new();
    let excluded: Decimal = periods.iter().map(|p| p.turnover_exclusions()).sum();
    if excluded > Decimal::ZERO {
        notes.push(format!(
            "{} of export, exempt, substituted or free-trade-zone revenue excluded from the PIS/COFINS base",
            excluded.round_dp(2)
        ));
    }
    notes.push(format!(
        "Presumption rates: IRPJ {}%, CSLL {}%",
        (ruleset.income_tax_presumption_rate * Decimal::ONE_HUNDRED).normalize(),
        (ruleset.social_contribution_presumption_rate * Decimal::ONE_HUNDRED).normalize()
    ));

    let result = RegimeResult::from_periods(Regime::LucroPresumido, results, notes);
    debug!(total = %result.total, "lucro presumido computed");
    result
}

/// Resolve the activity and compute Lucro Presumido for the given periods.
pub fn calculate_presumido(
    input: &RegimeInput,
    config: &TaxConfig,
) -> TaxResult<ComputationOutput<RegimeResult>> {
    let start = Instant::now();
    let prepared = prepare(input, config)?;

    let result = compute_year(&input.periods, &prepared.ruleset, &prepared.region, config);

    let mut warnings = prepared.warnings;
    if let Some(reason) = &result.ineligible_reason {
        warnings.push(reason.clone());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "irpj_presumption": prepared.ruleset.income_tax_presumption_rate.to_string(),
        "csll_presumption": prepared.ruleset.social_contribution_presumption_rate.to_string(),
        "surtax_threshold_per_month": config.rates.surtax_monthly_threshold.to_string(),
        "pis_cofins": "cumulative (0.65% + 3%)",
        "iss_rate": prepared.region.iss_rate.to_string(),
        "region": prepared.region.uf,
    });

    Ok(with_metadata(
        "Lucro Presumido (Lei 9.249/95 art. 15 and 20; cumulative PIS/COFINS)",
        &assumptions,
        warnings,
        elapsed,
        result,
    ))
}
