//! Lucro Real approximated through an assumed profit margin.
//!
//! Accounting profit is not modelled: the income-tax base is
//! `revenue × margin`, reduced by carried-forward losses up to 30% of that
//! base. PIS and COFINS follow the non-cumulative system, net of creditable
//! inputs.

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
    round_money, with_metadata, ComputationOutput, FiscalPeriodInput, Money, PeriodResult, Rate,
    Regime, RegimeInput, RegimeResult, TaxBreakdown,
};
use crate::TaxResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One period under Lucro Real, with the loss and incentive bookkeeping
/// needed to chain periods together.
#[derive(Debug, Clone, PartialEq)]
pub struct RealPeriod {
    pub result: PeriodResult,
    /// Profit before the loss offset.
    pub profit_base: Money,
    pub losses_used: Money,
    pub incentive_applied: bool,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Loss offset for one period: never more than the statutory share of the
/// base, never more than the losses available.
pub fn loss_offset(profit_base: Money, losses_available: Money, cap: Rate) -> Money {
    if profit_base <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    losses_available.max(Decimal::ZERO).min(profit_base * cap)
}

/// Taxes for one period given the losses still available to offset.
pub fn compute_period(
    index: usize,
    period: &FiscalPeriodInput,
    margin: Rate,
    losses_available: Money,
    ruleset: &TaxRuleSet,
    region: &RegionTaxProfile,
    config: &TaxConfig,
) -> RealPeriod {
    let rates = &config.rates;

    let profit_base = period.revenue * margin;
    let losses_used = loss_offset(profit_base, losses_available, rates.loss_offset_cap);
    let taxable = profit_base - losses_used;

    let (mut irpj, irpj_surtax) = income_tax(taxable, period.months, rates);
    let incentive = match (period.regional_incentive, region.reduction_factor()) {
        (true, Some(factor)) => Some(factor),
        _ => None,
    };
    if let Some(factor) = incentive {
        irpj *= Decimal::ONE - factor;
    }
    let csll = social_contribution(taxable, rates);

    let credit_base = (turnover_base(period) - period.creditable_inputs).max(Decimal::ZERO);
    let pis = credit_base * rates.pis_non_cumulative;
    let cofins = credit_base * rates.cofins_non_cumulative;

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

    RealPeriod {
        result: PeriodResult::new(
            period.display_label(index),
            period.months,
            period.revenue,
            breakdown,
            &period.withheld,
        ),
        profit_base,
        losses_used,
        incentive_applied: incentive.is_some(),
    }
}

/// Lucro Real for a single period.
pub fn compute(
    period: &FiscalPeriodInput,
    margin: Rate,
    ruleset: &TaxRuleSet,
    region: &RegionTaxProfile,
    config: &TaxConfig,
) -> RegimeResult {
    compute_year(std::slice::from_ref(period), margin, ruleset, region, config)
}

/// Lucro Real across the fiscal year. Each period's carried losses join the
/// pool when the period starts; whatever the 30% cap leaves unused carries
/// into the next period.
pub fn compute_year(
    periods: &[FiscalPeriodInput],
    margin: Rate,
    ruleset: &TaxRuleSet,
    region: &RegionTaxProfile,
    config: &TaxConfig,
) -> RegimeResult {
    let mut pool = Decimal::ZERO;
    let mut used_total = Decimal::ZERO;
    let mut incentive_requested = false;
    let mut incentive_applied = false;
    let mut results = Vec::with_capacity(periods.len());

    for (i, period) in periods.iter().enumerate() {
        pool += period.carried_losses;
        let p = compute_period(i, period, margin, pool, ruleset, region, config);
        pool -= p.losses_used;
        used_total += p.losses_used;
        incentive_requested |= period.regional_incentive;
        incentive_applied |= p.incentive_applied;
        results.push(p.result);
    }

    let mut notes = vec![format!(
        "Profit approximated as {}% of revenue",
        (margin * Decimal::ONE_HUNDRED).round_dp(2).normalize()
    )];
    if used_total > Decimal::ZERO {
        notes.push(format!(
            "Carried-forward losses offset: {} (cap {}% of each period's profit); {} left to carry",
            round_money(used_total),
            (config.rates.loss_offset_cap * Decimal::ONE_HUNDRED).normalize(),
            round_money(pool)
        ));
    }
    if incentive_applied {
        if let Some(inc) = &region.incentive {
            notes.push(format!(
                "{} incentive: base IRPJ reduced by {}%; the surtax is not reduced",
                inc.program.label(),
                (inc.reduction_factor * Decimal::ONE_HUNDRED).normalize()
            ));
        }
    } else if incentive_requested {
        notes.push(format!(
            "Regional incentive requested but {} has no SUDENE/SUDAM program; no reduction applied",
            region.uf
        ));
    }

    let result = RegimeResult::from_periods(Regime::LucroReal, results, notes);
    debug!(total = %result.total, margin = %margin, "lucro real computed");
    result
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Resolve the activity and compute Lucro Real. Without an assumed margin
/// the activity's IRPJ presumption rate stands in for it.
pub fn calculate_real(
    input: &RegimeInput,
    config: &TaxConfig,
) -> TaxResult<ComputationOutput<RegimeResult>> {
    let start = Instant::now();
    let prepared = prepare(input, config)?;
    let mut warnings = prepared.warnings;

    let margin = match input.assumed_margin {
        Some(m) => m,
        None => {
            let m = prepared.ruleset.income_tax_presumption_rate;
            warnings.push(format!(
                "No assumed margin supplied; using the activity's presumption rate ({}%)",
                (m * Decimal::ONE_HUNDRED).normalize()
            ));
            m
        }
    };

    let result = compute_year(&input.periods, margin, &prepared.ruleset, &prepared.region, config);

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "assumed_margin": margin.to_string(),
        "loss_offset_cap": config.rates.loss_offset_cap.to_string(),
        "pis_cofins": "non-cumulative (1.65% + 7.6%) net of creditable inputs",
        "iss_rate": prepared.region.iss_rate.to_string(),
        "region": prepared.region.uf,
    });

    Ok(with_metadata(
        "Lucro Real (assumed margin, 30% loss offset cap, non-cumulative PIS/COFINS)",
        &assumptions,
        warnings,
        elapsed,
        result,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::activity::{RuleResolver, RuleTables};
    use crate::region::{builtin_profiles, find_profile};

    fn service_rules() -> TaxRuleSet {
        RuleResolver::new(RuleTables::default()).resolve("7112-0/00", None)
    }

    fn quarter(revenue: Money, payroll: Money) -> FiscalPeriodInput {
        FiscalPeriodInput::new(3, revenue, payroll)
    }

    fn pernambuco() -> RegionTaxProfile {
        find_profile(&builtin_profiles(), "PE").unwrap().clone()
    }

    #[test]
    fn test_quarter_at_twenty_percent_margin() {
        let r = compute(
            &quarter(dec!(300_000), dec!(30_000)),
            dec!(0.20),
            &service_rules(),
            &RegionTaxProfile::generic(),
            &TaxConfig::default(),
        );
        let b = &r.breakdown;
        assert_eq!(b.irpj, dec!(9_000));
        assert_eq!(b.irpj_surtax, dec!(0));
        assert_eq!(b.csll, dec!(5_400));
        assert_eq!(b.pis, dec!(4_950));
        assert_eq!(b.cofins, dec!(22_800));
        assert_eq!(b.payroll_charges, dec!(8_340));
        assert_eq!(b.iss, dec!(15_000));
        assert_eq!(r.total, dec!(65_490));
    }

    #[test]
    fn test_loss_offset_never_exceeds_cap() {
        assert_eq!(loss_offset(dec!(60_000), dec!(50_000), dec!(0.30)), dec!(18_000));
        assert_eq!(loss_offset(dec!(60_000), dec!(5_000), dec!(0.30)), dec!(5_000));
        assert_eq!(loss_offset(dec!(0), dec!(5_000), dec!(0.30)), dec!(0));
    }

    #[test]
    fn test_losses_reduce_income_taxes() {
        let mut p = quarter(dec!(300_000), dec!(0));
        p.carried_losses = dec!(50_000);
        let r = compute(
            &p,
            dec!(0.20),
            &service_rules(),
            &RegionTaxProfile::generic(),
            &TaxConfig::default(),
        );
        // base 60 000 - 18 000
        assert_eq!(r.breakdown.irpj, dec!(6_300));
        assert_eq!(r.breakdown.csll, dec!(3_780));
        assert!(r.notes.iter().any(|n| n.contains("left to carry")));
    }

    #[test]
    fn test_unused_losses_carry_into_next_period() {
        let mut first = quarter(dec!(300_000), dec!(0));
        first.carried_losses = dec!(30_000);
        let second = quarter(dec!(300_000), dec!(0));
        let r = compute_year(
            &[first, second],
            dec!(0.20),
            &service_rules(),
            &RegionTaxProfile::generic(),
            &TaxConfig::default(),
        );
        // 18 000 used in Q1, remaining 12 000 used in Q2
        assert_eq!(r.periods[0].breakdown.irpj, dec!(6_300));
        assert_eq!(r.periods[1].breakdown.irpj, dec!(7_200));
    }

    #[test]
    fn test_credits_floor_turnover_base_at_zero() {
        let mut p = quarter(dec!(100_000), dec!(0));
        p.creditable_inputs = dec!(250_000);
        let r = compute(
            &p,
            dec!(0.10),
            &service_rules(),
            &RegionTaxProfile::generic(),
            &TaxConfig::default(),
        );
        assert_eq!(r.breakdown.pis, dec!(0));
        assert_eq!(r.breakdown.cofins, dec!(0));
    }

    #[test]
    fn test_regional_incentive_reduces_base_irpj_only() {
        let mut p = quarter(dec!(300_000), dec!(0));
        p.regional_incentive = true;
        let r = compute(
            &p,
            dec!(0.40),
            &service_rules(),
            &pernambuco(),
            &TaxConfig::default(),
        );
        // base 120 000: IRPJ 18 000 reduced by 75%, surtax on 60 000 untouched
        assert_eq!(r.breakdown.irpj, dec!(4_500));
        assert_eq!(r.breakdown.irpj_surtax, dec!(6_000));
        assert!(r.notes.iter().any(|n| n.starts_with("SUDENE")));
    }

    #[test]
    fn test_incentive_flag_without_program_is_noted() {
        let mut p = quarter(dec!(300_000), dec!(0));
        p.regional_incentive = true;
        let r = compute(
            &p,
            dec!(0.40),
            &service_rules(),
            &RegionTaxProfile::generic(),
            &TaxConfig::default(),
        );
        assert_eq!(r.breakdown.irpj, dec!(18_000));
        assert!(r.notes.iter().any(|n| n.contains("no SUDENE/SUDAM program")));
    }

    #[test]
    fn test_calculate_real_defaults_margin_to_presumption() {
        let input = RegimeInput {
            activity_code: "7112-0/00".into(),
            category: None,
            region: None,
            periods: vec![quarter(dec!(300_000), dec!(0))],
            assumed_margin: None,
        };
        let out = calculate_real(&input, &TaxConfig::default()).unwrap();
        assert!(out.warnings.iter().any(|w| w.contains("32%")));
        // 32% of 300 000 = 96 000 base
        assert_eq!(out.result.breakdown.irpj, dec!(14_400));
    }

    #[test]
    fn test_calculate_real_rejects_margin_above_one() {
        let input = RegimeInput {
            activity_code: "7112-0/00".into(),
            category: None,
            region: None,
            periods: vec![quarter(dec!(300_000), dec!(0))],
            assumed_margin: Some(dec!(1.5)),
        };
        assert!(calculate_real(&input, &TaxConfig::default()).is_err());
    }
}
