//! Simples Nacional: effective rate from the progressive schedules, Factor R
//! switching and the unified monthly payment (DAS).

use std::time::Instant;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::activity::TaxRuleSet;
use crate::config::TaxConfig;
use crate::context::prepare;
use crate::schedule::Schedule;
use crate::types::{
    annualized, with_metadata, ComputationOutput, FiscalPeriodInput, Money,
    PeriodResult, Rate, Regime, RegimeInput, RegimeResult, TaxBreakdown,
};
use crate::TaxResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Outcome of one effective-rate lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplesRate {
    pub requested_schedule: Schedule,
    pub applied_schedule: Schedule,
    pub trailing_revenue: Money,
    /// Payroll / revenue ratio, present only for Factor R activities.
    pub factor_r: Option<Rate>,
    /// 1-based bracket number.
    pub bracket: Option<usize>,
    pub nominal_rate: Rate,
    pub deduction: Money,
    pub rate: Rate,
    pub ineligible: bool,
    pub ineligible_reason: Option<String>,
    pub above_sublimit: bool,
}

impl SimplesRate {
    fn zero(schedule: Schedule, trailing_revenue: Money) -> Self {
        SimplesRate {
            requested_schedule: schedule,
            applied_schedule: schedule,
            trailing_revenue,
            factor_r: None,
            bracket: None,
            nominal_rate: Decimal::ZERO,
            deduction: Decimal::ZERO,
            rate: Decimal::ZERO,
            ineligible: false,
            ineligible_reason: None,
            above_sublimit: false,
        }
    }

    fn ineligible(mut self, reason: String) -> Self {
        self.ineligible = true;
        self.ineligible_reason = Some(reason);
        self
    }

    pub fn switched_by_factor_r(&self) -> bool {
        self.applied_schedule != self.requested_schedule
    }
}

// ---------------------------------------------------------------------------
// Effective rate
// ---------------------------------------------------------------------------

/// Effective Simples Nacional rate for a trailing-twelve-month revenue.
///
/// Revenue above the last ceiling is reported as ineligible, never clamped
/// to the top bracket. Non-positive revenue yields a zero rate.
pub fn effective_rate(
    schedule: Schedule,
    factor_r_sensitive: bool,
    trailing_revenue: Money,
    trailing_payroll: Option<Money>,
    config: &TaxConfig,
) -> SimplesRate {
    let base = SimplesRate::zero(schedule, trailing_revenue);

    if schedule == Schedule::Forbidden {
        return base.ineligible("Activity is barred from Simples Nacional".into());
    }
    if trailing_revenue <= Decimal::ZERO {
        return base;
    }

    let mut out = base;
    if factor_r_sensitive {
        let ratio = trailing_payroll.unwrap_or(Decimal::ZERO).max(Decimal::ZERO) / trailing_revenue;
        out.factor_r = Some(ratio);
        if ratio >= config.simples.factor_r_threshold {
            out.applied_schedule = schedule.factor_r_alternate();
        }
    }

    let Some(table) = config.schedules.get(out.applied_schedule) else {
        let reason = format!("No bracket table configured for {}", out.applied_schedule);
        return out.ineligible(reason);
    };

    match table.find(trailing_revenue) {
        Some((index, bracket)) => {
            out.bracket = Some(index + 1);
            out.nominal_rate = bracket.nominal_rate;
            out.deduction = bracket.deduction;
            out.rate = bracket.effective_rate_at(trailing_revenue);
            out.above_sublimit = trailing_revenue > config.simples.sublimit;
            out
        }
        None => {
            let reason = format!(
                "Trailing revenue {} exceeds the Simples Nacional ceiling of {}",
                trailing_revenue.round_dp(2),
                table.ceiling()
            );
            out.ineligible(reason)
        }
    }
}

/// DAS due for one month (or period) of revenue at the given rate.
pub fn monthly_due(period_revenue: Money, rate: &SimplesRate) -> Money {
    if rate.ineligible {
        return Decimal::ZERO;
    }
    period_revenue.max(Decimal::ZERO) * rate.rate
}

// ---------------------------------------------------------------------------
// Period and year computation
// ---------------------------------------------------------------------------

fn period_result(
    index: usize,
    period: &FiscalPeriodInput,
    rate: &SimplesRate,
    config: &TaxConfig,
) -> PeriodResult {
    let das = monthly_due(period.revenue, rate);
    // Anexo IV pays the employer contribution (CPP) outside the DAS.
    let payroll_charges = if rate.applied_schedule == Schedule::AnnexIV {
        period.payroll * (config.rates.payroll.employer + config.rates.payroll.risk)
    } else {
        Decimal::ZERO
    };
    PeriodResult::new(
        period.display_label(index),
        period.months,
        period.revenue,
        TaxBreakdown {
            das,
            payroll_charges,
            ..Default::default()
        },
        &period.withheld,
    )
}

fn push_unique(notes: &mut Vec<String>, note: String) {
    if !notes.contains(&note) {
        notes.push(note);
    }
}

/// Simples Nacional for a single period. Trailing figures default to the
/// period annualized.
pub fn compute(period: &FiscalPeriodInput, ruleset: &TaxRuleSet, config: &TaxConfig) -> RegimeResult {
    compute_year(std::slice::from_ref(period), ruleset, config)
}

/// Simples Nacional across the fiscal year. A period without its own
/// trailing figures uses the year's annualized revenue and payroll.
pub fn compute_year(
    periods: &[FiscalPeriodInput],
    ruleset: &TaxRuleSet,
    config: &TaxConfig,
) -> RegimeResult {
    let annual_revenue = annualized(periods, |p| p.revenue);
    let annual_payroll = annualized(periods, |p| p.payroll);

    let mut results = Vec::with_capacity(periods.len());
    let mut notes: Vec<String> = Vec::new();

    for (i, period) in periods.iter().enumerate() {
        let trailing_revenue = period.trailing_12_revenue.unwrap_or(annual_revenue);
        let trailing_payroll = period.trailing_12_payroll.or(Some(annual_payroll));
        let rate = effective_rate(
            ruleset.schedule,
            ruleset.factor_r_sensitive,
            trailing_revenue,
            trailing_payroll,
            config,
        );

        if rate.ineligible {
            let reason = ruleset
                .forbidden_reason
                .clone()
                .or(rate.ineligible_reason.clone())
                .unwrap_or_else(|| "Not eligible for Simples Nacional".into());
            debug!(period = i, %reason, "simples nacional ineligible");
            return RegimeResult::ineligible(Regime::SimplesNacional, reason);
        }
        if rate.switched_by_factor_r() {
            push_unique(
                &mut notes,
                format!(
                    "Factor R of {:.2}% meets the {}% threshold: taxed under {} instead of {}",
                    rate.factor_r.unwrap_or_default() * Decimal::ONE_HUNDRED,
                    (config.simples.factor_r_threshold * Decimal::ONE_HUNDRED).normalize(),
                    rate.applied_schedule,
                    rate.requested_schedule
                ),
            );
        } else if ruleset.factor_r_sensitive {
            push_unique(
                &mut notes,
                format!(
                    "Factor R below {}%: taxed under {}",
                    (config.simples.factor_r_threshold * Decimal::ONE_HUNDRED).normalize(),
                    rate.applied_schedule
                ),
            );
        }
        if rate.above_sublimit {
            push_unique(
                &mut notes,
                format!(
                    "Trailing revenue above the {} sublimit: ICMS/ISS are due outside the DAS and are not included",
                    config.simples.sublimit
                ),
            );
        }
        if rate.applied_schedule == Schedule::AnnexIV {
            push_unique(
                &mut notes,
                "Anexo IV: employer payroll contribution (CPP) is paid outside the DAS".into(),
            );
        }
        results.push(period_result(i, period, &rate, config));
    }

    let result = RegimeResult::from_periods(Regime::SimplesNacional, results, notes);
    debug!(total = %result.total, "simples nacional computed");
    result
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Resolve the activity and compute Simples Nacional for the given periods.
pub fn calculate_simples(
    input: &RegimeInput,
    config: &TaxConfig,
) -> TaxResult<ComputationOutput<RegimeResult>> {
    let start = Instant::now();
    let prepared = prepare(input, config)?;

    let result = compute_year(&input.periods, &prepared.ruleset, config);

    let mut warnings = prepared.warnings;
    if let Some(reason) = &result.ineligible_reason {
        warnings.push(reason.clone());
    }
    warnings.extend(result.notes.iter().cloned());

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "schedule": prepared.ruleset.schedule,
        "factor_r_sensitive": prepared.ruleset.factor_r_sensitive,
        "factor_r_threshold": config.simples.factor_r_threshold.to_string(),
        "sublimit": config.simples.sublimit.to_string(),
        "trailing_revenue": "per-period RBT12 when supplied, otherwise annualized revenue",
    });

    Ok(with_metadata(
        "Simples Nacional (LC 123/2006, Anexos I–V, effective rate = (RBT12 × aliquota − parcela a deduzir) / RBT12)",
        &assumptions,
        warnings,
        elapsed,
        result,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::activity::{RuleResolver, RuleTables};

    fn config() -> TaxConfig {
        TaxConfig::default()
    }

    fn ruleset(code: &str) -> TaxRuleSet {
        RuleResolver::new(RuleTables::default()).resolve(code, None)
    }

    #[test]
    fn test_first_bracket_is_nominal_rate() {
        let r = effective_rate(Schedule::AnnexI, false, dec!(120_000), None, &config());
        assert_eq!(r.rate, dec!(0.04));
        assert_eq!(r.bracket, Some(1));
        assert!(!r.ineligible);
    }

    #[test]
    fn test_second_bracket_uses_deduction() {
        // (300 000 × 7.3% − 5 940) / 300 000 = 5.32%
        let r = effective_rate(Schedule::AnnexI, false, dec!(300_000), None, &config());
        assert_eq!(r.rate, dec!(0.0532));
        assert_eq!(r.bracket, Some(2));
    }

    #[test]
    fn test_above_ceiling_is_ineligible_not_clamped() {
        let r = effective_rate(Schedule::AnnexIII, false, dec!(5_000_000), None, &config());
        assert!(r.ineligible);
        assert_eq!(r.rate, dec!(0));
        assert!(r.ineligible_reason.unwrap().contains("ceiling"));
    }

    #[test]
    fn test_zero_revenue_is_neutral() {
        let r = effective_rate(Schedule::AnnexV, true, dec!(0), Some(dec!(10_000)), &config());
        assert_eq!(r.rate, dec!(0));
        assert!(!r.ineligible);
        assert!(r.factor_r.is_none());
    }

    #[test]
    fn test_forbidden_schedule_is_ineligible() {
        let r = effective_rate(Schedule::Forbidden, false, dec!(100_000), None, &config());
        assert!(r.ineligible);
    }

    #[test]
    fn test_factor_r_at_threshold_moves_to_annex_iii() {
        let r = effective_rate(
            Schedule::AnnexV,
            true,
            dec!(1_000_000),
            Some(dec!(280_000)),
            &config(),
        );
        assert_eq!(r.applied_schedule, Schedule::AnnexIII);
        assert_eq!(r.factor_r, Some(dec!(0.28)));
        assert!(r.switched_by_factor_r());
    }

    #[test]
    fn test_factor_r_below_threshold_keeps_annex_v() {
        let r = effective_rate(
            Schedule::AnnexV,
            true,
            dec!(1_000_000),
            Some(dec!(279_999)),
            &config(),
        );
        assert_eq!(r.applied_schedule, Schedule::AnnexV);
        // (1 000 000 × 20.5% − 17 100) / 1 000 000
        assert_eq!(r.rate, dec!(0.1879));
    }

    #[test]
    fn test_missing_payroll_keeps_original_schedule() {
        let r = effective_rate(Schedule::AnnexV, true, dec!(500_000), None, &config());
        assert_eq!(r.applied_schedule, Schedule::AnnexV);
        assert_eq!(r.factor_r, Some(dec!(0)));
    }

    #[test]
    fn test_sublimit_flag() {
        let r = effective_rate(Schedule::AnnexI, false, dec!(4_000_000), None, &config());
        assert!(r.above_sublimit);
        assert!(!r.ineligible);
    }

    #[test]
    fn test_compute_year_quarterly_commerce() {
        // Supermarket, 4 quarters of 150 000 => RBT12 600 000 (bracket 3)
        // rate = (600 000 × 9.5% − 13 860) / 600 000 = 7.19%
        let periods = vec![FiscalPeriodInput::new(3, dec!(150_000), dec!(20_000)); 4];
        let r = compute_year(&periods, &ruleset("4711-3/02"), &config());
        assert!(!r.ineligible);
        assert_eq!(r.breakdown.das, dec!(43_140));
        assert_eq!(r.total, dec!(43_140));
        assert_eq!(r.periods.len(), 4);
        assert_eq!(r.effective_rate, dec!(0.0719));
    }

    #[test]
    fn test_annex_iv_adds_cpp_outside_das() {
        let periods = vec![FiscalPeriodInput::new(12, dec!(500_000), dec!(100_000))];
        let r = compute_year(&periods, &ruleset("6911-7/01"), &config());
        assert_eq!(r.breakdown.payroll_charges, dec!(22_000));
        assert!(r.notes.iter().any(|n| n.contains("CPP")));
    }

    #[test]
    fn test_forbidden_activity_year_is_ineligible_with_reason() {
        let periods = vec![FiscalPeriodInput::new(12, dec!(500_000), dec!(0))];
        let r = compute_year(&periods, &ruleset("6422-1/00"), &config());
        assert!(r.ineligible);
        assert!(r.ineligible_reason.unwrap().contains("Financial institutions"));
    }

    #[test]
    fn test_trailing_revenue_override_per_period() {
        let mut p = FiscalPeriodInput::new(1, dec!(10_000), dec!(0));
        p.trailing_12_revenue = Some(dec!(5_000_000));
        let r = compute(&p, &ruleset("4711-3/02"), &config());
        assert!(r.ineligible);
    }

    #[test]
    fn test_factor_r_note_when_switched() {
        let periods = vec![FiscalPeriodInput::new(12, dec!(600_000), dec!(200_000))];
        let r = compute_year(&periods, &ruleset("6201-5/01"), &config());
        assert!(r.notes.iter().any(|n| n.contains("Anexo III")));
        // Anexo III bracket 3: (600 000 × 13.5% − 17 640) / 600 000 = 10.56%
        assert_eq!(r.breakdown.das, dec!(63_360));
    }

    #[test]
    fn test_calculate_simples_validates_periods() {
        let input = RegimeInput {
            activity_code: "4711-3/02".into(),
            category: None,
            region: None,
            periods: vec![],
            assumed_margin: None,
        };
        assert!(calculate_simples(&input, &config()).is_err());
    }
}
