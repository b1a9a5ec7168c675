//! One report for one company: the three regimes side by side, the
//! break-even sweep and the ranked advice.

use std::time::Instant;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span};

use crate::activity::{Category, RuleResolver, TaxRuleSet};
use crate::advice::opportunities::{
    bookkeeping_distribution, cash_basis_deferral, compensation_mix, eligibility_alerts,
    equity_remuneration, exclusions, regime_switch,
};
use crate::advice::{
    build, AdviceReport, AdvisorModule, Capabilities, CompensationContext, EquityPosition,
    OwnerCompensation,
};
use crate::breakeven::{find, BreakEvenInput, BreakEvenResult};
use crate::config::TaxConfig;
use crate::context::prepare_with;
use crate::error::TaxError;
use crate::levies::service_revenue;
use crate::region::RegionTaxProfile;
use crate::types::{
    annualized, round_money, validate_margin, validate_periods, with_metadata, ComputationOutput,
    FiscalPeriodInput, Money, Rate, Regime, RegimeResult,
};
use crate::{presumido, real, simples, TaxResult};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Everything known about the company. Only the revenue is mandatory,
/// either as `annual_revenue` or through `periods`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxProfileInput {
    pub activity_code: String,
    pub category: Option<Category>,
    /// State (UF).
    pub region: Option<String>,
    pub annual_revenue: Option<Money>,
    /// Used only when `periods` is empty.
    pub annual_payroll: Option<Money>,
    pub periods: Vec<FiscalPeriodInput>,
    /// Annual operating expenses other than payroll.
    pub operating_expenses: Money,
    /// Profit margin for Lucro Real (0.10 = 10%).
    pub assumed_margin: Option<Rate>,
    pub current_regime: Option<Regime>,
    pub owner: Option<OwnerCompensation>,
    pub equity: Option<EquityPosition>,
    pub year_end_receivables: Money,
}

impl TaxProfileInput {
    fn validate(&self) -> TaxResult<()> {
        if self.activity_code.trim().is_empty() {
            return Err(TaxError::invalid(
                "activity_code",
                "Activity code must not be empty",
            ));
        }
        if self.periods.is_empty() {
            match self.annual_revenue {
                None => {
                    return Err(TaxError::invalid(
                        "annual_revenue",
                        "Annual revenue is required (directly or through periods)",
                    ))
                }
                Some(r) if r < Decimal::ZERO => {
                    return Err(TaxError::invalid(
                        "annual_revenue",
                        "Annual revenue must be non-negative",
                    ))
                }
                Some(_) => {}
            }
        } else {
            validate_periods(&self.periods)?;
        }

        let mut amounts = vec![
            ("annual_payroll", self.annual_payroll.unwrap_or_default()),
            ("operating_expenses", self.operating_expenses),
            ("year_end_receivables", self.year_end_receivables),
        ];
        if let Some(owner) = &self.owner {
            amounts.push(("owner.monthly_pro_labore", owner.monthly_pro_labore));
        }
        if let Some(eq) = &self.equity {
            amounts.push(("equity.net_equity", eq.net_equity));
            amounts.push(("equity.retained_earnings", eq.retained_earnings));
        }
        for (field, value) in amounts {
            if value < Decimal::ZERO {
                return Err(TaxError::invalid(field, "Amount must be non-negative"));
            }
        }
        if let Some(m) = self.assumed_margin {
            validate_margin("assumed_margin", m)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarginSource {
    Assumed,
    EstimatedFromExpenses,
    PresumptionRate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeRank {
    pub position: usize,
    pub regime: Regime,
    pub total: Money,
    /// Extra cost compared with the cheapest eligible regime.
    pub difference_to_best: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxSummary {
    pub activity_code: String,
    pub ruleset: TaxRuleSet,
    pub region: RegionTaxProfile,
    pub annual_revenue: Money,
    pub periods_synthesized: bool,
    pub real_margin: Rate,
    pub real_margin_source: MarginSource,
    pub simples: RegimeResult,
    pub presumido: RegimeResult,
    pub real: RegimeResult,
    /// Cheapest eligible regime; `None` when no regime is eligible.
    pub recommended: Option<Regime>,
    /// Eligible regimes, cheapest first.
    pub ranking: Vec<RegimeRank>,
    pub break_even: Option<BreakEvenResult>,
    pub advice: AdviceReport,
    pub capabilities: Capabilities,
    pub disclaimers: Vec<String>,
}

impl TaxSummary {
    pub fn results(&self) -> [&RegimeResult; 3] {
        [&self.simples, &self.presumido, &self.real]
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Four equal quarters from annual figures.
fn synthesize_quarters(revenue: Money, payroll: Money) -> Vec<FiscalPeriodInput> {
    let four = Decimal::from(4);
    (1..=4)
        .map(|q| FiscalPeriodInput {
            label: Some(format!("Q{q}")),
            ..FiscalPeriodInput::new(3, revenue / four, payroll / four)
        })
        .collect()
}

/// Eligible regimes ordered by total; ties keep the Simples, Presumido,
/// Real order.
pub fn rank_regimes(results: &[&RegimeResult]) -> Vec<RegimeRank> {
    let mut eligible: Vec<&RegimeResult> = results.iter().copied().filter(|r| !r.ineligible).collect();
    eligible.sort_by(|a, b| a.total.cmp(&b.total));
    let best = eligible.first().map(|r| r.total).unwrap_or_default();
    eligible
        .into_iter()
        .enumerate()
        .map(|(i, r)| RegimeRank {
            position: i + 1,
            regime: r.regime,
            total: r.total,
            difference_to_best: r.total - best,
        })
        .collect()
}

fn real_margin(
    input: &TaxProfileInput,
    revenue: Money,
    payroll: Money,
    ruleset: &TaxRuleSet,
) -> (Rate, MarginSource) {
    if let Some(m) = input.assumed_margin {
        return (m, MarginSource::Assumed);
    }
    if revenue > Decimal::ZERO && (input.operating_expenses > Decimal::ZERO || payroll > Decimal::ZERO) {
        let m = (revenue - input.operating_expenses - payroll) / revenue;
        return (
            m.max(Decimal::ZERO).min(Decimal::ONE).round_dp(4),
            MarginSource::EstimatedFromExpenses,
        );
    }
    (ruleset.income_tax_presumption_rate, MarginSource::PresumptionRate)
}

fn pct(rate: Rate) -> Decimal {
    (rate * Decimal::ONE_HUNDRED).round_dp(2).normalize()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Classify the activity, compute all three regimes, sweep the break-even
/// margin and rank the savings opportunities.
pub fn build_summary(
    input: &TaxProfileInput,
    config: &TaxConfig,
) -> TaxResult<ComputationOutput<TaxSummary>> {
    let start = Instant::now();
    let _span = debug_span!("build_summary", code = %input.activity_code).entered();
    input.validate()?;

    let resolver = RuleResolver::from_config(config);
    let prepared = prepare_with(
        &resolver,
        &input.activity_code,
        input.category,
        input.region.as_deref(),
        config,
    );
    let ruleset = prepared.ruleset;
    let region = prepared.region;
    let mut disclaimers = prepared.warnings;

    // Periods
    let synthesized = input.periods.is_empty();
    let periods = if synthesized {
        let revenue = input.annual_revenue.unwrap_or_default();
        push_unique(
            &mut disclaimers,
            "No fiscal periods supplied; four equal quarters were synthesized from the annual revenue".into(),
        );
        let payroll = match input.annual_payroll {
            Some(p) => p,
            None => {
                push_unique(
                    &mut disclaimers,
                    "Payroll not supplied; assumed to be zero".into(),
                );
                Decimal::ZERO
            }
        };
        synthesize_quarters(revenue, payroll)
    } else {
        input.periods.clone()
    };

    let annual_revenue = annualized(&periods, |p| p.revenue);
    let annual_payroll = annualized(&periods, |p| p.payroll);
    let period_revenue: Money = periods.iter().map(|p| p.revenue).sum();

    // Regimes
    let (margin, margin_source) = real_margin(input, annual_revenue, annual_payroll, &ruleset);
    match margin_source {
        MarginSource::Assumed => {}
        MarginSource::EstimatedFromExpenses => push_unique(
            &mut disclaimers,
            format!("Lucro Real margin estimated from expenses: {}%", pct(margin)),
        ),
        MarginSource::PresumptionRate => push_unique(
            &mut disclaimers,
            format!(
                "No margin or expenses supplied; Lucro Real assumes the {}% presumption rate as the profit margin",
                pct(margin)
            ),
        ),
    }

    let simples = simples::calculator::compute_year(&periods, &ruleset, config);
    let presumido = presumido::compute_year(&periods, &ruleset, &region, config);
    let real = real::compute_year(&periods, margin, &ruleset, &region, config);

    if let Some(reason) = &ruleset.forbidden_reason {
        push_unique(&mut disclaimers, reason.clone());
    }
    for result in [&simples, &presumido, &real] {
        if let Some(reason) = &result.ineligible_reason {
            push_unique(&mut disclaimers, format!("{}: {}", result.regime, reason));
        }
    }
    if !simples.ineligible && annual_revenue > config.simples.sublimit {
        push_unique(
            &mut disclaimers,
            format!(
                "Revenue above the {} Simples sublimit: ICMS/ISS are paid outside the DAS and are not included",
                config.simples.sublimit
            ),
        );
    }

    let ranking = rank_regimes(&[&simples, &presumido, &real]);
    let recommended = ranking.first().map(|r| r.regime);
    if recommended.is_none() {
        push_unique(
            &mut disclaimers,
            "No regime is eligible for this company; no recommendation made".into(),
        );
    }

    // Break-even
    let break_even = if presumido.ineligible {
        None
    } else {
        // Same baseline as the Presumido total reported above.
        let months: u32 = periods.iter().map(|p| p.months).sum();
        let presumed_total = if months > 0 && months < 12 {
            presumido.total * Decimal::from(12u32) / Decimal::from(months)
        } else {
            presumido.total
        };
        let be = BreakEvenInput {
            revenue_annual: annual_revenue,
            presumed_total,
            payroll_annual: annual_payroll,
            operating_expenses: input.operating_expenses,
            credits: annualized(&periods, |p| p.creditable_inputs),
            carried_losses: periods.iter().map(|p| p.carried_losses).sum(),
            service_revenue: Some(annualized(&periods, |p| service_revenue(p, &ruleset))),
            excluded_revenue: annualized(&periods, |p| p.turnover_exclusions()),
            regional_incentive: periods.iter().any(|p| p.regional_incentive),
        };
        let result = find(&be, &ruleset, &region, config);
        if let Some(w) = &result.warning {
            push_unique(&mut disclaimers, w.clone());
        }
        if let Some(w) = &result.proximity_warning {
            push_unique(&mut disclaimers, w.clone());
        }
        Some(result)
    };

    // Advice
    let mut capabilities = Capabilities::resolve(&config.advisor.capabilities);
    let advice_regime = recommended.or(input.current_regime);
    let results = vec![simples.clone(), presumido.clone(), real.clone()];

    let mut items = eligibility_alerts(&results);
    if let Some(current) = input.current_regime {
        items.extend(regime_switch(current, recommended, &results));
    }

    if capabilities.is_available(AdvisorModule::CompensationMix) {
        match (&input.owner, advice_regime) {
            (Some(owner), Some(regime)) => {
                let ctx = CompensationContext {
                    regime,
                    schedule: ruleset.schedule,
                    factor_r_sensitive: ruleset.factor_r_sensitive,
                    annual_revenue,
                    annual_payroll,
                };
                items.extend(compensation_mix(owner, &ctx, config));
            }
            _ => capabilities.withhold(
                AdvisorModule::CompensationMix,
                "owner pró-labore not supplied",
            ),
        }
    }

    if capabilities.is_available(AdvisorModule::EquityRemuneration) {
        match (&input.equity, advice_regime) {
            (Some(equity), Some(regime)) => items.extend(equity_remuneration(
                equity,
                regime,
                &config.rates,
                &config.advisor,
            )),
            _ => capabilities.withhold(
                AdvisorModule::EquityRemuneration,
                "equity figures not supplied",
            ),
        }
    }

    let presumido_chosen = advice_regime == Some(Regime::LucroPresumido);
    if capabilities.is_available(AdvisorModule::CashBasis) {
        if input.year_end_receivables > Decimal::ZERO {
            if presumido_chosen {
                items.extend(cash_basis_deferral(input.year_end_receivables, &presumido));
            }
        } else {
            capabilities.withhold(AdvisorModule::CashBasis, "year-end receivables not supplied");
        }
    }

    if capabilities.is_available(AdvisorModule::BookkeepingDistribution) {
        if margin_source == MarginSource::PresumptionRate {
            capabilities.withhold(
                AdvisorModule::BookkeepingDistribution,
                "accounting margin unknown",
            );
        } else if presumido_chosen {
            items.extend(bookkeeping_distribution(
                period_revenue,
                margin,
                &presumido,
                &ruleset,
                &config.advisor,
            ));
        }
    }

    items.extend(exclusions(&periods, &region, &config.rates));
    let advice = build(items, presumido.total, &config.advisor);

    debug!(
        recommended = ?recommended,
        saving = %advice.total_annual_saving,
        "summary built"
    );

    let summary = TaxSummary {
        activity_code: input.activity_code.trim().to_string(),
        ruleset,
        region,
        annual_revenue: round_money(annual_revenue),
        periods_synthesized: synthesized,
        real_margin: margin,
        real_margin_source: margin_source,
        simples,
        presumido,
        real,
        recommended,
        ranking,
        break_even,
        advice,
        capabilities,
        disclaimers: disclaimers.clone(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "periods": if synthesized { "synthesized quarters" } else { "supplied" },
        "real_margin": margin.to_string(),
        "recommendation": "cheapest eligible regime; ties follow Simples, Presumido, Real",
    });

    Ok(with_metadata(
        "Regime comparison (Simples Nacional, Lucro Presumido, Lucro Real) with break-even and advice",
        &assumptions,
        disclaimers,
        elapsed,
        summary,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::advice::Availability;
    use crate::config::AdvisorCapabilities;

    fn service_profile(revenue: Money) -> TaxProfileInput {
        TaxProfileInput {
            activity_code: "7112-0/00".into(),
            annual_revenue: Some(revenue),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_revenue_is_invalid_input() {
        let input = TaxProfileInput {
            activity_code: "7112-0/00".into(),
            ..Default::default()
        };
        let err = build_summary(&input, &TaxConfig::default()).unwrap_err();
        assert!(matches!(err, TaxError::InvalidInput { ref field, .. } if field == "annual_revenue"));
    }

    #[test]
    fn test_margin_outside_unit_interval_rejected() {
        let input = TaxProfileInput {
            assumed_margin: Some(dec!(-0.1)),
            ..service_profile(dec!(1_000_000))
        };
        assert!(build_summary(&input, &TaxConfig::default()).is_err());
    }

    #[test]
    fn test_service_company_without_expenses() {
        let out = build_summary(&service_profile(dec!(2_400_000)), &TaxConfig::default()).unwrap();
        let s = &out.result;
        assert!(s.periods_synthesized);
        assert_eq!(s.simples.total, dec!(489_900));
        assert_eq!(s.presumido.total, dec!(444_720));
        assert_eq!(s.real.total, dec!(579_120));
        assert_eq!(s.recommended, Some(Regime::LucroPresumido));
        let order: Vec<Regime> = s.ranking.iter().map(|r| r.regime).collect();
        assert_eq!(
            order,
            vec![Regime::LucroPresumido, Regime::SimplesNacional, Regime::LucroReal]
        );
        assert_eq!(s.ranking[1].difference_to_best, dec!(45_180));

        let be = s.break_even.as_ref().unwrap();
        assert_eq!(be.actual_margin_estimate, Some(dec!(100)));
        assert!(be.warning.is_some());
        assert_eq!(be.crossover_margin, Some(16));

        assert!(s.disclaimers.iter().any(|d| d.contains("synthesized")));
        assert!(s.disclaimers.iter().any(|d| d.contains("Payroll not supplied")));
        assert!(s.disclaimers.iter().any(|d| d.contains("100% margin")));
    }

    #[test]
    fn test_ineligible_regime_never_recommended() {
        let out = build_summary(&service_profile(dec!(5_000_000)), &TaxConfig::default()).unwrap();
        let s = &out.result;
        assert!(s.simples.ineligible);
        assert_ne!(s.recommended, Some(Regime::SimplesNacional));
        assert!(s.ranking.iter().all(|r| r.regime != Regime::SimplesNacional));
        assert!(s.advice.items[0].title.contains("Simples Nacional unavailable"));
    }

    #[test]
    fn test_forbidden_activity_disclaimer() {
        let input = TaxProfileInput {
            activity_code: "6422-1/00".into(),
            annual_revenue: Some(dec!(1_000_000)),
            ..Default::default()
        };
        let out = build_summary(&input, &TaxConfig::default()).unwrap();
        assert!(out.result.simples.ineligible);
        let reason = out.result.ruleset.forbidden_reason.clone().unwrap();
        assert!(out.result.disclaimers.contains(&reason));
    }

    #[test]
    fn test_fallback_note_reaches_disclaimers() {
        let input = TaxProfileInput {
            activity_code: "0000-0/00".into(),
            category: Some(Category::Service),
            annual_revenue: Some(dec!(500_000)),
            annual_payroll: Some(dec!(50_000)),
            ..Default::default()
        };
        let out = build_summary(&input, &TaxConfig::default()).unwrap();
        assert!(out
            .result
            .disclaimers
            .iter()
            .any(|d| d.to_lowercase().contains("estimated")));
        assert!(!out.result.disclaimers.iter().any(|d| d.contains("Payroll not supplied")));
    }

    #[test]
    fn test_disabled_capability_contributes_nothing() {
        let mut config = TaxConfig::default();
        config.advisor.capabilities = AdvisorCapabilities {
            cash_basis: false,
            ..Default::default()
        };
        let input = TaxProfileInput {
            year_end_receivables: dec!(300_000),
            ..service_profile(dec!(2_400_000))
        };
        let out = build_summary(&input, &config).unwrap();
        let s = &out.result;
        assert!(!s.advice.items.iter().any(|i| i.title.contains("cash-basis")));
        assert!(s.capabilities.modules.iter().any(|m| m.module == AdvisorModule::CashBasis
            && matches!(m.availability, Availability::Unavailable { .. })));

        let out = build_summary(&input, &TaxConfig::default()).unwrap();
        assert!(out.result.advice.total_deferral > Decimal::ZERO);
    }

    #[test]
    fn test_current_regime_switch_advice() {
        let input = TaxProfileInput {
            current_regime: Some(Regime::LucroReal),
            ..service_profile(dec!(2_400_000))
        };
        let out = build_summary(&input, &TaxConfig::default()).unwrap();
        let item = out
            .result
            .advice
            .items
            .iter()
            .find(|i| i.title == "Switch to Lucro Presumido")
            .unwrap();
        assert_eq!(item.estimated_impact, Some(dec!(134_400)));
    }
}
