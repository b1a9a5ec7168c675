//! Margin sweep locating where Lucro Real overtakes Lucro Presumido.
//!
//! Lucro Presumido does not depend on profit, so its annual total is a
//! constant. Lucro Real is recomputed for every integer margin in the
//! configured range (1%–95% by default) and the first sign change of
//! `real − presumed` is the crossover.

use std::cmp::Ordering;
use std::time::Instant;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::activity::{Category, RuleResolver, TaxRuleSet};
use crate::config::TaxConfig;
use crate::context::prepare_with;
use crate::error::TaxError;
use crate::presumido;
use crate::real::calculator::compute_period;
use crate::region::RegionTaxProfile;
use crate::types::{round_money, with_metadata, ComputationOutput, FiscalPeriodInput, Money, Rate};
use crate::TaxResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Annual figures for the sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakEvenInput {
    pub revenue_annual: Money,
    /// Lucro Presumido total the sweep is compared against.
    pub presumed_total: Money,
    pub payroll_annual: Money,
    pub operating_expenses: Money,
    /// Creditable inputs for non-cumulative PIS/COFINS.
    pub credits: Money,
    pub carried_losses: Money,
    pub service_revenue: Option<Money>,
    /// Export, exempt, substituted and free-trade-zone revenue.
    pub excluded_revenue: Money,
    pub regional_incentive: bool,
}

impl BreakEvenInput {
    /// The sweep's synthetic twelve-month period.
    pub fn as_period(&self) -> FiscalPeriodInput {
        FiscalPeriodInput {
            label: Some("year".into()),
            service_revenue: self.service_revenue,
            creditable_inputs: self.credits,
            carried_losses: self.carried_losses,
            regional_incentive: self.regional_incentive,
            // All exclusions behave the same way for PIS/COFINS.
            exempt_revenue: self.excluded_revenue,
            ..FiscalPeriodInput::new(12, self.revenue_annual, self.payroll_annual)
        }
    }

    fn validate(&self) -> TaxResult<()> {
        for (field, value) in [
            ("revenue_annual", self.revenue_annual),
            ("presumed_total", self.presumed_total),
            ("payroll_annual", self.payroll_annual),
            ("operating_expenses", self.operating_expenses),
            ("credits", self.credits),
            ("carried_losses", self.carried_losses),
            ("excluded_revenue", self.excluded_revenue),
        ] {
            if value < Decimal::ZERO {
                return Err(TaxError::invalid(field, "Amount must be non-negative"));
            }
        }
        if self.excluded_revenue > self.revenue_annual {
            return Err(TaxError::invalid(
                "excluded_revenue",
                "Excluded revenue cannot exceed annual revenue",
            ));
        }
        Ok(())
    }
}

/// One point of the sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginSample {
    /// Margin in percentage points.
    pub margin: u32,
    pub presumed_total: Money,
    pub real_total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakEvenResult {
    pub current_total: Money,
    /// First sampled margin (points) at which the cheaper regime changes.
    pub crossover_margin: Option<u32>,
    pub always_presumed_advantage: bool,
    pub always_real_advantage: bool,
    pub presumed_cheaper_samples: u32,
    pub real_cheaper_samples: u32,
    /// Margin in points implied by the supplied expenses.
    pub actual_margin_estimate: Option<Decimal>,
    /// Data-quality warning about the inputs.
    pub warning: Option<String>,
    /// Set when the estimate sits close to the crossover.
    pub proximity_warning: Option<String>,
    pub recommendation: String,
    pub margin_series: Vec<MarginSample>,
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Profit margin (in points) implied by revenue, expenses and payroll.
/// Without any expense figure the estimate is 100 and a warning explains it.
pub fn estimate_margin(input: &BreakEvenInput) -> (Option<Decimal>, Option<String>) {
    if input.revenue_annual <= Decimal::ZERO {
        return (None, None);
    }
    if input.operating_expenses > Decimal::ZERO || input.payroll_annual > Decimal::ZERO {
        let profit = input.revenue_annual - input.operating_expenses - input.payroll_annual;
        let estimate = profit / input.revenue_annual * Decimal::ONE_HUNDRED;
        (Some(estimate.round_dp(2)), None)
    } else {
        (
            Some(Decimal::ONE_HUNDRED),
            Some(
                "No expenses supplied; the margin estimate assumes a 100% margin and is not reliable"
                    .to_string(),
            ),
        )
    }
}

/// Sample Lucro Real across the configured margins and locate the crossover
/// with the fixed Lucro Presumido total. Never fails.
pub fn find(
    input: &BreakEvenInput,
    ruleset: &TaxRuleSet,
    region: &RegionTaxProfile,
    config: &TaxConfig,
) -> BreakEvenResult {
    let presumed = round_money(input.presumed_total);
    let (estimate, warning) = estimate_margin(input);

    if input.revenue_annual <= Decimal::ZERO {
        return BreakEvenResult {
            current_total: presumed,
            crossover_margin: None,
            always_presumed_advantage: false,
            always_real_advantage: false,
            presumed_cheaper_samples: 0,
            real_cheaper_samples: 0,
            actual_margin_estimate: None,
            warning: Some("No revenue supplied; there is no margin to compare".into()),
            proximity_warning: None,
            recommendation: "Break-even analysis needs positive annual revenue; no comparison was made"
                .into(),
            margin_series: Vec::new(),
        };
    }

    let period = input.as_period();
    let settings = &config.break_even;
    let mut series = Vec::with_capacity(settings.max_margin.saturating_sub(settings.min_margin) as usize + 1);
    let mut crossover = None;
    let mut previous: Option<Ordering> = None;
    let mut presumed_cheaper = 0u32;
    let mut real_cheaper = 0u32;

    for m in settings.min_margin..=settings.max_margin {
        let margin: Rate = Decimal::from(m) / Decimal::ONE_HUNDRED;
        let real_total = compute_period(0, &period, margin, input.carried_losses, ruleset, region, config)
            .result
            .total;

        let sign = real_total.cmp(&presumed);
        match sign {
            Ordering::Greater => presumed_cheaper += 1,
            Ordering::Less => real_cheaper += 1,
            Ordering::Equal => {}
        }
        if crossover.is_none() && previous.is_some_and(|p| p != sign) {
            crossover = Some(m);
        }
        previous = Some(sign);

        series.push(MarginSample {
            margin: m,
            presumed_total: presumed,
            real_total,
        });
    }

    let samples = series.len() as u32;
    let always_presumed = samples > 0 && presumed_cheaper == samples;
    let always_real = samples > 0 && real_cheaper == samples;
    // Ties carry no side; read the first differing sample from the
    // crossover up, else the first differing sample below it.
    let differs = |s: &&MarginSample| s.real_total != s.presumed_total;
    let low_side_real = match crossover {
        Some(c) => match series.iter().filter(|s| s.margin >= c).find(differs) {
            Some(above) => above.real_total > above.presumed_total,
            None => series
                .iter()
                .find(differs)
                .is_some_and(|s| s.real_total < s.presumed_total),
        },
        None => false,
    };

    let recommendation = recommend(
        crossover,
        always_presumed,
        always_real,
        low_side_real,
        estimate,
        settings.min_margin,
        settings.max_margin,
    );

    let proximity_warning = match (crossover, estimate) {
        (Some(c), Some(e)) if (e - Decimal::from(c)).abs() <= settings.proximity_points => {
            Some(format!(
                "Estimated margin {}% is within {} points of the break-even margin {}%; small cost changes can flip the cheaper regime",
                e.normalize(),
                settings.proximity_points.normalize(),
                c
            ))
        }
        _ => None,
    };

    debug!(
        crossover = ?crossover,
        always_presumed,
        always_real,
        "break-even sweep finished"
    );

    BreakEvenResult {
        current_total: presumed,
        crossover_margin: crossover,
        always_presumed_advantage: always_presumed,
        always_real_advantage: always_real,
        presumed_cheaper_samples: presumed_cheaper,
        real_cheaper_samples: real_cheaper,
        actual_margin_estimate: estimate,
        warning,
        proximity_warning,
        recommendation,
        margin_series: series,
    }
}

fn recommend(
    crossover: Option<u32>,
    always_presumed: bool,
    always_real: bool,
    low_side_real: bool,
    estimate: Option<Decimal>,
    min: u32,
    max: u32,
) -> String {
    if always_presumed {
        return format!("Lucro Presumido is cheaper at every margin from {min}% to {max}%");
    }
    if always_real {
        return format!("Lucro Real is cheaper at every margin from {min}% to {max}%");
    }
    let Some(c) = crossover else {
        return format!("No crossover between {min}% and {max}%; both regimes cost the same where they do not differ");
    };

    let (below, above) = if low_side_real {
        ("Lucro Real", "Lucro Presumido")
    } else {
        ("Lucro Presumido", "Lucro Real")
    };
    let base = format!("Break-even at a {c}% margin: {below} is cheaper below it, {above} above it");
    match estimate {
        Some(e) if e < Decimal::from(c) => {
            format!("{base}. With an estimated margin of {}%, {below} is likely cheaper", e.normalize())
        }
        Some(e) => {
            format!("{base}. With an estimated margin of {}%, {above} is likely cheaper", e.normalize())
        }
        None => base,
    }
}

/// Result for a company that cannot opt into Lucro Presumido: there is no
/// Presumido total to sweep against.
fn not_compared(input: &BreakEvenInput, reason: String) -> BreakEvenResult {
    BreakEvenResult {
        current_total: round_money(input.presumed_total),
        crossover_margin: None,
        always_presumed_advantage: false,
        always_real_advantage: false,
        presumed_cheaper_samples: 0,
        real_cheaper_samples: 0,
        actual_margin_estimate: estimate_margin(input).0,
        warning: Some(reason.clone()),
        proximity_warning: None,
        recommendation: format!("No break-even comparison was made: {reason}"),
        margin_series: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Break-even request: the activity plus annual figures. When
/// `presumed_total` is absent it is computed from the activity's
/// presumption rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakEvenRequest {
    pub activity_code: String,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub region: Option<String>,
    pub revenue_annual: Money,
    #[serde(default)]
    pub presumed_total: Option<Money>,
    #[serde(default)]
    pub payroll_annual: Money,
    #[serde(default)]
    pub operating_expenses: Money,
    #[serde(default)]
    pub credits: Money,
    #[serde(default)]
    pub carried_losses: Money,
    #[serde(default)]
    pub service_revenue: Option<Money>,
    #[serde(default)]
    pub excluded_revenue: Money,
    #[serde(default)]
    pub regional_incentive: bool,
}

pub fn analyze_break_even(
    request: &BreakEvenRequest,
    config: &TaxConfig,
) -> TaxResult<ComputationOutput<BreakEvenResult>> {
    let start = Instant::now();
    if request.activity_code.trim().is_empty() {
        return Err(TaxError::invalid(
            "activity_code",
            "Activity code must not be empty",
        ));
    }

    let resolver = RuleResolver::new(config.rules.clone());
    let prepared = prepare_with(
        &resolver,
        &request.activity_code,
        request.category,
        request.region.as_deref(),
        config,
    );

    let mut input = BreakEvenInput {
        revenue_annual: request.revenue_annual,
        presumed_total: request.presumed_total.unwrap_or_default(),
        payroll_annual: request.payroll_annual,
        operating_expenses: request.operating_expenses,
        credits: request.credits,
        carried_losses: request.carried_losses,
        service_revenue: request.service_revenue,
        excluded_revenue: request.excluded_revenue,
        regional_incentive: request.regional_incentive,
    };
    input.validate()?;

    let mut ineligible_reason = None;
    if request.presumed_total.is_none() {
        let presumed = presumido::compute_year(
            &[input.as_period()],
            &prepared.ruleset,
            &prepared.region,
            config,
        );
        if presumed.ineligible {
            ineligible_reason = Some(
                presumed
                    .ineligible_reason
                    .unwrap_or_else(|| "Lucro Presumido is not available".to_string()),
            );
        }
        input.presumed_total = presumed.total;
    }

    let result = match ineligible_reason {
        Some(reason) => not_compared(&input, reason),
        None => find(&input, &prepared.ruleset, &prepared.region, config),
    };

    let mut warnings = prepared.warnings;
    warnings.extend(result.warning.clone());
    warnings.extend(result.proximity_warning.clone());

    let elapsed = start.elapsed().as_micros() as u64;
    let assumptions = serde_json::json!({
        "margin_range": format!("{}..={}", config.break_even.min_margin, config.break_even.max_margin),
        "step": "1 percentage point",
        "presumed_total_source": if request.presumed_total.is_some() { "supplied" } else { "computed" },
        "proximity_points": config.break_even.proximity_points.to_string(),
    });

    Ok(with_metadata(
        "Presumido × Real break-even (integer margin sweep, first sign change)",
        &assumptions,
        warnings,
        elapsed,
        result,
    ))
}
