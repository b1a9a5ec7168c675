//! Independent savings analyses. Each is a pure function returning zero or
//! more advice items; none of them knows about the others.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::activity::TaxRuleSet;
use crate::config::{AdvisorSettings, IncomeTaxBand, RegimeRates, TaxConfig};
use crate::region::RegionTaxProfile;
use crate::schedule::Schedule;
use crate::simples::effective_rate;
use crate::types::{round_money, FiscalPeriodInput, Money, Rate, Regime, RegimeResult};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdviceCategory {
    Alert,
    Saving,
    Action,
    Info,
}

/// Whether an amount lowers the tax bill or only postpones it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImpactKind {
    Reduction,
    Deferral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceItem {
    pub title: String,
    pub description: String,
    pub category: AdviceCategory,
    /// Annual amount in BRL, when one can be estimated.
    pub estimated_impact: Option<Money>,
    pub impact_kind: ImpactKind,
    /// Already reflected in the regime totals; listed for information only.
    pub already_applied: bool,
}

impl AdviceItem {
    fn new(category: AdviceCategory, title: impl Into<String>, description: impl Into<String>) -> Self {
        AdviceItem {
            title: title.into(),
            description: description.into(),
            category,
            estimated_impact: None,
            impact_kind: ImpactKind::Reduction,
            already_applied: false,
        }
    }

    pub fn alert(title: impl Into<String>, description: impl Into<String>) -> Self {
        AdviceItem::new(AdviceCategory::Alert, title, description)
    }

    pub fn saving(title: impl Into<String>, description: impl Into<String>, impact: Money) -> Self {
        AdviceItem::new(AdviceCategory::Saving, title, description).with_impact(impact)
    }

    pub fn action(title: impl Into<String>, description: impl Into<String>) -> Self {
        AdviceItem::new(AdviceCategory::Action, title, description)
    }

    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        AdviceItem::new(AdviceCategory::Info, title, description)
    }

    pub fn with_impact(mut self, impact: Money) -> Self {
        self.estimated_impact = Some(round_money(impact));
        self
    }

    pub fn deferral(mut self) -> Self {
        self.impact_kind = ImpactKind::Deferral;
        self
    }

    pub fn applied(mut self) -> Self {
        self.already_applied = true;
        self
    }
}

/// Owners' monthly pró-labore (the salary partners draw).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerCompensation {
    /// Per owner, per month.
    pub monthly_pro_labore: Money,
    #[serde(default = "one")]
    pub owners: u32,
}

fn one() -> u32 {
    1
}

/// Balance-sheet figures for interest on equity (JCP).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquityPosition {
    pub net_equity: Money,
    pub retained_earnings: Money,
    /// Profit for the year before JCP.
    pub annual_profit: Money,
}

/// Regime facts the pró-labore analysis depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensationContext {
    pub regime: Regime,
    /// Schedule requested by the activity (before any factor-R switch).
    pub schedule: Schedule,
    pub factor_r_sensitive: bool,
    pub annual_revenue: Money,
    /// Total payroll, owners' pró-labore included.
    pub annual_payroll: Money,
}

// ---------------------------------------------------------------------------
// Owner compensation
// ---------------------------------------------------------------------------

/// Monthly IRPF withheld on `taxable` using the progressive table.
pub fn monthly_income_tax(taxable: Money, bands: &[IncomeTaxBand]) -> Money {
    let band = bands
        .iter()
        .find(|b| b.ceiling.map_or(true, |c| taxable <= c))
        .or_else(|| bands.last());
    match band {
        Some(b) => (taxable * b.rate - b.deduction).max(Decimal::ZERO),
        None => Decimal::ZERO,
    }
}

/// Monthly cost of one owner's pró-labore: owner INSS, IRPF and, where
/// due, the employer contribution.
pub fn pro_labore_cost(
    monthly: Money,
    employer_rate: Rate,
    employer_due: bool,
    settings: &AdvisorSettings,
) -> Money {
    let inss = monthly.min(settings.inss_ceiling) * settings.owner_inss_rate;
    let irpf = monthly_income_tax(monthly - inss, &settings.irpf_monthly);
    let employer = if employer_due {
        monthly * employer_rate
    } else {
        Decimal::ZERO
    };
    inss + irpf + employer
}

/// Smallest monthly pró-labore per owner that keeps factor R at the
/// threshold, never below the minimum wage.
pub fn factor_r_pro_labore(
    annual_revenue: Money,
    other_payroll: Money,
    owners: u32,
    config: &TaxConfig,
) -> Money {
    let floor = config.advisor.minimum_wage;
    if owners == 0 || annual_revenue <= Decimal::ZERO {
        return floor;
    }
    let needed = annual_revenue * config.simples.factor_r_threshold - other_payroll;
    let per_owner = needed / Decimal::from(12 * owners);
    per_owner
        .round_dp_with_strategy(2, RoundingStrategy::ToPositiveInfinity)
        .max(floor)
}

/// Compare the current pró-labore with the cheapest alternative: the
/// minimum wage, or for factor-R activities under Simples the smallest
/// amount reaching Annex III.
pub fn compensation_mix(
    owner: &OwnerCompensation,
    ctx: &CompensationContext,
    config: &TaxConfig,
) -> Option<AdviceItem> {
    if owner.owners == 0 || owner.monthly_pro_labore < Decimal::ZERO {
        return None;
    }
    let settings = &config.advisor;
    let owners = Decimal::from(owner.owners);
    let current_annual = owner.monthly_pro_labore * owners * Decimal::from(12);
    let other_payroll = (ctx.annual_payroll - current_annual).max(Decimal::ZERO);

    let simples = ctx.regime == Regime::SimplesNacional;
    let factor_r = simples && ctx.factor_r_sensitive;

    let annual_cost = |monthly: Money| -> Money {
        let payroll = other_payroll + monthly * owners * Decimal::from(12);
        let (das, schedule) = if factor_r {
            let rate = effective_rate(
                ctx.schedule,
                true,
                ctx.annual_revenue,
                Some(payroll),
                config,
            );
            (rate.rate * ctx.annual_revenue, rate.applied_schedule)
        } else {
            (Decimal::ZERO, ctx.schedule)
        };
        let employer_due = !simples || schedule == Schedule::AnnexIV;
        let owner_cost = pro_labore_cost(
            monthly,
            config.rates.payroll.employer,
            employer_due,
            settings,
        );
        owner_cost * owners * Decimal::from(12) + das
    };

    let mut candidates = vec![settings.minimum_wage];
    if factor_r {
        candidates.push(factor_r_pro_labore(
            ctx.annual_revenue,
            other_payroll,
            owner.owners,
            config,
        ));
    }

    let current_cost = annual_cost(owner.monthly_pro_labore);
    let (best, best_cost) = candidates
        .into_iter()
        .map(|m| (m, annual_cost(m)))
        .min_by(|a, b| a.1.cmp(&b.1))?;

    let saving = round_money(current_cost - best_cost);
    if saving <= Decimal::ZERO {
        return None;
    }

    let direction = if best > owner.monthly_pro_labore {
        "Raising"
    } else {
        "Lowering"
    };
    let mut description = format!(
        "{direction} the pró-labore from {} to {} per owner per month and distributing the rest as exempt profit lowers INSS, IRPF and employer charges",
        round_money(owner.monthly_pro_labore),
        best
    );
    if factor_r && best > owner.monthly_pro_labore {
        description.push_str(&format!(
            "; the higher payroll keeps factor R at {}% and moves the activity from Annex V to Annex III",
            (config.simples.factor_r_threshold * Decimal::ONE_HUNDRED).normalize()
        ));
    }

    Some(AdviceItem::saving("Optimize pró-labore", description, saving))
}

// ---------------------------------------------------------------------------
// Interest on equity (JCP)
// ---------------------------------------------------------------------------

/// Deductible JCP: equity × TJLP, limited to half of the year's profit or
/// half of retained earnings, whichever is larger.
pub fn jcp_ceiling(equity: &EquityPosition, settings: &AdvisorSettings) -> Money {
    let by_rate = equity.net_equity.max(Decimal::ZERO) * settings.tjlp;
    let half = Decimal::new(5, 1);
    let limit = (equity.annual_profit * half).max(equity.retained_earnings * half);
    by_rate.min(limit).max(Decimal::ZERO)
}

/// JCP is deductible only under Lucro Real.
pub fn equity_remuneration(
    equity: &EquityPosition,
    regime: Regime,
    rates: &RegimeRates,
    settings: &AdvisorSettings,
) -> Option<AdviceItem> {
    if regime != Regime::LucroReal {
        return None;
    }
    let jcp = jcp_ceiling(equity, settings);
    if jcp <= Decimal::ZERO {
        return None;
    }
    let corporate = rates.irpj + rates.irpj_surtax + rates.csll;
    let saving = jcp * corporate - jcp * settings.jcp_withholding;
    if saving <= Decimal::ZERO {
        return None;
    }
    Some(AdviceItem::saving(
        "Pay interest on equity (JCP)",
        format!(
            "Up to {} of JCP is deductible at {}% IRPJ/CSLL against {}% withholding for the shareholders",
            round_money(jcp),
            (corporate * Decimal::ONE_HUNDRED).normalize(),
            (settings.jcp_withholding * Decimal::ONE_HUNDRED).normalize()
        ),
        saving,
    ))
}

// ---------------------------------------------------------------------------
// Cash basis
// ---------------------------------------------------------------------------

/// Under Lucro Presumido on a cash basis, taxes on receivables open at
/// year end move to the next year. Payroll charges do not move.
pub fn cash_basis_deferral(receivables: Money, presumido: &RegimeResult) -> Option<AdviceItem> {
    if receivables <= Decimal::ZERO || presumido.ineligible {
        return None;
    }
    let revenue: Money = presumido.periods.iter().map(|p| p.revenue).sum();
    if revenue <= Decimal::ZERO {
        return None;
    }
    let rate = (presumido.total - presumido.breakdown.payroll_charges) / revenue;
    let deferral = receivables * rate;
    if deferral <= Decimal::ZERO {
        return None;
    }
    Some(
        AdviceItem::action(
            "Adopt cash-basis recognition",
            format!(
                "Opting for the cash basis under Lucro Presumido postpones taxes on {} of year-end receivables; this is a deferral, not a reduction",
                round_money(receivables)
            ),
        )
        .with_impact(deferral)
        .deferral(),
    )
}

// ---------------------------------------------------------------------------
// Bookkeeping-based distribution
// ---------------------------------------------------------------------------

/// With full accounting records a Lucro Presumido company may distribute its
/// accounting profit exempt, instead of only the presumed base net of taxes.
pub fn bookkeeping_distribution(
    annual_revenue: Money,
    accounting_margin: Rate,
    presumido: &RegimeResult,
    ruleset: &TaxRuleSet,
    settings: &AdvisorSettings,
) -> Option<AdviceItem> {
    if presumido.ineligible || annual_revenue <= Decimal::ZERO {
        return None;
    }
    let taxes = &presumido.breakdown;
    let presumed_distribution = annual_revenue * ruleset.income_tax_presumption_rate
        - taxes.income_taxes()
        - taxes.turnover_taxes();
    let accounting_profit = annual_revenue * accounting_margin - taxes.income_taxes();
    let excess = accounting_profit - presumed_distribution.max(Decimal::ZERO);
    if excess <= Decimal::ZERO {
        return None;
    }
    Some(AdviceItem::saving(
        "Keep full bookkeeping to distribute accounting profit",
        format!(
            "Accounting profit exceeds the presumed distributable amount by {}; distributing it exempt avoids personal tax at {}%",
            round_money(excess),
            (settings.distribution_personal_rate * Decimal::ONE_HUNDRED).normalize()
        ),
        excess * settings.distribution_personal_rate,
    ))
}

// ---------------------------------------------------------------------------
// Exclusions already applied
// ---------------------------------------------------------------------------

/// Regional, export and free-trade-zone treatments. Amounts already
/// excluded upstream are listed as applied.
pub fn exclusions(
    periods: &[FiscalPeriodInput],
    region: &RegionTaxProfile,
    rates: &RegimeRates,
) -> Vec<AdviceItem> {
    let mut items = Vec::new();
    let turnover_rate = rates.pis_cumulative + rates.cofins_cumulative;

    let exports: Money = periods.iter().map(|p| p.export_revenue).sum();
    if exports > Decimal::ZERO {
        items.push(
            AdviceItem::info(
                "Export revenue excluded from PIS/COFINS",
                format!("{} of export revenue is zero-rated for PIS and COFINS", round_money(exports)),
            )
            .with_impact(exports * turnover_rate)
            .applied(),
        );
    }

    let ftz: Money = periods.iter().map(|p| p.free_trade_zone_revenue).sum();
    if ftz > Decimal::ZERO {
        items.push(
            AdviceItem::info(
                "Free-trade-zone sales excluded from PIS/COFINS",
                format!("{} of sales into the Manaus free-trade zone are zero-rated", round_money(ftz)),
            )
            .with_impact(ftz * turnover_rate)
            .applied(),
        );
    } else if region.free_trade_zone {
        items.push(AdviceItem::info(
            "Manaus free-trade zone",
            format!(
                "{} hosts the Manaus free-trade zone; sales into it are zero-rated for PIS/COFINS",
                region.name
            ),
        ));
    }

    if let Some(incentive) = &region.incentive {
        let program = incentive.program.label();
        let pct = (incentive.reduction_factor * Decimal::ONE_HUNDRED).normalize();
        if periods.iter().any(|p| p.regional_incentive) {
            items.push(
                AdviceItem::info(
                    format!("{program} IRPJ reduction"),
                    format!("Base IRPJ under Lucro Real already reduced by {pct}%"),
                )
                .applied(),
            );
        } else {
            items.push(AdviceItem::action(
                format!("{program} IRPJ reduction"),
                format!(
                    "Projects approved by {program} in {} cut base IRPJ by {pct}% under Lucro Real",
                    region.name
                ),
            ));
        }
    }
    items
}

// ---------------------------------------------------------------------------
// Regime eligibility and switching
// ---------------------------------------------------------------------------

pub fn eligibility_alerts(results: &[RegimeResult]) -> Vec<AdviceItem> {
    results
        .iter()
        .filter(|r| r.ineligible)
        .map(|r| {
            AdviceItem::alert(
                format!("{} unavailable", r.regime),
                r.ineligible_reason
                    .clone()
                    .unwrap_or_else(|| format!("{} is not available for this company", r.regime)),
            )
        })
        .collect()
}

/// Advice for a caller who stated its current regime.
pub fn regime_switch(
    current: Regime,
    recommended: Option<Regime>,
    results: &[RegimeResult],
) -> Option<AdviceItem> {
    let current_result = results.iter().find(|r| r.regime == current)?;
    if current_result.ineligible {
        return Some(AdviceItem::alert(
            format!("Current regime {current} is not available"),
            current_result
                .ineligible_reason
                .clone()
                .unwrap_or_default(),
        ));
    }
    let target = recommended.filter(|r| *r != current)?;
    let target_result = results.iter().find(|r| r.regime == target)?;
    let saving = current_result.total - target_result.total;
    if saving <= Decimal::ZERO {
        return None;
    }
    Some(AdviceItem::saving(
        format!("Switch to {target}"),
        format!(
            "{target} costs {} against {} under {current}",
            target_result.total, current_result.total
        ),
        saving,
    ))
}
