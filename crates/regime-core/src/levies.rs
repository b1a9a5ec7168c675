//! Formulas shared by Lucro Presumido and Lucro Real.

use rust_decimal::Decimal;

use crate::activity::{Category, TaxRuleSet};
use crate::config::{PayrollRates, RegimeRates};
use crate::types::{FiscalPeriodInput, Money, Rate};

/// IRPJ and its surtax on `base` for a period of `months` months.
/// The surtax threshold is prorated: 20 000 per month by default.
pub fn income_tax(base: Money, months: u32, rates: &RegimeRates) -> (Money, Money) {
    let base = base.max(Decimal::ZERO);
    let threshold = rates.surtax_monthly_threshold * Decimal::from(months);
    let irpj = base * rates.irpj;
    let surtax = (base - threshold).max(Decimal::ZERO) * rates.irpj_surtax;
    (irpj, surtax)
}

pub fn social_contribution(base: Money, rates: &RegimeRates) -> Money {
    base.max(Decimal::ZERO) * rates.csll
}

pub fn payroll_charges(payroll: Money, rates: &PayrollRates) -> Money {
    payroll * rates.combined()
}

/// Revenue subject to PIS/COFINS after zero-rated and substituted amounts.
pub fn turnover_base(period: &FiscalPeriodInput) -> Money {
    (period.revenue - period.turnover_exclusions()).max(Decimal::ZERO)
}

/// Service share of the period's revenue. When the caller gives no split,
/// service activities bill only services and the others bill only goods.
pub fn service_revenue(period: &FiscalPeriodInput, ruleset: &TaxRuleSet) -> Money {
    match period.service_revenue {
        Some(s) => s.min(period.revenue).max(Decimal::ZERO),
        None if ruleset.category == Category::Service => period.revenue,
        None => Decimal::ZERO,
    }
}

/// ISS on the service share only; goods revenue never bears it.
pub fn service_tax(service_revenue: Money, iss_rate: Rate) -> Money {
    service_revenue.max(Decimal::ZERO) * iss_rate
}
