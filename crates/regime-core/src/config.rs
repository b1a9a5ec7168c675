//! Engine configuration.
//!
//! Every component receives a `&TaxConfig`; there is no process-wide rate
//! registry. `TaxConfig::default()` carries the statutory values in force
//! for calendar year 2025; hosts may deserialize an override (JSON or YAML)
//! and must call [`TaxConfig::validate`] before use.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::activity::RuleTables;
use crate::error::TaxError;
use crate::region::RegionTaxProfile;
use crate::schedule::ScheduleTables;
use crate::types::{Money, Rate};
use crate::TaxResult;

/// Employer-side payroll charges (CPP, RAT and third-party entities).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayrollRates {
    pub employer: Rate,
    pub risk: Rate,
    pub third_party: Rate,
}

impl Default for PayrollRates {
    fn default() -> Self {
        PayrollRates {
            employer: dec!(0.20),
            risk: dec!(0.02),
            third_party: dec!(0.058),
        }
    }
}

impl PayrollRates {
    pub fn combined(&self) -> Rate {
        self.employer + self.risk + self.third_party
    }
}

/// Federal rates for the two profit-based regimes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeRates {
    pub irpj: Rate,
    pub irpj_surtax: Rate,
    /// Surtax applies to the monthly-prorated base above this amount.
    pub surtax_monthly_threshold: Money,
    pub csll: Rate,
    pub pis_cumulative: Rate,
    pub cofins_cumulative: Rate,
    pub pis_non_cumulative: Rate,
    pub cofins_non_cumulative: Rate,
    /// Share of the period's profit that carried-forward losses may offset.
    pub loss_offset_cap: Rate,
    /// Annual revenue above which Lucro Presumido is unavailable.
    pub presumed_revenue_limit: Money,
    pub payroll: PayrollRates,
}

impl Default for RegimeRates {
    fn default() -> Self {
        RegimeRates {
            irpj: dec!(0.15),
            irpj_surtax: dec!(0.10),
            surtax_monthly_threshold: dec!(20_000),
            csll: dec!(0.09),
            pis_cumulative: dec!(0.0065),
            cofins_cumulative: dec!(0.03),
            pis_non_cumulative: dec!(0.0165),
            cofins_non_cumulative: dec!(0.076),
            loss_offset_cap: dec!(0.30),
            presumed_revenue_limit: dec!(78_000_000),
            payroll: PayrollRates::default(),
        }
    }
}

/// Simples Nacional thresholds that sit outside the bracket tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplesSettings {
    /// Payroll / revenue ratio from which Anexo V activities move to Anexo III.
    pub factor_r_threshold: Rate,
    /// Above this RBT12 ICMS and ISS are due outside the unified payment.
    pub sublimit: Money,
}

impl Default for SimplesSettings {
    fn default() -> Self {
        SimplesSettings {
            factor_r_threshold: dec!(0.28),
            sublimit: dec!(3_600_000),
        }
    }
}

/// Margin sampling range for the Presumido × Real comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakEvenSettings {
    pub min_margin: u32,
    pub max_margin: u32,
    /// Distance (in margin points) that triggers the proximity warning.
    pub proximity_points: Decimal,
}

impl Default for BreakEvenSettings {
    fn default() -> Self {
        BreakEvenSettings {
            min_margin: 1,
            max_margin: 95,
            proximity_points: dec!(5),
        }
    }
}

/// Which optional savings analyses the advisor runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorCapabilities {
    pub compensation_mix: bool,
    pub equity_remuneration: bool,
    pub cash_basis: bool,
    pub bookkeeping_distribution: bool,
}

impl Default for AdvisorCapabilities {
    fn default() -> Self {
        AdvisorCapabilities {
            compensation_mix: true,
            equity_remuneration: true,
            cash_basis: true,
            bookkeeping_distribution: true,
        }
    }
}

/// One row of the monthly IRPF withholding table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeTaxBand {
    /// `None` for the open top band.
    pub ceiling: Option<Money>,
    pub rate: Rate,
    pub deduction: Money,
}

/// Parameters for the owner-level and distribution analyses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorSettings {
    pub capabilities: AdvisorCapabilities,
    pub minimum_wage: Money,
    /// INSS contribution ceiling (teto) for the owner's own contribution.
    pub inss_ceiling: Money,
    pub owner_inss_rate: Rate,
    pub irpf_monthly: Vec<IncomeTaxBand>,
    /// TJLP used to cap interest on equity (JCP).
    pub tjlp: Rate,
    pub jcp_withholding: Rate,
    /// Marginal personal rate avoided when profit is distributed exempt.
    pub distribution_personal_rate: Rate,
    pub high_opportunity_ratio: Rate,
    pub medium_opportunity_ratio: Rate,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        AdvisorSettings {
            capabilities: AdvisorCapabilities::default(),
            minimum_wage: dec!(1_518),
            inss_ceiling: dec!(8_157.41),
            owner_inss_rate: dec!(0.11),
            irpf_monthly: vec![
                IncomeTaxBand {
                    ceiling: Some(dec!(2_428.80)),
                    rate: dec!(0),
                    deduction: dec!(0),
                },
                IncomeTaxBand {
                    ceiling: Some(dec!(2_826.65)),
                    rate: dec!(0.075),
                    deduction: dec!(182.16),
                },
                IncomeTaxBand {
                    ceiling: Some(dec!(3_751.05)),
                    rate: dec!(0.15),
                    deduction: dec!(394.16),
                },
                IncomeTaxBand {
                    ceiling: Some(dec!(4_664.68)),
                    rate: dec!(0.225),
                    deduction: dec!(675.49),
                },
                IncomeTaxBand {
                    ceiling: None,
                    rate: dec!(0.275),
                    deduction: dec!(908.73),
                },
            ],
            tjlp: dec!(0.0797),
            jcp_withholding: dec!(0.15),
            distribution_personal_rate: dec!(0.275),
            high_opportunity_ratio: dec!(0.15),
            medium_opportunity_ratio: dec!(0.05),
        }
    }
}

/// Everything the engine needs besides the request itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxConfig {
    pub rules: RuleTables,
    pub schedules: ScheduleTables,
    pub rates: RegimeRates,
    pub simples: SimplesSettings,
    pub regions: Vec<RegionTaxProfile>,
    pub break_even: BreakEvenSettings,
    pub advisor: AdvisorSettings,
    /// Entries kept by the resolver cache; 0 disables it.
    pub resolver_cache_capacity: usize,
}

impl Default for TaxConfig {
    fn default() -> Self {
        TaxConfig {
            rules: RuleTables::default(),
            schedules: ScheduleTables::default(),
            rates: RegimeRates::default(),
            simples: SimplesSettings::default(),
            regions: crate::region::builtin_profiles(),
            break_even: BreakEvenSettings::default(),
            advisor: AdvisorSettings::default(),
            resolver_cache_capacity: 256,
        }
    }
}

fn check_rate(field: &str, value: Rate) -> TaxResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(TaxError::InvalidConfig(format!(
            "{field} must be between 0 and 1 (got {value})"
        )));
    }
    Ok(())
}

impl TaxConfig {
    pub fn from_json_str(s: &str) -> TaxResult<Self> {
        let config: TaxConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TaxResult<()> {
        self.schedules.validate()?;
        self.rules.validate()?;

        let r = &self.rates;
        for (field, value) in [
            ("rates.irpj", r.irpj),
            ("rates.irpj_surtax", r.irpj_surtax),
            ("rates.csll", r.csll),
            ("rates.pis_cumulative", r.pis_cumulative),
            ("rates.cofins_cumulative", r.cofins_cumulative),
            ("rates.pis_non_cumulative", r.pis_non_cumulative),
            ("rates.cofins_non_cumulative", r.cofins_non_cumulative),
            ("rates.loss_offset_cap", r.loss_offset_cap),
            ("rates.payroll.employer", r.payroll.employer),
            ("rates.payroll.risk", r.payroll.risk),
            ("rates.payroll.third_party", r.payroll.third_party),
            ("simples.factor_r_threshold", self.simples.factor_r_threshold),
            ("advisor.owner_inss_rate", self.advisor.owner_inss_rate),
            ("advisor.tjlp", self.advisor.tjlp),
            ("advisor.jcp_withholding", self.advisor.jcp_withholding),
            (
                "advisor.distribution_personal_rate",
                self.advisor.distribution_personal_rate,
            ),
        ] {
            check_rate(field, value)?;
        }
        if r.surtax_monthly_threshold < Decimal::ZERO {
            return Err(TaxError::InvalidConfig(
                "rates.surtax_monthly_threshold must be non-negative".into(),
            ));
        }

        let be = &self.break_even;
        if be.min_margin == 0 || be.min_margin > be.max_margin || be.max_margin > 100 {
            return Err(TaxError::InvalidConfig(format!(
                "break_even margin range {}..={} must satisfy 1 <= min <= max <= 100",
                be.min_margin, be.max_margin
            )));
        }

        for region in &self.regions {
            region.validate()?;
        }

        if self.advisor.irpf_monthly.is_empty() {
            return Err(TaxError::InvalidConfig(
                "advisor.irpf_monthly must contain at least one band".into(),
            ));
        }
        if self.advisor.medium_opportunity_ratio > self.advisor.high_opportunity_ratio {
            return Err(TaxError::InvalidConfig(
                "advisor.medium_opportunity_ratio must not exceed high_opportunity_ratio".into(),
            ));
        }
        Ok(())
    }
}
