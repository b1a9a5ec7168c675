//! Per-state tax profiles.
//!
//! States differ only in data (ISS rate, SUDENE/SUDAM incentive, Manaus
//! free-trade zone), so a single `RegionTaxProfile` record feeds the one
//! generic calculator.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::TaxError;
use crate::types::Rate;
use crate::TaxResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncentiveProgram {
    Sudene,
    Sudam,
}

impl IncentiveProgram {
    pub fn label(&self) -> &'static str {
        match self {
            IncentiveProgram::Sudene => "SUDENE",
            IncentiveProgram::Sudam => "SUDAM",
        }
    }
}

/// Reduction of base IRPJ granted to approved projects in the region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionalIncentive {
    pub program: IncentiveProgram,
    pub reduction_factor: Rate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionTaxProfile {
    /// Two-letter state code (UF); `BR` for the generic profile.
    pub uf: String,
    pub name: String,
    /// ISS rate assumed for service revenue (municipal, 2%–5%).
    pub iss_rate: Rate,
    #[serde(default)]
    pub incentive: Option<RegionalIncentive>,
    #[serde(default)]
    pub free_trade_zone: bool,
}

impl RegionTaxProfile {
    /// Used when the caller names no state or an unknown one.
    pub fn generic() -> Self {
        RegionTaxProfile {
            uf: "BR".into(),
            name: "Generic (no regional incentive)".into(),
            iss_rate: dec!(0.05),
            incentive: None,
            free_trade_zone: false,
        }
    }

    /// Reduction factor applicable to base IRPJ, if the region has a program.
    pub fn reduction_factor(&self) -> Option<Rate> {
        self.incentive.as_ref().map(|i| i.reduction_factor)
    }

    pub fn validate(&self) -> TaxResult<()> {
        if self.uf.trim().is_empty() {
            return Err(TaxError::InvalidConfig("region uf must not be empty".into()));
        }
        if self.iss_rate < Decimal::ZERO || self.iss_rate > Decimal::ONE {
            return Err(TaxError::InvalidConfig(format!(
                "region {}: iss_rate must be between 0 and 1",
                self.uf
            )));
        }
        if let Some(inc) = &self.incentive {
            if inc.reduction_factor < Decimal::ZERO || inc.reduction_factor > Decimal::ONE {
                return Err(TaxError::InvalidConfig(format!(
                    "region {}: reduction_factor must be between 0 and 1",
                    self.uf
                )));
            }
        }
        Ok(())
    }
}

/// Look up a profile by UF, case-insensitively.
pub fn find_profile<'a>(profiles: &'a [RegionTaxProfile], uf: &str) -> Option<&'a RegionTaxProfile> {
    let uf = uf.trim();
    profiles.iter().find(|p| p.uf.eq_ignore_ascii_case(uf))
}

/// Profile for an optional UF, falling back to the generic profile with a
/// warning when the state is unknown.
pub fn resolve_region(
    profiles: &[RegionTaxProfile],
    uf: Option<&str>,
) -> (RegionTaxProfile, Option<String>) {
    match uf {
        None => (RegionTaxProfile::generic(), None),
        Some(code) => match find_profile(profiles, code) {
            Some(p) => (p.clone(), None),
            None => (
                RegionTaxProfile::generic(),
                Some(format!(
                    "Unknown state '{}'; generic 5% ISS and no regional incentive assumed",
                    code.trim()
                )),
            ),
        },
    }
}

fn profile(uf: &str, name: &str, program: Option<IncentiveProgram>) -> RegionTaxProfile {
    RegionTaxProfile {
        uf: uf.into(),
        name: name.into(),
        iss_rate: dec!(0.05),
        incentive: program.map(|program| RegionalIncentive {
            program,
            reduction_factor: dec!(0.75),
        }),
        free_trade_zone: uf == "AM",
    }
}

pub fn builtin_profiles() -> Vec<RegionTaxProfile> {
    use IncentiveProgram::*;
    vec![
        profile("AC", "Acre", Some(Sudam)),
        profile("AL", "Alagoas", Some(Sudene)),
        profile("AM", "Amazonas", Some(Sudam)),
        profile("AP", "Amapá", Some(Sudam)),
        profile("BA", "Bahia", Some(Sudene)),
        profile("CE", "Ceará", Some(Sudene)),
        profile("DF", "Distrito Federal", None),
        profile("ES", "Espírito Santo", None),
        profile("GO", "Goiás", None),
        profile("MA", "Maranhão", Some(Sudene)),
        profile("MG", "Minas Gerais", None),
        profile("MS", "Mato Grosso do Sul", None),
        profile("MT", "Mato Grosso", Some(Sudam)),
        profile("PA", "Pará", Some(Sudam)),
        profile("PB", "Paraíba", Some(Sudene)),
        profile("PE", "Pernambuco", Some(Sudene)),
        profile("PI", "Piauí", Some(Sudene)),
        profile("PR", "Paraná", None),
        profile("RJ", "Rio de Janeiro", None),
        profile("RN", "Rio Grande do Norte", Some(Sudene)),
        profile("RO", "Rondônia", Some(Sudam)),
        profile("RR", "Roraima", Some(Sudam)),
        profile("RS", "Rio Grande do Sul", None),
        profile("SC", "Santa Catarina", None),
        profile("SE", "Sergipe", Some(Sudene)),
        profile("SP", "São Paulo", None),
        profile("TO", "Tocantins", Some(Sudam)),
    ]
}
