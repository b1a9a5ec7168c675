//! Simples Nacional progressive schedules (Anexos I–V of LC 123/2006 as
//! amended by LC 155/2016).
//!
//! Each table maps trailing-twelve-month revenue (RBT12) to a nominal rate
//! and a fixed deduction; the effective rate is
//! `(RBT12 × nominal − deduction) / RBT12`.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::TaxError;
use crate::types::{Money, Rate};
use crate::TaxResult;

/// Which Simples Nacional annex taxes an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Schedule {
    AnnexI,
    AnnexII,
    AnnexIII,
    AnnexIV,
    AnnexV,
    /// Activity barred from Simples Nacional.
    Forbidden,
}

impl Schedule {
    pub const TAXABLE: [Schedule; 5] = [
        Schedule::AnnexI,
        Schedule::AnnexII,
        Schedule::AnnexIII,
        Schedule::AnnexIV,
        Schedule::AnnexV,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Schedule::AnnexI => "Anexo I",
            Schedule::AnnexII => "Anexo II",
            Schedule::AnnexIII => "Anexo III",
            Schedule::AnnexIV => "Anexo IV",
            Schedule::AnnexV => "Anexo V",
            Schedule::Forbidden => "Vedado",
        }
    }

    /// The schedule that replaces this one once the Factor R threshold is met.
    pub fn factor_r_alternate(&self) -> Schedule {
        match self {
            Schedule::AnnexV => Schedule::AnnexIII,
            other => *other,
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Schedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s
            .trim()
            .to_ascii_lowercase()
            .replace("anexo", "")
            .replace("annex", "")
            .replace([' ', '_', '-'], "");
        match key.as_str() {
            "i" | "1" => Ok(Schedule::AnnexI),
            "ii" | "2" => Ok(Schedule::AnnexII),
            "iii" | "3" => Ok(Schedule::AnnexIII),
            "iv" | "4" => Ok(Schedule::AnnexIV),
            "v" | "5" => Ok(Schedule::AnnexV),
            _ => Err(format!("unknown schedule '{s}' (expected I, II, III, IV or V)")),
        }
    }
}

/// One revenue band of a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bracket {
    pub ceiling: Money,
    pub nominal_rate: Rate,
    pub deduction: Money,
}

impl Bracket {
    pub fn new(ceiling: Money, nominal_rate: Rate, deduction: Money) -> Self {
        Bracket {
            ceiling,
            nominal_rate,
            deduction,
        }
    }

    /// Effective rate for `revenue` using this band's nominal rate and deduction.
    pub fn effective_rate_at(&self, revenue: Money) -> Rate {
        if revenue <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((revenue * self.nominal_rate - self.deduction) / revenue).max(Decimal::ZERO)
    }
}

/// Ordered brackets of one schedule, strictly increasing ceilings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketTable {
    pub schedule: Schedule,
    pub brackets: Vec<Bracket>,
}

impl BracketTable {
    pub fn new(schedule: Schedule, brackets: Vec<Bracket>) -> TaxResult<Self> {
        let table = BracketTable { schedule, brackets };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> TaxResult<()> {
        if self.schedule == Schedule::Forbidden {
            return Err(TaxError::InvalidConfig(
                "bracket table cannot be attached to the forbidden schedule".into(),
            ));
        }
        if self.brackets.is_empty() {
            return Err(TaxError::InvalidConfig(format!(
                "{}: bracket table is empty",
                self.schedule
            )));
        }
        let mut previous = Decimal::ZERO;
        for (i, b) in self.brackets.iter().enumerate() {
            if b.ceiling <= previous {
                return Err(TaxError::InvalidConfig(format!(
                    "{}: bracket {} ceiling {} is not above the previous ceiling {}",
                    self.schedule,
                    i + 1,
                    b.ceiling,
                    previous
                )));
            }
            if b.nominal_rate < Decimal::ZERO || b.nominal_rate > Decimal::ONE {
                return Err(TaxError::InvalidConfig(format!(
                    "{}: bracket {} nominal rate must be between 0 and 1",
                    self.schedule,
                    i + 1
                )));
            }
            if b.deduction < Decimal::ZERO {
                return Err(TaxError::InvalidConfig(format!(
                    "{}: bracket {} deduction must be non-negative",
                    self.schedule,
                    i + 1
                )));
            }
            previous = b.ceiling;
        }
        Ok(())
    }

    /// Top ceiling; revenue above it leaves the regime.
    pub fn ceiling(&self) -> Money {
        self.brackets
            .last()
            .map(|b| b.ceiling)
            .unwrap_or(Decimal::ZERO)
    }

    /// Smallest bracket whose ceiling is ≥ `revenue`, with its 0-based index.
    pub fn find(&self, revenue: Money) -> Option<(usize, &Bracket)> {
        self.brackets
            .iter()
            .enumerate()
            .find(|(_, b)| revenue <= b.ceiling)
    }

    /// Ceilings at which the effective rate jumps by more than `tolerance`
    /// when moving into the next bracket.
    pub fn discontinuities(&self, tolerance: Rate) -> Vec<Money> {
        self.brackets
            .windows(2)
            .filter_map(|pair| {
                let at = pair[0].ceiling;
                let below = pair[0].effective_rate_at(at);
                let above = pair[1].effective_rate_at(at);
                if (below - above).abs() > tolerance {
                    Some(at)
                } else {
                    None
                }
            })
            .collect()
    }
}

/// The five statutory tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTables {
    pub annex_i: BracketTable,
    pub annex_ii: BracketTable,
    pub annex_iii: BracketTable,
    pub annex_iv: BracketTable,
    pub annex_v: BracketTable,
}

impl ScheduleTables {
    pub fn get(&self, schedule: Schedule) -> Option<&BracketTable> {
        match schedule {
            Schedule::AnnexI => Some(&self.annex_i),
            Schedule::AnnexII => Some(&self.annex_ii),
            Schedule::AnnexIII => Some(&self.annex_iii),
            Schedule::AnnexIV => Some(&self.annex_iv),
            Schedule::AnnexV => Some(&self.annex_v),
            Schedule::Forbidden => None,
        }
    }

    pub fn validate(&self) -> TaxResult<()> {
        for schedule in Schedule::TAXABLE {
            if let Some(table) = self.get(schedule) {
                if table.schedule != schedule {
                    return Err(TaxError::InvalidConfig(format!(
                        "table stored under {} declares schedule {}",
                        schedule, table.schedule
                    )));
                }
                table.validate()?;
            }
        }
        Ok(())
    }
}

fn statutory(schedule: Schedule, rows: [(Decimal, Decimal, Decimal); 6]) -> BracketTable {
    BracketTable {
        schedule,
        brackets: rows
            .into_iter()
            .map(|(c, r, d)| Bracket::new(c, r, d))
            .collect(),
    }
}

impl Default for ScheduleTables {
    fn default() -> Self {
        ScheduleTables {
            // Comércio
            annex_i: statutory(
                Schedule::AnnexI,
                [
                    (dec!(180_000), dec!(0.04), dec!(0)),
                    (dec!(360_000), dec!(0.073), dec!(5_940)),
                    (dec!(720_000), dec!(0.095), dec!(13_860)),
                    (dec!(1_800_000), dec!(0.107), dec!(22_500)),
                    (dec!(3_600_000), dec!(0.143), dec!(87_300)),
                    (dec!(4_800_000), dec!(0.19), dec!(378_000)),
                ],
            ),
            // Indústria
            annex_ii: statutory(
                Schedule::AnnexII,
                [
                    (dec!(180_000), dec!(0.045), dec!(0)),
                    (dec!(360_000), dec!(0.078), dec!(5_940)),
                    (dec!(720_000), dec!(0.10), dec!(13_860)),
                    (dec!(1_800_000), dec!(0.112), dec!(22_500)),
                    (dec!(3_600_000), dec!(0.147), dec!(85_500)),
                    (dec!(4_800_000), dec!(0.30), dec!(720_000)),
                ],
            ),
            annex_iii: statutory(
                Schedule::AnnexIII,
                [
                    (dec!(180_000), dec!(0.06), dec!(0)),
                    (dec!(360_000), dec!(0.112), dec!(9_360)),
                    (dec!(720_000), dec!(0.135), dec!(17_640)),
                    (dec!(1_800_000), dec!(0.16), dec!(35_640)),
                    (dec!(3_600_000), dec!(0.21), dec!(125_640)),
                    (dec!(4_800_000), dec!(0.33), dec!(648_000)),
                ],
            ),
            annex_iv: statutory(
                Schedule::AnnexIV,
                [
                    (dec!(180_000), dec!(0.045), dec!(0)),
                    (dec!(360_000), dec!(0.09), dec!(8_100)),
                    (dec!(720_000), dec!(0.102), dec!(12_420)),
                    (dec!(1_800_000), dec!(0.14), dec!(39_780)),
                    (dec!(3_600_000), dec!(0.22), dec!(183_780)),
                    (dec!(4_800_000), dec!(0.33), dec!(828_000)),
                ],
            ),
            annex_v: statutory(
                Schedule::AnnexV,
                [
                    (dec!(180_000), dec!(0.155), dec!(0)),
                    (dec!(360_000), dec!(0.18), dec!(4_500)),
                    (dec!(720_000), dec!(0.195), dec!(9_900)),
                    (dec!(1_800_000), dec!(0.205), dec!(17_100)),
                    (dec!(3_600_000), dec!(0.23), dec!(62_100)),
                    (dec!(4_800_000), dec!(0.305), dec!(540_000)),
                ],
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables_validate() {
        assert!(ScheduleTables::default().validate().is_ok());
    }

    #[test]
    fn test_find_uses_smallest_ceiling_at_or_above() {
        let tables = ScheduleTables::default();
        let t = tables.get(Schedule::AnnexI).unwrap();
        assert_eq!(t.find(dec!(180_000)).map(|(i, _)| i), Some(0));
        assert_eq!(t.find(dec!(180_000.01)).map(|(i, _)| i), Some(1));
        assert!(t.find(dec!(4_800_000.01)).is_none());
    }

    #[test]
    fn test_only_sublimit_boundary_is_discontinuous() {
        let tables = ScheduleTables::default();
        for schedule in Schedule::TAXABLE {
            let t = tables.get(schedule).unwrap();
            assert_eq!(
                t.discontinuities(dec!(0.000001)),
                vec![dec!(3_600_000)],
                "{schedule}"
            );
        }
    }

    #[test]
    fn test_rejects_non_increasing_ceilings() {
        let result = BracketTable::new(
            Schedule::AnnexI,
            vec![
                Bracket::new(dec!(200), dec!(0.04), dec!(0)),
                Bracket::new(dec!(100), dec!(0.05), dec!(0)),
            ],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_factor_r_alternate() {
        assert_eq!(Schedule::AnnexV.factor_r_alternate(), Schedule::AnnexIII);
        assert_eq!(Schedule::AnnexI.factor_r_alternate(), Schedule::AnnexI);
    }

    #[test]
    fn test_schedule_from_str() {
        assert_eq!("Anexo III".parse::<Schedule>().unwrap(), Schedule::AnnexIII);
        assert_eq!("v".parse::<Schedule>().unwrap(), Schedule::AnnexV);
        assert!("vi".parse::<Schedule>().is_err());
    }
}
