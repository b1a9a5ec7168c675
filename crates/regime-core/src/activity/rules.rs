//! Activity rule tables and the resolved `TaxRuleSet`.
//!
//! The tables are configuration data: an exact CNAE map, a prefix list, a
//! per-category fallback and one absolute default. The built-in content
//! covers the activities whose treatment departs from their category
//! (reduced presumption rates, Factor R services, Anexo IV, vedações).

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::code::{digits_only, normalize, Category, CNAE_DIGITS};
use crate::error::TaxError;
use crate::schedule::Schedule;
use crate::types::Rate;
use crate::TaxResult;

/// Disclaimer attached to every ruleset that did not come from a specific rule.
pub const ESTIMATED_NOTE: &str =
    "Estimated classification from the activity category; confirm with your accountant";

pub const DEFAULT_NOTE: &str =
    "Activity not classified; generic service treatment applied (estimated); confirm with your accountant";

/// Which tier of the resolver produced a ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTier {
    Exact,
    Prefix,
    Category,
    Default,
}

impl SourceTier {
    /// Whether the result came from a fallback rather than a specific rule.
    pub fn is_fallback(&self) -> bool {
        matches!(self, SourceTier::Category | SourceTier::Default)
    }
}

/// Tax treatment of one activity. Every field is always populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRuleSet {
    pub description: String,
    pub category: Category,
    pub schedule: Schedule,
    pub factor_r_sensitive: bool,
    pub income_tax_presumption_rate: Rate,
    pub social_contribution_presumption_rate: Rate,
    pub forbidden: bool,
    pub forbidden_reason: Option<String>,
    pub note: Option<String>,
    pub source_tier: SourceTier,
    /// The exact code, prefix, category or `default` that matched.
    pub matched_key: String,
}

/// A rule as stored in the tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRule {
    pub description: String,
    pub category: Category,
    pub schedule: Schedule,
    #[serde(default)]
    pub factor_r_sensitive: bool,
    pub irpj_presumption: Rate,
    pub csll_presumption: Rate,
    #[serde(default)]
    pub forbidden_reason: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl ActivityRule {
    pub fn new(
        description: &str,
        category: Category,
        schedule: Schedule,
        irpj_presumption: Rate,
        csll_presumption: Rate,
    ) -> Self {
        ActivityRule {
            description: description.to_string(),
            category,
            schedule,
            factor_r_sensitive: false,
            irpj_presumption,
            csll_presumption,
            forbidden_reason: None,
            note: None,
        }
    }

    pub fn factor_r(mut self) -> Self {
        self.schedule = Schedule::AnnexV;
        self.factor_r_sensitive = true;
        self
    }

    pub fn forbidden(mut self, reason: &str) -> Self {
        self.schedule = Schedule::Forbidden;
        self.forbidden_reason = Some(reason.to_string());
        self
    }

    pub fn with_note(mut self, note: &str) -> Self {
        self.note = Some(note.to_string());
        self
    }

    /// Materialize into a ruleset tagged with the tier that found it.
    pub fn to_ruleset(&self, tier: SourceTier, matched_key: &str, note: Option<&str>) -> TaxRuleSet {
        let forbidden = self.schedule == Schedule::Forbidden;
        let forbidden_reason = if forbidden {
            Some(
                self.forbidden_reason
                    .clone()
                    .unwrap_or_else(|| "Activity is barred from Simples Nacional".to_string()),
            )
        } else {
            None
        };
        let note = match (note, &self.note) {
            (Some(n), Some(own)) => Some(format!("{n}. {own}")),
            (Some(n), None) => Some(n.to_string()),
            (None, own) => own.clone(),
        };
        TaxRuleSet {
            description: self.description.clone(),
            category: self.category,
            schedule: self.schedule,
            factor_r_sensitive: self.factor_r_sensitive && !forbidden,
            income_tax_presumption_rate: self.irpj_presumption,
            social_contribution_presumption_rate: self.csll_presumption,
            forbidden,
            forbidden_reason,
            note,
            source_tier: tier,
            matched_key: matched_key.to_string(),
        }
    }

    fn validate(&self, key: &str) -> TaxResult<()> {
        for (field, rate) in [
            ("irpj_presumption", self.irpj_presumption),
            ("csll_presumption", self.csll_presumption),
        ] {
            if rate < Decimal::ZERO || rate > Decimal::ONE {
                return Err(TaxError::InvalidConfig(format!(
                    "rule '{key}': {field} must be between 0 and 1"
                )));
            }
        }
        if self.factor_r_sensitive && self.schedule == Schedule::Forbidden {
            return Err(TaxError::InvalidConfig(format!(
                "rule '{key}': a forbidden activity cannot be Factor R sensitive"
            )));
        }
        Ok(())
    }
}

/// A rule keyed by a leading run of CNAE digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixRule {
    pub prefix: String,
    pub rule: ActivityRule,
}

/// All classification data consumed by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleTables {
    /// Keyed by normalized code (separators stripped).
    pub exact: BTreeMap<String, ActivityRule>,
    pub prefixes: Vec<PrefixRule>,
    pub categories: BTreeMap<Category, ActivityRule>,
    pub default: ActivityRule,
}

impl RuleTables {
    pub fn validate(&self) -> TaxResult<()> {
        for (key, rule) in &self.exact {
            let normalized = normalize(key);
            if digits_only(&normalized).len() != CNAE_DIGITS || normalized.len() != CNAE_DIGITS {
                return Err(TaxError::InvalidConfig(format!(
                    "exact rule key '{key}' is not a seven-digit CNAE code"
                )));
            }
            rule.validate(key)?;
        }
        for p in &self.prefixes {
            if p.prefix.is_empty() || digits_only(&p.prefix) != p.prefix {
                return Err(TaxError::InvalidConfig(format!(
                    "prefix rule '{}' must be a non-empty run of digits",
                    p.prefix
                )));
            }
            p.rule.validate(&p.prefix)?;
        }
        for (category, rule) in &self.categories {
            rule.validate(category.label())?;
        }
        self.default.validate("default")
    }
}

fn prefix(prefix: &str, rule: ActivityRule) -> PrefixRule {
    PrefixRule {
        prefix: prefix.to_string(),
        rule,
    }
}

const FINANCIAL_VEDACAO: &str =
    "Financial institutions are barred from Simples Nacional (LC 123/2006, art. 17, I)";

impl Default for RuleTables {
    fn default() -> Self {
        use Category::*;
        use Schedule::*;

        let mut exact = BTreeMap::new();
        let mut put = |code: &str, rule: ActivityRule| {
            exact.insert(normalize(code), rule);
        };

        put(
            "4930-2/01",
            ActivityRule::new(
                "Road cargo transport, municipal",
                Service,
                AnnexIII,
                dec!(0.08),
                dec!(0.12),
            ),
        );
        put(
            "4930-2/02",
            ActivityRule::new(
                "Road cargo transport, intercity, interstate and international",
                Service,
                AnnexIII,
                dec!(0.08),
                dec!(0.12),
            ),
        );
        put(
            "4921-3/01",
            ActivityRule::new(
                "Municipal passenger bus transport",
                Service,
                AnnexIII,
                dec!(0.16),
                dec!(0.12),
            ),
        );
        put(
            "4731-8/00",
            ActivityRule::new(
                "Retail sale of vehicle fuel",
                Commerce,
                AnnexI,
                dec!(0.016),
                dec!(0.12),
            ),
        );
        put(
            "8610-1/01",
            ActivityRule::new(
                "Hospital care, with emergency room",
                Service,
                AnnexIII,
                dec!(0.08),
                dec!(0.12),
            )
            .with_note("Reduced presumption requires a business company meeting ANVISA rules"),
        );
        put(
            "6201-5/01",
            ActivityRule::new(
                "Custom software development",
                Service,
                AnnexV,
                dec!(0.32),
                dec!(0.32),
            )
            .factor_r(),
        );
        put(
            "6204-0/00",
            ActivityRule::new(
                "Information technology consulting",
                Service,
                AnnexV,
                dec!(0.32),
                dec!(0.32),
            )
            .factor_r(),
        );
        put(
            "7112-0/00",
            ActivityRule::new("Engineering services", Service, AnnexV, dec!(0.32), dec!(0.32))
                .factor_r(),
        );
        put(
            "8630-5/03",
            ActivityRule::new(
                "Medical practice without procedures",
                Service,
                AnnexV,
                dec!(0.32),
                dec!(0.32),
            )
            .factor_r(),
        );
        put(
            "6911-7/01",
            ActivityRule::new("Law firms", Service, AnnexIV, dec!(0.32), dec!(0.32)),
        );
        put(
            "6920-6/01",
            ActivityRule::new("Accounting services", Service, AnnexIII, dec!(0.32), dec!(0.32)),
        );
        put(
            "4120-4/00",
            ActivityRule::new(
                "Construction of buildings",
                Service,
                AnnexIV,
                dec!(0.08),
                dec!(0.12),
            )
            .with_note("8% presumption assumes the contractor supplies all materials"),
        );
        put(
            "8121-4/00",
            ActivityRule::new(
                "Cleaning of buildings",
                Service,
                AnnexIV,
                dec!(0.32),
                dec!(0.32),
            ),
        );
        put(
            "8011-1/01",
            ActivityRule::new(
                "Private security",
                Service,
                AnnexIV,
                dec!(0.32),
                dec!(0.32),
            ),
        );
        put(
            "4711-3/02",
            ActivityRule::new(
                "Supermarkets",
                Commerce,
                AnnexI,
                dec!(0.08),
                dec!(0.12),
            ),
        );
        put(
            "5611-2/01",
            ActivityRule::new("Restaurants", Commerce, AnnexI, dec!(0.08), dec!(0.12)),
        );
        put(
            "1091-1/02",
            ActivityRule::new(
                "Bakery products, industrial manufacture",
                Industry,
                AnnexII,
                dec!(0.08),
                dec!(0.12),
            ),
        );
        put(
            "6422-1/00",
            ActivityRule::new(
                "Multiple banks with commercial portfolio",
                Service,
                Forbidden,
                dec!(0.16),
                dec!(0.12),
            )
            .forbidden(FINANCIAL_VEDACAO),
        );

        let mut prefixes = vec![
            prefix(
                "45",
                ActivityRule::new("Vehicle trade and repair", Commerce, AnnexI, dec!(0.08), dec!(0.12)),
            ),
            prefix(
                "46",
                ActivityRule::new("Wholesale trade", Commerce, AnnexI, dec!(0.08), dec!(0.12)),
            ),
            prefix(
                "47",
                ActivityRule::new("Retail trade", Commerce, AnnexI, dec!(0.08), dec!(0.12)),
            ),
            prefix(
                "4930",
                ActivityRule::new("Road cargo transport", Service, AnnexIII, dec!(0.08), dec!(0.12)),
            ),
            prefix(
                "492",
                ActivityRule::new(
                    "Road passenger transport",
                    Service,
                    AnnexIII,
                    dec!(0.16),
                    dec!(0.12),
                ),
            ),
            prefix(
                "41",
                ActivityRule::new("Building construction", Service, AnnexIV, dec!(0.08), dec!(0.12)),
            ),
            prefix(
                "42",
                ActivityRule::new("Infrastructure works", Service, AnnexIV, dec!(0.08), dec!(0.12)),
            ),
            prefix(
                "43",
                ActivityRule::new(
                    "Specialized construction services",
                    Service,
                    AnnexIV,
                    dec!(0.32),
                    dec!(0.32),
                ),
            ),
            prefix(
                "55",
                ActivityRule::new("Accommodation", Service, AnnexIII, dec!(0.32), dec!(0.32)),
            ),
            prefix(
                "56",
                ActivityRule::new("Food service", Commerce, AnnexI, dec!(0.08), dec!(0.12)),
            ),
            prefix(
                "62",
                ActivityRule::new(
                    "Information technology services",
                    Service,
                    AnnexV,
                    dec!(0.32),
                    dec!(0.32),
                )
                .factor_r(),
            ),
            prefix(
                "64",
                ActivityRule::new(
                    "Financial services",
                    Service,
                    Forbidden,
                    dec!(0.16),
                    dec!(0.12),
                )
                .forbidden(FINANCIAL_VEDACAO),
            ),
            prefix(
                "65",
                ActivityRule::new("Insurance", Service, Forbidden, dec!(0.16), dec!(0.12))
                    .forbidden("Insurers are barred from Simples Nacional (LC 123/2006, art. 17, I)"),
            ),
            prefix(
                "691",
                ActivityRule::new("Legal services", Service, AnnexIV, dec!(0.32), dec!(0.32)),
            ),
            prefix(
                "692",
                ActivityRule::new(
                    "Accounting and auditing",
                    Service,
                    AnnexIII,
                    dec!(0.32),
                    dec!(0.32),
                ),
            ),
            prefix(
                "71",
                ActivityRule::new(
                    "Architecture and engineering services",
                    Service,
                    AnnexV,
                    dec!(0.32),
                    dec!(0.32),
                )
                .factor_r(),
            ),
            prefix(
                "712",
                ActivityRule::new(
                    "Technical testing and analysis",
                    Service,
                    AnnexIII,
                    dec!(0.32),
                    dec!(0.32),
                ),
            ),
            prefix(
                "85",
                ActivityRule::new("Education", Service, AnnexIII, dec!(0.32), dec!(0.32)),
            ),
            prefix(
                "86",
                ActivityRule::new(
                    "Human health activities",
                    Service,
                    AnnexV,
                    dec!(0.32),
                    dec!(0.32),
                )
                .factor_r(),
            ),
            prefix(
                "8610",
                ActivityRule::new("Hospital care", Service, AnnexIII, dec!(0.08), dec!(0.12)),
            ),
        ];
        // Manufacturing divisions 10–33.
        for division in 10..=33u32 {
            prefixes.push(prefix(
                &division.to_string(),
                ActivityRule::new(
                    "Manufacturing industry",
                    Industry,
                    AnnexII,
                    dec!(0.08),
                    dec!(0.12),
                ),
            ));
        }

        let mut categories = BTreeMap::new();
        categories.insert(
            Commerce,
            ActivityRule::new("Commerce (generic)", Commerce, AnnexI, dec!(0.08), dec!(0.12)),
        );
        categories.insert(
            Industry,
            ActivityRule::new("Industry (generic)", Industry, AnnexII, dec!(0.08), dec!(0.12)),
        );
        categories.insert(
            Service,
            ActivityRule::new("Services (generic)", Service, AnnexV, dec!(0.32), dec!(0.32))
                .factor_r(),
        );

        RuleTables {
            exact,
            prefixes,
            categories,
            default: ActivityRule::new(
                "Unclassified activity",
                Service,
                AnnexV,
                dec!(0.32),
                dec!(0.32),
            )
            .factor_r(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables_validate() {
        assert!(RuleTables::default().validate().is_ok());
    }

    #[test]
    fn test_exact_keys_are_normalized() {
        let tables = RuleTables::default();
        assert!(tables.exact.contains_key("4930201"));
        assert!(!tables.exact.contains_key("4930-2/01"));
    }

    #[test]
    fn test_forbidden_rule_materializes_with_reason() {
        let tables = RuleTables::default();
        let rs = tables.exact["6422100"].to_ruleset(SourceTier::Exact, "6422100", None);
        assert!(rs.forbidden);
        assert_eq!(rs.schedule, Schedule::Forbidden);
        assert!(rs.forbidden_reason.is_some());
        assert!(!rs.factor_r_sensitive);
    }

    #[test]
    fn test_fallback_note_is_combined_with_rule_note() {
        let rule = ActivityRule::new("x", Category::Service, Schedule::AnnexIII, dec!(0.32), dec!(0.32))
            .with_note("own note");
        let rs = rule.to_ruleset(SourceTier::Category, "Service", Some(ESTIMATED_NOTE));
        let note = rs.note.unwrap();
        assert!(note.contains("Estimated"));
        assert!(note.contains("own note"));
    }

    #[test]
    fn test_rejects_non_digit_prefix() {
        let mut tables = RuleTables::default();
        tables.prefixes.push(PrefixRule {
            prefix: "7a".into(),
            rule: tables.default.clone(),
        });
        assert!(tables.validate().is_err());
    }

    #[test]
    fn test_rejects_presumption_above_one() {
        let mut tables = RuleTables::default();
        tables.default.irpj_presumption = dec!(1.2);
        assert!(tables.validate().is_err());
    }
}
