//! Merge opportunity items into one ranked report.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::opportunities::{AdviceCategory, AdviceItem, ImpactKind};
use crate::config::AdvisorSettings;
use crate::types::{round_money, Money};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpportunityLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceReport {
    /// Sum of true reductions.
    pub total_annual_saving: Money,
    /// Sum of postponements; never part of the saving.
    pub total_deferral: Money,
    pub items: Vec<AdviceItem>,
    pub opportunity_level: OpportunityLevel,
}

/// Lowercase with whitespace runs collapsed to one space.
pub fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn opportunity_level(
    saving: Money,
    presumed_total: Money,
    settings: &AdvisorSettings,
) -> OpportunityLevel {
    if presumed_total <= Decimal::ZERO {
        return OpportunityLevel::Low;
    }
    let ratio = saving / presumed_total;
    if ratio > settings.high_opportunity_ratio {
        OpportunityLevel::High
    } else if ratio >= settings.medium_opportunity_ratio {
        OpportunityLevel::Medium
    } else {
        OpportunityLevel::Low
    }
}

/// Alerts first, then larger impacts, items without an impact last.
fn rank(a: &AdviceItem, b: &AdviceItem) -> Ordering {
    let alert_a = a.category != AdviceCategory::Alert;
    let alert_b = b.category != AdviceCategory::Alert;
    alert_a.cmp(&alert_b).then_with(|| match (a.estimated_impact, b.estimated_impact) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    })
}

/// Deduplicate (first occurrence of a title wins), total and rank.
pub fn build(
    opportunities: Vec<AdviceItem>,
    presumed_total: Money,
    settings: &AdvisorSettings,
) -> AdviceReport {
    let mut seen = std::collections::HashSet::new();
    let mut items: Vec<AdviceItem> = opportunities
        .into_iter()
        .filter(|item| seen.insert(normalize_title(&item.title)))
        .collect();

    let mut saving = Decimal::ZERO;
    let mut deferral = Decimal::ZERO;
    for item in &items {
        if item.already_applied
            || !matches!(item.category, AdviceCategory::Saving | AdviceCategory::Action)
        {
            continue;
        }
        let Some(impact) = item.estimated_impact else {
            continue;
        };
        match item.impact_kind {
            ImpactKind::Reduction => saving += impact,
            ImpactKind::Deferral => deferral += impact,
        }
    }

    items.sort_by(rank);
    let level = opportunity_level(saving, presumed_total, settings);
    debug!(items = items.len(), saving = %saving, deferral = %deferral, "advice aggregated");

    AdviceReport {
        total_annual_saving: round_money(saving),
        total_deferral: round_money(deferral),
        items,
        opportunity_level: level,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn settings() -> AdvisorSettings {
        AdvisorSettings::default()
    }

    #[test]
    fn test_duplicate_titles_summed_once() {
        let items = vec![
            AdviceItem::saving("Optimize pró-labore", "tip", dec!(1_000)),
            AdviceItem::saving("  optimize   PRÓ-LABORE ", "line item", dec!(1_000)),
        ];
        let report = build(items, dec!(100_000), &settings());
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].description, "tip");
        assert_eq!(report.total_annual_saving, dec!(1_000));
    }

    #[test]
    fn test_deferrals_never_mix_with_savings() {
        let items = vec![
            AdviceItem::saving("a", "", dec!(500)),
            AdviceItem::action("b", "").with_impact(dec!(2_000)).deferral(),
        ];
        let report = build(items, dec!(10_000), &settings());
        assert_eq!(report.total_annual_saving, dec!(500));
        assert_eq!(report.total_deferral, dec!(2_000));
    }

    #[test]
    fn test_applied_and_info_items_not_summed() {
        let items = vec![
            AdviceItem::info("exports", "").with_impact(dec!(7_300)).applied(),
            AdviceItem::info("note", "").with_impact(dec!(100)),
            AdviceItem::saving("jcp", "", dec!(200)),
        ];
        let report = build(items, dec!(10_000), &settings());
        assert_eq!(report.total_annual_saving, dec!(200));
        assert_eq!(report.items.len(), 3);
    }

    #[test]
    fn test_level_thresholds() {
        let s = settings();
        assert_eq!(opportunity_level(dec!(16), dec!(100), &s), OpportunityLevel::High);
        assert_eq!(opportunity_level(dec!(15), dec!(100), &s), OpportunityLevel::Medium);
        assert_eq!(opportunity_level(dec!(5), dec!(100), &s), OpportunityLevel::Medium);
        assert_eq!(opportunity_level(dec!(4.99), dec!(100), &s), OpportunityLevel::Low);
        assert_eq!(opportunity_level(dec!(50), dec!(0), &s), OpportunityLevel::Low);
    }

    #[test]
    fn test_ranking_alerts_first_then_impact_then_none() {
        let items = vec![
            AdviceItem::info("no impact", ""),
            AdviceItem::saving("small", "", dec!(10)),
            AdviceItem::alert("alert", ""),
            AdviceItem::saving("big", "", dec!(1_000)),
            AdviceItem::action("also none", ""),
        ];
        let report = build(items, dec!(1_000_000), &settings());
        let titles: Vec<&str> = report.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["alert", "big", "small", "no impact", "also none"]);
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title("  Switch   to\tLucro Real "), "switch to lucro real");
    }
}
