use proptest::prelude::*;
use regime_core::activity::{
    classify_activity, Category, ClassifyInput, RuleResolver, RuleTables, SourceTier,
};
use regime_core::schedule::Schedule;
use regime_core::TaxConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Tier examples
// ===========================================================================

fn resolver() -> RuleResolver {
    RuleResolver::new(RuleTables::default())
}

#[test]
fn test_road_cargo_resolves_exact_at_eight_percent() {
    let rs = resolver().resolve("4930-2/01", Some(Category::Service));
    assert_eq!(rs.source_tier, SourceTier::Exact);
    // Not the generic 32% service presumption
    assert_eq!(rs.income_tax_presumption_rate, dec!(0.08));
}

#[test]
fn test_unknown_service_code_uses_category_with_estimated_note() {
    let rs = resolver().resolve("0000-0/00", Some(Category::Service));
    assert_eq!(rs.source_tier, SourceTier::Category);
    assert_eq!(rs.income_tax_presumption_rate, dec!(0.32));
    assert!(rs.note.as_deref().unwrap_or_default().to_lowercase().contains("estimated"));
}

#[test]
fn test_more_specific_prefix_beats_shorter_one() {
    // Both "71" and "712" match 7120-1/00
    let rs = resolver().resolve("7120-1/00", None);
    assert_eq!(rs.source_tier, SourceTier::Prefix);
    assert_eq!(rs.matched_key, "712");
}

#[test]
fn test_separators_do_not_change_the_answer() {
    let r = resolver();
    let a = r.resolve("4930-2/01", None);
    let b = r.resolve(" 4930.2-01 ", None);
    let c = r.resolve("4930201", None);
    assert_eq!(a, b);
    assert_eq!(b, c);
}

#[test]
fn test_config_with_dashed_exact_key_resolves_exact() {
    let mut config = TaxConfig::default();
    let mut rule = config.rules.exact.remove("4930201").unwrap();
    rule.irpj_presumption = dec!(0.08);
    rule.csll_presumption = dec!(0.12);
    config.rules.exact.insert("4930-2/01".into(), rule);
    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"4930-2/01\""));

    let loaded = TaxConfig::from_json_str(&json).unwrap();
    let rs = RuleResolver::from_config(&loaded).resolve("4930-2/01", None);
    assert_eq!(rs.source_tier, SourceTier::Exact);
    assert_eq!(rs.income_tax_presumption_rate, dec!(0.08));
}

#[test]
fn test_financial_institution_is_forbidden() {
    let rs = resolver().resolve("6422-1/00", None);
    assert!(rs.forbidden);
    assert_eq!(rs.schedule, Schedule::Forbidden);
    assert!(rs.forbidden_reason.is_some());
    assert!(!rs.factor_r_sensitive);
}

#[test]
fn test_classify_activity_envelope() {
    let out = classify_activity(
        &ClassifyInput {
            activity_code: "4930201".into(),
            category: None,
        },
        &TaxConfig::default(),
    )
    .unwrap();
    assert_eq!(out.result.code, "4930-2/01");
    assert!(out.warnings.is_empty());
    assert!(out.methodology.contains("CNAE"));
}

// ===========================================================================
// Properties
// ===========================================================================

fn category() -> impl Strategy<Value = Option<Category>> {
    prop_oneof![
        Just(None),
        Just(Some(Category::Commerce)),
        Just(Some(Category::Industry)),
        Just(Some(Category::Service)),
    ]
}

proptest! {
    #[test]
    fn prop_resolve_is_total_and_fully_populated(code in "\\PC{0,16}", cat in category()) {
        let rs = resolver().resolve(&code, cat);
        prop_assert!(!rs.description.is_empty());
        prop_assert!(!rs.matched_key.is_empty());
        prop_assert!(rs.income_tax_presumption_rate >= Decimal::ZERO);
        prop_assert!(rs.income_tax_presumption_rate <= Decimal::ONE);
        prop_assert!(rs.social_contribution_presumption_rate >= Decimal::ZERO);
        prop_assert!(rs.social_contribution_presumption_rate <= Decimal::ONE);
        prop_assert_eq!(rs.forbidden, rs.schedule == Schedule::Forbidden);
        prop_assert_eq!(rs.forbidden, rs.forbidden_reason.is_some());
        if rs.source_tier.is_fallback() {
            prop_assert!(rs.note.is_some());
        }
    }

    #[test]
    fn prop_seven_digit_codes_never_reach_default_with_category(
        digits in "[0-9]{7}",
        cat in prop_oneof![
            Just(Category::Commerce),
            Just(Category::Industry),
            Just(Category::Service),
        ],
    ) {
        let rs = resolver().resolve(&digits, Some(cat));
        prop_assert_ne!(rs.source_tier, SourceTier::Default);
    }

    #[test]
    fn prop_cache_is_redundant(
        codes in proptest::collection::vec("[0-9]{4}-[0-9]/[0-9]{2}", 1..40),
        cat in category(),
        capacity in 0usize..8,
    ) {
        let plain = resolver();
        let cached = RuleResolver::with_cache(RuleTables::default(), capacity);
        for code in &codes {
            prop_assert_eq!(plain.resolve(code, cat), cached.resolve(code, cat));
        }
        prop_assert!(cached.cached_entries() <= capacity);
    }
}
