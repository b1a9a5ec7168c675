use pretty_assertions::assert_eq;
use regime_core::advice::{
    build, AdviceCategory, AdviceItem, Availability, EquityPosition, OpportunityLevel,
    OwnerCompensation,
};
use regime_core::config::AdvisorSettings;
use regime_core::summary::{build_summary, MarginSource, TaxProfileInput};
use regime_core::{FiscalPeriodInput, Regime, TaxConfig, TaxError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Aggregator
// ===========================================================================

#[test]
fn test_overlapping_opportunities_summed_once() {
    let tip = AdviceItem::saving("Pay interest on equity (JCP)", "from the tips", dec!(15_143));
    let line = AdviceItem::saving("pay interest on EQUITY (jcp)", "line item", dec!(15_143));
    let report = build(vec![tip, line], dec!(200_000), &AdvisorSettings::default());
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.total_annual_saving, dec!(15_143));
    assert_eq!(report.opportunity_level, OpportunityLevel::Medium);
}

#[test]
fn test_report_level_high() {
    let report = build(
        vec![AdviceItem::saving("Switch to Lucro Real", "", dec!(40_000))],
        dec!(200_000),
        &AdvisorSettings::default(),
    );
    assert_eq!(report.opportunity_level, OpportunityLevel::High);
}

// ===========================================================================
// Summary
// ===========================================================================

fn consultancy() -> TaxProfileInput {
    TaxProfileInput {
        activity_code: "7112-0/00".into(),
        region: Some("SP".into()),
        periods: (1..=4)
            .map(|q| FiscalPeriodInput {
                label: Some(format!("Q{q}")),
                ..FiscalPeriodInput::new(3, dec!(150_000), dec!(15_000))
            })
            .collect(),
        operating_expenses: dec!(200_000),
        owner: Some(OwnerCompensation {
            monthly_pro_labore: dec!(1_518),
            owners: 1,
        }),
        ..Default::default()
    }
}

#[test]
fn test_summary_requires_revenue() {
    let err = build_summary(
        &TaxProfileInput {
            activity_code: "7112-0/00".into(),
            ..Default::default()
        },
        &TaxConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, TaxError::InvalidInput { .. }));
}

#[test]
fn test_summary_small_consultancy() {
    let out = build_summary(&consultancy(), &TaxConfig::default()).unwrap();
    let s = &out.result;

    assert!(!s.periods_synthesized);
    assert_eq!(s.annual_revenue, dec!(600_000));
    assert_eq!(s.real_margin_source, MarginSource::EstimatedFromExpenses);
    // (600 000 − 200 000 − 60 000) / 600 000
    assert_eq!(s.real_margin, dec!(0.5667));

    // Factor R 10% keeps Anexo V: (600 000 × 19.5% − 9 900) / 600 000
    assert_eq!(s.simples.total, dec!(107_100));
    assert_eq!(s.ranking.len(), 3);
    assert_eq!(s.recommended, Some(s.ranking[0].regime));
    assert!(s
        .ranking
        .windows(2)
        .all(|w| w[0].total <= w[1].total));

    // The advisor suggests raising pró-labore to reach Anexo III
    assert!(s
        .advice
        .items
        .iter()
        .any(|i| i.title == "Optimize pró-labore"));
}

#[test]
fn test_summary_lists_unavailable_modules() {
    let out = build_summary(&consultancy(), &TaxConfig::default()).unwrap();
    let caps = &out.result.capabilities;
    // No equity figures, no receivables
    let unavailable: Vec<_> = caps
        .modules
        .iter()
        .filter(|m| !m.availability.is_available())
        .collect();
    assert_eq!(unavailable.len(), 2);
    assert!(unavailable
        .iter()
        .all(|m| matches!(m.availability, Availability::Unavailable { .. })));
}

#[test]
fn test_summary_large_company_real_with_jcp() {
    let input = TaxProfileInput {
        activity_code: "4711-3/02".into(),
        // Supermarket with heavy creditable purchases
        periods: (1..=4)
            .map(|_| FiscalPeriodInput {
                creditable_inputs: dec!(3_500_000),
                ..FiscalPeriodInput::new(3, dec!(5_000_000), dec!(250_000))
            })
            .collect(),
        operating_expenses: dec!(18_500_000),
        equity: Some(EquityPosition {
            net_equity: dec!(5_000_000),
            retained_earnings: dec!(2_000_000),
            annual_profit: dec!(500_000),
        }),
        current_regime: Some(Regime::LucroPresumido),
        ..Default::default()
    };
    let out = build_summary(&input, &TaxConfig::default()).unwrap();
    let s = &out.result;

    assert!(s.simples.ineligible);
    assert_eq!(s.recommended, Some(Regime::LucroReal));
    assert_eq!(s.advice.items[0].category, AdviceCategory::Alert);
    assert!(s.advice.items.iter().any(|i| i.title == "Switch to Lucro Real"));
    assert!(s
        .advice
        .items
        .iter()
        .any(|i| i.title == "Pay interest on equity (JCP)"));
    assert!(s.advice.total_annual_saving > Decimal::ZERO);
}

#[test]
fn test_summary_serializes_to_json() {
    let out = build_summary(&consultancy(), &TaxConfig::default()).unwrap();
    let json = serde_json::to_value(&out).unwrap();
    assert!(json["result"]["simples"]["total"].is_string());
    assert_eq!(json["result"]["recommended"], serde_json::json!(out.result.recommended));
}

#[test]
fn test_break_even_baseline_matches_uneven_quarters() {
    let mut input = consultancy();
    input.periods = (1..=4)
        .map(|q| FiscalPeriodInput {
            label: Some(format!("Q{q}")),
            ..FiscalPeriodInput::new(3, if q == 1 { dec!(1_200_000) } else { dec!(0) }, dec!(0))
        })
        .collect();
    let out = build_summary(&input, &TaxConfig::default()).unwrap();
    let s = &out.result;
    // Surtax is prorated per quarter, so Q1 alone pays more than a flat year would.
    assert_eq!(s.break_even.as_ref().unwrap().current_total, s.presumido.total);
}

#[test]
fn test_break_even_baseline_annualizes_half_year() {
    let mut input = consultancy();
    input.periods.truncate(2);
    let out = build_summary(&input, &TaxConfig::default()).unwrap();
    let s = &out.result;
    assert_eq!(
        s.break_even.as_ref().unwrap().current_total,
        (s.presumido.total * dec!(2)).round_dp(2)
    );
}
