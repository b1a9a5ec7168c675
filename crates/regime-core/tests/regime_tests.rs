use pretty_assertions::assert_eq;
use proptest::prelude::*;
use regime_core::presumido::calculate_presumido;
use regime_core::real::calculate_real;
use regime_core::schedule::{Schedule, ScheduleTables};
use regime_core::simples::{calculate_simples, effective_rate};
use regime_core::{FiscalPeriodInput, Regime, RegimeInput, TaxConfig, TaxError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn quarters(revenue: Decimal, payroll: Decimal) -> Vec<FiscalPeriodInput> {
    (1..=4)
        .map(|q| FiscalPeriodInput {
            label: Some(format!("Q{q}")),
            ..FiscalPeriodInput::new(3, revenue, payroll)
        })
        .collect()
}

fn input(code: &str, periods: Vec<FiscalPeriodInput>) -> RegimeInput {
    RegimeInput {
        activity_code: code.into(),
        category: None,
        region: None,
        periods,
        assumed_margin: None,
    }
}

// ===========================================================================
// Simples Nacional
// ===========================================================================

#[test]
fn test_simples_engineering_below_factor_r() {
    // 7112-0/00 is factor-R sensitive: no payroll keeps it in Anexo V
    let out = calculate_simples(
        &input("7112-0/00", quarters(dec!(600_000), dec!(0))),
        &TaxConfig::default(),
    )
    .unwrap();
    let r = &out.result;
    assert_eq!(r.regime, Regime::SimplesNacional);
    // (2.4M × 23% − 62 100) / 2.4M = 20.4125%
    assert_eq!(r.total, dec!(489_900));
    assert_eq!(r.effective_rate, dec!(0.204125));
    assert!(!r.ineligible);
}

#[test]
fn test_simples_over_ceiling_is_ineligible_not_clamped() {
    let out = calculate_simples(
        &input("4711-3/02", quarters(dec!(1_250_000), dec!(0))),
        &TaxConfig::default(),
    )
    .unwrap();
    assert!(out.result.ineligible);
    assert_eq!(out.result.total, dec!(0));
    assert!(out.result.ineligible_reason.is_some());
    assert!(!out.warnings.is_empty());
}

#[test]
fn test_simples_forbidden_activity() {
    let out = calculate_simples(
        &input("6422-1/00", quarters(dec!(100_000), dec!(0))),
        &TaxConfig::default(),
    )
    .unwrap();
    assert!(out.result.ineligible);
}

#[test]
fn test_simples_zero_revenue_is_zero_rate_not_ineligible() {
    let r = effective_rate(Schedule::AnnexIII, false, dec!(0), None, &TaxConfig::default());
    assert_eq!(r.rate, dec!(0));
    assert!(!r.ineligible);
}

#[test]
fn test_factor_r_threshold_is_inclusive() {
    let config = TaxConfig::default();
    let at = effective_rate(
        Schedule::AnnexV,
        true,
        dec!(1_000_000),
        Some(dec!(280_000)),
        &config,
    );
    assert_eq!(at.applied_schedule, Schedule::AnnexIII);
    let below = effective_rate(
        Schedule::AnnexV,
        true,
        dec!(1_000_000),
        Some(dec!(279_999.99)),
        &config,
    );
    assert_eq!(below.applied_schedule, Schedule::AnnexV);
}

#[test]
fn test_only_sublimit_boundary_is_discontinuous() {
    let tables = ScheduleTables::default();
    for schedule in Schedule::TAXABLE {
        let table = tables.get(schedule).unwrap();
        assert_eq!(table.discontinuities(dec!(0.0000001)), vec![dec!(3_600_000)]);
    }
}

proptest! {
    #[test]
    fn prop_rate_non_decreasing_below_sublimit(
        a in 1u64..360_000_000,
        b in 1u64..360_000_000,
        idx in 0usize..5,
    ) {
        let config = TaxConfig::default();
        let schedule = Schedule::TAXABLE[idx];
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let lo = effective_rate(schedule, false, Decimal::new(lo as i64, 2), None, &config);
        let hi = effective_rate(schedule, false, Decimal::new(hi as i64, 2), None, &config);
        prop_assert!(!lo.ineligible && !hi.ineligible);
        prop_assert!(lo.rate <= hi.rate);
        prop_assert!(hi.rate <= hi.nominal_rate);
        prop_assert!(lo.rate >= Decimal::ZERO);
    }

    #[test]
    fn prop_above_last_ceiling_always_ineligible(extra in 1u64..100_000_000) {
        let config = TaxConfig::default();
        let revenue = dec!(4_800_000) + Decimal::new(extra as i64, 2);
        for schedule in Schedule::TAXABLE {
            let r = effective_rate(schedule, false, revenue, None, &config);
            prop_assert!(r.ineligible);
        }
    }
}

// ===========================================================================
// Lucro Presumido
// ===========================================================================

#[test]
fn test_presumido_road_cargo_year() {
    // 4930-2/01: 8% IRPJ, 12% CSLL presumption; goods-free service revenue
    let out = calculate_presumido(
        &input("4930-2/01", quarters(dec!(500_000), dec!(50_000))),
        &TaxConfig::default(),
    )
    .unwrap();
    let b = &out.result.breakdown;
    // per quarter: IRPJ 40 000 × 15% = 6 000, no surtax (40 000 < 60 000)
    assert_eq!(b.irpj, dec!(24_000));
    assert_eq!(b.irpj_surtax, dec!(0));
    // CSLL 60 000 × 9% = 5 400 per quarter
    assert_eq!(b.csll, dec!(21_600));
    assert_eq!(b.pis, dec!(13_000));
    assert_eq!(b.cofins, dec!(60_000));
    assert_eq!(b.payroll_charges, dec!(55_600));
}

#[test]
fn test_presumido_region_sets_iss() {
    let mut config = TaxConfig::default();
    if let Some(sp) = config.regions.iter_mut().find(|r| r.uf == "SP") {
        sp.iss_rate = dec!(0.02);
    }
    let mut req = input("7112-0/00", quarters(dec!(100_000), dec!(0)));
    req.region = Some("sp".into());
    let out = calculate_presumido(&req, &config).unwrap();
    assert_eq!(out.result.breakdown.iss, dec!(8_000));
}

#[test]
fn test_unknown_region_warns_and_uses_generic() {
    let mut req = input("7112-0/00", quarters(dec!(100_000), dec!(0)));
    req.region = Some("XX".into());
    let out = calculate_presumido(&req, &TaxConfig::default()).unwrap();
    assert!(out.warnings.iter().any(|w| w.contains("XX")));
    assert_eq!(out.result.breakdown.iss, dec!(20_000));
}

#[test]
fn test_empty_periods_rejected() {
    let err = calculate_presumido(&input("7112-0/00", vec![]), &TaxConfig::default()).unwrap_err();
    assert!(matches!(err, TaxError::InvalidInput { .. }));
}

// ===========================================================================
// Lucro Real
// ===========================================================================

#[test]
fn test_real_loss_cap_across_year() {
    let mut periods = quarters(dec!(1_000_000), dec!(0));
    periods[0].carried_losses = dec!(500_000);
    let mut req = input("7112-0/00", periods);
    req.assumed_margin = Some(dec!(0.10));
    let out = calculate_real(&req, &TaxConfig::default()).unwrap();
    // profit 100 000 per quarter; at most 30 000 offset per quarter
    for p in &out.result.periods {
        // (100 000 − 30 000) × 15%
        assert_eq!(p.breakdown.irpj, dec!(10_500));
    }
    assert!(out.result.notes.iter().any(|n| n.contains("380000")));
}

#[test]
fn test_real_incentive_in_sudam_state() {
    let mut periods = quarters(dec!(1_000_000), dec!(0));
    for p in &mut periods {
        p.regional_incentive = true;
    }
    let mut req = input("7112-0/00", periods);
    req.region = Some("PA".into());
    req.assumed_margin = Some(dec!(0.20));
    let out = calculate_real(&req, &TaxConfig::default()).unwrap();
    let q = &out.result.periods[0].breakdown;
    // base 200 000: IRPJ 30 000 × 25%; surtax (200 000 − 60 000) × 10%
    assert_eq!(q.irpj, dec!(7_500));
    assert_eq!(q.irpj_surtax, dec!(14_000));
}
