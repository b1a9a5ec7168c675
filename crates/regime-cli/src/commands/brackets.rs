use std::time::Instant;

use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use serde_json::{json, Value};

use regime_core::schedule::Schedule;
use regime_core::simples::effective_rate;
use regime_core::{with_metadata, TaxConfig};

/// Rate gap above which a bracket boundary is reported as a jump.
const JUMP_TOLERANCE: Decimal = dec!(0.0000001);

/// Arguments for bracket table inspection
#[derive(Args)]
pub struct BracketsArgs {
    /// Only this annex (I, II, III, IV or V)
    #[arg(long)]
    pub schedule: Option<Schedule>,

    /// Look up the effective rate at this trailing-twelve-month revenue
    #[arg(long)]
    pub revenue: Option<Decimal>,

    /// Trailing-twelve-month payroll, applies Factor R to Anexo V
    #[arg(long)]
    pub payroll: Option<Decimal>,
}

#[derive(Serialize)]
struct BracketRow {
    schedule: Schedule,
    bracket: usize,
    floor: Decimal,
    ceiling: Decimal,
    nominal_rate: Decimal,
    deduction: Decimal,
    effective_rate_at_ceiling: Decimal,
    rate_jump_above: bool,
}

pub fn run_brackets(args: BracketsArgs, config: &TaxConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let schedules: Vec<Schedule> = match args.schedule {
        Some(Schedule::Forbidden) => {
            return Err("the forbidden schedule has no bracket table".into())
        }
        Some(s) => vec![s],
        None => Schedule::TAXABLE.to_vec(),
    };

    if let Some(revenue) = args.revenue {
        let lookups: Vec<_> = schedules
            .iter()
            .map(|&s| {
                let factor_r = args.payroll.is_some() && s.factor_r_alternate() != s;
                effective_rate(s, factor_r, revenue, args.payroll, config)
            })
            .collect();
        let assumptions = json!({
            "revenue": revenue.to_string(),
            "factor_r_payroll": args.payroll.map(|p| p.to_string()),
        });
        let output = with_metadata(
            "Effective rate = (RBT12 × nominal − deduction) / RBT12",
            &assumptions,
            Vec::new(),
            start.elapsed().as_micros() as u64,
            lookups,
        );
        return Ok(serde_json::to_value(output)?);
    }

    let mut rows = Vec::new();
    let mut warnings = Vec::new();
    for schedule in schedules {
        let table = config
            .schedules
            .get(schedule)
            .ok_or_else(|| format!("no bracket table for {}", schedule))?;
        let jumps = table.discontinuities(JUMP_TOLERANCE);
        for ceiling in &jumps {
            warnings.push(format!(
                "{}: effective rate jumps when revenue crosses {}",
                schedule, ceiling
            ));
        }
        let mut floor = Decimal::ZERO;
        for (i, b) in table.brackets.iter().enumerate() {
            rows.push(BracketRow {
                schedule,
                bracket: i + 1,
                floor,
                ceiling: b.ceiling,
                nominal_rate: b.nominal_rate,
                deduction: b.deduction,
                effective_rate_at_ceiling: b.effective_rate_at(b.ceiling).round_dp(6),
                rate_jump_above: jumps.contains(&b.ceiling),
            });
            floor = b.ceiling;
        }
    }

    let assumptions = json!({ "jump_tolerance": JUMP_TOLERANCE.to_string() });
    let output = with_metadata(
        "Simples Nacional annex tables (LC 123/2006, LC 155/2016)",
        &assumptions,
        warnings,
        start.elapsed().as_micros() as u64,
        rows,
    );
    Ok(serde_json::to_value(output)?)
}
