use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use regime_core::activity::Category;
use regime_core::presumido::calculate_presumido;
use regime_core::real::calculate_real;
use regime_core::simples::calculate_simples;
use regime_core::{FiscalPeriodInput, RegimeInput, TaxConfig};

use crate::input;

/// Arguments shared by the single-regime commands
#[derive(Args)]
pub struct RegimeArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// CNAE activity code
    #[arg(long)]
    pub code: Option<String>,

    /// Category used when the code is not in the tables
    #[arg(long)]
    pub category: Option<Category>,

    /// State (UF) for ISS and regional incentives
    #[arg(long)]
    pub region: Option<String>,

    /// Annual gross revenue
    #[arg(long)]
    pub revenue: Option<Decimal>,

    /// Annual payroll
    #[arg(long, default_value = "0")]
    pub payroll: Decimal,

    /// Annual purchases that generate PIS/COFINS credits
    #[arg(long, default_value = "0")]
    pub creditable_inputs: Decimal,

    /// Length of each period in months; the year is split evenly
    #[arg(long, default_value_t = 3)]
    pub period_months: u32,

    /// Profit margin for Lucro Real (0.10 = 10%)
    #[arg(long)]
    pub margin: Option<Decimal>,
}

/// Split annual figures into equal periods covering twelve months.
pub fn split_year(
    period_months: u32,
    revenue: Decimal,
    payroll: Decimal,
    creditable_inputs: Decimal,
) -> Result<Vec<FiscalPeriodInput>, Box<dyn std::error::Error>> {
    if period_months == 0 || 12 % period_months != 0 {
        return Err(format!(
            "--period-months must divide 12 (got {})",
            period_months
        )
        .into());
    }
    let count = 12 / period_months;
    let n = Decimal::from(count);
    Ok((1..=count)
        .map(|i| FiscalPeriodInput {
            label: Some(match period_months {
                12 => "year".to_string(),
                3 => format!("Q{}", i),
                _ => format!("period {}", i),
            }),
            creditable_inputs: creditable_inputs / n,
            ..FiscalPeriodInput::new(period_months, revenue / n, payroll / n)
        })
        .collect())
}

fn regime_input(args: RegimeArgs) -> Result<RegimeInput, Box<dyn std::error::Error>> {
    if let Some(request) = input::read_request(args.input.as_deref())? {
        return Ok(request);
    }
    let code = args.code.ok_or("--code is required (or provide --input)")?;
    let revenue = args.revenue.ok_or("--revenue is required (or provide --input)")?;
    Ok(RegimeInput {
        activity_code: code,
        category: args.category,
        region: args.region,
        periods: split_year(args.period_months, revenue, args.payroll, args.creditable_inputs)?,
        assumed_margin: args.margin,
    })
}

pub fn run_simples(args: RegimeArgs, config: &TaxConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let request = regime_input(args)?;
    let result = calculate_simples(&request, config)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_presumido(args: RegimeArgs, config: &TaxConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let request = regime_input(args)?;
    let result = calculate_presumido(&request, config)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_real(args: RegimeArgs, config: &TaxConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let request = regime_input(args)?;
    let result = calculate_real(&request, config)?;
    Ok(serde_json::to_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_split_year_into_quarters() {
        let periods = split_year(3, dec!(1_200_000), dec!(120_000), dec!(0)).unwrap();
        assert_eq!(periods.len(), 4);
        assert_eq!(periods[0].revenue, dec!(300_000));
        assert_eq!(periods[3].label.as_deref(), Some("Q4"));
    }

    #[test]
    fn test_split_year_rejects_uneven_periods() {
        assert!(split_year(5, dec!(100), dec!(0), dec!(0)).is_err());
        assert!(split_year(0, dec!(100), dec!(0), dec!(0)).is_err());
    }
}
