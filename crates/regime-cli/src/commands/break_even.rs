use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use regime_core::activity::Category;
use regime_core::breakeven::{analyze_break_even, BreakEvenRequest};
use regime_core::TaxConfig;

use crate::input;

/// Arguments for the Presumido/Real break-even sweep
#[derive(Args)]
pub struct BreakEvenArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// CNAE activity code
    #[arg(long)]
    pub code: Option<String>,

    #[arg(long)]
    pub category: Option<Category>,

    /// State (UF)
    #[arg(long)]
    pub region: Option<String>,

    /// Annual gross revenue
    #[arg(long)]
    pub revenue: Option<Decimal>,

    /// Known annual Lucro Presumido total; computed when omitted
    #[arg(long)]
    pub presumed_total: Option<Decimal>,

    /// Annual payroll
    #[arg(long, default_value = "0")]
    pub payroll: Decimal,

    /// Annual operating expenses other than payroll
    #[arg(long, default_value = "0")]
    pub expenses: Decimal,

    /// Annual PIS/COFINS credit base
    #[arg(long, default_value = "0")]
    pub credits: Decimal,

    /// Tax losses carried from earlier years
    #[arg(long, default_value = "0")]
    pub carried_losses: Decimal,

    /// Portion of revenue from services
    #[arg(long)]
    pub service_revenue: Option<Decimal>,

    /// Revenue outside the PIS/COFINS base (exports, exempt sales)
    #[arg(long, default_value = "0")]
    pub excluded_revenue: Decimal,

    /// Apply the SUDENE/SUDAM IRPJ reduction where the state has one
    #[arg(long)]
    pub regional_incentive: bool,
}

pub fn run_break_even(args: BreakEvenArgs, config: &TaxConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let request: BreakEvenRequest = if let Some(request) = input::read_request(args.input.as_deref())? {
        request
    } else {
        BreakEvenRequest {
            activity_code: args.code.ok_or("--code is required (or provide --input)")?,
            category: args.category,
            region: args.region,
            revenue_annual: args.revenue.ok_or("--revenue is required (or provide --input)")?,
            presumed_total: args.presumed_total,
            payroll_annual: args.payroll,
            operating_expenses: args.expenses,
            credits: args.credits,
            carried_losses: args.carried_losses,
            service_revenue: args.service_revenue,
            excluded_revenue: args.excluded_revenue,
            regional_incentive: args.regional_incentive,
        }
    };
    let result = analyze_break_even(&request, config)?;
    Ok(serde_json::to_value(result)?)
}
