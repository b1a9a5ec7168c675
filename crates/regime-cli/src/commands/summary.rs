use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use regime_core::activity::Category;
use regime_core::advice::{EquityPosition, OwnerCompensation};
use regime_core::summary::{build_summary, TaxProfileInput};
use regime_core::{Regime, TaxConfig};

use crate::input;

/// Arguments for the full regime comparison
#[derive(Args)]
pub struct SummaryArgs {
    /// Path to JSON/YAML company profile (overrides individual flags)
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

    /// Annual payroll
    #[arg(long)]
    pub payroll: Option<Decimal>,

    /// Annual operating expenses other than payroll
    #[arg(long, default_value = "0")]
    pub expenses: Decimal,

    /// Profit margin for Lucro Real (0.10 = 10%)
    #[arg(long)]
    pub margin: Option<Decimal>,

    /// Regime the company is enrolled in today
    #[arg(long)]
    pub current_regime: Option<Regime>,

    /// Monthly pró-labore per owner
    #[arg(long)]
    pub pro_labore: Option<Decimal>,

    /// Number of owners drawing pró-labore
    #[arg(long, default_value_t = 1)]
    pub owners: u32,

    /// Net equity, enables the JCP analysis together with --annual-profit
    #[arg(long)]
    pub net_equity: Option<Decimal>,

    #[arg(long, default_value = "0")]
    pub retained_earnings: Decimal,

    /// Profit for the year before JCP
    #[arg(long)]
    pub annual_profit: Option<Decimal>,

    /// Receivables open at year end, enables the cash-basis analysis
    #[arg(long, default_value = "0")]
    pub receivables: Decimal,
}

fn profile(args: SummaryArgs) -> Result<TaxProfileInput, Box<dyn std::error::Error>> {
    if let Some(profile) = input::read_request(args.input.as_deref())? {
        return Ok(profile);
    }
    let equity = match (args.net_equity, args.annual_profit) {
        (Some(net_equity), Some(annual_profit)) => Some(EquityPosition {
            net_equity,
            retained_earnings: args.retained_earnings,
            annual_profit,
        }),
        (None, None) => None,
        _ => return Err("--net-equity and --annual-profit must be given together".into()),
    };
    Ok(TaxProfileInput {
        activity_code: args.code.ok_or("--code is required (or provide --input)")?,
        category: args.category,
        region: args.region,
        annual_revenue: Some(args.revenue.ok_or("--revenue is required (or provide --input)")?),
        annual_payroll: args.payroll,
        periods: Vec::new(),
        operating_expenses: args.expenses,
        assumed_margin: args.margin,
        current_regime: args.current_regime,
        owner: args.pro_labore.map(|monthly_pro_labore| OwnerCompensation {
            monthly_pro_labore,
            owners: args.owners,
        }),
        equity,
        year_end_receivables: args.receivables,
    })
}

pub fn run_summary(args: SummaryArgs, config: &TaxConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let request = profile(args)?;
    let result = build_summary(&request, config)?;
    Ok(serde_json::to_value(result)?)
}
