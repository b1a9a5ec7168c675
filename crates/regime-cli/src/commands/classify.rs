use clap::Args;
use serde_json::Value;

use regime_core::activity::{classify_activity, Category, ClassifyInput};
use regime_core::TaxConfig;

use crate::input;

/// Arguments for activity classification
#[derive(Args)]
pub struct ClassifyArgs {
    /// CNAE code, with or without separators (e.g. 7112-0/00 or 7112000)
    pub code: Option<String>,

    /// Path to JSON/YAML input file (overrides positional code)
    #[arg(long)]
    pub input: Option<String>,

    /// Category used when no code or prefix rule matches
    #[arg(long)]
    pub category: Option<Category>,
}

pub fn run_classify(args: ClassifyArgs, config: &TaxConfig) -> Result<Value, Box<dyn std::error::Error>> {
    let request: ClassifyInput = match (args.code, args.input.as_deref()) {
        (Some(code), None) => ClassifyInput {
            activity_code: code,
            category: args.category,
        },
        (_, path) => input::read_request(path)?
            .ok_or("activity code is required (or provide --input)")?,
    };
    let result = classify_activity(&request, config)?;
    Ok(serde_json::to_value(result)?)
}
