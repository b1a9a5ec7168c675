use std::fmt;
use std::ops::AddAssign;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::TaxError;
use crate::TaxResult;

/// All monetary values (BRL). Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.15 = 15%). Never as percentages.
pub type Rate = Decimal;

/// Round a monetary amount to centavos, midpoint away from zero.
pub fn round_money(value: Money) -> Money {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// The three statutory regimes a Brazilian company can opt for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Regime {
    #[serde(alias = "simples", alias = "simples_nacional")]
    SimplesNacional,
    #[serde(alias = "presumido", alias = "lucro_presumido")]
    LucroPresumido,
    #[serde(alias = "real", alias = "lucro_real")]
    LucroReal,
}

impl Regime {
    pub const ALL: [Regime; 3] = [
        Regime::SimplesNacional,
        Regime::LucroPresumido,
        Regime::LucroReal,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Regime::SimplesNacional => "Simples Nacional",
            Regime::LucroPresumido => "Lucro Presumido",
            Regime::LucroReal => "Lucro Real",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Regime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "simples" | "simples_nacional" | "simplesnacional" => Ok(Regime::SimplesNacional),
            "presumido" | "lucro_presumido" | "lucropresumido" => Ok(Regime::LucroPresumido),
            "real" | "lucro_real" | "lucroreal" => Ok(Regime::LucroReal),
            other => Err(format!(
                "unknown regime '{other}' (expected simples, presumido or real)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind tax amounts
// ---------------------------------------------------------------------------

/// Tax amounts split by kind. `das` is the Simples Nacional unified payment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBreakdown {
    pub irpj: Money,
    pub irpj_surtax: Money,
    pub csll: Money,
    pub pis: Money,
    pub cofins: Money,
    pub payroll_charges: Money,
    pub iss: Money,
    pub das: Money,
}

impl TaxBreakdown {
    pub fn total(&self) -> Money {
        self.irpj
            + self.irpj_surtax
            + self.csll
            + self.pis
            + self.cofins
            + self.payroll_charges
            + self.iss
            + self.das
    }

    /// Income-type taxes only (IRPJ, surtax, CSLL).
    pub fn income_taxes(&self) -> Money {
        self.irpj + self.irpj_surtax + self.csll
    }

    /// Turnover taxes only (PIS, COFINS).
    pub fn turnover_taxes(&self) -> Money {
        self.pis + self.cofins
    }

    pub fn rounded(&self) -> Self {
        TaxBreakdown {
            irpj: round_money(self.irpj),
            irpj_surtax: round_money(self.irpj_surtax),
            csll: round_money(self.csll),
            pis: round_money(self.pis),
            cofins: round_money(self.cofins),
            payroll_charges: round_money(self.payroll_charges),
            iss: round_money(self.iss),
            das: round_money(self.das),
        }
    }
}

impl AddAssign<&TaxBreakdown> for TaxBreakdown {
    fn add_assign(&mut self, other: &TaxBreakdown) {
        self.irpj += other.irpj;
        self.irpj_surtax += other.irpj_surtax;
        self.csll += other.csll;
        self.pis += other.pis;
        self.cofins += other.cofins;
        self.payroll_charges += other.payroll_charges;
        self.iss += other.iss;
        self.das += other.das;
    }
}

/// Taxes already retained at source by customers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WithheldTaxes {
    pub irpj: Money,
    pub csll: Money,
    pub pis: Money,
    pub cofins: Money,
    pub iss: Money,
}

impl WithheldTaxes {
    pub fn total(&self) -> Money {
        self.irpj + self.csll + self.pis + self.cofins + self.iss
    }
}

// ---------------------------------------------------------------------------
// Period input
// ---------------------------------------------------------------------------

/// Financial figures for one fiscal period (a month, a quarter or a year).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiscalPeriodInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Length of the period in months (1..=12).
    pub months: u32,
    pub revenue: Money,
    pub payroll: Money,
    /// Share of `revenue` that comes from services. `None` means the
    /// activity category decides: all of it for services, none otherwise.
    pub service_revenue: Option<Money>,
    /// Purchases and expenses that generate non-cumulative PIS/COFINS credits.
    pub creditable_inputs: Money,
    pub carried_losses: Money,
    pub regional_incentive: bool,
    pub export_revenue: Money,
    pub exempt_revenue: Money,
    /// Revenue already taxed upstream under tax substitution (monofásico / ST).
    pub tax_substituted_revenue: Money,
    /// Sales into the Manaus free-trade zone (PIS/COFINS zero rate).
    pub free_trade_zone_revenue: Money,
    pub withheld: WithheldTaxes,
    pub trailing_12_revenue: Option<Money>,
    pub trailing_12_payroll: Option<Money>,
}

impl Default for FiscalPeriodInput {
    fn default() -> Self {
        FiscalPeriodInput {
            label: None,
            months: 3,
            revenue: Decimal::ZERO,
            payroll: Decimal::ZERO,
            service_revenue: None,
            creditable_inputs: Decimal::ZERO,
            carried_losses: Decimal::ZERO,
            regional_incentive: false,
            export_revenue: Decimal::ZERO,
            exempt_revenue: Decimal::ZERO,
            tax_substituted_revenue: Decimal::ZERO,
            free_trade_zone_revenue: Decimal::ZERO,
            withheld: WithheldTaxes::default(),
            trailing_12_revenue: None,
            trailing_12_payroll: None,
        }
    }
}

impl FiscalPeriodInput {
    /// A period of `months` months with only revenue and payroll filled in.
    pub fn new(months: u32, revenue: Money, payroll: Money) -> Self {
        FiscalPeriodInput {
            months,
            revenue,
            payroll,
            ..Default::default()
        }
    }

    /// Revenue excluded from the PIS/COFINS base: zero-rated or already taxed.
    pub fn turnover_exclusions(&self) -> Money {
        self.export_revenue
            + self.exempt_revenue
            + self.tax_substituted_revenue
            + self.free_trade_zone_revenue
    }

    pub fn display_label(&self, index: usize) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("period {}", index + 1))
    }

    pub(crate) fn validate(&self, prefix: &str) -> TaxResult<()> {
        if self.months == 0 || self.months > 12 {
            return Err(TaxError::invalid(
                format!("{prefix}.months"),
                "Period length must be between 1 and 12 months",
            ));
        }
        let non_negative = [
            ("revenue", self.revenue),
            ("payroll", self.payroll),
            ("creditable_inputs", self.creditable_inputs),
            ("carried_losses", self.carried_losses),
            ("export_revenue", self.export_revenue),
            ("exempt_revenue", self.exempt_revenue),
            ("tax_substituted_revenue", self.tax_substituted_revenue),
            ("free_trade_zone_revenue", self.free_trade_zone_revenue),
            ("withheld.irpj", self.withheld.irpj),
            ("withheld.csll", self.withheld.csll),
            ("withheld.pis", self.withheld.pis),
            ("withheld.cofins", self.withheld.cofins),
            ("withheld.iss", self.withheld.iss),
        ];
        for (name, value) in non_negative {
            if value < Decimal::ZERO {
                return Err(TaxError::invalid(
                    format!("{prefix}.{name}"),
                    "Amount must be non-negative",
                ));
            }
        }
        if let Some(service) = self.service_revenue {
            if service < Decimal::ZERO || service > self.revenue {
                return Err(TaxError::invalid(
                    format!("{prefix}.service_revenue"),
                    "Service revenue must be between zero and total revenue",
                ));
            }
        }
        if self.turnover_exclusions() > self.revenue {
            return Err(TaxError::invalid(
                prefix.to_string(),
                "Export, exempt, substituted and free-trade-zone revenue exceed total revenue",
            ));
        }
        Ok(())
    }
}

/// Validate a sequence of periods: at least one, each well formed, at most
/// twelve months in total.
pub(crate) fn validate_periods(periods: &[FiscalPeriodInput]) -> TaxResult<()> {
    if periods.is_empty() {
        return Err(TaxError::invalid(
            "periods",
            "At least one fiscal period is required",
        ));
    }
    for (i, p) in periods.iter().enumerate() {
        p.validate(&format!("periods[{i}]"))?;
    }
    let months: u32 = periods.iter().map(|p| p.months).sum();
    if months > 12 {
        return Err(TaxError::invalid(
            "periods",
            format!("Periods cover {months} months; a fiscal year has at most 12"),
        ));
    }
    Ok(())
}

/// Annual revenue implied by the given periods, scaled to twelve months.
pub fn annualized(periods: &[FiscalPeriodInput], field: impl Fn(&FiscalPeriodInput) -> Money) -> Money {
    let months: u32 = periods.iter().map(|p| p.months).sum();
    if months == 0 {
        return Decimal::ZERO;
    }
    let total: Money = periods.iter().map(field).sum();
    total * Decimal::from(12u32) / Decimal::from(months)
}

// ---------------------------------------------------------------------------
// Regime results
// ---------------------------------------------------------------------------

/// Taxes computed for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodResult {
    pub label: String,
    pub months: u32,
    pub revenue: Money,
    pub breakdown: TaxBreakdown,
    pub total: Money,
    pub withheld_credit: Money,
}

impl PeriodResult {
    pub fn new(
        label: String,
        months: u32,
        revenue: Money,
        breakdown: TaxBreakdown,
        withheld: &WithheldTaxes,
    ) -> Self {
        let breakdown = breakdown.rounded();
        let total = breakdown.total();
        PeriodResult {
            label,
            months,
            revenue,
            breakdown,
            total,
            withheld_credit: round_money(withheld.total().min(total)),
        }
    }
}

/// Full-year (or single period) outcome for one regime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeResult {
    pub regime: Regime,
    pub total: Money,
    pub breakdown: TaxBreakdown,
    pub effective_rate: Rate,
    pub ineligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ineligible_reason: Option<String>,
    pub withheld_credit: Money,
    pub net_payable: Money,
    pub periods: Vec<PeriodResult>,
    pub notes: Vec<String>,
}

impl RegimeResult {
    /// Aggregate per-period results into a regime total.
    pub fn from_periods(regime: Regime, periods: Vec<PeriodResult>, notes: Vec<String>) -> Self {
        let mut breakdown = TaxBreakdown::default();
        let mut revenue = Decimal::ZERO;
        let mut withheld_credit = Decimal::ZERO;
        for p in &periods {
            breakdown += &p.breakdown;
            revenue += p.revenue;
            withheld_credit += p.withheld_credit;
        }
        let total = breakdown.total();
        let effective_rate = if revenue > Decimal::ZERO {
            total / revenue
        } else {
            Decimal::ZERO
        };
        RegimeResult {
            regime,
            total,
            breakdown,
            effective_rate,
            ineligible: false,
            ineligible_reason: None,
            withheld_credit,
            net_payable: total - withheld_credit,
            periods,
            notes,
        }
    }

    /// Explicit ineligibility marker: zero amounts, never a zero-rate result.
    pub fn ineligible(regime: Regime, reason: impl Into<String>) -> Self {
        RegimeResult {
            regime,
            total: Decimal::ZERO,
            breakdown: TaxBreakdown::default(),
            effective_rate: Decimal::ZERO,
            ineligible: true,
            ineligible_reason: Some(reason.into()),
            withheld_credit: Decimal::ZERO,
            net_payable: Decimal::ZERO,
            periods: Vec::new(),
            notes: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Regime calculation input
// ---------------------------------------------------------------------------

/// Input shared by the single-regime entry points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeInput {
    pub activity_code: String,
    #[serde(default)]
    pub category: Option<crate::activity::Category>,
    /// State (UF) whose profile supplies ISS and regional incentives.
    #[serde(default)]
    pub region: Option<String>,
    pub periods: Vec<FiscalPeriodInput>,
    /// Profit margin assumed for Lucro Real (0.10 = 10%).
    #[serde(default)]
    pub assumed_margin: Option<Rate>,
}

impl RegimeInput {
    pub fn validate(&self) -> TaxResult<()> {
        if self.activity_code.trim().is_empty() {
            return Err(TaxError::invalid(
                "activity_code",
                "Activity code must not be empty",
            ));
        }
        validate_periods(&self.periods)?;
        if let Some(m) = self.assumed_margin {
            validate_margin("assumed_margin", m)?;
        }
        Ok(())
    }
}

pub(crate) fn validate_margin(field: &str, margin: Rate) -> TaxResult<()> {
    if margin < dec!(0) || margin > dec!(1) {
        return Err(TaxError::invalid(
            field,
            "Margin must be between 0 and 1",
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output envelope
// ---------------------------------------------------------------------------

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
