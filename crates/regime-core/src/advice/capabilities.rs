use serde::{Deserialize, Serialize};

use crate::config::AdvisorCapabilities;

/// Optional analyses the advisor can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdvisorModule {
    CompensationMix,
    EquityRemuneration,
    CashBasis,
    BookkeepingDistribution,
}

impl AdvisorModule {
    pub const ALL: [AdvisorModule; 4] = [
        AdvisorModule::CompensationMix,
        AdvisorModule::EquityRemuneration,
        AdvisorModule::CashBasis,
        AdvisorModule::BookkeepingDistribution,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AdvisorModule::CompensationMix => "compensation mix",
            AdvisorModule::EquityRemuneration => "interest on equity",
            AdvisorModule::CashBasis => "cash-basis deferral",
            AdvisorModule::BookkeepingDistribution => "bookkeeping distribution",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Available,
    Unavailable { reason: String },
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStatus {
    pub module: AdvisorModule,
    pub availability: Availability,
}

/// Capability flags resolved once into an explicit status per module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub modules: Vec<ModuleStatus>,
}

impl Capabilities {
    pub fn resolve(flags: &AdvisorCapabilities) -> Self {
        let modules = AdvisorModule::ALL
            .into_iter()
            .map(|module| {
                let enabled = match module {
                    AdvisorModule::CompensationMix => flags.compensation_mix,
                    AdvisorModule::EquityRemuneration => flags.equity_remuneration,
                    AdvisorModule::CashBasis => flags.cash_basis,
                    AdvisorModule::BookkeepingDistribution => flags.bookkeeping_distribution,
                };
                let availability = if enabled {
                    Availability::Available
                } else {
                    Availability::Unavailable {
                        reason: format!("{} disabled in configuration", module.label()),
                    }
                };
                ModuleStatus {
                    module,
                    availability,
                }
            })
            .collect();
        Capabilities { modules }
    }

    pub fn is_available(&self, module: AdvisorModule) -> bool {
        self.modules
            .iter()
            .any(|s| s.module == module && s.availability.is_available())
    }

    /// Mark an available module unavailable for this request, e.g. when its
    /// inputs were not supplied.
    pub fn withhold(&mut self, module: AdvisorModule, reason: impl Into<String>) {
        if let Some(status) = self
            .modules
            .iter_mut()
            .find(|s| s.module == module && s.availability.is_available())
        {
            status.availability = Availability::Unavailable {
                reason: reason.into(),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_available_by_default() {
        let caps = Capabilities::resolve(&AdvisorCapabilities::default());
        assert_eq!(caps.modules.len(), 4);
        assert!(AdvisorModule::ALL.iter().all(|m| caps.is_available(*m)));
    }

    #[test]
    fn test_disabled_flag_yields_unavailable_with_reason() {
        let flags = AdvisorCapabilities {
            cash_basis: false,
            ..Default::default()
        };
        let caps = Capabilities::resolve(&flags);
        assert!(!caps.is_available(AdvisorModule::CashBasis));
        let status = caps
            .modules
            .iter()
            .find(|s| s.module == AdvisorModule::CashBasis)
            .unwrap();
        assert!(matches!(
            &status.availability,
            Availability::Unavailable { reason } if reason.contains("disabled")
        ));
    }

    #[test]
    fn test_withhold_keeps_configured_reason() {
        let flags = AdvisorCapabilities {
            equity_remuneration: false,
            ..Default::default()
        };
        let mut caps = Capabilities::resolve(&flags);
        caps.withhold(AdvisorModule::EquityRemuneration, "no equity figures");
        caps.withhold(AdvisorModule::CompensationMix, "no owner figures");
        assert!(!caps.is_available(AdvisorModule::CompensationMix));
        let equity = &caps.modules[1].availability;
        assert!(matches!(equity, Availability::Unavailable { reason } if reason.contains("disabled")));
    }
}
