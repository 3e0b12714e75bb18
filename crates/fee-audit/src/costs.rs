//! Weekly cost block defaults and per-run overrides
//!
//! Every section carries the same six cost rows. Wage, super and the fuel
//! inputs default to zero for manual entry in the workbook; running costs
//! default to a weekly formula.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;

use crate::constants;
use crate::formula::Formula;
use crate::records::RunId;

/// Value of one cost input
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CostSetting {
    /// A fixed weekly amount
    Amount(Decimal),
    /// Weekday count x daily rate + weekly surcharge
    Weekly {
        daily_rate: Decimal,
        weekly_surcharge: Decimal,
    },
}

impl CostSetting {
    /// Formula for a `Weekly` setting, `None` for a fixed amount
    pub fn formula(&self) -> Option<Formula> {
        match self {
            CostSetting::Amount(_) => None,
            CostSetting::Weekly {
                daily_rate,
                weekly_surcharge,
            } => Some(
                Formula::number(constants::WEEKDAYS as i64)
                    .times(Formula::number(*daily_rate))
                    .plus(Formula::number(*weekly_surcharge)),
            ),
        }
    }
}

impl Default for CostSetting {
    fn default() -> Self {
        CostSetting::Amount(Decimal::ZERO)
    }
}

/// The five cost inputs of a section (fuel total is always derived)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostSheet {
    pub wage: CostSetting,
    pub superannuation: CostSetting,
    pub running_costs: CostSetting,
    pub fuel_liters: CostSetting,
    pub fuel_cost_per_liter: CostSetting,
}

impl Default for CostSheet {
    fn default() -> Self {
        Self {
            wage: CostSetting::default(),
            superannuation: CostSetting::default(),
            running_costs: CostSetting::Weekly {
                daily_rate: Decimal::from(constants::DEFAULT_DAILY_RUNNING_COST),
                weekly_surcharge: Decimal::from(constants::DEFAULT_WEEKLY_SURCHARGE),
            },
            fuel_liters: CostSetting::default(),
            fuel_cost_per_liter: CostSetting::default(),
        }
    }
}

/// Partial cost sheet, as written in config.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CostOverrides {
    pub wage: Option<CostSetting>,
    #[serde(rename = "super")]
    pub superannuation: Option<CostSetting>,
    pub running_costs: Option<CostSetting>,
    pub fuel_liters: Option<CostSetting>,
    pub fuel_cost_per_liter: Option<CostSetting>,
}

impl CostSheet {
    /// Copy of this sheet with every field the overrides set replaced
    pub fn with_overrides(&self, overrides: &CostOverrides) -> Self {
        let pick = |over: &Option<CostSetting>, base: &CostSetting| over.clone().unwrap_or_else(|| base.clone());
        Self {
            wage: pick(&overrides.wage, &self.wage),
            superannuation: pick(&overrides.superannuation, &self.superannuation),
            running_costs: pick(&overrides.running_costs, &self.running_costs),
            fuel_liters: pick(&overrides.fuel_liters, &self.fuel_liters),
            fuel_cost_per_liter: pick(&overrides.fuel_cost_per_liter, &self.fuel_cost_per_liter),
        }
    }
}

/// Global cost defaults plus run-specific overrides
#[derive(Debug, Clone, Default)]
pub struct CostBook {
    defaults: CostSheet,
    runs: HashMap<RunId, CostOverrides>,
}

impl CostBook {
    pub fn new(defaults: CostSheet, runs: HashMap<RunId, CostOverrides>) -> Self {
        Self { defaults, runs }
    }

    /// Effective cost sheet for one run
    pub fn for_run(&self, run: &RunId) -> CostSheet {
        match self.runs.get(run) {
            Some(overrides) => self.defaults.with_overrides(overrides),
            None => self.defaults.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_running_costs_formula() {
        let sheet = CostSheet::default();
        let formula = sheet.running_costs.formula().unwrap();
        assert_eq!(formula.render(0), "=5*140+65");
        assert_eq!(sheet.wage, CostSetting::Amount(Decimal::ZERO));
        assert!(sheet.fuel_liters.formula().is_none());
    }

    #[test]
    fn test_run_override_replaces_only_listed_fields() {
        let mut runs = HashMap::new();
        runs.insert(
            RunId::parse("12").unwrap(),
            CostOverrides {
                running_costs: Some(CostSetting::Amount(dec!(900))),
                fuel_liters: Some(CostSetting::Amount(dec!(120))),
                ..CostOverrides::default()
            },
        );
        let book = CostBook::new(CostSheet::default(), runs);

        let overridden = book.for_run(&RunId::parse("012").unwrap());
        assert_eq!(overridden.running_costs, CostSetting::Amount(dec!(900)));
        assert_eq!(overridden.fuel_liters, CostSetting::Amount(dec!(120)));
        assert_eq!(overridden.wage, CostSetting::Amount(Decimal::ZERO));

        let untouched = book.for_run(&RunId::parse("5").unwrap());
        assert_eq!(untouched, CostSheet::default());
    }

    #[test]
    fn test_settings_deserialize_from_toml() {
        let overrides: CostOverrides = toml::from_str(
            r#"
            super = 85.5
            running_costs = { daily_rate = 150, weekly_surcharge = 80 }
            "#,
        )
        .unwrap();

        assert_eq!(overrides.superannuation, Some(CostSetting::Amount(dec!(85.5))));
        let running = overrides.running_costs.unwrap();
        assert_eq!(running.formula().unwrap().render(0), "=5*150+80");
    }
}
