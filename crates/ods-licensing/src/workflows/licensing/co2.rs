//! CO2-equivalent arithmetic for import line items.
//!
//! Each line item contributes `quantity × volume(kg) × GWP`. `quantity` is the number of
//! containers and always multiplies; `volume` is the fill of a single container. Totals are
//! rounded to two decimal places.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::LineItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MassUnit {
    Gram,
    Kilogram,
    Pound,
    Ounce,
    Ton,
}

impl MassUnit {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "g" | "gram" | "grams" => Some(Self::Gram),
            "kg" | "kgs" | "kilogram" | "kilograms" => Some(Self::Kilogram),
            "lb" | "lbs" | "pound" | "pounds" => Some(Self::Pound),
            "oz" | "ounce" | "ounces" => Some(Self::Ounce),
            "ton" | "tons" | "tonne" | "tonnes" | "t" => Some(Self::Ton),
            _ => None,
        }
    }

    pub const fn kilograms_per_unit(self) -> f64 {
        match self {
            Self::Gram => 0.001,
            Self::Kilogram => 1.0,
            Self::Pound => 0.453592,
            Self::Ounce => 0.0283495,
            Self::Ton => 1000.0,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Gram => "g",
            Self::Kilogram => "kg",
            Self::Pound => "lb",
            Self::Ounce => "oz",
            Self::Ton => "ton",
        }
    }
}

/// What to do with a line item whose unit or GWP cannot be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownFactorPolicy {
    /// Count the line item as zero.
    #[default]
    Ignore,
    /// Fail the calculation.
    Reject,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalculationError {
    #[error("unit '{unit}' on {code} is not a recognised mass unit")]
    UnknownUnit { code: String, unit: String },
    #[error("no GWP value is recorded for {code}")]
    MissingGwp { code: String },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Co2Calculator {
    policy: UnknownFactorPolicy,
}

impl Co2Calculator {
    pub const fn new(policy: UnknownFactorPolicy) -> Self {
        Self { policy }
    }

    pub const fn policy(&self) -> UnknownFactorPolicy {
        self.policy
    }

    /// Unrounded CO2-equivalent contribution of one line item.
    pub fn line_item(&self, item: &LineItem) -> Result<f64, CalculationError> {
        let Some(unit) = MassUnit::parse(&item.unit) else {
            return self.unresolved(CalculationError::UnknownUnit {
                code: item.refrigerant_code.clone(),
                unit: item.unit.clone(),
            });
        };
        let Some(gwp) = item.gwp else {
            return self.unresolved(CalculationError::MissingGwp {
                code: item.refrigerant_code.clone(),
            });
        };

        let kilograms = item.volume * unit.kilograms_per_unit();
        Ok(kilograms * gwp * f64::from(item.quantity))
    }

    pub fn total(&self, items: &[LineItem]) -> Result<f64, CalculationError> {
        let mut total = 0.0;
        for item in items {
            total += self.line_item(item)?;
        }
        Ok(round_co2(total))
    }

    fn unresolved(&self, error: CalculationError) -> Result<f64, CalculationError> {
        match self.policy {
            UnknownFactorPolicy::Ignore => {
                warn!(error = %error, "line item counted as zero CO2-equivalent");
                Ok(0.0)
            }
            UnknownFactorPolicy::Reject => Err(error),
        }
    }
}

/// Round to two decimal places, halves away from zero.
pub fn round_co2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
