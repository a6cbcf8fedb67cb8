use std::fmt;
use std::str::FromStr;

use crate::error::AppError;
use crate::pruning::PruningStrategy;

/// One `<amount><denom>` entry of the minimum gas price list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasPrice {
    pub amount: String,
    pub denom: String,
}

/// Minimum gas prices the application accepts, e.g. `0.01uvigil;1matic`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinGasPrices(Vec<GasPrice>);

impl MinGasPrices {
    pub fn prices(&self) -> &[GasPrice] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for MinGasPrices {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| AppError::InvalidGasPrices {
            value: s.to_string(),
            reason,
        };
        let mut prices = Vec::new();
        for entry in s.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let split = entry
                .find(|c: char| !(c.is_ascii_digit() || c == '.'))
                .ok_or_else(|| invalid(format!("'{}' has no denomination", entry)))?;
            let (amount, denom) = entry.split_at(split);
            if amount.is_empty() || amount.parse::<f64>().is_err() {
                return Err(invalid(format!("'{}' has no valid amount", entry)));
            }
            if !denom.chars().all(|c| c.is_ascii_alphanumeric() || c == '/') {
                return Err(invalid(format!("'{}' has an invalid denomination", entry)));
            }
            prices.push(GasPrice {
                amount: amount.to_string(),
                denom: denom.to_string(),
            });
        }
        Ok(MinGasPrices(prices))
    }
}

impl fmt::Display for MinGasPrices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|p| format!("{}{}", p.amount, p.denom))
            .collect();
        f.write_str(&parts.join(";"))
    }
}

/// Construction options handed to the application unchanged from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppOptions {
    pub pruning: PruningStrategy,
    pub halt_height: Option<u64>,
    /// Unix seconds.
    pub halt_time: Option<u64>,
    pub min_gas_prices: MinGasPrices,
}

/// `0` means no halt.
pub fn halt_from_flag(value: u64) -> Option<u64> {
    (value != 0).then_some(value)
}
