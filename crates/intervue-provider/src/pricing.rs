//! Static per-model price table.

use tracing::debug;

/// Price of one model in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    /// USD per 1M prompt tokens.
    pub input_per_million: f64,
    /// USD per 1M completion tokens.
    pub output_per_million: f64,
}

const PRICES: &[(&str, ModelPrice)] = &[
    (
        "gpt-4o",
        ModelPrice {
            input_per_million: 2.50,
            output_per_million: 10.00,
        },
    ),
    (
        "gpt-4o-mini",
        ModelPrice {
            input_per_million: 0.15,
            output_per_million: 0.60,
        },
    ),
    (
        "claude-3-5-sonnet-latest",
        ModelPrice {
            input_per_million: 3.00,
            output_per_million: 15.00,
        },
    ),
    (
        "claude-3-5-haiku-latest",
        ModelPrice {
            input_per_million: 0.80,
            output_per_million: 4.00,
        },
    ),
    (
        "mock-model",
        ModelPrice {
            input_per_million: 0.0,
            output_per_million: 0.0,
        },
    ),
];

/// Looks up model prices and computes call cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceTable;

impl PriceTable {
    /// Returns the price entry for `model_id`.
    ///
    /// Dated snapshots such as `gpt-4o-mini-2024-07-18` resolve to the
    /// longest matching prefix.
    #[must_use]
    pub fn price(&self, model_id: &str) -> Option<ModelPrice> {
        PRICES
            .iter()
            .filter(|(name, _)| model_id.starts_with(name))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, price)| *price)
    }

    /// Computes the USD cost of a call. Unknown models cost nothing.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn cost(&self, model_id: &str, input_tokens: u64, output_tokens: u64) -> f64 {
        let Some(price) = self.price(model_id) else {
            debug!(model_id, "No price entry for model; recording zero cost");
            return 0.0;
        };
        (input_tokens as f64).mul_add(
            price.input_per_million,
            output_tokens as f64 * price.output_per_million,
        ) / 1_000_000.0
    }
}
