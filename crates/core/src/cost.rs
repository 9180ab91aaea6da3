//! Token cost estimates in USD.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::conversation::TokenUsage;
use crate::domain::model::ModelTier;

/// List prices per million tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TierPricing {
    pub input_per_million: Decimal,
    pub output_per_million: Decimal,
}

impl TierPricing {
    pub fn for_tier(tier: ModelTier) -> Self {
        match tier {
            ModelTier::Standard => {
                Self { input_per_million: Decimal::new(1, 0), output_per_million: Decimal::new(5, 0) }
            }
            ModelTier::Complex => Self {
                input_per_million: Decimal::new(3, 0),
                output_per_million: Decimal::new(15, 0),
            },
        }
    }
}

/// Cache writes bill at 1.25x the input rate, cache reads at 0.1x.
const CACHE_WRITE_MULTIPLIER: Decimal = Decimal::from_parts(125, 0, 0, false, 2);
const CACHE_READ_MULTIPLIER: Decimal = Decimal::from_parts(1, 0, 0, false, 1);
const MILLION: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub usd: Decimal,
    /// Share of prompt tokens served from cache, as a percentage with one decimal.
    pub cache_hit_rate: Decimal,
}

pub fn estimate(tier: ModelTier, usage: &TokenUsage) -> CostEstimate {
    let pricing = TierPricing::for_tier(tier);
    let input_rate = pricing.input_per_million / MILLION;
    let output_rate = pricing.output_per_million / MILLION;

    let usd = Decimal::from(usage.input_tokens) * input_rate
        + Decimal::from(usage.cache_write_tokens) * input_rate * CACHE_WRITE_MULTIPLIER
        + Decimal::from(usage.cache_read_tokens) * input_rate * CACHE_READ_MULTIPLIER
        + Decimal::from(usage.output_tokens) * output_rate;

    CostEstimate { usd: usd.round_dp(6), cache_hit_rate: cache_hit_rate(usage) }
}

pub fn cache_hit_rate(usage: &TokenUsage) -> Decimal {
    let prompt_tokens = usage.input_tokens + usage.cache_write_tokens + usage.cache_read_tokens;
    if prompt_tokens == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(usage.cache_read_tokens) * Decimal::ONE_HUNDRED / Decimal::from(prompt_tokens))
        .round_dp(1)
}
