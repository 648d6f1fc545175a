use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{CostBreakdown, TokenUsage};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_1m: f64,
    pub output_per_1m: f64,
    pub cache_read_per_1m: f64,
    pub cache_creation_per_1m: f64,
}

const fn rates(input: f64, output: f64, cache_read: f64, cache_creation: f64) -> ModelPricing {
    ModelPricing {
        input_per_1m: input,
        output_per_1m: output,
        cache_read_per_1m: cache_read,
        cache_creation_per_1m: cache_creation,
    }
}

// Cache read is 10% of input, cache creation 125% of input.
const OPUS_4_5: ModelPricing = rates(5.0, 25.0, 0.5, 6.25);
const OPUS_4: ModelPricing = rates(15.0, 75.0, 1.5, 18.75);
const SONNET_4: ModelPricing = rates(3.0, 15.0, 0.3, 3.75);
const HAIKU_4_5: ModelPricing = rates(1.0, 5.0, 0.1, 1.25);
const HAIKU_3_5: ModelPricing = rates(0.8, 4.0, 0.08, 1.0);
const HAIKU_3: ModelPricing = rates(0.25, 1.25, 0.025, 0.3125);

pub const KNOWN_MODEL_PRICING: &[(&str, ModelPricing)] = &[
    ("claude-opus-4-5-20251101", OPUS_4_5),
    ("claude-opus-4-1-20250805", OPUS_4),
    ("claude-opus-4-20250514", OPUS_4),
    ("claude-3-opus-20240229", OPUS_4),
    ("claude-sonnet-4-5-20250929", SONNET_4),
    ("claude-sonnet-4-20250514", SONNET_4),
    ("claude-3-7-sonnet-20250219", SONNET_4),
    ("claude-3-5-sonnet-20241022", SONNET_4),
    ("claude-haiku-4-5-20251001", HAIKU_4_5),
    ("claude-3-5-haiku-20241022", HAIKU_3_5),
    ("claude-3-haiku-20240307", HAIKU_3),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingTier {
    Opus,
    Sonnet,
    Haiku,
    Default,
}

impl PricingTier {
    /// Checked in priority order; the first keyword contained in the model wins.
    const KEYWORDS: [(&'static str, PricingTier); 3] = [
        ("opus", PricingTier::Opus),
        ("sonnet", PricingTier::Sonnet),
        ("haiku", PricingTier::Haiku),
    ];

    pub fn detect(model: &str) -> Self {
        let lower = model.to_ascii_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, tier)| *tier)
            .unwrap_or(PricingTier::Default)
    }

    pub fn pricing(&self) -> ModelPricing {
        match self {
            Self::Opus => OPUS_4_5,
            Self::Sonnet | Self::Default => SONNET_4,
            Self::Haiku => HAIKU_4_5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opus => "opus",
            Self::Sonnet => "sonnet",
            Self::Haiku => "haiku",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricingLookup {
    pub pricing: ModelPricing,
    pub is_fallback: bool,
    pub detected_tier: Option<PricingTier>,
}

pub fn get_model_pricing(model: &str) -> PricingLookup {
    if let Some((_, pricing)) = KNOWN_MODEL_PRICING
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(model))
    {
        return PricingLookup {
            pricing: *pricing,
            is_fallback: false,
            detected_tier: None,
        };
    }
    let tier = PricingTier::detect(model);
    PricingLookup {
        pricing: tier.pricing(),
        is_fallback: true,
        detected_tier: Some(tier),
    }
}

/// Converts token usage into a USD breakdown. Unknown models are priced at
/// their inferred tier and a warning is logged.
pub fn calculate_cost(tokens: &TokenUsage, model: &str) -> CostBreakdown {
    let lookup = get_model_pricing(model);
    if lookup.is_fallback {
        warn!(
            model,
            tier = lookup.detected_tier.map(|tier| tier.as_str()).unwrap_or("default"),
            "no exact pricing for model, using tier fallback"
        );
    }
    let pricing = lookup.pricing;
    CostBreakdown::from_components(
        per_million(tokens.input_tokens, pricing.input_per_1m),
        per_million(tokens.output_tokens, pricing.output_per_1m),
        per_million(tokens.cache_read_input_tokens, pricing.cache_read_per_1m),
        per_million(
            tokens.cache_creation_input_tokens,
            pricing.cache_creation_per_1m,
        ),
    )
}

fn per_million(count: u64, rate: f64) -> f64 {
    (count as f64 / 1_000_000.0) * rate
}
