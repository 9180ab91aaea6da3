use serde::{Deserialize, Serialize};

/// Reasoning-model tier. The concrete model ids live in configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Standard,
    Complex,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Complex => "complex",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "complex" => Some(Self::Complex),
            _ => None,
        }
    }

    /// Output token budget handed to the model for this tier.
    pub fn max_output_tokens(&self) -> u32 {
        match self {
            Self::Standard => 4096,
            Self::Complex => 8192,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub tier: ModelTier,
    pub reason: String,
    pub is_override: bool,
}

impl ModelSelection {
    pub fn routed(tier: ModelTier, reason: impl Into<String>) -> Self {
        Self { tier, reason: reason.into(), is_override: false }
    }

    pub fn user_override(tier: ModelTier) -> Self {
        Self { tier, reason: "user override".to_string(), is_override: true }
    }
}

/// Concrete model ids for each tier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelCatalog {
    pub standard: String,
    pub complex: String,
}

impl ModelCatalog {
    pub fn model_id(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Standard => &self.standard,
            ModelTier::Complex => &self.complex,
        }
    }

    /// Resolves an override that names either a tier or one of the configured model ids.
    pub fn resolve_override(&self, value: &str) -> Option<ModelTier> {
        let trimmed = value.trim();
        ModelTier::parse(trimmed).or_else(|| {
            if trimmed == self.standard {
                Some(ModelTier::Standard)
            } else if trimmed == self.complex {
                Some(ModelTier::Complex)
            } else {
                None
            }
        })
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            standard: "claude-haiku-4-5-20251001".to_string(),
            complex: "claude-sonnet-4-5-20250929".to_string(),
        }
    }
}
