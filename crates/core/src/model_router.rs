//! Picks the cheapest model tier able to handle a message.
//!
//! Routing is a pure function over the message text: an ordered list of
//! complexity signals is tested and the first hit selects the complex tier.
//! Anything else is answered by the standard tier.

use regex::{Regex, RegexBuilder};

use crate::domain::model::{ModelCatalog, ModelSelection, ModelTier};
use crate::errors::DomainError;

pub const STANDARD_QUERY_REASON: &str = "standard query";

/// Complexity signals in evaluation order: (reason label, pattern).
const COMPLEXITY_SIGNALS: &[(&str, &str)] = &[
    (
        "financial analysis",
        r"\b(financ\w*|revenue|profit\w*|margin|p&l|cost analysis|food cost|labou?r cost|budget)\b",
    ),
    (
        "analytical reasoning",
        r"\b(analy[sz]\w*|compar\w*|trend\w*|forecast\w*|insight\w*|why did|correlat\w*)\b",
    ),
    ("report generation", r"\b(report|summary of the (week|month)|monthly summary|weekly summary)\b"),
    (
        "schedule optimization",
        r"\b(optimi[sz]\w* (the )?(schedule|shifts?|rota)|build (the |a )?(schedule|rota)|weekly schedule|staff(ing)? plan)\b",
    ),
    ("research", r"\b(research|investigate|market study|competitors?)\b"),
    (
        "document generation",
        r"\b(generate|create|draft|write) (a |an |the )?(document|pdf|proposal|contract|letter|manual|guide)\b",
    ),
    ("advertising", r"\b(advert\w*|ad campaign|campaign|promot\w*|marketing|social media post)\b"),
    (
        "creative recipe content",
        r"\b(create|invent|design|new) (a |an )?(cocktail|recipe|drink|signature)\w*\b",
    ),
    ("task planning", r"\b(task plan\w*|plan (the )?tasks|planifica\w*|weekly tasks?|zone assign\w*)\b"),
    ("image generation", r"\b(image|picture|photo|poster|illustration|visual)\b"),
];

#[derive(Debug)]
pub struct ModelRouter {
    signals: Vec<(&'static str, Regex)>,
    catalog: ModelCatalog,
}

impl ModelRouter {
    pub fn new(catalog: ModelCatalog) -> Result<Self, regex::Error> {
        let signals = COMPLEXITY_SIGNALS
            .iter()
            .map(|(reason, pattern)| {
                RegexBuilder::new(pattern).case_insensitive(true).build().map(|re| (*reason, re))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { signals, catalog })
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Selects a tier. An explicit override always wins; an override that names
    /// neither a tier nor a configured model is rejected.
    pub fn select(
        &self,
        message: &str,
        model_override: Option<&str>,
    ) -> Result<ModelSelection, DomainError> {
        if let Some(raw) = model_override.filter(|value| !value.trim().is_empty()) {
            let tier = self
                .catalog
                .resolve_override(raw)
                .ok_or_else(|| DomainError::UnknownModelOverride(raw.trim().to_string()))?;
            return Ok(ModelSelection::user_override(tier));
        }

        Ok(self.classify(message))
    }

    pub fn classify(&self, message: &str) -> ModelSelection {
        self.signals
            .iter()
            .find(|(_, pattern)| pattern.is_match(message))
            .map(|(reason, _)| ModelSelection::routed(ModelTier::Complex, *reason))
            .unwrap_or_else(|| ModelSelection::routed(ModelTier::Standard, STANDARD_QUERY_REASON))
    }
}

#[cfg(test)]
mod tests {
    use super::{ModelRouter, STANDARD_QUERY_REASON};
    use crate::domain::model::{ModelCatalog, ModelTier};
    use crate::errors::DomainError;

    fn router() -> ModelRouter {
        match ModelRouter::new(ModelCatalog::default()) {
            Ok(router) => router,
            Err(error) => panic!("signal patterns must compile: {error}"),
        }
    }

    #[test]
    fn simple_lookup_uses_standard_tier() {
        let selection = router().classify("what reservations do we have tonight?");
        assert_eq!(selection.tier, ModelTier::Standard);
        assert_eq!(selection.reason, STANDARD_QUERY_REASON);
        assert!(!selection.is_override);
    }

    #[test]
    fn complexity_signals_select_complex_tier_with_reason() {
        let router = router();
        let cases = [
            ("Can you analyze last month's sales?", "analytical reasoning"),
            ("What was our food cost this week", "financial analysis"),
            ("Please optimize the schedule for next week", "schedule optimization"),
            ("Invent a new cocktail with mezcal", "creative recipe content"),
            ("Make a poster for the quiz night", "image generation"),
            ("Set up the task planning for next week", "task planning"),
        ];

        for (message, reason) in cases {
            let selection = router.classify(message);
            assert_eq!(selection.tier, ModelTier::Complex, "{message}");
            assert_eq!(selection.reason, reason, "{message}");
        }
    }

    #[test]
    fn first_matching_signal_wins() {
        let selection = router().classify("compare revenue between March and April");
        assert_eq!(selection.reason, "financial analysis");
    }

    #[test]
    fn override_wins_regardless_of_content() -> Result<(), DomainError> {
        let router = router();

        let selection = router.select("analyze our profit margins", Some("standard"))?;
        assert_eq!(selection.tier, ModelTier::Standard);
        assert_eq!(selection.reason, "user override");
        assert!(selection.is_override);

        let by_id = router.select("hi", Some(&ModelCatalog::default().complex))?;
        assert_eq!(by_id.tier, ModelTier::Complex);
        Ok(())
    }

    #[test]
    fn unknown_override_is_rejected() {
        let error = router().select("hello", Some("gpt-4o"));
        assert_eq!(error, Err(DomainError::UnknownModelOverride("gpt-4o".to_string())));
    }
}
