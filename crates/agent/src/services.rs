//! Image and document collaborators used by specific tools.
//!
//! Their payloads are opaque to the assistant: bytes or text out, or an error.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0} is not configured")]
    Unavailable(&'static str),
    #[error("service request failed: {0}")]
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GeneratedImage {
    pub url: String,
    pub prompt: String,
    pub aspect_ratio: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenderedDocument {
    pub file_name: String,
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl RenderedDocument {
    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, aspect_ratio: &str) -> Result<GeneratedImage, ServiceError>;
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// A printable recipe card for one cocktail record.
    async fn render_recipe(&self, title: &str, recipe: &Value) -> Result<RenderedDocument, ServiceError>;

    /// A spreadsheet export of tabular rows.
    async fn render_sheet(
        &self,
        file_stem: &str,
        columns: &[&str],
        rows: &[Vec<String>],
    ) -> Result<RenderedDocument, ServiceError>;
}

/// Image generation is not wired to a provider; every call fails as a tool error.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnconfiguredImages;

#[async_trait]
impl ImageGenerator for UnconfiguredImages {
    async fn generate(&self, _prompt: &str, _aspect_ratio: &str) -> Result<GeneratedImage, ServiceError> {
        Err(ServiceError::Unavailable("image generation"))
    }
}

/// Renders recipe cards as markdown and sheets as CSV.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTextDocuments;

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn slug(value: &str) -> String {
    let slug: String = value
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch.to_ascii_lowercase() } else { '-' })
        .collect();
    slug.split('-').filter(|part| !part.is_empty()).collect::<Vec<_>>().join("-")
}

#[async_trait]
impl DocumentRenderer for PlainTextDocuments {
    async fn render_recipe(&self, title: &str, recipe: &Value) -> Result<RenderedDocument, ServiceError> {
        let mut body = format!("# {title}\n");
        if let Some(glass) = recipe.get("glass_type").and_then(Value::as_str) {
            body.push_str(&format!("\nGlass: {glass}"));
        }
        if let Some(garnish) = recipe.get("garnish").and_then(Value::as_str) {
            body.push_str(&format!("\nGarnish: {garnish}"));
        }
        if let Some(ingredients) = recipe.get("ingredients").and_then(Value::as_array) {
            body.push_str("\n\n## Ingredients\n");
            for ingredient in ingredients {
                let name = ingredient.get("ingredient_name").and_then(Value::as_str).unwrap_or("?");
                let quantity = ingredient.get("quantity").map(Value::to_string).unwrap_or_default();
                let unit = ingredient.get("unit").and_then(Value::as_str).unwrap_or("");
                body.push_str(&format!("- {name}: {quantity} {unit}\n"));
            }
        }
        if let Some(steps) = recipe.get("preparation_steps").and_then(Value::as_str) {
            body.push_str(&format!("\n## Preparation\n{steps}\n"));
        }

        Ok(RenderedDocument {
            file_name: format!("{}-recipe.md", slug(title)),
            mime_type: "text/markdown".to_string(),
            bytes: body.into_bytes(),
        })
    }

    async fn render_sheet(
        &self,
        file_stem: &str,
        columns: &[&str],
        rows: &[Vec<String>],
    ) -> Result<RenderedDocument, ServiceError> {
        let mut csv = columns.iter().map(|column| csv_field(column)).collect::<Vec<_>>().join(",");
        csv.push('\n');
        for row in rows {
            csv.push_str(&row.iter().map(|field| csv_field(field)).collect::<Vec<_>>().join(","));
            csv.push('\n');
        }

        Ok(RenderedDocument {
            file_name: format!("{}.csv", slug(file_stem)),
            mime_type: "text/csv".to_string(),
            bytes: csv.into_bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{DocumentRenderer, PlainTextDocuments};

    #[tokio::test]
    async fn sheets_quote_fields_that_need_it() {
        let document = PlainTextDocuments
            .render_sheet(
                "Schedule 2026-03-16",
                &["employee", "notes"],
                &[vec!["Ana".to_string(), "late, \"maybe\"".to_string()]],
            )
            .await
            .expect("sheet");

        assert_eq!(document.file_name, "schedule-2026-03-16.csv");
        let text = String::from_utf8(document.bytes).expect("utf8");
        assert_eq!(text, "employee,notes\nAna,\"late, \"\"maybe\"\"\"\n");
    }

    #[tokio::test]
    async fn recipe_cards_list_ingredients() {
        let recipe = json!({
            "glass_type": "highball",
            "ingredients": [{"ingredient_name": "White rum", "quantity": 50, "unit": "ml"}],
            "preparation_steps": "Muddle mint, add rum, top with soda."
        });
        let document = PlainTextDocuments.render_recipe("Mojito", &recipe).await.expect("card");
        let text = String::from_utf8(document.bytes).expect("utf8");
        assert!(text.starts_with("# Mojito\n\nGlass: highball"));
        assert!(text.contains("- White rum: 50 ml"));
        assert_eq!(document.file_name, "mojito-recipe.md");
    }
}
