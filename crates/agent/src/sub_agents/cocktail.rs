use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use cheers_core::{ModelTier, ToolDefinition, ToolKind};
use cheers_db::{DataStore, Filter, Row, RowQuery};

use super::{prop, schema, SpecialistProfile};
use crate::queue::WriteQueue;
use crate::read_tools::{cocktails_with_ingredients, is_low_stock, number, store_failure, text};
use crate::services::{DocumentRenderer, ImageGenerator};
use crate::tools::{required_str, str_arg, ToolCall, ToolFailure, ToolHandler, ToolResult};

const DETAIL_MATCHES: u32 = 3;
const CREATIVE_TASKS: [&str; 4] = ["recipe_card_image", "recipe_pdf", "menu_analysis", "create_recipe"];

const SYSTEM_PROMPT: &str = "You are the expert mixologist for GrandCafe Cheers, a Mediterranean beach bar & restaurant in El Arenal, Mallorca, Spain.

## Your Expertise
- Deep knowledge of the house cocktails: recipes, ingredients, glassware and preparation techniques
- Signature cocktail: \"Cheers to You!\", the house special with a Mediterranean twist
- Stock awareness: you can check ingredient availability and tell what can or cannot be prepared
- Multilingual: EN, NL, ES, DE

## Capabilities
1. **Recipe Lookup**: full recipe details with ingredients, steps, glass and garnish
2. **Stock Check**: whether the ingredients for a cocktail are in stock right now
3. **Missing Ingredients**: cocktails that cannot be made because of stock shortages
4. **Recipe Card Image**: a recipe card image generated from the real recipe
5. **Recipe PDF**: a downloadable recipe card document
6. **Menu Analysis**: variety, pricing and coverage of the cocktail menu
7. **New Recipes**: new creations built from ingredients the bar already stocks

## Response Style
- Professional but warm, Mediterranean vibe
- Use cocktail terminology correctly (muddled, shaken, stirred, layered)
- Include practical tips for bartenders
- Always mention the glass type and garnish
- Sign creative content with: 🍸 Cheers to great cocktails!

## Important
- Use the tools to fetch real data. Never invent recipe details for existing cocktails.
- For images and PDFs, collect the recipe data first, then generate.
- Prices are in EUR (€).";

fn tools() -> Vec<ToolDefinition> {
    let cocktail_name = || prop("string", "Cocktail name to look up (partial match)");
    vec![
        ToolDefinition::new(
            "get_all_cocktails",
            "Get a summary list of all cocktail recipes on the menu",
            ToolKind::Read,
            schema(json!({}), &[]),
        ),
        ToolDefinition::new(
            "get_cocktail_detail",
            "Get full recipe details for a specific cocktail by name (partial match)",
            ToolKind::Read,
            schema(json!({ "name": prop("string", "Cocktail name or partial name to search for") }), &["name"]),
        ),
        ToolDefinition::new(
            "check_ingredient_stock",
            "Check current stock levels for the ingredients of a specific cocktail",
            ToolKind::Read,
            schema(json!({ "cocktail_name": cocktail_name() }), &["cocktail_name"]),
        ),
        ToolDefinition::new(
            "get_missing_ingredients",
            "Find cocktails that cannot be prepared because an ingredient is out of stock or below minimum",
            ToolKind::Read,
            schema(json!({}), &[]),
        ),
        ToolDefinition::new(
            "generate_recipe_card_image",
            "Generate a recipe card image for a cocktail using AI image generation",
            ToolKind::Read,
            schema(
                json!({
                    "cocktail_name": cocktail_name(),
                    "style": prop("string", "Image style: elegant, tropical, modern, vintage (default: elegant)"),
                }),
                &["cocktail_name"],
            ),
        ),
        ToolDefinition::new(
            "create_recipe_pdf",
            "Generate a downloadable recipe card document with ingredients and steps",
            ToolKind::Read,
            schema(json!({ "cocktail_name": cocktail_name() }), &["cocktail_name"]),
        ),
    ]
}

fn user_prompt(params: &Map<String, Value>) -> String {
    let task = str_arg(params, "task").unwrap_or("custom");
    let cocktail = str_arg(params, "cocktail_name").unwrap_or("");
    let query = str_arg(params, "query");
    let language = str_arg(params, "language").unwrap_or("en");

    match task {
        "recipe_lookup" => format!(
            "Look up the full recipe for \"{cocktail}\". Include all ingredients with quantities, preparation steps, glass type and garnish. Language: {language}."
        ),
        "stock_check" => format!(
            "Check if we have all ingredients in stock to prepare \"{cocktail}\". Report what is available, what is missing or low, and whether we can make it."
        ),
        "missing_ingredients" => "Analyze our entire cocktail menu against current stock levels. Which cocktails can't we prepare right now? List them with the missing ingredients.".to_string(),
        "recipe_card_image" => format!(
            "Generate a recipe card image for \"{cocktail}\". First look up the recipe details, then generate the image."
        ),
        "recipe_pdf" => format!(
            "Generate a recipe card document for \"{cocktail}\" with all details including ingredients, steps and glassware."
        ),
        "menu_analysis" => "Analyze our complete cocktail menu. Get all cocktails and give insights on variety, pricing, base spirits and glassware, and recommend improvements.".to_string(),
        "create_recipe" => format!(
            "Design a new cocktail for the house menu. Brief: {}. Check stock so the recipe only uses ingredients we carry, then present it as a markdown recipe card with ingredients, quantities, method, glass and garnish. Language: {language}.",
            query.unwrap_or(if cocktail.is_empty() { "a refreshing Mediterranean beach cocktail" } else { cocktail })
        ),
        _ => query.map(str::to_string).unwrap_or_else(|| {
            format!(
                "Assist with a cocktail-related question: {}",
                if cocktail.is_empty() { "general cocktail question" } else { cocktail }
            )
        }),
    }
}

/// Lookups run on the standard tier; creative and analytical tasks on the complex tier.
pub fn tier_for_task(task: &str) -> ModelTier {
    if CREATIVE_TASKS.contains(&task) {
        ModelTier::Complex
    } else {
        ModelTier::Standard
    }
}

pub fn profile(params: &Map<String, Value>) -> SpecialistProfile {
    SpecialistProfile {
        tier: tier_for_task(str_arg(params, "task").unwrap_or("custom")),
        max_iterations: 8,
        max_tokens: 4096,
        system_prompt: SYSTEM_PROMPT,
        tools: tools(),
        user_prompt: user_prompt(params),
    }
}

fn not_found(name: &str) -> ToolFailure {
    ToolFailure::new(format!("Cocktail \"{name}\" not found"))
        .with_suggestion("Use get_all_cocktails to see the exact names on the menu.")
}

fn ingredients(recipe: &Row) -> &[Value] {
    recipe.get("ingredients").and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

pub struct CocktailTools {
    store: Arc<dyn DataStore>,
    images: Arc<dyn ImageGenerator>,
    documents: Arc<dyn DocumentRenderer>,
}

impl CocktailTools {
    pub fn new(
        store: Arc<dyn DataStore>,
        images: Arc<dyn ImageGenerator>,
        documents: Arc<dyn DocumentRenderer>,
    ) -> Self {
        Self { store, images, documents }
    }

    async fn find(&self, name: &str, limit: u32) -> Result<Vec<Row>, ToolFailure> {
        cocktails_with_ingredients(
            self.store.as_ref(),
            RowQuery::new().filter(Filter::like("name", name)).order_by("name").limit(limit),
        )
        .await
        .map_err(store_failure)
    }

    async fn find_one(&self, name: &str) -> Result<Row, ToolFailure> {
        self.find(name, 1).await?.into_iter().next().ok_or_else(|| not_found(name))
    }

    async fn all_cocktails(&self) -> ToolResult {
        let store = self.store.as_ref();
        let recipes = store
            .select(
                "cocktail_recipes",
                RowQuery::new()
                    .columns(&["id", "menu_item_id", "name", "glass_type", "garnish"])
                    .order_by("name"),
            )
            .await
            .map_err(store_failure)?;
        let menu_ids: Vec<Value> =
            recipes.iter().filter_map(|recipe| recipe.get("menu_item_id").cloned()).collect();
        let menu: HashMap<String, Row> = if menu_ids.is_empty() {
            HashMap::new()
        } else {
            store
                .select(
                    "menu_items",
                    RowQuery::new()
                        .columns(&["id", "price", "available", "is_featured"])
                        .filter(Filter::any_of("id", menu_ids)),
                )
                .await
                .map_err(store_failure)?
                .into_iter()
                .map(|item| (text(&item, "id").to_string(), item))
                .collect()
        };

        let cocktails: Vec<Value> = recipes
            .into_iter()
            .map(|mut recipe| {
                if let Some(item) = menu.get(text(&recipe, "menu_item_id")) {
                    for column in ["price", "available", "is_featured"] {
                        if let Some(value) = item.get(column) {
                            recipe.insert(column.to_string(), value.clone());
                        }
                    }
                }
                Value::Object(recipe)
            })
            .collect();
        let count = cocktails.len();
        Ok(json!({ "cocktails": cocktails, "count": count }))
    }

    async fn detail(&self, input: &Map<String, Value>) -> ToolResult {
        let name = required_str(input, "name")?;
        let cocktails = self.find(name, DETAIL_MATCHES).await?;
        if cocktails.is_empty() {
            return Err(ToolFailure::new(format!("No cocktail found matching \"{name}\"")));
        }
        Ok(json!({ "cocktails": cocktails }))
    }

    async fn stock_items(&self, ids: Vec<Value>) -> Result<HashMap<String, Row>, ToolFailure> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        Ok(self
            .store
            .select("stock_items", RowQuery::new().filter(Filter::any_of("id", ids)))
            .await
            .map_err(store_failure)?
            .into_iter()
            .map(|item| (text(&item, "id").to_string(), item))
            .collect())
    }

    async fn ingredient_stock(&self, input: &Map<String, Value>) -> ToolResult {
        let name = required_str(input, "cocktail_name")?;
        let recipe = self.find_one(name).await?;
        let linked: Vec<Value> = ingredients(&recipe)
            .iter()
            .filter_map(|ingredient| ingredient.get("stock_item_id").filter(|id| id.is_string()).cloned())
            .collect();
        let stock = self.stock_items(linked).await?;

        let checks: Vec<Value> = ingredients(&recipe)
            .iter()
            .map(|ingredient| {
                let product = ingredient
                    .get("stock_item_id")
                    .and_then(Value::as_str)
                    .and_then(|id| stock.get(id));
                json!({
                    "ingredient": ingredient.get("ingredient_name"),
                    "required_qty": ingredient.get("quantity"),
                    "required_unit": ingredient.get("unit"),
                    "in_stock": product.map(|item| number(item, "current_stock")),
                    "stock_unit": product.map(|item| text(item, "unit")),
                    "below_minimum": product.map(is_low_stock),
                    "product_found": product.is_some(),
                })
            })
            .collect();
        let can_prepare = checks
            .iter()
            .all(|check| check["product_found"] == true && check["below_minimum"] == false);

        Ok(json!({
            "cocktail": text(&recipe, "name"),
            "stock_checks": checks,
            "can_prepare": can_prepare,
        }))
    }

    async fn missing_ingredients(&self) -> ToolResult {
        let cocktails = cocktails_with_ingredients(self.store.as_ref(), RowQuery::new().order_by("name"))
            .await
            .map_err(store_failure)?;
        let low: HashSet<String> = self
            .store
            .select("stock_items", RowQuery::new().columns(&["id", "current_stock", "min_stock"]))
            .await
            .map_err(store_failure)?
            .iter()
            .filter(|item| is_low_stock(item))
            .map(|item| text(item, "id").to_string())
            .collect();

        let unavailable: Vec<Value> = cocktails
            .iter()
            .filter_map(|recipe| {
                let missing: Vec<&Value> = ingredients(recipe)
                    .iter()
                    .filter(|ingredient| {
                        ingredient
                            .get("stock_item_id")
                            .and_then(Value::as_str)
                            .is_some_and(|id| low.contains(id))
                    })
                    .filter_map(|ingredient| ingredient.get("ingredient_name"))
                    .collect();
                (!missing.is_empty())
                    .then(|| json!({ "cocktail": text(recipe, "name"), "missing_ingredients": missing }))
            })
            .collect();

        Ok(json!({
            "total_unavailable": unavailable.len(),
            "unavailable_cocktails": unavailable,
            "total_cocktails": cocktails.len(),
        }))
    }

    async fn recipe_card_image(&self, input: &Map<String, Value>) -> ToolResult {
        let name = required_str(input, "cocktail_name")?;
        let style = str_arg(input, "style").unwrap_or("elegant");
        let prompt = format!(
            "Professional cocktail recipe card for \"{name}\". Style: {style}. Mediterranean restaurant setting, served on the bar counter, soft warm lighting. No text overlays. High-end food photography for GrandCafe Cheers, a Mallorca beach bar."
        );
        let image = self
            .images
            .generate(&prompt, "1:1")
            .await
            .map_err(|error| ToolFailure::new(format!("Image generation failed: {error}")))?;
        Ok(json!({
            "success": true,
            "cocktail_name": name,
            "style": style,
            "image_url": image.url,
            "note": "Image generated. Reference it in your answer with an image artifact.",
        }))
    }

    async fn recipe_pdf(&self, input: &Map<String, Value>) -> ToolResult {
        let name = required_str(input, "cocktail_name")?;
        let recipe = self.find_one(name).await?;
        let title = text(&recipe, "name").to_string();
        let document = self
            .documents
            .render_recipe(&title, &Value::Object(recipe))
            .await
            .map_err(|error| ToolFailure::new(format!("Document generation failed: {error}")))?;
        Ok(json!({
            "success": true,
            "cocktail_name": title,
            "file_name": document.file_name,
            "mime_type": document.mime_type,
            "size_bytes": document.size_bytes(),
            "note": "Recipe card generated and available for download.",
        }))
    }
}

#[async_trait]
impl ToolHandler for CocktailTools {
    async fn handle(&self, call: &ToolCall, _queue: &WriteQueue) -> ToolResult {
        match call.name.as_str() {
            "get_all_cocktails" => self.all_cocktails().await,
            "get_cocktail_detail" => self.detail(&call.input).await,
            "check_ingredient_stock" => self.ingredient_stock(&call.input).await,
            "get_missing_ingredients" => self.missing_ingredients().await,
            "generate_recipe_card_image" => self.recipe_card_image(&call.input).await,
            "create_recipe_pdf" => self.recipe_pdf(&call.input).await,
            other => Err(ToolFailure::unknown_tool(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Map, Value};

    use cheers_core::ModelTier;
    use cheers_db::{DataStore, Row};

    use super::{tier_for_task, user_prompt, CocktailTools};
    use crate::queue::WriteQueue;
    use crate::services::{PlainTextDocuments, UnconfiguredImages};
    use crate::test_support::memory_store;
    use crate::tools::{ToolCall, ToolHandler};

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    fn call(name: &str, input: Value) -> ToolCall {
        ToolCall { id: format!("toolu_{name}"), name: name.to_string(), input: row(input) }
    }

    async fn seeded() -> (Arc<dyn DataStore>, CocktailTools) {
        let store = memory_store().await;
        for (id, name, current, min) in [("rum", "White Rum", 6.0, 2.0), ("mint", "Fresh Mint", 0.0, 1.0)] {
            store
                .insert(
                    "stock_items",
                    row(json!({"id": id, "name": name, "category": "bar", "current_stock": current, "min_stock": min})),
                )
                .await
                .expect("stock item");
        }
        store
            .insert("menu_items", row(json!({"id": "m-mojito", "name": "Mojito", "category": "cocktails", "price": "9.50"})))
            .await
            .expect("menu item");
        store
            .insert(
                "cocktail_recipes",
                row(json!({"id": "c-mojito", "menu_item_id": "m-mojito", "name": "Mojito", "glass_type": "highball"})),
            )
            .await
            .expect("recipe");
        for (stock_item, ingredient) in [("rum", "White rum"), ("mint", "Mint leaves")] {
            store
                .insert(
                    "menu_ingredients",
                    row(json!({"menu_item_id": "m-mojito", "stock_item_id": stock_item, "ingredient_name": ingredient, "quantity": 1})),
                )
                .await
                .expect("ingredient");
        }
        let tools = CocktailTools::new(
            Arc::clone(&store),
            Arc::new(UnconfiguredImages),
            Arc::new(PlainTextDocuments),
        );
        (store, tools)
    }

    #[test]
    fn creative_tasks_use_the_complex_tier() {
        assert_eq!(tier_for_task("menu_analysis"), ModelTier::Complex);
        assert_eq!(tier_for_task("stock_check"), ModelTier::Standard);
        assert!(user_prompt(&Map::new()).starts_with("Assist with a cocktail-related question"));
    }

    #[tokio::test]
    async fn stock_check_flags_low_ingredients() {
        let (_store, tools) = seeded().await;
        let queue = WriteQueue::new(20);

        let check = tools
            .handle(&call("check_ingredient_stock", json!({"cocktail_name": "moji"})), &queue)
            .await
            .expect("stock check");
        assert_eq!(check["cocktail"], "Mojito");
        assert_eq!(check["can_prepare"], false);

        let missing = tools
            .handle(&call("get_missing_ingredients", json!({})), &queue)
            .await
            .expect("missing ingredients");
        assert_eq!(missing["total_unavailable"], 1);
        assert_eq!(missing["unavailable_cocktails"][0]["missing_ingredients"], json!(["Mint leaves"]));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_cocktails_and_missing_images_are_tool_failures() {
        let (_store, tools) = seeded().await;
        let queue = WriteQueue::new(20);

        let missing = tools
            .handle(&call("create_recipe_pdf", json!({"cocktail_name": "Negroni"})), &queue)
            .await
            .expect_err("unknown cocktail");
        assert_eq!(missing.message, "Cocktail \"Negroni\" not found");

        let image = tools
            .handle(&call("generate_recipe_card_image", json!({"cocktail_name": "Mojito"})), &queue)
            .await
            .expect_err("image service unconfigured");
        assert!(image.message.starts_with("Image generation failed"));

        let pdf = tools
            .handle(&call("create_recipe_pdf", json!({"cocktail_name": "Mojito"})), &queue)
            .await
            .expect("recipe card");
        assert_eq!(pdf["cocktail_name"], "Mojito");
    }
}
