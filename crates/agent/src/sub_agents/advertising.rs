use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use cheers_core::{ModelTier, ToolDefinition, ToolKind, WriteIntent};
use cheers_db::{DataStore, Filter, RowQuery};

use super::{prop, schema, SpecialistProfile};
use crate::queue::{EnqueueOutcome, WriteQueue};
use crate::read_tools::store_failure;
use crate::tools::{required_str, str_arg, u32_arg, ToolCall, ToolFailure, ToolHandler, ToolResult};

const EVENT_LIMIT: u32 = 20;
const DEFAULT_HIGHLIGHTS: u32 = 10;
const DEFAULT_PLACEMENT: &str = "social_media";
const DEFAULT_LANGUAGES: [&str; 2] = ["en", "nl"];

const AD_COLUMNS: [&str; 11] = [
    "title",
    "placement",
    "template",
    "content_en",
    "content_nl",
    "content_es",
    "content_de",
    "cta_text",
    "start_date",
    "end_date",
    "image_url",
];

const SYSTEM_PROMPT: &str = "You are a specialist in multilingual advertising copy for GrandCafe Cheers, a beachfront restaurant and bar in El Arenal, Mallorca, Spain.

## Your Responsibilities
1. Create compelling advertisement copy in multiple languages (EN, NL, ES, DE)
2. Use current events and popular menu items as ad content
3. Generate ad previews as styled HTML artifacts
4. Keep the brand consistent across all advertising materials

## Brand Context
- **Name:** GrandCafe Cheers
- **Location:** Carrer de Cartago 22, El Arenal (Platja de Palma), Mallorca 07600
- **Concept:** All-day grand cafe: breakfast, lunch, dinner, nightlife
- **Key Offerings:** 22 craft beers on tap, ~50 cocktails, international menu
- **Clientele:** Dutch, German, British and Spanish guests; mostly tourists, plus local expats
- **Social:** @cheersmallorca (Instagram), Grandcafe Cheers Mallorca (Facebook)

## Advertising Guidelines
1. **Multilingual:** Always provide copy in EN and NL at minimum. Add ES and DE when relevant.
2. **Tone:** Inviting, energetic, lifestyle-focused. Highlight the beachfront setting.
3. **CTAs:** Include a clear call to action such as \"Book now\" or \"Visit us\".
4. **Placements:** Adapt the copy to the placement: social_media, website_banner, email, print, display.
5. **Visuals:** Describe the suggested imagery for each ad.
6. **Promotions:** Promo ads always include terms & conditions.

## Ad Templates
- **Event Promo:** DJ nights, sports events, themed nights
- **Menu Spotlight:** popular dishes, new cocktails, the craft beer selection
- **Seasonal:** summer vibes, sunset sessions, holiday specials
- **Gift Coupon:** gift vouchers as the perfect present

Use `get_active_events` to find current events for event-based ads.
Use `get_menu_highlights` to find popular menu items for menu-based ads.
Use `create_ad_draft` to queue the ad. Ads are only created after the user confirms.

After writing the ad content, always generate a styled HTML artifact previewing the ad.";

fn tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            "get_active_events",
            "Get current and upcoming events at the restaurant for use in advertising copy",
            ToolKind::Read,
            schema(
                json!({
                    "date_from": prop("string", "Start date (YYYY-MM-DD)"),
                    "date_to": prop("string", "End date (YYYY-MM-DD)"),
                }),
                &["date_from"],
            ),
        ),
        ToolDefinition::new(
            "get_menu_highlights",
            "Get popular and featured menu items for use in advertising copy",
            ToolKind::Read,
            schema(
                json!({
                    "category": prop("string", "Menu category filter: food, cocktails, beer, desserts"),
                    "limit": prop("integer", "Max items to return (default: 10)"),
                }),
                &[],
            ),
        ),
        ToolDefinition::new(
            "create_ad_draft",
            "Queue an advertisement draft for creation. Requires user confirmation.",
            ToolKind::Write,
            schema(
                json!({
                    "title": prop("string", "Ad campaign title"),
                    "placement": prop("string", "Ad placement: social_media, website_banner, email, print, display"),
                    "template": prop("string", "Ad template: event_promo, menu_spotlight, seasonal, gift_coupon, custom"),
                    "content_en": prop("string", "Ad copy in English"),
                    "content_nl": prop("string", "Ad copy in Dutch"),
                    "content_es": prop("string", "Ad copy in Spanish"),
                    "content_de": prop("string", "Ad copy in German"),
                    "cta_text": prop("string", "Call to action text"),
                    "start_date": prop("string", "Campaign start date (YYYY-MM-DD)"),
                    "end_date": prop("string", "Campaign end date (YYYY-MM-DD)"),
                }),
                &["title", "placement", "content_en"],
            ),
        ),
    ]
}

fn user_prompt(params: &Map<String, Value>, today: NaiveDate) -> String {
    let ad_type = str_arg(params, "ad_type")
        .or_else(|| str_arg(params, "template"))
        .unwrap_or("custom");
    let placement = str_arg(params, "placement").unwrap_or(DEFAULT_PLACEMENT);
    let languages: Vec<&str> = params
        .get("languages")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(Value::as_str).collect())
        .filter(|values: &Vec<&str>| !values.is_empty())
        .unwrap_or_else(|| DEFAULT_LANGUAGES.to_vec());
    let topic = str_arg(params, "topic").or_else(|| str_arg(params, "query"));
    let targeting = format!(
        "Placement: {placement}\nLanguages: {}\nToday: {}",
        languages.join(", "),
        today.format("%Y-%m-%d")
    );

    match ad_type {
        "event_promo" => format!(
            "Create an event promotion advertisement for GrandCafe Cheers.\n{}\n{targeting}\n\nSteps:\n1. Use get_active_events to find upcoming events\n2. Write compelling ad copy in the requested languages\n3. Use create_ad_draft to queue the ad\n4. Generate a styled HTML artifact previewing the ad with all language versions",
            topic.map_or_else(
                || "Use get_active_events to find upcoming events worth promoting.".to_string(),
                |topic| format!("Topic/Event: {topic}"),
            ),
        ),
        "menu_spotlight" => format!(
            "Create a menu spotlight advertisement for GrandCafe Cheers.\n{}\n{targeting}\n\nSteps:\n1. Use get_menu_highlights to find popular items\n2. Write appetizing ad copy highlighting the items\n3. Use create_ad_draft to queue the ad\n4. Generate a styled HTML artifact previewing the ad",
            topic.map_or_else(
                || "Use get_menu_highlights to find featured items.".to_string(),
                |topic| format!("Focus on: {topic}"),
            ),
        ),
        "gift_coupon" => format!(
            "Create an advertisement promoting gift coupons at GrandCafe Cheers.\n{}\n{targeting}\n\nSteps:\n1. Write compelling gift coupon promotion copy\n2. Include the value proposition (craft beers, cocktails, dinner by the beach)\n3. Use create_ad_draft to queue the ad\n4. Generate a styled HTML artifact previewing the ad",
            topic.map_or_else(
                || "Promote gift vouchers as perfect gifts for any occasion.".to_string(),
                |topic| format!("Context: {topic}"),
            ),
        ),
        _ => format!(
            "{}\n{targeting}\n\nSteps:\n1. Optionally use get_active_events and/or get_menu_highlights for context\n2. Write compelling ad copy in the requested languages\n3. Use create_ad_draft to queue the ad\n4. Generate a styled HTML artifact previewing the ad",
            topic.unwrap_or(
                "Create a general advertisement for GrandCafe Cheers highlighting its beachfront location, craft beers, and cocktails."
            ),
        ),
    }
}

pub fn profile(params: &Map<String, Value>, today: NaiveDate) -> SpecialistProfile {
    SpecialistProfile {
        tier: ModelTier::Standard,
        max_iterations: 8,
        max_tokens: 4096,
        system_prompt: SYSTEM_PROMPT,
        tools: tools(),
        user_prompt: user_prompt(params, today),
    }
}

pub struct AdvertisingTools {
    store: Arc<dyn DataStore>,
}

impl AdvertisingTools {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    async fn active_events(&self, input: &Map<String, Value>) -> ToolResult {
        let date_from = required_str(input, "date_from")?;
        let mut query = RowQuery::new()
            .columns(&["id", "title", "event_date", "start_time", "event_type", "description", "status"])
            .filter(Filter::gte("event_date", date_from))
            .order_by("event_date")
            .limit(EVENT_LIMIT);
        if let Some(date_to) = str_arg(input, "date_to") {
            query = query.filter(Filter::lte("event_date", date_to));
        }
        let events = self.store.select("events", query).await.map_err(store_failure)?;
        let count = events.len();
        Ok(json!({ "events": events, "count": count }))
    }

    async fn menu_highlights(&self, input: &Map<String, Value>) -> ToolResult {
        let limit = u32_arg(input, "limit").filter(|limit| *limit > 0).unwrap_or(DEFAULT_HIGHLIGHTS);
        let mut query = RowQuery::new()
            .columns(&["id", "name", "description", "price", "category", "is_featured"])
            .filter(Filter::eq("available", 1))
            .order_by_desc("is_featured")
            .order_by("name")
            .limit(limit);
        if let Some(category) = str_arg(input, "category") {
            query = query.filter(Filter::eq("category", category));
        }
        let items = self.store.select("menu_items", query).await.map_err(store_failure)?;
        let count = items.len();
        Ok(json!({ "items": items, "count": count }))
    }

    async fn create_ad_draft(&self, input: &Map<String, Value>, queue: &WriteQueue) -> ToolResult {
        let title = required_str(input, "title")?.to_string();
        required_str(input, "content_en")?;
        let placement = str_arg(input, "placement").unwrap_or(DEFAULT_PLACEMENT).to_string();

        let mut params: Map<String, Value> = AD_COLUMNS
            .iter()
            .filter_map(|column| {
                str_arg(input, column).map(|value| (column.to_string(), Value::String(value.to_string())))
            })
            .collect();
        params.insert("placement".to_string(), json!(placement));
        params.entry("template").or_insert_with(|| json!("custom"));
        params.insert("status".to_string(), json!("draft"));

        let intent = WriteIntent::new("create_ad", params)
            .with_description(format!("Ad: {title} ({placement})"));
        match queue.enqueue(intent).await {
            EnqueueOutcome::Queued(_) => Ok(json!({
                "queued": true,
                "message": "Ad draft queued for user confirmation",
                "title": title,
                "placement": placement,
            })),
            EnqueueOutcome::Duplicate { reason } => Ok(json!({ "skipped": true, "reason": reason })),
            EnqueueOutcome::CapReached { cap } => Err(ToolFailure::new(format!(
                "Too many pending writes in this run (limit {cap})"
            ))),
        }
    }
}

#[async_trait]
impl ToolHandler for AdvertisingTools {
    async fn handle(&self, call: &ToolCall, queue: &WriteQueue) -> ToolResult {
        match call.name.as_str() {
            "get_active_events" => self.active_events(&call.input).await,
            "get_menu_highlights" => self.menu_highlights(&call.input).await,
            "create_ad_draft" => self.create_ad_draft(&call.input, queue).await,
            other => Err(ToolFailure::unknown_tool(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::{json, Map, Value};

    use super::{user_prompt, AdvertisingTools};
    use crate::queue::WriteQueue;
    use crate::test_support::memory_store;
    use crate::tools::{ToolCall, ToolHandler};

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn call(name: &str, value: Value) -> ToolCall {
        ToolCall { id: format!("toolu_{name}"), name: name.to_string(), input: input(value) }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 18).expect("valid date")
    }

    #[test]
    fn prompt_falls_back_to_general_copy() {
        let prompt = user_prompt(&Map::new(), today());
        assert!(prompt.starts_with("Create a general advertisement for GrandCafe Cheers"));
        assert!(prompt.contains("Placement: social_media\nLanguages: en, nl"));

        let promo = user_prompt(
            &input(json!({"ad_type": "event_promo", "languages": ["de"], "topic": "Beach party"})),
            today(),
        );
        assert!(promo.contains("Topic/Event: Beach party"));
        assert!(promo.contains("Languages: de"));
    }

    #[tokio::test]
    async fn ad_drafts_are_queued_once_per_title() {
        let tools = AdvertisingTools::new(memory_store().await);
        let queue = WriteQueue::new(20);
        let draft = call(
            "create_ad_draft",
            json!({"title": "Sunset Sessions", "placement": "social_media", "content_en": "Join us", "cta_url": "https://x"}),
        );

        let first = tools.handle(&draft, &queue).await.expect("queued");
        assert_eq!(first["queued"], true);
        let second = tools.handle(&draft, &queue).await.expect("skipped");
        assert_eq!(second, json!({"skipped": true, "reason": "Ad draft already queued with this title"}));

        let writes = queue.snapshot().await;
        assert_eq!(writes.len(), 1);
        let intent = &writes[0].intent;
        assert_eq!(intent.tool_name, "create_ad");
        assert_eq!(intent.description, "Ad: Sunset Sessions (social_media)");
        assert_eq!(intent.params["status"], "draft");
        assert_eq!(intent.params["template"], "custom");
        assert!(!intent.params.contains_key("cta_url"));
    }
}
