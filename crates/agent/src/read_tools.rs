//! Read tools. They query the data store directly and never mutate it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use serde_json::{json, Map, Value};

use cheers_db::{DataStore, DataStoreError, Filter, Row, RowQuery};

use crate::services::ImageGenerator;
use crate::tools::{bool_arg, required_str, str_arg, ToolFailure, ToolResult};

const EVENT_LIMIT: u32 = 50;
const SCHEDULE_LIMIT: u32 = 200;
const AD_LIMIT: u32 = 50;
const RECIPE_MATCH_LIMIT: u32 = 5;

pub(crate) fn store_failure(error: DataStoreError) -> ToolFailure {
    ToolFailure::new(format!("Data query failed: {error}"))
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub(crate) fn number(row: &Row, key: &str) -> f64 {
    match row.get(key) {
        Some(Value::Number(value)) => value.as_f64().unwrap_or(0.0),
        Some(Value::String(value)) => value.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub(crate) fn text<'a>(row: &'a Row, key: &str) -> &'a str {
    row.get(key).and_then(Value::as_str).unwrap_or("")
}

pub(crate) fn is_low_stock(row: &Row) -> bool {
    number(row, "current_stock") <= number(row, "min_stock")
}

fn ids(rows: &[Row], key: &str) -> Vec<Value> {
    let mut seen = Vec::new();
    for row in rows {
        if let Some(id) = row.get(key).filter(|value| value.is_string()) {
            if !seen.contains(id) {
                seen.push(id.clone());
            }
        }
    }
    seen
}

fn listing(key: &str, rows: Vec<Row>) -> Value {
    let count = rows.len();
    let mut body = Map::new();
    body.insert(key.to_string(), Value::Array(rows.into_iter().map(Value::Object).collect()));
    body.insert("count".to_string(), json!(count));
    Value::Object(body)
}

/// Employee names keyed by id, for joining onto rows that reference employees by `key`.
pub(crate) async fn employee_names(
    store: &dyn DataStore,
    rows: &[Row],
    key: &str,
) -> Result<HashMap<String, String>, DataStoreError> {
    let employee_ids = ids(rows, key);
    if employee_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let employees = store
        .select(
            "employees",
            RowQuery::new().columns(&["id", "name"]).filter(Filter::any_of("id", employee_ids)),
        )
        .await?;
    Ok(employees
        .iter()
        .map(|employee| (text(employee, "id").to_string(), text(employee, "name").to_string()))
        .collect())
}

/// Cocktail recipes with their ingredient lists attached.
pub(crate) async fn cocktails_with_ingredients(
    store: &dyn DataStore,
    query: RowQuery,
) -> Result<Vec<Row>, DataStoreError> {
    let mut recipes = store.select("cocktail_recipes", query).await?;
    let menu_item_ids = ids(&recipes, "menu_item_id");
    if menu_item_ids.is_empty() {
        return Ok(recipes);
    }

    let ingredients = store
        .select(
            "menu_ingredients",
            RowQuery::new()
                .filter(Filter::any_of("menu_item_id", menu_item_ids))
                .order_by("ingredient_name"),
        )
        .await?;
    let mut by_item: HashMap<String, Vec<Value>> = HashMap::new();
    for ingredient in ingredients {
        by_item
            .entry(text(&ingredient, "menu_item_id").to_string())
            .or_default()
            .push(Value::Object(ingredient));
    }

    for recipe in &mut recipes {
        let list = by_item.remove(text(recipe, "menu_item_id")).unwrap_or_default();
        recipe.insert("ingredients".to_string(), Value::Array(list));
    }
    Ok(recipes)
}

pub struct ReadTools {
    store: Arc<dyn DataStore>,
    images: Arc<dyn ImageGenerator>,
    today: NaiveDate,
}

impl ReadTools {
    pub fn new(store: Arc<dyn DataStore>, images: Arc<dyn ImageGenerator>, today: NaiveDate) -> Self {
        Self { store, images, today }
    }

    pub async fn execute(&self, name: &str, input: &Map<String, Value>) -> ToolResult {
        match name {
            "get_reservations" => self.reservations(input).await,
            "get_stock_levels" => self.stock_levels(input).await,
            "get_events" => self.events(input).await,
            "get_staff_schedule" => self.staff_schedule(input).await,
            "get_employees" => self.employees(input).await,
            "get_cocktail_recipe" => self.cocktail_recipe(input).await,
            "search_cocktails_by_ingredient" => self.cocktails_by_ingredient(input).await,
            "get_ads" => self.ads(input).await,
            "get_weekly_task_plan" => self.weekly_task_plan(input).await,
            "generate_image" => self.generate_image(input).await,
            other => Err(ToolFailure::unknown_tool(other)),
        }
    }

    async fn reservations(&self, input: &Map<String, Value>) -> ToolResult {
        let date = required_str(input, "date")?;
        let mut query = RowQuery::new()
            .filter(Filter::eq("reservation_date", date))
            .order_by("reservation_time");
        if let Some(status) = str_arg(input, "status") {
            query = query.filter(Filter::eq("status", status));
        }
        let rows = self.store.select("reservations", query).await.map_err(store_failure)?;
        let covers: f64 = rows.iter().map(|row| number(row, "party_size")).sum();
        let mut body = listing("reservations", rows);
        body["total_covers"] = json!(covers as i64);
        Ok(body)
    }

    async fn stock_levels(&self, input: &Map<String, Value>) -> ToolResult {
        let mut query = RowQuery::new().order_by("current_stock").order_by("name");
        if let Some(category) = str_arg(input, "category") {
            query = query.filter(Filter::eq("category", category));
        }
        let mut rows = self.store.select("stock_items", query).await.map_err(store_failure)?;
        if bool_arg(input, "only_low_stock").unwrap_or(false) {
            rows.retain(is_low_stock);
        }
        for row in &mut rows {
            let low = is_low_stock(row);
            row.insert("is_low".to_string(), json!(low));
        }
        Ok(listing("items", rows))
    }

    async fn events(&self, input: &Map<String, Value>) -> ToolResult {
        let date_from = required_str(input, "date_from")?;
        let mut query = RowQuery::new()
            .filter(Filter::gte("event_date", date_from))
            .order_by("event_date")
            .order_by("start_time")
            .limit(EVENT_LIMIT);
        if let Some(date_to) = str_arg(input, "date_to") {
            query = query.filter(Filter::lte("event_date", date_to));
        }
        if let Some(event_type) = str_arg(input, "event_type").filter(|kind| *kind != "all") {
            query = query.filter(Filter::eq("event_type", event_type));
        }
        let rows = self.store.select("events", query).await.map_err(store_failure)?;
        Ok(listing("events", rows))
    }

    async fn staff_schedule(&self, input: &Map<String, Value>) -> ToolResult {
        let date = required_str(input, "date")?;
        let date_to = str_arg(input, "date_to").unwrap_or(date);
        let mut query = RowQuery::new()
            .filter(Filter::gte("shift_date", date))
            .filter(Filter::lte("shift_date", date_to))
            .order_by("shift_date")
            .order_by("start_time")
            .limit(SCHEDULE_LIMIT);
        if let Some(employee_id) = str_arg(input, "employee_id") {
            query = query.filter(Filter::eq("employee_id", employee_id));
        }
        let store = self.store.as_ref();
        let mut rows = store.select("shifts", query).await.map_err(store_failure)?;
        let names = employee_names(store, &rows, "employee_id").await.map_err(store_failure)?;
        for row in &mut rows {
            let name = names.get(text(row, "employee_id")).cloned().unwrap_or_else(|| "Unknown".to_string());
            row.insert("employee_name".to_string(), json!(name));
        }
        Ok(listing("shifts", rows))
    }

    async fn employees(&self, input: &Map<String, Value>) -> ToolResult {
        let mut query = RowQuery::new()
            .columns(&["id", "name", "role", "email", "phone", "status"])
            .order_by("name");
        if let Some(role) = str_arg(input, "role") {
            query = query.filter(Filter::eq("role", role));
        }
        match str_arg(input, "status").unwrap_or("active") {
            "all" => {}
            status => query = query.filter(Filter::eq("status", status)),
        }
        let rows = self.store.select("employees", query).await.map_err(store_failure)?;
        Ok(listing("employees", rows))
    }

    async fn cocktail_recipe(&self, input: &Map<String, Value>) -> ToolResult {
        let query = if let Some(menu_item_id) = str_arg(input, "menu_item_id") {
            RowQuery::new().filter(Filter::eq("menu_item_id", menu_item_id))
        } else if let Some(name) = str_arg(input, "name") {
            RowQuery::new().filter(Filter::like("name", name)).order_by("name").limit(RECIPE_MATCH_LIMIT)
        } else {
            return Err(ToolFailure::new("Provide either name or menu_item_id"));
        };

        let recipes = cocktails_with_ingredients(self.store.as_ref(), query)
            .await
            .map_err(store_failure)?;
        if recipes.is_empty() {
            return Err(ToolFailure::new("Cocktail not found")
                .with_suggestion("Check the spelling or search by ingredient instead."));
        }
        Ok(listing("recipes", recipes))
    }

    async fn cocktails_by_ingredient(&self, input: &Map<String, Value>) -> ToolResult {
        let ingredient = required_str(input, "ingredient")?;
        let store = self.store.as_ref();
        let matches = store
            .select(
                "menu_ingredients",
                RowQuery::new()
                    .columns(&["menu_item_id", "ingredient_name"])
                    .filter(Filter::like("ingredient_name", ingredient)),
            )
            .await
            .map_err(store_failure)?;
        let menu_item_ids = ids(&matches, "menu_item_id");
        if menu_item_ids.is_empty() {
            return Ok(json!({ "ingredient": ingredient, "cocktails": [], "count": 0 }));
        }

        let recipes = store
            .select(
                "cocktail_recipes",
                RowQuery::new()
                    .columns(&["id", "menu_item_id", "name", "glass_type"])
                    .filter(Filter::any_of("menu_item_id", menu_item_ids))
                    .order_by("name"),
            )
            .await
            .map_err(store_failure)?;
        let mut body = listing("cocktails", recipes);
        body["ingredient"] = json!(ingredient);
        Ok(body)
    }

    async fn ads(&self, input: &Map<String, Value>) -> ToolResult {
        let mut query = RowQuery::new().order_by_desc("created_at").limit(AD_LIMIT);
        if let Some(status) = str_arg(input, "status") {
            query = query.filter(Filter::eq("status", status));
        }
        if let Some(placement) = str_arg(input, "placement") {
            query = query.filter(Filter::eq("placement", placement));
        }
        let rows = self.store.select("ads", query).await.map_err(store_failure)?;
        Ok(listing("ads", rows))
    }

    async fn weekly_task_plan(&self, input: &Map<String, Value>) -> ToolResult {
        let week = match str_arg(input, "week_start_date") {
            Some(raw) => raw.to_string(),
            None => week_start(self.today).format("%Y-%m-%d").to_string(),
        };
        let store = self.store.as_ref();
        let plan = store
            .select(
                "weekly_task_plans",
                RowQuery::new().filter(Filter::eq("week_start_date", week.as_str())).limit(1),
            )
            .await
            .map_err(store_failure)?
            .into_iter()
            .next();
        let Some(plan) = plan else {
            return Ok(json!({
                "week_start_date": week,
                "plan": null,
                "message": "No task plan exists for this week yet."
            }));
        };

        let tasks = store
            .select(
                "planned_tasks",
                RowQuery::new()
                    .filter(Filter::eq("plan_id", text(&plan, "id")))
                    .order_by("day_of_week")
                    .order_by("created_at"),
            )
            .await
            .map_err(store_failure)?;
        let mut body = listing("tasks", tasks);
        body["week_start_date"] = json!(week);
        body["plan"] = Value::Object(plan);
        Ok(body)
    }

    async fn generate_image(&self, input: &Map<String, Value>) -> ToolResult {
        let prompt = required_str(input, "prompt")?;
        let purpose = str_arg(input, "purpose").unwrap_or("general");
        let aspect_ratio = str_arg(input, "aspect_ratio").unwrap_or("1:1");
        let image = self
            .images
            .generate(prompt, aspect_ratio)
            .await
            .map_err(|error| ToolFailure::new(format!("Image generation failed: {error}")))?;
        Ok(json!({
            "success": true,
            "image_url": image.url,
            "purpose": purpose,
            "aspect_ratio": image.aspect_ratio,
        }))
    }
}
