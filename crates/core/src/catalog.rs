//! Tool catalog handed to the reasoning model.
//!
//! The catalog order and schemas are part of the cached prompt prefix, so
//! entries are declared once here and never reordered at runtime.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Queries data or calls a side-effect free service.
    Read,
    /// Mutates data; only ever queued for confirmation.
    Write,
    /// Hands a task to a specialist sub-agent.
    Delegate,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    #[serde(skip)]
    pub kind: ToolKind,
}

impl ToolDefinition {
    pub fn new(name: &str, description: &str, kind: ToolKind, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
            kind,
        }
    }

    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    pub fn required_fields(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

pub const RESERVATION_STATUSES: [&str; 6] =
    ["pending", "confirmed", "seated", "completed", "cancelled", "no_show"];
pub const EVENT_TYPES: [&str; 4] = ["dj_night", "sports", "themed", "private"];
pub const PRIORITIES: [&str; 4] = ["low", "medium", "high", "urgent"];
pub const AD_STATUSES: [&str; 5] = ["draft", "active", "paused", "completed", "archived"];
pub const AD_PLACEMENTS: [&str; 5] = ["social_media", "website_banner", "email", "print", "display"];
pub const AD_TEMPLATES: [&str; 5] =
    ["event_promo", "menu_spotlight", "seasonal", "gift_coupon", "custom"];

fn object(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

fn string(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

fn enumeration(values: &[&str], description: &str) -> Value {
    json!({ "type": "string", "enum": values, "description": description })
}

/// Every tool the primary assistant knows about, in catalog order.
pub fn assistant_tools() -> &'static [ToolDefinition] {
    static TOOLS: OnceLock<Vec<ToolDefinition>> = OnceLock::new();
    TOOLS.get_or_init(build_assistant_tools)
}

pub fn find_tool(name: &str) -> Option<&'static ToolDefinition> {
    assistant_tools().iter().find(|tool| tool.name == name)
}

pub fn tool_kind(name: &str) -> Option<ToolKind> {
    find_tool(name).map(ToolDefinition::kind)
}

fn build_assistant_tools() -> Vec<ToolDefinition> {
    use ToolKind::{Delegate, Read, Write};

    vec![
        ToolDefinition::new(
            "get_reservations",
            "Get reservations for a date. Returns guest name, party size, time, table, status, special requests.",
            Read,
            object(
                json!({
                    "date": string("Date (YYYY-MM-DD)"),
                    "status": enumeration(&RESERVATION_STATUSES, "Filter by reservation status"),
                }),
                &["date"],
            ),
        ),
        ToolDefinition::new(
            "get_stock_levels",
            "Get current stock levels. Can filter by category or show only items at or below minimum stock.",
            Read,
            object(
                json!({
                    "category": string("Filter by category: food, drink, beer, wine, spirits, supplies"),
                    "only_low_stock": { "type": "boolean", "description": "Only show items at or below minimum stock level" },
                }),
                &[],
            ),
        ),
        ToolDefinition::new(
            "get_events",
            "Get scheduled events (DJ nights, sports broadcasts, themed nights) for a date range.",
            Read,
            object(
                json!({
                    "date_from": string("Start date (YYYY-MM-DD)"),
                    "date_to": string("End date (YYYY-MM-DD)"),
                    "event_type": enumeration(&["dj_night", "sports", "themed", "private", "all"], "Filter by event type"),
                }),
                &["date_from"],
            ),
        ),
        ToolDefinition::new(
            "get_staff_schedule",
            "Get staff schedules for a date or date range. Returns who is working, their shift times and role.",
            Read,
            object(
                json!({
                    "date": string("Date to check (YYYY-MM-DD)"),
                    "date_to": string("End date for range"),
                    "employee_id": string("Filter by specific employee"),
                }),
                &["date"],
            ),
        ),
        ToolDefinition::new(
            "get_employees",
            "List employees with role and status. Can filter by role or status.",
            Read,
            object(
                json!({
                    "role": string("Filter by role (kitchen, bar, waiter, dj, manager)"),
                    "status": enumeration(&["active", "inactive", "all"], "Filter by employment status (default: active)"),
                }),
                &[],
            ),
        ),
        ToolDefinition::new(
            "get_cocktail_recipe",
            "Get the full recipe for a cocktail including ingredients, preparation steps, glass type and garnish. Search by name or menu_item_id.",
            Read,
            object(
                json!({
                    "name": string("Cocktail name (or partial name) to search for"),
                    "menu_item_id": string("UUID of the menu item (if known)"),
                }),
                &[],
            ),
        ),
        ToolDefinition::new(
            "search_cocktails_by_ingredient",
            "Find all cocktails that use a specific spirit or ingredient.",
            Read,
            object(
                json!({ "ingredient": string("Ingredient or spirit name to search for (e.g., 'vodka', 'Campari')") }),
                &["ingredient"],
            ),
        ),
        ToolDefinition::new(
            "get_ads",
            "List advertisements with optional filters. Returns ad title, placement, template, status and content.",
            Read,
            object(
                json!({
                    "status": enumeration(&AD_STATUSES, "Filter by ad status"),
                    "placement": enumeration(&AD_PLACEMENTS, "Filter by ad placement"),
                }),
                &[],
            ),
        ),
        ToolDefinition::new(
            "get_weekly_task_plan",
            "Get the weekly task plan for a week. Returns all planned tasks with day, assignment and priority.",
            Read,
            object(
                json!({ "week_start_date": string("Monday date of the week (YYYY-MM-DD). Defaults to current week.") }),
                &[],
            ),
        ),
        ToolDefinition::new(
            "generate_image",
            "Generate an image for social media posts, menu visualization, event promos or marketing materials. Returns a URL to the generated image.",
            Read,
            object(
                json!({
                    "prompt": string("Description of the image to generate"),
                    "purpose": enumeration(&["social_post", "menu_item", "event_promo", "marketing", "general"], "Purpose of the image"),
                    "aspect_ratio": enumeration(&["1:1", "4:3", "16:9", "9:16"], "Image aspect ratio (default: 1:1)"),
                }),
                &["prompt", "purpose"],
            ),
        ),
        ToolDefinition::new(
            "create_reservation",
            "Create a new reservation. Requires guest name, party size, date and time. Requires confirmation.",
            Write,
            object(
                json!({
                    "guest_name": string("Name of the guest"),
                    "party_size": { "type": "integer", "description": "Number of guests (1-50)" },
                    "reservation_date": string("Reservation date (YYYY-MM-DD)"),
                    "reservation_time": string("Reservation time (HH:MM)"),
                    "guest_phone": string("Guest phone number"),
                    "guest_email": string("Guest email address"),
                    "special_requests": string("Special requests or notes"),
                    "table_id": string("UUID of table to assign (optional)"),
                }),
                &["guest_name", "party_size", "reservation_date", "reservation_time"],
            ),
        ),
        ToolDefinition::new(
            "update_reservation_status",
            "Update the status of a reservation (confirm, cancel, mark as seated, completed, or no-show). Requires confirmation.",
            Write,
            object(
                json!({
                    "reservation_id": string("UUID of the reservation"),
                    "status": enumeration(&RESERVATION_STATUSES, "New status"),
                }),
                &["reservation_id", "status"],
            ),
        ),
        ToolDefinition::new(
            "assign_table",
            "Assign or reassign a table to a reservation. Requires confirmation.",
            Write,
            object(
                json!({
                    "reservation_id": string("UUID of the reservation"),
                    "table_id": string("UUID of the table to assign"),
                }),
                &["reservation_id", "table_id"],
            ),
        ),
        ToolDefinition::new(
            "create_event",
            "Create a new event (DJ night, sports broadcast, themed night, private event). Requires confirmation.",
            Write,
            object(
                json!({
                    "title": string("Event title"),
                    "event_date": string("Event date (YYYY-MM-DD)"),
                    "start_time": string("Start time (HH:MM)"),
                    "end_time": string("End time (HH:MM)"),
                    "event_type": enumeration(&EVENT_TYPES, "Type of event"),
                    "description": string("Event description"),
                }),
                &["title", "event_date", "start_time"],
            ),
        ),
        ToolDefinition::new(
            "update_event",
            "Update an existing event's details. Requires confirmation.",
            Write,
            object(
                json!({
                    "event_id": string("UUID of the event to update"),
                    "title": string("Updated title"),
                    "event_date": string("Updated date (YYYY-MM-DD)"),
                    "start_time": string("Updated start time (HH:MM)"),
                    "end_time": string("Updated end time (HH:MM)"),
                    "event_type": enumeration(&EVENT_TYPES, "Updated event type"),
                    "description": string("Updated description"),
                    "status": string("Updated status"),
                }),
                &["event_id"],
            ),
        ),
        ToolDefinition::new(
            "create_shift",
            "Create a work shift for an employee. Requires employee_id, date, start and end times. Requires confirmation.",
            Write,
            object(
                json!({
                    "employee_id": string("UUID of the employee"),
                    "date": string("Shift date (YYYY-MM-DD)"),
                    "start_time": string("Shift start time (HH:MM)"),
                    "end_time": string("Shift end time (HH:MM)"),
                    "role": string("Role for this shift (e.g., kitchen, bar, waiter)"),
                }),
                &["employee_id", "date", "start_time", "end_time"],
            ),
        ),
        ToolDefinition::new(
            "update_shift",
            "Update an existing shift's times or role. Look up the shift first with get_staff_schedule. Requires confirmation.",
            Write,
            object(
                json!({
                    "shift_id": string("UUID of the shift to update"),
                    "start_time": string("New start time (HH:MM)"),
                    "end_time": string("New end time (HH:MM)"),
                    "role": string("New role for this shift"),
                }),
                &["shift_id"],
            ),
        ),
        ToolDefinition::new(
            "record_stock_movement",
            "Record a stock movement. Use movement_type 'in' for deliveries and 'out' for consumption. Requires confirmation.",
            Write,
            object(
                json!({
                    "product_id": string("UUID of the product"),
                    "quantity": { "type": "number", "description": "Quantity moved (positive number)" },
                    "movement_type": enumeration(&["in", "out"], "Direction: 'in' = received, 'out' = consumed"),
                    "notes": string("Optional notes about the movement"),
                    "date": string("Date of movement (YYYY-MM-DD). Defaults to today."),
                }),
                &["product_id", "quantity", "movement_type"],
            ),
        ),
        ToolDefinition::new(
            "create_ad",
            "Create an advertisement with multilingual content. Requires title, placement and English content. Requires confirmation.",
            Write,
            object(
                json!({
                    "title": string("Ad campaign title"),
                    "placement": enumeration(&AD_PLACEMENTS, "Ad placement type"),
                    "template": enumeration(&AD_TEMPLATES, "Ad template type"),
                    "content_en": string("Ad copy in English"),
                    "content_nl": string("Ad copy in Dutch"),
                    "content_es": string("Ad copy in Spanish"),
                    "content_de": string("Ad copy in German"),
                    "cta_text": string("Call to action text"),
                    "start_date": string("Start date (YYYY-MM-DD)"),
                    "end_date": string("End date (YYYY-MM-DD)"),
                }),
                &["title", "placement", "content_en"],
            ),
        ),
        ToolDefinition::new(
            "update_ad",
            "Update an existing advertisement's status, content, or scheduling. Requires confirmation.",
            Write,
            object(
                json!({
                    "ad_id": string("UUID of the advertisement to update"),
                    "status": enumeration(&AD_STATUSES, "Updated status"),
                    "title": string("Updated title"),
                    "content_en": string("Updated English content"),
                    "start_date": string("Updated start date (YYYY-MM-DD)"),
                    "end_date": string("Updated end date (YYYY-MM-DD)"),
                }),
                &["ad_id"],
            ),
        ),
        ToolDefinition::new(
            "create_task",
            "Create an ad-hoc task assigned to an employee with priority and due date. Requires confirmation.",
            Write,
            object(
                json!({
                    "title": string("Task title"),
                    "description": string("Task description"),
                    "assignee_id": string("UUID of the employee to assign to"),
                    "priority": enumeration(&PRIORITIES, "Task priority (default: medium)"),
                    "due_date": string("Due date (YYYY-MM-DD)"),
                }),
                &["title", "assignee_id"],
            ),
        ),
        ToolDefinition::new(
            "update_task_status",
            "Update a task's status, assignment, or priority. Requires confirmation.",
            Write,
            object(
                json!({
                    "task_id": string("UUID of the task"),
                    "status": enumeration(&["pending", "in_progress", "completed", "cancelled"], "New task status"),
                    "assignee_id": string("New assignee UUID"),
                    "priority": enumeration(&PRIORITIES, "New priority"),
                }),
                &["task_id"],
            ),
        ),
        ToolDefinition::new(
            "create_planned_task",
            "Add a task to a weekly plan. Specify day of week (0=Monday to 6=Sunday), title and priority. Requires confirmation.",
            Write,
            object(
                json!({
                    "week_start_date": string("Monday date of the target week (YYYY-MM-DD)"),
                    "title": string("Task title"),
                    "description": string("Task description"),
                    "day_of_week": { "type": "integer", "description": "Day of week: 0=Monday ... 6=Sunday" },
                    "priority": enumeration(&PRIORITIES, "Task priority"),
                    "shift_type": enumeration(&["morning", "afternoon", "night"], "Shift when the task should be done"),
                    "assigned_to": string("Employee UUID to assign the task to"),
                    "assigned_role": string("Role to assign (waiter, bar, kitchen, manager)"),
                }),
                &["week_start_date", "title", "day_of_week"],
            ),
        ),
        ToolDefinition::new(
            "update_planned_task",
            "Update an existing planned task in a weekly plan. Requires confirmation.",
            Write,
            object(
                json!({
                    "task_id": string("The planned task UUID to update"),
                    "title": { "type": "string" },
                    "day_of_week": { "type": "integer" },
                    "priority": enumeration(&PRIORITIES, "Task priority"),
                    "assigned_to": { "type": "string" },
                    "status": enumeration(&["pending", "in_progress", "completed", "skipped"], "Task status"),
                }),
                &["task_id"],
            ),
        ),
        ToolDefinition::new(
            "delegate_advertising_manager",
            "Delegate advertisement creation to the advertising specialist. Writes multilingual ad copy for a placement and queues ad drafts for confirmation.",
            Delegate,
            object(
                json!({
                    "ad_type": enumeration(&AD_TEMPLATES, "Type of advertisement to create"),
                    "placement": enumeration(&AD_PLACEMENTS, "Where the ad will be placed (default: social_media)"),
                    "languages": { "type": "array", "items": { "type": "string" }, "description": "Languages to generate: en, nl, es, de (default: en, nl)" },
                    "topic": string("Specific topic, event, or product to advertise"),
                }),
                &[],
            ),
        ),
        ToolDefinition::new(
            "delegate_cocktail_specialist",
            "Delegate cocktail and recipe tasks to the mixologist specialist: stock-aware recipe lookups, recipe card images, recipe PDFs and menu analysis.",
            Delegate,
            object(
                json!({
                    "task": enumeration(&["recipe_lookup", "stock_check", "missing_ingredients", "recipe_card_image", "recipe_pdf", "menu_analysis", "create_recipe", "custom"], "Type of cocktail task to perform"),
                    "cocktail_name": string("Name of the cocktail"),
                    "query": string("Custom query for the specialist (when task=custom)"),
                    "language": enumeration(&["en", "nl", "es", "de"], "Preferred language for output (default: en)"),
                }),
                &["task"],
            ),
        ),
        ToolDefinition::new(
            "delegate_schedule_optimizer",
            "Delegate schedule and weekly task planning to the scheduling specialist. It reads employees, shifts and events, drafts a plan, and queues saves, publishes and exports for confirmation.",
            Delegate,
            object(
                json!({
                    "task": enumeration(&["generate_schedule", "generate_task_plan", "publish_schedule", "publish_task_plan", "export_schedule", "export_task_plan", "analyze"], "Scheduling task to perform"),
                    "week_start": string("Monday of the target week (YYYY-MM-DD)"),
                    "instructions": string("Extra constraints or preferences"),
                }),
                &["task", "week_start"],
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{assistant_tools, find_tool, tool_kind, ToolKind};

    #[test]
    fn tool_names_are_unique() {
        let mut seen = HashSet::new();
        for tool in assistant_tools() {
            assert!(seen.insert(tool.name.as_str()), "duplicate tool {}", tool.name);
        }
    }

    #[test]
    fn every_schema_is_an_object_with_declared_required_fields() {
        for tool in assistant_tools() {
            assert_eq!(tool.input_schema["type"], "object", "{}", tool.name);
            let properties = tool.input_schema["properties"].as_object();
            for field in tool.required_fields() {
                assert!(
                    properties.map(|props| props.contains_key(field)).unwrap_or(false),
                    "{} requires undeclared field {field}",
                    tool.name
                );
            }
        }
    }

    #[test]
    fn mutations_are_classified_as_write_tools() {
        assert_eq!(tool_kind("create_reservation"), Some(ToolKind::Write));
        assert_eq!(tool_kind("get_reservations"), Some(ToolKind::Read));
        assert_eq!(tool_kind("delegate_schedule_optimizer"), Some(ToolKind::Delegate));
        assert_eq!(tool_kind("drop_table"), None);
    }

    #[test]
    fn serialized_definition_omits_internal_kind() {
        let tool = find_tool("get_events").map(serde_json::to_value);
        let Some(Ok(value)) = tool else {
            panic!("get_events should serialize");
        };
        assert!(value.get("kind").is_none());
        assert!(value.get("input_schema").is_some());
    }
}
