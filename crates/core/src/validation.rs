//! Parameter checks applied to write-tool input before anything is queued.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::catalog::{
    AD_PLACEMENTS, AD_STATUSES, AD_TEMPLATES, EVENT_TYPES, PRIORITIES, RESERVATION_STATUSES,
};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug)]
enum Check {
    Text,
    NonEmpty,
    Date,
    Uuid,
    OneOf(&'static [&'static str]),
    Integer { min: i64, max: i64 },
    Number,
    Bool,
    Items(&'static [Field]),
}

#[derive(Clone, Copy, Debug)]
struct Field {
    name: &'static str,
    required: bool,
    check: Check,
}

const fn req(name: &'static str, check: Check) -> Field {
    Field { name, required: true, check }
}

const fn opt(name: &'static str, check: Check) -> Field {
    Field { name, required: false, check }
}

const TASK_STATUSES: &[&str] = &["pending", "in_progress", "completed", "cancelled"];
const PLANNED_TASK_STATUSES: &[&str] = &["pending", "in_progress", "completed", "skipped"];
const TASK_SHIFTS: &[&str] = &["morning", "afternoon", "night"];
const SCHEDULE_SHIFTS: &[&str] = &["morning", "afternoon", "night", "split", "day_off"];
const MOVEMENT_TYPES: &[&str] = &["in", "out"];
const DAY_OF_WEEK: Check = Check::Integer { min: 0, max: 6 };

const CREATE_RESERVATION: &[Field] = &[
    req("guest_name", Check::NonEmpty),
    req("party_size", Check::Integer { min: 1, max: 50 }),
    req("reservation_date", Check::Date),
    req("reservation_time", Check::Text),
    opt("guest_phone", Check::Text),
    opt("guest_email", Check::Text),
    opt("special_requests", Check::Text),
    opt("table_id", Check::Uuid),
];

const UPDATE_RESERVATION_STATUS: &[Field] = &[
    req("reservation_id", Check::Uuid),
    req("status", Check::OneOf(&RESERVATION_STATUSES)),
];

const ASSIGN_TABLE: &[Field] = &[req("reservation_id", Check::Uuid), req("table_id", Check::Uuid)];

const CREATE_EVENT: &[Field] = &[
    req("title", Check::NonEmpty),
    req("event_date", Check::Date),
    req("start_time", Check::Text),
    opt("end_time", Check::Text),
    opt("event_type", Check::OneOf(&EVENT_TYPES)),
    opt("description", Check::Text),
];

const UPDATE_EVENT: &[Field] = &[
    req("event_id", Check::Uuid),
    opt("title", Check::Text),
    opt("event_date", Check::Date),
    opt("start_time", Check::Text),
    opt("end_time", Check::Text),
    opt("event_type", Check::OneOf(&EVENT_TYPES)),
    opt("description", Check::Text),
    opt("status", Check::Text),
];

const CREATE_SHIFT: &[Field] = &[
    req("employee_id", Check::Uuid),
    req("date", Check::Date),
    req("start_time", Check::Text),
    req("end_time", Check::Text),
    opt("role", Check::Text),
];

const UPDATE_SHIFT: &[Field] = &[
    req("shift_id", Check::Uuid),
    opt("start_time", Check::Text),
    opt("end_time", Check::Text),
    opt("role", Check::Text),
];

const RECORD_STOCK_MOVEMENT: &[Field] = &[
    req("product_id", Check::Uuid),
    req("quantity", Check::Number),
    req("movement_type", Check::OneOf(MOVEMENT_TYPES)),
    opt("notes", Check::Text),
    opt("date", Check::Date),
];

const CREATE_AD: &[Field] = &[
    req("title", Check::NonEmpty),
    req("placement", Check::OneOf(&AD_PLACEMENTS)),
    req("content_en", Check::NonEmpty),
    opt("template", Check::OneOf(&AD_TEMPLATES)),
    opt("status", Check::OneOf(&AD_STATUSES)),
    opt("start_date", Check::Date),
    opt("end_date", Check::Date),
    opt("image_url", Check::Text),
];

const UPDATE_AD: &[Field] = &[
    req("ad_id", Check::Uuid),
    opt("status", Check::OneOf(&AD_STATUSES)),
    opt("title", Check::Text),
    opt("content_en", Check::Text),
    opt("start_date", Check::Date),
    opt("end_date", Check::Date),
];

const CREATE_TASK: &[Field] = &[
    req("title", Check::NonEmpty),
    req("assignee_id", Check::Uuid),
    opt("description", Check::Text),
    opt("priority", Check::OneOf(&PRIORITIES)),
    opt("due_date", Check::Date),
];

const UPDATE_TASK_STATUS: &[Field] = &[
    req("task_id", Check::Uuid),
    opt("status", Check::OneOf(TASK_STATUSES)),
    opt("assignee_id", Check::Uuid),
    opt("priority", Check::OneOf(&PRIORITIES)),
];

const CREATE_PLANNED_TASK: &[Field] = &[
    req("week_start_date", Check::Date),
    req("title", Check::NonEmpty),
    req("day_of_week", DAY_OF_WEEK),
    opt("priority", Check::OneOf(&PRIORITIES)),
    opt("shift_type", Check::OneOf(TASK_SHIFTS)),
    opt("assigned_to", Check::Uuid),
    opt("assigned_role", Check::Text),
];

const UPDATE_PLANNED_TASK: &[Field] = &[
    req("task_id", Check::Uuid),
    opt("title", Check::Text),
    opt("day_of_week", DAY_OF_WEEK),
    opt("priority", Check::OneOf(&PRIORITIES)),
    opt("assigned_to", Check::Uuid),
    opt("status", Check::OneOf(PLANNED_TASK_STATUSES)),
];

const SCHEDULE_SHIFT: &[Field] = &[
    req("employee_id", Check::Uuid),
    req("date", Check::Date),
    req("shift_type", Check::OneOf(SCHEDULE_SHIFTS)),
    opt("start_time", Check::Text),
    opt("end_time", Check::Text),
    opt("break_minutes", Check::Integer { min: 0, max: 600 }),
    opt("is_day_off", Check::Bool),
    opt("notes", Check::Text),
];

const PLANNED_TASK_ITEM: &[Field] = &[
    req("title", Check::NonEmpty),
    req("day_of_week", DAY_OF_WEEK),
    req("priority", Check::OneOf(&PRIORITIES)),
    opt("assigned_to", Check::Uuid),
    opt("assigned_role", Check::Text),
    opt("shift_type", Check::OneOf(TASK_SHIFTS)),
    opt("estimated_minutes", Check::Integer { min: 1, max: 1440 }),
];

const BATCH_SYNC_SCHEDULE: &[Field] =
    &[req("week_start_date", Check::Date), req("shifts", Check::Items(SCHEDULE_SHIFT))];

const BATCH_SYNC_TASK_PLAN: &[Field] =
    &[req("week_start_date", Check::Date), req("tasks", Check::Items(PLANNED_TASK_ITEM))];

const PUBLISH_PLAN: &[Field] = &[req("plan_id", Check::Uuid)];
const EXPORT_WEEK: &[Field] = &[req("week_start_date", Check::Date)];

fn rules_for(tool_name: &str) -> Option<&'static [Field]> {
    let rules = match tool_name {
        "create_reservation" => CREATE_RESERVATION,
        "update_reservation_status" => UPDATE_RESERVATION_STATUS,
        "assign_table" => ASSIGN_TABLE,
        "create_event" => CREATE_EVENT,
        "update_event" => UPDATE_EVENT,
        "create_shift" => CREATE_SHIFT,
        "update_shift" => UPDATE_SHIFT,
        "record_stock_movement" => RECORD_STOCK_MOVEMENT,
        "create_ad" => CREATE_AD,
        "update_ad" => UPDATE_AD,
        "create_task" => CREATE_TASK,
        "update_task_status" => UPDATE_TASK_STATUS,
        "create_planned_task" => CREATE_PLANNED_TASK,
        "update_planned_task" => UPDATE_PLANNED_TASK,
        "batch_sync_schedule" => BATCH_SYNC_SCHEDULE,
        "batch_sync_task_plan" => BATCH_SYNC_TASK_PLAN,
        "publish_schedule" | "publish_task_plan" => PUBLISH_PLAN,
        "export_schedule_excel" | "export_task_plan_excel" => EXPORT_WEEK,
        _ => return None,
    };
    Some(rules)
}

/// True for every tool name the write executor knows how to perform.
pub fn is_known_write_tool(tool_name: &str) -> bool {
    rules_for(tool_name).is_some()
}

pub fn validate_write_input(tool_name: &str, input: &Map<String, Value>) -> Result<(), DomainError> {
    let rules = rules_for(tool_name).ok_or_else(|| DomainError::InvalidToolInput {
        tool: tool_name.to_string(),
        message: format!("Unknown write tool: {tool_name}"),
    })?;

    check_object(rules, input, "").map_err(|message| DomainError::InvalidToolInput {
        tool: tool_name.to_string(),
        message,
    })
}

fn check_object(rules: &[Field], input: &Map<String, Value>, path: &str) -> Result<(), String> {
    for field in rules {
        let location = format!("{path}{}", field.name);
        match input.get(field.name) {
            None | Some(Value::Null) if field.required => {
                return Err(format!("`{location}` is required"));
            }
            None | Some(Value::Null) => {}
            Some(value) => check_value(field.check, value, &location)?,
        }
    }
    Ok(())
}

fn check_value(check: Check, value: &Value, location: &str) -> Result<(), String> {
    match check {
        Check::Text => expect_str(value, location).map(|_| ()),
        Check::NonEmpty => {
            if expect_str(value, location)?.trim().is_empty() {
                return Err(format!("`{location}` must not be empty"));
            }
            Ok(())
        }
        Check::Date => {
            let raw = expect_str(value, location)?;
            if raw.len() != 10 || NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_err() {
                return Err(format!("`{location}` must be a date in YYYY-MM-DD format"));
            }
            Ok(())
        }
        Check::Uuid => {
            let raw = expect_str(value, location)?;
            uuid::Uuid::parse_str(raw)
                .map(|_| ())
                .map_err(|_| format!("`{location}` must be a UUID"))
        }
        Check::OneOf(allowed) => {
            let raw = expect_str(value, location)?;
            if allowed.contains(&raw) {
                Ok(())
            } else {
                Err(format!("`{location}` must be one of: {}", allowed.join(", ")))
            }
        }
        Check::Integer { min, max } => {
            let number = value
                .as_i64()
                .or_else(|| value.as_f64().filter(|n| n.fract() == 0.0).map(|n| n as i64))
                .ok_or_else(|| format!("`{location}` must be an integer"))?;
            if number < min || number > max {
                return Err(format!("`{location}` must be between {min} and {max}"));
            }
            Ok(())
        }
        Check::Number => {
            value.as_f64().map(|_| ()).ok_or_else(|| format!("`{location}` must be a number"))
        }
        Check::Bool => {
            value.as_bool().map(|_| ()).ok_or_else(|| format!("`{location}` must be a boolean"))
        }
        Check::Items(rules) => {
            let items = value.as_array().ok_or_else(|| format!("`{location}` must be a list"))?;
            if items.is_empty() {
                return Err(format!("`{location}` must contain at least one entry"));
            }
            for (index, item) in items.iter().enumerate() {
                let object = item
                    .as_object()
                    .ok_or_else(|| format!("`{location}[{index}]` must be an object"))?;
                check_object(rules, object, &format!("{location}[{index}]."))?;
            }
            Ok(())
        }
    }
}

fn expect_str<'a>(value: &'a Value, location: &str) -> Result<&'a str, String> {
    value.as_str().ok_or_else(|| format!("`{location}` must be a string"))
}
