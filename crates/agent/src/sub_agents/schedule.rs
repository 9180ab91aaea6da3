use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde_json::{json, Map, Value};

use cheers_core::validation::validate_write_input;
use cheers_core::{ModelTier, ToolDefinition, ToolKind, WriteIntent};
use cheers_db::{DataStore, Filter, Row, RowQuery};

use super::{prop, schema, SpecialistProfile};
use crate::queue::{EnqueueOutcome, WriteQueue};
use crate::read_tools::{store_failure, text, week_start};
use crate::tools::{required_str, str_arg, ToolCall, ToolFailure, ToolHandler, ToolResult};

const SYSTEM_PROMPT: &str = "You are the schedule & task planning specialist for GrandCafe Cheers, a beachfront restaurant & sports bar in El Arenal, Mallorca, Spain.

## Workflow
1. **Staff** → `get_employees` (active employees with their roles)
2. **Context** → `get_events` for demand spikes, plus `get_existing_schedule` or `get_existing_task_plan` so you never overwrite work silently
3. **Analyze & generate** the plan, respecting every constraint below
4. **Present** a clear summary of the proposal
5. **Save** with `save_schedule` or `save_task_plan` (stored as draft)
6. **Publish** with `publish_schedule` or `publish_task_plan` when asked
7. **Download** with `export_schedule_excel` or `export_task_plan_excel` when asked

Every save, publish and export is queued and only runs after the user confirms it.

## Shift Templates
- morning: 08:00-16:00
- afternoon: 16:00-00:00
- night: 20:00-03:00 (event nights only)
- split: two blocks with at least a 3h gap
- day_off

## Spanish Labor Rules
- Maximum 40h per week and 9h per shift
- Minimum 12h rest between shifts
- Minimum 1.5 consecutive days off per week
- Breaks: 15 min for shifts over 6h

## Coverage
- Every open day needs kitchen, bar and floor staff on both the morning and afternoon shifts
- Event nights (DJ, sports, themed) need extra bar and floor staff
- Day 0 is Monday and day 6 is Sunday

## Output Format
Present the schedule or task plan as a text summary with:
- A breakdown by day and employee
- Total hours per employee
- Any constraint violations, flagged
- Recommendations for adjustments

Do NOT generate HTML artifacts. The user can export to Excel or view the plan in the staff panel.";

/// Specialist tool name and the write tool it is queued as.
const WRITE_TOOLS: [(&str, &str); 6] = [
    ("save_schedule", "batch_sync_schedule"),
    ("save_task_plan", "batch_sync_task_plan"),
    ("publish_schedule", "publish_schedule"),
    ("publish_task_plan", "publish_task_plan"),
    ("export_schedule_excel", "export_schedule_excel"),
    ("export_task_plan_excel", "export_task_plan_excel"),
];

fn tools() -> Vec<ToolDefinition> {
    let week = || prop("string", "Monday of the week (YYYY-MM-DD)");
    let week_only = || schema(json!({ "week_start_date": week() }), &["week_start_date"]);
    let date_range = || {
        schema(
            json!({
                "date_from": prop("string", "Start date (YYYY-MM-DD)"),
                "date_to": prop("string", "End date (YYYY-MM-DD)"),
            }),
            &["date_from", "date_to"],
        )
    };

    vec![
        ToolDefinition::new(
            "get_employees",
            "Fetch active employees with their role.",
            ToolKind::Read,
            schema(json!({ "role": prop("string", "Filter by role (kitchen, bar, waiter, dj, manager). Omit for all.") }), &[]),
        ),
        ToolDefinition::new(
            "get_existing_schedule",
            "Fetch the existing schedule plan and shifts for a given week.",
            ToolKind::Read,
            week_only(),
        ),
        ToolDefinition::new(
            "get_existing_task_plan",
            "Fetch the existing weekly task plan and its planned tasks.",
            ToolKind::Read,
            week_only(),
        ),
        ToolDefinition::new(
            "get_events",
            "Fetch events (sports, DJ nights, themed, private) for a date range. Used for demand planning.",
            ToolKind::Read,
            date_range(),
        ),
        ToolDefinition::new(
            "save_schedule",
            "Save the generated schedule as a draft, replacing the week's draft shifts. Requires user confirmation.",
            ToolKind::Write,
            schema(
                json!({
                    "week_start_date": week(),
                    "shifts": {
                        "type": "array",
                        "description": "Shift assignments",
                        "items": schema(
                            json!({
                                "employee_id": prop("string", "Employee UUID"),
                                "date": prop("string", "Shift date (YYYY-MM-DD)"),
                                "shift_type": {
                                    "type": "string",
                                    "enum": ["morning", "afternoon", "night", "split", "day_off"],
                                },
                                "start_time": prop("string", "Start time (HH:MM)"),
                                "end_time": prop("string", "End time (HH:MM)"),
                                "is_day_off": prop("boolean", "Mark as day off"),
                                "notes": prop("string", "Optional notes"),
                            }),
                            &["employee_id", "date", "shift_type"],
                        ),
                    },
                }),
                &["week_start_date", "shifts"],
            ),
        ),
        ToolDefinition::new(
            "save_task_plan",
            "Save the generated task plan as a draft, replacing the week's draft tasks. Requires user confirmation.",
            ToolKind::Write,
            schema(
                json!({
                    "week_start_date": week(),
                    "tasks": {
                        "type": "array",
                        "description": "Planned tasks",
                        "items": schema(
                            json!({
                                "title": prop("string", "Task title"),
                                "day_of_week": prop("integer", "Day 0=Mon, 6=Sun"),
                                "priority": { "type": "string", "enum": ["low", "medium", "high", "urgent"] },
                                "assigned_to": prop("string", "Employee UUID (optional)"),
                                "assigned_role": prop("string", "Role for assignment (optional)"),
                                "shift_type": { "type": "string", "enum": ["morning", "afternoon", "night"] },
                                "estimated_minutes": prop("integer", "Estimated duration in minutes"),
                            }),
                            &["title", "day_of_week", "priority"],
                        ),
                    },
                }),
                &["week_start_date", "tasks"],
            ),
        ),
        ToolDefinition::new(
            "publish_schedule",
            "Publish a draft schedule plan, making it visible to staff. Requires user confirmation.",
            ToolKind::Write,
            schema(json!({ "plan_id": prop("string", "Schedule plan UUID to publish") }), &["plan_id"]),
        ),
        ToolDefinition::new(
            "publish_task_plan",
            "Publish a draft task plan, making it visible to staff. Requires user confirmation.",
            ToolKind::Write,
            schema(json!({ "plan_id": prop("string", "Task plan UUID to publish") }), &["plan_id"]),
        ),
        ToolDefinition::new(
            "export_schedule_excel",
            "Export a weekly schedule to a spreadsheet for download. Requires user confirmation.",
            ToolKind::Write,
            week_only(),
        ),
        ToolDefinition::new(
            "export_task_plan_excel",
            "Export a weekly task plan to a spreadsheet for download. Requires user confirmation.",
            ToolKind::Write,
            week_only(),
        ),
    ]
}

fn user_prompt(params: &Map<String, Value>, today: NaiveDate) -> String {
    let task = str_arg(params, "task").unwrap_or("analyze");
    let week = str_arg(params, "week_start")
        .map(str::to_string)
        .unwrap_or_else(|| (week_start(today) + Duration::days(7)).format("%Y-%m-%d").to_string());
    let extra = str_arg(params, "instructions")
        .map(|instructions| format!("\n\nAdditional context: {instructions}"))
        .unwrap_or_default();

    let body = match task {
        "generate_schedule" => format!(
            "Generate an optimized weekly staff schedule for the week starting {week}.\n\nSteps:\n1. Call get_employees to see all active staff\n2. Call get_events for the target week to check for demand spikes\n3. Call get_existing_schedule to see if there is a draft already\n4. Generate the schedule respecting all constraints\n5. Save it with save_schedule and summarize it clearly"
        ),
        "generate_task_plan" => format!(
            "Generate a weekly task plan for the week starting {week}.\n\nSteps:\n1. Call get_employees to see who can be assigned\n2. Call get_events to adjust task priorities for event days\n3. Call get_existing_task_plan to see if there is a draft already\n4. Generate the task plan distributing tasks fairly across shifts and staff\n5. Save it with save_task_plan and summarize it clearly"
        ),
        "publish_schedule" => format!(
            "Publish the schedule for the week starting {week}. Call get_existing_schedule to find the plan id, then call publish_schedule."
        ),
        "publish_task_plan" => format!(
            "Publish the task plan for the week starting {week}. Call get_existing_task_plan to find the plan id, then call publish_task_plan."
        ),
        "export_schedule" => format!(
            "Export the schedule for the week starting {week} with export_schedule_excel. Check with get_existing_schedule that the week has shifts first."
        ),
        "export_task_plan" => format!(
            "Export the task plan for the week starting {week} with export_task_plan_excel. Check with get_existing_task_plan that the week has tasks first."
        ),
        _ => format!(
            "Analyze the staffing for the week starting {week}. Review the existing schedule and task plan against the events and labor rules, and report gaps, overloaded staff and concrete improvements. Do not save anything unless asked."
        ),
    };
    format!("{body}{extra}")
}

pub fn profile(params: &Map<String, Value>, today: NaiveDate) -> SpecialistProfile {
    SpecialistProfile {
        tier: ModelTier::Complex,
        max_iterations: 10,
        max_tokens: 8192,
        system_prompt: SYSTEM_PROMPT,
        tools: tools(),
        user_prompt: user_prompt(params, today),
    }
}

fn write_description(tool: &str, params: &Map<String, Value>) -> String {
    let week = str_arg(params, "week_start_date").unwrap_or("");
    let count = |key: &str| params.get(key).and_then(Value::as_array).map_or(0, Vec::len);
    let plan = str_arg(params, "plan_id").unwrap_or("");
    match tool {
        "save_schedule" => format!("Save schedule for week {week}: {} shift(s) as draft", count("shifts")),
        "save_task_plan" => format!("Save task plan for week {week}: {} task(s) as draft", count("tasks")),
        "publish_schedule" => format!("Publish schedule plan {plan}"),
        "publish_task_plan" => format!("Publish task plan {plan}"),
        "export_schedule_excel" => format!("Export schedule for week {week} to Excel"),
        "export_task_plan_excel" => format!("Export task plan for week {week} to Excel"),
        other => other.to_string(),
    }
}

pub struct ScheduleTools {
    store: Arc<dyn DataStore>,
}

impl ScheduleTools {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Self { store }
    }

    async fn employees(&self, input: &Map<String, Value>) -> ToolResult {
        let mut query = RowQuery::new()
            .columns(&["id", "name", "role", "status"])
            .filter(Filter::eq("status", "active"))
            .order_by("role")
            .order_by("name");
        if let Some(role) = str_arg(input, "role") {
            query = query.filter(Filter::eq("role", role));
        }
        let employees = self.store.select("employees", query).await.map_err(store_failure)?;
        let count = employees.len();
        Ok(json!({ "employees": employees, "count": count }))
    }

    async fn plan(&self, table: &str, week: &str) -> Result<Option<Row>, ToolFailure> {
        Ok(self
            .store
            .select(
                table,
                RowQuery::new()
                    .columns(&["id", "week_start_date", "status", "published_at", "created_at"])
                    .filter(Filter::eq("week_start_date", week))
                    .limit(1),
            )
            .await
            .map_err(store_failure)?
            .into_iter()
            .next())
    }

    async fn existing(&self, input: &Map<String, Value>, plan_table: &str, rows: Rows) -> ToolResult {
        let week = required_str(input, "week_start_date")?;
        let Some(plan) = self.plan(plan_table, week).await? else {
            let mut body = Map::new();
            body.insert("exists".to_string(), json!(false));
            body.insert("plan".to_string(), Value::Null);
            body.insert(rows.key.to_string(), json!([]));
            return Ok(Value::Object(body));
        };
        let entries = self
            .store
            .select(
                rows.table,
                RowQuery::new()
                    .filter(Filter::eq("plan_id", text(&plan, "id")))
                    .order_by(rows.order)
                    .order_by("created_at"),
            )
            .await
            .map_err(store_failure)?;
        let mut body = Map::new();
        body.insert("exists".to_string(), json!(true));
        body.insert("plan".to_string(), Value::Object(plan));
        body.insert(rows.key.to_string(), json!(entries));
        Ok(Value::Object(body))
    }

    async fn events(&self, input: &Map<String, Value>) -> ToolResult {
        let from = required_str(input, "date_from")?;
        let to = required_str(input, "date_to")?;
        let events = self
            .store
            .select(
                "events",
                RowQuery::new()
                    .columns(&["id", "title", "event_date", "start_time", "end_time", "event_type", "description"])
                    .filter(Filter::gte("event_date", from))
                    .filter(Filter::lte("event_date", to))
                    .order_by("event_date"),
            )
            .await
            .map_err(store_failure)?;
        let count = events.len();
        Ok(json!({ "events": events, "count": count }))
    }

    async fn queue_write(&self, call: &ToolCall, write_tool: &str, queue: &WriteQueue) -> ToolResult {
        validate_write_input(write_tool, &call.input)
            .map_err(|error| ToolFailure::new(format!("Validation: {error}")))?;
        let intent = WriteIntent::new(write_tool, call.input.clone())
            .with_description(write_description(&call.name, &call.input));

        match queue.enqueue(intent).await {
            EnqueueOutcome::Queued(_) => {
                let mut body = call.input.clone();
                body.insert("queued".to_string(), json!(true));
                body.insert(
                    "message".to_string(),
                    json!(format!("{} queued for user confirmation", call.name)),
                );
                Ok(Value::Object(body))
            }
            EnqueueOutcome::Duplicate { reason } => Ok(json!({ "skipped": true, "reason": reason })),
            EnqueueOutcome::CapReached { cap } => Err(ToolFailure::new(format!(
                "Too many pending writes in this run (limit {cap})"
            ))),
        }
    }
}

#[derive(Clone, Copy)]
struct Rows {
    table: &'static str,
    key: &'static str,
    order: &'static str,
}

const SHIFT_ROWS: Rows = Rows { table: "shifts", key: "shifts", order: "shift_date" };
const TASK_ROWS: Rows = Rows { table: "planned_tasks", key: "tasks", order: "day_of_week" };

#[async_trait]
impl ToolHandler for ScheduleTools {
    async fn handle(&self, call: &ToolCall, queue: &WriteQueue) -> ToolResult {
        if let Some((_, write_tool)) = WRITE_TOOLS.iter().find(|(name, _)| *name == call.name) {
            return self.queue_write(call, write_tool, queue).await;
        }
        match call.name.as_str() {
            "get_employees" => self.employees(&call.input).await,
            "get_existing_schedule" => self.existing(&call.input, "schedule_plans", SHIFT_ROWS).await,
            "get_existing_task_plan" => {
                self.existing(&call.input, "weekly_task_plans", TASK_ROWS).await
            }
            "get_events" => self.events(&call.input).await,
            other => Err(ToolFailure::unknown_tool(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::{json, Map, Value};

    use super::{user_prompt, ScheduleTools};
    use crate::queue::WriteQueue;
    use crate::test_support::memory_store;
    use crate::tools::{ToolCall, ToolHandler};

    const EMPLOYEE: &str = "6f1c2a4e-8d3b-4c55-9a0e-2b7d9c1f4a10";

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn call(name: &str, value: Value) -> ToolCall {
        ToolCall { id: format!("toolu_{name}"), name: name.to_string(), input: input(value) }
    }

    #[test]
    fn prompt_defaults_to_next_week() {
        let today = NaiveDate::from_ymd_opt(2026, 7, 15).expect("valid date");
        let prompt = user_prompt(&input(json!({"task": "generate_schedule"})), today);
        assert!(prompt.contains("week starting 2026-07-20"));
        let analyze = user_prompt(&input(json!({"week_start": "2026-08-03", "instructions": "Two new waiters"})), today);
        assert!(analyze.starts_with("Analyze the staffing for the week starting 2026-08-03"));
        assert!(analyze.ends_with("Additional context: Two new waiters"));
    }

    #[tokio::test]
    async fn saves_are_validated_and_queued_as_batch_syncs() {
        let tools = ScheduleTools::new(memory_store().await);
        let queue = WriteQueue::new(20);
        let save = call(
            "save_schedule",
            json!({
                "week_start_date": "2026-07-20",
                "shifts": [
                    {"employee_id": EMPLOYEE, "date": "2026-07-20", "shift_type": "morning"},
                    {"employee_id": EMPLOYEE, "date": "2026-07-21", "shift_type": "day_off", "is_day_off": true}
                ]
            }),
        );

        let queued = tools.handle(&save, &queue).await.expect("queued");
        assert_eq!(queued["queued"], true);
        assert_eq!(queued["message"], "save_schedule queued for user confirmation");
        assert_eq!(queued["week_start_date"], "2026-07-20");

        let again = tools.handle(&save, &queue).await.expect("duplicate");
        assert_eq!(again["skipped"], true);

        let invalid = tools
            .handle(&call("save_task_plan", json!({"week_start_date": "2026-07-20", "tasks": []})), &queue)
            .await
            .expect_err("empty plan");
        assert!(invalid.message.starts_with("Validation:"));

        let writes = queue.snapshot().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].intent.tool_name, "batch_sync_schedule");
        assert_eq!(writes[0].intent.description, "Save schedule for week 2026-07-20: 2 shift(s) as draft");
    }

    #[tokio::test]
    async fn missing_plans_report_not_existing() {
        let tools = ScheduleTools::new(memory_store().await);
        let queue = WriteQueue::new(20);
        let result = tools
            .handle(&call("get_existing_task_plan", json!({"week_start_date": "2026-07-20"})), &queue)
            .await
            .expect("lookup");
        assert_eq!(result, json!({"exists": false, "plan": null, "tasks": []}));

        let unknown = tools.handle(&call("get_clock_history", json!({})), &queue).await.expect_err("unknown");
        assert_eq!(unknown.message, "Unknown tool: get_clock_history");
    }
}
