//! Performs confirmed write intents against the data store.
//!
//! Only the confirm path calls into this module. Parameters are validated again
//! here since they were persisted between queueing and confirmation.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use cheers_core::validation::validate_write_input;
use cheers_db::{DataStore, DataStoreError, Filter, Row, RowQuery};

use crate::read_tools::{employee_names, number, text};
use crate::services::{DocumentRenderer, ServiceError};

const DAY_NAMES: [&str; 7] =
    ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday"];

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("invalid parameters: {0}")]
    Invalid(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] DataStoreError),
    #[error("document rendering failed: {0}")]
    Document(#[from] ServiceError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PlanTable {
    Schedule,
    TaskPlan,
}

impl PlanTable {
    fn table(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule_plans",
            Self::TaskPlan => "weekly_task_plans",
        }
    }

    fn rows_table(&self) -> &'static str {
        match self {
            Self::Schedule => "shifts",
            Self::TaskPlan => "planned_tasks",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule plan",
            Self::TaskPlan => "task plan",
        }
    }
}

/// Copies the listed fields that are present and non-null.
fn pick(params: &Map<String, Value>, fields: &[&str]) -> Row {
    fields
        .iter()
        .filter_map(|field| match params.get(*field) {
            None | Some(Value::Null) => None,
            Some(value) => Some((field.to_string(), value.clone())),
        })
        .collect()
}

fn required_id<'a>(params: &'a Map<String, Value>, field: &str) -> Result<&'a str, WriteError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| WriteError::Invalid(format!("`{field}` is required")))
}

fn cell(row: &Row, key: &str) -> String {
    match row.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(value)) => value.clone(),
        Some(other) => other.to_string(),
    }
}

pub struct WriteExecutor {
    store: Arc<dyn DataStore>,
    documents: Arc<dyn DocumentRenderer>,
}

impl WriteExecutor {
    pub fn new(store: Arc<dyn DataStore>, documents: Arc<dyn DocumentRenderer>) -> Self {
        Self { store, documents }
    }

    /// Executes one confirmed action inside a single transaction. Folded sub-agent
    /// actions carry an `items` list; any failing item rolls back the whole batch.
    pub async fn execute(
        &self,
        tool_name: &str,
        params: &Map<String, Value>,
        user_id: &str,
    ) -> Result<Value, WriteError> {
        let tx = self.store.begin().await?;
        let outcome =
            WriteScope { store: tx.as_store(), documents: self.documents.as_ref() }
                .run(tool_name, params, user_id)
                .await;

        match outcome {
            Ok(result) => {
                tx.commit().await?;
                Ok(result)
            }
            Err(error) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(
                        event_name = "agent.write.rollback_failed",
                        tool_name,
                        error = %rollback,
                        "write rollback failed"
                    );
                }
                Err(error)
            }
        }
    }
}

/// One confirmed action's view of the store, bound to its transaction.
struct WriteScope<'a> {
    store: &'a dyn DataStore,
    documents: &'a dyn DocumentRenderer,
}

impl WriteScope<'_> {
    async fn run(
        &self,
        tool_name: &str,
        params: &Map<String, Value>,
        user_id: &str,
    ) -> Result<Value, WriteError> {
        if let Some(items) = params.get("items").and_then(Value::as_array) {
            let mut results = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let item = item
                    .as_object()
                    .ok_or_else(|| WriteError::Invalid(format!("`items[{index}]` must be an object")))?;
                results.push(self.execute_one(tool_name, item, user_id).await?);
            }
            return Ok(json!({ "count": results.len(), "results": results }));
        }

        self.execute_one(tool_name, params, user_id).await
    }

    async fn execute_one(
        &self,
        tool_name: &str,
        params: &Map<String, Value>,
        user_id: &str,
    ) -> Result<Value, WriteError> {
        validate_write_input(tool_name, params)
            .map_err(|error| WriteError::Invalid(error.to_string()))?;

        let result = match tool_name {
            "create_reservation" => {
                let row = pick(
                    params,
                    &[
                        "guest_name",
                        "guest_phone",
                        "guest_email",
                        "party_size",
                        "reservation_date",
                        "reservation_time",
                        "special_requests",
                        "table_id",
                    ],
                );
                self.create("reservations", row).await?
            }
            "update_reservation_status" => {
                let id = required_id(params, "reservation_id")?;
                self.patch("reservations", "reservation", id, pick(params, &["status"])).await?
            }
            "assign_table" => {
                let id = required_id(params, "reservation_id")?;
                self.patch("reservations", "reservation", id, pick(params, &["table_id"])).await?
            }
            "create_event" => {
                let row = pick(
                    params,
                    &["title", "event_date", "start_time", "end_time", "event_type", "description"],
                );
                self.create("events", row).await?
            }
            "update_event" => {
                let patch = pick(
                    params,
                    &[
                        "title",
                        "event_date",
                        "start_time",
                        "end_time",
                        "event_type",
                        "description",
                        "status",
                    ],
                );
                self.patch("events", "event", required_id(params, "event_id")?, patch).await?
            }
            "create_shift" => {
                let mut row = pick(params, &["employee_id", "start_time", "end_time", "role"]);
                row.insert("shift_date".to_string(), params.get("date").cloned().unwrap_or(Value::Null));
                self.create("shifts", row).await?
            }
            "update_shift" => {
                let patch = pick(params, &["start_time", "end_time", "role"]);
                self.patch("shifts", "shift", required_id(params, "shift_id")?, patch).await?
            }
            "record_stock_movement" => self.record_stock_movement(params, user_id).await?,
            "create_ad" => {
                let mut row = pick(
                    params,
                    &[
                        "title",
                        "placement",
                        "template",
                        "status",
                        "content_en",
                        "content_nl",
                        "content_es",
                        "content_de",
                        "cta_text",
                        "start_date",
                        "end_date",
                        "image_url",
                    ],
                );
                row.entry("status").or_insert_with(|| json!("draft"));
                self.create("ads", row).await?
            }
            "update_ad" => {
                let patch = pick(params, &["status", "title", "content_en", "start_date", "end_date"]);
                self.patch("ads", "advertisement", required_id(params, "ad_id")?, patch).await?
            }
            "create_task" => {
                let row = pick(params, &["title", "description", "assignee_id", "priority", "due_date"]);
                self.create("tasks", row).await?
            }
            "update_task_status" => {
                let patch = pick(params, &["status", "assignee_id", "priority"]);
                self.patch("tasks", "task", required_id(params, "task_id")?, patch).await?
            }
            "create_planned_task" => {
                let week = required_id(params, "week_start_date")?;
                let plan_id = self.find_or_create_plan(PlanTable::TaskPlan, week).await?;
                let mut row = pick(
                    params,
                    &[
                        "title",
                        "description",
                        "day_of_week",
                        "priority",
                        "shift_type",
                        "assigned_to",
                        "assigned_role",
                    ],
                );
                row.insert("plan_id".to_string(), json!(plan_id));
                let mut created = self.create("planned_tasks", row).await?;
                created["plan_id"] = json!(plan_id);
                created
            }
            "update_planned_task" => {
                let patch = pick(params, &["title", "day_of_week", "priority", "assigned_to", "status"]);
                self.patch("planned_tasks", "planned task", required_id(params, "task_id")?, patch).await?
            }
            "batch_sync_schedule" => self.sync_schedule(params).await?,
            "batch_sync_task_plan" => self.sync_task_plan(params).await?,
            "publish_schedule" => self.publish(PlanTable::Schedule, required_id(params, "plan_id")?).await?,
            "publish_task_plan" => self.publish(PlanTable::TaskPlan, required_id(params, "plan_id")?).await?,
            "export_schedule_excel" => self.export_schedule(required_id(params, "week_start_date")?).await?,
            "export_task_plan_excel" => {
                self.export_task_plan(required_id(params, "week_start_date")?).await?
            }
            other => return Err(WriteError::Invalid(format!("Unknown write tool: {other}"))),
        };

        info!(event_name = "agent.write.executed", tool_name, "write action executed");
        Ok(result)
    }

    async fn create(&self, table: &str, row: Row) -> Result<Value, WriteError> {
        let id = self.store.insert(table, row).await?;
        Ok(json!({ "success": true, "id": id }))
    }

    async fn patch(&self, table: &str, label: &str, id: &str, patch: Row) -> Result<Value, WriteError> {
        if patch.is_empty() {
            return Err(WriteError::Invalid(format!("no {label} fields to update")));
        }
        let updated = self.store.update(table, vec![Filter::eq("id", id)], patch).await?;
        if updated == 0 {
            return Err(WriteError::NotFound(format!("{label} {id}")));
        }
        Ok(json!({ "success": true, "id": id, "updated": updated }))
    }

    async fn record_stock_movement(
        &self,
        params: &Map<String, Value>,
        user_id: &str,
    ) -> Result<Value, WriteError> {
        let product_id = required_id(params, "product_id")?;
        let product = self
            .store
            .select(
                "stock_items",
                RowQuery::new()
                    .columns(&["id", "current_stock"])
                    .filter(Filter::eq("id", product_id))
                    .limit(1),
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| WriteError::NotFound(format!("stock item {product_id}")))?;

        let quantity = params.get("quantity").and_then(Value::as_f64).unwrap_or_default();
        let inbound = params.get("movement_type").and_then(Value::as_str) == Some("in");
        let current = number(&product, "current_stock");
        let new_stock = if inbound { current + quantity } else { current - quantity };
        let movement_date = params
            .get("date")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Utc::now().date_naive().format("%Y-%m-%d").to_string());

        let mut movement = pick(params, &["product_id", "movement_type", "quantity", "notes"]);
        movement.insert("movement_date".to_string(), json!(movement_date));
        movement.insert("recorded_by".to_string(), json!(user_id));
        let movement_id = self.store.insert("stock_movements", movement).await?;

        let mut patch = Row::new();
        patch.insert("current_stock".to_string(), json!(new_stock));
        patch.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        self.store.update("stock_items", vec![Filter::eq("id", product_id)], patch).await?;

        Ok(json!({
            "success": true,
            "id": movement_id,
            "product_id": product_id,
            "previous_stock": current,
            "current_stock": new_stock,
        }))
    }

    async fn find_plan(&self, plan: PlanTable, week: &str) -> Result<Option<String>, WriteError> {
        let existing = self
            .store
            .select(
                plan.table(),
                RowQuery::new().columns(&["id"]).filter(Filter::eq("week_start_date", week)).limit(1),
            )
            .await?;
        Ok(existing.first().map(|row| text(row, "id").to_string()))
    }

    async fn find_or_create_plan(&self, plan: PlanTable, week: &str) -> Result<String, WriteError> {
        if let Some(id) = self.find_plan(plan, week).await? {
            return Ok(id);
        }
        let mut row = Row::new();
        row.insert("week_start_date".to_string(), json!(week));
        row.insert("status".to_string(), json!("draft"));
        Ok(self.store.insert(plan.table(), row).await?)
    }

    /// Replaces the plan's rows with the submitted set, creating the plan if needed.
    async fn replace_plan_rows(
        &self,
        plan: PlanTable,
        week: &str,
        rows: Vec<Row>,
    ) -> Result<Value, WriteError> {
        let plan_id = self.find_or_create_plan(plan, week).await?;
        let removed = self
            .store
            .delete(plan.rows_table(), vec![Filter::eq("plan_id", plan_id.as_str())])
            .await?;

        let mut saved = 0;
        for mut row in rows {
            row.insert("plan_id".to_string(), json!(plan_id));
            self.store.insert(plan.rows_table(), row).await?;
            saved += 1;
        }

        Ok(json!({
            "success": true,
            "plan_id": plan_id,
            "week_start_date": week,
            "saved": saved,
            "replaced": removed,
        }))
    }

    async fn sync_schedule(&self, params: &Map<String, Value>) -> Result<Value, WriteError> {
        let week = required_id(params, "week_start_date")?;
        let rows = items(params, "shifts")?
            .iter()
            .map(|shift| {
                let mut row = pick(shift, &["employee_id", "shift_type", "start_time", "end_time", "notes"]);
                row.insert("shift_date".to_string(), shift.get("date").cloned().unwrap_or(Value::Null));
                let day_off = shift.get("is_day_off").and_then(Value::as_bool).unwrap_or(false)
                    || shift.get("shift_type").and_then(Value::as_str) == Some("day_off");
                row.insert("is_day_off".to_string(), json!(day_off));
                row
            })
            .collect();
        self.replace_plan_rows(PlanTable::Schedule, week, rows).await
    }

    async fn sync_task_plan(&self, params: &Map<String, Value>) -> Result<Value, WriteError> {
        let week = required_id(params, "week_start_date")?;
        let rows = items(params, "tasks")?
            .iter()
            .map(|task| {
                pick(
                    task,
                    &[
                        "title",
                        "description",
                        "day_of_week",
                        "priority",
                        "shift_type",
                        "assigned_to",
                        "assigned_role",
                        "estimated_minutes",
                    ],
                )
            })
            .collect();
        self.replace_plan_rows(PlanTable::TaskPlan, week, rows).await
    }

    async fn publish(&self, plan: PlanTable, plan_id: &str) -> Result<Value, WriteError> {
        let published_at = Utc::now().to_rfc3339();
        let mut patch = Row::new();
        patch.insert("status".to_string(), json!("published"));
        patch.insert("published_at".to_string(), json!(published_at));
        let updated = self.store.update(plan.table(), vec![Filter::eq("id", plan_id)], patch).await?;
        if updated == 0 {
            return Err(WriteError::NotFound(format!("{} {plan_id}", plan.label())));
        }
        Ok(json!({
            "success": true,
            "plan_id": plan_id,
            "status": "published",
            "published_at": published_at,
        }))
    }

    async fn export_schedule(&self, week: &str) -> Result<Value, WriteError> {
        let plan_id = self
            .find_plan(PlanTable::Schedule, week)
            .await?
            .ok_or_else(|| WriteError::NotFound(format!("schedule plan for week {week}")))?;
        let shifts = self
            .store
            .select(
                "shifts",
                RowQuery::new()
                    .filter(Filter::eq("plan_id", plan_id.as_str()))
                    .order_by("shift_date")
                    .order_by("start_time"),
            )
            .await?;
        let names = employee_names(self.store, &shifts, "employee_id").await?;

        let rows: Vec<Vec<String>> = shifts
            .iter()
            .map(|shift| {
                vec![
                    cell(shift, "shift_date"),
                    names.get(text(shift, "employee_id")).cloned().unwrap_or_default(),
                    cell(shift, "shift_type"),
                    cell(shift, "start_time"),
                    cell(shift, "end_time"),
                    if number(shift, "is_day_off") > 0.0 { "yes" } else { "no" }.to_string(),
                    cell(shift, "notes"),
                ]
            })
            .collect();
        let document = self
            .documents
            .render_sheet(
                &format!("schedule-{week}"),
                &["date", "employee", "shift", "start", "end", "day_off", "notes"],
                &rows,
            )
            .await?;

        Ok(json!({
            "success": true,
            "plan_id": plan_id,
            "file_name": document.file_name,
            "mime_type": document.mime_type,
            "size_bytes": document.size_bytes(),
            "rows": rows.len(),
        }))
    }

    async fn export_task_plan(&self, week: &str) -> Result<Value, WriteError> {
        let plan_id = self
            .find_plan(PlanTable::TaskPlan, week)
            .await?
            .ok_or_else(|| WriteError::NotFound(format!("task plan for week {week}")))?;
        let tasks = self
            .store
            .select(
                "planned_tasks",
                RowQuery::new()
                    .filter(Filter::eq("plan_id", plan_id.as_str()))
                    .order_by("day_of_week")
                    .order_by("created_at"),
            )
            .await?;
        let names = employee_names(self.store, &tasks, "assigned_to").await?;

        let rows: Vec<Vec<String>> = tasks
            .iter()
            .map(|task| {
                let day = number(task, "day_of_week") as usize;
                vec![
                    DAY_NAMES.get(day).copied().unwrap_or("?").to_string(),
                    cell(task, "title"),
                    cell(task, "priority"),
                    cell(task, "shift_type"),
                    names.get(text(task, "assigned_to")).cloned().unwrap_or_default(),
                    cell(task, "assigned_role"),
                    cell(task, "estimated_minutes"),
                    cell(task, "status"),
                ]
            })
            .collect();
        let document = self
            .documents
            .render_sheet(
                &format!("task-plan-{week}"),
                &["day", "task", "priority", "shift", "assigned_to", "role", "minutes", "status"],
                &rows,
            )
            .await?;

        Ok(json!({
            "success": true,
            "plan_id": plan_id,
            "file_name": document.file_name,
            "mime_type": document.mime_type,
            "size_bytes": document.size_bytes(),
            "rows": rows.len(),
        }))
    }
}

fn items<'a>(
    params: &'a Map<String, Value>,
    field: &str,
) -> Result<Vec<&'a Map<String, Value>>, WriteError> {
    params
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| WriteError::Invalid(format!("`{field}` must be a list")))?
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| WriteError::Invalid(format!("`{field}` entries must be objects")))
        })
        .collect()
}
