//! Generic filter/select/insert/update surface over the restaurant tables.
//!
//! Tool handlers reach operational data only through [`DataStore`]. Table and column
//! names are checked against a static registry before any SQL is assembled, and every
//! value travels as a bound parameter.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite, Transaction};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::DbPool;

#[derive(Debug, Error)]
pub enum DataStoreError {
    #[error("unknown table `{0}`")]
    UnknownTable(String),
    #[error("unknown column `{column}` on table `{table}`")]
    UnknownColumn { table: String, column: String },
    #[error("invalid row: {0}")]
    InvalidRow(String),
    #[error("refusing to {0} without filters")]
    Unfiltered(&'static str),
    #[error("a transaction is already open on this store")]
    NestedTransaction,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

struct TableSchema {
    name: &'static str,
    columns: &'static [&'static str],
}

const TABLES: &[TableSchema] = &[
    TableSchema {
        name: "reservations",
        columns: &[
            "id",
            "guest_name",
            "guest_phone",
            "guest_email",
            "party_size",
            "reservation_date",
            "reservation_time",
            "status",
            "table_id",
            "special_requests",
            "created_at",
        ],
    },
    TableSchema {
        name: "stock_items",
        columns: &["id", "name", "category", "unit", "current_stock", "min_stock", "updated_at"],
    },
    TableSchema {
        name: "stock_movements",
        columns: &[
            "id",
            "product_id",
            "movement_type",
            "quantity",
            "notes",
            "movement_date",
            "recorded_by",
            "created_at",
        ],
    },
    TableSchema {
        name: "events",
        columns: &[
            "id",
            "title",
            "event_date",
            "start_time",
            "end_time",
            "event_type",
            "description",
            "status",
            "created_at",
        ],
    },
    TableSchema {
        name: "menu_items",
        columns: &["id", "name", "category", "price", "description", "is_featured", "available"],
    },
    TableSchema {
        name: "cocktail_recipes",
        columns: &[
            "id",
            "menu_item_id",
            "name",
            "glass_type",
            "garnish",
            "preparation_steps",
            "created_at",
        ],
    },
    TableSchema {
        name: "menu_ingredients",
        columns: &["id", "menu_item_id", "stock_item_id", "ingredient_name", "quantity", "unit"],
    },
    TableSchema {
        name: "employees",
        columns: &["id", "name", "role", "email", "phone", "status", "created_at"],
    },
    TableSchema {
        name: "schedule_plans",
        columns: &["id", "week_start_date", "status", "published_at", "created_at"],
    },
    TableSchema {
        name: "shifts",
        columns: &[
            "id",
            "employee_id",
            "plan_id",
            "shift_date",
            "shift_type",
            "start_time",
            "end_time",
            "role",
            "is_day_off",
            "notes",
            "created_at",
        ],
    },
    TableSchema {
        name: "weekly_task_plans",
        columns: &["id", "week_start_date", "status", "published_at", "created_at"],
    },
    TableSchema {
        name: "planned_tasks",
        columns: &[
            "id",
            "plan_id",
            "title",
            "description",
            "day_of_week",
            "priority",
            "shift_type",
            "assigned_to",
            "assigned_role",
            "estimated_minutes",
            "status",
            "created_at",
        ],
    },
    TableSchema {
        name: "tasks",
        columns: &[
            "id",
            "title",
            "description",
            "assignee_id",
            "priority",
            "status",
            "due_date",
            "created_at",
        ],
    },
    TableSchema {
        name: "ads",
        columns: &[
            "id",
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
            "created_at",
        ],
    },
];

fn schema(table: &str) -> Result<&'static TableSchema, DataStoreError> {
    TABLES
        .iter()
        .find(|schema| schema.name == table)
        .ok_or_else(|| DataStoreError::UnknownTable(table.to_string()))
}

impl TableSchema {
    fn column(&self, column: &str) -> Result<&'static str, DataStoreError> {
        self.columns.iter().copied().find(|known| *known == column).ok_or_else(|| {
            DataStoreError::UnknownColumn { table: self.name.to_string(), column: column.to_string() }
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Gte(String, Value),
    Lte(String, Value),
    Lt(String, Value),
    /// Case-insensitive substring match.
    Like(String, String),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::Eq(column.to_string(), value.into())
    }

    pub fn gte(column: &str, value: impl Into<Value>) -> Self {
        Self::Gte(column.to_string(), value.into())
    }

    pub fn lte(column: &str, value: impl Into<Value>) -> Self {
        Self::Lte(column.to_string(), value.into())
    }

    pub fn lt(column: &str, value: impl Into<Value>) -> Self {
        Self::Lt(column.to_string(), value.into())
    }

    pub fn like(column: &str, needle: impl Into<String>) -> Self {
        Self::Like(column.to_string(), needle.into())
    }

    pub fn any_of(column: &str, values: Vec<Value>) -> Self {
        Self::In(column.to_string(), values)
    }

    fn column(&self) -> &str {
        match self {
            Self::Eq(column, _)
            | Self::Gte(column, _)
            | Self::Lte(column, _)
            | Self::Lt(column, _)
            | Self::Like(column, _)
            | Self::In(column, _) => column,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowQuery {
    /// Empty selects every registered column.
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u32>,
}

impl RowQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|column| column.to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by.push(OrderBy { column: column.to_string(), descending: false });
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order_by.push(OrderBy { column: column.to_string(), descending: true });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub type Row = Map<String, Value>;

#[async_trait]
pub trait DataStore: Send + Sync {
    async fn select(&self, table: &str, query: RowQuery) -> Result<Vec<Row>, DataStoreError>;

    /// Inserts one row and returns its id; an id is generated when the row has none.
    async fn insert(&self, table: &str, row: Row) -> Result<String, DataStoreError>;

    async fn update(
        &self,
        table: &str,
        filters: Vec<Filter>,
        patch: Row,
    ) -> Result<u64, DataStoreError>;

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<u64, DataStoreError>;

    /// Opens a transaction. Writes made through it are discarded unless it is committed.
    async fn begin(&self) -> Result<Box<dyn DataTransaction>, DataStoreError>;
}

#[async_trait]
pub trait DataTransaction: DataStore {
    fn as_store(&self) -> &dyn DataStore;

    async fn commit(self: Box<Self>) -> Result<(), DataStoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), DataStoreError>;
}

pub struct SqlDataStore {
    pool: DbPool,
}

impl SqlDataStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value {
        Value::Null => {
            builder.push_bind(Option::<String>::None);
        }
        Value::Bool(flag) => {
            builder.push_bind(i64::from(*flag));
        }
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                builder.push_bind(integer);
            } else {
                builder.push_bind(number.as_f64().unwrap_or_default());
            }
        }
        Value::String(text) => {
            builder.push_bind(text.clone());
        }
        other => {
            builder.push_bind(other.to_string());
        }
    }
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Sqlite>,
    schema: &TableSchema,
    filters: &[Filter],
) -> Result<(), DataStoreError> {
    for (index, filter) in filters.iter().enumerate() {
        builder.push(if index == 0 { " WHERE " } else { " AND " });
        let column = schema.column(filter.column())?;
        match filter {
            Filter::Eq(_, value) => {
                builder.push(column).push(" = ");
                push_value(builder, value);
            }
            Filter::Gte(_, value) => {
                builder.push(column).push(" >= ");
                push_value(builder, value);
            }
            Filter::Lte(_, value) => {
                builder.push(column).push(" <= ");
                push_value(builder, value);
            }
            Filter::Lt(_, value) => {
                builder.push(column).push(" < ");
                push_value(builder, value);
            }
            Filter::Like(_, needle) => {
                builder.push("LOWER(").push(column).push(") LIKE ");
                builder.push_bind(format!("%{}%", needle.to_lowercase()));
            }
            Filter::In(_, values) if values.is_empty() => {
                builder.push("0 = 1");
            }
            Filter::In(_, values) => {
                builder.push(column).push(" IN (");
                for (position, value) in values.iter().enumerate() {
                    if position > 0 {
                        builder.push(", ");
                    }
                    push_value(builder, value);
                }
                builder.push(")");
            }
        }
    }
    Ok(())
}

fn select_sql(table: &str, query: &RowQuery) -> Result<QueryBuilder<'static, Sqlite>, DataStoreError> {
    let schema = schema(table)?;
    let columns: Vec<&'static str> = if query.columns.is_empty() {
        schema.columns.to_vec()
    } else {
        query.columns.iter().map(|column| schema.column(column)).collect::<Result<_, _>>()?
    };

    let mut builder = QueryBuilder::<Sqlite>::new("SELECT json_object(");
    for (index, column) in columns.iter().enumerate() {
        if index > 0 {
            builder.push(", ");
        }
        builder.push(format!("'{column}', {column}"));
    }
    builder.push(") AS row_json FROM ").push(schema.name);
    push_filters(&mut builder, schema, &query.filters)?;

    for (index, order) in query.order_by.iter().enumerate() {
        builder.push(if index == 0 { " ORDER BY " } else { ", " });
        builder.push(schema.column(&order.column)?);
        builder.push(if order.descending { " DESC" } else { " ASC" });
    }
    if let Some(limit) = query.limit {
        builder.push(" LIMIT ").push_bind(i64::from(limit));
    }
    Ok(builder)
}

fn decode_rows(raw_rows: Vec<String>) -> Result<Vec<Row>, DataStoreError> {
    raw_rows
        .iter()
        .map(|raw| match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(row)) => Ok(row),
            Ok(other) => Err(DataStoreError::InvalidRow(format!("expected object, got {other}"))),
            Err(error) => Err(DataStoreError::InvalidRow(error.to_string())),
        })
        .collect()
}

fn insert_sql(
    table: &str,
    mut row: Row,
) -> Result<(String, QueryBuilder<'static, Sqlite>), DataStoreError> {
    let schema = schema(table)?;
    let id = match row.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        _ => uuid::Uuid::new_v4().to_string(),
    };
    row.insert("id".to_string(), Value::String(id.clone()));

    let columns: Vec<&'static str> =
        row.keys().map(|column| schema.column(column)).collect::<Result<_, _>>()?;

    let mut builder = QueryBuilder::<Sqlite>::new("INSERT INTO ");
    builder.push(schema.name).push(" (").push(columns.join(", ")).push(") VALUES (");
    for (index, value) in row.values().enumerate() {
        if index > 0 {
            builder.push(", ");
        }
        push_value(&mut builder, value);
    }
    builder.push(")");
    Ok((id, builder))
}

/// `None` when the patch is empty and there is nothing to run.
fn update_sql(
    table: &str,
    filters: &[Filter],
    patch: &Row,
) -> Result<Option<QueryBuilder<'static, Sqlite>>, DataStoreError> {
    let schema = schema(table)?;
    if filters.is_empty() {
        return Err(DataStoreError::Unfiltered("update"));
    }
    if patch.is_empty() {
        return Ok(None);
    }

    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE ");
    builder.push(schema.name).push(" SET ");
    for (index, (column, value)) in patch.iter().enumerate() {
        if index > 0 {
            builder.push(", ");
        }
        builder.push(schema.column(column)?).push(" = ");
        push_value(&mut builder, value);
    }
    push_filters(&mut builder, schema, filters)?;
    Ok(Some(builder))
}

fn delete_sql(table: &str, filters: &[Filter]) -> Result<QueryBuilder<'static, Sqlite>, DataStoreError> {
    let schema = schema(table)?;
    if filters.is_empty() {
        return Err(DataStoreError::Unfiltered("delete"));
    }

    let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM ");
    builder.push(schema.name);
    push_filters(&mut builder, schema, filters)?;
    Ok(builder)
}

#[async_trait]
impl DataStore for SqlDataStore {
    async fn select(&self, table: &str, query: RowQuery) -> Result<Vec<Row>, DataStoreError> {
        let mut builder = select_sql(table, &query)?;
        let raw_rows = builder.build_query_scalar::<String>().fetch_all(&self.pool).await?;
        decode_rows(raw_rows)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<String, DataStoreError> {
        let (id, mut builder) = insert_sql(table, row)?;
        builder.build().execute(&self.pool).await?;
        Ok(id)
    }

    async fn update(
        &self,
        table: &str,
        filters: Vec<Filter>,
        patch: Row,
    ) -> Result<u64, DataStoreError> {
        let Some(mut builder) = update_sql(table, &filters, &patch)? else {
            return Ok(0);
        };
        Ok(builder.build().execute(&self.pool).await?.rows_affected())
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<u64, DataStoreError> {
        let mut builder = delete_sql(table, &filters)?;
        Ok(builder.build().execute(&self.pool).await?.rows_affected())
    }

    async fn begin(&self) -> Result<Box<dyn DataTransaction>, DataStoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqlDataTransaction { tx: Mutex::new(tx) }))
    }
}

/// A pooled connection held inside `BEGIN`; dropping it without a commit rolls back.
pub struct SqlDataTransaction {
    tx: Mutex<Transaction<'static, Sqlite>>,
}

#[async_trait]
impl DataStore for SqlDataTransaction {
    async fn select(&self, table: &str, query: RowQuery) -> Result<Vec<Row>, DataStoreError> {
        let mut builder = select_sql(table, &query)?;
        let mut tx = self.tx.lock().await;
        let raw_rows = builder.build_query_scalar::<String>().fetch_all(&mut **tx).await?;
        decode_rows(raw_rows)
    }

    async fn insert(&self, table: &str, row: Row) -> Result<String, DataStoreError> {
        let (id, mut builder) = insert_sql(table, row)?;
        let mut tx = self.tx.lock().await;
        builder.build().execute(&mut **tx).await?;
        Ok(id)
    }

    async fn update(
        &self,
        table: &str,
        filters: Vec<Filter>,
        patch: Row,
    ) -> Result<u64, DataStoreError> {
        let Some(mut builder) = update_sql(table, &filters, &patch)? else {
            return Ok(0);
        };
        let mut tx = self.tx.lock().await;
        Ok(builder.build().execute(&mut **tx).await?.rows_affected())
    }

    async fn delete(&self, table: &str, filters: Vec<Filter>) -> Result<u64, DataStoreError> {
        let mut builder = delete_sql(table, &filters)?;
        let mut tx = self.tx.lock().await;
        Ok(builder.build().execute(&mut **tx).await?.rows_affected())
    }

    async fn begin(&self) -> Result<Box<dyn DataTransaction>, DataStoreError> {
        Err(DataStoreError::NestedTransaction)
    }
}

#[async_trait]
impl DataTransaction for SqlDataTransaction {
    fn as_store(&self) -> &dyn DataStore {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), DataStoreError> {
        Ok(self.tx.into_inner().commit().await?)
    }

    async fn rollback(self: Box<Self>) -> Result<(), DataStoreError> {
        Ok(self.tx.into_inner().rollback().await?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::{DataStore, DataStoreError, Filter, Row, RowQuery, SqlDataStore};
    use crate::{connect_with_settings, migrations};

    async fn store() -> SqlDataStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlDataStore::new(pool)
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().expect("object literal")
    }

    #[tokio::test]
    async fn insert_select_and_filter_reservations() {
        let store = store().await;
        for (guest, time, size) in [("Ada", "19:30", 4), ("Grace", "18:00", 2), ("Linus", "21:00", 6)] {
            store
                .insert(
                    "reservations",
                    row(json!({
                        "guest_name": guest,
                        "party_size": size,
                        "reservation_date": "2026-03-14",
                        "reservation_time": time
                    })),
                )
                .await
                .expect("insert");
        }

        let rows = store
            .select(
                "reservations",
                RowQuery::new()
                    .columns(&["guest_name", "party_size", "status"])
                    .filter(Filter::eq("reservation_date", "2026-03-14"))
                    .filter(Filter::gte("party_size", 3))
                    .order_by("reservation_time")
                    .limit(10),
            )
            .await
            .expect("select");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["guest_name"], json!("Ada"));
        assert_eq!(rows[0]["status"], json!("pending"));
        assert_eq!(rows[1]["party_size"], json!(6));
        assert!(!rows[0].contains_key("guest_phone"));
    }

    #[tokio::test]
    async fn like_and_in_filters_match_case_insensitively() {
        let store = store().await;
        let gin = store
            .insert("stock_items", row(json!({"name": "Hendrick's Gin", "category": "spirits"})))
            .await
            .expect("insert");
        store
            .insert("stock_items", row(json!({"name": "Lime", "category": "produce"})))
            .await
            .expect("insert");

        let matched = store
            .select("stock_items", RowQuery::new().filter(Filter::like("name", "GIN")))
            .await
            .expect("like");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0]["id"], json!(gin));

        let none = store
            .select("stock_items", RowQuery::new().filter(Filter::any_of("category", Vec::new())))
            .await
            .expect("empty in");
        assert!(none.is_empty());

        let both = store
            .select(
                "stock_items",
                RowQuery::new().filter(Filter::any_of("category", vec![json!("spirits"), json!("produce")])),
            )
            .await
            .expect("in");
        assert_eq!(both.len(), 2);
    }

    #[tokio::test]
    async fn update_and_delete_require_filters() {
        let store = store().await;
        let id = store
            .insert("tasks", row(json!({"title": "Polish glasses"})))
            .await
            .expect("insert");

        let changed = store
            .update("tasks", vec![Filter::eq("id", id.as_str())], row(json!({"status": "completed"})))
            .await
            .expect("update");
        assert_eq!(changed, 1);

        let unfiltered = store.update("tasks", Vec::new(), row(json!({"status": "x"}))).await;
        assert!(matches!(unfiltered, Err(DataStoreError::Unfiltered("update"))));

        assert_eq!(store.delete("tasks", vec![Filter::eq("id", id.as_str())]).await.expect("delete"), 1);
    }

    #[tokio::test]
    async fn unknown_names_are_rejected_before_sql() {
        let store = store().await;

        let table = store.select("users; DROP TABLE events", RowQuery::new()).await;
        assert!(matches!(table, Err(DataStoreError::UnknownTable(_))));

        let column = store
            .select("events", RowQuery::new().filter(Filter::eq("1=1 OR title", "x")))
            .await;
        assert!(matches!(column, Err(DataStoreError::UnknownColumn { .. })));

        let insert = store.insert("events", row(json!({"password": "x"}))).await;
        assert!(matches!(insert, Err(DataStoreError::UnknownColumn { .. })));
    }

    #[tokio::test]
    async fn rolled_back_writes_leave_no_trace() {
        let store = store().await;
        let kept = store.insert("tasks", row(json!({"title": "Restock bar"}))).await.expect("insert");

        let tx = store.begin().await.expect("begin");
        tx.delete("tasks", vec![Filter::eq("id", kept.as_str())]).await.expect("delete in tx");
        tx.insert("tasks", row(json!({"title": "Mop floor"}))).await.expect("insert in tx");
        assert_eq!(tx.select("tasks", RowQuery::new()).await.expect("select in tx").len(), 1);
        assert!(matches!(tx.begin().await, Err(DataStoreError::NestedTransaction)));
        tx.rollback().await.expect("rollback");

        let rows = store.select("tasks", RowQuery::new()).await.expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(kept));
    }

    #[tokio::test]
    async fn committed_writes_are_visible_afterwards() {
        let store = store().await;

        let tx = store.begin().await.expect("begin");
        let id = tx
            .as_store()
            .insert(
                "events",
                row(json!({"title": "Jazz night", "event_date": "2026-10-17", "start_time": "20:00"})),
            )
            .await
            .expect("insert in tx");
        tx.commit().await.expect("commit");

        let rows = store
            .select("events", RowQuery::new().filter(Filter::eq("id", id.as_str())))
            .await
            .expect("select");
        assert_eq!(rows.len(), 1);
    }
}
