use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

/// Number of embedded migrations and how many of them have been applied.
pub async fn status(pool: &DbPool) -> Result<(usize, usize), sqlx::Error> {
    let known =
        MIGRATOR.iter().filter(|migration| !migration.migration_type.is_down_migration()).count();
    let table_exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;
    if table_exists == 0 {
        return Ok((known, 0));
    }
    let applied: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
            .fetch_one(pool)
            .await?;
    Ok((known, applied.max(0) as usize))
}

#[cfg(test)]
mod tests {
    use sqlx::Row;

    use super::{run_pending, status};
    use crate::{connect_with_settings, migrations::MIGRATOR};

    const ASSISTANT_TABLES: &[&str] = &[
        "ai_conversations",
        "ai_conversation_messages",
        "ai_pending_actions",
        "ai_sub_agent_tasks",
        "ai_audit_log",
        "ai_tool_executions",
    ];

    const RESTAURANT_TABLES: &[&str] = &[
        "reservations",
        "stock_items",
        "stock_movements",
        "events",
        "menu_items",
        "cocktail_recipes",
        "menu_ingredients",
        "employees",
        "schedule_plans",
        "shifts",
        "weekly_task_plans",
        "planned_tasks",
        "tasks",
        "ads",
    ];

    const MANAGED_INDEXES: &[&str] = &[
        "idx_ai_conversations_user_last_message",
        "idx_ai_conversation_messages_sequence",
        "idx_ai_pending_actions_status_expires",
        "idx_ai_pending_actions_user_id",
        "idx_ai_sub_agent_tasks_conversation_id",
        "idx_ai_audit_log_user_created",
        "idx_ai_tool_executions_tool_name",
        "idx_reservations_date_time",
        "idx_stock_movements_product_id",
        "idx_events_event_date",
        "idx_menu_ingredients_menu_item_id",
        "idx_shifts_shift_date",
        "idx_planned_tasks_plan_id",
    ];

    fn is_managed(name: &str) -> bool {
        ASSISTANT_TABLES.contains(&name)
            || RESTAURANT_TABLES.contains(&name)
            || MANAGED_INDEXES.contains(&name)
    }

    async fn table_count(pool: &sqlx::SqlitePool, table: &str) -> i64 {
        sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(pool)
        .await
        .expect("check table")
        .get::<i64, _>("count")
    }

    #[tokio::test]
    async fn migrations_create_assistant_and_restaurant_tables() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        for table in ASSISTANT_TABLES.iter().chain(RESTAURANT_TABLES) {
            assert_eq!(table_count(&pool, table).await, 1, "{table} should exist");
        }

        let (known, applied) = status(&pool).await.expect("status");
        assert_eq!(known, applied);
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        assert_eq!(table_count(&pool, "ai_conversations").await, 0);
        assert_eq!(table_count(&pool, "reservations").await, 0);
    }

    #[tokio::test]
    async fn migrations_up_down_up_preserves_schema_signature() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let initial_signature = managed_schema_signature(&pool).await;
        assert_eq!(
            initial_signature.len(),
            ASSISTANT_TABLES.len() + RESTAURANT_TABLES.len() + MANAGED_INDEXES.len(),
            "initial migration pass should create all managed schema objects",
        );

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");
        assert!(
            managed_schema_signature(&pool).await.is_empty(),
            "managed schema objects should be removed after full undo",
        );

        run_pending(&pool).await.expect("re-run migrations");
        assert_eq!(
            managed_schema_signature(&pool).await,
            initial_signature,
            "up/down/up should preserve migration-managed schema signature",
        );
    }

    async fn managed_schema_signature(pool: &sqlx::SqlitePool) -> Vec<(String, String, String)> {
        let mut signature: Vec<(String, String, String)> = sqlx::query(
            "SELECT type, name, IFNULL(sql, '') AS sql
             FROM sqlite_master
             WHERE type IN ('table', 'index')",
        )
        .fetch_all(pool)
        .await
        .expect("load schema objects")
        .into_iter()
        .filter_map(|row| {
            let name = row.get::<String, _>("name");
            is_managed(&name)
                .then(|| (row.get::<String, _>("type"), name, row.get::<String, _>("sql")))
        })
        .collect();
        signature.sort();
        signature
    }
}
