use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::Row;

use cheers_core::domain::conversation::{
    Conversation, ConversationId, ConversationUpdate, Message, MessageId, MessageRole, TokenUsage,
};
use cheers_core::domain::pending_action::PendingActionId;

use super::{
    decode_err, format_timestamp, parse_json, parse_optional_timestamp, parse_timestamp,
    parse_u32, parse_u64, to_json, ConversationRepository, RepositoryError,
};
use crate::DbPool;

const CONVERSATION_COLUMNS: &str = "id, user_id, title, summary, metadata_json, pinned,
    message_count, last_message_at, total_tokens, estimated_cost_usd, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, role, content, tools_used_json,
    pending_action_id, token_usage_json, metadata_json, created_at";

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_cost(raw: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(raw).map_err(|error| {
        RepositoryError::Decode(format!("invalid estimated_cost_usd `{raw}`: {error}"))
    })
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation, RepositoryError> {
    let metadata_json: String = row.try_get("metadata_json").map_err(decode_err)?;
    let pinned: i64 = row.try_get("pinned").map_err(decode_err)?;
    let message_count: i64 = row.try_get("message_count").map_err(decode_err)?;
    let last_message_at: Option<String> = row.try_get("last_message_at").map_err(decode_err)?;
    let total_tokens: i64 = row.try_get("total_tokens").map_err(decode_err)?;
    let cost: String = row.try_get("estimated_cost_usd").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_err)?;

    Ok(Conversation {
        id: ConversationId(row.try_get("id").map_err(decode_err)?),
        user_id: row.try_get("user_id").map_err(decode_err)?,
        title: row.try_get("title").map_err(decode_err)?,
        summary: row.try_get("summary").map_err(decode_err)?,
        metadata: parse_json::<Map<String, Value>>("metadata_json", &metadata_json)?,
        pinned: pinned != 0,
        message_count: parse_u32("message_count", message_count)?,
        last_message_at: parse_optional_timestamp("last_message_at", last_message_at)?,
        total_tokens: parse_u64("total_tokens", total_tokens)?,
        estimated_cost_usd: parse_cost(&cost)?,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, RepositoryError> {
    let role: String = row.try_get("role").map_err(decode_err)?;
    let tools_used_json: String = row.try_get("tools_used_json").map_err(decode_err)?;
    let pending_action_id: Option<String> =
        row.try_get("pending_action_id").map_err(decode_err)?;
    let token_usage_json: Option<String> = row.try_get("token_usage_json").map_err(decode_err)?;
    let metadata_json: String = row.try_get("metadata_json").map_err(decode_err)?;
    let created_at: String = row.try_get("created_at").map_err(decode_err)?;

    Ok(Message {
        id: MessageId(row.try_get("id").map_err(decode_err)?),
        conversation_id: ConversationId(row.try_get("conversation_id").map_err(decode_err)?),
        role: MessageRole::parse(&role)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role}`")))?,
        content: row.try_get("content").map_err(decode_err)?,
        tools_used: parse_json::<Vec<String>>("tools_used_json", &tools_used_json)?,
        pending_action_id: pending_action_id.map(PendingActionId),
        token_usage: token_usage_json
            .map(|raw| parse_json::<TokenUsage>("token_usage_json", &raw))
            .transpose()?,
        metadata: parse_json::<Map<String, Value>>("metadata_json", &metadata_json)?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ai_conversations (id, user_id, title, summary, metadata_json, pinned,
                                           message_count, last_message_at, total_tokens,
                                           estimated_cost_usd, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id.0)
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(&conversation.summary)
        .bind(to_json("metadata_json", &conversation.metadata)?)
        .bind(i64::from(conversation.pinned))
        .bind(i64::from(conversation.message_count))
        .bind(conversation.last_message_at.as_ref().map(format_timestamp))
        .bind(conversation.total_tokens as i64)
        .bind(conversation.estimated_cost_usd.to_string())
        .bind(format_timestamp(&conversation.created_at))
        .bind(format_timestamp(&conversation.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM ai_conversations WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM ai_conversations
             WHERE user_id = ?
             ORDER BY last_message_at IS NULL, last_message_at DESC, created_at DESC
             LIMIT ? OFFSET ?"
        ))
        .bind(user_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_conversation).collect()
    }

    async fn update(
        &self,
        id: &ConversationId,
        update: ConversationUpdate,
        now: DateTime<Utc>,
    ) -> Result<Conversation, RepositoryError> {
        let Some(mut conversation) = self.find_by_id(id).await? else {
            return Err(RepositoryError::NotFound(format!("conversation {}", id.0)));
        };
        if let Some(title) = update.title {
            conversation.title = Some(title);
        }
        if let Some(summary) = update.summary {
            conversation.summary = Some(summary);
        }
        if let Some(metadata) = update.metadata {
            conversation.metadata = metadata;
        }
        if let Some(pinned) = update.pinned {
            conversation.pinned = pinned;
        }
        conversation.updated_at = now;

        sqlx::query(
            "UPDATE ai_conversations
             SET title = ?, summary = ?, metadata_json = ?, pinned = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&conversation.title)
        .bind(&conversation.summary)
        .bind(to_json("metadata_json", &conversation.metadata)?)
        .bind(i64::from(conversation.pinned))
        .bind(format_timestamp(&now))
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(conversation)
    }

    async fn record_usage(
        &self,
        id: &ConversationId,
        tokens: u64,
        cost_usd: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT estimated_cost_usd FROM ai_conversations WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(current) = current else {
            return Err(RepositoryError::NotFound(format!("conversation {}", id.0)));
        };
        let total_cost = parse_cost(&current)? + cost_usd;

        sqlx::query(
            "UPDATE ai_conversations
             SET total_tokens = total_tokens + ?, estimated_cost_usd = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(tokens as i64)
        .bind(total_cost.normalize().to_string())
        .bind(format_timestamp(&now))
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM ai_conversations WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_message(&self, message: Message) -> Result<(), RepositoryError> {
        let created_at = format_timestamp(&message.created_at);
        let token_usage_json =
            message.token_usage.as_ref().map(|usage| to_json("token_usage_json", usage)).transpose()?;

        let mut tx = self.pool.begin().await?;

        let touched = sqlx::query(
            "UPDATE ai_conversations
             SET message_count = message_count + 1, last_message_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&created_at)
        .bind(&created_at)
        .bind(&message.conversation_id.0)
        .execute(&mut *tx)
        .await?;
        if touched.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!(
                "conversation {}",
                message.conversation_id.0
            )));
        }

        sqlx::query(
            "INSERT INTO ai_conversation_messages (id, conversation_id, sequence, role, content,
                                                   tools_used_json, pending_action_id,
                                                   token_usage_json, metadata_json, created_at)
             VALUES (?, ?,
                     (SELECT COALESCE(MAX(sequence), 0) + 1 FROM ai_conversation_messages
                      WHERE conversation_id = ?),
                     ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.conversation_id.0)
        .bind(&message.conversation_id.0)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(to_json("tools_used_json", &message.tools_used)?)
        .bind(message.pending_action_id.as_ref().map(|id| id.0.clone()))
        .bind(token_usage_json)
        .bind(to_json("metadata_json", &message.metadata)?)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_messages(
        &self,
        conversation_id: &ConversationId,
        limit: Option<u32>,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rows = match limit {
            Some(limit) => {
                sqlx::query(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM (
                         SELECT * FROM ai_conversation_messages
                         WHERE conversation_id = ?
                         ORDER BY sequence DESC
                         LIMIT ?
                     ) ORDER BY sequence ASC"
                ))
                .bind(&conversation_id.0)
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM ai_conversation_messages
                     WHERE conversation_id = ?
                     ORDER BY sequence ASC"
                ))
                .bind(&conversation_id.0)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use cheers_core::domain::conversation::{
        Conversation, ConversationUpdate, Message, MessageRole, TokenUsage,
    };
    use cheers_core::domain::pending_action::PendingActionId;

    use super::SqlConversationRepository;
    use crate::repositories::{ConversationRepository, RepositoryError};
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlConversationRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlConversationRepository::new(pool)
    }

    fn at(minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 18, minute, 0).single().expect("valid timestamp")
    }

    #[tokio::test]
    async fn append_message_bumps_count_and_last_activity() {
        let repo = repository().await;
        let conversation = Conversation::start("user-1", "What is on tonight?", at(0));
        let id = conversation.id.clone();
        repo.create(conversation).await.expect("create");

        let mut reply = Message::new(id.clone(), MessageRole::Assistant, "Quiz night at 20:00", at(5));
        reply.tools_used = vec!["get_events".to_string()];
        reply.pending_action_id = Some(PendingActionId("pa-1".to_string()));
        reply.token_usage = Some(TokenUsage { input_tokens: 120, output_tokens: 30, ..Default::default() });
        repo.append_message(Message::new(id.clone(), MessageRole::User, "What is on tonight?", at(4)))
            .await
            .expect("append user");
        repo.append_message(reply.clone()).await.expect("append reply");

        let stored = repo.find_by_id(&id).await.expect("find").expect("exists");
        assert_eq!(stored.message_count, 2);
        assert_eq!(stored.last_message_at, Some(at(5)));

        let messages = repo.list_messages(&id, None).await.expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1], reply);
    }

    #[tokio::test]
    async fn list_messages_with_limit_returns_newest_in_creation_order() {
        let repo = repository().await;
        let conversation = Conversation::start("user-1", "hello", at(0));
        let id = conversation.id.clone();
        repo.create(conversation).await.expect("create");

        for index in 0..5u32 {
            let message = Message::new(id.clone(), MessageRole::User, format!("m{index}"), at(index));
            repo.append_message(message).await.expect("append");
        }

        let tail = repo.list_messages(&id, Some(3)).await.expect("messages");
        let contents: Vec<&str> = tail.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[tokio::test]
    async fn listing_orders_by_activity_with_idle_conversations_last() {
        let repo = repository().await;
        let idle = Conversation::start("user-1", "never used", at(0));
        let older = Conversation::start("user-1", "older", at(1));
        let newer = Conversation::start("user-1", "newer", at(2));
        let foreign = Conversation::start("user-2", "someone else", at(3));
        for conversation in [&idle, &older, &newer, &foreign] {
            repo.create(conversation.clone()).await.expect("create");
        }

        repo.append_message(Message::new(newer.id.clone(), MessageRole::User, "a", at(10)))
            .await
            .expect("append");
        repo.append_message(Message::new(older.id.clone(), MessageRole::User, "b", at(20)))
            .await
            .expect("append");

        let listed = repo.list_for_user("user-1", 10, 0).await.expect("list");
        let ids: Vec<_> = listed.iter().map(|c| c.id.clone()).collect();
        assert_eq!(ids, vec![older.id.clone(), newer.id.clone(), idle.id.clone()]);

        let second_page = repo.list_for_user("user-1", 1, 1).await.expect("page");
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].id, newer.id);
    }

    #[tokio::test]
    async fn delete_cascades_to_messages() {
        let repo = repository().await;
        let conversation = Conversation::start("user-1", "hello", at(0));
        let id = conversation.id.clone();
        repo.create(conversation).await.expect("create");
        repo.append_message(Message::new(id.clone(), MessageRole::User, "hello", at(1)))
            .await
            .expect("append");

        assert!(repo.delete(&id).await.expect("delete"));
        assert!(!repo.delete(&id).await.expect("second delete"));
        assert!(repo.find_by_id(&id).await.expect("find").is_none());
        assert!(repo.list_messages(&id, None).await.expect("messages").is_empty());
    }

    #[tokio::test]
    async fn append_to_missing_conversation_is_not_found() {
        let repo = repository().await;
        let orphan = Message::new(
            cheers_core::ConversationId("missing".to_string()),
            MessageRole::User,
            "hi",
            at(0),
        );

        let error = repo.append_message(orphan).await.expect_err("should fail");
        assert!(matches!(error, RepositoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn usage_and_updates_accumulate() {
        let repo = repository().await;
        let conversation = Conversation::start("user-1", "hello", at(0));
        let id = conversation.id.clone();
        repo.create(conversation).await.expect("create");

        repo.record_usage(&id, 150, Decimal::new(125, 5), at(1)).await.expect("usage");
        repo.record_usage(&id, 50, Decimal::new(75, 5), at(2)).await.expect("usage");
        let updated = repo
            .update(
                &id,
                ConversationUpdate { pinned: Some(true), title: Some("Pinned".into()), ..Default::default() },
                at(3) + Duration::seconds(1),
            )
            .await
            .expect("update");

        assert!(updated.pinned);
        let stored = repo.find_by_id(&id).await.expect("find").expect("exists");
        assert_eq!(stored.total_tokens, 200);
        assert_eq!(stored.estimated_cost_usd, Decimal::new(2, 3));
        assert_eq!(stored.title.as_deref(), Some("Pinned"));
        assert!(stored.pinned);
    }
}
