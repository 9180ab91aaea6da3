//! Per-run write-confirmation queue.
//!
//! Write tools never touch the data store. They append a [`WriteIntent`] here and the
//! runtime persists the queue as pending actions once the engine run ends. Duplicate
//! detection and the append happen under one lock, so concurrent tool calls in the
//! same model turn cannot both queue the same mutation.

use serde_json::{Map, Value};
use tokio::sync::Mutex;

use cheers_core::{PendingActionId, WriteIntent};

pub const DEFAULT_DUPLICATE_REASON: &str = "skipped: already queued";

#[derive(Clone, Debug, PartialEq)]
pub struct QueuedWrite {
    pub id: PendingActionId,
    pub intent: WriteIntent,
    pub natural_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued(PendingActionId),
    Duplicate { reason: String },
    CapReached { cap: usize },
}

pub struct WriteQueue {
    cap: usize,
    entries: Mutex<Vec<QueuedWrite>>,
}

impl WriteQueue {
    pub fn new(cap: usize) -> Self {
        Self { cap, entries: Mutex::new(Vec::new()) }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Queues an intent unless an entry with the same natural key is already present.
    pub async fn enqueue(&self, intent: WriteIntent) -> EnqueueOutcome {
        let natural_key = natural_key(&intent.tool_name, &intent.params);
        let mut entries = self.entries.lock().await;

        if let Some(key) = natural_key.as_deref() {
            if entries.iter().any(|entry| entry.natural_key.as_deref() == Some(key)) {
                return EnqueueOutcome::Duplicate {
                    reason: duplicate_reason(&intent.tool_name).to_string(),
                };
            }
        }
        if entries.len() >= self.cap {
            return EnqueueOutcome::CapReached { cap: self.cap };
        }

        let id = PendingActionId::generate();
        entries.push(QueuedWrite { id: id.clone(), intent, natural_key });
        EnqueueOutcome::Queued(id)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<QueuedWrite> {
        self.entries.lock().await.clone()
    }

    pub fn into_writes(self) -> Vec<QueuedWrite> {
        self.entries.into_inner()
    }
}

fn duplicate_reason(tool_name: &str) -> &'static str {
    match tool_name {
        "create_ad" => "Ad draft already queued with this title",
        _ => DEFAULT_DUPLICATE_REASON,
    }
}

fn key_part(params: &Map<String, Value>, field: &str) -> String {
    match params.get(field) {
        Some(Value::String(value)) => value.trim().to_lowercase(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Tool-specific identity of a mutation within one run. `None` disables duplicate checks.
pub fn natural_key(tool_name: &str, params: &Map<String, Value>) -> Option<String> {
    // Folded specialist batches carry their own members.
    if params.contains_key("items") {
        return None;
    }
    let fields: &[&str] = match tool_name {
        "create_reservation" => &["guest_name", "reservation_date", "reservation_time"],
        "update_reservation_status" | "assign_table" => &["reservation_id"],
        "create_event" => &["title", "event_date"],
        "update_event" => &["event_id"],
        "create_shift" => &["employee_id", "date", "start_time"],
        "update_shift" => &["shift_id"],
        "record_stock_movement" => &["product_id", "movement_type", "quantity", "date"],
        "create_ad" => &["title"],
        "update_ad" => &["ad_id"],
        "create_task" => &["title", "assignee_id"],
        "update_task_status" | "update_planned_task" => &["task_id"],
        "create_planned_task" => &["week_start_date", "title", "day_of_week"],
        "batch_sync_schedule"
        | "batch_sync_task_plan"
        | "export_schedule_excel"
        | "export_task_plan_excel" => &["week_start_date"],
        "publish_schedule" | "publish_task_plan" => &["plan_id"],
        _ => return None,
    };

    let parts: Vec<String> = fields.iter().map(|field| key_part(params, field)).collect();
    Some(format!("{tool_name}|{}", parts.join("|")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Map, Value};

    use cheers_core::WriteIntent;

    use super::{natural_key, EnqueueOutcome, WriteQueue, DEFAULT_DUPLICATE_REASON};

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    fn event(title: &str, date: &str) -> WriteIntent {
        WriteIntent::new("create_event", params(json!({"title": title, "event_date": date})))
    }

    #[tokio::test]
    async fn identical_natural_key_is_skipped() {
        let queue = WriteQueue::new(20);
        assert!(matches!(
            queue.enqueue(event("Quiz Night", "2026-03-20")).await,
            EnqueueOutcome::Queued(_)
        ));
        assert_eq!(
            queue.enqueue(event("  quiz night ", "2026-03-20")).await,
            EnqueueOutcome::Duplicate { reason: DEFAULT_DUPLICATE_REASON.to_string() }
        );
        assert!(matches!(
            queue.enqueue(event("Quiz Night", "2026-03-27")).await,
            EnqueueOutcome::Queued(_)
        ));
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn ads_are_keyed_by_title_with_their_own_reason() {
        let queue = WriteQueue::new(20);
        let ad = |placement: &str| {
            WriteIntent::new(
                "create_ad",
                params(json!({"title": "Summer Sunset", "placement": placement})),
            )
        };
        assert!(matches!(queue.enqueue(ad("social_media")).await, EnqueueOutcome::Queued(_)));
        assert_eq!(
            queue.enqueue(ad("email")).await,
            EnqueueOutcome::Duplicate {
                reason: "Ad draft already queued with this title".to_string()
            }
        );
    }

    #[tokio::test]
    async fn cap_bounds_the_backlog() {
        let queue = WriteQueue::new(2);
        for day in 1..=2 {
            let outcome = queue.enqueue(event("Live music", &format!("2026-03-0{day}"))).await;
            assert!(matches!(outcome, EnqueueOutcome::Queued(_)));
        }
        assert_eq!(
            queue.enqueue(event("Live music", "2026-03-03")).await,
            EnqueueOutcome::CapReached { cap: 2 }
        );
    }

    #[tokio::test]
    async fn concurrent_duplicates_queue_exactly_once() {
        let queue = Arc::new(WriteQueue::new(20));
        let attempts = (0..8).map(|_| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.enqueue(event("DJ Night", "2026-03-21")).await })
        });
        let outcomes = futures::future::join_all(attempts).await;
        let queued = outcomes
            .into_iter()
            .filter(|outcome| matches!(outcome, Ok(EnqueueOutcome::Queued(_))))
            .count();
        assert_eq!(queued, 1);
        assert_eq!(queue.len().await, 1);
    }

    #[test]
    fn unknown_tools_have_no_natural_key() {
        assert_eq!(natural_key("get_events", &Map::new()), None);
        assert_eq!(
            natural_key("publish_schedule", &params(json!({"plan_id": "p-1"}))).as_deref(),
            Some("publish_schedule|p-1")
        );
    }
}
