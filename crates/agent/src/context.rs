//! Live-context probes injected into the system prompt.
//!
//! Each resolver pairs a keyword pattern with the roles it serves. Matching
//! resolvers run concurrently; a failing probe is logged and contributes no
//! section. Sections are joined in registration order:
//! reservations, low stock, events, cocktail ingredients, staff on duty, task plan.

use chrono::NaiveDate;
use futures::future::join_all;
use regex::{Regex, RegexBuilder};
use tracing::warn;

use cheers_core::UserRole;
use cheers_db::{DataStore, DataStoreError, Filter, RowQuery};

use crate::read_tools::{employee_names, is_low_stock, number, text, week_start};

const RESERVATION_LIMIT: u32 = 20;
const STOCK_SCAN_LIMIT: u32 = 15;
const EVENT_LIMIT: u32 = 10;
const INGREDIENT_SCAN_LIMIT: u32 = 50;
const SHIFT_LIMIT: u32 = 20;

const RESERVATION_ROLES: &[UserRole] =
    &[UserRole::Admin, UserRole::Owner, UserRole::Manager, UserRole::Waiter];
const STOCK_ROLES: &[UserRole] =
    &[UserRole::Admin, UserRole::Owner, UserRole::Manager, UserRole::Kitchen, UserRole::Bar];
const COCKTAIL_ROLES: &[UserRole] =
    &[UserRole::Admin, UserRole::Owner, UserRole::Manager, UserRole::Bar];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Probe {
    TodaysReservations,
    LowStock,
    TodaysEvents,
    CocktailIngredients,
    StaffOnDuty,
    TaskPlan,
}

impl Probe {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TodaysReservations => "todays_reservations",
            Self::LowStock => "low_stock",
            Self::TodaysEvents => "todays_events",
            Self::CocktailIngredients => "cocktail_ingredients",
            Self::StaffOnDuty => "staff_on_duty",
            Self::TaskPlan => "task_plan",
        }
    }

    async fn resolve(
        &self,
        store: &dyn DataStore,
        today: NaiveDate,
    ) -> Result<Option<String>, DataStoreError> {
        let today_str = today.format("%Y-%m-%d").to_string();
        match self {
            Self::TodaysReservations => {
                let rows = store
                    .select(
                        "reservations",
                        RowQuery::new()
                            .filter(Filter::eq("reservation_date", today_str.as_str()))
                            .order_by("reservation_time")
                            .limit(RESERVATION_LIMIT),
                    )
                    .await?;
                if rows.is_empty() {
                    return Ok(None);
                }
                let lines: Vec<String> = rows
                    .iter()
                    .map(|row| {
                        let requests = match text(row, "special_requests") {
                            "" => String::new(),
                            notes => format!(" ({notes})"),
                        };
                        format!(
                            "- {} | {} ({} pax) [{}]{requests}",
                            text(row, "reservation_time"),
                            text(row, "guest_name"),
                            number(row, "party_size") as i64,
                            text(row, "status"),
                        )
                    })
                    .collect();
                Ok(Some(format!(
                    "## Today's Reservations ({} total)\n{}",
                    rows.len(),
                    lines.join("\n")
                )))
            }
            Self::LowStock => {
                let rows = store
                    .select(
                        "stock_items",
                        RowQuery::new()
                            .columns(&["name", "current_stock", "min_stock", "unit"])
                            .order_by("current_stock")
                            .limit(STOCK_SCAN_LIMIT),
                    )
                    .await?;
                let low: Vec<String> = rows
                    .iter()
                    .filter(|row| is_low_stock(row))
                    .map(|row| {
                        format!(
                            "- {}: {} {} (min: {})",
                            text(row, "name"),
                            number(row, "current_stock"),
                            text(row, "unit"),
                            number(row, "min_stock"),
                        )
                    })
                    .collect();
                if low.is_empty() {
                    return Ok(None);
                }
                Ok(Some(format!("## Low Stock Alerts ({} items)\n{}", low.len(), low.join("\n"))))
            }
            Self::TodaysEvents => {
                let rows = store
                    .select(
                        "events",
                        RowQuery::new()
                            .filter(Filter::eq("event_date", today_str.as_str()))
                            .order_by("start_time")
                            .limit(EVENT_LIMIT),
                    )
                    .await?;
                if rows.is_empty() {
                    return Ok(None);
                }
                let lines: Vec<String> = rows
                    .iter()
                    .map(|row| {
                        let end = match text(row, "end_time") {
                            "" => String::new(),
                            end => format!("-{end}"),
                        };
                        format!(
                            "- {}{end} | {} [{}] ({})",
                            text(row, "start_time"),
                            text(row, "title"),
                            text(row, "event_type"),
                            text(row, "status"),
                        )
                    })
                    .collect();
                Ok(Some(format!("## Today's Events ({})\n{}", rows.len(), lines.join("\n"))))
            }
            Self::CocktailIngredients => {
                let ingredients = store
                    .select(
                        "menu_ingredients",
                        RowQuery::new()
                            .columns(&["ingredient_name", "stock_item_id"])
                            .order_by("ingredient_name")
                            .limit(INGREDIENT_SCAN_LIMIT),
                    )
                    .await?;
                let linked: Vec<serde_json::Value> = ingredients
                    .iter()
                    .filter_map(|row| row.get("stock_item_id").filter(|id| id.is_string()).cloned())
                    .collect();
                if linked.is_empty() {
                    return Ok(None);
                }
                let stock = store
                    .select("stock_items", RowQuery::new().filter(Filter::any_of("id", linked)))
                    .await?;

                let lines: Vec<String> = ingredients
                    .iter()
                    .filter_map(|ingredient| {
                        let product = stock
                            .iter()
                            .find(|item| text(item, "id") == text(ingredient, "stock_item_id"))?;
                        is_low_stock(product).then(|| {
                            format!(
                                "- {}: linked to \"{}\", stock: {} {} (min: {})",
                                text(ingredient, "ingredient_name"),
                                text(product, "name"),
                                number(product, "current_stock"),
                                text(product, "unit"),
                                number(product, "min_stock"),
                            )
                        })
                    })
                    .collect();
                if lines.is_empty() {
                    return Ok(None);
                }
                Ok(Some(format!(
                    "## Cocktail Ingredients Low Stock ({} items)\n{}",
                    lines.len(),
                    lines.join("\n")
                )))
            }
            Self::StaffOnDuty => {
                let rows = store
                    .select(
                        "shifts",
                        RowQuery::new()
                            .filter(Filter::eq("shift_date", today_str.as_str()))
                            .filter(Filter::eq("is_day_off", 0))
                            .order_by("start_time")
                            .limit(SHIFT_LIMIT),
                    )
                    .await?;
                if rows.is_empty() {
                    return Ok(None);
                }
                let names = employee_names(store, &rows, "employee_id").await?;
                let lines: Vec<String> = rows
                    .iter()
                    .map(|row| {
                        let name = names
                            .get(text(row, "employee_id"))
                            .map(String::as_str)
                            .unwrap_or("Unknown");
                        format!(
                            "- {}-{} | {name} ({})",
                            text(row, "start_time"),
                            text(row, "end_time"),
                            text(row, "role"),
                        )
                    })
                    .collect();
                Ok(Some(format!(
                    "## Staff On Duty Today ({} shifts)\n{}",
                    rows.len(),
                    lines.join("\n")
                )))
            }
            Self::TaskPlan => {
                let week = week_start(today).format("%Y-%m-%d").to_string();
                let plan = store
                    .select(
                        "weekly_task_plans",
                        RowQuery::new().filter(Filter::eq("week_start_date", week.as_str())).limit(1),
                    )
                    .await?
                    .into_iter()
                    .next();
                let Some(plan) = plan else {
                    return Ok(Some(format!(
                        "## Task Planning\nNo task plan for current week ({week}). Use create_planned_task to start planning."
                    )));
                };
                let tasks = store
                    .select(
                        "planned_tasks",
                        RowQuery::new()
                            .columns(&["status"])
                            .filter(Filter::eq("plan_id", text(&plan, "id"))),
                    )
                    .await?;
                let count = |status: &str| tasks.iter().filter(|task| text(task, "status") == status).count();
                Ok(Some(format!(
                    "## Current Week Task Plan ({week})\n- Status: {}\n- Total tasks: {} ({} pending, {} completed)",
                    text(&plan, "status"),
                    tasks.len(),
                    count("pending"),
                    count("completed"),
                )))
            }
        }
    }
}

struct ContextResolver {
    probe: Probe,
    keywords: Regex,
    roles: &'static [UserRole],
}

pub struct ContextRegistry {
    resolvers: Vec<ContextResolver>,
}

/// Registration order is also output order.
const REGISTRY: &[(Probe, &str, &[UserRole])] = &[
    (Probe::TodaysReservations, r"reserv|table|tonight|booking|guest|party", RESERVATION_ROLES),
    (Probe::LowStock, r"stock|order|keg|beer|reorder|supply|ingredient|run.*out", STOCK_ROLES),
    (Probe::TodaysEvents, r"event|dj|sport|tonight|music|broadcast|quiz|theme", &UserRole::ALL),
    (
        Probe::CocktailIngredients,
        r"cocktail|recipe|mixol|drink.*menu|bar.*stock|spirit",
        COCKTAIL_ROLES,
    ),
    (Probe::StaffOnDuty, r"who.*work|staff|schedule|shift|on duty|coverage", &UserRole::MANAGEMENT),
    (
        Probe::TaskPlan,
        r"task.*plan|planning|planifica|tarea.*semana|weekly.*task|zone.*assign|asigna.*zona",
        &UserRole::MANAGEMENT,
    ),
];

impl ContextRegistry {
    pub fn new() -> Result<Self, regex::Error> {
        let resolvers = REGISTRY
            .iter()
            .map(|(probe, pattern, roles)| {
                RegexBuilder::new(pattern).case_insensitive(true).build().map(|keywords| {
                    ContextResolver { probe: *probe, keywords, roles }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { resolvers })
    }

    /// Probes whose keywords match the message and whose roles include `role`.
    pub fn matching(&self, message: &str, role: UserRole) -> Vec<Probe> {
        self.resolvers
            .iter()
            .filter(|resolver| resolver.roles.contains(&role) && resolver.keywords.is_match(message))
            .map(|resolver| resolver.probe)
            .collect()
    }

    pub async fn resolve(
        &self,
        message: &str,
        role: UserRole,
        store: &dyn DataStore,
        today: NaiveDate,
    ) -> Option<String> {
        let probes = self.matching(message, role);
        if probes.is_empty() {
            return None;
        }

        let results = join_all(probes.iter().map(|probe| probe.resolve(store, today))).await;
        let sections: Vec<String> = probes
            .iter()
            .zip(results)
            .filter_map(|(probe, result)| match result {
                Ok(section) => section,
                Err(error) => {
                    warn!(
                        event_name = "agent.context.resolver_failed",
                        resolver = probe.name(),
                        error = %error,
                        "context resolver failed; section skipped"
                    );
                    None
                }
            })
            .collect();

        (!sections.is_empty()).then(|| sections.join("\n\n"))
    }
}
