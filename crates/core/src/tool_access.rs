//! Role to tool permissions.

use crate::catalog::{assistant_tools, ToolDefinition};
use crate::domain::role::UserRole;
use crate::errors::DomainError;

const RESERVATION_TOOLS: &[&str] =
    &["get_reservations", "create_reservation", "update_reservation_status", "assign_table"];
const STOCK_TOOLS: &[&str] = &["get_stock_levels", "record_stock_movement"];
const STAFF_TOOLS: &[&str] = &[
    "get_staff_schedule",
    "get_employees",
    "create_shift",
    "update_shift",
    "create_task",
    "update_task_status",
];
const EVENT_TOOLS: &[&str] = &["get_events", "create_event", "update_event"];
const COCKTAIL_TOOLS: &[&str] = &["get_cocktail_recipe", "search_cocktails_by_ingredient"];
const AD_TOOLS: &[&str] = &["get_ads", "create_ad", "update_ad"];
const TASK_PLAN_TOOLS: &[&str] =
    &["get_weekly_task_plan", "create_planned_task", "update_planned_task"];
const IMAGE_TOOLS: &[&str] = &["generate_image"];
const DELEGATE_TOOLS: &[&str] = &[
    "delegate_advertising_manager",
    "delegate_cocktail_specialist",
    "delegate_schedule_optimizer",
];

const MANAGEMENT_GROUPS: &[&[&str]] = &[
    RESERVATION_TOOLS,
    STOCK_TOOLS,
    STAFF_TOOLS,
    EVENT_TOOLS,
    COCKTAIL_TOOLS,
    AD_TOOLS,
    TASK_PLAN_TOOLS,
    IMAGE_TOOLS,
    DELEGATE_TOOLS,
];

const KITCHEN_TOOLS: &[&str] = &[
    "get_stock_levels",
    "record_stock_movement",
    "get_staff_schedule",
    "get_cocktail_recipe",
    "search_cocktails_by_ingredient",
];

const BAR_TOOLS: &[&str] = &[
    "get_stock_levels",
    "record_stock_movement",
    "get_events",
    "get_staff_schedule",
    "get_cocktail_recipe",
    "search_cocktails_by_ingredient",
    "delegate_cocktail_specialist",
    "generate_image",
];

const WAITER_TOOLS: &[&str] = &[
    "get_reservations",
    "create_reservation",
    "update_reservation_status",
    "get_events",
    "get_staff_schedule",
    "get_cocktail_recipe",
    "get_weekly_task_plan",
];

const DJ_TOOLS: &[&str] =
    &["get_events", "create_event", "update_event", "get_staff_schedule", "get_cocktail_recipe"];

pub fn is_tool_allowed(role: UserRole, tool_name: &str) -> bool {
    match role {
        UserRole::Admin | UserRole::Owner | UserRole::Manager => {
            MANAGEMENT_GROUPS.iter().any(|group| group.contains(&tool_name))
        }
        UserRole::Kitchen => KITCHEN_TOOLS.contains(&tool_name),
        UserRole::Bar => BAR_TOOLS.contains(&tool_name),
        UserRole::Waiter => WAITER_TOOLS.contains(&tool_name),
        UserRole::Dj => DJ_TOOLS.contains(&tool_name),
    }
}

/// The catalog subset a role may invoke, in catalog order.
pub fn tools_for_role(role: UserRole) -> Vec<&'static ToolDefinition> {
    assistant_tools().iter().filter(|tool| is_tool_allowed(role, &tool.name)).collect()
}

pub fn ensure_permitted(role: UserRole, tool_name: &str) -> Result<(), DomainError> {
    if is_tool_allowed(role, tool_name) {
        Ok(())
    } else {
        Err(DomainError::ToolNotPermitted { tool: tool_name.to_string(), role })
    }
}

/// Resolves the tool set for one request.
///
/// With no explicit request the whole role subset is used. An explicit
/// request naming any tool outside the subset fails before the model is called.
pub fn resolve_tools(
    role: UserRole,
    requested: Option<&[String]>,
) -> Result<Vec<&'static ToolDefinition>, DomainError> {
    let Some(requested) = requested else {
        return Ok(tools_for_role(role));
    };

    for name in requested {
        ensure_permitted(role, name)?;
    }

    Ok(assistant_tools().iter().filter(|tool| requested.contains(&tool.name)).collect())
}

#[cfg(test)]
mod tests {
    use super::{ensure_permitted, resolve_tools, tools_for_role};
    use crate::catalog::assistant_tools;
    use crate::domain::role::UserRole;
    use crate::errors::DomainError;

    #[test]
    fn management_sees_the_full_catalog() {
        for role in UserRole::MANAGEMENT {
            assert_eq!(tools_for_role(role).len(), assistant_tools().len());
        }
    }

    #[test]
    fn waiter_can_book_tables_but_not_create_shifts() {
        let names: Vec<_> =
            tools_for_role(UserRole::Waiter).into_iter().map(|tool| tool.name.as_str()).collect();
        assert!(names.contains(&"create_reservation"));
        assert!(!names.contains(&"create_shift"));
        assert!(!names.contains(&"delegate_schedule_optimizer"));
    }

    #[test]
    fn bar_may_delegate_to_cocktail_specialist_only() {
        assert!(ensure_permitted(UserRole::Bar, "delegate_cocktail_specialist").is_ok());
        assert!(ensure_permitted(UserRole::Bar, "delegate_schedule_optimizer").is_err());
    }

    #[test]
    fn every_role_tool_exists_in_catalog() {
        for role in UserRole::ALL {
            assert!(!tools_for_role(role).is_empty(), "{role} has no tools");
        }
    }

    #[test]
    fn explicit_request_outside_role_fails_fast() {
        let requested = vec!["get_events".to_string(), "create_shift".to_string()];
        let result = resolve_tools(UserRole::Dj, Some(&requested));

        assert_eq!(
            result.map(|tools| tools.len()),
            Err(DomainError::ToolNotPermitted {
                tool: "create_shift".to_string(),
                role: UserRole::Dj
            })
        );
    }

    #[test]
    fn explicit_request_keeps_catalog_order() -> Result<(), DomainError> {
        let requested = vec!["update_event".to_string(), "get_events".to_string()];
        let tools = resolve_tools(UserRole::Dj, Some(&requested))?;
        let names: Vec<_> = tools.iter().map(|tool| tool.name.as_str()).collect();
        assert_eq!(names, vec!["get_events", "update_event"]);
        Ok(())
    }
}
