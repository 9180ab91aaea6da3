//! Role-aware system prompt rendered with tera.
//!
//! The rendered text is the first cacheable segment of every request, so it only
//! depends on the caller and the clock. Live data goes into the context segment.

use chrono::NaiveDateTime;
use serde::Serialize;
use tera::{Context, Tera};

use cheers_core::UserRole;

const TEMPLATE_NAME: &str = "system_prompt.md";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PromptSections {
    pub financial: bool,
    pub scheduling: bool,
    pub social: bool,
    pub review: bool,
    pub data: bool,
    pub domain: bool,
    pub write: bool,
    pub subagents: bool,
    pub advertising: bool,
}

impl PromptSections {
    pub fn for_role(role: UserRole) -> Self {
        match role {
            UserRole::Admin | UserRole::Owner | UserRole::Manager => Self {
                financial: true,
                scheduling: true,
                social: true,
                review: true,
                data: true,
                domain: true,
                write: true,
                subagents: true,
                advertising: true,
            },
            UserRole::Kitchen => Self { scheduling: true, domain: true, ..Self::default() },
            UserRole::Bar => Self { scheduling: true, domain: true, write: true, ..Self::default() },
            UserRole::Waiter => Self { review: true, domain: true, write: true, ..Self::default() },
            UserRole::Dj => Self { domain: true, write: true, ..Self::default() },
        }
    }
}

#[derive(Clone, Debug)]
pub struct PromptContext<'a> {
    pub user_name: &'a str,
    pub role: UserRole,
    /// ISO 639-1 code from the user profile, e.g. `nl`.
    pub language: &'a str,
    /// Restaurant-local wall clock.
    pub now: NaiveDateTime,
}

pub fn language_name(code: &str) -> &str {
    match code.trim().to_ascii_lowercase().as_str() {
        "en" => "English",
        "nl" => "Nederlands",
        "es" => "Español",
        "de" => "Deutsch",
        _ if code.trim().is_empty() => "English",
        _ => code,
    }
}

pub struct SystemPromptBuilder {
    tera: Tera,
}

impl SystemPromptBuilder {
    pub fn new() -> Result<Self, tera::Error> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, include_str!("../templates/system_prompt.md"))?;
        Ok(Self { tera })
    }

    pub fn render(&self, prompt: &PromptContext<'_>) -> Result<String, tera::Error> {
        let mut context = Context::new();
        context.insert("user_name", prompt.user_name);
        context.insert("role", prompt.role.as_str());
        context.insert("language", language_name(prompt.language));
        context.insert("date", &prompt.now.format("%Y-%m-%d").to_string());
        context.insert("time", &prompt.now.format("%H:%M").to_string());
        context.insert("sections", &PromptSections::for_role(prompt.role));
        self.tera.render(TEMPLATE_NAME, &context)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use cheers_core::UserRole;

    use super::{language_name, PromptContext, SystemPromptBuilder};

    fn render(role: UserRole) -> String {
        let now = NaiveDate::from_ymd_opt(2026, 7, 18)
            .and_then(|date| date.and_hms_opt(21, 5, 0))
            .expect("valid timestamp");
        SystemPromptBuilder::new()
            .expect("template parses")
            .render(&PromptContext { user_name: "Marta & Co", role, language: "es", now })
            .expect("template renders")
    }

    #[test]
    fn header_names_the_caller_and_clock() {
        let prompt = render(UserRole::Waiter);
        assert!(prompt.starts_with("You are the AI assistant for GrandCafe Cheers"));
        assert!(prompt.contains("You are speaking with **Marta & Co** (role: waiter)."));
        assert!(prompt.contains("Current date: 2026-07-18, time: 21:05 (Europe/Madrid)."));
        assert!(prompt.contains("Preferred language: Español."));
    }

    #[test]
    fn sections_follow_the_role() {
        let waiter = render(UserRole::Waiter);
        assert!(waiter.contains("# WRITE OPERATIONS"));
        assert!(waiter.contains("## Review Responses"));
        assert!(!waiter.contains("## Financial Knowledge"));
        assert!(!waiter.contains("# SUB-AGENTS"));

        let kitchen = render(UserRole::Kitchen);
        assert!(!kitchen.contains("# WRITE OPERATIONS"));
        assert!(kitchen.contains("## Scheduling & Labor Rules"));

        let owner = render(UserRole::Owner);
        assert!(owner.contains("## Financial Knowledge"));
        assert!(owner.contains("delegate_schedule_optimizer"));
        assert!(owner.contains("# ARTIFACT TYPES"));
    }

    #[test]
    fn unknown_language_codes_pass_through() {
        assert_eq!(language_name("NL"), "Nederlands");
        assert_eq!(language_name(""), "English");
        assert_eq!(language_name("fr"), "fr");
    }
}
