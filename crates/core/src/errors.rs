use thiserror::Error;

use crate::domain::role::UserRole;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown model override: {0}")]
    UnknownModelOverride(String),
    #[error("Unknown sub-agent: {0}")]
    UnknownSubAgent(String),
    #[error("tool `{tool}` is not permitted for role `{role}`")]
    ToolNotPermitted { tool: String, role: UserRole },
    #[error("invalid input for tool `{tool}`: {message}")]
    InvalidToolInput { tool: String, message: String },
    #[error("action {0} belongs to another user")]
    ActionNotOwned(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::ServiceUnavailable { .. } => {
                "The assistant is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::ToolNotPermitted { tool, role }) => {
                Self::Forbidden {
                    message: format!("tool `{tool}` is not permitted for role `{role}`"),
                    correlation_id: unassigned(),
                }
            }
            ApplicationError::Domain(DomainError::ActionNotOwned(id)) => Self::Forbidden {
                message: format!("action {id} belongs to another user"),
                correlation_id: unassigned(),
            },
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::role::UserRole;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn unknown_override_maps_to_bad_request_with_correlation_id() {
        let interface =
            ApplicationError::from(DomainError::UnknownModelOverride("gpt-9".to_owned()))
                .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn tool_not_permitted_is_forbidden_and_names_the_tool() {
        let interface = ApplicationError::from(DomainError::ToolNotPermitted {
            tool: "create_shift".to_owned(),
            role: UserRole::Waiter,
        })
        .into_interface("req-2");

        match interface {
            InterfaceError::Forbidden { ref message, .. } => {
                assert!(message.contains("create_shift"));
                assert!(message.contains("waiter"));
            }
            other => panic!("expected forbidden, got {other:?}"),
        }
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-3");
    }

    #[test]
    fn user_message_never_echoes_internal_detail() {
        let interface =
            ApplicationError::Configuration("api key rejected".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert!(!interface.user_message().contains("api key"));
    }
}
