use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Owner,
    Manager,
    Kitchen,
    Bar,
    Waiter,
    Dj,
}

impl UserRole {
    pub const ALL: [UserRole; 7] = [
        Self::Admin,
        Self::Owner,
        Self::Manager,
        Self::Kitchen,
        Self::Bar,
        Self::Waiter,
        Self::Dj,
    ];

    pub const MANAGEMENT: [UserRole; 3] = [Self::Admin, Self::Owner, Self::Manager];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Owner => "owner",
            Self::Manager => "manager",
            Self::Kitchen => "kitchen",
            Self::Bar => "bar",
            Self::Waiter => "waiter",
            Self::Dj => "dj",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "owner" => Some(Self::Owner),
            "manager" => Some(Self::Manager),
            "kitchen" => Some(Self::Kitchen),
            "bar" => Some(Self::Bar),
            "waiter" => Some(Self::Waiter),
            "dj" => Some(Self::Dj),
            _ => None,
        }
    }

    /// Profiles with a missing or unrecognised role get the least privileged floor role.
    pub fn from_profile(value: Option<&str>) -> Self {
        value.and_then(Self::parse).unwrap_or(Self::Waiter)
    }

    pub fn is_management(&self) -> bool {
        Self::MANAGEMENT.contains(self)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
