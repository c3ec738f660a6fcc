use serde::{Deserialize, Serialize};

use crate::participant::ParticipantKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Anonymous,
    User,
    Vendor,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anonymous" | "guest" => Some(Role::Anonymous),
            "user" => Some(Role::User),
            "vendor" | "owner" => Some(Role::Vendor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Anonymous => "anonymous",
            Role::User => "user",
            Role::Vendor => "vendor",
            Role::Admin => "admin",
        }
    }

    pub fn participant_kind(&self) -> Option<ParticipantKind> {
        match self {
            Role::User => Some(ParticipantKind::User),
            Role::Vendor => Some(ParticipantKind::Vendor),
            Role::Anonymous | Role::Admin => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_owner_alias_for_vendor() {
        assert_eq!(Role::parse("Owner"), Some(Role::Vendor));
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse("root"), None);
    }
}
