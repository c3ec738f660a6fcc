use thiserror::Error;

use crate::participant::{ParticipantKind, UnresolvedParticipant};

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("chat requires a prior booking")]
    BookingRequired,
    #[error("cannot determine participant roles: {}", describe_unresolved(.0))]
    RolesUnresolved(Vec<UnresolvedParticipant>),
    #[error("chats between two {0} participants are not supported")]
    SameTypePair(ParticipantKind),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

fn describe_unresolved(items: &[UnresolvedParticipant]) -> String {
    items
        .iter()
        .map(|item| format!("{} ({})", item.participant_id, item.reason))
        .collect::<Vec<_>>()
        .join(", ")
}
