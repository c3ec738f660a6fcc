use serde::{Deserialize, Serialize};

use crate::auth::Role;

/// The authenticated caller of a REST route.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActorIdentity {
    pub participant_id: String,
    pub role: Role,
}

impl ActorIdentity {
    pub fn new(participant_id: impl Into<String>, role: Role) -> Self {
        Self {
            participant_id: participant_id.into(),
            role,
        }
    }
}
