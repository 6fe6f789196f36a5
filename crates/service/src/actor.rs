use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voiceplan_core::FlagContext;

/// The authenticated caller, as resolved by upstream middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub organization_id: Uuid,
}

impl Actor {
    #[must_use]
    pub const fn new(user_id: Uuid, organization_id: Uuid) -> Self {
        Self { user_id, organization_id }
    }

    #[must_use]
    pub const fn flag_context(&self) -> FlagContext {
        FlagContext::new(self.user_id, self.organization_id)
    }
}
