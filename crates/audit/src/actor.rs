use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crewplan_core::UserId;

/// Role recorded alongside an actor on audit entries.
///
/// Roles are intentionally opaque strings at this layer; mapping roles to
/// permissions or display names is the caller's concern. Actor identity is
/// recorded for audit only and does not gate correctness in this core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorRole(Cow<'static, str>);

impl ActorRole {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ActorRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who performed a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: ActorRole,
}

impl Actor {
    pub fn new(id: UserId, role: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id,
            role: ActorRole::new(role),
        }
    }
}
