use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crewplan_core::{AuditEntryId, EntityKind, UserId};

use crate::actor::{Actor, ActorRole};

/// What happened to the entity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    StatusChange,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::StatusChange => "status_change",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque snapshot attached to an entry.
///
/// No fixed schema beyond the optional keys below. Payloads are stored as
/// JSON blobs and never interpreted by this crate; consumers that want
/// structured diffs deserialize on their side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<String>,
}

impl AuditPayload {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot for a creation: only the resulting state.
    pub fn created<T: Serialize>(after: &T) -> serde_json::Result<Self> {
        Ok(Self {
            after: Some(serde_json::to_value(after)?),
            ..Self::default()
        })
    }

    /// Snapshot for an update: state before and after the write.
    pub fn changed<B: Serialize, A: Serialize>(
        before: &B,
        after: &A,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            before: Some(serde_json::to_value(before)?),
            after: Some(serde_json::to_value(after)?),
            ..Self::default()
        })
    }

    /// Snapshot for a deletion: only the state that was removed.
    pub fn deleted<T: Serialize>(before: &T) -> serde_json::Result<Self> {
        Ok(Self {
            before: Some(serde_json::to_value(before)?),
            ..Self::default()
        })
    }

    pub fn status_change(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old_status: Some(old.into()),
            new_status: Some(new.into()),
            ..Self::default()
        }
    }
}

/// One immutable audit-log row.
///
/// Ordered by `recorded_at` for chronological replay; no global sequence
/// spans unrelated entity kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditEntryId,
    pub entity_kind: EntityKind,
    /// Opaque id of the affected row (typed ids erase to `Uuid` here).
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub actor_id: UserId,
    pub actor_role: ActorRole,
    pub payload: AuditPayload,
    pub recorded_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Build a new entry stamped with the current time.
    pub fn record(
        entity_kind: EntityKind,
        entity_id: Uuid,
        action: AuditAction,
        actor: &Actor,
        payload: AuditPayload,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            entity_kind,
            entity_id,
            action,
            actor_id: actor.id,
            actor_role: actor.role.clone(),
            payload,
            recorded_at: Utc::now(),
        }
    }
}
