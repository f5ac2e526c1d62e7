use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crewplan_core::{EntityKind, UserId};

use crate::actor::Actor;
use crate::entry::{AuditAction, AuditLogEntry, AuditPayload};

/// Audit trail operation error.
#[derive(Debug, Clone, Error)]
pub enum AuditError {
    #[error("payload serialization failed: {0}")]
    Payload(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Append-only audit trail.
///
/// Implementations must:
/// - never mutate or delete an entry once appended
/// - order read results by `recorded_at` descending
/// - not assume anything about payload contents (opaque blobs)
pub trait AuditTrail: Send + Sync {
    /// Append one entry (append-only).
    fn append(&self, entry: AuditLogEntry) -> Result<AuditLogEntry, AuditError>;

    /// All entries for one entity, newest first.
    fn for_entity(&self, kind: EntityKind, entity_id: Uuid)
    -> Result<Vec<AuditLogEntry>, AuditError>;

    /// All entries recorded by one actor, newest first.
    fn for_actor(&self, actor_id: UserId) -> Result<Vec<AuditLogEntry>, AuditError>;

    /// The most recent `limit` entries across all entities, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<AuditLogEntry>, AuditError>;

    fn log_create(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        actor: &Actor,
        payload: AuditPayload,
    ) -> Result<AuditLogEntry, AuditError> {
        self.append(AuditLogEntry::record(
            kind,
            entity_id,
            AuditAction::Create,
            actor,
            payload,
        ))
    }

    fn log_update(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        actor: &Actor,
        payload: AuditPayload,
    ) -> Result<AuditLogEntry, AuditError> {
        self.append(AuditLogEntry::record(
            kind,
            entity_id,
            AuditAction::Update,
            actor,
            payload,
        ))
    }

    fn log_delete(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        actor: &Actor,
        payload: AuditPayload,
    ) -> Result<AuditLogEntry, AuditError> {
        self.append(AuditLogEntry::record(
            kind,
            entity_id,
            AuditAction::Delete,
            actor,
            payload,
        ))
    }

    fn log_status_change(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
        actor: &Actor,
        payload: AuditPayload,
    ) -> Result<AuditLogEntry, AuditError> {
        self.append(AuditLogEntry::record(
            kind,
            entity_id,
            AuditAction::StatusChange,
            actor,
            payload,
        ))
    }
}

impl<T> AuditTrail for Arc<T>
where
    T: AuditTrail + ?Sized,
{
    fn append(&self, entry: AuditLogEntry) -> Result<AuditLogEntry, AuditError> {
        (**self).append(entry)
    }

    fn for_entity(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        (**self).for_entity(kind, entity_id)
    }

    fn for_actor(&self, actor_id: UserId) -> Result<Vec<AuditLogEntry>, AuditError> {
        (**self).for_actor(actor_id)
    }

    fn recent(&self, limit: usize) -> Result<Vec<AuditLogEntry>, AuditError> {
        (**self).recent(limit)
    }
}
