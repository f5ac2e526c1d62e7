use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crewplan_core::{EntityKind, UserId};

use crate::entry::AuditLogEntry;
use crate::trail::{AuditError, AuditTrail};

/// In-memory append-only audit trail.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryAuditTrail {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn collect_sorted<F>(&self, pred: F) -> Result<Vec<AuditLogEntry>, AuditError>
    where
        F: Fn(&AuditLogEntry) -> bool,
    {
        let entries = self
            .entries
            .read()
            .map_err(|_| AuditError::Storage("lock poisoned".to_string()))?;

        let mut matched: Vec<AuditLogEntry> = entries.iter().filter(|e| pred(e)).cloned().collect();
        matched.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(matched)
    }
}

impl AuditTrail for InMemoryAuditTrail {
    fn append(&self, entry: AuditLogEntry) -> Result<AuditLogEntry, AuditError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AuditError::Storage("lock poisoned".to_string()))?;

        entries.push(entry.clone());
        Ok(entry)
    }

    fn for_entity(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        self.collect_sorted(|e| e.entity_kind == kind && e.entity_id == entity_id)
    }

    fn for_actor(&self, actor_id: UserId) -> Result<Vec<AuditLogEntry>, AuditError> {
        self.collect_sorted(|e| e.actor_id == actor_id)
    }

    fn recent(&self, limit: usize) -> Result<Vec<AuditLogEntry>, AuditError> {
        let mut all = self.collect_sorted(|_| true)?;
        all.truncate(limit);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Actor;
    use crate::entry::{AuditAction, AuditLogEntry, AuditPayload};

    fn entry_for(kind: EntityKind, entity_id: Uuid, actor: &Actor) -> AuditLogEntry {
        AuditLogEntry::record(kind, entity_id, AuditAction::Create, actor, AuditPayload::empty())
    }

    #[test]
    fn for_entity_returns_only_matching_entries_newest_first() {
        let trail = InMemoryAuditTrail::new();
        let actor = Actor::new(UserId::new(), "manager");
        let target = Uuid::now_v7();
        let other = Uuid::now_v7();

        trail.append(entry_for(EntityKind::Assignment, target, &actor)).unwrap();
        trail.append(entry_for(EntityKind::Phase, other, &actor)).unwrap();
        trail.append(entry_for(EntityKind::Assignment, target, &actor)).unwrap();

        let found = trail.for_entity(EntityKind::Assignment, target).unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].recorded_at >= found[1].recorded_at);
    }

    #[test]
    fn recent_caps_at_limit() {
        let trail = InMemoryAuditTrail::new();
        let actor = Actor::new(UserId::new(), "team_leader");

        for _ in 0..5 {
            trail
                .append(entry_for(EntityKind::Task, Uuid::now_v7(), &actor))
                .unwrap();
        }

        assert_eq!(trail.recent(3).unwrap().len(), 3);
        assert_eq!(trail.recent(100).unwrap().len(), 5);
    }

    #[test]
    fn status_change_entries_carry_old_and_new_status() {
        let trail = InMemoryAuditTrail::new();
        let actor = Actor::new(UserId::new(), "team_leader");
        let phase = Uuid::now_v7();

        trail
            .log_status_change(
                EntityKind::Phase,
                phase,
                &actor,
                AuditPayload::status_change("planned", "in_progress"),
            )
            .unwrap();

        let entries = trail.for_entity(EntityKind::Phase, phase).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::StatusChange);
        assert_eq!(entries[0].payload.old_status.as_deref(), Some("planned"));
        assert_eq!(entries[0].payload.new_status.as_deref(), Some("in_progress"));
    }

    #[test]
    fn for_actor_filters_by_actor_id() {
        let trail = InMemoryAuditTrail::new();
        let alice = Actor::new(UserId::new(), "manager");
        let bob = Actor::new(UserId::new(), "team_member");

        trail.append(entry_for(EntityKind::Project, Uuid::now_v7(), &alice)).unwrap();
        trail.append(entry_for(EntityKind::Project, Uuid::now_v7(), &bob)).unwrap();

        let by_alice = trail.for_actor(alice.id).unwrap();
        assert_eq!(by_alice.len(), 1);
        assert_eq!(by_alice[0].actor_id, alice.id);
    }
}
