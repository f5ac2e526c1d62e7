//! Postgres-backed store implementation.
//!
//! Enforces the same contracts as [`InMemoryStore`](super::InMemoryStore),
//! but at the database level:
//!
//! - **Optimistic concurrency** — every version bump is a single conditional
//!   write (`UPDATE … SET version = version + 1 WHERE id = $1 AND
//!   version = $2`); zero rows affected resolves to a conflict (row present)
//!   or not-found (row absent). There is no read-then-write window.
//! - **Uniqueness** — the `(phase_id, team_member_id, role)` unique
//!   constraint backs duplicate detection (error code `23505`).
//! - **Capacity** — the cap re-check runs inside a `SERIALIZABLE`
//!   transaction together with the insert/update; a racing writer surfaces
//!   as a serialization failure (`40001`) mapped to `Concurrency`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Code | StoreError | Scenario |
//! |------------|-----------------|------------|----------|
//! | Database (unique violation) | `23505` | `DuplicateAssignment` | `(phase, member, role)` already taken |
//! | Database (serialization failure) | `40001` | `Concurrency` | Racing serializable transactions |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | PoolClosed / RowNotFound / Other | N/A | `Storage` | Pool/connection/network failures |
//!
//! ## Expected schema
//!
//! `team_members`, `projects`, `phases`, `tasks`, `assignments` (each
//! versioned table carries a `version BIGINT`), and `audit_log`
//! (`payload JSONB`, `recorded_at TIMESTAMPTZ`). Migrations live with the
//! deployment, not in this crate.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crewplan_audit::{
    ActorRole, AuditAction, AuditError, AuditLogEntry, AuditPayload, AuditTrail,
};
use crewplan_core::{
    AssignmentId, AuditEntryId, EntityKind, ExpectedVersion, PhaseId, ProjectId, TaskId,
    TeamMemberId, UserId, Version,
};
use crewplan_scheduling::{
    AllocationPolicy, Assignment, AssignmentRole, MemberRole, Phase, PhaseStatus, Project,
    ProjectStatus, Task, TaskStatus, TeamMember, WorkingPercentage, committed_percentage,
};

use super::{
    AssignmentStore, CasOutcome, PhaseStore, ProjectStore, StoreError, TaskStore, TeamMemberStore,
};

/// Postgres-backed store for every scheduling record plus the audit log.
///
/// `Send + Sync`; all operations go through the SQLx connection pool. The
/// sync store traits are bridged with `tokio::runtime::Handle::block_on`, so
/// trait calls must happen inside a tokio runtime context.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    // ---- team members -----------------------------------------------------

    #[instrument(skip(self, member), fields(member = %member.id), err)]
    pub async fn insert_member_async(&self, member: TeamMember) -> Result<TeamMember, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO team_members (id, name, email, role, active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
            SET name = $2, email = $3, role = $4, active = $5
            "#,
        )
        .bind(member.id.as_uuid())
        .bind(&member.name)
        .bind(&member.email)
        .bind(member.role.as_str())
        .bind(member.active)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_member", e))?;

        Ok(member)
    }

    pub async fn member_async(&self, id: TeamMemberId) -> Result<Option<TeamMember>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, email, role, active FROM team_members WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("member", e))?;

        row.map(|r| {
            TeamMemberRow::from_row(&r)
                .map_err(row_error)
                .and_then(TeamMember::try_from)
        })
        .transpose()
    }

    pub async fn members_async(&self) -> Result<Vec<TeamMember>, StoreError> {
        let rows = sqlx::query("SELECT id, name, email, role, active FROM team_members")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("members", e))?;

        rows.iter()
            .map(|r| {
                TeamMemberRow::from_row(r)
                    .map_err(row_error)
                    .and_then(TeamMember::try_from)
            })
            .collect()
    }

    // ---- projects ---------------------------------------------------------

    #[instrument(skip(self, project), fields(project = %project.id), err)]
    pub async fn insert_project_async(&self, project: Project) -> Result<Project, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, name, start_date, end_date, status, version)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(project.id.as_uuid())
        .bind(&project.name)
        .bind(project.start_date)
        .bind(project.end_date)
        .bind(project.status.as_str())
        .bind(project.version.get() as i64)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_project", e))?;

        Ok(project)
    }

    pub async fn project_async(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, start_date, end_date, status, version FROM projects WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("project", e))?;

        row.map(|r| {
            ProjectRow::from_row(&r)
                .map_err(row_error)
                .and_then(Project::try_from)
        })
        .transpose()
    }

    pub async fn projects_async(&self) -> Result<Vec<Project>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, start_date, end_date, status, version FROM projects",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("projects", e))?;

        rows.iter()
            .map(|r| {
                ProjectRow::from_row(r)
                    .map_err(row_error)
                    .and_then(Project::try_from)
            })
            .collect()
    }

    // ---- phases -----------------------------------------------------------

    #[instrument(skip(self, phase), fields(phase = %phase.id), err)]
    pub async fn insert_phase_async(&self, phase: Phase) -> Result<Phase, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO phases
                (id, project_id, name, start_date, duration_days,
                 estimated_end_date, actual_end_date, status, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(phase.id.as_uuid())
        .bind(phase.project_id.as_uuid())
        .bind(&phase.name)
        .bind(phase.start_date)
        .bind(phase.duration_days as i32)
        .bind(phase.estimated_end_date)
        .bind(phase.actual_end_date)
        .bind(phase.status.as_str())
        .bind(phase.version.get() as i64)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_phase", e))?;

        Ok(phase)
    }

    pub async fn phase_async(&self, id: PhaseId) -> Result<Option<Phase>, StoreError> {
        let row = sqlx::query(&format!("{PHASE_SELECT} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("phase", e))?;

        row.map(|r| {
            PhaseRow::from_row(&r)
                .map_err(row_error)
                .and_then(Phase::try_from)
        })
        .transpose()
    }

    pub async fn phases_by_project_async(
        &self,
        project_id: ProjectId,
    ) -> Result<Vec<Phase>, StoreError> {
        let rows = sqlx::query(&format!(
            "{PHASE_SELECT} WHERE project_id = $1 ORDER BY start_date ASC"
        ))
        .bind(project_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("phases_by_project", e))?;

        rows.iter()
            .map(|r| {
                PhaseRow::from_row(r)
                    .map_err(row_error)
                    .and_then(Phase::try_from)
            })
            .collect()
    }

    pub async fn phases_async(&self) -> Result<Vec<Phase>, StoreError> {
        let rows = sqlx::query(PHASE_SELECT)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("phases", e))?;

        rows.iter()
            .map(|r| {
                PhaseRow::from_row(r)
                    .map_err(row_error)
                    .and_then(Phase::try_from)
            })
            .collect()
    }

    // ---- tasks ------------------------------------------------------------

    #[instrument(skip(self, task), fields(task = %task.id), err)]
    pub async fn insert_task_async(&self, task: Task) -> Result<Task, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, phase_id, name, start_date, end_date, status, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(task.phase_id.as_uuid())
        .bind(&task.name)
        .bind(task.start_date)
        .bind(task.end_date)
        .bind(task.status.as_str())
        .bind(task.version.get() as i64)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_task", e))?;

        Ok(task)
    }

    pub async fn task_async(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query(&format!("{TASK_SELECT} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("task", e))?;

        row.map(|r| {
            TaskRow::from_row(&r)
                .map_err(row_error)
                .and_then(Task::try_from)
        })
        .transpose()
    }

    pub async fn tasks_by_phase_async(&self, phase_id: PhaseId) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(&format!(
            "{TASK_SELECT} WHERE phase_id = $1 ORDER BY start_date ASC"
        ))
        .bind(phase_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("tasks_by_phase", e))?;

        rows.iter()
            .map(|r| {
                TaskRow::from_row(r)
                    .map_err(row_error)
                    .and_then(Task::try_from)
            })
            .collect()
    }

    pub async fn tasks_async(&self) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query(TASK_SELECT)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("tasks", e))?;

        rows.iter()
            .map(|r| {
                TaskRow::from_row(r)
                    .map_err(row_error)
                    .and_then(Task::try_from)
            })
            .collect()
    }

    // ---- assignments ------------------------------------------------------

    pub async fn assignment_async(
        &self,
        id: AssignmentId,
    ) -> Result<Option<Assignment>, StoreError> {
        let row = sqlx::query(&format!("{ASSIGNMENT_SELECT} WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("assignment", e))?;

        row.map(|r| {
            AssignmentRow::from_row(&r)
                .map_err(row_error)
                .and_then(Assignment::try_from)
        })
        .transpose()
    }

    pub async fn assignments_by_member_async(
        &self,
        member: TeamMemberId,
    ) -> Result<Vec<Assignment>, StoreError> {
        let rows = sqlx::query(&format!(
            "{ASSIGNMENT_SELECT} WHERE team_member_id = $1"
        ))
        .bind(member.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("assignments_by_member", e))?;

        rows.iter()
            .map(|r| {
                AssignmentRow::from_row(r)
                    .map_err(row_error)
                    .and_then(Assignment::try_from)
            })
            .collect()
    }

    pub async fn assignments_by_phase_async(
        &self,
        phase_id: PhaseId,
    ) -> Result<Vec<Assignment>, StoreError> {
        let rows = sqlx::query(&format!("{ASSIGNMENT_SELECT} WHERE phase_id = $1"))
            .bind(phase_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("assignments_by_phase", e))?;

        rows.iter()
            .map(|r| {
                AssignmentRow::from_row(r)
                    .map_err(row_error)
                    .and_then(Assignment::try_from)
            })
            .collect()
    }

    pub async fn assignments_async(&self) -> Result<Vec<Assignment>, StoreError> {
        let rows = sqlx::query(ASSIGNMENT_SELECT)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("assignments", e))?;

        rows.iter()
            .map(|r| {
                AssignmentRow::from_row(r)
                    .map_err(row_error)
                    .and_then(Assignment::try_from)
            })
            .collect()
    }

    /// Insert with the capacity re-check inside one serializable transaction.
    ///
    /// A racing insert for the same member either serializes behind this one
    /// (and fails its own cap check) or aborts with `40001`, which maps to
    /// `Concurrency`. The unique constraint turns duplicate keys into
    /// `DuplicateAssignment`.
    #[instrument(
        skip(self, assignment, policy),
        fields(assignment = %assignment.id, member = %assignment.team_member_id),
        err
    )]
    pub async fn insert_assignment_async(
        &self,
        assignment: Assignment,
        policy: Option<&AllocationPolicy>,
    ) -> Result<Assignment, StoreError> {
        let mut tx = self.serializable_tx().await?;

        if let Some(policy) = policy {
            let existing =
                member_assignments_in_tx(&mut tx, assignment.team_member_id).await?;
            let period = assignment.period();
            let current = committed_percentage(
                &existing,
                assignment.team_member_id,
                None,
                Some(&period),
                policy.counting,
            );
            if current + assignment.working_percentage.as_u32() > policy.cap {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::CapacityExceeded {
                    current_allocation: current,
                });
            }
        }

        let mut stored = assignment;
        stored.version = Version::INITIAL;

        sqlx::query(
            r#"
            INSERT INTO assignments
                (id, phase_id, team_member_id, role, working_percentage,
                 start_date, end_date, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(stored.id.as_uuid())
        .bind(stored.phase_id.as_uuid())
        .bind(stored.team_member_id.as_uuid())
        .bind(stored.role.as_str())
        .bind(stored.working_percentage.as_u32() as i32)
        .bind(stored.start_date)
        .bind(stored.end_date)
        .bind(stored.version.get() as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateAssignment
            } else {
                map_sqlx_error("insert_assignment", e)
            }
        })?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        Ok(stored)
    }

    /// Single atomic conditional write: fields + `version = version + 1`
    /// guarded by the submitted version. The optional cap re-check shares the
    /// transaction.
    #[instrument(
        skip(self, assignment, policy),
        fields(assignment = %assignment.id, expected = ?expected),
        err
    )]
    pub async fn update_assignment_async(
        &self,
        assignment: Assignment,
        expected: ExpectedVersion,
        policy: Option<&AllocationPolicy>,
    ) -> Result<Assignment, StoreError> {
        let mut tx = self.serializable_tx().await?;

        if let Some(policy) = policy {
            let existing =
                member_assignments_in_tx(&mut tx, assignment.team_member_id).await?;
            let period = assignment.period();
            let current = committed_percentage(
                &existing,
                assignment.team_member_id,
                Some(assignment.id),
                Some(&period),
                policy.counting,
            );
            if current + assignment.working_percentage.as_u32() > policy.cap {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::CapacityExceeded {
                    current_allocation: current,
                });
            }
        }

        let updated = match expected {
            ExpectedVersion::Exact(version) => sqlx::query(
                r#"
                UPDATE assignments
                SET role = $2, working_percentage = $3, start_date = $4,
                    end_date = $5, version = version + 1
                WHERE id = $1 AND version = $6
                RETURNING version
                "#,
            )
            .bind(assignment.id.as_uuid())
            .bind(assignment.role.as_str())
            .bind(assignment.working_percentage.as_u32() as i32)
            .bind(assignment.start_date)
            .bind(assignment.end_date)
            .bind(version.get() as i64)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_assignment", e))?,
            ExpectedVersion::Any => sqlx::query(
                r#"
                UPDATE assignments
                SET role = $2, working_percentage = $3, start_date = $4,
                    end_date = $5, version = version + 1
                WHERE id = $1
                RETURNING version
                "#,
            )
            .bind(assignment.id.as_uuid())
            .bind(assignment.role.as_str())
            .bind(assignment.working_percentage.as_u32() as i32)
            .bind(assignment.start_date)
            .bind(assignment.end_date)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_assignment", e))?,
        };

        let new_version = match updated {
            Some(row) => {
                let v: i64 = row.try_get("version").map_err(row_error)?;
                Version::new(v as u64)
            }
            // Zero rows matched: the row is either gone or at another version.
            None => {
                let current: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM assignments WHERE id = $1")
                        .bind(assignment.id.as_uuid())
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(|e| map_sqlx_error("update_assignment", e))?;
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return match current {
                    Some(actual) => Err(StoreError::Concurrency(format!(
                        "expected {expected:?}, found {actual}"
                    ))),
                    None => Err(StoreError::NotFound),
                };
            }
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        let mut stored = assignment;
        stored.version = new_version;
        Ok(stored)
    }

    #[instrument(skip(self), err)]
    pub async fn delete_assignment_async(
        &self,
        id: AssignmentId,
    ) -> Result<Option<Assignment>, StoreError> {
        let row = sqlx::query(
            r#"
            DELETE FROM assignments
            WHERE id = $1
            RETURNING id, phase_id, team_member_id, role, working_percentage,
                      start_date, end_date, version
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_assignment", e))?;

        row.map(|r| {
            AssignmentRow::from_row(&r)
                .map_err(row_error)
                .and_then(Assignment::try_from)
        })
        .transpose()
    }

    // ---- version bumps ----------------------------------------------------

    async fn bump_version(
        &self,
        table: VersionedTable,
        id: Uuid,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        let updated: Option<i64> = sqlx::query_scalar(table.bump_sql())
            .bind(id)
            .bind(expected.get() as i64)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("bump_version", e))?;

        if let Some(v) = updated {
            return Ok(CasOutcome::Applied {
                new_version: Version::new(v as u64),
            });
        }

        // Zero rows: distinguish a missing row from a stale version.
        let actual: Option<i64> = sqlx::query_scalar(table.select_version_sql())
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("bump_version", e))?;

        Ok(match actual {
            Some(v) => CasOutcome::Conflict {
                actual: Version::new(v as u64),
            },
            None => CasOutcome::Missing,
        })
    }

    // ---- audit ------------------------------------------------------------

    #[instrument(skip(self, entry), fields(entity = %entry.entity_id, action = %entry.action), err)]
    pub async fn append_audit_async(
        &self,
        entry: AuditLogEntry,
    ) -> Result<AuditLogEntry, AuditError> {
        let payload = serde_json::to_value(&entry.payload)
            .map_err(|e| AuditError::Payload(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO audit_log
                (id, entity_kind, entity_id, action, actor_id, actor_role,
                 payload, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id.as_uuid())
        .bind(entry.entity_kind.as_str())
        .bind(entry.entity_id)
        .bind(entry.action.as_str())
        .bind(entry.actor_id.as_uuid())
        .bind(entry.actor_role.as_str())
        .bind(payload)
        .bind(entry.recorded_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| AuditError::Storage(e.to_string()))?;

        Ok(entry)
    }

    pub async fn audit_for_entity_async(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        let rows = sqlx::query(&format!(
            "{AUDIT_SELECT} WHERE entity_kind = $1 AND entity_id = $2 \
             ORDER BY recorded_at DESC"
        ))
        .bind(kind.as_str())
        .bind(entity_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| AuditError::Storage(e.to_string()))?;

        rows.iter().map(audit_entry_from_row).collect()
    }

    pub async fn audit_for_actor_async(
        &self,
        actor_id: UserId,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        let rows = sqlx::query(&format!(
            "{AUDIT_SELECT} WHERE actor_id = $1 ORDER BY recorded_at DESC"
        ))
        .bind(actor_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| AuditError::Storage(e.to_string()))?;

        rows.iter().map(audit_entry_from_row).collect()
    }

    pub async fn audit_recent_async(
        &self,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        let rows = sqlx::query(&format!(
            "{AUDIT_SELECT} ORDER BY recorded_at DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| AuditError::Storage(e.to_string()))?;

        rows.iter().map(audit_entry_from_row).collect()
    }

    // ---- helpers ----------------------------------------------------------

    async fn serializable_tx(&self) -> Result<Transaction<'_, Postgres>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;
        Ok(tx)
    }
}

async fn member_assignments_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    member: TeamMemberId,
) -> Result<Vec<Assignment>, StoreError> {
    let rows = sqlx::query(&format!(
        "{ASSIGNMENT_SELECT} WHERE team_member_id = $1"
    ))
    .bind(member.as_uuid())
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("member_assignments", e))?;

    rows.iter()
        .map(|r| {
            AssignmentRow::from_row(r)
                .map_err(row_error)
                .and_then(Assignment::try_from)
        })
        .collect()
}

const PHASE_SELECT: &str = "SELECT id, project_id, name, start_date, duration_days, \
     estimated_end_date, actual_end_date, status, version FROM phases";

const TASK_SELECT: &str =
    "SELECT id, phase_id, name, start_date, end_date, status, version FROM tasks";

const ASSIGNMENT_SELECT: &str = "SELECT id, phase_id, team_member_id, role, \
     working_percentage, start_date, end_date, version FROM assignments";

const AUDIT_SELECT: &str = "SELECT id, entity_kind, entity_id, action, actor_id, \
     actor_role, payload, recorded_at FROM audit_log";

#[derive(Debug, Copy, Clone)]
enum VersionedTable {
    Projects,
    Phases,
    Tasks,
    Assignments,
}

impl VersionedTable {
    /// The conditional write: compare and increment in one statement.
    fn bump_sql(self) -> &'static str {
        match self {
            VersionedTable::Projects => {
                "UPDATE projects SET version = version + 1 \
                 WHERE id = $1 AND version = $2 RETURNING version"
            }
            VersionedTable::Phases => {
                "UPDATE phases SET version = version + 1 \
                 WHERE id = $1 AND version = $2 RETURNING version"
            }
            VersionedTable::Tasks => {
                "UPDATE tasks SET version = version + 1 \
                 WHERE id = $1 AND version = $2 RETURNING version"
            }
            VersionedTable::Assignments => {
                "UPDATE assignments SET version = version + 1 \
                 WHERE id = $1 AND version = $2 RETURNING version"
            }
        }
    }

    fn select_version_sql(self) -> &'static str {
        match self {
            VersionedTable::Projects => "SELECT version FROM projects WHERE id = $1",
            VersionedTable::Phases => "SELECT version FROM phases WHERE id = $1",
            VersionedTable::Tasks => "SELECT version FROM tasks WHERE id = $1",
            VersionedTable::Assignments => "SELECT version FROM assignments WHERE id = $1",
        }
    }
}

// ---- row types -------------------------------------------------------------

#[derive(Debug, FromRow)]
struct TeamMemberRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
    active: bool,
}

impl TryFrom<TeamMemberRow> for TeamMember {
    type Error = StoreError;

    fn try_from(row: TeamMemberRow) -> Result<Self, Self::Error> {
        Ok(TeamMember {
            id: TeamMemberId::from_uuid(row.id),
            name: row.name,
            email: row.email,
            role: parse_member_role(&row.role)?,
            active: row.active,
        })
    }
}

#[derive(Debug, FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    status: String,
    version: i64,
}

impl TryFrom<ProjectRow> for Project {
    type Error = StoreError;

    fn try_from(row: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Project {
            id: ProjectId::from_uuid(row.id),
            name: row.name,
            start_date: row.start_date,
            end_date: row.end_date,
            status: parse_project_status(&row.status)?,
            version: Version::new(row.version as u64),
        })
    }
}

#[derive(Debug, FromRow)]
struct PhaseRow {
    id: Uuid,
    project_id: Uuid,
    name: String,
    start_date: NaiveDate,
    duration_days: i32,
    estimated_end_date: NaiveDate,
    actual_end_date: Option<NaiveDate>,
    status: String,
    version: i64,
}

impl TryFrom<PhaseRow> for Phase {
    type Error = StoreError;

    fn try_from(row: PhaseRow) -> Result<Self, Self::Error> {
        Ok(Phase {
            id: PhaseId::from_uuid(row.id),
            project_id: ProjectId::from_uuid(row.project_id),
            name: row.name,
            start_date: row.start_date,
            duration_days: row.duration_days as u32,
            estimated_end_date: row.estimated_end_date,
            actual_end_date: row.actual_end_date,
            status: parse_phase_status(&row.status)?,
            version: Version::new(row.version as u64),
        })
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: Uuid,
    phase_id: Uuid,
    name: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: String,
    version: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            id: TaskId::from_uuid(row.id),
            phase_id: PhaseId::from_uuid(row.phase_id),
            name: row.name,
            start_date: row.start_date,
            end_date: row.end_date,
            status: parse_task_status(&row.status)?,
            version: Version::new(row.version as u64),
        })
    }
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    id: Uuid,
    phase_id: Uuid,
    team_member_id: Uuid,
    role: String,
    working_percentage: i32,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    version: i64,
}

impl TryFrom<AssignmentRow> for Assignment {
    type Error = StoreError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        let percentage = u8::try_from(row.working_percentage)
            .ok()
            .and_then(|v| WorkingPercentage::new(v).ok())
            .ok_or_else(|| {
                StoreError::Storage(format!(
                    "working_percentage out of range: {}",
                    row.working_percentage
                ))
            })?;

        Ok(Assignment {
            id: AssignmentId::from_uuid(row.id),
            phase_id: PhaseId::from_uuid(row.phase_id),
            team_member_id: TeamMemberId::from_uuid(row.team_member_id),
            role: AssignmentRole::new(row.role),
            working_percentage: percentage,
            start_date: row.start_date,
            end_date: row.end_date,
            version: Version::new(row.version as u64),
        })
    }
}

fn audit_entry_from_row(row: &sqlx::postgres::PgRow) -> Result<AuditLogEntry, AuditError> {
    let payload: serde_json::Value = row
        .try_get("payload")
        .map_err(|e| AuditError::Storage(e.to_string()))?;
    let payload: AuditPayload =
        serde_json::from_value(payload).map_err(|e| AuditError::Payload(e.to_string()))?;

    let kind: String = row
        .try_get("entity_kind")
        .map_err(|e| AuditError::Storage(e.to_string()))?;
    let action: String = row
        .try_get("action")
        .map_err(|e| AuditError::Storage(e.to_string()))?;
    let role: String = row
        .try_get("actor_role")
        .map_err(|e| AuditError::Storage(e.to_string()))?;

    let id: Uuid = row
        .try_get("id")
        .map_err(|e| AuditError::Storage(e.to_string()))?;
    let entity_id: Uuid = row
        .try_get("entity_id")
        .map_err(|e| AuditError::Storage(e.to_string()))?;
    let actor_id: Uuid = row
        .try_get("actor_id")
        .map_err(|e| AuditError::Storage(e.to_string()))?;
    let recorded_at: DateTime<Utc> = row
        .try_get("recorded_at")
        .map_err(|e| AuditError::Storage(e.to_string()))?;

    Ok(AuditLogEntry {
        id: AuditEntryId::from_uuid(id),
        entity_kind: parse_entity_kind(&kind).map_err(|e| AuditError::Storage(e.to_string()))?,
        entity_id,
        action: parse_audit_action(&action)?,
        actor_id: UserId::from_uuid(actor_id),
        actor_role: ActorRole::new(role),
        payload,
        recorded_at,
    })
}

// ---- text column parsing ---------------------------------------------------

fn parse_member_role(s: &str) -> Result<MemberRole, StoreError> {
    match s {
        "manager" => Ok(MemberRole::Manager),
        "team_leader" => Ok(MemberRole::TeamLeader),
        "team_member" => Ok(MemberRole::TeamMember),
        other => Err(StoreError::Storage(format!("unknown member role: {other}"))),
    }
}

fn parse_project_status(s: &str) -> Result<ProjectStatus, StoreError> {
    match s {
        "planned" => Ok(ProjectStatus::Planned),
        "active" => Ok(ProjectStatus::Active),
        "on_hold" => Ok(ProjectStatus::OnHold),
        "completed" => Ok(ProjectStatus::Completed),
        other => Err(StoreError::Storage(format!(
            "unknown project status: {other}"
        ))),
    }
}

fn parse_phase_status(s: &str) -> Result<PhaseStatus, StoreError> {
    match s {
        "planned" => Ok(PhaseStatus::Planned),
        "in_progress" => Ok(PhaseStatus::InProgress),
        "completed" => Ok(PhaseStatus::Completed),
        other => Err(StoreError::Storage(format!("unknown phase status: {other}"))),
    }
}

fn parse_task_status(s: &str) -> Result<TaskStatus, StoreError> {
    match s {
        "open" => Ok(TaskStatus::Open),
        "in_progress" => Ok(TaskStatus::InProgress),
        "done" => Ok(TaskStatus::Done),
        other => Err(StoreError::Storage(format!("unknown task status: {other}"))),
    }
}

fn parse_entity_kind(s: &str) -> Result<EntityKind, StoreError> {
    match s {
        "project" => Ok(EntityKind::Project),
        "phase" => Ok(EntityKind::Phase),
        "task" => Ok(EntityKind::Task),
        "assignment" => Ok(EntityKind::Assignment),
        "team_member" => Ok(EntityKind::TeamMember),
        other => Err(StoreError::Storage(format!("unknown entity kind: {other}"))),
    }
}

fn parse_audit_action(s: &str) -> Result<AuditAction, AuditError> {
    match s {
        "create" => Ok(AuditAction::Create),
        "update" => Ok(AuditAction::Update),
        "delete" => Ok(AuditAction::Delete),
        "status_change" => Ok(AuditAction::StatusChange),
        other => Err(AuditError::Storage(format!("unknown audit action: {other}"))),
    }
}

// ---- error mapping ---------------------------------------------------------

fn row_error(e: sqlx::Error) -> StoreError {
    StoreError::Storage(format!("failed to deserialize row: {e}"))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Serialization failure: racing serializable transactions.
                Some("40001") => StoreError::Concurrency(msg),
                // Unique violation outside the assignment-insert path still
                // means a concurrent writer got there first.
                Some("23505") => StoreError::Concurrency(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Storage(format!("unexpected row not found in {operation}"))
        }
        _ => StoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

// ---- sync trait bridge -----------------------------------------------------

/// The store traits are synchronous; Postgres operations are async. Calls are
/// bridged with `tokio::runtime::Handle::block_on`, which requires running
/// inside a tokio runtime context (e.g. from request handlers).
fn runtime_handle<E>(wrap: impl FnOnce(String) -> E) -> Result<tokio::runtime::Handle, E> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        wrap("PostgresStore requires an async runtime (tokio); \
              call from within a tokio runtime context"
            .to_string())
    })
}

impl TeamMemberStore for PostgresStore {
    fn insert_member(&self, member: TeamMember) -> Result<TeamMember, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.insert_member_async(member))
    }

    fn member(&self, id: TeamMemberId) -> Result<Option<TeamMember>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.member_async(id))
    }

    fn members(&self) -> Result<Vec<TeamMember>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.members_async())
    }
}

impl ProjectStore for PostgresStore {
    fn insert_project(&self, project: Project) -> Result<Project, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.insert_project_async(project))
    }

    fn project(&self, id: ProjectId) -> Result<Option<Project>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.project_async(id))
    }

    fn projects(&self) -> Result<Vec<Project>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.projects_async())
    }

    fn bump_project_version(
        &self,
        id: ProjectId,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.bump_version(
            VersionedTable::Projects,
            *id.as_uuid(),
            expected,
        ))
    }
}

impl PhaseStore for PostgresStore {
    fn insert_phase(&self, phase: Phase) -> Result<Phase, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.insert_phase_async(phase))
    }

    fn phase(&self, id: PhaseId) -> Result<Option<Phase>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.phase_async(id))
    }

    fn phases_by_project(&self, project_id: ProjectId) -> Result<Vec<Phase>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.phases_by_project_async(project_id))
    }

    fn phases(&self) -> Result<Vec<Phase>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.phases_async())
    }

    fn bump_phase_version(
        &self,
        id: PhaseId,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.bump_version(
            VersionedTable::Phases,
            *id.as_uuid(),
            expected,
        ))
    }
}

impl TaskStore for PostgresStore {
    fn insert_task(&self, task: Task) -> Result<Task, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.insert_task_async(task))
    }

    fn task(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.task_async(id))
    }

    fn tasks_by_phase(&self, phase_id: PhaseId) -> Result<Vec<Task>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.tasks_by_phase_async(phase_id))
    }

    fn tasks(&self) -> Result<Vec<Task>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.tasks_async())
    }

    fn bump_task_version(&self, id: TaskId, expected: Version) -> Result<CasOutcome, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.bump_version(
            VersionedTable::Tasks,
            *id.as_uuid(),
            expected,
        ))
    }
}

impl AssignmentStore for PostgresStore {
    fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.assignment_async(id))
    }

    fn assignments_by_member(
        &self,
        member: TeamMemberId,
    ) -> Result<Vec<Assignment>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.assignments_by_member_async(member))
    }

    fn assignments_by_phase(&self, phase_id: PhaseId) -> Result<Vec<Assignment>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.assignments_by_phase_async(phase_id))
    }

    fn assignments(&self) -> Result<Vec<Assignment>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.assignments_async())
    }

    fn insert_assignment(
        &self,
        assignment: Assignment,
        policy: Option<&AllocationPolicy>,
    ) -> Result<Assignment, StoreError> {
        runtime_handle(StoreError::Storage)?
            .block_on(self.insert_assignment_async(assignment, policy))
    }

    fn update_assignment(
        &self,
        assignment: Assignment,
        expected: ExpectedVersion,
        policy: Option<&AllocationPolicy>,
    ) -> Result<Assignment, StoreError> {
        runtime_handle(StoreError::Storage)?
            .block_on(self.update_assignment_async(assignment, expected, policy))
    }

    fn delete_assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.delete_assignment_async(id))
    }

    fn bump_assignment_version(
        &self,
        id: AssignmentId,
        expected: Version,
    ) -> Result<CasOutcome, StoreError> {
        runtime_handle(StoreError::Storage)?.block_on(self.bump_version(
            VersionedTable::Assignments,
            *id.as_uuid(),
            expected,
        ))
    }
}

impl AuditTrail for PostgresStore {
    fn append(&self, entry: AuditLogEntry) -> Result<AuditLogEntry, AuditError> {
        runtime_handle(AuditError::Storage)?.block_on(self.append_audit_async(entry))
    }

    fn for_entity(
        &self,
        kind: EntityKind,
        entity_id: Uuid,
    ) -> Result<Vec<AuditLogEntry>, AuditError> {
        runtime_handle(AuditError::Storage)?.block_on(self.audit_for_entity_async(kind, entity_id))
    }

    fn for_actor(&self, actor_id: UserId) -> Result<Vec<AuditLogEntry>, AuditError> {
        runtime_handle(AuditError::Storage)?.block_on(self.audit_for_actor_async(actor_id))
    }

    fn recent(&self, limit: usize) -> Result<Vec<AuditLogEntry>, AuditError> {
        runtime_handle(AuditError::Storage)?.block_on(self.audit_recent_async(limit))
    }
}
