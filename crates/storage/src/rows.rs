//! Rows a production commit writes, resolved before any write happens.
//!
//! Both backends insert exactly these rows, so linkage resolution (milestone
//! keys, dependency keys) lives in one place.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voiceplan_core::{CommitCounts, PlanDocument, VoiceSession};

/// Provenance columns carried by every committed row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoiceProvenance {
    pub voice_session_id: Uuid,
    pub voice_generated: bool,
    pub voice_confidence: Option<f64>,
    /// `pending` while the transaction is open, `committed` once marked.
    pub voice_commit_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectRow {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub provenance: VoiceProvenance,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MilestoneRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub provenance: VoiceProvenance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub milestone_id: Option<Uuid>,
    /// Key the plan used for this task (`id`, else `title`).
    pub plan_key: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub priority: String,
    pub estimated_hours: Option<f64>,
    pub assignee: Option<String>,
    pub provenance: VoiceProvenance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencyRow {
    pub id: Uuid,
    pub voice_session_id: Uuid,
    pub task_id: Uuid,
    pub depends_on_task_id: Uuid,
}

/// Result of a production commit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommittedPlan {
    pub project_id: Uuid,
    pub counts: CommitCounts,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanRows {
    pub project: ProjectRow,
    pub milestones: Vec<MilestoneRow>,
    pub tasks: Vec<TaskRow>,
    pub dependencies: Vec<DependencyRow>,
}

pub const COMMIT_STATUS_PENDING: &str = "pending";
pub const COMMIT_STATUS_COMMITTED: &str = "committed";

impl PlanRows {
    /// Map a plan onto rows with fresh ids.
    ///
    /// Unknown milestone references become `NULL`; dependencies that do not
    /// resolve to a task in this plan are skipped with a warning (a forced
    /// commit of an invalid plan still lands its tasks).
    #[must_use]
    pub fn build(session: &VoiceSession, plan: &PlanDocument, confidence: Option<f64>) -> Self {
        let provenance = VoiceProvenance {
            voice_session_id: session.id,
            voice_generated: true,
            voice_confidence: confidence,
            voice_commit_status: COMMIT_STATUS_PENDING.to_owned(),
        };

        let project_id = Uuid::new_v4();
        let project_meta = plan.project.as_ref();
        let project = ProjectRow {
            id: project_id,
            organization_id: session.organization_id,
            owner_id: session.user_id,
            name: plan.project_name().to_owned(),
            description: project_meta.and_then(|p| p.description.clone()),
            start_date: project_meta.and_then(|p| p.start_date.clone()),
            end_date: project_meta.and_then(|p| p.end_date.clone()),
            provenance: provenance.clone(),
            created_at: Utc::now(),
        };

        let mut milestone_ids: HashMap<&str, Uuid> = HashMap::new();
        let milestones: Vec<MilestoneRow> = plan
            .milestones
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let id = Uuid::new_v4();
                if let Some(key) = m.key() {
                    milestone_ids.entry(key).or_insert(id);
                }
                MilestoneRow {
                    id,
                    project_id,
                    name: m.key().map_or_else(|| format!("Milestone {}", i + 1), str::to_owned),
                    description: m.description.clone(),
                    due_date: m.due_date.clone(),
                    provenance: provenance.clone(),
                }
            })
            .collect();

        let mut task_ids: HashMap<&str, Uuid> = HashMap::new();
        let tasks: Vec<TaskRow> = plan
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let id = Uuid::new_v4();
                if let Some(key) = t.key() {
                    task_ids.entry(key).or_insert(id);
                }
                TaskRow {
                    id,
                    project_id,
                    milestone_id: t
                        .milestone_id
                        .as_deref()
                        .and_then(|m| milestone_ids.get(m.trim()).copied()),
                    plan_key: t.key().map(str::to_owned),
                    title: t
                        .title
                        .clone()
                        .filter(|s| !s.trim().is_empty())
                        .unwrap_or_else(|| format!("Task {}", i + 1)),
                    description: t.description.clone(),
                    priority: t
                        .priority
                        .as_deref()
                        .map_or_else(|| "medium".to_owned(), str::to_lowercase),
                    estimated_hours: t.estimated_hours.filter(|h| *h >= 0.0),
                    assignee: t.assignee.clone(),
                    provenance: provenance.clone(),
                }
            })
            .collect();

        let mut dependencies = Vec::new();
        for (task, row) in plan.tasks.iter().zip(&tasks) {
            for dep in &task.dependencies {
                match task_ids.get(dep.trim()) {
                    Some(&target) => dependencies.push(DependencyRow {
                        id: Uuid::new_v4(),
                        voice_session_id: session.id,
                        task_id: row.id,
                        depends_on_task_id: target,
                    }),
                    None => tracing::warn!(
                        session_id = %session.id,
                        task = %row.title,
                        dependency = %dep,
                        "skipping unresolved dependency"
                    ),
                }
            }
        }

        Self { project, milestones, tasks, dependencies }
    }

    #[must_use]
    pub fn counts(&self) -> CommitCounts {
        CommitCounts {
            projects: 1,
            milestones: self.milestones.len(),
            tasks: self.tasks.len(),
            dependencies: self.dependencies.len(),
        }
    }

    /// Flip every row's provenance to `committed`.
    pub fn mark_committed(&mut self) {
        let mark = |p: &mut VoiceProvenance| COMMIT_STATUS_COMMITTED.clone_into(&mut p.voice_commit_status);
        mark(&mut self.project.provenance);
        self.milestones.iter_mut().for_each(|m| mark(&mut m.provenance));
        self.tasks.iter_mut().for_each(|t| mark(&mut t.provenance));
    }
}
