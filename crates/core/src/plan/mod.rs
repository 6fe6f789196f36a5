//! Plan document produced by the generator and consumed by the reconciler and commit.

mod validation;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;
use crate::json_utils::value_as_f64;

pub use validation::{
    ConflictSeverity, ConflictType, DryRunSummary, IssueSeverity, PlanConflict, ValidationContext,
    ValidationIssue, ValidationOptions, ValidationReport, calculate_confidence, validate_plan,
};

/// Typed view of `plan_json`.
///
/// Deserialization is lenient (every field optional) so a forced commit of a
/// plan with warnings still maps onto rows; strict shape checks live in
/// [`validate_plan`], which works on the raw JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<PlanProject>,
    #[serde(default)]
    pub milestones: Vec<PlanMilestone>,
    #[serde(default)]
    pub tasks: Vec<PlanTask>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanProject {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanMilestone {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanTask {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "lenient_hours")]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub milestone_id: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
}

fn lenient_hours<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(value_as_f64))
}

impl PlanDocument {
    /// Parse a plan document from raw JSON.
    ///
    /// # Errors
    /// Returns a serde error when the JSON shape cannot be mapped at all
    /// (e.g. `tasks` is not an array).
    pub fn from_value(value: &serde_json::Value) -> Result<Self, CoreError> {
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Display title: top-level `title`, falling back to `project.name`.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        non_blank(self.title.as_deref())
            .or_else(|| non_blank(self.project.as_ref().and_then(|p| p.name.as_deref())))
    }

    /// Name used for the committed project row.
    #[must_use]
    pub fn project_name(&self) -> &str {
        non_blank(self.project.as_ref().and_then(|p| p.name.as_deref()))
            .or_else(|| non_blank(self.title.as_deref()))
            .unwrap_or("Untitled voice plan")
    }

    /// Number of declared task-to-task dependency edges.
    #[must_use]
    pub fn dependency_edge_count(&self) -> usize {
        self.tasks.iter().map(|t| t.dependencies.len()).sum()
    }
}

impl PlanTask {
    /// Key other tasks use to reference this one: `id`, else `title`.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        non_blank(self.id.as_deref()).or_else(|| non_blank(self.title.as_deref()))
    }
}

impl PlanMilestone {
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        non_blank(self.id.as_deref()).or_else(|| non_blank(self.name.as_deref()))
    }
}

pub(crate) fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Task priority accepted by the reconciler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl TaskPriority {
    pub const ALL_VARIANTS_STR: &'static str = "low|medium|high|critical";

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(CoreError::invalid_enum("task priority", s)),
        }
    }
}
