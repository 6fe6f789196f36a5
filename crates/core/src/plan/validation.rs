//! Plan reconciler: schema checks, business rules, dependency graph analysis.
//!
//! Works on raw JSON so malformed generator output still yields field-level
//! findings instead of a single parse error. Findings are returned as data;
//! nothing here fails.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::TaskPriority;
use super::non_blank;
use crate::constants::{
    DEFAULT_MAX_HOURS_PER_ASSIGNEE, HIGH_TASK_ESTIMATE_HOURS, MAX_PLAN_TITLE_LEN,
    RECONCILER_TASK_WARNING_THRESHOLD,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// A single schema or business-rule finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    /// JSON path of the offending field, e.g. `tasks[2].priority`.
    pub field: String,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    pub severity: IssueSeverity,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    DependencyConflict,
    ResourceConflict,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanConflict {
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub description: String,
    /// For dependency conflicts: the full cycle path, closing node repeated.
    pub task_ids: Vec<String>,
}

/// Row counts a commit of this plan would produce.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DryRunSummary {
    pub projects: usize,
    pub milestones: usize,
    pub tasks: usize,
    pub dependencies: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub confidence: f64,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub conflicts: Vec<PlanConflict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<DryRunSummary>,
}

impl ValidationReport {
    /// Whether a commit may proceed. Warnings only block in strict mode.
    #[must_use]
    pub fn passes(&self, strict: bool) -> bool {
        self.is_valid && (!strict || self.warnings.is_empty())
    }

    #[must_use]
    pub fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    #[must_use]
    pub fn has_warning(&self, code: &str) -> bool {
        self.warnings.iter().any(|w| w.code == code)
    }

    /// One-line summary for logs and error messages.
    #[must_use]
    pub fn summary(&self) -> String {
        let codes: Vec<&str> = self.errors.iter().map(|e| e.code.as_str()).collect();
        format!(
            "{} error(s) [{}], {} warning(s), {} conflict(s)",
            self.errors.len(),
            codes.join(", "),
            self.warnings.len(),
            self.conflicts.len()
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ValidationOptions {
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_max_hours")]
    pub max_hours_per_assignee: f64,
}

fn default_max_hours() -> f64 {
    DEFAULT_MAX_HOURS_PER_ASSIGNEE
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self { strict: false, dry_run: false, max_hours_per_assignee: DEFAULT_MAX_HOURS_PER_ASSIGNEE }
    }
}

/// Who asked for the validation; used for log attribution only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationContext {
    pub organization_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Confidence after deductions, clamped to `[0.0, 1.0]`.
#[must_use]
pub fn calculate_confidence(errors: usize, warnings: usize, high_conflicts: usize) -> f64 {
    let error_penalty = (count_f64(errors) * 0.2).min(0.8);
    let warning_penalty = (count_f64(warnings) * 0.05).min(0.2);
    let conflict_penalty = (count_f64(high_conflicts) * 0.15).min(0.3);
    (1.0 - error_penalty - warning_penalty - conflict_penalty).clamp(0.0, 1.0)
}

#[allow(clippy::cast_precision_loss, reason = "finding counts are tiny")]
fn count_f64(n: usize) -> f64 {
    n as f64
}

/// Validate a plan document.
#[must_use]
pub fn validate_plan(
    plan: &Value,
    context: &ValidationContext,
    options: &ValidationOptions,
) -> ValidationReport {
    let mut findings = Findings::default();

    let Some(root) = plan.as_object() else {
        findings.error(
            "$",
            "INVALID_ROOT",
            "plan must be a JSON object",
            Some("return an object with `title`, `milestones` and `tasks`"),
        );
        return findings.into_report(None);
    };

    check_root_shape(root, &mut findings);
    check_title(root, &mut findings);

    let milestone_keys = collect_milestone_keys(root, &mut findings);
    let tasks = collect_tasks(root, &mut findings);

    check_task_count(&tasks, &mut findings);
    check_task_rules(root, &tasks, &milestone_keys, &mut findings);

    let graph = DependencyGraph::build(&tasks, &mut findings);
    graph.detect_cycles(&tasks, &mut findings);
    check_resource_allocation(&tasks, options.max_hours_per_assignee, &mut findings);

    let dry_run = options.dry_run.then(|| DryRunSummary {
        projects: 1,
        milestones: milestone_keys.len(),
        tasks: tasks.len(),
        dependencies: graph.edge_count(),
    });

    let report = findings.into_report(dry_run);
    tracing::debug!(
        organization_id = ?context.organization_id,
        user_id = ?context.user_id,
        is_valid = report.is_valid,
        confidence = report.confidence,
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        conflicts = report.conflicts.len(),
        "plan validated"
    );
    report
}

#[derive(Default)]
struct Findings {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
    conflicts: Vec<PlanConflict>,
}

impl Findings {
    fn push(
        &mut self,
        severity: IssueSeverity,
        field: &str,
        code: &str,
        message: impl Into<String>,
        suggestion: Option<&str>,
    ) {
        let issue = ValidationIssue {
            field: field.to_owned(),
            code: code.to_owned(),
            message: message.into(),
            suggestion: suggestion.map(str::to_owned),
            severity,
        };
        match severity {
            IssueSeverity::Error => self.errors.push(issue),
            IssueSeverity::Warning => self.warnings.push(issue),
        }
    }

    fn error(&mut self, field: &str, code: &str, message: impl Into<String>, fix: Option<&str>) {
        self.push(IssueSeverity::Error, field, code, message, fix);
    }

    fn warning(&mut self, field: &str, code: &str, message: impl Into<String>, fix: Option<&str>) {
        self.push(IssueSeverity::Warning, field, code, message, fix);
    }

    fn into_report(self, dry_run: Option<DryRunSummary>) -> ValidationReport {
        let high = self.conflicts.iter().filter(|c| c.severity == ConflictSeverity::High).count();
        ValidationReport {
            is_valid: self.errors.is_empty(),
            confidence: calculate_confidence(self.errors.len(), self.warnings.len(), high),
            errors: self.errors,
            warnings: self.warnings,
            conflicts: self.conflicts,
            dry_run,
        }
    }
}

/// Flattened view of one task entry.
struct TaskView {
    key: Option<String>,
    title: Option<String>,
    priority: Option<Value>,
    estimate: Option<Value>,
    dependencies: Vec<String>,
    milestone_id: Option<String>,
    assignee: Option<String>,
}

impl TaskView {
    fn label(&self, index: usize) -> String {
        self.key.clone().unwrap_or_else(|| format!("tasks[{index}]"))
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn expect_type(
    value: Option<&Value>,
    field: &str,
    expected: &str,
    ok: fn(&Value) -> bool,
    findings: &mut Findings,
) {
    if let Some(v) = value.filter(|v| !v.is_null() && !ok(v)) {
        findings.error(
            field,
            "INVALID_TYPE",
            format!("`{field}` must be {expected}, got {}", type_name(v)),
            Some(format!("change `{field}` to {expected}").as_str()),
        );
    }
}

fn check_root_shape(root: &Map<String, Value>, findings: &mut Findings) {
    expect_type(root.get("title"), "title", "a string", Value::is_string, findings);
    expect_type(root.get("project"), "project", "an object", Value::is_object, findings);
    if let Some(project) = root.get("project").and_then(Value::as_object) {
        expect_type(project.get("name"), "project.name", "a string", Value::is_string, findings);
    }
    expect_type(root.get("milestones"), "milestones", "an array", Value::is_array, findings);
    expect_type(root.get("tasks"), "tasks", "an array", Value::is_array, findings);
}

fn plan_title(root: &Map<String, Value>) -> Option<&str> {
    non_blank(root.get("title").and_then(Value::as_str)).or_else(|| {
        non_blank(root.get("project").and_then(|p| p.get("name")).and_then(Value::as_str))
    })
}

fn check_title(root: &Map<String, Value>, findings: &mut Findings) {
    match plan_title(root) {
        None => findings.error(
            "title",
            "MISSING_TITLE",
            "plan title is required",
            Some("add a short, descriptive `title`"),
        ),
        Some(title) if title.chars().count() > MAX_PLAN_TITLE_LEN => findings.warning(
            "title",
            "TITLE_TOO_LONG",
            format!("plan title exceeds {MAX_PLAN_TITLE_LEN} characters"),
            Some("shorten the title and move detail into the description"),
        ),
        Some(_) => {},
    }
}

fn collect_milestone_keys(root: &Map<String, Value>, findings: &mut Findings) -> Vec<String> {
    let Some(milestones) = root.get("milestones").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut keys = Vec::with_capacity(milestones.len());
    for (i, milestone) in milestones.iter().enumerate() {
        let field = format!("milestones[{i}]");
        let Some(obj) = milestone.as_object() else {
            expect_type(Some(milestone), &field, "an object", Value::is_object, findings);
            continue;
        };
        let id = non_blank(obj.get("id").and_then(Value::as_str));
        let name = non_blank(obj.get("name").and_then(Value::as_str));
        if name.is_none() {
            findings.warning(
                &format!("{field}.name"),
                "MISSING_MILESTONE_NAME",
                "milestone has no name",
                Some("give every milestone a `name`"),
            );
        }
        if let Some(key) = id.or(name) {
            keys.push(key.to_owned());
        }
    }
    keys
}

fn collect_tasks(root: &Map<String, Value>, findings: &mut Findings) -> Vec<TaskView> {
    let Some(tasks) = root.get("tasks").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut views = Vec::with_capacity(tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        let field = format!("tasks[{i}]");
        let Some(obj) = task.as_object() else {
            expect_type(Some(task), &field, "an object", Value::is_object, findings);
            views.push(TaskView {
                key: None,
                title: None,
                priority: None,
                estimate: None,
                dependencies: Vec::new(),
                milestone_id: None,
                assignee: None,
            });
            continue;
        };

        expect_type(obj.get("id"), &format!("{field}.id"), "a string", Value::is_string, findings);
        expect_type(
            obj.get("milestone_id"),
            &format!("{field}.milestone_id"),
            "a string",
            Value::is_string,
            findings,
        );
        expect_type(
            obj.get("assignee"),
            &format!("{field}.assignee"),
            "a string",
            Value::is_string,
            findings,
        );

        let mut dependencies = Vec::new();
        match obj.get("dependencies") {
            None | Some(Value::Null) => {},
            Some(Value::Array(items)) => {
                for (j, item) in items.iter().enumerate() {
                    match item.as_str() {
                        Some(dep) => dependencies.push(dep.trim().to_owned()),
                        None => expect_type(
                            Some(item),
                            &format!("{field}.dependencies[{j}]"),
                            "a string",
                            Value::is_string,
                            findings,
                        ),
                    }
                }
            },
            Some(other) => expect_type(
                Some(other),
                &format!("{field}.dependencies"),
                "an array",
                Value::is_array,
                findings,
            ),
        }

        let title = non_blank(obj.get("title").and_then(Value::as_str)).map(str::to_owned);
        let id = non_blank(obj.get("id").and_then(Value::as_str)).map(str::to_owned);
        views.push(TaskView {
            key: id.or_else(|| title.clone()),
            title,
            priority: obj.get("priority").cloned(),
            estimate: obj.get("estimated_hours").filter(|v| !v.is_null()).cloned(),
            dependencies,
            milestone_id: non_blank(obj.get("milestone_id").and_then(Value::as_str))
                .map(str::to_owned),
            assignee: non_blank(obj.get("assignee").and_then(Value::as_str)).map(str::to_owned),
        });
    }
    views
}

fn check_task_count(tasks: &[TaskView], findings: &mut Findings) {
    if tasks.is_empty() {
        findings.error(
            "tasks",
            "NO_TASKS",
            "plan must contain at least one task",
            Some("break the project down into at least one actionable task"),
        );
    } else if tasks.len() > RECONCILER_TASK_WARNING_THRESHOLD {
        findings.warning(
            "tasks",
            "TOO_MANY_TASKS",
            format!(
                "plan has {} tasks (more than {RECONCILER_TASK_WARNING_THRESHOLD})",
                tasks.len()
            ),
            Some("group related tasks under milestones or split the project into phases"),
        );
    }
}

fn check_task_rules(
    root: &Map<String, Value>,
    tasks: &[TaskView],
    milestone_keys: &[String],
    findings: &mut Findings,
) {
    let is_object = |i: usize| {
        root.get("tasks")
            .and_then(Value::as_array)
            .and_then(|arr| arr.get(i))
            .is_some_and(Value::is_object)
    };

    for (i, task) in tasks.iter().enumerate() {
        if !is_object(i) {
            continue;
        }
        let field = format!("tasks[{i}]");

        if task.title.is_none() {
            findings.error(
                &format!("{field}.title"),
                "MISSING_TASK_TITLE",
                "task title is required",
                Some("describe the task in a few words"),
            );
        }

        let priority_ok = task
            .priority
            .as_ref()
            .and_then(Value::as_str)
            .is_some_and(|p| p.parse::<TaskPriority>().is_ok());
        if !priority_ok {
            findings.error(
                &format!("{field}.priority"),
                "INVALID_PRIORITY",
                format!("task priority must be one of {}", TaskPriority::ALL_VARIANTS_STR),
                Some("set `priority` to low, medium, high or critical"),
            );
        }

        if let Some(estimate) = &task.estimate {
            match estimate.as_f64() {
                Some(hours) if hours >= 0.0 => {
                    if hours > HIGH_TASK_ESTIMATE_HOURS {
                        findings.warning(
                            &format!("{field}.estimated_hours"),
                            "HIGH_ESTIMATE",
                            format!("task estimate of {hours}h exceeds {HIGH_TASK_ESTIMATE_HOURS}h"),
                            Some("split the task into smaller pieces"),
                        );
                    }
                },
                _ => findings.error(
                    &format!("{field}.estimated_hours"),
                    "INVALID_ESTIMATE",
                    "estimated_hours must be a non-negative number",
                    Some("use a number of hours such as 4 or 12.5"),
                ),
            }
        }

        if let Some(milestone) = &task.milestone_id {
            if !milestone_keys.iter().any(|k| k == milestone) {
                findings.warning(
                    &format!("{field}.milestone_id"),
                    "UNKNOWN_MILESTONE",
                    format!("task references unknown milestone `{milestone}`"),
                    Some("reference a milestone `id` declared in `milestones`"),
                );
            }
        }
    }
}

/// Task dependency graph; edges point from a task to the tasks it depends on.
struct DependencyGraph {
    edges: Vec<Vec<usize>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Gray,
    Black,
}

impl DependencyGraph {
    fn build(tasks: &[TaskView], findings: &mut Findings) -> Self {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            let Some(key) = task.key.as_deref() else { continue };
            if index.contains_key(key) {
                findings.warning(
                    &format!("tasks[{i}].id"),
                    "DUPLICATE_TASK_ID",
                    format!("task key `{key}` is used more than once"),
                    Some("give every task a unique `id`"),
                );
            } else {
                index.insert(key, i);
            }
        }

        let mut edges = vec![Vec::new(); tasks.len()];
        for (i, task) in tasks.iter().enumerate() {
            for (j, dep) in task.dependencies.iter().enumerate() {
                let field = format!("tasks[{i}].dependencies[{j}]");
                match index.get(dep.as_str()) {
                    None => findings.error(
                        &field,
                        "UNKNOWN_DEPENDENCY",
                        format!("dependency `{dep}` does not match any task"),
                        Some("reference another task's `id` in this plan"),
                    ),
                    Some(&target) => {
                        if target > i {
                            findings.warning(
                                &field,
                                "FORWARD_DEPENDENCY",
                                format!(
                                    "task `{}` depends on `{dep}`, which appears later in the list",
                                    task.label(i)
                                ),
                                Some("order tasks so dependencies come first"),
                            );
                        }
                        if let Some(list) = edges.get_mut(i) {
                            list.push(target);
                        }
                    },
                }
            }
        }
        Self { edges }
    }

    fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }

    /// White/gray/black DFS; every back edge to a gray node is one cycle.
    ///
    /// Iterative with an explicit frame stack, so chain depth is bounded by
    /// heap rather than thread stack.
    fn detect_cycles(&self, tasks: &[TaskView], findings: &mut Findings) {
        let mut marks = vec![Mark::White; self.edges.len()];
        // Position of each gray node on `path`.
        let mut path_pos = vec![usize::MAX; self.edges.len()];
        let mut path: Vec<usize> = Vec::new();
        // (node, index of the next outgoing edge to explore)
        let mut frames: Vec<(usize, usize)> = Vec::new();

        for start in 0..self.edges.len() {
            if marks.get(start) != Some(&Mark::White) {
                continue;
            }
            enter(start, &mut marks, &mut path_pos, &mut path, &mut frames);

            while let Some(frame) = frames.last_mut() {
                let (node, edge_idx) = *frame;
                let Some(&next) = self.edges.get(node).and_then(|e| e.get(edge_idx)) else {
                    frames.pop();
                    path.pop();
                    if let Some(mark) = marks.get_mut(node) {
                        *mark = Mark::Black;
                    }
                    if let Some(pos) = path_pos.get_mut(node) {
                        *pos = usize::MAX;
                    }
                    continue;
                };
                frame.1 += 1;

                match marks.get(next).copied() {
                    Some(Mark::White) => {
                        enter(next, &mut marks, &mut path_pos, &mut path, &mut frames);
                    },
                    Some(Mark::Gray) => {
                        let from = path_pos.get(next).copied().unwrap_or(0);
                        let ids: Vec<String> = path
                            .get(from..)
                            .unwrap_or_default()
                            .iter()
                            .chain(std::iter::once(&next))
                            .map(|&n| tasks.get(n).map_or_else(|| n.to_string(), |t| t.label(n)))
                            .collect();
                        findings.conflicts.push(PlanConflict {
                            conflict_type: ConflictType::DependencyConflict,
                            severity: ConflictSeverity::High,
                            description: format!("circular dependency: {}", ids.join(" -> ")),
                            task_ids: ids,
                        });
                    },
                    Some(Mark::Black) | None => {},
                }
            }
        }
    }
}

fn enter(
    node: usize,
    marks: &mut [Mark],
    path_pos: &mut [usize],
    path: &mut Vec<usize>,
    frames: &mut Vec<(usize, usize)>,
) {
    if let Some(mark) = marks.get_mut(node) {
        *mark = Mark::Gray;
    }
    if let Some(pos) = path_pos.get_mut(node) {
        *pos = path.len();
    }
    path.push(node);
    frames.push((node, 0));
}

fn check_resource_allocation(tasks: &[TaskView], max_hours: f64, findings: &mut Findings) {
    let mut load: Vec<(String, f64, Vec<String>)> = Vec::new();
    for (i, task) in tasks.iter().enumerate() {
        let (Some(assignee), Some(hours)) =
            (task.assignee.as_deref(), task.estimate.as_ref().and_then(Value::as_f64))
        else {
            continue;
        };
        if hours < 0.0 {
            continue;
        }
        let normalized = assignee.to_lowercase();
        match load.iter_mut().find(|(who, _, _)| *who == normalized) {
            Some((_, total, ids)) => {
                *total += hours;
                ids.push(task.label(i));
            },
            None => load.push((normalized, hours, vec![task.label(i)])),
        }
    }

    for (assignee, total, task_ids) in load {
        if total > max_hours {
            findings.conflicts.push(PlanConflict {
                conflict_type: ConflictType::ResourceConflict,
                severity: ConflictSeverity::Medium,
                description: format!(
                    "`{assignee}` is allocated {total}h, above the {max_hours}h budget"
                ),
                task_ids,
            });
        }
    }
}
