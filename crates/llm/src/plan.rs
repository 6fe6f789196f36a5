//! Plan generation over the chat-completion client.
//!
//! The provider is asked for a JSON object shaped `{"plan": {...}, "confidence": 0.0..1.0}`.
//! A bare plan document is accepted too and scored with the default confidence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use voiceplan_core::constants::{DEFAULT_ORCHESTRATOR_MAX_TASKS, DEFAULT_PLAN_CONFIDENCE};
use voiceplan_core::json_utils::{strip_markdown_json, value_as_f64};
use voiceplan_core::ValidationIssue;

use crate::ai_types::{ChatRequest, Message, ResponseFormat};
use crate::client::{LlmClient, MAX_TRANSCRIPT_LEN, truncate};
use crate::error::LlmError;

const MAX_ALTERNATIVES: usize = 5;

const PLAN_SYSTEM_PROMPT: &str = r#"You turn spoken project descriptions into structured project plans.
Return a single JSON object: {"plan": PLAN, "confidence": number between 0 and 1}.
PLAN has the shape:
{
  "title": string,
  "project": {"name": string, "description": string, "start_date": "YYYY-MM-DD", "end_date": "YYYY-MM-DD"},
  "milestones": [{"id": string, "name": string, "due_date": "YYYY-MM-DD"}],
  "tasks": [{"id": string, "title": string, "description": string,
             "priority": "low" | "medium" | "high" | "critical",
             "estimated_hours": number, "assignee": string,
             "dependencies": [task id], "milestone_id": milestone id}]
}
Every dependency must reference another task id in the same plan. Never create dependency cycles.
List prerequisite tasks before the tasks that depend on them."#;

/// Knobs forwarded to the provider alongside the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOptions {
    pub max_tasks: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self { max_tasks: DEFAULT_ORCHESTRATOR_MAX_TASKS, language: None }
    }
}

/// Input to plan generation: transcript plus caller-supplied context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub transcript: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default)]
    pub options: PlanOptions,
}

impl PlanRequest {
    #[must_use]
    pub fn new(transcript: impl Into<String>) -> Self {
        Self { transcript: transcript.into(), context: None, options: PlanOptions::default() }
    }

    /// Stable key for caching generated plans.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let context = self.context.as_ref().map(Value::to_string).unwrap_or_default();
        format!("{}\u{1f}{context}\u{1f}{}", self.transcript.trim(), self.options.max_tasks)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPlan {
    pub plan: Value,
    pub confidence: f64,
    pub model: String,
}

/// Anything that can produce plan documents from transcripts.
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate_plan(&self, request: &PlanRequest) -> Result<GeneratedPlan, LlmError>;

    /// Up to `count` alternative plans for the same goal.
    async fn generate_alternatives(
        &self,
        plan: &Value,
        count: usize,
    ) -> Result<Vec<GeneratedPlan>, LlmError>;

    /// Ask the provider to fix the listed validation issues.
    async fn refine_plan(
        &self,
        plan: &Value,
        issues: &[ValidationIssue],
    ) -> Result<GeneratedPlan, LlmError>;
}

fn json_request(model: &str, system: &str, user: String) -> ChatRequest {
    ChatRequest {
        model: model.to_owned(),
        messages: vec![Message::system(system), Message::user(user)],
        response_format: ResponseFormat { format_type: "json_object".to_owned() },
        temperature: Some(0.2),
    }
}

fn plan_prompt(request: &PlanRequest) -> String {
    let mut prompt = format!(
        "Transcript:\n{}\n\nUse at most {} tasks.",
        truncate(&request.transcript, MAX_TRANSCRIPT_LEN),
        request.options.max_tasks
    );
    if let Some(language) = &request.options.language {
        prompt.push_str(&format!("\nThe speaker's language is {language}; write titles in it."));
    }
    if let Some(context) = &request.context {
        prompt.push_str(&format!("\n\nAdditional context:\n{context}"));
    }
    prompt
}

/// Parse model output into a plan and confidence.
///
/// # Errors
/// Returns `JsonParse` for non-JSON content and `MissingField` when the JSON is not an object.
pub fn parse_plan_response(content: &str, model: &str) -> Result<GeneratedPlan, LlmError> {
    let stripped = strip_markdown_json(content);
    let value: Value = serde_json::from_str(stripped)
        .map_err(|e| LlmError::json(format!("plan response ({})", truncate(stripped, 200)), e))?;
    plan_from_value(value, model)
}

fn plan_from_value(value: Value, model: &str) -> Result<GeneratedPlan, LlmError> {
    let Value::Object(mut map) = value else {
        return Err(LlmError::MissingField("plan".to_owned()));
    };
    if matches!(map.get("plan"), Some(Value::Object(_))) {
        let confidence = map
            .get("confidence")
            .and_then(value_as_f64)
            .map_or(DEFAULT_PLAN_CONFIDENCE, |c| c.clamp(0.0, 1.0));
        let plan = map.remove("plan").unwrap_or(Value::Null);
        return Ok(GeneratedPlan { plan, confidence, model: model.to_owned() });
    }
    Ok(GeneratedPlan {
        plan: Value::Object(map),
        confidence: DEFAULT_PLAN_CONFIDENCE,
        model: model.to_owned(),
    })
}

/// Alternatives may arrive as `{"alternatives": [...]}` or as a bare array.
fn parse_alternatives(content: &str, model: &str, count: usize) -> Result<Vec<GeneratedPlan>, LlmError> {
    let stripped = strip_markdown_json(content);
    let value: Value = serde_json::from_str(stripped)
        .map_err(|e| LlmError::json("alternatives response", e))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("alternatives") {
            Some(Value::Array(items)) => items,
            _ => return Err(LlmError::MissingField("alternatives".to_owned())),
        },
        _ => return Err(LlmError::MissingField("alternatives".to_owned())),
    };
    let mut plans = Vec::with_capacity(items.len().min(count));
    for item in items.into_iter().take(count) {
        match plan_from_value(item, model) {
            Ok(plan) => plans.push(plan),
            Err(e) => tracing::debug!(error = %e, "skipping malformed alternative"),
        }
    }
    Ok(plans)
}

#[async_trait]
impl PlanGenerator for LlmClient {
    async fn generate_plan(&self, request: &PlanRequest) -> Result<GeneratedPlan, LlmError> {
        let chat = json_request(&self.model, PLAN_SYSTEM_PROMPT, plan_prompt(request));
        let content = self.chat_completion(&chat).await?;
        let generated = parse_plan_response(&content, &self.model)?;
        tracing::debug!(model = %self.model, confidence = generated.confidence, "plan generated");
        Ok(generated)
    }

    async fn generate_alternatives(
        &self,
        plan: &Value,
        count: usize,
    ) -> Result<Vec<GeneratedPlan>, LlmError> {
        let count = count.min(MAX_ALTERNATIVES);
        if count == 0 {
            return Ok(Vec::new());
        }
        let prompt = format!(
            "Propose {count} meaningfully different alternative plans for the same goal \
             (for example a faster or a lower-risk variant).\n\
             Return {{\"alternatives\": [{{\"plan\": PLAN, \"confidence\": number}}]}}.\n\n\
             Current plan:\n{plan}"
        );
        let chat = json_request(&self.model, PLAN_SYSTEM_PROMPT, prompt);
        let content = self.chat_completion(&chat).await?;
        parse_alternatives(&content, &self.model, count)
    }

    async fn refine_plan(
        &self,
        plan: &Value,
        issues: &[ValidationIssue],
    ) -> Result<GeneratedPlan, LlmError> {
        let issue_lines: String = issues
            .iter()
            .map(|i| {
                let hint = i.suggestion.as_deref().map(|s| format!(" ({s})")).unwrap_or_default();
                format!("- {} [{}]: {}{hint}\n", i.field, i.code, i.message)
            })
            .collect();
        let prompt = format!(
            "Fix these validation issues while keeping everything else unchanged:\n{issue_lines}\n\
             Plan:\n{plan}"
        );
        let chat = json_request(&self.model, PLAN_SYSTEM_PROMPT, prompt);
        let content = self.chat_completion(&chat).await?;
        parse_plan_response(&content, &self.model)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test code")]

    use super::*;
    use serde_json::json;

    #[test]
    fn wrapped_plan_keeps_confidence() {
        let content = r#"```json
{"plan": {"title": "Launch", "tasks": []}, "confidence": 0.92}
```"#;
        let generated = parse_plan_response(content, "m").unwrap();
        assert_eq!(generated.plan["title"], "Launch");
        assert!((generated.confidence - 0.92).abs() < f64::EPSILON);
        assert_eq!(generated.model, "m");
    }

    #[test]
    fn bare_plan_uses_default_confidence() {
        let generated = parse_plan_response(r#"{"title": "Launch", "tasks": []}"#, "m").unwrap();
        assert_eq!(generated.plan, json!({"title": "Launch", "tasks": []}));
        assert!((generated.confidence - DEFAULT_PLAN_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let generated = parse_plan_response(r#"{"plan": {"title": "x"}, "confidence": 3}"#, "m").unwrap();
        assert!((generated.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn non_object_response_is_rejected() {
        assert!(matches!(parse_plan_response("[1, 2]", "m"), Err(LlmError::MissingField(_))));
        assert!(matches!(parse_plan_response("not json", "m"), Err(LlmError::JsonParse { .. })));
    }

    #[test]
    fn alternatives_accept_both_shapes_and_cap_count() {
        let wrapped = r#"{"alternatives": [{"plan": {"title": "A"}, "confidence": 0.6}, {"title": "B"}, {"title": "C"}]}"#;
        let plans = parse_alternatives(wrapped, "m", 2).unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].plan["title"], "A");
        assert_eq!(plans[1].plan["title"], "B");

        let bare = parse_alternatives(r#"[{"title": "A"}, 7]"#, "m", 5).unwrap();
        assert_eq!(bare.len(), 1);
    }

    #[test]
    fn prompt_mentions_context_and_language() {
        let request = PlanRequest {
            transcript: "build the app".into(),
            context: Some(json!({"team": "mobile"})),
            options: PlanOptions { max_tasks: 12, language: Some("de".into()) },
        };
        let prompt = plan_prompt(&request);
        assert!(prompt.contains("build the app"));
        assert!(prompt.contains("at most 12 tasks"));
        assert!(prompt.contains("language is de"));
        assert!(prompt.contains("mobile"));
    }

    #[test]
    fn cache_key_depends_on_context() {
        let a = PlanRequest::new("same words");
        let mut b = PlanRequest::new("same words ");
        assert_eq!(a.cache_key(), b.cache_key());
        b.context = Some(json!({"x": 1}));
        assert_ne!(a.cache_key(), b.cache_key());
    }
}
