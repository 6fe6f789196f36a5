//! Lifecycle event envelopes.
//!
//! Envelopes are validated at build time so sinks never see a malformed one.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::EVENT_SCHEMA_VERSION;
use crate::error::CoreError;

/// Maximum number of tags on one envelope.
pub const MAX_EVENT_TAGS: usize = 20;

#[expect(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z0-9\-_]{1,50}$").unwrap());

#[expect(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static SEMVER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?$")
        .unwrap()
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    #[serde(rename = "voice.session.created")]
    SessionCreated,
    #[serde(rename = "voice.session.status_changed")]
    SessionStatusChanged,
    #[serde(rename = "voice.session.cancelled")]
    SessionCancelled,
    #[serde(rename = "voice.session.failed")]
    SessionFailed,
    #[serde(rename = "voice.transcription.completed")]
    TranscriptionCompleted,
    #[serde(rename = "voice.plan.generated")]
    PlanGenerated,
    #[serde(rename = "voice.plan.validated")]
    PlanValidated,
    #[serde(rename = "voice.plan.committed")]
    PlanCommitted,
    #[serde(rename = "voice.plan.shadow_committed")]
    PlanShadowCommitted,
    #[serde(rename = "voice.plan.commit_failed")]
    PlanCommitFailed,
    #[serde(rename = "voice.plan.rolled_back")]
    PlanRolledBack,
}

impl EventKind {
    pub const ALL: &'static [EventKind] = &[
        Self::SessionCreated,
        Self::SessionStatusChanged,
        Self::SessionCancelled,
        Self::SessionFailed,
        Self::TranscriptionCompleted,
        Self::PlanGenerated,
        Self::PlanValidated,
        Self::PlanCommitted,
        Self::PlanShadowCommitted,
        Self::PlanCommitFailed,
        Self::PlanRolledBack,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::SessionCreated => "voice.session.created",
            Self::SessionStatusChanged => "voice.session.status_changed",
            Self::SessionCancelled => "voice.session.cancelled",
            Self::SessionFailed => "voice.session.failed",
            Self::TranscriptionCompleted => "voice.transcription.completed",
            Self::PlanGenerated => "voice.plan.generated",
            Self::PlanValidated => "voice.plan.validated",
            Self::PlanCommitted => "voice.plan.committed",
            Self::PlanShadowCommitted => "voice.plan.shadow_committed",
            Self::PlanCommitFailed => "voice.plan.commit_failed",
            Self::PlanRolledBack => "voice.plan.rolled_back",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CoreError::invalid_enum("event kind", s))
    }
}

/// Wire format consumed by observability sinks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub event: EventKind,
    pub version: String,
    pub occurred_at: DateTime<Utc>,
    pub org_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub payload: serde_json::Value,
    #[serde(rename = "correlationId", default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    #[serde(rename = "causationId", default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl EventEnvelope {
    #[must_use]
    pub fn builder(event: EventKind, org_id: Uuid) -> EventEnvelopeBuilder {
        EventEnvelopeBuilder {
            event,
            org_id,
            version: EVENT_SCHEMA_VERSION.to_owned(),
            occurred_at: None,
            session_id: None,
            user_id: None,
            payload: serde_json::Value::Object(serde_json::Map::new()),
            correlation_id: None,
            causation_id: None,
            metadata: None,
            tags: Vec::new(),
        }
    }

    /// Re-check an envelope received from elsewhere.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidEnvelope`] describing the first violation.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_parts(&self.version, &self.payload, self.tags.as_deref().unwrap_or_default())
    }
}

/// Builder for [`EventEnvelope`].
#[derive(Debug, Clone)]
#[must_use]
pub struct EventEnvelopeBuilder {
    event: EventKind,
    org_id: Uuid,
    version: String,
    occurred_at: Option<DateTime<Utc>>,
    session_id: Option<Uuid>,
    user_id: Option<Uuid>,
    payload: serde_json::Value,
    correlation_id: Option<Uuid>,
    causation_id: Option<Uuid>,
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
    tags: Vec<String>,
}

impl EventEnvelopeBuilder {
    pub fn session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn causation(mut self, causation_id: Option<Uuid>) -> Self {
        self.causation_id = causation_id;
        self
    }

    pub fn metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.get_or_insert_with(serde_json::Map::new).insert(key.to_owned(), value);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidEnvelope`] when the payload is not an object,
    /// a tag does not match `[a-z0-9-_]{1,50}`, there are more than
    /// [`MAX_EVENT_TAGS`] tags, or the version is not semver.
    pub fn build(self) -> Result<EventEnvelope, CoreError> {
        validate_parts(&self.version, &self.payload, &self.tags)?;
        Ok(EventEnvelope {
            id: Uuid::new_v4(),
            event: self.event,
            version: self.version,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            org_id: self.org_id,
            session_id: self.session_id,
            user_id: self.user_id,
            payload: self.payload,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            metadata: self.metadata,
            tags: (!self.tags.is_empty()).then_some(self.tags),
        })
    }
}

fn validate_parts(version: &str, payload: &serde_json::Value, tags: &[String]) -> Result<(), CoreError> {
    if !SEMVER_REGEX.is_match(version) {
        return Err(CoreError::InvalidEnvelope(format!("version `{version}` is not semver")));
    }
    if !payload.is_object() {
        return Err(CoreError::InvalidEnvelope("payload must be a JSON object".to_owned()));
    }
    if tags.len() > MAX_EVENT_TAGS {
        return Err(CoreError::InvalidEnvelope(format!(
            "{} tags exceeds the maximum of {MAX_EVENT_TAGS}",
            tags.len()
        )));
    }
    if let Some(bad) = tags.iter().find(|t| !TAG_REGEX.is_match(t)) {
        return Err(CoreError::InvalidEnvelope(format!("tag `{bad}` must match [a-z0-9-_]{{1,50}}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_wire_format() {
        let org = Uuid::new_v4();
        let session = Uuid::new_v4();
        let correlation = Uuid::new_v4();
        let envelope = EventEnvelope::builder(EventKind::PlanGenerated, org)
            .session(session)
            .payload(json!({"confidence": 0.9}))
            .correlation(correlation)
            .metadata("source", json!("orchestrator"))
            .tag("voice")
            .tag("plan_generation")
            .build()
            .unwrap();

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["event"], "voice.plan.generated");
        assert_eq!(value["version"], EVENT_SCHEMA_VERSION);
        assert_eq!(value["org_id"], org.to_string());
        assert_eq!(value["correlationId"], correlation.to_string());
        assert!(value.get("causationId").is_none());
        assert!(value.get("user_id").is_none());
        assert_eq!(value["tags"], json!(["voice", "plan_generation"]));
        envelope.validate().unwrap();
    }

    #[test]
    fn rejects_non_object_payload() {
        let err = EventEnvelope::builder(EventKind::SessionCreated, Uuid::new_v4())
            .payload(json!([1, 2]))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidEnvelope(_)));
    }

    #[test]
    fn rejects_bad_tags() {
        let upper = EventEnvelope::builder(EventKind::SessionCreated, Uuid::new_v4())
            .tag("Voice")
            .build();
        assert!(upper.is_err());

        let long = EventEnvelope::builder(EventKind::SessionCreated, Uuid::new_v4())
            .tag("x".repeat(51))
            .build();
        assert!(long.is_err());

        let mut many = EventEnvelope::builder(EventKind::SessionCreated, Uuid::new_v4());
        for i in 0..=MAX_EVENT_TAGS {
            many = many.tag(format!("t{i}"));
        }
        assert!(many.build().is_err());
    }

    #[test]
    fn rejects_non_semver_version() {
        let err = EventEnvelope::builder(EventKind::SessionCreated, Uuid::new_v4())
            .version("v1")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("semver"));
    }

    #[test]
    fn kinds_round_trip_through_serde() {
        for kind in EventKind::ALL {
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, json!(kind.as_str()));
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), *kind);
        }
    }
}
