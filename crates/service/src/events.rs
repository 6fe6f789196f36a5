//! Best-effort lifecycle event emission.
//!
//! Sinks receive validated envelopes one way. A sink failure is logged and
//! dropped; it never reaches the caller.

use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;
use voiceplan_core::{EventEnvelope, EventKind};

use crate::Actor;

/// Channel capacity for the SSE broadcast sink.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

pub trait EventSink: Send + Sync {
    fn name(&self) -> &'static str;

    fn publish(&self, envelope: &EventEnvelope) -> anyhow::Result<()>;
}

/// Logs every envelope at info level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn publish(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        tracing::info!(
            event = %envelope.event,
            event_id = %envelope.id,
            org_id = %envelope.org_id,
            session_id = ?envelope.session_id,
            correlation_id = ?envelope.correlation_id,
            causation_id = ?envelope.causation_id,
            "lifecycle event"
        );
        Ok(())
    }
}

/// Feeds serialized envelopes to SSE subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<String>,
}

impl BroadcastSink {
    #[must_use]
    pub const fn new(tx: broadcast::Sender<String>) -> Self {
        Self { tx }
    }
}

impl EventSink for BroadcastSink {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn publish(&self, envelope: &EventEnvelope) -> anyhow::Result<()> {
        let json = serde_json::to_string(envelope)?;
        // No subscribers is not a failure.
        let _ = self.tx.send(json);
        Ok(())
    }
}

#[derive(Default)]
pub struct EventEmitter {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventEmitter {
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    /// Emitter with a tracing sink and a broadcast sink on `tx`.
    #[must_use]
    pub fn with_broadcast(tx: broadcast::Sender<String>) -> Self {
        Self::new(vec![Arc::new(TracingSink), Arc::new(BroadcastSink::new(tx))])
    }

    /// Publish to every sink. Returns the envelope id when the envelope was valid.
    pub fn emit(&self, builder: voiceplan_core::EventEnvelopeBuilder) -> Option<Uuid> {
        let envelope = match builder.build() {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "dropping invalid event envelope");
                return None;
            },
        };
        for sink in &self.sinks {
            if let Err(e) = sink.publish(&envelope) {
                tracing::warn!(
                    sink = sink.name(),
                    event = %envelope.event,
                    error = %e,
                    "event sink failed, event dropped for this sink"
                );
            }
        }
        Some(envelope.id)
    }

    /// Start a causally linked sequence of events sharing one correlation id.
    #[must_use]
    pub fn chain(&self, actor: Actor, session_id: Option<Uuid>) -> EventChain<'_> {
        EventChain {
            emitter: self,
            actor,
            session_id,
            correlation_id: Uuid::new_v4(),
            last_event_id: None,
        }
    }
}

/// Events of one run: shared correlation id, each caused by the previous one.
pub struct EventChain<'a> {
    emitter: &'a EventEmitter,
    actor: Actor,
    session_id: Option<Uuid>,
    correlation_id: Uuid,
    last_event_id: Option<Uuid>,
}

impl EventChain<'_> {
    #[must_use]
    pub const fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn set_session(&mut self, session_id: Uuid) {
        self.session_id = Some(session_id);
    }

    pub fn emit(&mut self, kind: EventKind, payload: serde_json::Value) {
        let mut builder = EventEnvelope::builder(kind, self.actor.organization_id)
            .user(self.actor.user_id)
            .payload(payload)
            .correlation(self.correlation_id)
            .causation(self.last_event_id)
            .tag("voice");
        if let Some(session_id) = self.session_id {
            builder = builder.session(session_id);
        }
        if let Some(id) = self.emitter.emit(builder) {
            self.last_event_id = Some(id);
        }
    }
}
