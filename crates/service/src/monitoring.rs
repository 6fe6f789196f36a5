//! In-memory voice pipeline metrics, KPI aggregation and threshold alerts.
//!
//! Records are pruned against the retention window on every insert. Alerts are
//! appended when a sample crosses a threshold and stay active until a caller
//! resolves them.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voiceplan_core::PipelineStage;
use voiceplan_core::constants::DEFAULT_METRICS_RETENTION_DAYS;
use voiceplan_core::env_config::env_parse_with_default;

use crate::ServiceError;

#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringConfig {
    pub retention: Duration,
    pub transcription_alert_ms: u64,
    pub plan_alert_ms: u64,
    pub min_confidence: f64,
    /// Percent of failed sessions tolerated before the KPI status degrades.
    pub max_error_rate: f64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            retention: Duration::days(DEFAULT_METRICS_RETENTION_DAYS),
            transcription_alert_ms: 5_000,
            plan_alert_ms: 15_000,
            min_confidence: 0.7,
            max_error_rate: 5.0,
        }
    }
}

impl MonitoringConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let d = Self::default();
        let retention_days =
            env_parse_with_default("VOICEPLAN_METRICS_RETENTION_DAYS", DEFAULT_METRICS_RETENTION_DAYS)
                .max(1);
        Self {
            retention: Duration::days(retention_days),
            transcription_alert_ms: env_parse_with_default(
                "VOICEPLAN_ALERT_TRANSCRIPTION_MS",
                d.transcription_alert_ms,
            ),
            plan_alert_ms: env_parse_with_default("VOICEPLAN_ALERT_PLAN_MS", d.plan_alert_ms),
            min_confidence: env_parse_with_default("VOICEPLAN_ALERT_MIN_CONFIDENCE", d.min_confidence)
                .clamp(0.0, 1.0),
            max_error_rate: env_parse_with_default("VOICEPLAN_MAX_ERROR_RATE", d.max_error_rate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricSample {
    /// End-of-run snapshot for one orchestration.
    Session { total_ms: u64, stage_ms: BTreeMap<PipelineStage, u64>, succeeded: bool },
    Transcription { latency_ms: u64, confidence: f64 },
    PlanGeneration { latency_ms: u64, confidence: f64 },
    Failure { stage: PipelineStage, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub session_id: Option<Uuid>,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub sample: MetricSample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    TranscriptionLatency,
    PlanGenerationLatency,
    LowConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAlert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub avg_ms: f64,
    pub p95_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDashboard {
    pub window_hours: i64,
    pub generated_at: DateTime<Utc>,
    pub total_sessions: usize,
    pub failed_sessions: usize,
    /// `failed / total * 100`, 0 when there are no sessions.
    pub error_rate: f64,
    pub session: LatencyStats,
    pub transcription: LatencyStats,
    pub plan_generation: LatencyStats,
    pub avg_transcript_confidence: f64,
    pub avg_plan_confidence: f64,
    pub failures_by_stage: BTreeMap<PipelineStage, usize>,
    pub active_alerts: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiCheck {
    pub name: &'static str,
    /// `None` when the window holds no samples for this KPI.
    pub value: Option<f64>,
    pub threshold: f64,
    pub level: HealthLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiStatus {
    pub overall: HealthLevel,
    pub checks: Vec<KpiCheck>,
    pub dashboard: KpiDashboard,
}

/// Status window used by [`MonitoringService::kpi_status`].
pub const KPI_STATUS_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Default)]
struct MonitoringState {
    records: Vec<MetricRecord>,
    alerts: Vec<PerformanceAlert>,
}

#[derive(Debug, Default)]
pub struct MonitoringService {
    config: MonitoringConfig,
    state: Mutex<MonitoringState>,
}

impl MonitoringService {
    #[must_use]
    pub fn new(config: MonitoringConfig) -> Self {
        Self { config, state: Mutex::new(MonitoringState::default()) }
    }

    #[must_use]
    pub const fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, MonitoringState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn track_session_metrics(
        &self,
        session_id: Uuid,
        total_ms: u64,
        stage_ms: BTreeMap<PipelineStage, u64>,
        succeeded: bool,
    ) {
        self.record(MetricRecord {
            session_id: Some(session_id),
            recorded_at: Utc::now(),
            sample: MetricSample::Session { total_ms, stage_ms, succeeded },
        });
    }

    pub fn track_transcription_completion(
        &self,
        session_id: Option<Uuid>,
        latency_ms: u64,
        confidence: f64,
    ) {
        self.record(MetricRecord {
            session_id,
            recorded_at: Utc::now(),
            sample: MetricSample::Transcription { latency_ms, confidence },
        });
    }

    pub fn track_plan_generation_completion(&self, session_id: Uuid, latency_ms: u64, confidence: f64) {
        self.record(MetricRecord {
            session_id: Some(session_id),
            recorded_at: Utc::now(),
            sample: MetricSample::PlanGeneration { latency_ms, confidence },
        });
    }

    pub fn track_session_failure(&self, session_id: Option<Uuid>, stage: PipelineStage, error: &str) {
        tracing::warn!(session_id = ?session_id, stage = %stage, error, "voice session stage failed");
        self.record(MetricRecord {
            session_id,
            recorded_at: Utc::now(),
            sample: MetricSample::Failure { stage, error: error.to_owned() },
        });
    }

    /// Append a record and raise any threshold alerts.
    ///
    /// Records and resolved alerts older than the retention window are dropped.
    pub fn record(&self, record: MetricRecord) {
        let alerts = self.alerts_for(&record);
        let mut state = self.lock();
        let cutoff = record.recorded_at - self.config.retention;
        state.records.retain(|r| r.recorded_at >= cutoff);
        state.alerts.retain(|a| !a.resolved || a.created_at >= cutoff);
        state.records.push(record);
        for alert in alerts {
            tracing::warn!(
                kind = ?alert.kind,
                severity = ?alert.severity,
                value = alert.value,
                threshold = alert.threshold,
                "performance alert raised"
            );
            state.alerts.push(alert);
        }
    }

    #[allow(clippy::cast_precision_loss, reason = "latencies are far below 2^52 ms")]
    fn alerts_for(&self, record: &MetricRecord) -> Vec<PerformanceAlert> {
        let mut alerts = Vec::new();
        let (latency, confidence, latency_kind, latency_threshold) = match &record.sample {
            MetricSample::Transcription { latency_ms, confidence } => (
                *latency_ms,
                *confidence,
                AlertKind::TranscriptionLatency,
                self.config.transcription_alert_ms,
            ),
            MetricSample::PlanGeneration { latency_ms, confidence } => (
                *latency_ms,
                *confidence,
                AlertKind::PlanGenerationLatency,
                self.config.plan_alert_ms,
            ),
            MetricSample::Session { .. } | MetricSample::Failure { .. } => return alerts,
        };

        if latency > latency_threshold {
            let severity = if latency > latency_threshold.saturating_mul(2) {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            alerts.push(new_alert(
                record,
                latency_kind,
                severity,
                format!("{latency_kind:?} {latency} ms exceeds {latency_threshold} ms"),
                latency as f64,
                latency_threshold as f64,
            ));
        }
        if confidence < self.config.min_confidence {
            let severity = if confidence < self.config.min_confidence / 2.0 {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };
            alerts.push(new_alert(
                record,
                AlertKind::LowConfidence,
                severity,
                format!(
                    "confidence {confidence:.2} is below the floor of {:.2}",
                    self.config.min_confidence
                ),
                confidence,
                self.config.min_confidence,
            ));
        }
        alerts
    }

    /// Mark an alert resolved. Resolving twice is a no-op.
    pub fn resolve_alert(&self, id: Uuid) -> Result<PerformanceAlert, ServiceError> {
        let mut state = self.lock();
        let alert = state
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| ServiceError::NotFound { entity: "alert", id: id.to_string() })?;
        if !alert.resolved {
            alert.resolved = true;
            alert.resolved_at = Some(Utc::now());
        }
        Ok(alert.clone())
    }

    #[must_use]
    pub fn active_alerts(&self) -> Vec<PerformanceAlert> {
        self.lock().alerts.iter().filter(|a| !a.resolved).cloned().collect()
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }

    /// Active and retained resolved alerts.
    #[must_use]
    pub fn alert_count(&self) -> usize {
        self.lock().alerts.len()
    }

    #[must_use]
    pub fn dashboard(&self, window_hours: i64) -> KpiDashboard {
        self.dashboard_at(window_hours, Utc::now())
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "counts and latencies are small")]
    pub fn dashboard_at(&self, window_hours: i64, now: DateTime<Utc>) -> KpiDashboard {
        let window_hours = window_hours.max(1);
        let since = now - Duration::hours(window_hours);
        let state = self.lock();
        let in_window = state.records.iter().filter(|r| r.recorded_at >= since && r.recorded_at <= now);

        let mut sessions = std::collections::HashSet::new();
        let mut failed = std::collections::HashSet::new();
        let mut session_ms = Vec::new();
        let mut transcription_ms = Vec::new();
        let mut plan_ms = Vec::new();
        let mut transcript_conf = Vec::new();
        let mut plan_conf = Vec::new();
        let mut failures_by_stage = BTreeMap::new();
        let mut anonymous_failures = 0_usize;

        for record in in_window {
            match &record.sample {
                MetricSample::Session { total_ms, succeeded, .. } => {
                    session_ms.push(*total_ms as f64);
                    if let Some(id) = record.session_id {
                        sessions.insert(id);
                        if !succeeded {
                            failed.insert(id);
                        }
                    }
                },
                MetricSample::Transcription { latency_ms, confidence } => {
                    transcription_ms.push(*latency_ms as f64);
                    transcript_conf.push(*confidence);
                },
                MetricSample::PlanGeneration { latency_ms, confidence } => {
                    plan_ms.push(*latency_ms as f64);
                    plan_conf.push(*confidence);
                },
                MetricSample::Failure { stage, .. } => {
                    *failures_by_stage.entry(*stage).or_insert(0) += 1;
                    match record.session_id {
                        Some(id) => {
                            sessions.insert(id);
                            failed.insert(id);
                        },
                        None => anonymous_failures += 1,
                    }
                },
            }
        }

        let total_sessions = sessions.len();
        let failed_sessions = failed.len();
        if anonymous_failures > 0 {
            tracing::trace!(anonymous_failures, "failures without a session are excluded from the error rate");
        }
        KpiDashboard {
            window_hours,
            generated_at: now,
            total_sessions,
            failed_sessions,
            error_rate: percentage(failed_sessions, total_sessions),
            session: latency_stats(session_ms),
            transcription: latency_stats(transcription_ms),
            plan_generation: latency_stats(plan_ms),
            avg_transcript_confidence: mean(&transcript_conf),
            avg_plan_confidence: mean(&plan_conf),
            failures_by_stage,
            active_alerts: state.alerts.iter().filter(|a| !a.resolved).count(),
        }
    }

    #[must_use]
    pub fn kpi_status(&self) -> KpiStatus {
        self.kpi_status_at(Utc::now())
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "thresholds are small")]
    pub fn kpi_status_at(&self, now: DateTime<Utc>) -> KpiStatus {
        let dashboard = self.dashboard_at(KPI_STATUS_WINDOW_HOURS, now);
        let cfg = &self.config;

        let latency_check = |name: &'static str, stats: &LatencyStats, threshold: u64| {
            let threshold = threshold as f64;
            let value = (stats.count > 0).then_some(stats.p95_ms);
            let level = match value {
                Some(v) if v > threshold * 2.0 => HealthLevel::Critical,
                Some(v) if v > threshold => HealthLevel::Degraded,
                _ => HealthLevel::Healthy,
            };
            KpiCheck { name, value, threshold, level }
        };

        let has_confidence = dashboard.transcription.count + dashboard.plan_generation.count > 0;
        let confidence = has_confidence.then(|| {
            let mut samples = Vec::new();
            if dashboard.transcription.count > 0 {
                samples.push(dashboard.avg_transcript_confidence);
            }
            if dashboard.plan_generation.count > 0 {
                samples.push(dashboard.avg_plan_confidence);
            }
            mean(&samples)
        });
        let confidence_level = match confidence {
            Some(c) if c < cfg.min_confidence - 0.2 => HealthLevel::Critical,
            Some(c) if c < cfg.min_confidence => HealthLevel::Degraded,
            _ => HealthLevel::Healthy,
        };

        let error_value = (dashboard.total_sessions > 0).then_some(dashboard.error_rate);
        let error_level = match error_value {
            Some(r) if r > cfg.max_error_rate * 2.0 => HealthLevel::Critical,
            Some(r) if r > cfg.max_error_rate => HealthLevel::Degraded,
            _ => HealthLevel::Healthy,
        };

        let checks = vec![
            latency_check("transcription_p95_ms", &dashboard.transcription, cfg.transcription_alert_ms),
            latency_check("plan_generation_p95_ms", &dashboard.plan_generation, cfg.plan_alert_ms),
            KpiCheck {
                name: "average_confidence",
                value: confidence,
                threshold: cfg.min_confidence,
                level: confidence_level,
            },
            KpiCheck {
                name: "error_rate",
                value: error_value,
                threshold: cfg.max_error_rate,
                level: error_level,
            },
        ];
        let overall = checks.iter().map(|c| c.level).max().unwrap_or(HealthLevel::Healthy);
        KpiStatus { overall, checks, dashboard }
    }
}

fn new_alert(
    record: &MetricRecord,
    kind: AlertKind,
    severity: AlertSeverity,
    message: String,
    value: f64,
    threshold: f64,
) -> PerformanceAlert {
    PerformanceAlert {
        id: Uuid::new_v4(),
        kind,
        severity,
        message,
        value,
        threshold,
        session_id: record.session_id,
        created_at: record.recorded_at,
        resolved: false,
        resolved_at: None,
    }
}

/// 95th percentile by sort-and-index: `sorted[ceil(0.95 * n) - 1]`.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "n is a small sample count"
)]
pub fn p95(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let rank = (0.95 * values.len() as f64).ceil() as usize;
    values.get(rank.saturating_sub(1)).copied().unwrap_or(0.0)
}

#[allow(clippy::cast_precision_loss, reason = "n is a small sample count")]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[allow(clippy::cast_precision_loss, reason = "session counts are small")]
fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

fn latency_stats(values: Vec<f64>) -> LatencyStats {
    LatencyStats { count: values.len(), avg_ms: mean(&values), p95_ms: p95(values) }
}
