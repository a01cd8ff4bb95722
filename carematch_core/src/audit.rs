//! Audit events for recommendation and enrollment decisions.
//!
//! Callers hand events to an [`AuditSink`]; where they end up is the sink's
//! business. Recording is best-effort from the caller's side.

use crate::wal::{append_line, read_lines};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Which decision an event describes
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    Recommendation,
    Enrollment,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Recommendation => "recommendation",
            AuditKind::Enrollment => "enrollment",
        }
    }
}

/// Decision payload
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Program ids returned by a recommendation, in ranked order
    Programs(Vec<String>),
    /// Program id a patient was enrolled in
    Program(String),
}

impl AuditOutcome {
    pub fn program_ids(&self) -> Vec<&str> {
        match self {
            AuditOutcome::Programs(ids) => ids.iter().map(String::as_str).collect(),
            AuditOutcome::Program(id) => vec![id.as_str()],
        }
    }
}

/// An immutable audit log entry
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub patient_id: String,
    pub kind: AuditKind,
    pub outcome: AuditOutcome,
}

impl AuditEvent {
    pub fn recommendation(
        patient_id: impl Into<String>,
        program_ids: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            patient_id: patient_id.into(),
            kind: AuditKind::Recommendation,
            outcome: AuditOutcome::Programs(program_ids),
        }
    }

    pub fn enrollment(
        patient_id: impl Into<String>,
        program_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            patient_id: patient_id.into(),
            kind: AuditKind::Enrollment,
            outcome: AuditOutcome::Program(program_id.into()),
        }
    }
}

/// Destination for audit events
pub trait AuditSink {
    fn record(&mut self, event: &AuditEvent) -> Result<()>;
}

impl<T: AuditSink + ?Sized> AuditSink for Box<T> {
    fn record(&mut self, event: &AuditEvent) -> Result<()> {
        (**self).record(event)
    }
}

/// Keeps events in memory for later inspection
#[derive(Clone, Debug, Default)]
pub struct MemoryAuditSink {
    events: Vec<AuditEvent>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&mut self, event: &AuditEvent) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }
}

/// Appends events to a JSONL audit log with file locking
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&mut self, event: &AuditEvent) -> Result<()> {
        append_line(&self.path, event)?;
        tracing::debug!("Appended {} audit event {}", event.kind.as_str(), event.id);
        Ok(())
    }
}

/// Read all audit events from a log, skipping malformed lines
pub fn read_events(path: &Path) -> Result<Vec<AuditEvent>> {
    let events = read_lines::<AuditEvent>(path)?;
    tracing::debug!("Read {} audit events from {:?}", events.len(), path);
    Ok(events)
}
