//! Session audit trail.
//!
//! Events are fire-and-forget from the pipeline's point of view: a sink error
//! is logged and recorded as a warning, never propagated.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::pipeline::traits::AuditSink;
use crate::pipeline::types::{ContextPacket, PipelineStage, Termination};

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub session_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: AuditEventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEventKind {
    SessionOpened {
        observed: usize,
        excluded: usize,
        has_free_text: bool,
    },
    StageCompleted {
        stage: PipelineStage,
        duration_ms: u64,
    },
    ContextAssembled {
        packet: Box<ContextPacket>,
    },
    AnalysisFinished {
        termination: Termination,
        stages_completed: usize,
        warnings: usize,
    },
}

impl AuditEvent {
    pub fn new(session_id: Uuid, kind: AuditEventKind) -> Self {
        Self {
            session_id,
            timestamp: Utc::now(),
            kind,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            AuditEventKind::SessionOpened { .. } => "session_opened",
            AuditEventKind::StageCompleted { .. } => "stage_completed",
            AuditEventKind::ContextAssembled { .. } => "context_assembled",
            AuditEventKind::AnalysisFinished { .. } => "analysis_finished",
        }
    }
}

/// Logs event names and ids through `tracing`. Never logs payloads.
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            session_id = %event.session_id,
            event = event.name(),
            "Audit event"
        );
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
pub struct JsonlAuditSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}
