//! Append-only JSONL audit trail for gate decisions.
//!
//! Writes one JSON object per line, recording evaluations, prompts shown
//! to the human, their responses, executions, and rule lifecycle events.
//! Records are never modified in place; the only mutation besides append
//! is the explicit `clear`, which truncates the file and logs itself as
//! the first record of the new log.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use cg_gate::gate::GateResult;
use cg_gate::rules::Rule;
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Command and output payloads are truncated past this many characters so
/// a single event cannot blow up the log.
pub const MAX_PAYLOAD_CHARS: usize = 4096;

/// Append-only JSONL audit writer. Each event is flushed as it is written
/// so a crash mid-session loses at most the event in flight.
pub struct AuditLog {
    writer: Option<BufWriter<File>>,
    session_id: String,
}

impl AuditLog {
    /// Open the log for appending, creating parent directories if needed.
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Some(BufWriter::new(file)),
            session_id: generate_session_id(),
        })
    }

    /// A logger that discards all events (audit disabled in config).
    pub fn noop() -> Self {
        Self {
            writer: None,
            session_id: generate_session_id(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Log the outcome of evaluating a command, whatever the decision.
    pub fn log_evaluation(&mut self, command: &str, result: &GateResult) {
        self.write_event(serde_json::json!({
            "ts": epoch_secs(),
            "session": self.session_id,
            "type": "evaluation",
            "command": truncate_payload(command),
            "decision": result.decision.as_str(),
            "tier": result.tier,
            "reason": result.reason,
            "matched_rule": result.matched_rule,
            "violations": result.violations.iter().map(|v| v.message.as_str()).collect::<Vec<_>>(),
        }));
    }

    /// Log that a prompt was presented to the human.
    pub fn log_prompt(&mut self, command: &str, reason: &str) {
        self.write_event(serde_json::json!({
            "ts": epoch_secs(),
            "session": self.session_id,
            "type": "prompt",
            "command": truncate_payload(command),
            "reason": reason,
        }));
    }

    /// Log the human's response to a prompt.
    pub fn log_human_decision(&mut self, command: &str, choice: &str, proceed: bool) {
        self.write_event(serde_json::json!({
            "ts": epoch_secs(),
            "session": self.session_id,
            "type": "human_decision",
            "command": truncate_payload(command),
            "choice": choice,
            "proceed": proceed,
        }));
    }

    /// Log a command execution result. Output is truncated, not the
    /// command's exit status.
    pub fn log_executed(
        &mut self,
        command: &str,
        exit_code: Option<i32>,
        output: &str,
        duration_ms: u64,
    ) {
        self.write_event(serde_json::json!({
            "ts": epoch_secs(),
            "session": self.session_id,
            "type": "executed",
            "command": truncate_payload(command),
            "exit_code": exit_code,
            "output": truncate_payload(output),
            "duration_ms": duration_ms,
        }));
    }

    pub fn log_rule_created(&mut self, rule: &Rule) {
        self.write_event(serde_json::json!({
            "ts": epoch_secs(),
            "session": self.session_id,
            "type": "rule_created",
            "rule_id": rule.id,
            "pattern": rule.pattern,
            "action": rule.action,
            "scope": rule.scope,
        }));
    }

    pub fn log_rule_deleted(&mut self, rule_id: u64) {
        self.write_event(serde_json::json!({
            "ts": epoch_secs(),
            "session": self.session_id,
            "type": "rule_deleted",
            "rule_id": rule_id,
        }));
    }

    /// Truncate the log and record the clear itself as the first event of
    /// the fresh log.
    pub fn clear(path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let event = serde_json::json!({
            "ts": epoch_secs(),
            "session": generate_session_id(),
            "type": "cleared",
        });
        writeln!(writer, "{event}")?;
        writer.flush()?;
        Ok(())
    }

    fn write_event(&mut self, value: serde_json::Value) {
        if let Some(ref mut writer) = self.writer {
            if let Ok(line) = serde_json::to_string(&value) {
                if writeln!(writer, "{line}").and_then(|_| writer.flush()).is_err() {
                    eprintln!("warning: failed to append audit record");
                }
            }
        }
    }
}

/// One replayed audit record. Unknown fields land in `extra` so old logs
/// written by newer versions still replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: u64,
    pub session: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl AuditEvent {
    /// Best-effort one-line summary for table rendering.
    fn summary(&self) -> String {
        for key in ["command", "reason", "choice", "pattern", "rule_id"] {
            if let Some(value) = self.extra.get(key) {
                return match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
            }
        }
        String::new()
    }
}

/// Reads an audit log back as structured events.
pub struct AuditReader {
    path: PathBuf,
}

impl AuditReader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Replay every record in write order. A missing file is an empty log.
    pub fn replay(&self) -> Result<Vec<AuditEvent>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let mut events = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let event: AuditEvent = serde_json::from_str(line)
                .map_err(|source| StoreError::Malformed { line: i + 1, source })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Replay only the records of a single session.
    pub fn by_session(&self, session: &str) -> Result<Vec<AuditEvent>, StoreError> {
        let mut events = self.replay()?;
        events.retain(|e| e.session == session);
        Ok(events)
    }
}

/// Render events as JSONL, one record per line.
pub fn export_jsonl(events: &[AuditEvent]) -> String {
    let mut out = String::new();
    for event in events {
        if let Ok(line) = serde_json::to_string(event) {
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// Render events as an aligned text table.
pub fn export_table(events: &[AuditEvent]) -> String {
    let rows: Vec<[String; 4]> = events
        .iter()
        .map(|e| {
            [
                e.ts.to_string(),
                e.session.clone(),
                e.kind.clone(),
                e.summary(),
            ]
        })
        .collect();

    let headers = ["TS", "SESSION", "TYPE", "DETAIL"];
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut out = String::new();
    for (i, header) in headers.iter().enumerate() {
        out.push_str(&format!("{:<width$}  ", header, width = widths[i]));
    }
    out.push('\n');
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            out.push_str(&format!("{:<width$}  ", cell, width = widths[i]));
        }
        out.push('\n');
    }
    out
}

fn truncate_payload(s: &str) -> String {
    if s.chars().count() <= MAX_PAYLOAD_CHARS {
        return s.to_string();
    }
    let kept: String = s.chars().take(MAX_PAYLOAD_CHARS).collect();
    let dropped = s.chars().count() - MAX_PAYLOAD_CHARS;
    format!("{kept}... (+{dropped} more characters)")
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn generate_session_id() -> String {
    let pid = std::process::id();
    let ts = epoch_secs();
    format!("s{:x}", pid ^ (ts as u32))
}
