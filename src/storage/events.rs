//! Append-only graph event log
//!
//! One JSON object per line: `{timestamp, type, payload}`. Every successful
//! node or edge mutation appends exactly one record. The log is replayable;
//! recovery itself is out of scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A single event-log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
}

enum Sink {
    File(Mutex<File>),
    /// Test/in-memory mode: keeps records for inspection instead of a file
    Memory(Mutex<Vec<EventRecord>>),
}

/// The event log. Writes preserve per-writer order and are timestamped.
pub struct EventLog {
    sink: Sink,
    path: Option<PathBuf>,
}

impl EventLog {
    /// Open (or create) a file-backed log at `path`.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            sink: Sink::File(Mutex::new(file)),
            path: Some(path),
        })
    }

    /// An in-memory log, used by the in-memory storage backend and tests.
    pub fn in_memory() -> Self {
        Self {
            sink: Sink::Memory(Mutex::new(Vec::new())),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append one record. File mode writes a line and flushes so the log
    /// survives a crash of everything above the filesystem.
    pub fn append(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> std::io::Result<()> {
        let record = EventRecord {
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            payload,
        };
        match &self.sink {
            Sink::File(file) => {
                let line = serde_json::to_string(&record)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
                let mut file = file.lock().expect("event log lock");
                writeln!(file, "{}", line)?;
                file.flush()
            }
            Sink::Memory(records) => {
                records.lock().expect("event log lock").push(record);
                Ok(())
            }
        }
    }

    /// All records held by an in-memory log. File-backed logs return an
    /// empty list; use [`replay`] for those.
    pub fn records(&self) -> Vec<EventRecord> {
        match &self.sink {
            Sink::Memory(records) => records.lock().expect("event log lock").clone(),
            Sink::File(_) => Vec::new(),
        }
    }

    /// Replay a file-backed log from disk. Malformed lines are skipped with
    /// a warning rather than aborting the replay.
    pub fn replay(path: impl AsRef<Path>) -> std::io::Result<Vec<EventRecord>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(lineno, error = %e, "skipping malformed event record");
                }
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn in_memory_log_keeps_order() {
        let log = EventLog::in_memory();
        log.append("add_node", json!({"id": "a"})).unwrap();
        log.append("add_edge", json!({"from": "a", "to": "b"})).unwrap();

        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, "add_node");
        assert_eq!(records[1].event_type, "add_edge");
    }

    #[test]
    fn file_log_replays_in_write_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph_events.jsonl");

        let log = EventLog::open(&path).unwrap();
        for i in 0..5 {
            log.append("add_node", json!({ "seq": i })).unwrap();
        }

        let records = EventLog::replay(&path).unwrap();
        assert_eq!(records.len(), 5);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.payload["seq"], json!(i));
        }
    }

    #[test]
    fn replay_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let log = EventLog::open(&path).unwrap();
        log.append("add_node", json!({"id": "a"})).unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();
        log.append("add_node", json!({"id": "b"})).unwrap();

        let records = EventLog::replay(&path).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn reopening_appends_rather_than_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        {
            let log = EventLog::open(&path).unwrap();
            log.append("add_node", json!({"id": "a"})).unwrap();
        }
        {
            let log = EventLog::open(&path).unwrap();
            log.append("add_node", json!({"id": "b"})).unwrap();
        }

        assert_eq!(EventLog::replay(&path).unwrap().len(), 2);
    }
}
