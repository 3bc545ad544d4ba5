//! Newline-delimited JSON event stream.
//!
//! This is the channel a supervising process reads. Debug, info, progress
//! and status records go to stdout; warnings and errors go to stderr.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Debug,
    Info,
    Warning,
    Error,
    Progress,
    Status,
}

impl EventKind {
    /// Warnings and errors belong on the diagnostic channel.
    pub fn is_diagnostic(self) -> bool {
        matches!(self, EventKind::Warning | EventKind::Error)
    }
}

/// One record of the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Event {
    fn named(kind: EventKind, name: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("event".to_string(), Value::String(name.to_string()));
        Self { kind, fields }
    }

    pub fn debug(name: &str) -> Self {
        Self::named(EventKind::Debug, name)
    }

    pub fn info(name: &str) -> Self {
        Self::named(EventKind::Info, name)
    }

    pub fn warning(name: &str) -> Self {
        Self::named(EventKind::Warning, name)
    }

    pub fn error(name: &str) -> Self {
        Self::named(EventKind::Error, name)
    }

    pub fn progress(name: &str) -> Self {
        Self::named(EventKind::Progress, name)
    }

    /// Run-status record: `{"kind":"status","status":<status>}`.
    pub fn status(status: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("status".to_string(), Value::String(status.to_string()));
        Self {
            kind: EventKind::Status,
            fields,
        }
    }

    /// Attach a field. Values that fail to serialize are stored as null.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.fields.insert(key.to_string(), value);
        self
    }

    /// The `event` name, if any.
    pub fn name(&self) -> Option<&str> {
        self.fields.get("event").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"kind\":{}}}",
                serde_json::to_string(&self.kind).unwrap_or_default()
            )
        })
    }
}

/// Destination for event records.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Writes records to stdout/stderr, one JSON object per line.
#[derive(Debug, Default)]
pub struct StdioSink;

impl EventSink for StdioSink {
    fn emit(&self, event: Event) {
        let line = event.to_json_line();
        // A closed pipe must not take the run down with it.
        if event.kind.is_diagnostic() {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        } else {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", line);
            let _ = out.flush();
        }
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect()
    }

    /// Records with the given `event` name.
    pub fn named(&self, name: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.name() == Some(name))
            .collect()
    }

    /// Final status string, if one was emitted.
    pub fn last_status(&self) -> Option<String> {
        self.of_kind(EventKind::Status)
            .last()
            .and_then(|e| e.get("status"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_shape() {
        let e = Event::progress("level_done").with("z", 3).with("percent", 12.5);
        let v: Value = serde_json::from_str(&e.to_json_line()).unwrap();
        assert_eq!(v["kind"], "progress");
        assert_eq!(v["event"], "level_done");
        assert_eq!(v["z"], 3);
        assert_eq!(v["percent"], 12.5);
    }

    #[test]
    fn test_status_record() {
        let v: Value = serde_json::from_str(&Event::status("completed").to_json_line()).unwrap();
        assert_eq!(v["kind"], "status");
        assert_eq!(v["status"], "completed");
        assert!(v.get("event").is_none());
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemorySink::new();
        sink.emit(Event::warning("tile_skipped"));
        sink.emit(Event::status("error"));
        assert_eq!(sink.of_kind(EventKind::Warning).len(), 1);
        assert_eq!(sink.named("tile_skipped").len(), 1);
        assert_eq!(sink.last_status().as_deref(), Some("error"));
        assert!(EventKind::Error.is_diagnostic());
        assert!(!EventKind::Progress.is_diagnostic());
    }
}
