use crate::config::types::FormatKind;
use crate::delivery::event::local_hostname;
use crate::logger::Severity;
use serde_json::{Map, Value};

/// Something handed to the logger.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Fields(Map<String, Value>),
    Value(Value),
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<Map<String, Value>> for Message {
    fn from(fields: Map<String, Value>) -> Self {
        Message::Fields(fields)
    }
}

impl From<Value> for Message {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Message::Fields(fields),
            Value::String(text) => Message::Text(text),
            other => Message::Value(other),
        }
    }
}

/// Renders messages into the payload strings shipped to the stream.
#[derive(Debug, Clone)]
pub struct Formatter {
    kind: FormatKind,
    host: String,
    pid: u32,
}

impl Formatter {
    /// The stream base name is stripped from the hostname, since default
    /// stream names already start with it.
    pub fn new(kind: FormatKind, log_stream_name: &str) -> Self {
        Self::with_host(kind, strip_stream_prefix(&local_hostname(), log_stream_name))
    }

    pub fn with_host(kind: FormatKind, host: impl Into<String>) -> Self {
        Self {
            kind,
            host: host.into(),
            pid: std::process::id(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn format(&self, severity: Severity, progname: Option<&str>, message: &Message) -> String {
        match (self.kind, message) {
            (FormatKind::Json, Message::Fields(fields)) => {
                let mut merged = fields.clone();
                merged.insert("severity".to_string(), Value::from(severity.to_string()));
                merged.insert(
                    "progname".to_string(),
                    progname.map(Value::from).unwrap_or(Value::Null),
                );
                merged.insert("pid".to_string(), Value::from(self.pid));
                merged.insert("server".to_string(), Value::from(self.host.as_str()));
                Value::Object(merged).to_string()
            }
            _ => self.format_text(severity, message),
        }
    }

    fn format_text(&self, severity: Severity, message: &Message) -> String {
        let body = match message {
            Message::Text(text) => text.clone(),
            Message::Fields(fields) => flatten(fields, None),
            Message::Value(value) => value.to_string(),
        };
        format!(
            "server={}, pid={}, severity={}, {}",
            self.host, self.pid, severity, body
        )
    }
}

fn strip_stream_prefix(hostname: &str, log_stream_name: &str) -> String {
    hostname.replace(&format!("{}-", log_stream_name), "")
}

/// `key=value` pairs joined by `", "`; nested maps become `parent.child=value`.
fn flatten(fields: &Map<String, Value>, prefix: Option<&str>) -> String {
    fields
        .iter()
        .map(|(key, value)| {
            let key = match prefix {
                Some(prefix) => format!("{}.{}", prefix, key),
                None => key.clone(),
            };
            match value {
                Value::Object(nested) => flatten(nested, Some(&key)),
                other => format!("{}={}", key, other),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}
