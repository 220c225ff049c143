//! Purpose: Define a stable, structured schema for non-fatal operator notices.
//! Exports: `Notice`, `NoticeKind`, `notice_json`, `notice_time_now`.
//! Role: Shared contract between the build pipelines and the CLI renderer.
//! Invariants: Notices are non-fatal; a run that emits them can still succeed.
//! Invariants: JSON schema is stable once published; fields are additive-only.
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value, json};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NoticeKind {
    MissingSource,
    ArityMismatch,
}

impl NoticeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NoticeKind::MissingSource => "missing_source",
            NoticeKind::ArityMismatch => "arity_mismatch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub time: String,
    pub cmd: String,
    pub table: String,
    pub message: String,
    pub details: Map<String, Value>,
}

impl Notice {
    pub fn new(
        kind: NoticeKind,
        cmd: &str,
        table: &str,
        message: impl Into<String>,
        details: Map<String, Value>,
    ) -> Self {
        Self {
            kind,
            time: notice_time_now().unwrap_or_default(),
            cmd: cmd.to_string(),
            table: table.to_string(),
            message: message.into(),
            details,
        }
    }
}

pub fn notice_time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

pub fn notice_json(notice: &Notice) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(notice.kind.as_str()));
    inner.insert("time".to_string(), json!(notice.time));
    inner.insert("cmd".to_string(), json!(notice.cmd));
    inner.insert("table".to_string(), json!(notice.table));
    inner.insert("message".to_string(), json!(notice.message));
    inner.insert("details".to_string(), Value::Object(notice.details.clone()));

    let mut outer = Map::new();
    outer.insert("notice".to_string(), Value::Object(inner));
    Value::Object(outer)
}

#[cfg(test)]
mod tests {
    use super::{Notice, NoticeKind, notice_json};
    use serde_json::{Map, Value};

    #[test]
    fn notice_json_has_required_fields() {
        let mut details = Map::new();
        details.insert("path".to_string(), Value::from("dataset/tags.csv"));

        let notice = Notice {
            kind: NoticeKind::MissingSource,
            time: "2026-02-01T00:00:00Z".to_string(),
            cmd: "populate".to_string(),
            table: "tags".to_string(),
            message: "source file dataset/tags.csv not found".to_string(),
            details,
        };

        let value = notice_json(&notice);
        let obj = value
            .get("notice")
            .and_then(|v| v.as_object())
            .expect("notice object");

        assert_eq!(
            obj.get("kind").and_then(|v| v.as_str()),
            Some("missing_source")
        );
        assert_eq!(
            obj.get("time").and_then(|v| v.as_str()),
            Some("2026-02-01T00:00:00Z")
        );
        assert_eq!(obj.get("cmd").and_then(|v| v.as_str()), Some("populate"));
        assert_eq!(obj.get("table").and_then(|v| v.as_str()), Some("tags"));
        assert_eq!(
            obj.get("message").and_then(|v| v.as_str()),
            Some("source file dataset/tags.csv not found")
        );
        assert_eq!(
            obj.get("details").and_then(|v| v.get("path")).and_then(|v| v.as_str()),
            Some("dataset/tags.csv")
        );
    }

    #[test]
    fn new_notice_is_timestamped() {
        let notice = Notice::new(
            NoticeKind::ArityMismatch,
            "script",
            "movies",
            "skipped record",
            Map::new(),
        );
        assert!(notice.time.ends_with('Z'));
        assert_eq!(notice.kind.as_str(), "arity_mismatch");
    }
}
