// Per-table run summaries and the notices both pipelines raise.
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::notice::{Notice, NoticeKind};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Loaded,
    MissingSource,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table: String,
    pub source: PathBuf,
    pub status: TableStatus,
    pub rows: u64,
    pub skipped: u64,
    /// Row count of every flushed batch, in flush order. Empty for scripts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub batches: Vec<usize>,
}

impl TableReport {
    pub fn missing(table: &str, source: &Path) -> Self {
        Self {
            table: table.to_string(),
            source: source.to_path_buf(),
            status: TableStatus::MissingSource,
            rows: 0,
            skipped: 0,
            batches: Vec::new(),
        }
    }

    pub fn loaded(table: &str, source: &Path) -> Self {
        Self {
            status: TableStatus::Loaded,
            ..Self::missing(table, source)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub output: PathBuf,
    pub tables: Vec<TableReport>,
}

impl RunReport {
    pub fn new(output: &Path) -> Self {
        Self {
            output: output.to_path_buf(),
            tables: Vec::new(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|report| report.table == name)
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|report| report.rows).sum()
    }
}

pub(crate) fn missing_source_notice(cmd: &str, table: &str, path: &Path) -> Notice {
    let mut details = Map::new();
    details.insert(
        "path".to_string(),
        Value::from(path.display().to_string()),
    );
    Notice::new(
        NoticeKind::MissingSource,
        cmd,
        table,
        format!("source file {} not found (table: {table})", path.display()),
        details,
    )
}

pub(crate) fn arity_notice(
    cmd: &str,
    table: &str,
    path: &Path,
    line: u64,
    expected: usize,
    found: usize,
) -> Notice {
    let mut details = Map::new();
    details.insert(
        "path".to_string(),
        Value::from(path.display().to_string()),
    );
    details.insert("line".to_string(), Value::from(line));
    details.insert("expected".to_string(), Value::from(expected));
    details.insert("found".to_string(), Value::from(found));
    Notice::new(
        NoticeKind::ArityMismatch,
        cmd,
        table,
        format!(
            "skipped record at {}:{line} with {found} fields, expected {expected}",
            path.display()
        ),
        details,
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{RunReport, TableReport, TableStatus, missing_source_notice};
    use crate::notice::NoticeKind;

    #[test]
    fn report_serializes_status_in_snake_case() {
        let mut report = RunReport::new(Path::new("movies_rating.db"));
        report
            .tables
            .push(TableReport::missing("tags", Path::new("dataset/tags.csv")));
        let mut movies = TableReport::loaded("movies", Path::new("dataset/movies.csv"));
        movies.rows = 2;
        movies.batches = vec![2];
        report.tables.push(movies);

        let value = serde_json::to_value(&report).expect("json");
        assert_eq!(value["tables"][0]["status"], "missing_source");
        assert!(value["tables"][0].get("batches").is_none());
        assert_eq!(value["tables"][1]["status"], "loaded");
        assert_eq!(value["tables"][1]["batches"][0], 2);
        assert_eq!(report.total_rows(), 2);
        assert_eq!(
            report.table("movies").map(|t| t.status),
            Some(TableStatus::Loaded)
        );
    }

    #[test]
    fn missing_source_notice_names_file() {
        let notice = missing_source_notice("script", "tags", Path::new("dataset/tags.csv"));
        assert_eq!(notice.kind, NoticeKind::MissingSource);
        assert!(notice.message.contains("tags.csv"));
        assert_eq!(notice.details["path"], "dataset/tags.csv");
    }
}
