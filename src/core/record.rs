//! Source records and the two value transcriptions applied to them.
//!
//! A source file is comma-delimited text whose first line is a header and is
//! discarded. Records may have any number of fields; whether a length mismatch
//! against the table matters is decided by [`ArityPolicy`].
//!
//! Empty fields are the only values given special meaning: they become `NULL`
//! both in the emitted script ([`sql_literal`]) and when bound as statement
//! parameters ([`bind_value`]).
use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::StringRecord;

use crate::core::error::{Error, ErrorKind};
use crate::core::schema::TableDef;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ArityPolicy {
    /// Transcribe whatever fields the record has.
    #[default]
    Allow,
    /// Fail the run on the first mismatched record.
    Reject,
    /// Drop mismatched records and report them.
    Skip,
}

#[derive(Clone, Debug)]
pub struct Record {
    /// 1-based line in the source file where the record starts.
    pub line: u64,
    pub fields: StringRecord,
}

impl Record {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter()
    }
}

/// Streaming reader over a source file's records, header excluded.
pub struct SourceRecords {
    path: PathBuf,
    reader: csv::Reader<BufReader<File>>,
    record: StringRecord,
}

pub fn read_records(path: &Path) -> Result<SourceRecords, Error> {
    let file = File::open(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to open source file")
            .with_path(path)
            .with_source(err)
    })?;
    let reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));
    Ok(SourceRecords {
        path: path.to_path_buf(),
        reader,
        record: StringRecord::new(),
    })
}

impl SourceRecords {
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_next(&mut self) -> Result<Option<Record>, Error> {
        match self.reader.read_record(&mut self.record) {
            Ok(true) => {
                let line = self
                    .record
                    .position()
                    .map(|pos| pos.line())
                    .unwrap_or_default();
                Ok(Some(Record {
                    line,
                    fields: self.record.clone(),
                }))
            }
            Ok(false) => Ok(None),
            Err(err) => Err(csv_error(err, &self.path)),
        }
    }
}

impl Iterator for SourceRecords {
    type Item = Result<Record, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

fn csv_error(err: csv::Error, path: &Path) -> Error {
    let line = err.position().map(|pos| pos.line());
    let kind = if err.is_io_error() {
        ErrorKind::Io
    } else {
        ErrorKind::Malformed
    };
    let mut out = Error::new(kind)
        .with_message(format!("failed to read source record: {err}"))
        .with_path(path);
    if let Some(line) = line {
        out = out.with_line(line);
    }
    out.with_source(err)
}

/// Renders one field as an SQL literal: empty or absent becomes `NULL`,
/// anything else is single-quoted with embedded quotes doubled.
pub fn sql_literal(value: Option<&str>) -> Cow<'static, str> {
    match value {
        None | Some("") => Cow::Borrowed("NULL"),
        Some(value) => Cow::Owned(format!("'{}'", value.replace('\'', "''"))),
    }
}

/// Parameter value for one field; empty fields bind as NULL.
pub fn bind_value(value: &str) -> Option<&str> {
    if value.is_empty() { None } else { Some(value) }
}

/// Outcome of checking a record's field count against its table.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Arity {
    Keep,
    Skip { expected: usize, found: usize },
}

pub fn check_arity(
    table: &TableDef,
    record: &Record,
    path: &Path,
    policy: ArityPolicy,
) -> Result<Arity, Error> {
    let expected = table.column_count();
    let found = record.len();
    if expected == found {
        return Ok(Arity::Keep);
    }
    match policy {
        ArityPolicy::Allow => Ok(Arity::Keep),
        ArityPolicy::Reject => Err(Error::new(ErrorKind::Malformed)
            .with_message(format!("record has {found} fields, expected {expected}"))
            .with_table(&table.name)
            .with_path(path)
            .with_line(record.line)
            .with_hint("Fix the source file or use --arity skip to drop such records.")),
        ArityPolicy::Skip => Ok(Arity::Skip { expected, found }),
    }
}
