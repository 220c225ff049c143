//! SQL script emission.
//!
//! The script rebuilds the whole database when fed to `sqlite3`: it drops every
//! table, recreates it, and then inserts one row per source record with each
//! value rendered as a literal by [`sql_literal`].
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{debug, info};

use crate::core::dataset::Dataset;
use crate::core::error::{Error, ErrorKind};
use crate::core::record::{Arity, ArityPolicy, check_arity, read_records, sql_literal};
use crate::core::report::{RunReport, TableReport, arity_notice, missing_source_notice};
use crate::core::schema::{Registry, TableDef};
use crate::notice::Notice;

pub const DEFAULT_SCRIPT_PATH: &str = "db_init.sql";

const CMD: &str = "script";

#[derive(Copy, Clone, Debug, Default)]
pub struct ScriptOptions {
    pub arity: ArityPolicy,
}

fn write_error(err: io::Error, path: &Path) -> Error {
    Error::new(ErrorKind::Io)
        .with_message("failed to write script")
        .with_path(path)
        .with_source(err)
}

/// Writes the script for `registry` to `output`, replacing any existing file.
pub fn emit_script<N>(
    registry: &Registry,
    dataset: &Dataset,
    output: &Path,
    options: ScriptOptions,
    on_notice: N,
) -> Result<RunReport, Error>
where
    N: FnMut(Notice),
{
    let file = File::create(output).map_err(|err| write_error(err, output))?;
    let mut out = BufWriter::new(file);
    let report = write_script(registry, dataset, &mut out, options, on_notice, output)?;
    out.flush().map_err(|err| write_error(err, output))?;
    info!(path = %output.display(), rows = report.total_rows(), "script written");
    Ok(report)
}

/// Writes the script to any sink; `output` only labels errors and the report.
pub fn write_script<W, N>(
    registry: &Registry,
    dataset: &Dataset,
    out: &mut W,
    options: ScriptOptions,
    mut on_notice: N,
    output: &Path,
) -> Result<RunReport, Error>
where
    W: Write,
    N: FnMut(Notice),
{
    let mut report = RunReport::new(output);

    write_schema(registry, out).map_err(|err| write_error(err, output))?;

    writeln!(out, "-- Insert data").map_err(|err| write_error(err, output))?;
    for table in registry.tables() {
        let Some(source) = dataset.source(table) else {
            let path = dataset.source_path(table);
            on_notice(missing_source_notice(CMD, &table.name, &path));
            report.tables.push(TableReport::missing(&table.name, &path));
            continue;
        };

        debug!(table = %table.name, source = %source.display(), "emitting inserts");
        let mut table_report = TableReport::loaded(&table.name, &source);
        writeln!(out, "-- Data for table {}", table.name)
            .map_err(|err| write_error(err, output))?;

        for record in read_records(&source)? {
            let record = record?;
            match check_arity(table, &record, &source, options.arity)? {
                Arity::Keep => {}
                Arity::Skip { expected, found } => {
                    on_notice(arity_notice(
                        CMD,
                        &table.name,
                        &source,
                        record.line,
                        expected,
                        found,
                    ));
                    table_report.skipped += 1;
                    continue;
                }
            }
            let values: Vec<Option<&str>> = record.iter().map(Some).collect();
            writeln!(out, "{}", insert_statement(table, &values))
                .map_err(|err| write_error(err, output))?;
            table_report.rows += 1;
        }

        writeln!(out).map_err(|err| write_error(err, output))?;
        report.tables.push(table_report);
    }

    Ok(report)
}

fn write_schema<W: Write>(registry: &Registry, out: &mut W) -> io::Result<()> {
    writeln!(out, "-- Drop existing tables")?;
    for table in registry.tables() {
        writeln!(out, "{};", table.drop_sql())?;
    }
    writeln!(out)?;

    writeln!(out, "-- Create tables")?;
    for table in registry.tables() {
        writeln!(out, "{};", table.create_sql())?;
    }
    writeln!(out)
}

/// One INSERT statement for `values`, as it appears in the script.
pub fn insert_statement(table: &TableDef, values: &[Option<&str>]) -> String {
    let values = values
        .iter()
        .map(|value| sql_literal(*value))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({values});",
        table.name,
        table.column_list()
    )
}
