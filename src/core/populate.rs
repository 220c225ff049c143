//! Direct database population.
//!
//! Every run deletes the target file and rebuilds it inside one transaction:
//! all tables are created, then each source file is streamed into its table in
//! batches of `batch_size` rows. Any failure rolls the transaction back, so a
//! run either commits every table or none of them.
use std::fs;
use std::io;
use std::path::Path;

use rusqlite::{Connection, Transaction, params_from_iter};
use tracing::{debug, info, warn};

use crate::core::dataset::Dataset;
use crate::core::error::{Error, ErrorKind};
use crate::core::record::{Arity, ArityPolicy, bind_value, check_arity, read_records};
use crate::core::report::{RunReport, TableReport, arity_notice, missing_source_notice};
use crate::core::schema::{Registry, TableDef};
use crate::notice::Notice;

pub const DEFAULT_DB_PATH: &str = "movies_rating.db";
pub const DEFAULT_BATCH_SIZE: usize = 1000;

const CMD: &str = "populate";

#[derive(Copy, Clone, Debug)]
pub struct PopulateOptions {
    pub batch_size: usize,
    pub arity: ArityPolicy,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            arity: ArityPolicy::default(),
        }
    }
}

/// Rebuilds the database at `db_path` from `dataset`.
pub fn populate<N>(
    registry: &Registry,
    dataset: &Dataset,
    db_path: &Path,
    options: PopulateOptions,
    mut on_notice: N,
) -> Result<RunReport, Error>
where
    N: FnMut(Notice),
{
    if options.batch_size == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("batch size must be at least 1")
            .with_hint("Use --batch-size 1000 (the default)."));
    }

    remove_existing(db_path)?;
    let mut conn = Connection::open(db_path).map_err(|err| {
        Error::new(ErrorKind::Database)
            .with_message("failed to open database")
            .with_path(db_path)
            .with_source(err)
    })?;

    let tx = conn.transaction()?;
    let result = load_all(&tx, registry, dataset, db_path, options, &mut on_notice);
    match result {
        Ok(report) => {
            tx.commit()?;
            close(conn, db_path)?;
            info!(path = %db_path.display(), rows = report.total_rows(), "database committed");
            Ok(report)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                warn!(error = %rollback_err, "rollback failed");
            }
            if let Err(close_err) = close(conn, db_path) {
                warn!(error = %close_err, "close after rollback failed");
            }
            Err(err)
        }
    }
}

fn remove_existing(db_path: &Path) -> Result<(), Error> {
    match fs::remove_file(db_path) {
        Ok(()) => {
            debug!(path = %db_path.display(), "removed previous database");
            Ok(())
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::new(ErrorKind::Io)
            .with_message("failed to remove previous database")
            .with_path(db_path)
            .with_source(err)),
    }
}

fn close(conn: Connection, db_path: &Path) -> Result<(), Error> {
    conn.close().map_err(|(_, err)| {
        Error::new(ErrorKind::Database)
            .with_message("failed to close database")
            .with_path(db_path)
            .with_source(err)
    })
}

fn load_all<N>(
    tx: &Transaction<'_>,
    registry: &Registry,
    dataset: &Dataset,
    db_path: &Path,
    options: PopulateOptions,
    on_notice: &mut N,
) -> Result<RunReport, Error>
where
    N: FnMut(Notice),
{
    for table in registry.tables() {
        tx.execute_batch(&table.create_sql())
            .map_err(|err| Error::from(err).with_table(&table.name))?;
    }

    let mut report = RunReport::new(db_path);
    for table in registry.tables() {
        let Some(source) = dataset.source(table) else {
            let path = dataset.source_path(table);
            on_notice(missing_source_notice(CMD, &table.name, &path));
            report.tables.push(TableReport::missing(&table.name, &path));
            continue;
        };
        info!(table = %table.name, source = %source.display(), "loading table");
        report
            .tables
            .push(load_table(tx, table, &source, options, on_notice)?);
    }
    Ok(report)
}

fn load_table<N>(
    tx: &Transaction<'_>,
    table: &TableDef,
    source: &Path,
    options: PopulateOptions,
    on_notice: &mut N,
) -> Result<TableReport, Error>
where
    N: FnMut(Notice),
{
    let mut report = TableReport::loaded(&table.name, source);
    let mut batch = Batch::new(tx, table, options.batch_size);

    for record in read_records(source)? {
        let record = record?;
        match check_arity(table, &record, source, options.arity)? {
            Arity::Keep => {}
            Arity::Skip { expected, found } => {
                on_notice(arity_notice(
                    CMD,
                    &table.name,
                    source,
                    record.line,
                    expected,
                    found,
                ));
                report.skipped += 1;
                continue;
            }
        }
        let row = record
            .iter()
            .map(|value| bind_value(value).map(str::to_owned))
            .collect();
        if let Some(flushed) = batch.push(row, record.line)? {
            report.batches.push(flushed);
        }
    }
    if let Some(flushed) = batch.flush()? {
        report.batches.push(flushed);
    }

    report.rows = report.batches.iter().map(|&n| n as u64).sum();
    Ok(report)
}

type Row = Vec<Option<String>>;

/// Rows waiting for one insert operation against a single table.
struct Batch<'t> {
    tx: &'t Transaction<'t>,
    table: &'t TableDef,
    sql: String,
    capacity: usize,
    rows: Vec<(u64, Row)>,
}

impl<'t> Batch<'t> {
    fn new(tx: &'t Transaction<'t>, table: &'t TableDef, capacity: usize) -> Self {
        Self {
            tx,
            table,
            sql: table.insert_sql(),
            capacity,
            rows: Vec::with_capacity(capacity.min(DEFAULT_BATCH_SIZE)),
        }
    }

    /// Queues `row`; returns the flushed row count when the batch fills up.
    fn push(&mut self, row: Row, line: u64) -> Result<Option<usize>, Error> {
        self.rows.push((line, row));
        if self.rows.len() >= self.capacity {
            return self.flush();
        }
        Ok(None)
    }

    fn flush(&mut self) -> Result<Option<usize>, Error> {
        if self.rows.is_empty() {
            return Ok(None);
        }
        let tx = self.tx;
        let mut stmt = tx
            .prepare_cached(&self.sql)
            .map_err(|err| Error::from(err).with_table(&self.table.name))?;
        for (line, row) in &self.rows {
            stmt.execute(params_from_iter(row.iter())).map_err(|err| {
                Error::from(err)
                    .with_table(&self.table.name)
                    .with_line(*line)
            })?;
        }
        let flushed = self.rows.len();
        self.rows.clear();
        debug!(table = %self.table.name, rows = flushed, "flushed batch");
        Ok(Some(flushed))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use rusqlite::Connection;

    use super::{PopulateOptions, populate};
    use crate::core::dataset::Dataset;
    use crate::core::error::ErrorKind;
    use crate::core::record::ArityPolicy;
    use crate::core::report::TableStatus;
    use crate::core::schema::Registry;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).expect("write source");
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .expect("count")
    }

    #[test]
    fn toy_story_row_is_typed_by_affinity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data = dir.path().join("dataset");
        fs::create_dir(&data).expect("mkdir");
        write(&data, "movies.csv", "id,title,year,genres\n1,Toy Story,1995,Animation\n");
        let registry = Registry::builtin();
        let dataset = Dataset::open(&data, &registry).expect("dataset");
        let db = dir.path().join("movies_rating.db");

        let report =
            populate(&registry, &dataset, &db, PopulateOptions::default(), |_| {}).expect("populate");
        assert_eq!(report.table("movies").map(|t| t.rows), Some(1));

        let conn = Connection::open(&db).expect("open");
        let row: (i64, String, i64, String, String) = conn
            .query_row(
                "SELECT id, title, year, genres, typeof(year) FROM movies",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .expect("row");
        assert_eq!(
            row,
            (1, "Toy Story".to_string(), 1995, "Animation".to_string(), "integer".to_string())
        );
    }

    #[test]
    fn empty_fields_bind_null() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "ratings.csv",
            "id,user_id,movie_id,rating,timestamp\n1,10,100,4.5,\n2,,100,,964982703\n",
        );
        let registry = Registry::builtin();
        let dataset = Dataset::open(dir.path(), &registry).expect("dataset");
        let db = dir.path().join("out.db");
        populate(&registry, &dataset, &db, PopulateOptions::default(), |_| {}).expect("populate");

        let conn = Connection::open(&db).expect("open");
        let nulls: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM ratings WHERE timestamp IS NULL OR user_id IS NULL OR rating IS NULL",
                [],
                |row| row.get(0),
            )
            .expect("nulls");
        assert_eq!(nulls, 2);
        let rating: f64 = conn
            .query_row("SELECT rating FROM ratings WHERE id = 1", [], |row| row.get(0))
            .expect("rating");
        assert_eq!(rating, 4.5);
    }

    #[test]
    fn batches_flush_at_capacity_and_remainder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut text = String::from("id,user_id,movie_id,tag,timestamp\n");
        for i in 1..=2500 {
            text.push_str(&format!("{i},{},{},tag {i},1139045764\n", i % 7, i % 11));
        }
        write(dir.path(), "tags.csv", &text);
        let registry = Registry::builtin();
        let dataset = Dataset::open(dir.path(), &registry).expect("dataset");
        let db = dir.path().join("out.db");

        let report =
            populate(&registry, &dataset, &db, PopulateOptions::default(), |_| {}).expect("populate");
        let tags = report.table("tags").expect("tags");
        assert_eq!(tags.batches, vec![1000, 1000, 500]);
        assert_eq!(tags.rows, 2500);

        let conn = Connection::open(&db).expect("open");
        assert_eq!(count(&conn, "tags"), 2500);
    }

    #[test]
    fn exact_multiple_has_no_trailing_batch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut text = String::from("id,title,year,genres\n");
        for i in 1..=4 {
            text.push_str(&format!("{i},Movie {i},2000,Drama\n"));
        }
        write(dir.path(), "movies.csv", &text);
        let registry = Registry::builtin();
        let dataset = Dataset::open(dir.path(), &registry).expect("dataset");
        let db = dir.path().join("out.db");

        let options = PopulateOptions {
            batch_size: 2,
            ..PopulateOptions::default()
        };
        let report = populate(&registry, &dataset, &db, options, |_| {}).expect("populate");
        assert_eq!(report.table("movies").expect("movies").batches, vec![2, 2]);
    }

    #[test]
    fn missing_sources_leave_tables_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "movies.csv", "id,title,year,genres\n1,Heat,1995,Crime\n");
        let registry = Registry::builtin();
        let dataset = Dataset::open(dir.path(), &registry).expect("dataset");
        let db = dir.path().join("out.db");

        let mut notices = Vec::new();
        let report = populate(&registry, &dataset, &db, PopulateOptions::default(), |notice| {
            notices.push(notice)
        })
        .expect("populate");
        assert_eq!(notices.len(), 3);
        assert_eq!(
            report.table("tags").map(|t| t.status),
            Some(TableStatus::MissingSource)
        );

        let conn = Connection::open(&db).expect("open");
        assert_eq!(count(&conn, "movies"), 1);
        for table in ["ratings", "tags", "users"] {
            assert_eq!(count(&conn, table), 0, "{table}");
        }
    }

    #[test]
    fn rerun_replaces_previous_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "movies.csv", "id,title,year,genres\n1,Heat,1995,Crime\n");
        let registry = Registry::builtin();
        let dataset = Dataset::open(dir.path(), &registry).expect("dataset");
        let db = dir.path().join("out.db");

        fs::write(&db, b"not a database").expect("garbage");
        for _ in 0..2 {
            populate(&registry, &dataset, &db, PopulateOptions::default(), |_| {})
                .expect("populate");
        }
        let conn = Connection::open(&db).expect("open");
        assert_eq!(count(&conn, "movies"), 1);
    }

    #[test]
    fn failure_rolls_back_every_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "movies.csv", "id,title,year,genres\n1,Heat,1995,Crime\n");
        // Duplicate primary key fails the second insert.
        write(
            dir.path(),
            "ratings.csv",
            "id,user_id,movie_id,rating,timestamp\n1,1,1,4.0,1\n1,1,1,3.0,2\n",
        );
        let registry = Registry::builtin();
        let dataset = Dataset::open(dir.path(), &registry).expect("dataset");
        let db = dir.path().join("out.db");

        let err = populate(&registry, &dataset, &db, PopulateOptions::default(), |_| {})
            .expect_err("duplicate key");
        assert_eq!(err.kind(), ErrorKind::Database);
        assert_eq!(err.table(), Some("ratings"));
        assert_eq!(err.line(), Some(3));

        let conn = Connection::open(&db).expect("open");
        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |row| {
                row.get(0)
            })
            .expect("tables");
        assert_eq!(tables, 0);
    }

    #[test]
    fn short_record_fails_under_allow_and_is_dropped_under_skip() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(
            dir.path(),
            "movies.csv",
            "id,title,year,genres\n1,Heat,1995,Crime\n2,Broken\n",
        );
        let registry = Registry::builtin();
        let dataset = Dataset::open(dir.path(), &registry).expect("dataset");
        let db = dir.path().join("out.db");

        let err = populate(&registry, &dataset, &db, PopulateOptions::default(), |_| {})
            .expect_err("parameter count");
        assert_eq!(err.kind(), ErrorKind::Database);

        let options = PopulateOptions {
            arity: ArityPolicy::Skip,
            ..PopulateOptions::default()
        };
        let report = populate(&registry, &dataset, &db, options, |_| {}).expect("skip");
        let movies = report.table("movies").expect("movies");
        assert_eq!((movies.rows, movies.skipped), (1, 1));
    }

    #[test]
    fn zero_batch_size_is_usage_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Registry::builtin();
        let dataset = Dataset::open(dir.path(), &registry).expect("dataset");
        let db = dir.path().join("out.db");
        let options = PopulateOptions {
            batch_size: 0,
            ..PopulateOptions::default()
        };
        let err = populate(&registry, &dataset, &db, options, |_| {}).expect_err("usage");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(!db.exists());
    }
}
