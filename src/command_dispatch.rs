//! Purpose: Hold top-level CLI command dispatch for `moviedb`.
//! Exports: `Context`, `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: The dataset directory is checked before any output file is touched.
//! Invariants: `build` runs the script emitter first and stops on its failure.

use moviedb::api::{
    Dataset, PopulateOptions, RunReport, ScriptOptions, TableStatus, emit_script, populate,
};

use super::*;

pub(super) struct Context {
    pub(super) registry: Registry,
    pub(super) dataset_dir: PathBuf,
    pub(super) format: OutputFormat,
}

pub(super) fn dispatch_command(command: Command, ctx: &Context) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "moviedb", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Schema => {
            emit_schema(&ctx.registry, ctx.format);
            Ok(RunOutcome::ok())
        }
        Command::Script { output, arity } => {
            let dataset = Dataset::open(&ctx.dataset_dir, &ctx.registry)?;
            let options = ScriptOptions {
                arity: arity.arity.into(),
            };
            let report = run_script(ctx, &dataset, &output, options)?;
            if let OutputFormat::Json = ctx.format {
                emit_json(json!({ "script": report_value(&report) }));
            }
            Ok(RunOutcome::ok())
        }
        Command::Populate { db, arity } => {
            let dataset = Dataset::open(&ctx.dataset_dir, &ctx.registry)?;
            let options = PopulateOptions {
                batch_size: db.batch_size,
                arity: arity.arity.into(),
            };
            let report = run_populate(ctx, &dataset, &db.db, options)?;
            if let OutputFormat::Json = ctx.format {
                emit_json(json!({ "database": report_value(&report) }));
            }
            Ok(RunOutcome::ok())
        }
        Command::Build(args) => {
            let dataset = Dataset::open(&ctx.dataset_dir, &ctx.registry)?;
            let arity = ArityPolicy::from(args.arity.arity);
            let script = run_script(ctx, &dataset, &args.script, ScriptOptions { arity })?;
            let options = PopulateOptions {
                batch_size: args.db.batch_size,
                arity,
            };
            let database = run_populate(ctx, &dataset, &args.db.db, options)?;
            if let OutputFormat::Json = ctx.format {
                emit_json(json!({
                    "script": report_value(&script),
                    "database": report_value(&database),
                }));
            }
            Ok(RunOutcome::ok())
        }
    }
}

fn run_script(
    ctx: &Context,
    dataset: &Dataset,
    output: &std::path::Path,
    options: ScriptOptions,
) -> Result<RunReport, Error> {
    emit_line(ctx.format, "Generating SQL script...");
    let report = emit_script(&ctx.registry, dataset, output, options, |notice| {
        emit_notice(&notice, ctx.format)
    })?;
    emit_line(
        ctx.format,
        &format!(
            "SQL script {} created ({} rows{})",
            output.display(),
            report.total_rows(),
            missing_suffix(&report)
        ),
    );
    Ok(report)
}

fn run_populate(
    ctx: &Context,
    dataset: &Dataset,
    db_path: &std::path::Path,
    options: PopulateOptions,
) -> Result<RunReport, Error> {
    emit_line(ctx.format, "Creating database...");
    let result = populate(&ctx.registry, dataset, db_path, options, |notice| {
        emit_notice(&notice, ctx.format)
    });
    match result {
        Ok(report) => {
            for table in report.tables.iter().filter(|t| t.status == TableStatus::Loaded) {
                emit_line(
                    ctx.format,
                    &format!("Loaded {} rows into {}", table.rows, table.table),
                );
            }
            emit_line(
                ctx.format,
                &format!(
                    "Database {} created ({} rows{})",
                    db_path.display(),
                    report.total_rows(),
                    missing_suffix(&report)
                ),
            );
            Ok(report)
        }
        Err(err) => {
            emit_line(
                ctx.format,
                &format!(
                    "Failed to create database {}; nothing was committed",
                    db_path.display()
                ),
            );
            Err(err)
        }
    }
}

fn missing_suffix(report: &RunReport) -> String {
    let missing = report
        .tables
        .iter()
        .filter(|t| t.status == TableStatus::MissingSource)
        .count();
    match missing {
        0 => String::new(),
        1 => ", 1 table without source".to_string(),
        n => format!(", {n} tables without source"),
    }
}

fn report_value(report: &RunReport) -> Value {
    serde_json::to_value(report).unwrap_or(Value::Null)
}

fn emit_schema(registry: &Registry, format: OutputFormat) {
    match format {
        OutputFormat::Json => emit_json(serde_json::to_value(registry).unwrap_or(Value::Null)),
        OutputFormat::Human => {
            for table in registry.tables() {
                println!("{} ({})", table.name, table.source);
                for column in &table.columns {
                    println!("  {} {}", column.name, column.decl);
                }
            }
        }
    }
}
