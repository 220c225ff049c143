//! Purpose: `moviedb` CLI entry point and command dispatch bootstrap.
//! Role: Binary crate root; parses args, runs commands, renders diagnostics.
//! Invariants: Operator diagnostics (banners, notices, errors) are written to stdout.
//! Invariants: `--json` switches every stdout line to a single JSON value.
//! Invariants: Log events go to stderr through `tracing`; stdout never carries logs.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{
    Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use moviedb::api::{
    ArityPolicy, DEFAULT_BATCH_SIZE, DEFAULT_DATASET_DIR, DEFAULT_DB_PATH, DEFAULT_SCRIPT_PATH,
    Error, ErrorKind, Registry, to_exit_code,
};
use moviedb::notice::{Notice, notice_json};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, format)) => {
            emit_error(&err, format);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, OutputFormat)> {
    let args = normalize_args(std::env::args_os());
    let fallback_format = if args.iter().any(|arg| arg == "--json") {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        fallback_format,
                    )
                })?;
                return Ok(RunOutcome::ok());
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `moviedb --help`."),
                    fallback_format,
                ));
            }
        },
    };

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let registry = match &cli.schema {
        Some(path) => Registry::load(path).map_err(|err| (err, format))?,
        None => Registry::builtin(),
    };
    let ctx = command_dispatch::Context {
        registry,
        dataset_dir: cli.dataset,
        format,
    };
    let command = cli.command.unwrap_or_default();

    command_dispatch::dispatch_command(command, &ctx).map_err(|err| (err, format))
}

fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| {
            let replacement = arg.to_str().and_then(|value| match value {
                "---help" => Some("--help"),
                "---version" => Some("--version"),
                _ => None,
            });
            replacement.map(OsString::from).unwrap_or(arg)
        })
        .collect()
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "moviedb",
    version,
    about = "Build the movie-ratings SQLite database from delimited text files",
    long_about = None,
    before_help = r#"Reads movies.csv, ratings.csv, tags.csv and users.txt from the dataset
directory. Each file's first line is a header and is skipped.

  - `build` writes the SQL script and then the database (default)
  - `script` writes only the SQL script
  - `populate` writes only the database
"#,
    after_help = r#"EXAMPLES
  $ moviedb                                      # build db_init.sql and movies_rating.db
  $ moviedb --dataset ./ml-latest script -o init.sql
  $ moviedb populate --db ratings.db --batch-size 5000
  $ moviedb --json build --arity skip

NOTES
  - Both outputs are rebuilt from scratch on every run
  - Missing source files are warnings: the table is created empty
  - Empty fields become NULL
  - RUST_LOG controls log output on stderr (default: warn)"#
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = DEFAULT_DATASET_DIR,
        help = "Directory containing the source files",
        value_hint = ValueHint::DirPath
    )]
    dataset: PathBuf,
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        help = "JSON schema file replacing the builtin table definitions",
        value_hint = ValueHint::FilePath
    )]
    schema: Option<PathBuf>,
    #[arg(long, global = true, help = "Emit one JSON value per stdout line")]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Copy, Clone, Debug)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ArityCli {
    Allow,
    Reject,
    Skip,
}

impl From<ArityCli> for ArityPolicy {
    fn from(value: ArityCli) -> Self {
        match value {
            ArityCli::Allow => ArityPolicy::Allow,
            ArityCli::Reject => ArityPolicy::Reject,
            ArityCli::Skip => ArityPolicy::Skip,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Write the SQL script, then populate the database (default)")]
    Build(BuildArgs),
    #[command(
        about = "Write the SQL script only",
        after_help = r#"EXAMPLES
  $ moviedb script
  $ moviedb script --output init.sql && sqlite3 movies.db < init.sql"#
    )]
    Script {
        #[arg(
            short = 'o',
            long,
            default_value = DEFAULT_SCRIPT_PATH,
            help = "Script output path",
            value_hint = ValueHint::FilePath
        )]
        output: PathBuf,
        #[command(flatten)]
        arity: ArityArg,
    },
    #[command(about = "Populate the database only")]
    Populate {
        #[command(flatten)]
        db: DbArgs,
        #[command(flatten)]
        arity: ArityArg,
    },
    #[command(about = "Print the active table definitions")]
    Schema,
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Default for Command {
    fn default() -> Self {
        Command::Build(BuildArgs::default())
    }
}

#[derive(Args, Clone, Debug)]
struct BuildArgs {
    #[arg(
        long,
        default_value = DEFAULT_SCRIPT_PATH,
        help = "Script output path",
        value_hint = ValueHint::FilePath
    )]
    script: PathBuf,
    #[command(flatten)]
    db: DbArgs,
    #[command(flatten)]
    arity: ArityArg,
}

impl Default for BuildArgs {
    fn default() -> Self {
        Self {
            script: PathBuf::from(DEFAULT_SCRIPT_PATH),
            db: DbArgs::default(),
            arity: ArityArg::default(),
        }
    }
}

#[derive(Args, Clone, Debug)]
struct DbArgs {
    #[arg(
        long,
        default_value = DEFAULT_DB_PATH,
        help = "Database file path (replaced on every run)",
        value_hint = ValueHint::FilePath
    )]
    db: PathBuf,
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, help = "Rows per insert batch")]
    batch_size: usize,
}

impl Default for DbArgs {
    fn default() -> Self {
        Self {
            db: PathBuf::from(DEFAULT_DB_PATH),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Args, Clone, Debug)]
struct ArityArg {
    #[arg(
        long,
        default_value = "allow",
        value_enum,
        help = "Records whose field count differs from the table: allow|reject|skip",
        long_help = r#"Records whose field count differs from the table's column count

  allow   Transcribe as-is (the database rejects them when populating)
  reject  Fail the run at the first such record
  skip    Drop the record and print a warning"#
    )]
    arity: ArityCli,
}

impl Default for ArityArg {
    fn default() -> Self {
        Self {
            arity: ArityCli::Allow,
        }
    }
}

fn emit_json(value: Value) {
    let json = serde_json::to_string(&value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_line(format: OutputFormat, text: &str) {
    if let OutputFormat::Human = format {
        println!("{text}");
    }
}

fn emit_notice(notice: &Notice, format: OutputFormat) {
    match format {
        OutputFormat::Human => println!("warning: {}", notice.message),
        OutputFormat::Json => emit_json(notice_json(notice)),
    }
}

fn emit_error(err: &Error, format: OutputFormat) {
    match format {
        OutputFormat::Human => println!("{}", error_text(err)),
        OutputFormat::Json => emit_json(error_json(err)),
    }
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Malformed => "malformed source record".to_string(),
        ErrorKind::Database => "database error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(table) = err.table() {
        inner.insert("table".to_string(), json!(table));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(line) = err.line() {
        inner.insert("line".to_string(), json!(line));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(table) = err.table() {
        lines.push(format!("table: {table}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(line) = err.line() {
        lines.push(format!("line: {line}"));
    }
    let causes = error_causes(err);
    // The first cause repeats the message for wrapped database errors.
    if let Some(cause) = causes.first().filter(|cause| **cause != error_message(err)) {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}
