//! Purpose: Define the public Rust API boundary for moviedb.
//! Exports: Registry, dataset, pipeline entry points, reports, and errors.
//! Role: Public, additive-only surface used by the CLI and integration tests.
//! Invariants: Pipelines take the registry by reference and share no state.

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::dataset::{DEFAULT_DATASET_DIR, Dataset};
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::populate::{DEFAULT_BATCH_SIZE, DEFAULT_DB_PATH, PopulateOptions, populate};
pub use crate::core::record::{ArityPolicy, bind_value, sql_literal};
pub use crate::core::report::{RunReport, TableReport, TableStatus};
pub use crate::core::schema::{Column, Registry, TableDef};
pub use crate::core::script::{DEFAULT_SCRIPT_PATH, ScriptOptions, emit_script, insert_statement};
pub use crate::notice::{Notice, NoticeKind};
