// Dataset directory resolution and per-table source lookup.
use std::path::{Path, PathBuf};

use crate::core::error::{Error, ErrorKind};
use crate::core::schema::{Registry, TableDef};

pub const DEFAULT_DATASET_DIR: &str = "dataset";

#[derive(Clone, Debug)]
pub struct Dataset {
    root: PathBuf,
}

impl Dataset {
    /// Fails with `NotFound` when `root` is not an existing directory; the
    /// hint lists the files the registry expects to find there.
    pub fn open(root: impl Into<PathBuf>, registry: &Registry) -> Result<Self, Error> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::new(ErrorKind::NotFound)
                .with_message(format!("dataset directory {} not found", root.display()))
                .with_path(&root)
                .with_hint(format!(
                    "Create the directory and place the source files in it: {}",
                    registry.source_files().join(", ")
                )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_path(&self, table: &TableDef) -> PathBuf {
        self.root.join(&table.source)
    }

    /// Path of the table's source file, if it exists.
    pub fn source(&self, table: &TableDef) -> Option<PathBuf> {
        let path = self.source_path(table);
        path.is_file().then_some(path)
    }
}
