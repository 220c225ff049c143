// Table definitions shared by the script emitter and the database populator.
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub decl: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub source: String,
    pub columns: Vec<Column>,
}

impl TableDef {
    fn new(name: &str, source: &str, columns: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            columns: columns
                .iter()
                .map(|(name, decl)| Column {
                    name: name.to_string(),
                    decl: decl.to_string(),
                })
                .collect(),
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// `id, title, year, genres`
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|column| column.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.name)
    }

    pub fn create_sql(&self) -> String {
        let defs = self
            .columns
            .iter()
            .map(|column| format!("{} {}", column.name, column.decl))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE {} ({defs})", self.name)
    }

    pub fn insert_sql(&self) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.name,
            self.column_list()
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    tables: Vec<TableDef>,
}

impl Registry {
    /// The movie-ratings dataset layout.
    pub fn builtin() -> Self {
        Self {
            tables: vec![
                TableDef::new(
                    "movies",
                    "movies.csv",
                    &[
                        ("id", "INTEGER PRIMARY KEY"),
                        ("title", "TEXT"),
                        ("year", "INTEGER"),
                        ("genres", "TEXT"),
                    ],
                ),
                TableDef::new(
                    "ratings",
                    "ratings.csv",
                    &[
                        ("id", "INTEGER PRIMARY KEY"),
                        ("user_id", "INTEGER"),
                        ("movie_id", "INTEGER"),
                        ("rating", "REAL"),
                        ("timestamp", "INTEGER"),
                    ],
                ),
                TableDef::new(
                    "tags",
                    "tags.csv",
                    &[
                        ("id", "INTEGER PRIMARY KEY"),
                        ("user_id", "INTEGER"),
                        ("movie_id", "INTEGER"),
                        ("tag", "TEXT"),
                        ("timestamp", "INTEGER"),
                    ],
                ),
                TableDef::new(
                    "users",
                    "users.txt",
                    &[
                        ("id", "INTEGER PRIMARY KEY"),
                        ("name", "TEXT"),
                        ("email", "TEXT"),
                        ("gender", "TEXT"),
                        ("register_date", "TEXT"),
                        ("occupation", "TEXT"),
                    ],
                ),
            ],
        }
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        let registry: Registry = serde_json::from_str(text).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid schema document: {err}"))
                .with_source(err)
        })?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|err| {
            let kind = if err.kind() == std::io::ErrorKind::NotFound {
                ErrorKind::NotFound
            } else {
                ErrorKind::Io
            };
            Error::new(kind)
                .with_message("failed to read schema file")
                .with_path(path)
                .with_source(err)
        })?;
        Self::from_json(&text).map_err(|err| err.with_path(path))
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    pub fn get(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|table| table.name == name)
    }

    pub fn source_files(&self) -> Vec<&str> {
        self.tables.iter().map(|table| table.source.as_str()).collect()
    }

    fn validate(&self) -> Result<(), Error> {
        if self.tables.is_empty() {
            return Err(usage("schema defines no tables"));
        }
        let mut seen = HashSet::new();
        for table in &self.tables {
            if !is_identifier(&table.name) {
                return Err(usage(format!("invalid table name '{}'", table.name)));
            }
            if !seen.insert(table.name.as_str()) {
                return Err(usage("duplicate table name").with_table(&table.name));
            }
            if table.source.is_empty()
                || table.source.contains(['/', '\\'])
                || table.source == "."
                || table.source == ".."
            {
                return Err(usage(format!("invalid source file name '{}'", table.source))
                    .with_table(&table.name));
            }
            if table.columns.is_empty() {
                return Err(usage("table has no columns").with_table(&table.name));
            }
            let mut columns = HashSet::new();
            for column in &table.columns {
                if !is_identifier(&column.name) {
                    return Err(usage(format!("invalid column name '{}'", column.name))
                        .with_table(&table.name));
                }
                if !columns.insert(column.name.as_str()) {
                    return Err(usage(format!("duplicate column '{}'", column.name))
                        .with_table(&table.name));
                }
                let decl = column.decl.trim();
                if decl.is_empty() || decl.contains([';', '\'', '"', '`']) {
                    return Err(usage(format!(
                        "invalid declared type for column '{}'",
                        column.name
                    ))
                    .with_table(&table.name));
                }
            }
        }
        Ok(())
    }
}

fn usage(message: impl Into<String>) -> Error {
    Error::new(ErrorKind::Usage).with_message(message)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
