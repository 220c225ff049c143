//! Purpose: Shared library crate used by the `moviedb` CLI and tests.
//! Exports: `api` (stable surface), `core` (schema, sources, pipelines, errors), `notice`.
//! Role: Holds all build logic; the binary only parses arguments and renders output.
//! Invariants: The schema registry is immutable once constructed and passed by reference.
//! Invariants: Pipelines report non-fatal conditions through notices, never by failing.
pub mod api;
pub mod core;
pub mod notice;
