//! Relational store seam: staging table, target table, and the operations the
//! pipeline needs on them.
//!
//! Every mutating operation is all-or-nothing. A failed call leaves both
//! tables exactly as they were before it.

pub mod memory;
pub mod sqlite;

use clap::ValueEnum;
use serde::Serialize;

use crate::{
    data::{TypedRow, Value},
    error::ImportError,
    schema::Schema,
    staging::RawRecord,
};

/// How a coerced batch meets rows already in the target table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum LoadMode {
    /// Empty the target and insert the batch in one transaction.
    #[default]
    Replace,
    /// Insert the batch next to the existing rows.
    Append,
}

pub trait Store {
    /// Human-readable location, used in log lines.
    fn describe(&self) -> String;

    /// Creates the staging and target tables when they do not exist yet.
    fn ensure_tables(&mut self, schema: &Schema) -> Result<(), ImportError>;

    /// Truncates staging and fills it with `records`.
    fn replace_staging(
        &mut self,
        schema: &Schema,
        records: &[RawRecord],
    ) -> Result<(), ImportError>;

    fn staged_records(&self, schema: &Schema) -> Result<Vec<RawRecord>, ImportError>;

    /// Inserts `rows` into the target as one batch and returns the rows written.
    fn load_target(
        &mut self,
        schema: &Schema,
        rows: &[TypedRow],
        mode: LoadMode,
    ) -> Result<usize, ImportError>;

    /// Deletes every staged row and returns how many were removed.
    fn clear_staging(&mut self, schema: &Schema) -> Result<usize, ImportError>;

    fn target_rows(
        &self,
        schema: &Schema,
        limit: Option<usize>,
    ) -> Result<Vec<TypedRow>, ImportError>;
}

/// Rejects a batch that would put an empty or absent value in a required column.
pub(crate) fn check_required(schema: &Schema, rows: &[TypedRow]) -> Result<(), ImportError> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, column) in schema.columns.iter().enumerate() {
            if !column.required {
                continue;
            }
            let missing = match row.get(col_idx) {
                None | Some(None) => true,
                Some(Some(Value::Text(text))) => text.is_empty(),
                Some(Some(_)) => false,
            };
            if missing {
                return Err(ImportError::load(format!(
                    "record {}: required column '{}' is empty",
                    row_idx + 1,
                    column.name
                )));
            }
        }
    }
    Ok(())
}
