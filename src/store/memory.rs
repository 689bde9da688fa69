use std::collections::HashSet;

use log::debug;

use super::{LoadMode, Store, check_required};
use crate::{
    data::{TypedRow, Value},
    error::ImportError,
    schema::Schema,
    staging::RawRecord,
};

/// In-process store holding one staging table and one target table.
///
/// Enforces the same constraints as the SQLite tables: required columns must
/// be present and non-empty, key columns must be unique across the target.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    staging: Vec<RawRecord>,
    target: Vec<TypedRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn staging_len(&self) -> usize {
        self.staging.len()
    }

    pub fn target_len(&self) -> usize {
        self.target.len()
    }
}

fn key_of(schema: &Schema, row: &TypedRow) -> Option<Vec<String>> {
    let parts = schema
        .columns
        .iter()
        .enumerate()
        .filter(|(_, column)| column.key)
        .map(|(idx, _)| {
            row.get(idx)
                .and_then(|cell| cell.as_ref())
                .map(Value::as_display)
                .unwrap_or_default()
        })
        .collect::<Vec<_>>();
    if parts.is_empty() { None } else { Some(parts) }
}

impl Store for MemoryStore {
    fn describe(&self) -> String {
        "in-memory store".to_string()
    }

    fn ensure_tables(&mut self, _schema: &Schema) -> Result<(), ImportError> {
        Ok(())
    }

    fn replace_staging(
        &mut self,
        schema: &Schema,
        records: &[RawRecord],
    ) -> Result<(), ImportError> {
        if let Some(bad) = records
            .iter()
            .position(|record| record.len() != schema.columns.len())
        {
            return Err(ImportError::schema_mismatch(format!(
                "record {} has {} field(s) but '{}' has {} column(s)",
                bad + 1,
                records[bad].len(),
                schema.staging_table,
                schema.columns.len()
            )));
        }
        self.staging = records.to_vec();
        Ok(())
    }

    fn staged_records(&self, _schema: &Schema) -> Result<Vec<RawRecord>, ImportError> {
        Ok(self.staging.clone())
    }

    fn load_target(
        &mut self,
        schema: &Schema,
        rows: &[TypedRow],
        mode: LoadMode,
    ) -> Result<usize, ImportError> {
        check_required(schema, rows)?;
        let mut next = match mode {
            LoadMode::Replace => Vec::with_capacity(rows.len()),
            LoadMode::Append => self.target.clone(),
        };
        let mut keys = next
            .iter()
            .filter_map(|row| key_of(schema, row))
            .collect::<HashSet<_>>();
        for (idx, row) in rows.iter().enumerate() {
            if let Some(key) = key_of(schema, row) {
                if !keys.insert(key.clone()) {
                    return Err(ImportError::load(format!(
                        "record {}: duplicate key {}",
                        idx + 1,
                        key.join("/")
                    )));
                }
            }
            next.push(row.clone());
        }
        debug!("Memory target now holds {} row(s)", next.len());
        self.target = next;
        Ok(rows.len())
    }

    fn clear_staging(&mut self, _schema: &Schema) -> Result<usize, ImportError> {
        let removed = self.staging.len();
        self.staging.clear();
        Ok(removed)
    }

    fn target_rows(
        &self,
        _schema: &Schema,
        limit: Option<usize>,
    ) -> Result<Vec<TypedRow>, ImportError> {
        let take = limit.unwrap_or(self.target.len());
        Ok(self.target.iter().take(take).cloned().collect())
    }
}
