use std::path::Path;

use anyhow::anyhow;
use log::debug;
use rusqlite::{Connection, ErrorCode, OpenFlags, params_from_iter, types::Value as SqlValue};

use super::{LoadMode, Store};
use crate::{
    data::{TypedRow, Value, parse_naive_date, parse_naive_time},
    error::ImportError,
    schema::{ColumnMeta, ColumnType, Schema},
    staging::RawRecord,
};

/// SQLite database holding the staging and target tables.
pub struct SqliteStore {
    conn: Connection,
    location: String,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        let conn = Connection::open(path).map_err(|err| {
            ImportError::resource(format!("Opening SQLite database {path:?}"), err)
        })?;
        Ok(Self {
            conn,
            location: path.display().to_string(),
        })
    }

    /// Opens an existing database without creating it or allowing writes.
    pub fn open_read_only(path: &Path) -> Result<Self, ImportError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|err| {
                ImportError::resource(format!("Opening SQLite database {path:?} read-only"), err)
            })?;
        Ok(Self {
            conn,
            location: path.display().to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self, ImportError> {
        let conn = Connection::open_in_memory()
            .map_err(|err| ImportError::resource("Opening in-memory SQLite database", err))?;
        Ok(Self {
            conn,
            location: ":memory:".to_string(),
        })
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>, ImportError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
            .map_err(|err| store_error("Inspecting table layout", err))?;
        let names = stmt
            .query_map([table], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|err| store_error(format!("Inspecting columns of '{table}'"), err))?;
        Ok(names)
    }

    fn ensure_layout(&self, table: &str, schema: &Schema) -> Result<(), ImportError> {
        let existing = self.table_columns(table)?;
        if existing.is_empty() {
            return Err(ImportError::schema_mismatch(format!(
                "table '{table}' does not exist in {}",
                self.location
            )));
        }
        let expected = schema.headers();
        if existing != expected {
            return Err(ImportError::schema_mismatch(format!(
                "table '{table}' has columns [{}] but the schema declares [{}]",
                existing.join(", "),
                expected.join(", ")
            )));
        }
        Ok(())
    }

    /// Checks that both tables exist with the schema's columns, without
    /// running any DDL.
    pub fn verify_tables(&self, schema: &Schema) -> Result<(), ImportError> {
        self.ensure_layout(&schema.staging_table, schema)?;
        self.ensure_layout(&schema.target_table, schema)
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn column_list(schema: &Schema) -> String {
    schema
        .columns
        .iter()
        .map(|column| quote(&column.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|idx| format!("?{idx}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn target_column_ddl(column: &ColumnMeta) -> String {
    let name = quote(&column.name);
    let mut ddl = format!("{name} {}", column.datatype.sql_type());
    if column.required {
        ddl.push_str(" NOT NULL");
        if column.datatype == ColumnType::Text {
            ddl.push_str(&format!(" CHECK ({name} <> '')"));
        }
    }
    ddl
}

pub fn target_table_ddl(schema: &Schema) -> String {
    let mut parts = schema
        .columns
        .iter()
        .map(target_column_ddl)
        .collect::<Vec<_>>();
    let keys = schema
        .columns
        .iter()
        .filter(|column| column.key)
        .map(|column| quote(&column.name))
        .collect::<Vec<_>>();
    if !keys.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote(&schema.target_table),
        parts.join(",\n    ")
    )
}

pub fn staging_table_ddl(schema: &Schema) -> String {
    let parts = schema
        .columns
        .iter()
        .map(|column| format!("{} TEXT", quote(&column.name)))
        .collect::<Vec<_>>();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        quote(&schema.staging_table),
        parts.join(",\n    ")
    )
}

fn store_error(context: impl Into<String>, err: rusqlite::Error) -> ImportError {
    ImportError::resource(context, err)
}

fn to_sql(cell: &Option<Value>) -> SqlValue {
    match cell {
        None => SqlValue::Null,
        Some(Value::Text(s)) => SqlValue::Text(s.clone()),
        Some(Value::Integer(i)) => SqlValue::Integer(*i),
        Some(Value::Float(f)) => SqlValue::Real(*f),
        Some(value @ (Value::Date(_) | Value::Time(_))) => SqlValue::Text(value.as_display()),
    }
}

fn from_sql(column: &ColumnMeta, raw: SqlValue) -> anyhow::Result<Option<Value>> {
    let value = match (column.datatype, raw) {
        (_, SqlValue::Null) => return Ok(None),
        (ColumnType::Text, SqlValue::Text(s)) => Value::Text(s),
        (ColumnType::Text, SqlValue::Integer(i)) => Value::Text(i.to_string()),
        (ColumnType::Text, SqlValue::Real(f)) => Value::Text(f.to_string()),
        (ColumnType::Integer, SqlValue::Integer(i)) => Value::Integer(i),
        (ColumnType::Float, SqlValue::Real(f)) => Value::Float(f),
        (ColumnType::Float, SqlValue::Integer(i)) => Value::Float(i as f64),
        (ColumnType::Date, SqlValue::Text(s)) => Value::Date(parse_naive_date(&s)?),
        (ColumnType::Time, SqlValue::Text(s)) => Value::Time(parse_naive_time(&s)?),
        (datatype, other) => {
            return Err(anyhow!(
                "column '{}' holds {:?}, not a {datatype} value",
                column.name,
                other.data_type()
            ));
        }
    };
    Ok(Some(value))
}

impl Store for SqliteStore {
    fn describe(&self) -> String {
        format!("SQLite database {}", self.location)
    }

    fn ensure_tables(&mut self, schema: &Schema) -> Result<(), ImportError> {
        let ddl = format!(
            "{};\n{};",
            staging_table_ddl(schema),
            target_table_ddl(schema)
        );
        debug!("Ensuring tables:\n{ddl}");
        self.conn
            .execute_batch(&ddl)
            .map_err(|err| store_error("Creating staging and target tables", err))?;
        self.ensure_layout(&schema.staging_table, schema)?;
        self.ensure_layout(&schema.target_table, schema)
    }

    fn replace_staging(
        &mut self,
        schema: &Schema,
        records: &[RawRecord],
    ) -> Result<(), ImportError> {
        let table = quote(&schema.staging_table);
        let insert = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            column_list(schema),
            placeholders(schema.columns.len())
        );
        let tx = self
            .conn
            .transaction()
            .map_err(|err| store_error("Starting staging transaction", err))?;
        tx.execute(&format!("DELETE FROM {table}"), [])
            .map_err(|err| store_error("Truncating staging table", err))?;
        {
            let mut stmt = tx
                .prepare(&insert)
                .map_err(|err| store_error("Preparing staging insert", err))?;
            for (idx, record) in records.iter().enumerate() {
                if record.len() != schema.columns.len() {
                    return Err(ImportError::schema_mismatch(format!(
                        "record {} has {} field(s) but '{}' has {} column(s)",
                        idx + 1,
                        record.len(),
                        schema.staging_table,
                        schema.columns.len()
                    )));
                }
                stmt.execute(params_from_iter(record.fields.iter()))
                    .map_err(|err| store_error(format!("Staging record {}", idx + 1), err))?;
            }
        }
        tx.commit()
            .map_err(|err| store_error("Committing staging transaction", err))
    }

    fn staged_records(&self, schema: &Schema) -> Result<Vec<RawRecord>, ImportError> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            column_list(schema),
            quote(&schema.staging_table)
        );
        let width = schema.columns.len();
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| store_error("Preparing staging query", err))?;
        let records = stmt
            .query_map([], |row| {
                let mut fields = Vec::with_capacity(width);
                for idx in 0..width {
                    fields.push(row.get::<_, Option<String>>(idx)?.unwrap_or_default());
                }
                Ok(RawRecord { fields })
            })
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|err| store_error("Reading staging table", err))?;
        Ok(records)
    }

    fn load_target(
        &mut self,
        schema: &Schema,
        rows: &[TypedRow],
        mode: LoadMode,
    ) -> Result<usize, ImportError> {
        let table = quote(&schema.target_table);
        let insert = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            column_list(schema),
            placeholders(schema.columns.len())
        );
        let tx = self
            .conn
            .transaction()
            .map_err(|err| store_error("Starting load transaction", err))?;
        if mode == LoadMode::Replace {
            let removed = tx
                .execute(&format!("DELETE FROM {table}"), [])
                .map_err(|err| store_error("Emptying target table", err))?;
            debug!("Removed {removed} existing row(s) from {table}");
        }
        {
            let mut stmt = tx
                .prepare(&insert)
                .map_err(|err| store_error("Preparing target insert", err))?;
            for (idx, row) in rows.iter().enumerate() {
                let values = row.iter().map(to_sql).collect::<Vec<_>>();
                stmt.execute(params_from_iter(values.iter()))
                    .map_err(|err| {
                        if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
                            ImportError::load_with(format!("record {} violates a constraint", idx + 1), err)
                        } else {
                            store_error(format!("Inserting record {}", idx + 1), err)
                        }
                    })?;
            }
        }
        tx.commit()
            .map_err(|err| store_error("Committing load transaction", err))?;
        Ok(rows.len())
    }

    fn clear_staging(&mut self, schema: &Schema) -> Result<usize, ImportError> {
        self.conn
            .execute(&format!("DELETE FROM {}", quote(&schema.staging_table)), [])
            .map_err(|err| store_error("Clearing staging table", err))
    }

    fn target_rows(
        &self,
        schema: &Schema,
        limit: Option<usize>,
    ) -> Result<Vec<TypedRow>, ImportError> {
        let mut sql = format!(
            "SELECT {} FROM {} ORDER BY rowid",
            column_list(schema),
            quote(&schema.target_table)
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let width = schema.columns.len();
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|err| store_error("Preparing target query", err))?;
        let raw_rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|idx| row.get::<_, SqlValue>(idx))
                    .collect::<Result<Vec<_>, _>>()
            })
            .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
            .map_err(|err| store_error("Reading target table", err))?;

        raw_rows
            .into_iter()
            .enumerate()
            .map(|(row_idx, raw)| {
                schema
                    .columns
                    .iter()
                    .zip(raw)
                    .map(|(column, value)| from_sql(column, value))
                    .collect::<anyhow::Result<TypedRow>>()
                    .map_err(|err| {
                        ImportError::resource(
                            format!("Decoding row {} of '{}'", row_idx + 1, schema.target_table),
                            err,
                        )
                    })
            })
            .collect()
    }
}
