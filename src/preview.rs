use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::PreviewArgs,
    data::TypedRow,
    schema::Schema,
    store::{Store, sqlite::SqliteStore},
    table,
};

pub fn execute(args: &PreviewArgs) -> Result<()> {
    let schema = Schema::load_or_default(args.target.schema.as_deref())?;
    let store = SqliteStore::open_read_only(&args.target.db)?;
    store
        .verify_tables(&schema)
        .with_context(|| format!("Inspecting tables in {:?}", args.target.db))?;

    if args.staging {
        let mut records = store.staged_records(&schema)?;
        records.truncate(args.rows);
        if args.json {
            let rows = records
                .iter()
                .map(|record| {
                    schema
                        .headers()
                        .into_iter()
                        .zip(record.fields.iter().cloned().map(serde_json::Value::String))
                        .collect::<serde_json::Map<_, _>>()
                })
                .collect::<Vec<_>>();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            print!("{}", table::render_raw_records(&schema, &records));
        }
        info!(
            "Displayed {} staged row(s) from '{}'",
            records.len(),
            schema.staging_table
        );
        return Ok(());
    }

    let rows = store.target_rows(&schema, Some(args.rows))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows_to_json(&schema, &rows))?);
    } else {
        print!("{}", table::render_typed_rows(&schema, &rows));
    }
    info!(
        "Displayed {} row(s) from '{}'",
        rows.len(),
        schema.target_table
    );
    Ok(())
}

pub fn rows_to_json(schema: &Schema, rows: &[TypedRow]) -> serde_json::Value {
    let objects = rows
        .iter()
        .map(|row| {
            let object = schema
                .columns
                .iter()
                .zip(row)
                .map(|(column, cell)| {
                    let value = cell
                        .as_ref()
                        .map(|value| value.to_json())
                        .unwrap_or(serde_json::Value::Null);
                    (column.name.clone(), value)
                })
                .collect::<serde_json::Map<_, _>>();
            serde_json::Value::Object(object)
        })
        .collect();
    serde_json::Value::Array(objects)
}
