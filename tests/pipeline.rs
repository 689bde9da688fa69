mod common;

use chrono::{NaiveDate, NaiveTime};
use common::{TestWorkspace, fixture_path};
use retail_sales_import::{
    error::ImportError,
    pipeline::ImportPipeline,
    sales::SalesRecord,
    schema::Schema,
    staging::StagingLoader,
    store::{LoadMode, Store, sqlite::SqliteStore},
};

fn import(store: &mut SqliteStore, schema: &Schema, loader: &StagingLoader) -> Result<usize, ImportError> {
    ImportPipeline::new(store, schema)
        .run(loader)
        .map(|report| report.rows_loaded)
}

fn sales(store: &SqliteStore, schema: &Schema) -> Vec<SalesRecord> {
    let rows = store.target_rows(schema, None).expect("read target");
    SalesRecord::from_typed_rows(schema, &rows).expect("sales records")
}

#[test]
fn fixture_imports_with_absent_markers() {
    let workspace = TestWorkspace::new();
    let schema = Schema::sales();
    let mut store = SqliteStore::open(&workspace.db_path()).expect("open db");
    let loader = StagingLoader::new(fixture_path("retail_sales_sample.csv"));

    assert_eq!(import(&mut store, &schema, &loader).unwrap(), 5);
    let records = sales(&store, &schema);
    assert_eq!(records.len(), 5);

    let t1 = &records[0];
    assert_eq!(t1.transaction_id, "T1");
    assert_eq!(t1.sale_date, NaiveDate::from_ymd_opt(2024, 1, 5));
    assert_eq!(t1.sale_time, NaiveTime::from_hms_opt(14, 30, 0));
    assert_eq!(t1.customer_id, None);
    assert_eq!(t1.age, None);
    assert_eq!(t1.quantity, Some(2));
    assert_eq!(t1.price_per_unit, None);
    assert_eq!(t1.cost_of_goods_sold, None);
    assert_eq!(t1.total_sale, Some(199.98));

    assert_eq!(
        records[1].sale_time,
        NaiveTime::from_hms_milli_opt(9, 12, 45, 250)
    );
    assert_eq!(records[2].sale_date, None);
    assert_eq!(records[2].age, Some(0));
    assert_eq!(records[3].category.as_deref(), Some(""));
    assert_eq!(records[4].sale_date, NaiveDate::from_ymd_opt(2024, 3, 5));
    assert_eq!(records[4].quantity, None);

    assert!(store.staged_records(&schema).unwrap().is_empty());
}

#[test]
fn reimport_after_reclaim_is_idempotent() {
    let workspace = TestWorkspace::new();
    let schema = Schema::sales();
    let loader = StagingLoader::new(fixture_path("retail_sales_sample.csv"));

    let mut store = SqliteStore::open(&workspace.db_path()).expect("open db");
    import(&mut store, &schema, &loader).unwrap();
    let first = sales(&store, &schema);
    drop(store);

    let mut store = SqliteStore::open(&workspace.db_path()).expect("reopen db");
    import(&mut store, &schema, &loader).unwrap();
    assert_eq!(sales(&store, &schema), first);
}

#[test]
fn append_mode_rejects_reimport_and_keeps_staging() {
    let workspace = TestWorkspace::new();
    let schema = Schema::sales();
    let loader = StagingLoader::new(fixture_path("retail_sales_sample.csv"));
    let mut store = SqliteStore::open(&workspace.db_path()).expect("open db");
    import(&mut store, &schema, &loader).unwrap();

    let err = ImportPipeline::new(&mut store, &schema)
        .with_mode(LoadMode::Append)
        .run(&loader)
        .unwrap_err();
    assert!(matches!(err, ImportError::Load { .. }), "{err}");
    assert_eq!(sales(&store, &schema).len(), 5);
    assert_eq!(store.staged_records(&schema).unwrap().len(), 5);
}

#[test]
fn missing_identifier_fails_the_batch() {
    let workspace = TestWorkspace::new();
    let schema = Schema::sales();
    let csv = workspace.write_sales_csv(
        "missing_id.csv",
        &["T1,2024-01-05,,,,,,1,,,", ",2024-01-06,,,,,,1,,,"],
    );
    let mut store = SqliteStore::open(&workspace.db_path()).expect("open db");
    let err = import(&mut store, &schema, &StagingLoader::new(&csv)).unwrap_err();
    assert!(matches!(err, ImportError::Load { .. }), "{err}");
    assert!(sales(&store, &schema).is_empty());

    let staged = store.staged_records(&schema).unwrap();
    assert_eq!(staged.len(), 2);
    assert_eq!(staged[1].field(0), "");
}

#[test]
fn missing_column_leaves_target_unchanged() {
    let workspace = TestWorkspace::new();
    let schema = Schema::sales();
    let mut store = SqliteStore::open(&workspace.db_path()).expect("open db");
    import(
        &mut store,
        &schema,
        &StagingLoader::new(fixture_path("retail_sales_sample.csv")),
    )
    .unwrap();

    let narrow = workspace.write(
        "narrow.csv",
        "transaction_id,sale_date,sale_time\nT9,2024-01-01,10:00:00\n",
    );
    let err = import(&mut store, &schema, &StagingLoader::new(&narrow)).unwrap_err();
    assert!(matches!(err, ImportError::SchemaMismatch(_)), "{err}");
    assert_eq!(sales(&store, &schema).len(), 5);
}

fn table_count(path: &std::path::Path) -> i64 {
    rusqlite::Connection::open(path)
        .expect("open db")
        .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |row| {
            row.get(0)
        })
        .expect("count tables")
}

#[test]
fn rejected_csv_leaves_fresh_database_without_tables() {
    let workspace = TestWorkspace::new();
    let schema = Schema::sales();
    let narrow = workspace.write("narrow.csv", "transaction_id,sale_date\nT1,2024-01-05\n");
    let mut store = SqliteStore::open(&workspace.db_path()).expect("open db");

    let err = import(&mut store, &schema, &StagingLoader::new(&narrow)).unwrap_err();
    assert!(matches!(err, ImportError::SchemaMismatch(_)), "{err}");
    let err = import(
        &mut store,
        &schema,
        &StagingLoader::new(workspace.path().join("absent.csv")),
    )
    .unwrap_err();
    assert!(matches!(err, ImportError::Resource { .. }), "{err}");

    drop(store);
    assert_eq!(table_count(&workspace.db_path()), 0);
}

#[test]
fn retry_loads_rows_left_in_staging() {
    let workspace = TestWorkspace::new();
    let schema = Schema::sales();
    let csv = workspace.write_sales_csv("dup.csv", &["T1,,,,,,,,,,", "T1,,,,,,,,,,"]);
    let mut store = SqliteStore::open(&workspace.db_path()).expect("open db");
    assert!(import(&mut store, &schema, &StagingLoader::new(&csv)).is_err());

    // Repair the staged duplicate in place, then resume from staging.
    let mut staged = store.staged_records(&schema).unwrap();
    staged[1].fields[0] = "T2".to_string();
    store.replace_staging(&schema, &staged).unwrap();

    let report = ImportPipeline::new(&mut store, &schema).resume().unwrap();
    assert_eq!(report.rows_loaded, 2);
    assert!(store.staged_records(&schema).unwrap().is_empty());
}

#[test]
fn custom_schema_targets_other_tables() {
    let workspace = TestWorkspace::new();
    let schema_path = workspace.write(
        "returns.yml",
        "staging_table: returns_raw\ntarget_table: returns\ncolumns:\n  - name: return_id\n    datatype: text\n    required: true\n    key: true\n  - name: refunded\n    datatype: float\n",
    );
    let schema = Schema::load(&schema_path).expect("load schema");
    let csv = workspace.write("returns.csv", "return_id,refunded\nR1,12.5\nR2,\n");
    let mut store = SqliteStore::open(&workspace.db_path()).expect("open db");
    assert_eq!(import(&mut store, &schema, &StagingLoader::new(&csv)).unwrap(), 2);

    let rows = store.target_rows(&schema, None).unwrap();
    assert_eq!(rows[1][1], None);
    assert!(SalesRecord::from_typed_rows(&schema, &rows).is_err());
}
