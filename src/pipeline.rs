//! The import run: `Empty → Staged → Coerced → Loaded → Empty`.
//!
//! [`ImportPipeline`] holds the store by exclusive borrow for the whole run.
//! A failure while staging leaves the previous staging contents in place; a
//! failure while coercing or loading leaves the freshly staged rows in place
//! so they can be inspected or retried with [`ImportPipeline::resume`].

use std::collections::BTreeMap;

use log::{info, warn};
use serde::Serialize;

use crate::{
    coerce::{CoercionOutcome, CoercionTable},
    error::ImportError,
    schema::Schema,
    staging::StagingLoader,
    store::{LoadMode, Store},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Empty,
    Staged,
    Coerced,
    Loaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub source: Option<String>,
    pub target_table: String,
    pub mode: LoadMode,
    pub rows_staged: usize,
    pub rows_loaded: usize,
    pub coercion_failures: usize,
    pub absent_by_column: BTreeMap<String, usize>,
    pub staging_reclaimed: bool,
}

pub struct ImportPipeline<'a, S: Store + ?Sized> {
    store: &'a mut S,
    schema: &'a Schema,
    table: CoercionTable,
    mode: LoadMode,
    reclaim: bool,
    state: PipelineState,
}

impl<'a, S: Store + ?Sized> ImportPipeline<'a, S> {
    pub fn new(store: &'a mut S, schema: &'a Schema) -> Self {
        Self {
            store,
            schema,
            table: CoercionTable::from_schema(schema),
            mode: LoadMode::default(),
            reclaim: true,
            state: PipelineState::Empty,
        }
    }

    pub fn with_mode(mut self, mode: LoadMode) -> Self {
        self.mode = mode;
        self
    }

    /// Keeps staged rows after a successful load instead of clearing them.
    pub fn keep_staging(mut self, keep: bool) -> Self {
        self.reclaim = !keep;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        info!("Pipeline {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Runs the whole cycle from the CSV file read by `loader`.
    pub fn run(&mut self, loader: &StagingLoader) -> Result<ImportReport, ImportError> {
        loader.stage(&mut *self.store, self.schema)?;
        self.transition(PipelineState::Staged);
        let mut report = self.finish(true)?;
        report.source = Some(loader.path().display().to_string());
        Ok(report)
    }

    /// Runs the cycle against rows already in the staging table.
    pub fn resume(&mut self) -> Result<ImportReport, ImportError> {
        self.store.ensure_tables(self.schema)?;
        self.transition(PipelineState::Staged);
        self.finish(false)
    }

    fn finish(&mut self, from_csv: bool) -> Result<ImportReport, ImportError> {
        let records = self.store.staged_records(self.schema)?;
        if records.is_empty() && !from_csv {
            warn!(
                "Staging table '{}' is empty; target left unchanged",
                self.schema.staging_table
            );
            self.transition(PipelineState::Empty);
            return Ok(self.report(0, &CoercionOutcome::default(), 0, false));
        }

        let outcome = self.table.coerce_all(&records);
        info!(
            "Coerced {} row(s); {} cell(s) absent",
            outcome.rows.len(),
            outcome.absent_total()
        );
        self.transition(PipelineState::Coerced);

        let loaded = self
            .store
            .load_target(self.schema, &outcome.rows, self.mode)
            .inspect_err(|err| {
                warn!(
                    "Load into '{}' failed ({}); {} staged row(s) kept for inspection",
                    self.schema.target_table,
                    err,
                    records.len()
                )
            })?;
        self.transition(PipelineState::Loaded);
        info!(
            "Loaded {loaded} row(s) into '{}' via {} ({:?} mode)",
            self.schema.target_table,
            self.store.describe(),
            self.mode
        );

        let reclaimed = if self.reclaim {
            let removed = self.store.clear_staging(self.schema)?;
            info!(
                "Reclaimed {removed} row(s) from '{}'",
                self.schema.staging_table
            );
            self.transition(PipelineState::Empty);
            true
        } else {
            false
        };
        Ok(self.report(records.len(), &outcome, loaded, reclaimed))
    }

    fn report(
        &self,
        staged: usize,
        outcome: &CoercionOutcome,
        loaded: usize,
        reclaimed: bool,
    ) -> ImportReport {
        ImportReport {
            source: None,
            target_table: self.schema.target_table.clone(),
            mode: self.mode,
            rows_staged: staged,
            rows_loaded: loaded,
            coercion_failures: outcome.failures.len(),
            absent_by_column: outcome.absent_by_column.clone(),
            staging_reclaimed: reclaimed,
        }
    }
}

/// Standalone reclaim; clearing an already empty staging table is a no-op.
pub fn reclaim_staging<S: Store + ?Sized>(
    store: &mut S,
    schema: &Schema,
) -> Result<usize, ImportError> {
    store.ensure_tables(schema)?;
    let removed = store.clear_staging(schema)?;
    info!(
        "Reclaimed {removed} row(s) from '{}'",
        schema.staging_table
    );
    Ok(removed)
}
