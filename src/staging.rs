//! Reads a CSV export into raw, all-text staging records.
//!
//! Every row is read and checked against the schema before anything is
//! handed to the store, so a bad input never leaves a half-filled staging
//! table behind.

use std::path::{Path, PathBuf};

use encoding_rs::{Encoding, UTF_8};
use log::{debug, info};

use crate::{error::ImportError, io_utils, schema::Schema, store::Store};

/// One CSV row exactly as read: same field order as the schema, no trimming,
/// empty cells kept as empty text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub fields: Vec<String>,
}

impl RawRecord {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn field(&self, index: usize) -> &str {
        self.fields.get(index).map(|s| s.as_str()).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct StagingLoader {
    path: PathBuf,
    delimiter: u8,
    encoding: &'static Encoding,
}

impl StagingLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let delimiter = io_utils::resolve_input_delimiter(&path, None);
        Self {
            path,
            delimiter,
            encoding: UTF_8,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every data row, failing on the first unreadable or misshapen one.
    pub fn read_records(&self, schema: &Schema) -> Result<Vec<RawRecord>, ImportError> {
        let path = &self.path;
        let mut reader = io_utils::open_csv_reader_from_path(path, self.delimiter)
            .map_err(|err| ImportError::resource(format!("Opening CSV input {path:?}"), err))?;
        let header_record = reader
            .byte_headers()
            .map_err(|err| classify_csv_error(path, 1, err))?
            .clone();
        let headers = io_utils::decode_record(&header_record, self.encoding).map_err(|err| {
            ImportError::resource(format!("Decoding header row of {path:?}"), err)
        })?;
        schema.validate_headers(&headers)?;
        debug!("Headers of {:?} match schema: {:?}", path, headers);

        let mut records = Vec::new();
        let mut record = csv::ByteRecord::new();
        let mut line = 1usize;
        loop {
            line += 1;
            let has_row = reader
                .read_byte_record(&mut record)
                .map_err(|err| classify_csv_error(path, line, err))?;
            if !has_row {
                break;
            }
            let fields = io_utils::decode_record(&record, self.encoding).map_err(|err| {
                ImportError::resource(format!("Decoding row {line} of {path:?}"), err)
            })?;
            records.push(RawRecord { fields });
        }
        Ok(records)
    }

    /// Replaces the staging table with the contents of the CSV file.
    ///
    /// The store is only touched once every row has been read and checked,
    /// so an unreadable or misshapen file leaves it exactly as it was.
    pub fn stage<S: Store + ?Sized>(
        &self,
        store: &mut S,
        schema: &Schema,
    ) -> Result<usize, ImportError> {
        info!(
            "Staging '{}' (delimiter '{}', encoding {})",
            self.path.display(),
            io_utils::printable_delimiter(self.delimiter),
            self.encoding.name()
        );
        let records = self.read_records(schema)?;
        store.ensure_tables(schema)?;
        store.replace_staging(schema, &records)?;
        info!(
            "Staged {} row(s) into '{}'",
            records.len(),
            schema.staging_table
        );
        Ok(records.len())
    }
}

fn classify_csv_error(path: &Path, line: usize, err: csv::Error) -> ImportError {
    if let csv::ErrorKind::UnequalLengths {
        expected_len, len, ..
    } = err.kind()
    {
        return ImportError::schema_mismatch(format!(
            "row {line} of {path:?} has {len} field(s) but the header declares {expected_len}"
        ));
    }
    ImportError::resource(format!("Reading row {line} of {path:?}"), err)
}
