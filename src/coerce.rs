//! Best-effort type coercion of staged text into typed rows.
//!
//! A [`CoercionTable`] pairs every schema column with the parse function of
//! its target type. Fields are coerced one at a time with no cross-field
//! checks:
//!
//! - text columns pass through untouched, so an empty cell stays empty text;
//! - for every other type an empty (or whitespace-only) cell becomes absent
//!   without a parse attempt;
//! - a parse failure also becomes absent and is recorded as a
//!   [`CoercionFailure`], never aborting the row.
//!
//! A literal zero is a value like any other and is kept.

use std::collections::BTreeMap;

use anyhow::Result;
use log::{debug, info};
use serde::Serialize;

use crate::{
    data::{TypedRow, Value, parse_float, parse_integer, parse_naive_date, parse_naive_time},
    schema::{ColumnType, Schema},
    staging::RawRecord,
};

type ParseFn = fn(&str) -> Result<Value>;

#[derive(Debug, Clone)]
pub struct ColumnRule {
    pub name: String,
    pub datatype: ColumnType,
    parse: Option<ParseFn>,
}

impl ColumnRule {
    pub fn new(name: &str, datatype: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            datatype,
            parse: parser_for(datatype),
        }
    }

    /// Coerces one field; `Err` carries the reason the cast was abandoned.
    pub fn apply(&self, raw: &str) -> Result<Option<Value>, String> {
        let Some(parse) = self.parse else {
            return Ok(Some(Value::Text(raw.to_string())));
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        parse(trimmed).map(Some).map_err(|err| err.to_string())
    }
}

fn parser_for(datatype: ColumnType) -> Option<ParseFn> {
    let parse: ParseFn = match datatype {
        ColumnType::Text => return None,
        ColumnType::Integer => integer_cell,
        ColumnType::Float => float_cell,
        ColumnType::Date => date_cell,
        ColumnType::Time => time_cell,
    };
    Some(parse)
}

fn integer_cell(text: &str) -> Result<Value> {
    parse_integer(text).map(Value::Integer)
}

fn float_cell(text: &str) -> Result<Value> {
    parse_float(text).map(Value::Float)
}

fn date_cell(text: &str) -> Result<Value> {
    parse_naive_date(text).map(Value::Date)
}

fn time_cell(text: &str) -> Result<Value> {
    parse_naive_time(text).map(Value::Time)
}

/// A field whose text could not be cast; the field was stored as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoercionFailure {
    /// 1-based position of the record within the staged batch.
    pub record: usize,
    pub column: String,
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct CoercionOutcome {
    pub rows: Vec<TypedRow>,
    pub failures: Vec<CoercionFailure>,
    pub absent_by_column: BTreeMap<String, usize>,
}

impl CoercionOutcome {
    pub fn absent_total(&self) -> usize {
        self.absent_by_column.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct CoercionTable {
    rules: Vec<ColumnRule>,
}

impl CoercionTable {
    pub fn from_schema(schema: &Schema) -> Self {
        let rules = schema
            .columns
            .iter()
            .map(|column| ColumnRule::new(&column.name, column.datatype))
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[ColumnRule] {
        &self.rules
    }

    /// Coerces one record, appending any cast failures to `failures`.
    pub fn coerce_record(
        &self,
        record_number: usize,
        raw: &RawRecord,
        failures: &mut Vec<CoercionFailure>,
    ) -> TypedRow {
        self.rules
            .iter()
            .enumerate()
            .map(|(idx, rule)| {
                let text = raw.field(idx);
                match rule.apply(text) {
                    Ok(value) => value,
                    Err(reason) => {
                        debug!(
                            "Record {record_number} column '{}': '{}' stored as absent ({reason})",
                            rule.name, text
                        );
                        failures.push(CoercionFailure {
                            record: record_number,
                            column: rule.name.clone(),
                            raw: text.to_string(),
                            reason,
                        });
                        None
                    }
                }
            })
            .collect()
    }

    pub fn coerce_all(&self, records: &[RawRecord]) -> CoercionOutcome {
        let mut outcome = CoercionOutcome {
            rows: Vec::with_capacity(records.len()),
            ..CoercionOutcome::default()
        };
        for (idx, record) in records.iter().enumerate() {
            let row = self.coerce_record(idx + 1, record, &mut outcome.failures);
            for (rule, cell) in self.rules.iter().zip(&row) {
                if cell.is_none() {
                    *outcome.absent_by_column.entry(rule.name.clone()).or_insert(0) += 1;
                }
            }
            outcome.rows.push(row);
        }
        if !outcome.failures.is_empty() {
            info!(
                "{} field(s) could not be cast and were stored as absent",
                outcome.failures.len()
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use proptest::prelude::*;

    fn sales_table() -> CoercionTable {
        CoercionTable::from_schema(&Schema::sales())
    }

    fn coerce(fields: &[&str]) -> (TypedRow, Vec<CoercionFailure>) {
        let mut failures = Vec::new();
        let row = sales_table().coerce_record(1, &RawRecord::new(fields.iter().copied()), &mut failures);
        (row, failures)
    }

    #[test]
    fn coerces_reference_row_with_absent_cells() {
        let (row, failures) = coerce(&[
            "T1",
            "2024-01-05",
            "14:30:00",
            "",
            "M",
            "",
            "Electronics",
            "2",
            "",
            "",
            "199.98",
        ]);
        assert!(failures.is_empty());
        assert_eq!(row[0], Some(Value::Text("T1".into())));
        assert_eq!(
            row[1],
            Some(Value::Date(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap()))
        );
        assert_eq!(
            row[2],
            Some(Value::Time(NaiveTime::from_hms_opt(14, 30, 0).unwrap()))
        );
        assert_eq!(row[3], None);
        assert_eq!(row[5], None);
        assert_eq!(row[7], Some(Value::Integer(2)));
        assert_eq!(row[8], None);
        assert_eq!(row[9], None);
        assert_eq!(row[10], Some(Value::Float(199.98)));
    }

    #[test]
    fn malformed_date_becomes_absent_and_is_recorded() {
        let (row, failures) = coerce(&["T2", "not-a-date", "", "", "", "", "", "", "", "", ""]);
        assert_eq!(row[1], None);
        assert_eq!(row[0], Some(Value::Text("T2".into())));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].column, "sale_date");
        assert_eq!(failures[0].raw, "not-a-date");
    }

    #[test]
    fn text_columns_keep_empty_text() {
        let (row, failures) = coerce(&["", "", "", "", "", "", "", "", "", "", ""]);
        assert!(failures.is_empty());
        assert_eq!(row[0], Some(Value::Text(String::new())));
        assert_eq!(row[4], Some(Value::Text(String::new())));
        assert_eq!(row[6], Some(Value::Text(String::new())));
        assert!(row.iter().enumerate().all(|(idx, cell)| {
            matches!(idx, 0 | 4 | 6) || cell.is_none()
        }));
    }

    #[test]
    fn literal_zero_is_preserved() {
        let (row, _) = coerce(&["T3", "", "", "0", "", "0", "", "0", "0", "0.00", "0"]);
        assert_eq!(row[3], Some(Value::Integer(0)));
        assert_eq!(row[5], Some(Value::Integer(0)));
        assert_eq!(row[8], Some(Value::Float(0.0)));
        assert_eq!(row[9], Some(Value::Float(0.0)));
    }

    #[test]
    fn apply_treats_blank_as_absent_except_text() {
        let age = ColumnRule::new("age", ColumnType::Integer);
        let sold_on = ColumnRule::new("sale_date", ColumnType::Date);
        let gender = ColumnRule::new("gender", ColumnType::Text);
        assert_eq!(age.apply("").unwrap(), None);
        assert_eq!(sold_on.apply("   ").unwrap(), None);
        assert_eq!(gender.apply("").unwrap(), Some(Value::Text(String::new())));
        assert_eq!(gender.apply(" F ").unwrap(), Some(Value::Text(" F ".into())));
        assert_eq!(age.apply(" 34 ").unwrap(), Some(Value::Integer(34)));
    }

    #[test]
    fn apply_rejects_non_finite_floats() {
        let rule = ColumnRule::new("price_per_unit", ColumnType::Float);
        assert!(rule.apply("NaN").is_err());
        assert!(rule.apply("inf").is_err());
        assert_eq!(rule.apply("0.0").unwrap(), Some(Value::Float(0.0)));
    }

    #[test]
    fn coerce_all_counts_absent_cells_per_column() {
        let records = vec![
            RawRecord::new(["T1", "", "", "1", "", "", "", "", "", "", ""]),
            RawRecord::new(["T2", "x", "", "", "", "", "", "", "", "", ""]),
        ];
        let outcome = sales_table().coerce_all(&records);
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.absent_by_column["sale_date"], 2);
        assert_eq!(outcome.absent_by_column["customer_id"], 1);
        assert!(!outcome.absent_by_column.contains_key("transaction_id"));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].record, 2);
    }

    proptest! {
        #[test]
        fn empty_or_blank_never_yields_a_value(blank in "[ \t]{0,4}") {
            for rule in sales_table().rules() {
                let result = rule.apply(&blank).unwrap();
                if rule.datatype == ColumnType::Text {
                    prop_assert_eq!(result, Some(Value::Text(blank.clone())));
                } else {
                    prop_assert_eq!(result, None);
                }
            }
        }

        #[test]
        fn integers_round_trip_through_canonical_text(n in any::<i64>()) {
            let rule = ColumnRule::new("quantity", ColumnType::Integer);
            let value = rule.apply(&n.to_string()).unwrap().unwrap();
            prop_assert_eq!(value.as_display(), n.to_string());
        }

        #[test]
        fn finite_floats_round_trip_through_canonical_text(f in -1.0e12f64..1.0e12f64) {
            let rule = ColumnRule::new("total_sale", ColumnType::Float);
            let value = rule.apply(&f.to_string()).unwrap().unwrap();
            prop_assert_eq!(value, Value::Float(f));
        }

        #[test]
        fn dates_round_trip_through_canonical_text(days in 0i64..80_000) {
            let date = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap() + chrono::Days::new(days as u64);
            let text = date.format("%Y-%m-%d").to_string();
            let rule = ColumnRule::new("sale_date", ColumnType::Date);
            let value = rule.apply(&text).unwrap().unwrap();
            prop_assert_eq!(value.as_display(), text);
        }

        #[test]
        fn unparseable_numbers_are_absorbed(garbage in "[a-zA-Z]{1,8}") {
            let rule = ColumnRule::new("age", ColumnType::Integer);
            prop_assert!(rule.apply(&garbage).is_err());
            let mut failures = Vec::new();
            let table = CoercionTable { rules: vec![rule] };
            let row = table.coerce_record(1, &RawRecord::new([garbage.as_str()]), &mut failures);
            prop_assert_eq!(row, vec![None]);
            prop_assert_eq!(failures.len(), 1);
        }
    }
}
