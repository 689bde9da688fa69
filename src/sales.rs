//! Typed view over rows of the built-in retail sales layout.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{
    data::{TypedRow, Value},
    error::ImportError,
    schema::Schema,
};

/// Column names of the retail sales export, in table order.
pub mod columns {
    pub const TRANSACTION_ID: &str = "transaction_id";
    pub const SALE_DATE: &str = "sale_date";
    pub const SALE_TIME: &str = "sale_time";
    pub const CUSTOMER_ID: &str = "customer_id";
    pub const GENDER: &str = "gender";
    pub const AGE: &str = "age";
    pub const CATEGORY: &str = "category";
    pub const QUANTITY: &str = "quantity";
    pub const PRICE_PER_UNIT: &str = "price_per_unit";
    pub const COST_OF_GOODS_SOLD: &str = "cost_of_goods_sold";
    pub const TOTAL_SALE: &str = "total_sale";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesRecord {
    pub transaction_id: String,
    pub sale_date: Option<NaiveDate>,
    pub sale_time: Option<NaiveTime>,
    pub customer_id: Option<i64>,
    pub gender: Option<String>,
    pub age: Option<i64>,
    pub category: Option<String>,
    pub quantity: Option<i64>,
    pub price_per_unit: Option<f64>,
    pub cost_of_goods_sold: Option<f64>,
    pub total_sale: Option<f64>,
}

impl SalesRecord {
    /// Builds a record from a row typed against [`Schema::sales`].
    pub fn from_typed_row(schema: &Schema, row: &TypedRow) -> Result<Self, ImportError> {
        if !schema.is_sales_layout() {
            return Err(ImportError::schema_mismatch(
                "rows do not follow the retail sales layout",
            ));
        }
        if row.len() != schema.columns.len() {
            return Err(ImportError::schema_mismatch(format!(
                "row has {} cell(s) but the sales layout has {}",
                row.len(),
                schema.columns.len()
            )));
        }
        let transaction_id = match &row[0] {
            Some(Value::Text(id)) if !id.is_empty() => id.clone(),
            _ => return Err(ImportError::load("transaction_id is absent or empty")),
        };
        Ok(SalesRecord {
            transaction_id,
            sale_date: date(&row[1]),
            sale_time: time(&row[2]),
            customer_id: integer(&row[3]),
            gender: text(&row[4]),
            age: integer(&row[5]),
            category: text(&row[6]),
            quantity: integer(&row[7]),
            price_per_unit: float(&row[8]),
            cost_of_goods_sold: float(&row[9]),
            total_sale: float(&row[10]),
        })
    }

    pub fn from_typed_rows(schema: &Schema, rows: &[TypedRow]) -> Result<Vec<Self>, ImportError> {
        rows.iter()
            .map(|row| SalesRecord::from_typed_row(schema, row))
            .collect()
    }
}

fn text(cell: &Option<Value>) -> Option<String> {
    match cell {
        Some(Value::Text(s)) => Some(s.clone()),
        _ => None,
    }
}

fn integer(cell: &Option<Value>) -> Option<i64> {
    match cell {
        Some(Value::Integer(i)) => Some(*i),
        _ => None,
    }
}

fn float(cell: &Option<Value>) -> Option<f64> {
    match cell {
        Some(Value::Float(f)) => Some(*f),
        Some(Value::Integer(i)) => Some(*i as f64),
        _ => None,
    }
}

fn date(cell: &Option<Value>) -> Option<NaiveDate> {
    match cell {
        Some(Value::Date(d)) => Some(*d),
        _ => None,
    }
}

fn time(cell: &Option<Value>) -> Option<NaiveTime> {
    match cell {
        Some(Value::Time(t)) => Some(*t),
        _ => None,
    }
}
