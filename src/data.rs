use std::fmt;

use anyhow::{Context, Result, anyhow, ensure};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

/// Marker printed wherever a typed cell holds no value.
pub const ABSENT_MARKER: &str = "NULL";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    Time(NaiveTime),
}

/// One coerced row aligned to a schema; `None` is the absent marker.
pub type TypedRow = Vec<Option<Value>>;

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Time(t) => t.format("%H:%M:%S%.f").to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Date(_) | Value::Time(_) => serde_json::Value::String(self.as_display()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn display_cell(cell: Option<&Value>) -> String {
    cell.map(Value::as_display)
        .unwrap_or_else(|| ABSENT_MARKER.to_string())
}

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

pub fn parse_naive_time(value: &str) -> Result<NaiveTime> {
    const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];
    for fmt in TIME_FORMATS {
        if let Ok(parsed) = NaiveTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as time"))
}

pub fn parse_integer(value: &str) -> Result<i64> {
    value
        .parse()
        .with_context(|| format!("Failed to parse '{value}' as integer"))
}

pub fn parse_float(value: &str) -> Result<f64> {
    let parsed: f64 = value
        .parse()
        .with_context(|| format!("Failed to parse '{value}' as float"))?;
    ensure!(parsed.is_finite(), "Float '{value}' is not a finite number");
    Ok(parsed)
}
