use std::borrow::Cow;
use std::fmt::Write as _;

use crate::{
    data::{TypedRow, display_cell},
    schema::Schema,
    staging::RawRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Right,
}

/// Renders typed target rows; numeric columns are right-aligned and absent
/// cells print as `NULL`.
pub fn render_typed_rows(schema: &Schema, rows: &[TypedRow]) -> String {
    let aligns = schema
        .columns
        .iter()
        .map(|column| {
            if column.datatype.is_numeric() {
                Align::Right
            } else {
                Align::Left
            }
        })
        .collect::<Vec<_>>();
    let cells = rows
        .iter()
        .map(|row| row.iter().map(|cell| display_cell(cell.as_ref())).collect())
        .collect::<Vec<Vec<String>>>();
    render(&schema.headers(), &aligns, &cells)
}

/// Renders staged text exactly as stored, left-aligned.
pub fn render_raw_records(schema: &Schema, records: &[RawRecord]) -> String {
    let aligns = vec![Align::Left; schema.columns.len()];
    let cells = records
        .iter()
        .map(|record| record.fields.clone())
        .collect::<Vec<_>>();
    render(&schema.headers(), &aligns, &cells)
}

fn render(headers: &[String], aligns: &[Align], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(sanitize_cell(cell).chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, aligns));
    let rule = widths.iter().map(|w| "-".repeat((*w).max(1))).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths, aligns));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, aligns));
    }
    output
}

fn format_row(values: &[String], widths: &[usize], aligns: &[Align]) -> String {
    let cells = values
        .iter()
        .zip(widths)
        .zip(aligns)
        .map(|((value, width), align)| {
            let cell = sanitize_cell(value);
            match align {
                Align::Left => format!("{cell:<width$}"),
                Align::Right => format!("{cell:>width$}"),
            }
        })
        .collect::<Vec<_>>();
    cells.join("  ").trim_end().to_string()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
