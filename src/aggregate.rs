use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::warn;
use serde::{Serialize, Serializer};

use crate::report::{Row, Table, Value};
use crate::units::{format_bytes, has_byte_unit, try_parse_bytes};

/// Total of one summable column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnSum {
    Count(i64),
    /// Total of a column holding fractional numbers.
    Real(f64),
    /// Byte total of a column holding unit strings such as "1.5 MiB".
    Bytes(u64),
}

impl fmt::Display for ColumnSum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSum::Count(total) => write!(f, "{total}"),
            ColumnSum::Real(total) => write!(f, "{total}"),
            ColumnSum::Bytes(total) => f.write_str(&format_bytes(*total)),
        }
    }
}

impl Serialize for ColumnSum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ColumnSum::Count(total) => serializer.serialize_i64(*total),
            ColumnSum::Real(total) => serializer.serialize_f64(*total),
            ColumnSum::Bytes(_) => serializer.serialize_str(&self.to_string()),
        }
    }
}

impl From<ColumnSum> for Value {
    fn from(sum: ColumnSum) -> Self {
        match sum {
            ColumnSum::Count(total) => Value::Integer(total),
            ColumnSum::Real(total) => Value::Real(total),
            ColumnSum::Bytes(_) => Value::Text(sum.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ColumnSums(BTreeMap<String, ColumnSum>);

impl ColumnSums {
    pub fn get(&self, column: &str) -> Option<&ColumnSum> {
        self.0.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnSum)> {
        self.0.iter().map(|(column, sum)| (column.as_str(), sum))
    }
}

/// Total the given columns over the data rows of `table`.
pub fn sum_columns(table: &Table, columns: &BTreeSet<String>) -> ColumnSums {
    sum_rows(&table.rows, columns)
}

/// Total the given columns over `rows`.
///
/// A column is byte-valued when any of its cells carries a unit suffix; every
/// cell of such a column is converted to bytes before adding and the total is
/// reported in bytes. Other columns add their plain numbers, as floats when
/// any cell is fractional. Integer totals saturate instead of overflowing.
/// Cells that are absent or not numeric add nothing.
pub fn sum_rows(rows: &[Row], columns: &BTreeSet<String>) -> ColumnSums {
    let mut sums = BTreeMap::new();
    for column in columns {
        let cells = rows.iter().filter_map(|row| row.get(column));
        let byte_valued = cells
            .clone()
            .any(|cell| matches!(cell, Value::Text(text) if has_byte_unit(text)));
        let sum = if byte_valued {
            ColumnSum::Bytes(
                cells
                    .map(|cell| cell_bytes(column, cell))
                    .fold(0, u64::saturating_add),
            )
        } else if cells.clone().any(is_fractional) {
            ColumnSum::Real(cells.map(cell_real).sum())
        } else {
            ColumnSum::Count(cells.map(cell_number).fold(0, i64::saturating_add))
        };
        sums.insert(column.clone(), sum);
    }
    ColumnSums(sums)
}

fn cell_bytes(column: &str, cell: &Value) -> u64 {
    match cell {
        Value::Integer(value) => u64::try_from(*value).unwrap_or(0),
        Value::Real(value) if *value > 0.0 => value.round() as u64,
        Value::Text(text) => try_parse_bytes(text).unwrap_or_else(|err| {
            warn!("Column {column}: {err}; counted as 0");
            0
        }),
        _ => 0,
    }
}

fn is_fractional(cell: &Value) -> bool {
    match cell {
        Value::Real(value) => value.fract() != 0.0,
        Value::Text(text) => {
            let text = text.trim();
            text.parse::<i64>().is_err()
                && text.parse::<f64>().is_ok_and(|value| value.fract() != 0.0)
        }
        _ => false,
    }
}

fn cell_real(cell: &Value) -> f64 {
    match cell {
        Value::Integer(value) => *value as f64,
        Value::Real(value) => *value,
        Value::Text(text) => text.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn cell_number(cell: &Value) -> i64 {
    match cell {
        Value::Integer(value) => *value,
        Value::Real(value) => value.round() as i64,
        Value::Text(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(|value| value.round() as i64))
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Collapse `rows` into one row per distinct `key`, in key order.
///
/// Each output row holds the key, the number of rows folded into it under
/// `count_column`, and the totals of `columns`.
pub fn totals_by(rows: &[Row], key: &str, count_column: &str, columns: &[&str]) -> Vec<Row> {
    let mut groups: BTreeMap<String, Vec<Row>> = BTreeMap::new();
    for row in rows {
        let group = row.get(key).map(ToString::to_string).unwrap_or_default();
        groups.entry(group).or_default().push(row.clone());
    }

    let columns: BTreeSet<String> = columns.iter().map(|col| col.to_string()).collect();
    groups
        .into_iter()
        .map(|(group, members)| {
            let mut total = Row::new();
            total.insert(key.to_string(), Value::Text(group));
            total.insert(count_column.to_string(), Value::Integer(members.len() as i64));
            for (column, sum) in sum_rows(&members, &columns).iter() {
                total.insert(column.to_string(), Value::from(*sum));
            }
            total
        })
        .collect()
}
