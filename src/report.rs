use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::warn;
use serde::Serialize;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::aggregate::{sum_rows, ColumnSums};

/// Shown in place of a missing cell or an unknown source.
pub const PLACEHOLDER: &str = "??";

/// Label of the synthetic totals row.
pub const SUMS_LABEL: &str = "Column sums";

/// A single cell as read from the statistics database.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    /// Presence marker in calendar tables.
    Flag(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Real(value) => write!(f, "{value}"),
            Value::Text(value) => f.write_str(value),
            Value::Flag(true) => f.write_str("Y"),
            Value::Flag(false) => f.write_str("N"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Flag(value)
    }
}

static NULL_CELL: Value = Value::Null;

/// One database row, keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// A data node whose request logs feed the statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub id: i64,
    pub host: String,
    pub port: i64,
    pub dcid: String,
}

/// Source id to display code.
#[derive(Debug, Clone, Default)]
pub struct SourceLabels(BTreeMap<i64, String>);

impl SourceLabels {
    pub fn from_sources(sources: &[Source]) -> Self {
        Self(
            sources
                .iter()
                .map(|source| (source.id, source.dcid.clone()))
                .collect(),
        )
    }

    pub fn get(&self, id: i64) -> Option<&str> {
        self.0.get(&id).map(String::as_str)
    }

    /// Label for a raw `source` cell, or the placeholder when unknown.
    pub fn label(&self, raw: &Value) -> Value {
        let id = match raw {
            Value::Integer(id) => Some(*id),
            Value::Text(text) => text.trim().parse().ok(),
            _ => None,
        };
        match id.and_then(|id| self.get(id)) {
            Some(label) => Value::Text(label.to_string()),
            None => {
                warn!("No source label for id {raw:?}");
                Value::from(PLACEHOLDER)
            }
        }
    }
}

/// Presentation settings for one table. Built per table, never shared.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportOptions {
    /// Columns that get a total in the sums row.
    pub summable: BTreeSet<String>,
    /// Link template for `networkCode` cells; `{code}` is replaced by the cell.
    pub link_codes: Option<String>,
    /// Header label to link target.
    pub header_links: BTreeMap<String, String>,
}

impl ReportOptions {
    pub fn summing<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            summable: columns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_code_links(mut self, template: impl Into<String>) -> Self {
        self.link_codes = Some(template.into());
        self
    }
}

/// Header plus rows, ready for a renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sums: Option<ColumnSums>,
}

impl Table {
    pub fn new<S: Into<String>>(name: impl Into<String>, header: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            header: header.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            sums: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cells of `row` in header order.
    pub fn cells<'a>(&'a self, row: &'a Row) -> impl Iterator<Item = &'a Value> + 'a {
        self.header.iter().map(move |col| row.get(col).unwrap_or(&NULL_CELL))
    }
}

/// Build the renderable table for one report section.
///
/// Totals are taken from the raw rows before any decoration. Rows are then
/// projected onto `header`: absent cells become [`PLACEHOLDER`] and `source`
/// ids are replaced by their display code. An empty result yields a
/// header-only table without a sums row.
pub fn assemble<S: Into<String>>(
    name: impl Into<String>,
    header: impl IntoIterator<Item = S>,
    rows: Vec<Row>,
    options: &ReportOptions,
    labels: &SourceLabels,
) -> Table {
    let mut table = Table::new(name, header);
    if !rows.is_empty() && !options.summable.is_empty() {
        table.sums = Some(sum_rows(&rows, &options.summable));
    }
    table.rows = rows
        .into_iter()
        .map(|mut raw| {
            table
                .header
                .iter()
                .map(|col| {
                    let cell = match raw.remove(col) {
                        Some(value) if col == "source" => labels.label(&value),
                        Some(value) => value,
                        None => Value::from(PLACEHOLDER),
                    };
                    (col.clone(), cell)
                })
                .collect()
        })
        .collect();
    table
}

/// Statistics tables kept per data node and day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
pub enum TableKind {
    Summary,
    User,
    Request,
    Volume,
    Station,
    Network,
    Messages,
    #[strum(serialize = "UserIP")]
    UserIp,
    #[strum(serialize = "ClientIP")]
    ClientIp,
}

/// Header of the per-network monthly totals.
pub const NETWORKS_HEADER: [&str; 7] =
    ["networkCode", "days", "requests", "lines", "nodata", "errors", "size"];

const TRAFFIC_SUMS: [&str; 4] = ["requests", "lines", "errors", "size"];
const IP_SUMS: [&str; 3] = ["requests", "lines", "errors"];
const NETWORK_SUMS: [&str; 5] = ["requests", "lines", "nodata", "errors", "size"];

impl TableKind {
    pub fn header(self) -> &'static [&'static str] {
        match self {
            TableKind::Summary => &[
                "start_day",
                "source",
                "requests",
                "requests_with_errors",
                "error_count",
                "users",
                "stations",
                "total_lines",
                "total_size",
            ],
            TableKind::User => &["start_day", "source", "userID", "requests", "lines", "errors", "size"],
            TableKind::Request | TableKind::Volume => {
                &["start_day", "source", "type", "requests", "lines", "errors", "size"]
            }
            TableKind::Station => &[
                "start_day",
                "source",
                "streamID_networkCode",
                "streamID_stationCode",
                "stationID_locationCode",
                "stationID_channelCode",
                "requests",
                "lines",
                "errors",
                "size",
                "time",
            ],
            TableKind::Network => &[
                "start_day",
                "source",
                "networkCode",
                "requests",
                "lines",
                "nodata",
                "errors",
                "size",
            ],
            TableKind::Messages => &["start_day", "source", "message", "count"],
            TableKind::UserIp => &["start_day", "source", "userIP", "requests", "lines", "errors", "size"],
            TableKind::ClientIp => {
                &["start_day", "source", "clientIP", "requests", "lines", "errors", "size"]
            }
        }
    }

    pub fn summable(self) -> &'static [&'static str] {
        match self {
            TableKind::Summary => &[
                "requests",
                "requests_with_errors",
                "error_count",
                "total_lines",
                "total_size",
            ],
            TableKind::User | TableKind::Request | TableKind::Volume => &TRAFFIC_SUMS,
            TableKind::Network => &NETWORK_SUMS,
            TableKind::UserIp | TableKind::ClientIp => &IP_SUMS,
            TableKind::Station | TableKind::Messages => &[],
        }
    }

    /// Name of the backing SQLite table.
    pub fn physical_name(self) -> String {
        format!("ArcStats{self}")
    }

    /// Daily rows are ordered by the first table-specific column.
    pub fn sort_column(self) -> &'static str {
        self.header()[2]
    }

    /// Tables that reveal who asked for data.
    pub fn is_private(self) -> bool {
        matches!(self, TableKind::User | TableKind::UserIp | TableKind::ClientIp)
    }

    pub fn options(self) -> ReportOptions {
        ReportOptions::summing(self.summable().iter().copied())
    }

    /// Tables listed on the daily page, in page order.
    pub fn daily_tables(show_all: bool) -> Vec<TableKind> {
        let public = TableKind::iter()
            .filter(|kind| !kind.is_private() && *kind != TableKind::Station);
        let mut tables: Vec<TableKind> = public.collect();
        if show_all {
            tables.extend(TableKind::iter().filter(|kind| kind.is_private()));
        }
        tables
    }
}
