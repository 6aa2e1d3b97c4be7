use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, warn};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};

use crate::dates::{format_date, parse_date};
use crate::report::{Row, Source, TableKind, Value};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ArcStatsSource (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    dcid TEXT NOT NULL,
    description TEXT
);
CREATE TABLE IF NOT EXISTS ArcStatsSummary (
    start_day DATE NOT NULL,
    source INTEGER NOT NULL,
    requests INTEGER,
    requests_with_errors INTEGER,
    error_count INTEGER,
    users INTEGER,
    stations INTEGER,
    total_lines INTEGER,
    total_size INTEGER,
    PRIMARY KEY (start_day, source)
);
CREATE TABLE IF NOT EXISTS ArcStatsUser (
    start_day DATE NOT NULL, source INTEGER NOT NULL, userID TEXT,
    requests INTEGER, lines INTEGER, errors INTEGER, size
);
CREATE TABLE IF NOT EXISTS ArcStatsRequest (
    start_day DATE NOT NULL, source INTEGER NOT NULL, type TEXT,
    requests INTEGER, lines INTEGER, nodata INTEGER, errors INTEGER, size
);
CREATE TABLE IF NOT EXISTS ArcStatsVolume (
    start_day DATE NOT NULL, source INTEGER NOT NULL, type TEXT,
    requests INTEGER, lines INTEGER, errors INTEGER, size
);
CREATE TABLE IF NOT EXISTS ArcStatsStation (
    start_day DATE NOT NULL, source INTEGER NOT NULL,
    streamID_networkCode TEXT, streamID_stationCode TEXT,
    stationID_locationCode TEXT, stationID_channelCode TEXT,
    requests INTEGER, lines INTEGER, errors INTEGER, size, time TEXT
);
CREATE TABLE IF NOT EXISTS ArcStatsNetwork (
    start_day DATE NOT NULL, source INTEGER NOT NULL, networkCode TEXT,
    requests INTEGER, lines INTEGER, nodata INTEGER, errors INTEGER, size, time TEXT
);
CREATE TABLE IF NOT EXISTS ArcStatsMessages (
    start_day DATE NOT NULL, source INTEGER NOT NULL, message TEXT, count INTEGER
);
CREATE TABLE IF NOT EXISTS ArcStatsUserIP (
    start_day DATE NOT NULL, source INTEGER NOT NULL, userIP TEXT,
    requests INTEGER, lines INTEGER, errors INTEGER, size
);
CREATE TABLE IF NOT EXISTS ArcStatsClientIP (
    start_day DATE NOT NULL, source INTEGER NOT NULL, clientIP TEXT,
    requests INTEGER, lines INTEGER, errors INTEGER, size
);
"#;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database {} not found or is corrupted", path.display())]
    Unavailable { path: PathBuf },
    #[error("cannot open database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("{source} (command: {statement})")]
    Query {
        statement: String,
        source: rusqlite::Error,
    },
}

impl StoreError {
    /// True for failures that leave no database to report from.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StoreError::Query { .. })
    }
}

/// Structured row selection; values are always bound as parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFilter {
    pub first_day: Option<NaiveDate>,
    pub last_day: Option<NaiveDate>,
    pub source: Option<i64>,
    pub network: Option<String>,
}

impl RowFilter {
    pub fn day(day: NaiveDate) -> Self {
        Self::days(day, day)
    }

    pub fn days(first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            first_day: Some(first),
            last_day: Some(last),
            ..Self::default()
        }
    }

    pub fn with_source(mut self, source: i64) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_network(mut self, code: impl Into<String>) -> Self {
        self.network = Some(code.into());
        self
    }

    fn where_clause(&self) -> (String, Vec<SqlValue>) {
        let mut terms = Vec::new();
        let mut values = Vec::new();
        if let Some(first) = self.first_day {
            terms.push("`start_day` >= ?");
            values.push(SqlValue::Text(format_date(first)));
        }
        if let Some(last) = self.last_day {
            terms.push("`start_day` <= ?");
            values.push(SqlValue::Text(format_date(last)));
        }
        if let Some(source) = self.source {
            terms.push("`source` = ?");
            values.push(SqlValue::Integer(source));
        }
        if let Some(code) = &self.network {
            terms.push("`networkCode` = ?");
            values.push(SqlValue::Text(code.clone()));
        }
        if terms.is_empty() {
            (String::new(), values)
        } else {
            (format!(" WHERE {}", terms.join(" AND ")), values)
        }
    }
}

/// Read access to the request statistics.
pub trait ReportStore {
    fn sources(&self) -> Result<Vec<Source>, StoreError>;

    /// Rows of one statistics table, ordered by `order_by`.
    fn fetch_rows(
        &self,
        kind: TableKind,
        filter: &RowFilter,
        order_by: &[&str],
    ) -> Result<Vec<Row>, StoreError>;

    /// Whether `source` has a summary row for `day`.
    fn has_report(&self, day: NaiveDate, source: i64) -> Result<bool, StoreError>;

    /// All (source id, day) pairs with a summary row in the range.
    fn report_days(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<HashSet<(i64, NaiveDate)>, StoreError>;
}

/// Read-only view of one statistics database file.
pub struct SqliteStore {
    conn: Connection,
    modified: Option<DateTime<Utc>>,
}

impl SqliteStore {
    /// Open an existing database. A missing file is never created here.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Err(StoreError::Unavailable {
                path: path.to_path_buf(),
            });
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        // SQLite reads the file lazily; touch the schema to reject non-databases.
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))
            .map_err(|source| StoreError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let modified = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        Ok(Self { conn, modified })
    }

    /// Modification time of the file when it was opened.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    pub fn timestamp(&self) -> Option<String> {
        self.modified()
            .map(|when| when.format("%Y %b %d %H:%M:%S").to_string())
    }

    fn query(&self, statement: &str, values: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
        debug!("SQL: {statement}");
        query_rows(&self.conn, statement, values).map_err(|source| StoreError::Query {
            statement: statement.to_string(),
            source,
        })
    }
}

fn query_rows(conn: &Connection, statement: &str, values: &[SqlValue]) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(statement)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| row_to_map(row, &names))?;
    let mut collected = Vec::new();
    for row in rows {
        collected.push(row?);
    }
    Ok(collected)
}

fn row_to_map(row: &rusqlite::Row, names: &[String]) -> rusqlite::Result<Row> {
    let mut map = Row::new();
    for (idx, name) in names.iter().enumerate() {
        let value = match row.get_ref(idx)? {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(value) => Value::Integer(value),
            ValueRef::Real(value) => Value::Real(value),
            ValueRef::Text(text) => Value::Text(String::from_utf8_lossy(text).into_owned()),
            ValueRef::Blob(blob) => Value::Text(format!("<{} bytes>", blob.len())),
        };
        map.insert(name.clone(), value);
    }
    Ok(map)
}

fn text_cell(row: &Row, column: &str) -> String {
    row.get(column).map(ToString::to_string).unwrap_or_default()
}

fn int_cell(row: &Row, column: &str) -> Option<i64> {
    match row.get(column)? {
        Value::Integer(value) => Some(*value),
        Value::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

impl ReportStore for SqliteStore {
    fn sources(&self) -> Result<Vec<Source>, StoreError> {
        let rows = self.query(
            "SELECT `id`, `host`, `port`, `dcid` FROM `ArcStatsSource` ORDER BY `id`",
            &[],
        )?;
        let mut sources = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(id) = int_cell(&row, "id") else {
                warn!("Skipping source row without an id: {row:?}");
                continue;
            };
            sources.push(Source {
                id,
                host: text_cell(&row, "host"),
                port: int_cell(&row, "port").unwrap_or_default(),
                dcid: text_cell(&row, "dcid"),
            });
        }
        Ok(sources)
    }

    fn fetch_rows(
        &self,
        kind: TableKind,
        filter: &RowFilter,
        order_by: &[&str],
    ) -> Result<Vec<Row>, StoreError> {
        let header = kind.header();
        let order: Vec<String> = order_by
            .iter()
            .filter(|col| {
                let known = header.contains(*col);
                if !known {
                    warn!("Ignoring unknown sort column {col} for {kind}");
                }
                known
            })
            .map(|col| format!("`{col}`"))
            .collect();
        let (where_clause, values) = filter.where_clause();
        let mut statement = format!("SELECT * FROM `{}`{where_clause}", kind.physical_name());
        if !order.is_empty() {
            statement.push_str(" ORDER BY ");
            statement.push_str(&order.join(", "));
        }
        self.query(&statement, &values)
    }

    fn has_report(&self, day: NaiveDate, source: i64) -> Result<bool, StoreError> {
        let rows = self.query(
            "SELECT COUNT(*) AS `reports` FROM `ArcStatsSummary` WHERE `start_day` = ? AND `source` = ?",
            &[SqlValue::Text(format_date(day)), SqlValue::Integer(source)],
        )?;
        Ok(rows
            .first()
            .and_then(|row| int_cell(row, "reports"))
            .unwrap_or(0)
            > 0)
    }

    fn report_days(
        &self,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<HashSet<(i64, NaiveDate)>, StoreError> {
        let rows = self.query(
            "SELECT DISTINCT `source`, `start_day` FROM `ArcStatsSummary` WHERE `start_day` >= ? AND `start_day` <= ?",
            &[SqlValue::Text(format_date(first)), SqlValue::Text(format_date(last))],
        )?;
        let mut days = HashSet::with_capacity(rows.len());
        for row in rows {
            let day = parse_date(&text_cell(&row, "start_day"));
            match (int_cell(&row, "source"), day) {
                (Some(source), Ok(day)) => {
                    days.insert((source, day));
                }
                _ => warn!("Skipping malformed summary row: {row:?}"),
            }
        }
        Ok(days)
    }
}

/// Create a statistics database with empty tables if it does not exist yet.
pub fn init_db_connection(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

pub fn init_db(db_path: &Path) -> Result<()> {
    init_db_connection(db_path).map(|_| ())
}

/// Id of the source with this host, port and dcid, registering it if new.
pub fn lookup_source(conn: &Connection, host: &str, port: i64, dcid: &str) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM ArcStatsSource WHERE host = ? AND port = ? AND dcid = ?",
            params![host, port, dcid],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO ArcStatsSource (host, port, dcid) VALUES (?, ?, ?)",
        params![host, port, dcid],
    )?;
    Ok(conn.last_insert_rowid())
}
