pub mod aggregate;
pub mod availability;
pub mod cli;
pub mod config;
pub mod dates;
pub mod db;
pub mod page;
pub mod render;
pub mod report;
pub mod units;

pub use aggregate::{sum_columns, ColumnSum, ColumnSums};
pub use availability::AvailabilityMatrix;
pub use dates::{Clock, DateWindow, DayWindow, SystemClock};
pub use db::{ReportStore, RowFilter, SqliteStore, StoreError};
pub use render::{Format, TableRenderer};
pub use report::{assemble, ReportOptions, Row, Source, Table, TableKind, Value};
pub use units::{format_bytes, parse_bytes};
