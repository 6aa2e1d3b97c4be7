//! Report pages: which sections a page has and what goes into each.

use chrono::NaiveDate;
use log::{error, info};
use serde::Serialize;

use crate::aggregate::totals_by;
use crate::availability::AvailabilityMatrix;
use crate::dates::{format_date, month_end, month_label, month_start, Clock, DateWindow};
use crate::db::{ReportStore, RowFilter, StoreError};
use crate::report::{
    assemble, ReportOptions, Row, Source, SourceLabels, Table, TableKind, NETWORKS_HEADER,
};

pub const PAGE_TITLE: &str = "EIDA Arclink Request Statistics";
pub const DAILY_PAGE: &str = "reqlogdisplay";
pub const NETWORK_PAGE: &str = "reqlognetwork";
pub const DEFAULT_NETWORK: &str = "GE";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavItem {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl NavItem {
    pub fn text(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: None,
        }
    }

    pub fn link(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: Some(href.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub title: String,
    pub anchor: String,
    pub notes: Vec<String>,
    /// Set when the section's data could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub table: Table,
    pub options: ReportOptions,
}

impl Section {
    pub fn new(
        title: impl Into<String>,
        anchor: impl Into<String>,
        table: Table,
        options: ReportOptions,
    ) -> Self {
        Self {
            title: title.into(),
            anchor: anchor.into(),
            notes: Vec::new(),
            error: None,
            table,
            options,
        }
    }

    pub fn failed(
        title: impl Into<String>,
        anchor: impl Into<String>,
        table: Table,
        error: String,
    ) -> Self {
        Self {
            error: Some(error),
            ..Self::new(title, anchor, table, ReportOptions::default())
        }
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub title: String,
    /// When the database file was last modified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    pub navigation: Vec<NavItem>,
    pub sections: Vec<Section>,
}

pub fn daily_href(day: NaiveDate) -> String {
    format!("{DAILY_PAGE}?date={}", format_date(day))
}

pub fn network_href(code: &str, day: NaiveDate) -> String {
    format!("{NETWORK_PAGE}?code={code}&date={}", format_date(day))
}

/// Network code from a request parameter: at most 8 characters, upper case,
/// letters and digits only.
pub fn clean_code(text: &str) -> String {
    text.chars()
        .take(8)
        .filter(char::is_ascii_alphanumeric)
        .map(|ch| ch.to_ascii_uppercase())
        .collect()
}

struct SourceList {
    sources: Vec<Source>,
    labels: SourceLabels,
    error: Option<String>,
}

fn load_sources<S: ReportStore + ?Sized>(store: &S) -> SourceList {
    match store.sources() {
        Ok(sources) => SourceList {
            labels: SourceLabels::from_sources(&sources),
            sources,
            error: None,
        },
        Err(err) => {
            error!("Cannot list sources: {err}");
            SourceList {
                sources: Vec::new(),
                labels: SourceLabels::default(),
                error: Some(err.to_string()),
            }
        }
    }
}

/// One table section; a failed query leaves the header and the diagnostic.
fn table_section(
    title: String,
    anchor: String,
    header: &[&str],
    fetched: Result<Vec<Row>, StoreError>,
    options: ReportOptions,
    labels: &SourceLabels,
) -> Section {
    match fetched {
        Ok(rows) => {
            let table = assemble(anchor.clone(), header.iter().copied(), rows, &options, labels);
            Section::new(title, anchor, table, options)
        }
        Err(err) => {
            error!("{title}: {err}");
            let table = Table::new(anchor.clone(), header.iter().copied());
            Section::failed(title, anchor, table, err.to_string())
        }
    }
}

fn availability_section<S: ReportStore + ?Sized, C: Clock>(
    store: &S,
    window: &DateWindow<C>,
    date: NaiveDate,
    sources: &SourceList,
) -> Section {
    let days = window.month_window(date);
    let title = format!("Days with reports in {}", month_label(date));
    let note = format!(
        "Reports included are from {} sources between {} to {}:",
        sources.sources.len(),
        format_date(month_start(date)),
        format_date(month_end(date)),
    );

    let reported = if days.is_empty() {
        Ok(Default::default())
    } else {
        store.report_days(days.first(), days.last())
    };
    let (matrix, failure) = match reported {
        Ok(reported) => (
            AvailabilityMatrix::from_presence(&sources.sources, &days, &reported),
            sources.error.clone(),
        ),
        Err(err) => {
            error!("{title}: {err}");
            (
                AvailabilityMatrix::from_presence(&[], &days, &Default::default()),
                Some(err.to_string()),
            )
        }
    };
    let (table, options) = matrix.to_table(daily_href);
    let mut section = Section::new(title, "Availability", table, options).with_note(note);
    section.error = failure;
    section
}

/// Statistics of every data node for one day.
pub fn daily_report<S: ReportStore + ?Sized, C: Clock>(
    store: &S,
    window: &DateWindow<C>,
    date: NaiveDate,
    show_all: bool,
    updated: Option<String>,
) -> Page {
    info!("Building daily report for {}", format_date(date));
    let sources = load_sources(store);

    let mut navigation = Vec::new();
    if let Some(prev) = window.offset(date, -1) {
        navigation.push(NavItem::link("<< Prev", daily_href(prev)));
    }
    navigation.push(NavItem::text(format!(
        "Summary statistics for {}",
        format_date(date)
    )));
    if let Some(next) = window.offset(date, 1) {
        navigation.push(NavItem::link("Next >>", daily_href(next)));
    }

    let mut sections = vec![availability_section(store, window, date, &sources)];
    for kind in TableKind::daily_tables(show_all) {
        let fetched = store.fetch_rows(kind, &RowFilter::day(date), &[kind.sort_column()]);
        sections.push(table_section(
            format!("Table {kind}"),
            format!("Table{kind}"),
            kind.header(),
            fetched,
            kind.options(),
            &sources.labels,
        ));
    }

    let month = RowFilter::days(month_start(date), month_end(date));
    let messages = TableKind::Messages;
    sections.push(table_section(
        "Table Messages this month".to_string(),
        "TableMessages_this_month".to_string(),
        messages.header(),
        store.fetch_rows(messages, &month, &["start_day", "message"]),
        messages.options(),
        &sources.labels,
    ));

    Page {
        title: PAGE_TITLE.to_string(),
        updated,
        navigation,
        sections,
    }
}

/// One network's requests over the month of `date`, plus totals of every
/// network for comparison.
pub fn network_report<S: ReportStore + ?Sized, C: Clock>(
    store: &S,
    window: &DateWindow<C>,
    code: &str,
    date: NaiveDate,
    updated: Option<String>,
) -> Page {
    info!("Building network report for {code} in {}", month_label(date));
    let sources = load_sources(store);
    let network = TableKind::Network;

    let mut navigation = Vec::new();
    if let Some(prev) = window.previous_month(date) {
        navigation.push(NavItem::link("<< Prev month", network_href(code, prev)));
    }
    navigation.push(NavItem::text(format!(
        "Monthly summary statistics for {}",
        format_date(date)
    )));
    if let Some(next) = window.next_month(date) {
        navigation.push(NavItem::link("Next month >>", network_href(code, next)));
    }

    let month = RowFilter::days(month_start(date), month_end(date));
    let requests = table_section(
        format!("Table Requests for {code} this month"),
        format!("TableReq_this_month{code}"),
        network.header(),
        store.fetch_rows(
            network,
            &month.clone().with_network(code),
            &["start_day", "source"],
        ),
        network.options(),
        &sources.labels,
    );

    let totals = store
        .fetch_rows(network, &month, &["networkCode"])
        .map(|rows| totals_by(&rows, "networkCode", "days", network.summable()));
    let options = ReportOptions::summing(network.summable().iter().copied())
        .with_code_links(format!("{NETWORK_PAGE}?code={{code}}&date={}", format_date(date)));
    let networks = table_section(
        "Table Networks over the month".to_string(),
        "TableNetworks".to_string(),
        &NETWORKS_HEADER,
        totals,
        options,
        &sources.labels,
    );

    Page {
        title: format!("{PAGE_TITLE} for network {code}"),
        updated,
        navigation,
        sections: vec![requests, networks],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ColumnSum;
    use crate::availability::NODE_COLUMN;
    use crate::dates::{parse_date, FixedClock};
    use crate::db::tests::seeded_db;
    use crate::db::SqliteStore;
    use crate::report::{Value, PLACEHOLDER};
    use rusqlite::Connection;

    fn date(text: &str) -> NaiveDate {
        parse_date(text).unwrap()
    }

    fn window() -> DateWindow<FixedClock> {
        DateWindow::new(FixedClock(date("2024-01-10")))
    }

    fn section<'a>(page: &'a Page, anchor: &str) -> &'a Section {
        page.sections
            .iter()
            .find(|section| section.anchor == anchor)
            .unwrap()
    }

    #[test]
    fn clean_code_limits_and_uppercases() {
        assert_eq!(clean_code("ge"), "GE");
        assert_eq!(clean_code("ch'--drop"), "CHDRO");
        assert_eq!(clean_code("abcdefghijk"), "ABCDEFGH");
    }

    #[test]
    fn daily_report_lists_public_tables() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&seeded_db(tmp.path())).unwrap();
        let page = daily_report(&store, &window(), date("2024-01-05"), false, store.timestamp());

        let anchors: Vec<&str> = page.sections.iter().map(|s| s.anchor.as_str()).collect();
        assert_eq!(
            anchors,
            vec![
                "Availability",
                "TableSummary",
                "TableRequest",
                "TableVolume",
                "TableNetwork",
                "TableMessages",
                "TableMessages_this_month",
            ]
        );
        assert!(page.sections.iter().all(|s| s.error.is_none()));
        assert_eq!(page.navigation.len(), 3);
        assert_eq!(
            page.navigation[2].href.as_deref(),
            Some("reqlogdisplay?date=2024-01-06")
        );
    }

    #[test]
    fn daily_report_sums_and_labels_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&seeded_db(tmp.path())).unwrap();
        let page = daily_report(&store, &window(), date("2024-01-05"), false, None);

        let request = &section(&page, "TableRequest").table;
        let sources: Vec<String> = request.rows.iter().map(|r| r["source"].to_string()).collect();
        assert_eq!(sources, vec!["ETH", PLACEHOLDER, "GFZ"]);
        let sums = request.sums.as_ref().unwrap();
        assert_eq!(sums.get("requests"), Some(&ColumnSum::Count(11)));
        assert_eq!(sums.get("size").unwrap().to_string(), "2.001 MiB");

        let volume = &section(&page, "TableVolume").table;
        assert!(volume.is_empty());
        assert!(volume.sums.is_none());

        let monthly = &section(&page, "TableMessages_this_month").table;
        assert_eq!(monthly.rows.len(), 2);
    }

    #[test]
    fn daily_report_calendar_stops_at_today() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&seeded_db(tmp.path())).unwrap();
        let page = daily_report(&store, &window(), date("2024-01-05"), false, None);

        let calendar = section(&page, "Availability");
        assert_eq!(calendar.table.header.len(), 11);
        assert_eq!(calendar.table.rows[0][NODE_COLUMN], Value::from("GFZ"));
        assert_eq!(calendar.table.rows[0]["05"], Value::Flag(true));
        assert_eq!(calendar.table.rows[0]["06"], Value::Flag(false));
        assert_eq!(calendar.table.rows[0]["07"], Value::Flag(true));
        assert_eq!(calendar.table.rows[1]["07"], Value::Flag(false));
        assert_eq!(
            calendar.notes,
            vec!["Reports included are from 2 sources between 2024-01-01 to 2024-01-31:"]
        );
    }

    #[test]
    fn batched_presence_matches_per_cell_checks() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&seeded_db(tmp.path())).unwrap();
        let sources = store.sources().unwrap();
        let days = window().month_window(date("2024-01-05"));

        let per_cell =
            AvailabilityMatrix::build(&sources, &days, |day, id| store.has_report(day, id)).unwrap();
        let reported = store.report_days(days.first(), days.last()).unwrap();
        let batched = AvailabilityMatrix::from_presence(&sources, &days, &reported);
        assert_eq!(per_cell, batched);
    }

    #[test]
    fn show_all_adds_private_tables() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&seeded_db(tmp.path())).unwrap();
        let page = daily_report(&store, &window(), date("2024-01-05"), true, None);
        let user = &section(&page, "TableUser").table;
        assert_eq!(user.rows.len(), 1);
        assert_eq!(user.sums.as_ref().unwrap().get("size").unwrap().to_string(), "3 kiB");
        assert!(page.sections.iter().any(|s| s.anchor == "TableClientIP"));
    }

    #[test]
    fn broken_tables_do_not_blank_the_page() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("broken.db");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE ArcStatsSource (id INTEGER, host TEXT, port INTEGER, dcid TEXT);
             INSERT INTO ArcStatsSource VALUES (1, 'host', 18001, 'GFZ');",
        )
        .unwrap();
        drop(conn);

        let store = SqliteStore::open(&db_path).unwrap();
        let page = daily_report(&store, &window(), date("2024-01-05"), false, None);
        assert_eq!(page.sections.len(), 7);
        let summary = section(&page, "TableSummary");
        assert!(summary.error.as_deref().unwrap().contains("ArcStatsSummary"));
        assert!(summary.table.is_empty());
        assert_eq!(summary.table.header.len(), 9);
        assert!(section(&page, "Availability").error.is_some());
    }

    #[test]
    fn future_day_has_no_next_link() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&seeded_db(tmp.path())).unwrap();
        let page = daily_report(&store, &window(), date("2024-01-10"), false, None);
        assert_eq!(page.navigation.len(), 2);
        assert!(page.navigation.iter().all(|item| item.label != "Next >>"));
    }

    #[test]
    fn network_report_totals_the_month() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&seeded_db(tmp.path())).unwrap();
        let page = network_report(&store, &window(), "GE", date("2024-01-05"), None);

        assert_eq!(page.title, "EIDA Arclink Request Statistics for network GE");
        let requests = &section(&page, "TableReq_this_monthGE").table;
        assert_eq!(requests.rows.len(), 2);
        let sums = requests.sums.as_ref().unwrap();
        assert_eq!(sums.get("size").unwrap().to_string(), "1.5 MiB");
        assert_eq!(sums.get("requests"), Some(&ColumnSum::Count(6)));

        let networks = section(&page, "TableNetworks");
        let codes: Vec<String> = networks
            .table
            .rows
            .iter()
            .map(|row| row["networkCode"].to_string())
            .collect();
        assert_eq!(codes, vec!["CH", "GE"]);
        assert_eq!(networks.table.rows[1]["days"], Value::Integer(2));
        assert_eq!(networks.table.rows[1]["size"], Value::from("1.5 MiB"));
        assert_eq!(
            networks.table.sums.as_ref().unwrap().get("size").unwrap().to_string(),
            "2 MiB"
        );
        assert_eq!(
            networks.options.link_codes.as_deref(),
            Some("reqlognetwork?code={code}&date=2024-01-05")
        );

        assert_eq!(
            page.navigation[0].href.as_deref(),
            Some("reqlognetwork?code=GE&date=2023-12-01")
        );
        assert_eq!(page.navigation.len(), 2);
    }
}
