use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};

use crate::dates::{format_date, DayWindow};
use crate::report::{ReportOptions, Row, Source, Table, Value};

/// First column of the calendar table.
pub const NODE_COLUMN: &str = "EIDA NODE";

/// Which sources reported on which days.
#[derive(Debug, Clone, PartialEq)]
pub struct AvailabilityMatrix {
    days: Vec<NaiveDate>,
    sources: Vec<Source>,
    presence: Vec<Vec<bool>>,
}

impl AvailabilityMatrix {
    /// Ask `exists` about every (day, source id) pair.
    ///
    /// This costs one call per cell; prefer [`AvailabilityMatrix::from_presence`]
    /// when the pairs can be fetched in one go. The first error aborts the build.
    pub fn build<F, E>(sources: &[Source], window: &DayWindow, mut exists: F) -> Result<Self, E>
    where
        F: FnMut(NaiveDate, i64) -> Result<bool, E>,
    {
        let days: Vec<NaiveDate> = window.iter().collect();
        let mut presence = Vec::with_capacity(sources.len());
        for source in sources {
            let mut row = Vec::with_capacity(days.len());
            for day in &days {
                row.push(exists(*day, source.id)?);
            }
            presence.push(row);
        }
        Ok(Self {
            days,
            sources: sources.to_vec(),
            presence,
        })
    }

    /// Build from the set of (source id, day) pairs known to have reports.
    pub fn from_presence(
        sources: &[Source],
        window: &DayWindow,
        reported: &HashSet<(i64, NaiveDate)>,
    ) -> Self {
        let days: Vec<NaiveDate> = window.iter().collect();
        let presence = sources
            .iter()
            .map(|source| {
                days.iter()
                    .map(|day| reported.contains(&(source.id, *day)))
                    .collect()
            })
            .collect();
        Self {
            days,
            sources: sources.to_vec(),
            presence,
        }
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Presence grid indexed as `[source][day]`.
    pub fn grid(&self) -> &[Vec<bool>] {
        &self.presence
    }

    pub fn is_present(&self, source: usize, day: usize) -> Option<bool> {
        self.presence.get(source)?.get(day).copied()
    }

    /// Calendar table: one row per source labelled by dcid, one column per
    /// day labelled by day of month. `day_link` gives each day header a target.
    pub fn to_table(&self, day_link: impl Fn(NaiveDate) -> String) -> (Table, ReportOptions) {
        let labels: Vec<String> = self
            .days
            .iter()
            .map(|day| format!("{:02}", day.day()))
            .collect();

        let mut table = Table::new(
            "Availability",
            std::iter::once(NODE_COLUMN.to_string()).chain(labels.iter().cloned()),
        );
        table.rows = self
            .sources
            .iter()
            .zip(&self.presence)
            .map(|(source, present)| {
                let mut row = Row::new();
                row.insert(NODE_COLUMN.to_string(), Value::Text(source.dcid.clone()));
                for (label, flag) in labels.iter().zip(present) {
                    row.insert(label.clone(), Value::Flag(*flag));
                }
                row
            })
            .collect();

        let mut options = ReportOptions::default();
        for (label, day) in labels.iter().zip(&self.days) {
            options.header_links.insert(label.clone(), day_link(*day));
        }
        (table, options)
    }

    /// Day labels as `YYYY-MM-DD`.
    pub fn day_labels(&self) -> Vec<String> {
        self.days.iter().copied().map(format_date).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::parse_date;
    use std::convert::Infallible;

    fn source(id: i64, dcid: &str) -> Source {
        Source {
            id,
            host: format!("{}.example.org", dcid.to_lowercase()),
            port: 18001,
            dcid: dcid.to_string(),
        }
    }

    fn window() -> DayWindow {
        DayWindow::new(parse_date("2024-01-01").unwrap(), parse_date("2024-01-03").unwrap())
    }

    #[test]
    fn build_checks_every_cell() {
        let sources = vec![source(1, "A"), source(2, "B")];
        let day1 = parse_date("2024-01-01").unwrap();
        let day3 = parse_date("2024-01-03").unwrap();
        let mut calls = 0;
        let matrix = AvailabilityMatrix::build(&sources, &window(), |day, id| {
            calls += 1;
            Ok::<_, Infallible>(id == 1 && (day == day1 || day == day3))
        })
        .unwrap();

        assert_eq!(calls, 6);
        assert_eq!(matrix.grid()[0], vec![true, false, true]);
        assert_eq!(matrix.grid()[1], vec![false, false, false]);
        assert_eq!(matrix.is_present(0, 2), Some(true));
        assert_eq!(matrix.is_present(2, 0), None);
    }

    #[test]
    fn build_stops_on_first_error() {
        let sources = vec![source(1, "A")];
        let result = AvailabilityMatrix::build(&sources, &window(), |_, _| Err("database gone"));
        assert_eq!(result, Err("database gone"));
    }

    #[test]
    fn from_presence_matches_per_cell_build() {
        let sources = vec![source(1, "A"), source(2, "B")];
        let reported: HashSet<(i64, NaiveDate)> = [
            (1, parse_date("2024-01-01").unwrap()),
            (1, parse_date("2024-01-03").unwrap()),
            (9, parse_date("2024-01-02").unwrap()),
        ]
        .into_iter()
        .collect();

        let batched = AvailabilityMatrix::from_presence(&sources, &window(), &reported);
        let per_cell = AvailabilityMatrix::build(&sources, &window(), |day, id| {
            Ok::<_, Infallible>(reported.contains(&(id, day)))
        })
        .unwrap();
        assert_eq!(batched, per_cell);
        assert_eq!(batched.grid()[0], vec![true, false, true]);
    }

    #[test]
    fn calendar_table_has_a_column_per_day() {
        let sources = vec![source(1, "A")];
        let reported: HashSet<(i64, NaiveDate)> =
            [(1, parse_date("2024-01-02").unwrap())].into_iter().collect();
        let matrix = AvailabilityMatrix::from_presence(&sources, &window(), &reported);
        let (table, options) = matrix.to_table(|day| format!("?date={}", format_date(day)));

        assert_eq!(table.header, vec![NODE_COLUMN, "01", "02", "03"]);
        assert_eq!(table.rows[0][NODE_COLUMN], Value::from("A"));
        assert_eq!(table.rows[0]["02"], Value::Flag(true));
        assert_eq!(table.rows[0]["03"], Value::Flag(false));
        assert_eq!(options.header_links["01"], "?date=2024-01-01");
        assert_eq!(matrix.day_labels()[2], "2024-01-03");
    }
}
