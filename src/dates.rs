//! Calendar windows for the reports.
//!
//! All dates are UTC calendar days exchanged as `YYYY-MM-DD`. "Today" comes
//! from a [`Clock`] so that suppression of future days can be tested.

use chrono::{Datelike, Days, NaiveDate, Utc};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub trait Clock {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// A clock stopped on one day.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DateError {
    #[error("invalid date {0:?}; expected YYYY-MM-DD")]
    Invalid(String),
}

pub fn parse_date(text: &str) -> Result<NaiveDate, DateError> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
        .map_err(|_| DateError::Invalid(text.to_string()))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Read a date out of a loosely formatted request parameter.
///
/// Anything before the first digit or '-' is skipped and anything after the
/// day field is ignored, so `"date=2013-12-08#top"` yields 2013-12-08. The
/// three fields must still form a real calendar date.
pub fn clean_date(text: &str) -> Result<NaiveDate, DateError> {
    let invalid = || DateError::Invalid(text.to_string());
    let start = text
        .find(|ch: char| ch.is_ascii_digit() || ch == '-')
        .ok_or_else(invalid)?;

    let mut rest = &text[start..];
    let mut fields = [0u32; 3];
    for (idx, field) in fields.iter_mut().enumerate() {
        if idx > 0 {
            rest = rest.strip_prefix('-').ok_or_else(invalid)?;
        }
        let digits = rest.len() - rest.trim_start_matches(|ch: char| ch.is_ascii_digit()).len();
        *field = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];
    }

    let year = i32::try_from(fields[0]).map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, fields[1], fields[2]).ok_or_else(invalid)
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn days_in_month(date: NaiveDate) -> u32 {
    let first = month_start(date);
    first
        .checked_add_months(chrono::Months::new(1))
        .and_then(|next| next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

pub fn month_end(date: NaiveDate) -> NaiveDate {
    date.with_day(days_in_month(date)).unwrap_or(date)
}

/// `YYYY-MM` label for the month containing `date`.
pub fn month_label(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Date arithmetic that refuses to step past today.
#[derive(Debug, Clone)]
pub struct DateWindow<C: Clock = SystemClock> {
    clock: C,
}

impl<C: Clock> DateWindow<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Shift `date` by `days` (possibly negative).
    ///
    /// Returns `None` when the result lies after today or outside the
    /// representable calendar.
    pub fn offset(&self, date: NaiveDate, days: i64) -> Option<NaiveDate> {
        let step = Days::new(days.unsigned_abs());
        let shifted = if days >= 0 {
            date.checked_add_days(step)
        } else {
            date.checked_sub_days(step)
        }?;
        (shifted <= self.today()).then_some(shifted)
    }

    /// [`DateWindow::offset`] on `YYYY-MM-DD` strings.
    pub fn offset_str(&self, date: &str, days: i64) -> Result<Option<String>, DateError> {
        let date = parse_date(date)?;
        Ok(self.offset(date, days).map(format_date))
    }

    /// Days from `start` to `start + end_offset_days` inclusive, stopping at
    /// today. Empty when `start` itself lies in the future.
    pub fn day_range(&self, start: NaiveDate, end_offset_days: i64) -> DayWindow {
        let today = self.today();
        let end = if end_offset_days < 0 {
            start.pred_opt().unwrap_or(start)
        } else {
            start
                .checked_add_days(Days::new(end_offset_days.unsigned_abs()))
                .unwrap_or(NaiveDate::MAX)
        };
        DayWindow::new(start, end.min(today))
    }

    /// The calendar month containing `date`, clipped at today.
    pub fn month_window(&self, date: NaiveDate) -> DayWindow {
        let first = month_start(date);
        self.day_range(first, i64::from(days_in_month(first)) - 1)
    }

    /// First day of the month before the one containing `date`.
    pub fn previous_month(&self, date: NaiveDate) -> Option<NaiveDate> {
        let first = month_start(date).checked_sub_months(chrono::Months::new(1))?;
        (first <= self.today()).then_some(first)
    }

    /// First day of the month after the one containing `date`, if it has begun.
    pub fn next_month(&self, date: NaiveDate) -> Option<NaiveDate> {
        let first = month_start(date).checked_add_months(chrono::Months::new(1))?;
        (first <= self.today()).then_some(first)
    }
}

impl Default for DateWindow<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

/// An inclusive run of consecutive days. Iterating does not consume it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    first: NaiveDate,
    last: NaiveDate,
}

impl DayWindow {
    pub fn new(first: NaiveDate, last: NaiveDate) -> Self {
        Self { first, last }
    }

    pub fn first(&self) -> NaiveDate {
        self.first
    }

    pub fn last(&self) -> NaiveDate {
        self.last
    }

    pub fn is_empty(&self) -> bool {
        self.last < self.first
    }

    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.last - self.first).num_days() as usize + 1
        }
    }

    pub fn iter(&self) -> DayIter {
        DayIter {
            next: Some(self.first),
            last: self.last,
        }
    }

    pub fn labels(&self) -> Vec<String> {
        self.iter().map(format_date).collect()
    }
}

impl IntoIterator for DayWindow {
    type Item = NaiveDate;
    type IntoIter = DayIter;

    fn into_iter(self) -> DayIter {
        self.iter()
    }
}

impl IntoIterator for &DayWindow {
    type Item = NaiveDate;
    type IntoIter = DayIter;

    fn into_iter(self) -> DayIter {
        self.iter()
    }
}

#[derive(Debug, Clone)]
pub struct DayIter {
    next: Option<NaiveDate>,
    last: NaiveDate,
}

impl Iterator for DayIter {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next.filter(|day| *day <= self.last)?;
        self.next = current.succ_opt();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(text: &str) -> NaiveDate {
        parse_date(text).unwrap()
    }

    fn window(today: &str) -> DateWindow<FixedClock> {
        DateWindow::new(FixedClock(date(today)))
    }

    #[test]
    fn day_range_rolls_over_month_end() {
        let days = window("2026-10-19").day_range(date("2024-01-30"), 3);
        assert_eq!(
            days.labels(),
            vec!["2024-01-30", "2024-01-31", "2024-02-01", "2024-02-02"]
        );
        assert_eq!(days.len(), 4);
        // Restartable: a second pass sees the same days.
        assert_eq!(days.iter().count(), 4);
    }

    #[test]
    fn day_range_rolls_over_year_end_and_leap_day() {
        let w = window("2026-10-19");
        assert_eq!(
            w.day_range(date("2023-12-31"), 1).labels(),
            vec!["2023-12-31", "2024-01-01"]
        );
        assert_eq!(
            w.day_range(date("2024-02-28"), 2).labels(),
            vec!["2024-02-28", "2024-02-29", "2024-03-01"]
        );
    }

    #[test]
    fn day_range_stops_at_today() {
        let w = window("2024-03-02");
        assert_eq!(
            w.day_range(date("2024-02-28"), 10).labels(),
            vec!["2024-02-28", "2024-02-29", "2024-03-01", "2024-03-02"]
        );
        assert!(w.day_range(date("2024-03-05"), 3).is_empty());
        assert!(w.day_range(date("2024-02-01"), -1).is_empty());
    }

    #[test]
    fn offset_never_returns_future_dates() {
        let w = window("2026-10-19");
        assert_eq!(w.offset_str("2099-01-01", 0).unwrap(), None);
        assert_eq!(w.offset_str("2026-10-19", 1).unwrap(), None);
        assert_eq!(
            w.offset_str("2026-10-19", 0).unwrap().as_deref(),
            Some("2026-10-19")
        );
        assert_eq!(
            w.offset_str("2024-03-01", -1).unwrap().as_deref(),
            Some("2024-02-29")
        );
        assert!(w.offset_str("not a date", 1).is_err());
    }

    #[test]
    fn clean_date_tolerates_surrounding_noise() {
        assert_eq!(clean_date("2013-12-08").unwrap(), date("2013-12-08"));
        assert_eq!(clean_date("date=2013-12-08#top").unwrap(), date("2013-12-08"));
        assert_eq!(clean_date("2013-1-5").unwrap(), date("2013-01-05"));
        assert!(clean_date("2013-02-30").is_err());
        assert!(clean_date("yesterday").is_err());
        assert!(clean_date("2013-12").is_err());
    }

    #[test]
    fn month_helpers_use_true_month_lengths() {
        assert_eq!(days_in_month(date("2024-02-10")), 29);
        assert_eq!(days_in_month(date("2023-02-10")), 28);
        assert_eq!(month_end(date("2024-04-10")), date("2024-04-30"));
        assert_eq!(month_label(date("2024-04-10")), "2024-04");

        let w = window("2024-03-15");
        assert_eq!(w.month_window(date("2024-02-10")).len(), 29);
        assert_eq!(w.month_window(date("2024-03-02")).len(), 15);
        assert_eq!(w.previous_month(date("2024-01-20")), Some(date("2023-12-01")));
        assert_eq!(w.next_month(date("2024-02-20")), Some(date("2024-03-01")));
        assert_eq!(w.next_month(date("2024-03-02")), None);
    }
}
