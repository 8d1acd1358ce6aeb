//! One request per calendar unit, newest first.
//!
//! Date-driven sources do not paginate; they tile a date window with
//! years, months, or fixed-length day intervals and fetch each unit
//! separately. Enumeration is a straight `Idle -> Enumerating -> Done`
//! walk with no revisits; error handling belongs to whatever issues the
//! requests.

use chrono::{Datelike, Days, NaiveDate};
use collector_core::{DateWindow, Granularity};
use url::Url;

use crate::pagination::FollowUp;

/// One calendar unit of a source's date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodUnit {
    Year(i32),
    /// First day of the month.
    Month(NaiveDate),
    /// Inclusive day interval; the final interval of a window may be
    /// shorter than the configured step.
    Interval { start: NaiveDate, end: NaiveDate },
}

impl PeriodUnit {
    /// The unit rendered at the window's granularity, for URLs and names.
    pub fn label(&self, granularity: Granularity) -> String {
        match self {
            PeriodUnit::Year(year) => year.to_string(),
            PeriodUnit::Month(first) => granularity.format(*first),
            PeriodUnit::Interval { start, end } => {
                format!("{}_{}", granularity.format(*start), granularity.format(*end))
            }
        }
    }
}

/// Maps a period unit to the request URLs it needs. A unit may need several
/// parallel requests (one per notice type, for example).
pub trait PeriodUrls: Send + Sync {
    fn urls(&self, unit: &PeriodUnit) -> Vec<Url>;
}

impl<F> PeriodUrls for F
where
    F: Fn(&PeriodUnit) -> Vec<Url> + Send + Sync,
{
    fn urls(&self, unit: &PeriodUnit) -> Vec<Url> {
        self(unit)
    }
}

enum State {
    Idle,
    Enumerating {
        units: std::vec::IntoIter<PeriodUnit>,
        current: std::vec::IntoIter<(usize, Url)>,
    },
    Done,
}

/// Iterator over the requests of a date window, most recent unit first.
/// Within a unit, request k is emitted at priority `-k` so intra-unit
/// ordering stays deterministic.
pub struct PeriodicRequests<B: PeriodUrls> {
    window: DateWindow,
    step_days: u64,
    builder: B,
    state: State,
}

impl<B: PeriodUrls> PeriodicRequests<B> {
    /// `step_days` only applies at `Date`/`Datetime` granularity, where the
    /// window is tiled with intervals of that many days.
    pub fn new(window: DateWindow, step_days: u64, builder: B) -> Self {
        Self {
            window,
            step_days: step_days.max(1),
            builder,
            state: State::Idle,
        }
    }

    /// Units of the window in strictly descending order.
    fn units(&self) -> Vec<PeriodUnit> {
        let from = self.window.from();
        let until = self.window.until();
        match self.window.granularity() {
            Granularity::Year => (from.year()..=until.year())
                .rev()
                .map(PeriodUnit::Year)
                .collect(),
            Granularity::YearMonth => {
                let mut units = Vec::new();
                let stop = month_start(from);
                let mut month = month_start(until);
                loop {
                    units.push(PeriodUnit::Month(month));
                    if month == stop {
                        break;
                    }
                    month = previous_month(month);
                }
                units
            }
            Granularity::Date | Granularity::Datetime => {
                let mut units = Vec::new();
                let mut start = from;
                while start <= until {
                    let end = start
                        .checked_add_days(Days::new(self.step_days - 1))
                        .map_or(until, |end| end.min(until));
                    units.push(PeriodUnit::Interval { start, end });
                    match end.checked_add_days(Days::new(1)) {
                        Some(next) => start = next,
                        None => break,
                    }
                }
                units.reverse();
                units
            }
        }
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).expect("first of month is valid")
}

fn previous_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 1 {
        (first.year() - 1, 12)
    } else {
        (first.year(), first.month() - 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).expect("first of month is valid")
}

impl<B: PeriodUrls> Iterator for PeriodicRequests<B> {
    type Item = FollowUp;

    fn next(&mut self) -> Option<FollowUp> {
        loop {
            match &mut self.state {
                State::Idle => {
                    self.state = State::Enumerating {
                        units: self.units().into_iter(),
                        current: Vec::new().into_iter(),
                    };
                }
                State::Enumerating { units, current } => {
                    if let Some((position, url)) = current.next() {
                        return Some(FollowUp {
                            url,
                            priority: -(position as i64),
                        });
                    }
                    match units.next() {
                        Some(unit) => {
                            let urls = self.builder.urls(&unit);
                            *current = urls
                                .into_iter()
                                .enumerate()
                                .collect::<Vec<_>>()
                                .into_iter();
                        }
                        None => {
                            self.state = State::Done;
                        }
                    }
                }
                State::Done => return None,
            }
        }
    }
}
