use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Calendar resolution of a source's date filtering. Determines both the
/// request-building unit and the string format used in generated URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    Year,
    YearMonth,
    Date,
    Datetime,
}

impl Granularity {
    pub fn format_str(self) -> &'static str {
        match self {
            Granularity::Year => "%Y",
            Granularity::YearMonth => "%Y-%m",
            Granularity::Date => "%Y-%m-%d",
            Granularity::Datetime => "%Y-%m-%dT%H:%M:%S",
        }
    }

    /// Formats a date at this granularity. `Datetime` renders midnight;
    /// sources needing a different time of day format their own.
    pub fn format(self, date: NaiveDate) -> String {
        match self {
            Granularity::Datetime => date
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always valid")
                .format(self.format_str())
                .to_string(),
            _ => date.format(self.format_str()).to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("window start {from} is after its end {until}")]
    Inverted { from: NaiveDate, until: NaiveDate },
}

/// An inclusive date range plus the granularity at which it is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    from: NaiveDate,
    until: NaiveDate,
    granularity: Granularity,
}

impl DateWindow {
    pub fn new(
        from: NaiveDate,
        until: NaiveDate,
        granularity: Granularity,
    ) -> Result<Self, WindowError> {
        if from > until {
            return Err(WindowError::Inverted { from, until });
        }
        Ok(Self {
            from,
            until,
            granularity,
        })
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn until(&self) -> NaiveDate {
        self.until
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn rejects_inverted_window() {
        let err = DateWindow::new(date(2021, 1, 2), date(2021, 1, 1), Granularity::Date);
        assert_eq!(
            err,
            Err(WindowError::Inverted {
                from: date(2021, 1, 2),
                until: date(2021, 1, 1),
            })
        );
    }

    #[test]
    fn formats_per_granularity() {
        let d = date(2021, 3, 7);
        assert_eq!(Granularity::Year.format(d), "2021");
        assert_eq!(Granularity::YearMonth.format(d), "2021-03");
        assert_eq!(Granularity::Date.format(d), "2021-03-07");
        assert_eq!(Granularity::Datetime.format(d), "2021-03-07T00:00:00");
    }
}
