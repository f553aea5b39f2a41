use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WINDOW_DAYS: usize = 7;

/// The most recent distinct transaction dates, strictly descending.
///
/// The last (oldest) date is the resync boundary: destination rows dated on
/// or after it are replaced by the window's rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Window {
    dates: Vec<NaiveDate>,
}

impl Window {
    /// Keep the `size` most recent distinct dates. Fewer available dates give a
    /// smaller window; no dates give an empty one.
    pub fn from_dates(dates: impl IntoIterator<Item = NaiveDate>, size: usize) -> Self {
        let mut dates = dates.into_iter().collect::<Vec<_>>();
        dates.sort_unstable_by(|a, b| b.cmp(a));
        dates.dedup();
        dates.truncate(size);
        Self { dates }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Resync boundary.
    pub fn minimum_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, day).expect("valid date")
    }

    #[test]
    fn keeps_most_recent_distinct_dates_descending() {
        let window = Window::from_dates(
            [d(3), d(9), d(1), d(9), d(4), d(8), d(2), d(7), d(6), d(5), d(3)],
            DEFAULT_WINDOW_DAYS,
        );
        assert_eq!(window.dates(), &[d(9), d(8), d(7), d(6), d(5), d(4), d(3)]);
        assert!(window.dates().windows(2).all(|pair| pair[0] > pair[1]));
        assert_eq!(window.minimum_date(), Some(d(3)));
    }

    #[test]
    fn fewer_dates_than_requested_is_a_smaller_window() {
        let window = Window::from_dates([d(2), d(5), d(2)], DEFAULT_WINDOW_DAYS);
        assert_eq!(window.len(), 2);
        assert_eq!(window.minimum_date(), Some(d(2)));
    }

    #[test]
    fn no_dates_is_an_empty_window() {
        let window = Window::from_dates(Vec::new(), DEFAULT_WINDOW_DAYS);
        assert!(window.is_empty());
        assert_eq!(window.minimum_date(), None);
    }
}
