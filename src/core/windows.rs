use crate::types::DateWindow;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Length of the pre-fire baseline search, ending on the fire start date
pub const PRE_FIRE_LOOKBACK_DAYS: i64 = 60;

/// Post-fire search window
///
/// `start` is the nominal window reported back to the user; `shifted_start`
/// is the later date the imagery query actually starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostFireWindow {
    pub start: NaiveDate,
    pub shifted_start: NaiveDate,
    pub end: NaiveDate,
}

impl PostFireWindow {
    /// Range used for the post-fire scene query
    pub fn query_window(&self) -> DateWindow {
        DateWindow::new(self.shifted_start, self.end)
    }
}

/// Pre- and post-fire windows for one fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireWindows {
    pub pre: DateWindow,
    pub post: PostFireWindow,
}

/// Elapsed-time tier selecting how far the post-fire search is pushed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationTier {
    /// 90 days or more
    Long,
    /// 60 to 89 days
    Medium,
    /// under 60 days
    Short,
}

impl DurationTier {
    pub fn for_elapsed_days(days: i64) -> Self {
        if days >= 90 {
            DurationTier::Long
        } else if days >= 60 {
            DurationTier::Medium
        } else {
            DurationTier::Short
        }
    }

    /// (shifted start offset from end, end extension) in days
    fn offsets(self) -> (i64, i64) {
        match self {
            DurationTier::Long => (-60, 20),
            DurationTier::Medium => (-40, 30),
            DurationTier::Short => (1, 60),
        }
    }
}

/// Derive the imagery search windows from the fire's start and end dates.
///
/// Returns `(pre_window_end, post_window_start, post_window_end)` in the form
/// of a [`FireWindows`]: the pre-fire window ends on `start`, the post-fire
/// query starts on the shifted start and ends on the extended end date.
pub fn derive_windows(start: NaiveDate, end: NaiveDate) -> FireWindows {
    let elapsed = (end - start).num_days();
    let tier = DurationTier::for_elapsed_days(elapsed);
    let (shift, extension) = tier.offsets();

    let shifted_start = end + Duration::days(shift);
    let adjusted_end = end + Duration::days(extension);

    log::debug!(
        "Fire duration {} days -> {:?} tier, post-fire query [{}, {})",
        elapsed,
        tier,
        shifted_start,
        adjusted_end
    );

    FireWindows {
        pre: DateWindow::new(start - Duration::days(PRE_FIRE_LOOKBACK_DAYS), start),
        post: PostFireWindow {
            start,
            shifted_start,
            end: adjusted_end,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_short_fire_window() {
        let windows = derive_windows(date("2020-08-01"), date("2020-08-20"));
        assert_eq!(windows.pre.start, date("2020-06-02"));
        assert_eq!(windows.pre.end, date("2020-08-01"));
        assert_eq!(windows.post.shifted_start, date("2020-08-21"));
        assert_eq!(windows.post.end, date("2020-10-19"));
    }

    #[test]
    fn test_tier_boundaries() {
        let start = date("2021-01-01");
        let cases = [
            (59, DurationTier::Short, 1, 60),
            (60, DurationTier::Medium, -40, 30),
            (89, DurationTier::Medium, -40, 30),
            (90, DurationTier::Long, -60, 20),
        ];
        for (days, tier, shift, ext) in cases {
            let end = start + Duration::days(days);
            assert_eq!(DurationTier::for_elapsed_days(days), tier);
            let windows = derive_windows(start, end);
            assert_eq!(windows.post.shifted_start, end + Duration::days(shift));
            assert_eq!(windows.post.end, end + Duration::days(ext));
        }
    }

    #[test]
    fn test_windows_are_ordered() {
        let start = date("2019-06-15");
        for days in 1..400 {
            let end = start + Duration::days(days);
            let w = derive_windows(start, end);
            assert!(w.post.shifted_start >= start, "d={}", days);
            assert!(w.post.shifted_start <= w.post.end, "d={}", days);
            assert!(w.pre.end <= w.post.shifted_start, "d={}", days);
        }
    }
}
