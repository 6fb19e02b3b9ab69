use crate::models::RosterPeriod;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Inclusive date range of requests worth polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Picks the window of roster periods that are still relevant at `now`.
///
/// An active period counts when it contains `now`, started within the last
/// `lookback_days`, or ends after `now - lookback_days`. Without a match the
/// `fallback_count` most recently started periods are used, and without any
/// period at all the last `lookback_days` up to today.
pub fn select_check_window(
    periods: &[RosterPeriod],
    now: DateTime<Utc>,
    lookback_days: i64,
    fallback_count: usize,
) -> CheckWindow {
    let today = now.date_naive();
    let horizon = today - Duration::days(lookback_days);

    let matching: Vec<&RosterPeriod> = periods
        .iter()
        .filter(|p| p.is_active)
        .filter(|p| {
            let contains_now = p.start_period <= today && today <= p.end_period;
            let started_recently = p.start_period >= horizon;
            let ends_after_horizon = p.end_period > horizon;
            contains_now || started_recently || ends_after_horizon
        })
        .collect();

    if let Some(window) = span(matching.iter().copied()) {
        return window;
    }

    let mut recent: Vec<&RosterPeriod> = periods.iter().collect();
    recent.sort_by(|a, b| b.start_period.cmp(&a.start_period));
    if let Some(window) = span(recent.into_iter().take(fallback_count)) {
        return window;
    }

    CheckWindow {
        start: horizon,
        end: today,
    }
}

fn span<'a>(periods: impl Iterator<Item = &'a RosterPeriod>) -> Option<CheckWindow> {
    periods.fold(None, |acc, p| {
        Some(match acc {
            None => CheckWindow {
                start: p.start_period,
                end: p.end_period,
            },
            Some(w) => CheckWindow {
                start: w.start.min(p.start_period),
                end: w.end.max(p.end_period),
            },
        })
    })
}
