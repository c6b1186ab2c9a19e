//! Auto-refresh decay policy: how often a candidate gets re-analyzed, based
//! on how long it has sat unviewed.

use chrono::{DateTime, Duration, Utc};

/// Beyond this many idle days a candidate is excluded outright, regardless
/// of the band it would otherwise fall into.
const HARD_CUTOFF_DAYS: i64 = 90;

/// Idle-duration upper bound (exclusive) paired with the refresh interval,
/// in hours, for repos idle less than that bound. Ordered from hottest to
/// coldest; the first band whose bound the candidate's idle time falls
/// under wins.
const BANDS: &[(i64, i64, &str)] = &[
    (1, 1, "hourly"),
    (7, 6, "every_6h"),
    (30, 24, "daily"),
    (90, 24 * 7, "weekly"),
];

/// The decay decision for one candidate: the refresh interval to apply and
/// a label for observability, or `None` if the candidate is excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecayDecision {
    pub interval_hours: i64,
    pub band: &'static str,
}

/// Pick the refresh interval for a candidate idle for `idle`, clamped to
/// `[min_hours, max_hours]`.
///
/// Returns `None` once idle time exceeds [`HARD_CUTOFF_DAYS`].
pub fn decay(idle: Duration, min_hours: i64, max_hours: i64) -> Option<DecayDecision> {
    let idle_days = idle.num_days();
    if idle_days >= HARD_CUTOFF_DAYS {
        return None;
    }

    let (_, hours, band) = BANDS
        .iter()
        .find(|(max_days, ..)| idle_days < *max_days)
        .copied()
        .unwrap_or_else(|| BANDS[BANDS.len() - 1]);

    Some(DecayDecision {
        interval_hours: hours.clamp(min_hours, max_hours),
        band,
    })
}

/// Whether a candidate with the given decay decision is due for refresh now.
///
/// A candidate with no prior completed analysis is always eligible.
#[must_use]
pub fn is_eligible(last_completed_at: Option<DateTime<Utc>>, now: DateTime<Utc>, decision: DecayDecision) -> bool {
    match last_completed_at {
        None => true,
        Some(completed_at) => now >= completed_at + Duration::hours(decision.interval_hours),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hot_repo_gets_hourly_band() {
        let decision = decay(Duration::hours(2), 1, 24 * 7).unwrap();
        assert_eq!(decision.band, "hourly");
        assert_eq!(decision.interval_hours, 1);
    }

    #[test]
    fn test_week_old_idle_gets_daily_band() {
        let decision = decay(Duration::days(10), 1, 24 * 7).unwrap();
        assert_eq!(decision.band, "daily");
        assert_eq!(decision.interval_hours, 24);
    }

    #[test]
    fn test_beyond_hard_cutoff_is_excluded() {
        assert!(decay(Duration::days(91), 1, 24 * 7).is_none());
    }

    #[test]
    fn test_clamps_to_configured_bounds() {
        let decision = decay(Duration::days(40), 2, 12).unwrap();
        assert_eq!(decision.interval_hours, 12);
    }

    #[test]
    fn test_never_completed_is_always_eligible() {
        let decision = DecayDecision { interval_hours: 24, band: "daily" };
        assert!(is_eligible(None, Utc::now(), decision));
    }

    #[test]
    fn test_recently_completed_is_not_yet_eligible() {
        let decision = DecayDecision { interval_hours: 24, band: "daily" };
        let now = Utc::now();
        assert!(!is_eligible(Some(now - Duration::hours(1)), now, decision));
        assert!(is_eligible(Some(now - Duration::hours(25)), now, decision));
    }
}
