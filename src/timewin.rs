use chrono::{Duration, NaiveDateTime, Timelike};

/// Acceptance window around a session start, in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub before_minutes: i64,
    pub after_minutes: i64,
}

/// Window for sessions starting outside the exception-hour list.
pub const STANDARD_WINDOW: TimeWindow = TimeWindow {
    before_minutes: 15,
    after_minutes: 150,
};

/// Window for sessions starting at an exception hour. Currently identical to
/// the standard window; the split is kept so the constants can diverge again
/// without touching the matching code.
pub const EXCEPTION_WINDOW: TimeWindow = TimeWindow {
    before_minutes: 15,
    after_minutes: 150,
};

/// Session start hours that historically used different window constants.
pub const EXCEPTION_HOURS: [u32; 5] = [12, 1, 13, 3, 15];

/// Picks the window for a session by its start hour.
pub fn window_for(session_start: NaiveDateTime) -> TimeWindow {
    if EXCEPTION_HOURS.contains(&session_start.hour()) {
        EXCEPTION_WINDOW
    } else {
        STANDARD_WINDOW
    }
}

/// True iff the scan falls inside the session's acceptance window, bounds
/// inclusive. Location equality is the caller's precondition, not checked
/// here.
pub fn matches(event: NaiveDateTime, session_start: NaiveDateTime) -> bool {
    let w = window_for(session_start);
    let lo = session_start - Duration::minutes(w.before_minutes);
    let hi = session_start + Duration::minutes(w.after_minutes);
    lo <= event && event <= hi
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let start = dt(9, 0, 0);
        assert!(matches(dt(8, 45, 0), start));
        assert!(matches(dt(11, 30, 0), start));
        assert!(!matches(dt(8, 44, 59), start));
        assert!(!matches(dt(11, 30, 1), start));
    }

    #[test]
    fn exception_hours_currently_match_standard() {
        // 13:00 is on the exception list; the window must still be 15/150.
        let start = dt(13, 0, 0);
        assert_eq!(window_for(start), EXCEPTION_WINDOW);
        assert!(matches(dt(12, 45, 0), start));
        assert!(matches(dt(15, 30, 0), start));
        assert!(!matches(dt(12, 44, 59), start));
        assert!(!matches(dt(15, 30, 1), start));
    }

    #[test]
    fn scan_inside_window_matches() {
        let start = dt(10, 15, 0);
        assert!(matches(dt(10, 14, 0), start));
        assert!(matches(dt(12, 0, 0), start));
        assert!(!matches(dt(13, 0, 0), start));
    }
}
