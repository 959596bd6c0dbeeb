use crate::model::ScanEvent;
use crate::schedule::GroupSessions;
use crate::timewin;
use chrono::NaiveDateTime;

/// Consecutive new-group matches needed before a transfer date is trusted.
/// Shorter runs can be a student scanning into a friend's session.
pub const TRANSFER_CONFIRMATION_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SideLabel {
    Previous,
    Current,
    Both,
}

fn matches_group(event: &ScanEvent, sessions: Option<&GroupSessions>) -> bool {
    let Some(bucket) = sessions else {
        return false;
    };
    bucket
        .candidates(&event.location, event.date)
        .iter()
        .any(|s| timewin::matches(event.datetime(), s.start_datetime()))
}

/// Infers when a student moved from `previous` to `current` from scan
/// evidence alone. Events must be in ascending time order. Each event is
/// classified against both schedules (no dedup state; this pass only
/// labels). The transfer date is the first event of the first run of at
/// least [`TRANSFER_CONFIRMATION_THRESHOLD`] consecutive current-only
/// matches; with no such run the first current-only event is a weak
/// fallback; with no current-only evidence at all the transfer is
/// unconfirmed and `None` is returned.
pub fn infer_transfer_date(
    events: &[ScanEvent],
    previous: Option<&GroupSessions>,
    current: Option<&GroupSessions>,
) -> Option<NaiveDateTime> {
    let mut labels: Vec<(SideLabel, NaiveDateTime)> = Vec::new();
    for event in events {
        let in_previous = matches_group(event, previous);
        let in_current = matches_group(event, current);
        let label = match (in_previous, in_current) {
            (true, true) => SideLabel::Both,
            (true, false) => SideLabel::Previous,
            (false, true) => SideLabel::Current,
            (false, false) => continue,
        };
        labels.push((label, event.datetime()));
    }

    let mut run_start: Option<NaiveDateTime> = None;
    let mut run_len = 0usize;
    let mut first_current: Option<NaiveDateTime> = None;
    for (label, at) in &labels {
        if *label == SideLabel::Current {
            if first_current.is_none() {
                first_current = Some(*at);
            }
            if run_len == 0 {
                run_start = Some(*at);
            }
            run_len += 1;
            if run_len >= TRANSFER_CONFIRMATION_THRESHOLD {
                return run_start;
            }
        } else {
            // "Both" is ambiguous and breaks the run; a genuine transfer
            // shows up as unambiguous new-group matches.
            run_len = 0;
            run_start = None;
        }
    }
    first_current
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Session;
    use crate::schedule::SessionIndex;
    use crate::model::GroupKey;
    use chrono::{NaiveDate, NaiveTime};

    fn session(group: &str, location: &str, day: u32, hour: u32) -> Session {
        Session {
            year: "Year 2".to_string(),
            group: group.to_string(),
            subject: "Anatomy".to_string(),
            session_number: 1,
            location: location.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        }
    }

    fn scan(location: &str, day: u32, hour: u32) -> ScanEvent {
        ScanEvent {
            student_id: "101".to_string(),
            location: location.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            time: NaiveTime::from_hms_opt(hour, 5, 0).unwrap(),
        }
    }

    fn build(groups: Vec<Session>) -> SessionIndex {
        SessionIndex::build(&groups)
    }

    #[test]
    fn confirmed_run_dates_transfer_to_its_first_event() {
        // Old group meets in Hall A, new group in Hall B, disjoint days.
        let index = build(vec![
            session("A3", "Hall A", 3, 9),
            session("A3", "Hall A", 4, 9),
            session("B1", "Hall B", 10, 9),
            session("B1", "Hall B", 11, 9),
            session("B1", "Hall B", 12, 9),
            session("B1", "Hall B", 13, 9),
        ]);
        let prev = index.group(&GroupKey::new("Year 2", "A3"));
        let curr = index.group(&GroupKey::new("Year 2", "B1"));
        let events = vec![
            scan("Hall A", 3, 9),
            scan("Hall A", 4, 9),
            scan("Hall B", 10, 9),
            scan("Hall B", 11, 9),
            scan("Hall B", 12, 9),
            scan("Hall B", 13, 9),
        ];
        let inferred = infer_transfer_date(&events, prev, curr).expect("confirmed");
        assert_eq!(inferred, events[2].datetime());
    }

    #[test]
    fn short_run_falls_back_to_first_current_event() {
        let index = build(vec![
            session("A3", "Hall A", 3, 9),
            session("A3", "Hall A", 5, 9),
            session("B1", "Hall B", 4, 9),
        ]);
        let prev = index.group(&GroupKey::new("Year 2", "A3"));
        let curr = index.group(&GroupKey::new("Year 2", "B1"));
        // One stray new-group scan sandwiched between old-group ones.
        let events = vec![scan("Hall A", 3, 9), scan("Hall B", 4, 9), scan("Hall A", 5, 9)];
        let inferred = infer_transfer_date(&events, prev, curr).expect("weak fallback");
        assert_eq!(inferred, events[1].datetime());
    }

    #[test]
    fn no_current_evidence_returns_none() {
        let index = build(vec![
            session("A3", "Hall A", 3, 9),
            session("B1", "Hall B", 10, 9),
        ]);
        let prev = index.group(&GroupKey::new("Year 2", "A3"));
        let curr = index.group(&GroupKey::new("Year 2", "B1"));
        let events = vec![scan("Hall A", 3, 9), scan("Cafeteria", 7, 12)];
        assert!(infer_transfer_date(&events, prev, curr).is_none());
    }

    #[test]
    fn ambiguous_both_matches_break_the_run() {
        // Day 10-12: both groups meet in the shared hall, so those scans are
        // ambiguous. Only days 13-15 are current-only.
        let mut sessions = vec![];
        for day in 10..=12 {
            sessions.push(session("A3", "Shared Hall", day, 9));
            sessions.push(session("B1", "Shared Hall", day, 9));
        }
        for day in 13..=15 {
            sessions.push(session("B1", "Hall B", day, 9));
        }
        let index = build(sessions);
        let prev = index.group(&GroupKey::new("Year 2", "A3"));
        let curr = index.group(&GroupKey::new("Year 2", "B1"));
        let events = vec![
            scan("Shared Hall", 10, 9),
            scan("Shared Hall", 11, 9),
            scan("Shared Hall", 12, 9),
            scan("Hall B", 13, 9),
            scan("Hall B", 14, 9),
            scan("Hall B", 15, 9),
        ];
        let inferred = infer_transfer_date(&events, prev, curr).expect("confirmed");
        assert_eq!(inferred, events[3].datetime());
    }
}
