use crate::dedup::DedupSet;
use crate::model::{GroupKey, ScanEvent, Session, Student, TransferRecord, ValidAttendanceRecord};
use crate::schedule::SessionIndex;
use crate::tabular::AttendanceSnapshot;
use crate::transfer;
use crate::validate::{self, TransferPlan};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
pub struct UpdateResult {
    /// Previous attendance merged with newly validated records, bucketed by
    /// each student's current roster (year, group).
    pub attendance: BTreeMap<GroupKey, Vec<ValidAttendanceRecord>>,
    pub transfers: Vec<TransferRecord>,
    /// Newly validated records dropped because the previous sheet already
    /// held the same (student, subject, session, location, date) tuple.
    pub merged_duplicates: usize,
}

/// Incremental reconciliation: only scans and sessions on/after the cutoff
/// are revalidated; everything before it is taken from the previous report
/// as-is. Students whose roster group changed since that report get their
/// transfer date inferred from scan evidence and are validated against the
/// correct group on each side of it.
pub fn run_update(
    snapshot: &AttendanceSnapshot,
    students: &HashMap<String, Student>,
    events: &[ScanEvent],
    sessions: &[Session],
    cutoff: NaiveDate,
    target_year: &str,
) -> UpdateResult {
    // Post-cutoff slices. The pre-cutoff story is already reconciled.
    let new_sessions: Vec<Session> = sessions
        .iter()
        .filter(|s| s.date >= cutoff)
        .cloned()
        .collect();
    let mut new_events: Vec<ScanEvent> = events
        .iter()
        .filter(|e| e.date >= cutoff)
        .cloned()
        .collect();
    new_events.sort_by_key(|e| e.datetime());

    let index = SessionIndex::build(&new_sessions);

    // Roster diff on group: same id, different group in the two snapshots.
    // Scoped to the run's year; other cohorts belong to other modules' runs.
    let mut transfers: Vec<TransferRecord> = Vec::new();
    let mut plans: HashMap<String, TransferPlan> = HashMap::new();
    let mut moved_ids: Vec<&Student> = students
        .values()
        .filter(|now| {
            now.year == target_year
                && snapshot
                    .students
                    .get(&now.id)
                    .is_some_and(|was| was.group != now.group)
        })
        .collect();
    moved_ids.sort_by(|a, b| a.id.cmp(&b.id));

    for now in moved_ids {
        let was = &snapshot.students[&now.id];
        let own_events: Vec<ScanEvent> = new_events
            .iter()
            .filter(|e| e.student_id == now.id)
            .cloned()
            .collect();
        let transfer_date = transfer::infer_transfer_date(
            &own_events,
            index.group(&GroupKey::new(now.year.clone(), was.group.clone())),
            index.group(&now.group_key()),
        );
        transfers.push(TransferRecord {
            student_id: now.id.clone(),
            name: now.name.clone(),
            year: now.year.clone(),
            previous_group: was.group.clone(),
            current_group: now.group.clone(),
            transfer_date,
        });
        plans.insert(
            now.id.clone(),
            TransferPlan {
                previous_group: was.group.clone(),
                current_group: now.group.clone(),
                transfer_date,
            },
        );
    }

    let new_attendance =
        validate::validate_with_transfers(&new_events, &index, students, target_year, &plans);

    // Merge, previous records first so they win the cross-merge dedup.
    let mut dedup = DedupSet::new();
    let mut attendance: BTreeMap<GroupKey, Vec<ValidAttendanceRecord>> = BTreeMap::new();
    let mut merged_duplicates = 0usize;

    let mut push = |record: ValidAttendanceRecord| {
        if dedup.is_new(
            &record.student_id,
            &record.subject,
            record.session_number,
            &record.location,
            record.date,
        ) {
            // Bucket by the student's current roster key so a transferred
            // student's whole history aggregates under one summary row.
            let key = students
                .get(&record.student_id)
                .map(|s| s.group_key())
                .unwrap_or_else(|| GroupKey::new(record.year.clone(), record.group.clone()));
            attendance.entry(key).or_default().push(record);
        } else {
            merged_duplicates += 1;
        }
    };

    for record in &snapshot.records {
        push(record.clone());
    }
    for records in new_attendance.into_values() {
        for record in records {
            push(record);
        }
    }

    UpdateResult {
        attendance,
        transfers,
        merged_duplicates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn student(id: &str, group: &str) -> Student {
        Student::new(
            id.to_string(),
            format!("Student {}", id),
            "Year 2".to_string(),
            group.to_string(),
        )
    }

    fn session(group: &str, n: u32, location: &str, day: u32) -> Session {
        Session {
            year: "Year 2".to_string(),
            group: group.to_string(),
            subject: "Anatomy".to_string(),
            session_number: n,
            location: location.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        }
    }

    fn scan(id: &str, location: &str, day: u32) -> ScanEvent {
        ScanEvent {
            student_id: id.to_string(),
            location: location.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            time: NaiveTime::from_hms_opt(9, 5, 0).unwrap(),
        }
    }

    fn record(id: &str, group: &str, n: u32, location: &str, day: u32) -> ValidAttendanceRecord {
        ValidAttendanceRecord {
            student_id: id.to_string(),
            name: format!("Student {}", id),
            year: "Year 2".to_string(),
            group: group.to_string(),
            email: format!("{}@{}", id, crate::model::EMAIL_DOMAIN),
            subject: "Anatomy".to_string(),
            session_number: n,
            location: location.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            time: NaiveTime::from_hms_opt(9, 5, 0).unwrap(),
            validation_group: None,
        }
    }

    fn snapshot(students: Vec<Student>, records: Vec<ValidAttendanceRecord>) -> AttendanceSnapshot {
        AttendanceSnapshot {
            students: students.into_iter().map(|s| (s.id.clone(), s)).collect(),
            records,
            skipped_rows: 0,
        }
    }

    #[test]
    fn merge_drops_cross_duplicates() {
        let snap = snapshot(
            vec![student("101", "A3")],
            vec![record("101", "A3", 1, "Hall 1", 10)],
        );
        let students: HashMap<String, Student> =
            [("101".to_string(), student("101", "A3"))].into();
        // The cumulative log re-contains the scan already reconciled.
        let sessions = vec![session("A3", 1, "Hall 1", 10)];
        let events = vec![scan("101", "Hall 1", 10)];
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let out = run_update(&snap, &students, &events, &sessions, cutoff, "Year 2");
        let records = &out.attendance[&GroupKey::new("Year 2", "A3")];
        assert_eq!(records.len(), 1);
        assert_eq!(out.merged_duplicates, 1);
        assert!(out.transfers.is_empty());
    }

    #[test]
    fn pre_cutoff_events_and_sessions_are_not_revalidated() {
        let snap = snapshot(vec![student("101", "A3")], vec![]);
        let students: HashMap<String, Student> =
            [("101".to_string(), student("101", "A3"))].into();
        let sessions = vec![session("A3", 1, "Hall 1", 5)];
        let events = vec![scan("101", "Hall 1", 5)];
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 8).unwrap();
        let out = run_update(&snap, &students, &events, &sessions, cutoff, "Year 2");
        assert!(out.attendance.is_empty());
    }

    #[test]
    fn transferred_student_history_aggregates_under_current_group() {
        // Previous report: 101 in A3 with one old record. New roster: B1.
        // Post-cutoff evidence: three B1 sessions attended.
        let snap = snapshot(
            vec![student("101", "A3")],
            vec![record("101", "A3", 1, "Hall 1", 2)],
        );
        let students: HashMap<String, Student> =
            [("101".to_string(), student("101", "B1"))].into();
        let sessions = vec![
            session("B1", 2, "Hall B", 10),
            session("B1", 3, "Hall B", 11),
            session("B1", 4, "Hall B", 12),
        ];
        let events = vec![
            scan("101", "Hall B", 10),
            scan("101", "Hall B", 11),
            scan("101", "Hall B", 12),
        ];
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 8).unwrap();
        let out = run_update(&snap, &students, &events, &sessions, cutoff, "Year 2");

        assert_eq!(out.transfers.len(), 1);
        let t = &out.transfers[0];
        assert_eq!(t.previous_group, "A3");
        assert_eq!(t.current_group, "B1");
        assert_eq!(
            t.transfer_date,
            Some(
                NaiveDate::from_ymd_opt(2025, 3, 10)
                    .unwrap()
                    .and_hms_opt(9, 5, 0)
                    .unwrap()
            )
        );

        // All four records (one old, three new) under the B1 key.
        let records = &out.attendance[&GroupKey::new("Year 2", "B1")];
        assert_eq!(records.len(), 4);
        assert!(records
            .iter()
            .filter(|r| r.validation_group.is_some())
            .all(|r| r.validation_group.as_deref() == Some("B1")));
    }

    #[test]
    fn other_year_roster_changes_are_ignored() {
        // A Year 3 student also moved groups; a Year 2 run must not list
        // them in its transfers or try to analyze them.
        let mut junior_was = student("301", "C1");
        junior_was.year = "Year 3".to_string();
        let mut junior_now = student("301", "C2");
        junior_now.year = "Year 3".to_string();
        let snap = snapshot(vec![student("101", "A3"), junior_was], vec![]);
        let students: HashMap<String, Student> = [
            ("101".to_string(), student("101", "B1")),
            ("301".to_string(), junior_now),
        ]
        .into();
        let sessions = vec![session("B1", 1, "Hall B", 10)];
        let events = vec![scan("101", "Hall B", 10)];
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let out = run_update(&snap, &students, &events, &sessions, cutoff, "Year 2");
        assert_eq!(out.transfers.len(), 1);
        assert_eq!(out.transfers[0].student_id, "101");
    }

    #[test]
    fn unconfirmed_transfer_validates_against_current_group() {
        let snap = snapshot(vec![student("101", "A3")], vec![]);
        let students: HashMap<String, Student> =
            [("101".to_string(), student("101", "B1"))].into();
        // Only the old group has a session the student scanned into; the
        // validator must still look it up under B1 and find nothing.
        let sessions = vec![session("A3", 1, "Hall 1", 10)];
        let events = vec![scan("101", "Hall 1", 10)];
        let cutoff = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let out = run_update(&snap, &students, &events, &sessions, cutoff, "Year 2");
        assert_eq!(out.transfers.len(), 1);
        assert!(out.transfers[0].transfer_date.is_none());
        assert!(out.attendance.is_empty());
    }
}
