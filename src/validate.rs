use crate::dedup::DedupSet;
use crate::model::{GroupKey, ScanEvent, Student, ValidAttendanceRecord};
use crate::schedule::SessionIndex;
use crate::timewin;
use chrono::NaiveDateTime;
use std::collections::{BTreeMap, HashMap};

/// Per-event group routing for a transferred student: events before the
/// inferred transfer date validate against the previous group's schedule,
/// later ones against the current group's. No confirmed date means the
/// current group is used throughout.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    pub previous_group: String,
    pub current_group: String,
    pub transfer_date: Option<NaiveDateTime>,
}

impl TransferPlan {
    fn group_for(&self, at: NaiveDateTime) -> &str {
        match self.transfer_date {
            Some(cutover) if at < cutover => &self.previous_group,
            _ => &self.current_group,
        }
    }
}

/// Matches scan events to scheduled sessions, one attendance credit per
/// event at most (first match in start-time order wins) and one credit per
/// (student, subject, session, location, date) at most across the pass.
pub fn validate(
    events: &[ScanEvent],
    index: &SessionIndex,
    students: &HashMap<String, Student>,
    target_year: &str,
) -> BTreeMap<GroupKey, Vec<ValidAttendanceRecord>> {
    validate_with_transfers(events, index, students, target_year, &HashMap::new())
}

pub fn validate_with_transfers(
    events: &[ScanEvent],
    index: &SessionIndex,
    students: &HashMap<String, Student>,
    target_year: &str,
    transfers: &HashMap<String, TransferPlan>,
) -> BTreeMap<GroupKey, Vec<ValidAttendanceRecord>> {
    let mut out: BTreeMap<GroupKey, Vec<ValidAttendanceRecord>> = BTreeMap::new();
    let mut dedup = DedupSet::new();

    for event in events {
        // Unknown badge ids are normal in a shared scanner log.
        let Some(student) = students.get(&event.student_id) else {
            continue;
        };
        if student.year != target_year {
            continue;
        }

        let plan = transfers.get(&student.id);
        let validation_group = plan.map(|p| p.group_for(event.datetime()).to_string());
        let lookup_group = validation_group.as_deref().unwrap_or(student.group.as_str());

        let key = GroupKey::new(student.year.clone(), lookup_group.to_string());
        let Some(bucket) = index.group(&key) else {
            continue;
        };

        for session in bucket.candidates(&event.location, event.date) {
            if !timewin::matches(event.datetime(), session.start_datetime()) {
                continue;
            }
            if dedup.is_new(
                &student.id,
                &session.subject,
                session.session_number,
                &session.location,
                session.date,
            ) {
                out.entry(student.group_key())
                    .or_default()
                    .push(ValidAttendanceRecord {
                        student_id: student.id.clone(),
                        name: student.name.clone(),
                        year: student.year.clone(),
                        group: student.group.clone(),
                        email: student.email.clone(),
                        subject: session.subject.clone(),
                        session_number: session.session_number,
                        location: session.location.clone(),
                        date: session.date,
                        time: event.time,
                        validation_group: validation_group.clone(),
                    });
            }
            // One scan never satisfies more than one session.
            break;
        }
    }
    out
}
