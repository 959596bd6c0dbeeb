use crate::model::{
    GroupKey, RequirementTree, Student, SubjectRequirement, TransferRecord, ValidAttendanceRecord,
};
use crate::status;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const DATE_FMT: &str = "%d/%m/%Y";
pub const TIME_FMT: &str = "%H:%M:%S";
pub const DATETIME_FMT: &str = "%d/%m/%Y %H:%M:%S";

const FIXED_COLUMNS: [&str; 12] = [
    "Student ID",
    "Name",
    "Year",
    "Group",
    "Email",
    "Status",
    "Percentage",
    "Sessions Needed",
    "Sessions Left",
    "Sessions Completed",
    "Total Required",
    "Total Attended",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountKind {
    Required,
    Attended,
}

/// One summary column. The plan is built once from the requirement tree and
/// then rendered; nothing downstream re-derives column positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Fixed(&'static str),
    SubjectTotal { subject: String, kind: CountKind },
    SessionDetail {
        subject: String,
        session: u32,
        location: String,
        kind: CountKind,
    },
}

impl Column {
    pub fn title(&self) -> String {
        match self {
            Column::Fixed(name) => (*name).to_string(),
            Column::SubjectTotal { subject, kind } => match kind {
                CountKind::Required => format!("Required {} (Total)", subject),
                CountKind::Attended => format!("Attended {} (Total)", subject),
            },
            Column::SessionDetail {
                subject,
                session,
                location,
                kind,
            } => {
                let tag = match kind {
                    CountKind::Required => "Req",
                    CountKind::Attended => "Att",
                };
                format!("{} S{} @ {} ({})", subject, session, location, tag)
            }
        }
    }
}

/// Ordered column list for the Summary sheet: the fixed columns, then per
/// subject (sorted) a required/attended total pair followed by a detail pair
/// for every (session x location) combination seen for that subject.
#[derive(Debug, Clone)]
pub struct ColumnPlan {
    pub columns: Vec<Column>,
}

impl ColumnPlan {
    pub fn from_tree(tree: &RequirementTree) -> Self {
        let mut subjects: BTreeMap<String, (BTreeSet<u32>, BTreeSet<String>)> = BTreeMap::new();
        for per_subject in tree.values() {
            for (subject, req) in per_subject {
                let entry = subjects.entry(subject.clone()).or_default();
                for (session, sess_req) in &req.sessions {
                    entry.0.insert(*session);
                    entry.1.extend(sess_req.locations.keys().cloned());
                }
            }
        }

        let mut columns: Vec<Column> = FIXED_COLUMNS.iter().map(|n| Column::Fixed(*n)).collect();
        for (subject, (sessions, locations)) in &subjects {
            for kind in [CountKind::Required, CountKind::Attended] {
                columns.push(Column::SubjectTotal {
                    subject: subject.clone(),
                    kind,
                });
            }
            for session in sessions {
                for location in locations {
                    for kind in [CountKind::Required, CountKind::Attended] {
                        columns.push(Column::SessionDetail {
                            subject: subject.clone(),
                            session: *session,
                            location: location.clone(),
                            kind,
                        });
                    }
                }
            }
        }
        Self { columns }
    }

    pub fn header(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.title()).collect()
    }
}

/// One sheet of the output workbook, already flattened to strings.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
struct AttendanceTally {
    total: u32,
    by_subject: BTreeMap<String, SubjectTally>,
}

#[derive(Debug, Clone, Default)]
struct SubjectTally {
    total: u32,
    by_detail: BTreeMap<(u32, String), u32>,
}

fn tally_for_student(records: &[ValidAttendanceRecord], student_id: &str) -> AttendanceTally {
    let mut tally = AttendanceTally::default();
    for r in records.iter().filter(|r| r.student_id == student_id) {
        tally.total += 1;
        let subj = tally.by_subject.entry(r.subject.clone()).or_default();
        subj.total += 1;
        *subj
            .by_detail
            .entry((r.session_number, r.location.clone()))
            .or_insert(0) += 1;
    }
    tally
}

pub struct SummaryInputs<'a> {
    pub students: &'a HashMap<String, Student>,
    pub target_year: &'a str,
    pub attendance: &'a BTreeMap<GroupKey, Vec<ValidAttendanceRecord>>,
    pub requirements: &'a RequirementTree,
    pub completed: &'a BTreeMap<GroupKey, u32>,
    pub total_required_sessions: u32,
    pub threshold: f64,
}

pub fn build_summary_sheet(plan: &ColumnPlan, inputs: &SummaryInputs) -> Sheet {
    let empty_subject = SubjectRequirement::default();
    let no_records: Vec<ValidAttendanceRecord> = Vec::new();

    let mut ids: Vec<&Student> = inputs
        .students
        .values()
        .filter(|s| s.year == inputs.target_year)
        .collect();
    ids.sort_by(|a, b| a.id.cmp(&b.id));

    let mut rows: Vec<Vec<String>> = Vec::with_capacity(ids.len());
    for student in ids {
        let key = student.group_key();
        let records = inputs.attendance.get(&key).unwrap_or(&no_records);
        let tally = tally_for_student(records, &student.id);
        let completed = inputs.completed.get(&key).copied().unwrap_or(0);
        let result = status::classify(
            tally.total,
            inputs.total_required_sessions,
            completed,
            inputs.threshold,
        );
        let group_reqs = inputs.requirements.get(&key);

        let mut row: Vec<String> = Vec::with_capacity(plan.columns.len());
        for column in &plan.columns {
            let cell = match column {
                Column::Fixed(name) => match *name {
                    "Student ID" => student.id.clone(),
                    "Name" => student.name.clone(),
                    "Year" => student.year.clone(),
                    "Group" => student.group.clone(),
                    "Email" => student.email.clone(),
                    "Status" => result.status.label().to_string(),
                    "Percentage" => format!("{:.1}%", result.percentage * 100.0),
                    "Sessions Needed" => result.sessions_needed.to_string(),
                    "Sessions Left" => result.sessions_left.to_string(),
                    "Sessions Completed" => completed.to_string(),
                    "Total Required" => inputs.total_required_sessions.to_string(),
                    "Total Attended" => tally.total.to_string(),
                    other => unreachable!("unknown fixed column {}", other),
                },
                Column::SubjectTotal { subject, kind } => {
                    let req = group_reqs
                        .and_then(|g| g.get(subject))
                        .unwrap_or(&empty_subject);
                    let att = tally.by_subject.get(subject);
                    match kind {
                        CountKind::Required => req.total.to_string(),
                        CountKind::Attended => {
                            att.map(|t| t.total).unwrap_or(0).to_string()
                        }
                    }
                }
                Column::SessionDetail {
                    subject,
                    session,
                    location,
                    kind,
                } => {
                    let count = match kind {
                        CountKind::Required => group_reqs
                            .and_then(|g| g.get(subject))
                            .and_then(|r| r.sessions.get(session))
                            .and_then(|s| s.locations.get(location))
                            .copied()
                            .unwrap_or(0),
                        CountKind::Attended => tally
                            .by_subject
                            .get(subject)
                            .and_then(|t| t.by_detail.get(&(*session, location.clone())))
                            .copied()
                            .unwrap_or(0),
                    };
                    count.to_string()
                }
            };
            row.push(cell);
        }
        rows.push(row);
    }

    Sheet {
        name: "Summary".to_string(),
        header: plan.header(),
        rows,
    }
}

pub fn build_attendance_sheet(
    attendance: &BTreeMap<GroupKey, Vec<ValidAttendanceRecord>>,
    include_validation_group: bool,
) -> Sheet {
    let mut header: Vec<String> = [
        "Student ID",
        "Name",
        "Year",
        "Group",
        "Email",
        "Subject",
        "Session",
        "Location",
        "Date",
        "Time",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    if include_validation_group {
        header.push("Validation Group".to_string());
    }

    let mut rows: Vec<Vec<String>> = Vec::new();
    for records in attendance.values() {
        for r in records {
            let mut row = vec![
                r.student_id.clone(),
                r.name.clone(),
                r.year.clone(),
                r.group.clone(),
                r.email.clone(),
                r.subject.clone(),
                r.session_number.to_string(),
                r.location.clone(),
                r.date.format(DATE_FMT).to_string(),
                r.time.format(TIME_FMT).to_string(),
            ];
            if include_validation_group {
                row.push(r.validation_group.clone().unwrap_or_default());
            }
            rows.push(row);
        }
    }

    Sheet {
        name: "Attendance".to_string(),
        header,
        rows,
    }
}

pub fn build_transfers_sheet(transfers: &[TransferRecord]) -> Sheet {
    let header = [
        "Student ID",
        "Name",
        "Year",
        "Group Before",
        "Group After",
        "Transfer Date",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let rows = transfers
        .iter()
        .map(|t| {
            vec![
                t.student_id.clone(),
                t.name.clone(),
                t.year.clone(),
                t.previous_group.clone(),
                t.current_group.clone(),
                t.transfer_date
                    .map(|d| d.format(DATETIME_FMT).to_string())
                    .unwrap_or_default(),
            ]
        })
        .collect();

    Sheet {
        name: "Transfers".to_string(),
        header,
        rows,
    }
}
