use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::BTreeMap;

pub const EMAIL_DOMAIN: &str = "med.asu.edu.eg";

/// Coarse bucket key: a (year, group) cohort, e.g. ("Year 2", "A3").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub year: String,
    pub group: String,
}

impl GroupKey {
    pub fn new(year: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            year: year.into(),
            group: group.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub year: String,
    pub group: String,
    pub email: String,
}

impl Student {
    pub fn new(id: String, name: String, year: String, group: String) -> Self {
        let email = format!("{}@{}", id, EMAIL_DOMAIN);
        Self {
            id,
            name,
            year,
            group,
            email,
        }
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(self.year.clone(), self.group.clone())
    }
}

/// One scheduled teaching event. Identity within a (year, group) bucket is
/// (location, date, start_time); the schedule is assumed to not double-book
/// a location at the same instant for one cohort.
#[derive(Debug, Clone)]
pub struct Session {
    pub year: String,
    pub group: String,
    pub subject: String,
    pub session_number: u32,
    pub location: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

impl Session {
    pub fn group_key(&self) -> GroupKey {
        GroupKey::new(self.year.clone(), self.group.clone())
    }

    pub fn start_datetime(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }
}

/// One raw badge/QR read from the log export.
#[derive(Debug, Clone)]
pub struct ScanEvent {
    pub student_id: String,
    pub location: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl ScanEvent {
    pub fn datetime(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// A scan event accepted as attendance for one scheduled session.
/// `validation_group` records which group's schedule validated it; it is
/// only set for students handled by the transfer-aware path.
#[derive(Debug, Clone)]
pub struct ValidAttendanceRecord {
    pub student_id: String,
    pub name: String,
    pub year: String,
    pub group: String,
    pub email: String,
    pub subject: String,
    pub session_number: u32,
    pub location: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub validation_group: Option<String>,
}

/// Requirement counts for one subject: total plus per-session, per-location
/// breakdown. Counts are counts of schedule entries, never of attendance.
#[derive(Debug, Clone, Default)]
pub struct SubjectRequirement {
    pub total: u32,
    pub sessions: BTreeMap<u32, SessionRequirement>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionRequirement {
    pub total: u32,
    pub locations: BTreeMap<String, u32>,
}

/// Full requirement tree: (year, group) -> subject -> counts.
pub type RequirementTree = BTreeMap<GroupKey, BTreeMap<String, SubjectRequirement>>;

/// A student whose roster group changed between two snapshots.
/// `transfer_date` is inferred from scan evidence; `None` means the move
/// could not be confirmed and the student validates against the current
/// group throughout.
#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub student_id: String,
    pub name: String,
    pub year: String,
    pub previous_group: String,
    pub current_group: String,
    pub transfer_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pass,
    Fail,
    HighRisk,
    ModerateRisk,
    LowRisk,
    NoRisk,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Pass => "Pass",
            Status::Fail => "Fail",
            Status::HighRisk => "High Risk",
            Status::ModerateRisk => "Moderate Risk",
            Status::LowRisk => "Low Risk",
            Status::NoRisk => "No Risk",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusResult {
    pub status: Status,
    pub percentage: f64,
    pub sessions_needed: u32,
    pub sessions_left: i64,
}
