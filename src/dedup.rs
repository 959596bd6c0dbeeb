use chrono::NaiveDate;
use std::collections::HashSet;

/// Seen-set for attendance uniqueness, scoped to one validation pass (or one
/// merge). A record's identity is (student, subject, session number,
/// location, date); the location is lowercased so case variants of one room
/// cannot double-count.
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: HashSet<(String, String, u32, String, NaiveDate)>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the key seen; returns false if it already was.
    pub fn is_new(
        &mut self,
        student_id: &str,
        subject: &str,
        session_number: u32,
        location: &str,
        date: NaiveDate,
    ) -> bool {
        self.seen.insert((
            student_id.to_string(),
            subject.to_string(),
            session_number,
            location.to_ascii_lowercase(),
            date,
        ))
    }
}
