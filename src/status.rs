use crate::model::{Status, StatusResult};

/// Classifies one student's standing from attended/required/completed totals.
/// Pure; consumes only the requirement tree's totals, so it is agnostic to
/// which requirement mode produced them.
pub fn classify(
    total_attended: u32,
    total_required_sessions: u32,
    sessions_completed: u32,
    threshold: f64,
) -> StatusResult {
    let required = (threshold * total_required_sessions as f64).ceil() as u32;
    let sessions_left = total_required_sessions as i64 - sessions_completed as i64;
    let max_possible = total_attended as i64 + sessions_left;
    let sessions_needed = required.saturating_sub(total_attended);

    let status = if sessions_completed >= total_required_sessions {
        if total_attended >= required {
            Status::Pass
        } else {
            Status::Fail
        }
    } else if max_possible < required as i64 {
        // Cannot reach the threshold even with perfect attendance from here.
        Status::Fail
    } else if total_attended >= required {
        Status::Pass
    } else {
        let margin = sessions_left - sessions_needed as i64;
        if margin <= 1 {
            Status::HighRisk
        } else if margin <= 3 {
            Status::ModerateRisk
        } else if margin <= 5 {
            Status::LowRisk
        } else {
            Status::NoRisk
        }
    };

    let percentage = if total_required_sessions > 0 {
        total_attended as f64 / total_required_sessions as f64
    } else {
        0.0
    };

    StatusResult {
        status,
        percentage,
        sessions_needed,
        sessions_left,
    }
}
