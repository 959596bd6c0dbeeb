use crate::ipc::error::ok;
use crate::ipc::handlers::reconcile::{parse_mode, ScheduleEntry};
use crate::ipc::helpers::{optional_str, required_array, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{ScanEvent, Student};
use crate::report::{self, ColumnPlan, Sheet, SummaryInputs};
use crate::schedule::{self, RequirementMode};
use crate::tabular::AttendanceSnapshot;
use crate::{tabular, update};
use chrono::NaiveDate;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

fn process_entry(
    entry: &ScheduleEntry,
    workspace: &Path,
    snapshot: &AttendanceSnapshot,
    students: &HashMap<String, Student>,
    events: &[ScanEvent],
    cutoff: NaiveDate,
    threshold: f64,
    mode: RequirementMode,
) -> anyhow::Result<serde_json::Value> {
    let (sessions, skipped_schedule_rows) = tabular::load_schedule(&entry.schedule_path)?;
    let target_year = entry.target_year();

    let result = update::run_update(snapshot, students, events, &sessions, cutoff, &target_year);

    // Requirement and completed counts come from the full schedule: the
    // report reflects the whole term, only the validation was incremental.
    let completed = schedule::completed_sessions(&sessions);
    let requirements = schedule::calculate_requirements(&sessions, entry.total_required, mode);

    let plan = ColumnPlan::from_tree(&requirements);
    let summary = report::build_summary_sheet(
        &plan,
        &SummaryInputs {
            students,
            target_year: &target_year,
            attendance: &result.attendance,
            requirements: &requirements,
            completed: &completed,
            total_required_sessions: entry.total_required,
            threshold,
        },
    );
    let attendance_sheet = report::build_attendance_sheet(&result.attendance, true);
    let transfers_sheet = report::build_transfers_sheet(&result.transfers);
    let record_count: usize = result.attendance.values().map(Vec::len).sum();
    let sheets: Vec<Sheet> = vec![summary, attendance_sheet, transfers_sheet];

    let out_dir = entry.output_dir(workspace);
    tabular::write_workbook(&out_dir, &sheets)?;

    let transfers_json: Vec<serde_json::Value> = result
        .transfers
        .iter()
        .map(|t| {
            json!({
                "studentId": t.student_id,
                "previousGroup": t.previous_group,
                "currentGroup": t.current_group,
                "transferDate": t.transfer_date.map(|d| d.format(report::DATETIME_FMT).to_string()),
            })
        })
        .collect();

    Ok(json!({
        "year": entry.year,
        "module": entry.module,
        "ok": true,
        "outputPath": out_dir.to_string_lossy(),
        "students": sheets[0].rows.len(),
        "attendanceRecords": record_count,
        "mergedDuplicates": result.merged_duplicates,
        "transfers": transfers_json,
        "skippedScheduleRows": skipped_schedule_rows,
    }))
}

fn reconcile_update(
    state: &AppState,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let workspace = state
        .workspace
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let previous_path = PathBuf::from(required_str(params, "previousReportPath")?);
    let roster_path = PathBuf::from(required_str(params, "rosterPath")?);
    let log_path = PathBuf::from(required_str(params, "logPath")?);
    let entries = required_array(params, "schedules")?;
    let mode = parse_mode(params)?;

    let cutoff: NaiveDate = match optional_str(params, "previousReportDate") {
        Some(s) => tabular::parse_date(&s)
            .map_err(|e| HandlerErr::bad_params(format!("previousReportDate: {:#}", e)))?,
        None => tabular::nominal_report_date(&previous_path)
            .map_err(|e| HandlerErr::new("previous_report_failed", format!("{:#}", e)))?,
    };

    let snapshot = tabular::load_snapshot(&previous_path)
        .map_err(|e| HandlerErr::new("previous_report_failed", format!("{:#}", e)))?;
    let students = tabular::load_roster(&roster_path)
        .map_err(|e| HandlerErr::new("roster_load_failed", format!("{:#}", e)))?;
    let (events, skipped_log_rows) = tabular::load_log(&log_path)
        .map_err(|e| HandlerErr::new("log_load_failed", format!("{:#}", e)))?;

    // Each batch entry stands alone: one bad schedule file reports its own
    // error and the rest still produce workbooks.
    let mut reports: Vec<serde_json::Value> = Vec::with_capacity(entries.len());
    for value in entries {
        let entry = ScheduleEntry::parse(value)?;
        match process_entry(
            &entry,
            workspace,
            &snapshot,
            &students,
            &events,
            cutoff,
            state.threshold,
            mode,
        ) {
            Ok(result) => reports.push(result),
            Err(e) => reports.push(json!({
                "year": entry.year,
                "module": entry.module,
                "ok": false,
                "error": { "code": "schedule_failed", "message": format!("{:#}", e) },
            })),
        }
    }

    Ok(json!({
        "runId": Uuid::new_v4().to_string(),
        "cutoffDate": cutoff.format("%d/%m/%Y").to_string(),
        "thresholdPercent": (state.threshold * 100.0).round() as u32,
        "requirementMode": match mode {
            RequirementMode::Literal => "literal",
            RequirementMode::Proportional => "proportional",
        },
        "skippedLogRows": skipped_log_rows,
        "skippedPreviousRows": snapshot.skipped_rows,
        "reports": reports,
    }))
}

fn handle_reconcile_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    match reconcile_update(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reconcile.update" => Some(handle_reconcile_update(state, req)),
        _ => None,
    }
}
