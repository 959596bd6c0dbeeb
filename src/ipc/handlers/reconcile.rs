use crate::ipc::error::ok;
use crate::ipc::helpers::{optional_str, required_array, required_str, required_u32, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::report::{self, ColumnPlan, Sheet, SummaryInputs};
use crate::schedule::{self, RequirementMode};
use crate::model::{ScanEvent, Student};
use crate::{tabular, validate};
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct ScheduleEntry {
    pub year: u32,
    pub module: String,
    pub schedule_path: PathBuf,
    pub total_required: u32,
}

impl ScheduleEntry {
    pub fn parse(value: &serde_json::Value) -> Result<Self, HandlerErr> {
        Ok(Self {
            year: required_u32(value, "year")?,
            module: required_str(value, "module")?,
            schedule_path: PathBuf::from(required_str(value, "schedulePath")?),
            total_required: required_u32(value, "totalRequired")?,
        })
    }

    pub fn target_year(&self) -> String {
        format!("Year {}", self.year)
    }

    pub fn output_dir(&self, workspace: &Path) -> PathBuf {
        workspace
            .join("attendance_reports")
            .join(format!("Year_{}", self.year))
            .join(format!("Y{}_{}_attendance", self.year, self.module))
    }
}

pub fn parse_mode(params: &serde_json::Value) -> Result<RequirementMode, HandlerErr> {
    match optional_str(params, "requirementMode") {
        None => Ok(RequirementMode::Literal),
        Some(s) => RequirementMode::parse(&s).ok_or_else(|| {
            HandlerErr::bad_params("requirementMode must be \"literal\" or \"proportional\"")
        }),
    }
}

fn process_entry(
    entry: &ScheduleEntry,
    workspace: &Path,
    students: &HashMap<String, Student>,
    events: &[ScanEvent],
    threshold: f64,
    mode: RequirementMode,
) -> anyhow::Result<serde_json::Value> {
    let (sessions, skipped_schedule_rows) = tabular::load_schedule(&entry.schedule_path)?;
    let target_year = entry.target_year();

    let completed = schedule::completed_sessions(&sessions);
    let requirements = schedule::calculate_requirements(&sessions, entry.total_required, mode);
    let index = schedule::SessionIndex::build(&sessions);
    let attendance = validate::validate(events, &index, students, &target_year);

    let plan = ColumnPlan::from_tree(&requirements);
    let summary = report::build_summary_sheet(
        &plan,
        &SummaryInputs {
            students,
            target_year: &target_year,
            attendance: &attendance,
            requirements: &requirements,
            completed: &completed,
            total_required_sessions: entry.total_required,
            threshold,
        },
    );
    let attendance_sheet = report::build_attendance_sheet(&attendance, false);
    let record_count: usize = attendance.values().map(Vec::len).sum();
    let sheets: Vec<Sheet> = vec![summary, attendance_sheet];

    let out_dir = entry.output_dir(workspace);
    tabular::write_workbook(&out_dir, &sheets)?;

    Ok(json!({
        "year": entry.year,
        "module": entry.module,
        "ok": true,
        "outputPath": out_dir.to_string_lossy(),
        "students": sheets[0].rows.len(),
        "attendanceRecords": record_count,
        "skippedScheduleRows": skipped_schedule_rows,
    }))
}

fn reconcile_run(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let workspace = state
        .workspace
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let roster_path = PathBuf::from(required_str(params, "rosterPath")?);
    let log_path = PathBuf::from(required_str(params, "logPath")?);
    let entries = required_array(params, "schedules")?;
    let mode = parse_mode(params)?;

    let students = tabular::load_roster(&roster_path)
        .map_err(|e| HandlerErr::new("roster_load_failed", format!("{:#}", e)))?;
    let (events, skipped_log_rows) = tabular::load_log(&log_path)
        .map_err(|e| HandlerErr::new("log_load_failed", format!("{:#}", e)))?;

    // Each batch entry stands alone: one bad schedule file reports its own
    // error and the rest still produce workbooks.
    let mut reports: Vec<serde_json::Value> = Vec::with_capacity(entries.len());
    for value in entries {
        let entry = ScheduleEntry::parse(value)?;
        match process_entry(&entry, workspace, &students, &events, state.threshold, mode) {
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
        "thresholdPercent": (state.threshold * 100.0).round() as u32,
        "requirementMode": match mode {
            RequirementMode::Literal => "literal",
            RequirementMode::Proportional => "proportional",
        },
        "skippedLogRows": skipped_log_rows,
        "reports": reports,
    }))
}

fn handle_reconcile_run(state: &mut AppState, req: &Request) -> serde_json::Value {
    match reconcile_run(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reconcile.run" => Some(handle_reconcile_run(state, req)),
        _ => None,
    }
}
