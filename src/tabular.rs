use crate::model::{ScanEvent, Session, Student, ValidAttendanceRecord};
use crate::report::Sheet;
use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Workbooks are directories of `<Name>.csv` sheets, first row = header.
/// The desktop shell converts to/from .xlsx on its side of the boundary.

pub fn parse_date(s: &str) -> anyhow::Result<NaiveDate> {
    let t = s.trim();
    NaiveDate::parse_from_str(t, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(t, "%Y-%m-%d"))
        .with_context(|| format!("unparseable date: {:?}", s))
}

pub fn parse_time(s: &str) -> anyhow::Result<NaiveTime> {
    let t = s.trim();
    NaiveTime::parse_from_str(t, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
        .with_context(|| format!("unparseable time: {:?}", s))
}

pub fn read_sheet(path: &Path) -> anyhow::Result<(Vec<String>, Vec<Vec<String>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("cannot open sheet {}", path.display()))?;
    let header: Vec<String> = reader
        .headers()
        .with_context(|| format!("cannot read header of {}", path.display()))?
        .iter()
        .map(|s| s.trim().to_string())
        .collect();
    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("bad csv row in {}", path.display()))?;
        rows.push(record.iter().map(|s| s.trim().to_string()).collect());
    }
    Ok((header, rows))
}

pub fn write_workbook(dir: &Path, sheets: &[Sheet]) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("cannot create workbook dir {}", dir.display()))?;
    for sheet in sheets {
        let path = dir.join(format!("{}.csv", sheet.name));
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("cannot create sheet {}", path.display()))?;
        writer.write_record(&sheet.header)?;
        for row in &sheet.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
    }
    Ok(())
}

/// Finds a sheet file whose stem contains `name` (case-insensitive), the way
/// the source looked workbook sheets up by name fragment.
pub fn find_sheet(dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
    let needle = name.to_ascii_lowercase();
    let mut found: Vec<PathBuf> = Vec::new();
    for ent in std::fs::read_dir(dir)
        .with_context(|| format!("cannot open workbook dir {}", dir.display()))?
    {
        let p = ent?.path();
        if !p.is_file() {
            continue;
        }
        let stem = p
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if stem.contains(&needle) {
            found.push(p);
        }
    }
    found.sort();
    found
        .into_iter()
        .next()
        .with_context(|| format!("no sheet containing {:?} in {}", name, dir.display()))
}

fn column_index(header: &[String], name: &str) -> anyhow::Result<usize> {
    header
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .with_context(|| format!("required column {:?} is missing", name))
}

pub fn load_roster(path: &Path) -> anyhow::Result<HashMap<String, Student>> {
    let (header, rows) = read_sheet(path)?;
    let id_col = column_index(&header, "Student ID")?;
    let name_col = column_index(&header, "Name")?;
    let year_col = column_index(&header, "Year")?;
    let group_col = column_index(&header, "Group")?;

    let mut students: HashMap<String, Student> = HashMap::new();
    for row in rows {
        let Some(id) = row.get(id_col).filter(|v| !v.is_empty()) else {
            continue;
        };
        let student = Student::new(
            id.clone(),
            row.get(name_col).cloned().unwrap_or_default(),
            row.get(year_col).cloned().unwrap_or_default(),
            row.get(group_col).cloned().unwrap_or_default(),
        );
        students.insert(student.id.clone(), student);
    }
    Ok(students)
}

/// Loads the raw scan log. Rows whose date or time will not parse are
/// skipped and counted rather than failing the run.
pub fn load_log(path: &Path) -> anyhow::Result<(Vec<ScanEvent>, usize)> {
    let (header, rows) = read_sheet(path)?;
    if header.len() < 4 {
        bail!(
            "log sheet {} needs at least 4 columns (Student ID, Location, Date, Time)",
            path.display()
        );
    }

    let mut events: Vec<ScanEvent> = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        if row.len() < 4 || row[0].is_empty() {
            skipped += 1;
            continue;
        }
        let (Ok(date), Ok(time)) = (parse_date(&row[2]), parse_time(&row[3])) else {
            skipped += 1;
            continue;
        };
        events.push(ScanEvent {
            student_id: row[0].clone(),
            location: row[1].clone(),
            date,
            time,
        });
    }
    Ok((events, skipped))
}

/// Loads a schedule sheet: fixed column order
/// [Year, Group, Subject, Session, Location, Date, Start Time].
pub fn load_schedule(path: &Path) -> anyhow::Result<(Vec<Session>, usize)> {
    let (header, rows) = read_sheet(path)?;
    if header.len() < 7 {
        bail!(
            "schedule sheet {} needs 7 columns (Year, Group, Subject, Session, Location, Date, Start Time)",
            path.display()
        );
    }

    let mut sessions: Vec<Session> = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        if row.len() < 7 {
            skipped += 1;
            continue;
        }
        let (Ok(session_number), Ok(date), Ok(start_time)) = (
            row[3].parse::<u32>(),
            parse_date(&row[5]),
            parse_time(&row[6]),
        ) else {
            skipped += 1;
            continue;
        };
        sessions.push(Session {
            year: row[0].clone(),
            group: row[1].clone(),
            subject: row[2].clone(),
            session_number,
            location: row[4].clone(),
            date,
            start_time,
        });
    }
    Ok((sessions, skipped))
}

/// The previous report, read back as data: the roster snapshot embedded in
/// its Summary sheet and the already-reconciled attendance rows. The
/// spreadsheet itself stays outside the core; this is its data view.
#[derive(Debug)]
pub struct AttendanceSnapshot {
    pub students: HashMap<String, Student>,
    pub records: Vec<ValidAttendanceRecord>,
    pub skipped_rows: usize,
}

pub fn load_snapshot(workbook_dir: &Path) -> anyhow::Result<AttendanceSnapshot> {
    let summary_path = find_sheet(workbook_dir, "summary")?;
    let attendance_path = find_sheet(workbook_dir, "attendance")?;

    let (header, rows) = read_sheet(&summary_path)?;
    let id_col = column_index(&header, "Student ID")?;
    let name_col = column_index(&header, "Name")?;
    let year_col = column_index(&header, "Year")?;
    let group_col = column_index(&header, "Group")?;
    let mut students: HashMap<String, Student> = HashMap::new();
    for row in rows {
        let Some(id) = row.get(id_col).filter(|v| !v.is_empty()) else {
            continue;
        };
        let student = Student::new(
            id.clone(),
            row.get(name_col).cloned().unwrap_or_default(),
            row.get(year_col).cloned().unwrap_or_default(),
            row.get(group_col).cloned().unwrap_or_default(),
        );
        students.insert(student.id.clone(), student);
    }

    let (header, rows) = read_sheet(&attendance_path)?;
    let id_col = column_index(&header, "Student ID")?;
    let name_col = column_index(&header, "Name")?;
    let year_col = column_index(&header, "Year")?;
    let group_col = column_index(&header, "Group")?;
    let email_col = column_index(&header, "Email")?;
    let subject_col = column_index(&header, "Subject")?;
    let session_col = column_index(&header, "Session")?;
    let location_col = column_index(&header, "Location")?;
    let date_col = column_index(&header, "Date")?;
    let time_col = column_index(&header, "Time")?;
    let validation_col = header
        .iter()
        .position(|h| h.eq_ignore_ascii_case("Validation Group"));

    let mut records: Vec<ValidAttendanceRecord> = Vec::new();
    let mut skipped_rows = 0usize;
    for row in rows {
        let get = |i: usize| row.get(i).cloned().unwrap_or_default();
        if get(id_col).is_empty() {
            skipped_rows += 1;
            continue;
        }
        let (Ok(session_number), Ok(date), Ok(time)) = (
            get(session_col).parse::<u32>(),
            parse_date(&get(date_col)),
            parse_time(&get(time_col)),
        ) else {
            skipped_rows += 1;
            continue;
        };
        let validation_group = validation_col
            .map(|i| get(i))
            .filter(|v| !v.is_empty());
        records.push(ValidAttendanceRecord {
            student_id: get(id_col),
            name: get(name_col),
            year: get(year_col),
            group: get(group_col),
            email: get(email_col),
            subject: get(subject_col),
            session_number,
            location: get(location_col),
            date,
            time,
            validation_group,
        });
    }

    Ok(AttendanceSnapshot {
        students,
        records,
        skipped_rows,
    })
}

fn date_token(s: &str) -> Option<NaiveDate> {
    let bytes: Vec<char> = s.chars().collect();
    for window in bytes.windows(10) {
        let candidate: String = window.iter().collect();
        if let Ok(d) = NaiveDate::parse_from_str(&candidate, "%Y-%m-%d") {
            return Some(d);
        }
        if let Ok(d) = NaiveDate::parse_from_str(&candidate, "%d-%m-%Y") {
            return Some(d);
        }
    }
    None
}

/// Nominal date of a previous report: a date token in the workbook name,
/// else in any sheet stem, else the filesystem modification time.
pub fn nominal_report_date(workbook_dir: &Path) -> anyhow::Result<NaiveDate> {
    if let Some(name) = workbook_dir.file_name().and_then(|s| s.to_str()) {
        if let Some(d) = date_token(name) {
            return Ok(d);
        }
    }
    if let Ok(entries) = std::fs::read_dir(workbook_dir) {
        let mut stems: Vec<String> = entries
            .flatten()
            .filter_map(|e| {
                e.path()
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s.to_string())
            })
            .collect();
        stems.sort();
        for stem in stems {
            if let Some(d) = date_token(&stem) {
                return Ok(d);
            }
        }
    }
    let meta = std::fs::metadata(workbook_dir)
        .with_context(|| format!("cannot stat {}", workbook_dir.display()))?;
    let modified = meta
        .modified()
        .with_context(|| format!("no modification time for {}", workbook_dir.display()))?;
    Ok(DateTime::<Utc>::from(modified).date_naive())
}
