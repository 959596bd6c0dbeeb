use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_THRESHOLD: f64 = 0.75;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    /// Output root; report workbooks land under
    /// `<workspace>/attendance_reports/Year_<N>/`.
    pub workspace: Option<PathBuf>,
    /// Mandatory-attendance fraction, user-settable 1..=100 percent.
    pub threshold: f64,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            workspace: None,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}
