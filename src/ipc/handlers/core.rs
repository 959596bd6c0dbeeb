use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "thresholdPercent": (state.threshold * 100.0).round() as u32,
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(&req.params, "path") {
        Ok(p) => PathBuf::from(p),
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = std::fs::create_dir_all(&path) {
        return err(
            &req.id,
            "workspace_open_failed",
            format!("cannot use {}: {}", path.display(), e),
            None,
        );
    }
    state.workspace = Some(path.clone());
    ok(&req.id, json!({ "workspacePath": path.to_string_lossy() }))
}

fn set_threshold(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let percent = params
        .get("percent")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| HandlerErr::bad_params("missing percent"))?;
    if !(1..=100).contains(&percent) {
        return Err(HandlerErr::bad_params("percent must be between 1 and 100"));
    }
    state.threshold = percent as f64 / 100.0;
    Ok(json!({ "thresholdPercent": percent }))
}

fn handle_set_threshold(state: &mut AppState, req: &Request) -> serde_json::Value {
    match set_threshold(state, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "config.setThreshold" => Some(handle_set_threshold(state, req)),
        _ => None,
    }
}
