use crate::iep::{self, IepPatch, IepStatus};
use crate::ipc::error::{engine_err, err, ok_json};
use crate::ipc::helpers::{db_conn, optional_str, parse_opt_string, required_str, today};
use crate::ipc::types::{AppState, Request};
use crate::risk;
use crate::store::Store;
use serde_json::Value as JsonValue;

/// Text fields accepted in `patch` / `overrides`. Unknown keys are rejected.
fn parse_patch(req: &Request, key: &str) -> Result<IepPatch, JsonValue> {
    let raw = match req.params.get(key) {
        None => return Ok(IepPatch::default()),
        Some(v) if v.is_null() => return Ok(IepPatch::default()),
        Some(v) => v,
    };
    let Some(obj) = raw.as_object() else {
        return Err(err(&req.id, "bad_params", format!("{} must be an object", key), None));
    };

    let mut patch = IepPatch::default();
    for (k, v) in obj {
        let slot = match k.as_str() {
            "strengths" => &mut patch.strengths,
            "areasOfConcern" => &mut patch.areas_of_concern,
            "learningGoals" => &mut patch.learning_goals,
            "interventions" => &mut patch.interventions,
            "reviewDate" => &mut patch.review_date,
            other => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    format!("{}.{} is not editable", key, other),
                    None,
                ))
            }
        };
        // Text fields may be cleared to an empty string; only null means "unchanged".
        *slot = if k != "reviewDate" && v.as_str().map(|s| s.trim().is_empty()) == Some(true) {
            Some(String::new())
        } else {
            parse_opt_string(Some(v))
                .map_err(|m| err(&req.id, "bad_params", format!("{}.{} {}", key, k, m), None))?
        };
    }
    Ok(patch)
}

fn handle_suggest(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let classroom_id = match required_str(req, "classroomId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match risk::compute_iep_suggestions(&Store::new(conn), &student_id, &classroom_id, today()) {
        Ok(s) => ok_json(&req.id, "suggestion", &s),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let classroom_id = match required_str(req, "classroomId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let overrides = match parse_patch(req, "overrides") {
        Ok(p) => p,
        Err(e) => return e,
    };

    match iep::create_draft(conn, &student_id, &classroom_id, &overrides, today()) {
        Ok(report) => ok_json(&req.id, "report", &report),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_get(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let report_id = match required_str(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match iep::get_report(conn, &report_id) {
        Ok(report) => ok_json(&req.id, "report", &report),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match optional_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let classroom_id = match optional_str(req, "classroomId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match iep::list_reports(conn, student_id.as_deref(), classroom_id.as_deref()) {
        Ok(reports) => ok_json(&req.id, "reports", &reports),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_update(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let report_id = match required_str(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = match parse_patch(req, "patch") {
        Ok(p) => p,
        Err(e) => return e,
    };
    match iep::update_report(conn, &report_id, &patch) {
        Ok(report) => ok_json(&req.id, "report", &report),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_set_status(state: &mut AppState, req: &Request) -> JsonValue {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let report_id = match required_str(req, "reportId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let raw_status = match required_str(req, "status") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(status) = IepStatus::parse(&raw_status) else {
        return err(
            &req.id,
            "bad_params",
            "status must be one of draft, active, reviewed, archived",
            None,
        );
    };
    match iep::set_status(conn, &report_id, status) {
        Ok(report) => ok_json(&req.id, "report", &report),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<JsonValue> {
    match req.method.as_str() {
        "iep.suggest" => Some(handle_suggest(state, req)),
        "iep.create" => Some(handle_create(state, req)),
        "iep.get" => Some(handle_get(state, req)),
        "iep.list" => Some(handle_list(state, req)),
        "iep.update" => Some(handle_update(state, req)),
        "iep.setStatus" => Some(handle_set_status(state, req)),
        _ => None,
    }
}
