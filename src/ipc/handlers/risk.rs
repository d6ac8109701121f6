use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, optional_str, parse_opt_string_array};
use crate::ipc::types::{AppState, Request};
use crate::risk;
use crate::store::Store;
use serde_json::json;

fn handle_at_risk(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let classroom_id = match optional_str(req, "classroomId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    // Only an absent or null classroomId selects the school-wide scope.
    if classroom_id.is_none() && req.params.get("classroomId").is_some_and(|v| !v.is_null()) {
        return err(&req.id, "bad_params", "classroomId must not be blank", None);
    }
    let student_ids = match parse_opt_string_array(req.params.get("studentIds")) {
        Ok(v) => v,
        Err(m) => return err(&req.id, "bad_params", format!("studentIds {}", m), None),
    };

    match risk::compute_at_risk_students(
        &Store::new(conn),
        student_ids.as_deref(),
        classroom_id.as_deref(),
    ) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "scope": classroom_id.as_deref().unwrap_or("school"),
                "atRiskStudentIds": summary.at_risk_student_ids,
                "evaluated": summary.evaluated
            }),
        ),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "risk.atRisk" => Some(handle_at_risk(state, req)),
        _ => None,
    }
}
