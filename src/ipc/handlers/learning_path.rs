use crate::ipc::error::{engine_err, ok_json};
use crate::ipc::helpers::{db_conn, required_bool, required_str};
use crate::ipc::types::{AppState, Request};
use crate::pathgen;
use crate::store::Store;

fn handle_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    match pathgen::compute_learning_path(&Store::new(conn), &student_id, &classroom_id) {
        Ok(items) => ok_json(&req.id, "items", &items),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    match Store::new(conn).learning_path(&student_id, &classroom_id) {
        Ok(items) => ok_json(&req.id, "items", &items),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_item_set_completed(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let item_id = match required_str(req, "itemId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let completed = match required_bool(req, "completed") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match Store::new(conn).set_path_item_completed(&item_id, completed) {
        Ok(item) => ok_json(&req.id, "item", &item),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "learningPath.compute" => Some(handle_compute(state, req)),
        "learningPath.list" => Some(handle_list(state, req)),
        "learningPath.item.setCompleted" => Some(handle_item_set_completed(state, req)),
        _ => None,
    }
}
