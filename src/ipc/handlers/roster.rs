use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, ensure_exists, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_classrooms_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classrooms": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           (SELECT COUNT(*) FROM enrollments e WHERE e.classroom_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM subjects s WHERE s.classroom_id = c.id) AS subject_count
         FROM classrooms c
         ORDER BY c.name, c.rowid",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let student_count: i64 = row.get(2)?;
            let subject_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "studentCount": student_count,
                "subjectCount": subject_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(classrooms) => ok(&req.id, json!({ "classrooms": classrooms })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_classrooms_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let classroom_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO classrooms(id, name, created_at) VALUES(?, ?, ?)",
        (&classroom_id, &name, db::now_ts()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "classrooms" })),
        );
    }
    ok(&req.id, json!({ "classroomId": classroom_id, "name": name }))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let display_name = match required_str(req, "displayName") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, display_name, created_at) VALUES(?, ?, ?)",
        (&student_id, &display_name, db::now_ts()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }
    ok(&req.id, json!({ "studentId": student_id }))
}

fn handle_students_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let classroom_id = match required_str(req, "classroomId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    if let Err(e) = ensure_exists(conn, req, "classrooms", &classroom_id, "classroom") {
        return e;
    }
    if let Err(e) = ensure_exists(conn, req, "students", &student_id, "student") {
        return e;
    }

    if let Err(e) = conn.execute(
        "INSERT OR IGNORE INTO enrollments(classroom_id, student_id) VALUES(?, ?)",
        (&classroom_id, &student_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "enrollments" })),
        );
    }
    ok(&req.id, json!({ "ok": true }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let classroom_id = match required_str(req, "classroomId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let mut stmt = match conn.prepare(
        "SELECT s.id, s.display_name
         FROM enrollments e
         JOIN students s ON s.id = e.student_id
         WHERE e.classroom_id = ?
         ORDER BY e.rowid",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&classroom_id], |row| {
            let id: String = row.get(0)?;
            let display_name: String = row.get(1)?;
            Ok(json!({ "id": id, "displayName": display_name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classrooms.list" => Some(handle_classrooms_list(state, req)),
        "classrooms.create" => Some(handle_classrooms_create(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.enroll" => Some(handle_students_enroll(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
