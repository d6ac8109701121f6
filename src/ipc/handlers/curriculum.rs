use crate::curriculum::{CurriculumIndex, StudentProgress};
use crate::db;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, ensure_exists, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;
use serde_json::json;
use uuid::Uuid;

/// One level of the authoring hierarchy and where its rows hang.
struct Level {
    table: &'static str,
    parent_table: &'static str,
    parent_col: &'static str,
    parent_param: &'static str,
    label_col: &'static str,
    label_param: &'static str,
}

const SUBJECTS: Level = Level {
    table: "subjects",
    parent_table: "classrooms",
    parent_col: "classroom_id",
    parent_param: "classroomId",
    label_col: "name",
    label_param: "name",
};
const TOPICS: Level = Level {
    table: "topics",
    parent_table: "subjects",
    parent_col: "subject_id",
    parent_param: "subjectId",
    label_col: "name",
    label_param: "name",
};
const SUBTOPICS: Level = Level {
    table: "subtopics",
    parent_table: "topics",
    parent_col: "topic_id",
    parent_param: "topicId",
    label_col: "name",
    label_param: "name",
};
const LESSONS: Level = Level {
    table: "lessons",
    parent_table: "subtopics",
    parent_col: "subtopic_id",
    parent_param: "subtopicId",
    label_col: "title",
    label_param: "title",
};
const QUIZZES: Level = Level {
    table: "quizzes",
    parent_table: "subtopics",
    parent_col: "subtopic_id",
    parent_param: "subtopicId",
    label_col: "title",
    label_param: "title",
};

fn handle_create(state: &mut AppState, req: &Request, level: &Level) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let parent_id = match required_str(req, level.parent_param) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let label = match required_str(req, level.label_param) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    if let Err(e) = ensure_exists(&tx, req, level.parent_table, &parent_id, level.parent_param) {
        return e;
    }

    // sort_order is the authoring sequence; the traversal index never re-sorts by name.
    let sort_order = match db::next_sort_order(&tx, level.table, level.parent_col, &parent_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let id = Uuid::new_v4().to_string();
    let sql = format!(
        "INSERT INTO {}(id, {}, {}, sort_order) VALUES(?, ?, ?, ?)",
        level.table, level.parent_col, level.label_col
    );
    if let Err(e) = tx.execute(&sql, (&id, &parent_id, &label, sort_order)) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": level.table })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "id": id, "sortOrder": sort_order }))
}

fn handle_tree(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let classroom_id = match required_str(req, "classroomId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match optional_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let store = Store::new(conn);
    let index = match CurriculumIndex::load(&store, &classroom_id) {
        Ok(i) => i,
        Err(e) => return engine_err(&req.id, &e),
    };
    let progress = match student_id.as_deref() {
        Some(sid) => match StudentProgress::load(&store, sid, &index) {
            Ok(p) => Some(p),
            Err(e) => return engine_err(&req.id, &e),
        },
        None => None,
    };

    match serde_json::to_value(index.tree(progress.as_ref())) {
        Ok(subjects) => ok(
            &req.id,
            json!({
                "classroomId": classroom_id,
                "studentId": student_id,
                "subjects": subjects
            }),
        ),
        Err(e) => err(&req.id, "internal", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "curriculum.subjects.create" => Some(handle_create(state, req, &SUBJECTS)),
        "curriculum.topics.create" => Some(handle_create(state, req, &TOPICS)),
        "curriculum.subtopics.create" => Some(handle_create(state, req, &SUBTOPICS)),
        "curriculum.lessons.create" => Some(handle_create(state, req, &LESSONS)),
        "curriculum.quizzes.create" => Some(handle_create(state, req, &QUIZZES)),
        "curriculum.tree" => Some(handle_tree(state, req)),
        _ => None,
    }
}
