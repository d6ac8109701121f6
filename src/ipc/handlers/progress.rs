use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, ensure_exists, optional_str, required_bool, required_f64, required_str,
};
use crate::ipc::types::{AppState, Request};
use crate::store::PaceVoteKind;
use serde_json::json;
use uuid::Uuid;

fn handle_lesson_set_completed(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let lesson_id = match required_str(req, "lessonId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let completed = match required_bool(req, "completed") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = ensure_exists(conn, req, "students", &student_id, "student") {
        return e;
    }
    if let Err(e) = ensure_exists(conn, req, "lessons", &lesson_id, "lesson") {
        return e;
    }

    if let Err(e) = conn.execute(
        "INSERT INTO lesson_completions(student_id, lesson_id, completed, updated_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, lesson_id) DO UPDATE SET
           completed = excluded.completed,
           updated_at = excluded.updated_at",
        (&student_id, &lesson_id, completed as i64, db::now_ts()),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "lesson_completions" })),
        );
    }
    ok(&req.id, json!({ "lessonId": lesson_id, "completed": completed }))
}

fn handle_quiz_record_attempt(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let quiz_id = match required_str(req, "quizId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let score = match required_f64(req, "score") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let total = match required_f64(req, "total") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if total <= 0.0 {
        return err(&req.id, "bad_params", "total must be greater than 0", None);
    }
    if score < 0.0 || score > total {
        return err(&req.id, "bad_params", "score must be between 0 and total", None);
    }
    if let Err(e) = ensure_exists(conn, req, "students", &student_id, "student") {
        return e;
    }
    if let Err(e) = ensure_exists(conn, req, "quizzes", &quiz_id, "quiz") {
        return e;
    }

    // One current attempt per (student, quiz): the latest write replaces the previous one.
    let attempted_at = db::now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO quiz_attempts(student_id, quiz_id, score, total, attempted_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(student_id, quiz_id) DO UPDATE SET
           score = excluded.score,
           total = excluded.total,
           attempted_at = excluded.attempted_at",
        (&student_id, &quiz_id, score, total, &attempted_at),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "quiz_attempts" })),
        );
    }
    ok(
        &req.id,
        json!({
            "quizId": quiz_id,
            "percent": score / total * 100.0,
            "attemptedAt": attempted_at
        }),
    )
}

fn handle_sessions_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let classroom_id = match required_str(req, "classroomId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let lesson_id = match optional_str(req, "lessonId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = ensure_exists(conn, req, "classrooms", &classroom_id, "classroom") {
        return e;
    }
    if let Some(lesson_id) = lesson_id.as_deref() {
        if let Err(e) = ensure_exists(conn, req, "lessons", lesson_id, "lesson") {
            return e;
        }
    }

    let session_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO live_sessions(id, classroom_id, lesson_id, started_at) VALUES(?, ?, ?, ?)",
        (&session_id, &classroom_id, &lesson_id, db::now_ts()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "live_sessions" })),
        );
    }
    ok(&req.id, json!({ "sessionId": session_id }))
}

fn handle_pace_vote(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let session_id = match required_str(req, "sessionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let raw_vote = match required_str(req, "vote") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(vote) = PaceVoteKind::parse(&raw_vote) else {
        return err(
            &req.id,
            "bad_params",
            "vote must be one of too_fast, just_right, lost",
            None,
        );
    };
    if let Err(e) = ensure_exists(conn, req, "students", &student_id, "student") {
        return e;
    }
    if let Err(e) = ensure_exists(conn, req, "live_sessions", &session_id, "session") {
        return e;
    }

    if let Err(e) = conn.execute(
        "INSERT INTO pace_votes(student_id, session_id, vote, voted_at)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, session_id) DO UPDATE SET
           vote = excluded.vote,
           voted_at = excluded.voted_at",
        (&student_id, &session_id, vote.as_str(), db::now_ts()),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "pace_votes" })),
        );
    }
    ok(&req.id, json!({ "sessionId": session_id, "vote": vote.as_str() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "progress.lesson.setCompleted" => Some(handle_lesson_set_completed(state, req)),
        "progress.quiz.recordAttempt" => Some(handle_quiz_record_attempt(state, req)),
        "sessions.create" => Some(handle_sessions_create(state, req)),
        "progress.pace.vote" => Some(handle_pace_vote(state, req)),
        _ => None,
    }
}
