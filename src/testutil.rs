use crate::db;
use crate::store::PaceVoteKind;
use rusqlite::Connection;
use uuid::Uuid;

/// In-memory workspace with terse row builders for engine tests.
pub struct Fixture {
    pub conn: Connection,
}

impl Fixture {
    pub fn new() -> Self {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        db::init_schema(&conn).expect("init schema");
        Self { conn }
    }

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn classroom(&self, name: &str) -> String {
        let id = Self::new_id();
        self.conn
            .execute(
                "INSERT INTO classrooms(id, name, created_at) VALUES(?, ?, ?)",
                (&id, name, db::now_ts()),
            )
            .expect("insert classroom");
        id
    }

    pub fn student(&self, name: &str) -> String {
        let id = Self::new_id();
        self.conn
            .execute(
                "INSERT INTO students(id, display_name, created_at) VALUES(?, ?, ?)",
                (&id, name, db::now_ts()),
            )
            .expect("insert student");
        id
    }

    pub fn enroll(&self, classroom_id: &str, student_id: &str) {
        self.conn
            .execute(
                "INSERT INTO enrollments(classroom_id, student_id) VALUES(?, ?)",
                (classroom_id, student_id),
            )
            .expect("insert enrollment");
    }

    fn child(&self, table: &str, parent_col: &str, parent_id: &str, name_col: &str, name: &str) -> String {
        let id = Self::new_id();
        let sort_order =
            db::next_sort_order(&self.conn, table, parent_col, parent_id).expect("sort order");
        let sql = format!(
            "INSERT INTO {}(id, {}, {}, sort_order) VALUES(?, ?, ?, ?)",
            table, parent_col, name_col
        );
        self.conn
            .execute(&sql, (&id, parent_id, name, sort_order))
            .expect("insert curriculum row");
        id
    }

    pub fn subject(&self, classroom_id: &str, name: &str) -> String {
        self.child("subjects", "classroom_id", classroom_id, "name", name)
    }

    pub fn topic(&self, subject_id: &str, name: &str) -> String {
        self.child("topics", "subject_id", subject_id, "name", name)
    }

    pub fn subtopic(&self, topic_id: &str, name: &str) -> String {
        self.child("subtopics", "topic_id", topic_id, "name", name)
    }

    pub fn lesson(&self, subtopic_id: &str, title: &str) -> String {
        self.child("lessons", "subtopic_id", subtopic_id, "title", title)
    }

    pub fn quiz(&self, subtopic_id: &str, title: &str) -> String {
        self.child("quizzes", "subtopic_id", subtopic_id, "title", title)
    }

    pub fn attempt(&self, student_id: &str, quiz_id: &str, score: f64, total: f64) {
        self.conn
            .execute(
                "INSERT INTO quiz_attempts(student_id, quiz_id, score, total, attempted_at)
                 VALUES(?, ?, ?, ?, ?)
                 ON CONFLICT(student_id, quiz_id) DO UPDATE SET
                   score = excluded.score,
                   total = excluded.total,
                   attempted_at = excluded.attempted_at",
                (student_id, quiz_id, score, total, db::now_ts()),
            )
            .expect("upsert attempt");
    }

    pub fn complete(&self, student_id: &str, lesson_id: &str) {
        self.conn
            .execute(
                "INSERT INTO lesson_completions(student_id, lesson_id, completed, updated_at)
                 VALUES(?, ?, 1, ?)
                 ON CONFLICT(student_id, lesson_id) DO UPDATE SET completed = 1",
                (student_id, lesson_id, db::now_ts()),
            )
            .expect("upsert completion");
    }

    pub fn session(&self, classroom_id: &str) -> String {
        let id = Self::new_id();
        self.conn
            .execute(
                "INSERT INTO live_sessions(id, classroom_id, lesson_id, started_at) VALUES(?, ?, NULL, ?)",
                (&id, classroom_id, db::now_ts()),
            )
            .expect("insert session");
        id
    }

    pub fn pace_vote(&self, student_id: &str, session_id: &str, vote: PaceVoteKind) {
        self.conn
            .execute(
                "INSERT INTO pace_votes(student_id, session_id, vote, voted_at) VALUES(?, ?, ?, ?)
                 ON CONFLICT(student_id, session_id) DO UPDATE SET
                   vote = excluded.vote,
                   voted_at = excluded.voted_at",
                (student_id, session_id, vote.as_str(), db::now_ts()),
            )
            .expect("upsert pace vote");
    }
}
