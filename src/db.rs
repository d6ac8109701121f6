use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("learnpath.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            classroom_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(classroom_id, student_id),
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;

    // Curriculum graph. sort_order is the authoring sequence within a parent and
    // is the only ordering the traversal index trusts.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_classroom ON subjects(classroom_id, sort_order)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS topics(
            id TEXT PRIMARY KEY,
            subject_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(subject_id) REFERENCES subjects(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_topics_subject ON topics(subject_id, sort_order)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS subtopics(
            id TEXT PRIMARY KEY,
            topic_id TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(topic_id) REFERENCES topics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subtopics_topic ON subtopics(topic_id, sort_order)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lessons(
            id TEXT PRIMARY KEY,
            subtopic_id TEXT NOT NULL,
            title TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(subtopic_id) REFERENCES subtopics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lessons_subtopic ON lessons(subtopic_id, sort_order)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS quizzes(
            id TEXT PRIMARY KEY,
            subtopic_id TEXT NOT NULL,
            title TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            FOREIGN KEY(subtopic_id) REFERENCES subtopics(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quizzes_subtopic ON quizzes(subtopic_id, sort_order)",
        [],
    )?;

    // Student signals. One current row per pair; writers upsert.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS quiz_attempts(
            student_id TEXT NOT NULL,
            quiz_id TEXT NOT NULL,
            score REAL NOT NULL,
            total REAL NOT NULL,
            attempted_at TEXT NOT NULL,
            PRIMARY KEY(student_id, quiz_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(quiz_id) REFERENCES quizzes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quiz_attempts_quiz ON quiz_attempts(quiz_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lesson_completions(
            student_id TEXT NOT NULL,
            lesson_id TEXT NOT NULL,
            completed INTEGER NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY(student_id, lesson_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(lesson_id) REFERENCES lessons(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS live_sessions(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            lesson_id TEXT,
            started_at TEXT NOT NULL,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id),
            FOREIGN KEY(lesson_id) REFERENCES lessons(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_live_sessions_classroom ON live_sessions(classroom_id)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS pace_votes(
            student_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            vote TEXT NOT NULL,
            voted_at TEXT NOT NULL,
            PRIMARY KEY(student_id, session_id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(session_id) REFERENCES live_sessions(id)
        )",
        [],
    )?;

    // Derived documents.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS learning_path_items(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            classroom_id TEXT NOT NULL,
            item_type TEXT NOT NULL,
            subtopic_id TEXT NOT NULL,
            lesson_id TEXT,
            quiz_id TEXT,
            priority INTEGER NOT NULL,
            seq INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            completed_at TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_learning_path_items_owner
         ON learning_path_items(student_id, classroom_id, priority, seq)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS iep_reports(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            classroom_id TEXT NOT NULL,
            status TEXT NOT NULL,
            strengths TEXT NOT NULL,
            areas_of_concern TEXT NOT NULL,
            learning_goals TEXT NOT NULL,
            interventions TEXT NOT NULL,
            review_date TEXT NOT NULL,
            stats_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_iep_reports_student ON iep_reports(student_id)",
        [],
    )?;

    Ok(())
}

/// Next `sort_order` for a child row under `parent_col = parent_id`.
pub fn next_sort_order(
    conn: &Connection,
    table: &str,
    parent_col: &str,
    parent_id: &str,
) -> rusqlite::Result<i64> {
    let sql = format!(
        "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM {} WHERE {} = ?",
        table, parent_col
    );
    conn.query_row(&sql, [parent_id], |r| r.get(0))
}

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'learning_path_items'",
                [],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(n, 1);
    }

    #[test]
    fn next_sort_order_counts_within_parent() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("init");
        conn.execute(
            "INSERT INTO classrooms(id, name, created_at) VALUES('c1', 'C1', 'now'), ('c2', 'C2', 'now')",
            [],
        )
        .expect("classrooms");
        assert_eq!(next_sort_order(&conn, "subjects", "classroom_id", "c1").unwrap(), 0);
        conn.execute(
            "INSERT INTO subjects(id, classroom_id, name, sort_order) VALUES('s1', 'c1', 'Math', 0)",
            [],
        )
        .expect("subject");
        assert_eq!(next_sort_order(&conn, "subjects", "classroom_id", "c1").unwrap(), 1);
        assert_eq!(next_sort_order(&conn, "subjects", "classroom_id", "c2").unwrap(), 0);
    }
}
