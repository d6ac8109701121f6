//! SQLite-backed access to curriculum, progress signals and the learning-path cache.
//!
//! Everything the engines read goes through [`Store`]; the only write it performs on
//! their behalf is the atomic learning-path replacement.

use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::pathgen::{LearningPathItem, PathItemType, PlannedItem};
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use std::collections::HashMap;
use uuid::Uuid;

// Keep IN (...) lists well under SQLite's bound-parameter ceiling.
const MAX_BIND: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub id: String,
    pub parent_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct CurriculumRows {
    pub subjects: Vec<NodeRow>,
    pub topics: Vec<NodeRow>,
    pub subtopics: Vec<NodeRow>,
    pub lessons: Vec<NodeRow>,
    pub quizzes: Vec<NodeRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub student_id: String,
    pub quiz_id: String,
    pub score: f64,
    pub total: f64,
    pub attempted_at: String,
}

impl AttemptRecord {
    pub fn percent(&self) -> Option<f64> {
        if self.total > 0.0 {
            Some(self.score / self.total * 100.0)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceVoteKind {
    TooFast,
    JustRight,
    Lost,
}

impl PaceVoteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PaceVoteKind::TooFast => "too_fast",
            PaceVoteKind::JustRight => "just_right",
            PaceVoteKind::Lost => "lost",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "too_fast" | "toofast" => Some(PaceVoteKind::TooFast),
            "just_right" | "justright" => Some(PaceVoteKind::JustRight),
            "lost" => Some(PaceVoteKind::Lost),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaceVote {
    pub student_id: String,
    pub session_id: String,
    pub vote: PaceVoteKind,
    pub voted_at: String,
}

pub struct Store<'a> {
    conn: &'a Connection,
}

impl<'a> Store<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn classroom_exists(&self, classroom_id: &str) -> EngineResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM classrooms WHERE id = ?",
                [classroom_id],
                |r| r.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn student_exists(&self, student_id: &str) -> EngineResult<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    /// Flat curriculum rows for a classroom, each level in authoring order.
    pub fn curriculum_rows(&self, classroom_id: &str) -> EngineResult<CurriculumRows> {
        let subjects = self.node_rows(
            "SELECT s.id, s.classroom_id, s.name
             FROM subjects s
             WHERE s.classroom_id = ?
             ORDER BY s.sort_order, s.rowid",
            classroom_id,
        )?;
        let topics = self.node_rows(
            "SELECT t.id, t.subject_id, t.name
             FROM topics t
             JOIN subjects s ON s.id = t.subject_id
             WHERE s.classroom_id = ?
             ORDER BY t.sort_order, t.rowid",
            classroom_id,
        )?;
        let subtopics = self.node_rows(
            "SELECT st.id, st.topic_id, st.name
             FROM subtopics st
             JOIN topics t ON t.id = st.topic_id
             JOIN subjects s ON s.id = t.subject_id
             WHERE s.classroom_id = ?
             ORDER BY st.sort_order, st.rowid",
            classroom_id,
        )?;
        let lessons = self.node_rows(
            "SELECT l.id, l.subtopic_id, l.title
             FROM lessons l
             JOIN subtopics st ON st.id = l.subtopic_id
             JOIN topics t ON t.id = st.topic_id
             JOIN subjects s ON s.id = t.subject_id
             WHERE s.classroom_id = ?
             ORDER BY l.sort_order, l.rowid",
            classroom_id,
        )?;
        let quizzes = self.node_rows(
            "SELECT q.id, q.subtopic_id, q.title
             FROM quizzes q
             JOIN subtopics st ON st.id = q.subtopic_id
             JOIN topics t ON t.id = st.topic_id
             JOIN subjects s ON s.id = t.subject_id
             WHERE s.classroom_id = ?
             ORDER BY q.sort_order, q.rowid",
            classroom_id,
        )?;
        Ok(CurriculumRows {
            subjects,
            topics,
            subtopics,
            lessons,
            quizzes,
        })
    }

    fn node_rows(&self, sql: &str, classroom_id: &str) -> EngineResult<Vec<NodeRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map([classroom_id], |r| {
                Ok(NodeRow {
                    id: r.get(0)?,
                    parent_id: r.get(1)?,
                    name: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Completion flags for the given lessons; lessons without a record are absent.
    pub fn lesson_completions(
        &self,
        student_id: &str,
        lesson_ids: &[String],
    ) -> EngineResult<HashMap<String, bool>> {
        let mut out = HashMap::new();
        for chunk in lesson_ids.chunks(MAX_BIND) {
            let sql = format!(
                "SELECT lesson_id, completed
                 FROM lesson_completions
                 WHERE student_id = ? AND lesson_id IN ({})",
                placeholders(chunk.len())
            );
            let mut bind: Vec<Value> = Vec::with_capacity(chunk.len() + 1);
            bind.push(Value::Text(student_id.to_string()));
            bind.extend(chunk.iter().map(|id| Value::Text(id.clone())));
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(bind), |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? != 0))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            out.extend(rows);
        }
        Ok(out)
    }

    /// Current attempts of one student on the given quizzes.
    pub fn quiz_attempts(
        &self,
        student_id: &str,
        quiz_ids: &[String],
    ) -> EngineResult<Vec<AttemptRecord>> {
        let mut out = Vec::new();
        for chunk in quiz_ids.chunks(MAX_BIND) {
            let sql = format!(
                "SELECT student_id, quiz_id, score, total, attempted_at
                 FROM quiz_attempts
                 WHERE student_id = ? AND quiz_id IN ({})
                 ORDER BY quiz_id",
                placeholders(chunk.len())
            );
            let mut bind: Vec<Value> = Vec::with_capacity(chunk.len() + 1);
            bind.push(Value::Text(student_id.to_string()));
            bind.extend(chunk.iter().map(|id| Value::Text(id.clone())));
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(bind), attempt_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            out.extend(rows);
        }
        Ok(out)
    }

    /// Every attempt on quizzes in scope, all students, in one query.
    /// `None` scope means every classroom in the workspace.
    pub fn attempts_in_scope(&self, classroom_id: Option<&str>) -> EngineResult<Vec<AttemptRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.student_id, a.quiz_id, a.score, a.total, a.attempted_at
             FROM quiz_attempts a
             JOIN quizzes q ON q.id = a.quiz_id
             JOIN subtopics st ON st.id = q.subtopic_id
             JOIN topics t ON t.id = st.topic_id
             JOIN subjects s ON s.id = t.subject_id
             WHERE ?1 IS NULL OR s.classroom_id = ?1
             ORDER BY a.student_id, a.quiz_id",
        )?;
        let rows = stmt
            .query_map([classroom_id], attempt_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Enrolled students in scope, in enrollment order. `None` lists every student.
    pub fn enrolled_students(&self, classroom_id: Option<&str>) -> EngineResult<Vec<String>> {
        let ids = match classroom_id {
            Some(classroom_id) => {
                let mut stmt = self.conn.prepare(
                    "SELECT student_id FROM enrollments WHERE classroom_id = ? ORDER BY rowid",
                )?;
                let ids = stmt
                    .query_map([classroom_id], |r| r.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                ids
            }
            None => {
                let mut stmt = self.conn.prepare("SELECT id FROM students ORDER BY rowid")?;
                let ids = stmt
                    .query_map([], |r| r.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                ids
            }
        };
        Ok(ids)
    }

    /// Pace votes a student cast in the classroom's live sessions.
    pub fn pace_votes(&self, student_id: &str, classroom_id: &str) -> EngineResult<Vec<PaceVote>> {
        let mut stmt = self.conn.prepare(
            "SELECT v.student_id, v.session_id, v.vote, v.voted_at
             FROM pace_votes v
             JOIN live_sessions ls ON ls.id = v.session_id
             WHERE v.student_id = ? AND ls.classroom_id = ?
             ORDER BY v.voted_at, v.rowid",
        )?;
        let rows = stmt
            .query_map((student_id, classroom_id), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        // Unknown vote strings are skipped rather than failing the whole read.
        Ok(rows
            .into_iter()
            .filter_map(|(student_id, session_id, vote, voted_at)| {
                PaceVoteKind::parse(&vote).map(|vote| PaceVote {
                    student_id,
                    session_id,
                    vote,
                    voted_at,
                })
            })
            .collect())
    }

    /// Delete the cached path for (student, classroom) and insert `items` in one transaction.
    pub fn replace_learning_path(
        &self,
        student_id: &str,
        classroom_id: &str,
        items: &[PlannedItem],
    ) -> EngineResult<Vec<LearningPathItem>> {
        let created_at = db::now_ts();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM learning_path_items WHERE student_id = ? AND classroom_id = ?",
            (student_id, classroom_id),
        )?;
        let mut out = Vec::with_capacity(items.len());
        {
            let mut insert = tx.prepare(
                "INSERT INTO learning_path_items(
                   id, student_id, classroom_id, item_type, subtopic_id, lesson_id, quiz_id,
                   priority, seq, title, description, completed, completed_at, created_at
                 ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, ?)",
            )?;
            for (seq, item) in items.iter().enumerate() {
                let id = Uuid::new_v4().to_string();
                insert.execute(rusqlite::params![
                    id,
                    student_id,
                    classroom_id,
                    item.item_type.as_str(),
                    item.subtopic_id,
                    item.lesson_id,
                    item.quiz_id,
                    item.priority,
                    seq as i64,
                    item.title,
                    item.description,
                    created_at,
                ])?;
                out.push(LearningPathItem {
                    id,
                    student_id: student_id.to_string(),
                    classroom_id: classroom_id.to_string(),
                    plan: item.clone(),
                    completed: false,
                    completed_at: None,
                    created_at: created_at.clone(),
                });
            }
        }
        tx.commit()?;
        Ok(out)
    }

    pub fn learning_path(
        &self,
        student_id: &str,
        classroom_id: &str,
    ) -> EngineResult<Vec<LearningPathItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, student_id, classroom_id, item_type, subtopic_id, lesson_id, quiz_id,
                    priority, title, description, completed, completed_at, created_at
             FROM learning_path_items
             WHERE student_id = ? AND classroom_id = ?
             ORDER BY priority, seq",
        )?;
        let rows = stmt
            .query_map((student_id, classroom_id), path_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn set_path_item_completed(
        &self,
        item_id: &str,
        completed: bool,
    ) -> EngineResult<LearningPathItem> {
        let completed_at = completed.then(db::now_ts);
        let changed = self.conn.execute(
            "UPDATE learning_path_items SET completed = ?, completed_at = ? WHERE id = ?",
            (completed as i64, &completed_at, item_id),
        )?;
        if changed == 0 {
            return Err(EngineError::not_found("learning path item not found"));
        }
        let item = self.conn.query_row(
            "SELECT id, student_id, classroom_id, item_type, subtopic_id, lesson_id, quiz_id,
                    priority, title, description, completed, completed_at, created_at
             FROM learning_path_items
             WHERE id = ?",
            [item_id],
            path_item_from_row,
        )?;
        Ok(item)
    }
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}

fn attempt_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<AttemptRecord> {
    Ok(AttemptRecord {
        student_id: r.get(0)?,
        quiz_id: r.get(1)?,
        score: r.get(2)?,
        total: r.get(3)?,
        attempted_at: r.get(4)?,
    })
}

fn path_item_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<LearningPathItem> {
    let raw_type: String = r.get(3)?;
    let item_type = PathItemType::parse(&raw_type).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown learning path item type: {}", raw_type).into(),
        )
    })?;
    Ok(LearningPathItem {
        id: r.get(0)?,
        student_id: r.get(1)?,
        classroom_id: r.get(2)?,
        plan: PlannedItem {
            item_type,
            subtopic_id: r.get(4)?,
            lesson_id: r.get(5)?,
            quiz_id: r.get(6)?,
            priority: r.get(7)?,
            title: r.get(8)?,
            description: r.get(9)?,
        },
        completed: r.get::<_, i64>(10)? != 0,
        completed_at: r.get(11)?,
        created_at: r.get(12)?,
    })
}
