//! Persisted IEP documents: created from a generated draft, then owned by human editors.

use crate::db;
use crate::error::{require_id, EngineError, EngineResult};
use crate::risk::{compute_iep_suggestions, IepStats};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

const STATUS_DRAFT: &str = "draft";
const STATUS_ACTIVE: &str = "active";
const STATUS_REVIEWED: &str = "reviewed";
const STATUS_ARCHIVED: &str = "archived";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IepStatus {
    Draft,
    Active,
    Reviewed,
    Archived,
}

impl IepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IepStatus::Draft => STATUS_DRAFT,
            IepStatus::Active => STATUS_ACTIVE,
            IepStatus::Reviewed => STATUS_REVIEWED,
            IepStatus::Archived => STATUS_ARCHIVED,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            STATUS_DRAFT => Some(IepStatus::Draft),
            STATUS_ACTIVE => Some(IepStatus::Active),
            STATUS_REVIEWED => Some(IepStatus::Reviewed),
            STATUS_ARCHIVED => Some(IepStatus::Archived),
            _ => None,
        }
    }

    pub fn can_transition_to(self, next: IepStatus) -> bool {
        use IepStatus::*;
        matches!(
            (self, next),
            (Draft, Active) | (Active, Reviewed) | (Reviewed, Active)
        ) || (self != Archived && next == Archived)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IepReport {
    pub id: String,
    pub student_id: String,
    pub classroom_id: String,
    pub status: IepStatus,
    pub strengths: String,
    pub areas_of_concern: String,
    pub learning_goals: String,
    pub interventions: String,
    pub review_date: String,
    pub stats: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Editable text fields; `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IepPatch {
    pub strengths: Option<String>,
    pub areas_of_concern: Option<String>,
    pub learning_goals: Option<String>,
    pub interventions: Option<String>,
    pub review_date: Option<String>,
}

impl IepPatch {
    pub fn is_empty(&self) -> bool {
        self.strengths.is_none()
            && self.areas_of_concern.is_none()
            && self.learning_goals.is_none()
            && self.interventions.is_none()
            && self.review_date.is_none()
    }

    fn validate(&self) -> EngineResult<()> {
        if let Some(d) = &self.review_date {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|_| EngineError::invalid("reviewDate must be YYYY-MM-DD"))?;
        }
        Ok(())
    }
}

const SELECT_REPORT: &str = "SELECT id, student_id, classroom_id, status, strengths, areas_of_concern,
        learning_goals, interventions, review_date, stats_json, created_at, updated_at
 FROM iep_reports";

fn report_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<IepReport> {
    let raw_status: String = r.get(3)?;
    let status = IepStatus::parse(&raw_status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown iep status: {}", raw_status).into(),
        )
    })?;
    let stats_json: String = r.get(9)?;
    let stats = serde_json::from_str(&stats_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(IepReport {
        id: r.get(0)?,
        student_id: r.get(1)?,
        classroom_id: r.get(2)?,
        status,
        strengths: r.get(4)?,
        areas_of_concern: r.get(5)?,
        learning_goals: r.get(6)?,
        interventions: r.get(7)?,
        review_date: r.get(8)?,
        stats,
        created_at: r.get(10)?,
        updated_at: r.get(11)?,
    })
}

/// Generate a draft for (student, classroom), apply caller edits and persist it.
pub fn create_draft(
    conn: &Connection,
    student_id: &str,
    classroom_id: &str,
    overrides: &IepPatch,
    today: NaiveDate,
) -> EngineResult<IepReport> {
    let student_id = require_id(student_id, "studentId")?;
    let classroom_id = require_id(classroom_id, "classroomId")?;
    overrides.validate()?;
    let store = crate::store::Store::new(conn);
    if !store.student_exists(student_id)? {
        return Err(EngineError::not_found("student not found"));
    }
    if !store.classroom_exists(classroom_id)? {
        return Err(EngineError::not_found("classroom not found"));
    }

    let suggestion = compute_iep_suggestions(&store, student_id, classroom_id, today)?;
    let stats_json = stats_to_json(&suggestion.stats);
    let id = Uuid::new_v4().to_string();
    let now = db::now_ts();
    conn.execute(
        "INSERT INTO iep_reports(
           id, student_id, classroom_id, status, strengths, areas_of_concern,
           learning_goals, interventions, review_date, stats_json, created_at, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            id,
            student_id,
            classroom_id,
            IepStatus::Draft.as_str(),
            overrides.strengths.as_ref().unwrap_or(&suggestion.strengths),
            overrides
                .areas_of_concern
                .as_ref()
                .unwrap_or(&suggestion.areas_of_concern),
            overrides
                .learning_goals
                .as_ref()
                .unwrap_or(&suggestion.learning_goals),
            overrides
                .interventions
                .as_ref()
                .unwrap_or(&suggestion.interventions),
            overrides.review_date.as_ref().unwrap_or(&suggestion.review_date),
            stats_json,
            now,
            now,
        ],
    )?;
    tracing::info!(report_id = %id, student_id, classroom_id, "iep draft created");
    get_report(conn, &id)
}

fn stats_to_json(stats: &IepStats) -> String {
    serde_json::to_string(stats).unwrap_or_else(|_| "null".to_string())
}

pub fn get_report(conn: &Connection, report_id: &str) -> EngineResult<IepReport> {
    let report_id = require_id(report_id, "reportId")?;
    let sql = format!("{} WHERE id = ?", SELECT_REPORT);
    conn.query_row(&sql, [report_id], report_from_row)
        .optional()?
        .ok_or_else(|| EngineError::not_found("iep report not found"))
}

pub fn list_reports(
    conn: &Connection,
    student_id: Option<&str>,
    classroom_id: Option<&str>,
) -> EngineResult<Vec<IepReport>> {
    let sql = format!(
        "{} WHERE (?1 IS NULL OR student_id = ?1) AND (?2 IS NULL OR classroom_id = ?2)
         ORDER BY created_at DESC, rowid DESC",
        SELECT_REPORT
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map((student_id, classroom_id), report_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_report(conn: &Connection, report_id: &str, patch: &IepPatch) -> EngineResult<IepReport> {
    let current = get_report(conn, report_id)?;
    if current.status == IepStatus::Archived {
        return Err(EngineError::invalid("archived reports cannot be edited"));
    }
    if patch.is_empty() {
        return Ok(current);
    }
    patch.validate()?;
    conn.execute(
        "UPDATE iep_reports SET
           strengths = COALESCE(?, strengths),
           areas_of_concern = COALESCE(?, areas_of_concern),
           learning_goals = COALESCE(?, learning_goals),
           interventions = COALESCE(?, interventions),
           review_date = COALESCE(?, review_date),
           updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            patch.strengths,
            patch.areas_of_concern,
            patch.learning_goals,
            patch.interventions,
            patch.review_date,
            db::now_ts(),
            current.id,
        ],
    )?;
    get_report(conn, &current.id)
}

pub fn set_status(conn: &Connection, report_id: &str, next: IepStatus) -> EngineResult<IepReport> {
    let current = get_report(conn, report_id)?;
    if current.status == next {
        return Ok(current);
    }
    if !current.status.can_transition_to(next) {
        return Err(EngineError::invalid(format!(
            "cannot move report from {} to {}",
            current.status.as_str(),
            next.as_str()
        )));
    }
    conn.execute(
        "UPDATE iep_reports SET status = ?, updated_at = ? WHERE id = ?",
        (next.as_str(), db::now_ts(), &current.id),
    )?;
    get_report(conn, &current.id)
}
