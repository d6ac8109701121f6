//! IEP draft suggestions and at-risk classification.

use crate::curriculum::{CurriculumIndex, Score, StudentProgress};
use crate::error::{require_id, EngineResult};
use crate::store::{AttemptRecord, PaceVoteKind, Store};
use chrono::{Months, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

const COMPLETION_STRONG: i64 = 80;
const COMPLETION_FAIR: i64 = 50;
const SCORE_STRONG: i64 = 70;
const SCORE_FAIR: i64 = 50;
const PACE_VOTE_LIMIT: usize = 2;
const REVIEW_PERIOD_MONTHS: u32 = 3;

pub const AT_RISK_BELOW: f64 = 50.0;
/// Average assumed for students with no attempts: no signal is not a negative signal.
const NO_SIGNAL_AVERAGE: f64 = 100.0;

/// Raw inputs the draft is generated from.
#[derive(Debug, Clone, PartialEq)]
pub struct IepSignals {
    pub total_lessons: usize,
    pub completed_lessons: usize,
    pub avg_score: Score,
    pub lost_count: usize,
    pub too_fast_count: usize,
}

impl IepSignals {
    pub fn lesson_completion_rate(&self) -> Option<i64> {
        if self.total_lessons == 0 {
            return None;
        }
        Some((self.completed_lessons as f64 / self.total_lessons as f64 * 100.0).round() as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IepStats {
    pub lesson_completion_rate: Option<i64>,
    pub avg_score: Option<i64>,
    pub lost_count: usize,
    pub too_fast_count: usize,
    pub total_lessons: usize,
    pub completed_lessons: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IepSuggestion {
    pub strengths: String,
    pub areas_of_concern: String,
    pub learning_goals: String,
    pub interventions: String,
    pub review_date: String,
    pub stats: IepStats,
}

#[derive(Default)]
struct Draft {
    strengths: Vec<String>,
    concerns: Vec<String>,
    goals: Vec<String>,
    interventions: Vec<String>,
}

pub fn review_date(today: NaiveDate) -> NaiveDate {
    today
        .checked_add_months(Months::new(REVIEW_PERIOD_MONTHS))
        .unwrap_or(today)
}

/// Apply the IEP decision table to a set of signals.
pub fn draft_iep(signals: &IepSignals, today: NaiveDate) -> IepSuggestion {
    let mut draft = Draft::default();
    let completion = signals.lesson_completion_rate();
    let avg = signals.avg_score.rounded();

    if let Some(rate) = completion {
        if rate >= COMPLETION_STRONG {
            draft.strengths.push(format!(
                "Consistently completes assigned lessons ({}% completion rate).",
                rate
            ));
        } else if rate >= COMPLETION_FAIR {
            draft
                .concerns
                .push(format!("Lesson completion is inconsistent ({}%).", rate));
            draft.goals.push(format!(
                "Raise lesson completion to at least {}% by the review date.",
                COMPLETION_STRONG
            ));
            draft.interventions.push(
                "Weekly check-in with the class teacher on outstanding lessons.".to_string(),
            );
        } else {
            draft.concerns.push(format!(
                "Low lesson completion ({}%) is holding back progress through the curriculum.",
                rate
            ));
            draft.goals.push(format!(
                "Complete at least {}% of assigned lessons within the next month, then {}% by the review date.",
                COMPLETION_FAIR, COMPLETION_STRONG
            ));
            draft.interventions.push(
                "Daily supervised study time with a lesson checklist and parent/guardian follow-up."
                    .to_string(),
            );
        }
    }

    if let Some(score) = avg {
        if score >= SCORE_STRONG {
            draft.strengths.push(format!(
                "Demonstrates solid understanding in assessments (average quiz score {}%).",
                score
            ));
        } else if score >= SCORE_FAIR {
            draft.concerns.push(format!(
                "Quiz performance is below expectations (average {}%).",
                score
            ));
            draft.goals.push(format!(
                "Raise the average quiz score to at least {}% by the review date.",
                SCORE_STRONG
            ));
            draft.interventions.push(
                "Targeted practice quizzes on weaker subtopics with feedback after each attempt."
                    .to_string(),
            );
        } else {
            draft.concerns.push(format!(
                "Quiz performance is significantly below expectations (average {}%).",
                score
            ));
            draft.goals.push(format!(
                "Reach a quiz average of at least {}% within the next month, then {}% by the review date.",
                SCORE_FAIR, SCORE_STRONG
            ));
            draft.interventions.push(
                "One-on-one remedial sessions to revisit foundational concepts before new material."
                    .to_string(),
            );
        }
    }

    if signals.lost_count > PACE_VOTE_LIMIT {
        draft.concerns.push(format!(
            "Reported feeling lost in {} live sessions.",
            signals.lost_count
        ));
        draft.interventions.push(
            "Pair with a peer mentor and review recorded lessons after each live session."
                .to_string(),
        );
    }

    if signals.too_fast_count > PACE_VOTE_LIMIT {
        draft.interventions.push(
            "Provide pre-reading materials ahead of live sessions so the pace is easier to follow."
                .to_string(),
        );
    }

    if draft.strengths.is_empty() {
        draft
            .strengths
            .push("Enrolled and participating in the class.".to_string());
    }

    IepSuggestion {
        strengths: draft.strengths.join("\n"),
        areas_of_concern: draft.concerns.join("\n"),
        learning_goals: draft.goals.join("\n"),
        interventions: draft.interventions.join("\n"),
        review_date: review_date(today).format("%Y-%m-%d").to_string(),
        stats: IepStats {
            lesson_completion_rate: completion,
            avg_score: avg,
            lost_count: signals.lost_count,
            too_fast_count: signals.too_fast_count,
            total_lessons: signals.total_lessons,
            completed_lessons: signals.completed_lessons,
        },
    }
}

pub fn gather_signals(
    store: &Store<'_>,
    student_id: &str,
    classroom_id: &str,
) -> EngineResult<IepSignals> {
    let index = CurriculumIndex::load(store, classroom_id)?;
    let progress = StudentProgress::load(store, student_id, &index)?;
    let votes = store.pace_votes(student_id, classroom_id)?;
    Ok(IepSignals {
        total_lessons: index.total_lessons(),
        completed_lessons: progress.completed_lessons(&index),
        avg_score: progress.classroom_average(&index),
        lost_count: votes.iter().filter(|v| v.vote == PaceVoteKind::Lost).count(),
        too_fast_count: votes
            .iter()
            .filter(|v| v.vote == PaceVoteKind::TooFast)
            .count(),
    })
}

/// Draft IEP fields for (student, classroom). Read-only.
pub fn compute_iep_suggestions(
    store: &Store<'_>,
    student_id: &str,
    classroom_id: &str,
    today: NaiveDate,
) -> EngineResult<IepSuggestion> {
    let student_id = require_id(student_id, "studentId")?;
    let classroom_id = require_id(classroom_id, "classroomId")?;
    let signals = gather_signals(store, student_id, classroom_id)?;
    tracing::info!(
        student_id,
        classroom_id,
        lost = signals.lost_count,
        too_fast = signals.too_fast_count,
        "iep suggestions computed"
    );
    Ok(draft_iep(&signals, today))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AtRiskSummary {
    pub at_risk_student_ids: BTreeSet<String>,
    pub evaluated: usize,
}

/// Fold a batch of attempts into per-student averages and pick those below the line.
pub fn classify_at_risk(students: &[String], attempts: &[AttemptRecord]) -> BTreeSet<String> {
    let wanted: HashSet<&str> = students.iter().map(|s| s.as_str()).collect();
    let mut percents: HashMap<&str, Vec<f64>> = HashMap::new();
    for a in attempts {
        if !wanted.contains(a.student_id.as_str()) {
            continue;
        }
        if let Some(p) = a.percent() {
            percents.entry(a.student_id.as_str()).or_default().push(p);
        }
    }

    students
        .iter()
        .filter(|student| {
            let avg = match percents.get(student.as_str()) {
                Some(ps) => Score::mean(ps.iter().copied()),
                None => Score::NoAttempts,
            };
            avg.percent().unwrap_or(NO_SIGNAL_AVERAGE) < AT_RISK_BELOW
        })
        .cloned()
        .collect()
}

/// At-risk students among `student_ids` (every enrolled student in scope when `None`).
/// `classroom_scope` of `None` means school-wide.
pub fn compute_at_risk_students(
    store: &Store<'_>,
    student_ids: Option<&[String]>,
    classroom_scope: Option<&str>,
) -> EngineResult<AtRiskSummary> {
    let students = match student_ids {
        Some(ids) => ids.to_vec(),
        None => store.enrolled_students(classroom_scope)?,
    };
    if students.is_empty() {
        return Ok(AtRiskSummary {
            at_risk_student_ids: BTreeSet::new(),
            evaluated: 0,
        });
    }
    let attempts = store.attempts_in_scope(classroom_scope)?;
    let at_risk = classify_at_risk(&students, &attempts);
    tracing::info!(
        scope = classroom_scope.unwrap_or("school"),
        evaluated = students.len(),
        at_risk = at_risk.len(),
        "at-risk aggregation computed"
    );
    Ok(AtRiskSummary {
        at_risk_student_ids: at_risk,
        evaluated: students.len(),
    })
}
