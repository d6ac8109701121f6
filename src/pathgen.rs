//! Learning path generation: classify each subtopic, order by urgency, replace the cache.

use crate::curriculum::{CurriculumIndex, CurriculumNode, Score, StudentProgress};
use crate::error::{require_id, EngineResult};
use crate::store::Store;
use serde::Serialize;

const REVISIT_BELOW: f64 = 50.0;
const PRACTICE_BELOW: f64 = 75.0;
const START_COMPLETION_BELOW: f64 = 50.0;

pub const PRIORITY_REVISIT: i64 = 1;
pub const PRIORITY_PRACTICE: i64 = 2;
pub const PRIORITY_START: i64 = 2;
pub const PRIORITY_ADVANCE: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathItemType {
    Revisit,
    Practice,
    Advance,
    Start,
}

impl PathItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            PathItemType::Revisit => "REVISIT",
            PathItemType::Practice => "PRACTICE",
            PathItemType::Advance => "ADVANCE",
            PathItemType::Start => "START",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "REVISIT" => Some(PathItemType::Revisit),
            "PRACTICE" => Some(PathItemType::Practice),
            "ADVANCE" => Some(PathItemType::Advance),
            "START" => Some(PathItemType::Start),
            _ => None,
        }
    }
}

/// A recommendation before it is written to the cache.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedItem {
    #[serde(rename = "type")]
    pub item_type: PathItemType,
    pub subtopic_id: String,
    pub lesson_id: Option<String>,
    pub quiz_id: Option<String>,
    pub priority: i64,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPathItem {
    pub id: String,
    pub student_id: String,
    pub classroom_id: String,
    #[serde(flatten)]
    pub plan: PlannedItem,
    pub completed: bool,
    pub completed_at: Option<String>,
    pub created_at: String,
}

/// Pure classification over an index and one student's progress, sorted by priority.
pub fn plan_path(index: &CurriculumIndex, progress: &StudentProgress) -> Vec<PlannedItem> {
    let mut items: Vec<PlannedItem> = index
        .subtopics()
        .filter_map(|st| classify_subtopic(index, st, progress))
        .collect();
    // sort_by_key is stable: equal priorities keep curriculum order.
    items.sort_by_key(|item| item.priority);
    items
}

fn classify_subtopic(
    index: &CurriculumIndex,
    subtopic: &CurriculumNode,
    progress: &StudentProgress,
) -> Option<PlannedItem> {
    match progress.average_score(subtopic) {
        Score::Percent(avg) if avg < REVISIT_BELOW => {
            let pct = avg.round() as i64;
            Some(PlannedItem {
                item_type: PathItemType::Revisit,
                subtopic_id: subtopic.id.clone(),
                lesson_id: None,
                quiz_id: None,
                priority: PRIORITY_REVISIT,
                title: format!("Revisit {}", subtopic.name),
                description: format!(
                    "Your quiz average in {} is {}%. Go back over the lessons before moving on.",
                    subtopic.name, pct
                ),
            })
        }
        Score::Percent(avg) if avg < PRACTICE_BELOW => {
            let quiz = subtopic.quizzes.first()?;
            let pct = avg.round() as i64;
            Some(PlannedItem {
                item_type: PathItemType::Practice,
                subtopic_id: subtopic.id.clone(),
                lesson_id: None,
                quiz_id: Some(quiz.id.clone()),
                priority: PRIORITY_PRACTICE,
                title: format!("Practice {}", subtopic.name),
                description: format!(
                    "You scored {}% in {}. Retake \"{}\" to reach {}%.",
                    pct, subtopic.name, quiz.title, PRACTICE_BELOW as i64
                ),
            })
        }
        Score::Percent(avg) => {
            let next = index.next_subtopic(subtopic)?;
            let pct = avg.round() as i64;
            Some(PlannedItem {
                item_type: PathItemType::Advance,
                subtopic_id: next.id.clone(),
                lesson_id: next.lessons.first().map(|l| l.id.clone()),
                quiz_id: None,
                priority: PRIORITY_ADVANCE,
                title: format!("Advance to {}", next.name),
                description: format!(
                    "You scored {}% in {}. You are ready for {}.",
                    pct, subtopic.name, next.name
                ),
            })
        }
        Score::NoAttempts => {
            if subtopic.lessons.is_empty() {
                return None;
            }
            let rate = progress.completion_rate(subtopic);
            if rate >= START_COMPLETION_BELOW {
                return None;
            }
            let lesson = progress.first_incomplete_lesson(subtopic);
            let mut description = format!(
                "You have completed {}% of the lessons in {}.",
                rate.round() as i64,
                subtopic.name
            );
            if let Some(lesson) = lesson {
                description.push_str(&format!(" Next up: {}.", lesson.title));
            }
            Some(PlannedItem {
                item_type: PathItemType::Start,
                subtopic_id: subtopic.id.clone(),
                lesson_id: lesson.map(|l| l.id.clone()),
                quiz_id: None,
                priority: PRIORITY_START,
                title: format!("Start {}", subtopic.name),
                description,
            })
        }
    }
}

/// Recompute the path for (student, classroom) and atomically replace the cached copy.
pub fn compute_learning_path(
    store: &Store<'_>,
    student_id: &str,
    classroom_id: &str,
) -> EngineResult<Vec<LearningPathItem>> {
    let student_id = require_id(student_id, "studentId")?;
    let classroom_id = require_id(classroom_id, "classroomId")?;

    let index = CurriculumIndex::load(store, classroom_id)?;
    let progress = StudentProgress::load(store, student_id, &index)?;
    let plan = plan_path(&index, &progress);
    tracing::info!(
        student_id,
        classroom_id,
        items = plan.len(),
        "learning path computed"
    );
    store.replace_learning_path(student_id, classroom_id, &plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Fixture;

    struct Scenario {
        fx: Fixture,
        class_id: String,
        student: String,
    }

    impl Scenario {
        fn new() -> Self {
            let fx = Fixture::new();
            let class_id = fx.classroom("Grade 8");
            let student = fx.student("Ann");
            fx.enroll(&class_id, &student);
            Self {
                fx,
                class_id,
                student,
            }
        }

        fn compute(&self) -> Vec<LearningPathItem> {
            compute_learning_path(&Store::new(&self.fx.conn), &self.student, &self.class_id)
                .expect("compute path")
        }
    }

    fn plans(items: &[LearningPathItem]) -> Vec<PlannedItem> {
        items.iter().map(|i| i.plan.clone()).collect()
    }

    #[test]
    fn low_score_yields_revisit_with_rounded_percent() {
        let sc = Scenario::new();
        let subject = sc.fx.subject(&sc.class_id, "Math");
        let topic = sc.fx.topic(&subject, "Algebra");
        let y = sc.fx.subtopic(&topic, "Fractions");
        let quiz = sc.fx.quiz(&y, "Fractions check");
        sc.fx.attempt(&sc.student, &quiz, 3.0, 10.0);

        let items = sc.compute();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].plan.item_type, PathItemType::Revisit);
        assert_eq!(items[0].plan.priority, 1);
        assert_eq!(items[0].plan.subtopic_id, y);
        assert!(items[0].plan.description.contains("30"));
    }

    #[test]
    fn mid_score_yields_practice_on_first_quiz() {
        let sc = Scenario::new();
        let subject = sc.fx.subject(&sc.class_id, "Math");
        let topic = sc.fx.topic(&subject, "Algebra");
        let st = sc.fx.subtopic(&topic, "Ratios");
        let q1 = sc.fx.quiz(&st, "Ratios A");
        let q2 = sc.fx.quiz(&st, "Ratios B");
        sc.fx.attempt(&sc.student, &q2, 6.0, 10.0);

        let items = sc.compute();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].plan.item_type, PathItemType::Practice);
        assert_eq!(items[0].plan.quiz_id.as_deref(), Some(q1.as_str()));
        assert_eq!(items[0].plan.priority, 2);
    }

    #[test]
    fn high_score_advances_to_successor_but_not_past_last() {
        let sc = Scenario::new();
        let subject = sc.fx.subject(&sc.class_id, "Math");
        let topic = sc.fx.topic(&subject, "Algebra");
        let first = sc.fx.subtopic(&topic, "Linear");
        let last = sc.fx.subtopic(&topic, "Quadratic");
        let next_lesson = sc.fx.lesson(&last, "Roots");
        sc.fx.complete(&sc.student, &next_lesson);
        let q_first = sc.fx.quiz(&first, "Linear quiz");
        let q_last = sc.fx.quiz(&last, "Quadratic quiz");
        sc.fx.attempt(&sc.student, &q_first, 8.0, 10.0);
        sc.fx.attempt(&sc.student, &q_last, 8.0, 10.0);

        let items = sc.compute();
        assert_eq!(items.len(), 1, "last subtopic must not advance: {:?}", items);
        assert_eq!(items[0].plan.item_type, PathItemType::Advance);
        assert_eq!(items[0].plan.subtopic_id, last);
        assert_eq!(items[0].plan.lesson_id.as_deref(), Some(next_lesson.as_str()));
    }

    #[test]
    fn last_subtopic_high_score_emits_nothing() {
        let sc = Scenario::new();
        let subject = sc.fx.subject(&sc.class_id, "Math");
        let topic = sc.fx.topic(&subject, "Algebra");
        let z = sc.fx.subtopic(&topic, "Only");
        let quiz = sc.fx.quiz(&z, "Only quiz");
        sc.fx.attempt(&sc.student, &quiz, 8.0, 10.0);

        assert!(sc.compute().is_empty());
    }

    #[test]
    fn no_attempts_and_good_completion_emits_nothing() {
        let sc = Scenario::new();
        let subject = sc.fx.subject(&sc.class_id, "Math");
        let topic = sc.fx.topic(&subject, "Algebra");
        let x = sc.fx.subtopic(&topic, "X");
        for i in 0..10 {
            let lesson = sc.fx.lesson(&x, &format!("L{}", i));
            if i < 8 {
                sc.fx.complete(&sc.student, &lesson);
            }
        }
        assert!(sc.compute().is_empty());
    }

    #[test]
    fn no_attempts_and_low_completion_starts_first_incomplete_lesson() {
        let sc = Scenario::new();
        let subject = sc.fx.subject(&sc.class_id, "Math");
        let topic = sc.fx.topic(&subject, "Algebra");
        let st = sc.fx.subtopic(&topic, "Graphs");
        let l1 = sc.fx.lesson(&st, "Axes");
        let l2 = sc.fx.lesson(&st, "Plotting");
        sc.fx.lesson(&st, "Slopes");
        sc.fx.complete(&sc.student, &l1);

        let items = sc.compute();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].plan.item_type, PathItemType::Start);
        assert_eq!(items[0].plan.priority, 2);
        assert_eq!(items[0].plan.lesson_id.as_deref(), Some(l2.as_str()));
        assert!(items[0].plan.description.contains("33%"));
    }

    #[test]
    fn subtopic_without_lessons_or_attempts_emits_nothing() {
        let sc = Scenario::new();
        let subject = sc.fx.subject(&sc.class_id, "Math");
        let topic = sc.fx.topic(&subject, "Algebra");
        let st = sc.fx.subtopic(&topic, "Empty");
        sc.fx.quiz(&st, "Unattempted");
        assert!(sc.compute().is_empty());
    }

    #[test]
    fn start_without_incomplete_lesson_omits_reference() {
        let mut index_rows = crate::store::CurriculumRows::default();
        index_rows.subjects.push(crate::store::NodeRow {
            id: "s".into(),
            parent_id: "c".into(),
            name: "S".into(),
        });
        index_rows.topics.push(crate::store::NodeRow {
            id: "t".into(),
            parent_id: "s".into(),
            name: "T".into(),
        });
        index_rows.subtopics.push(crate::store::NodeRow {
            id: "st".into(),
            parent_id: "t".into(),
            name: "ST".into(),
        });
        index_rows.lessons.push(crate::store::NodeRow {
            id: "l".into(),
            parent_id: "st".into(),
            name: "L".into(),
        });
        let index = CurriculumIndex::from_rows(&index_rows);
        let mut completions = std::collections::HashMap::new();
        completions.insert("l".to_string(), true);
        let progress = StudentProgress::from_records(&completions, &[]);
        let node = index.find("st").expect("st");
        assert!(progress.first_incomplete_lesson(node).is_none());
        // Fully complete means 100% completion, which never reaches START.
        assert!(plan_path(&index, &progress).is_empty());
    }

    #[test]
    fn score_of_exactly_fifty_is_practice_not_revisit() {
        let sc = Scenario::new();
        let subject = sc.fx.subject(&sc.class_id, "Math");
        let topic = sc.fx.topic(&subject, "Algebra");
        let st = sc.fx.subtopic(&topic, "Ratios");
        let quiz = sc.fx.quiz(&st, "Ratios check");
        sc.fx.attempt(&sc.student, &quiz, 5.0, 10.0);

        let items = sc.compute();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].plan.item_type, PathItemType::Practice);
        assert_eq!(items[0].plan.quiz_id.as_deref(), Some(quiz.as_str()));
    }

    #[test]
    fn score_of_exactly_seventy_five_advances() {
        let sc = Scenario::new();
        let subject = sc.fx.subject(&sc.class_id, "Math");
        let topic = sc.fx.topic(&subject, "Algebra");
        let first = sc.fx.subtopic(&topic, "Linear");
        let next = sc.fx.subtopic(&topic, "Quadratic");
        let quiz = sc.fx.quiz(&first, "Linear check");
        sc.fx.attempt(&sc.student, &quiz, 15.0, 20.0);

        let items = sc.compute();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].plan.item_type, PathItemType::Advance);
        assert_eq!(items[0].plan.priority, PRIORITY_ADVANCE);
        assert_eq!(items[0].plan.subtopic_id, next);
    }

    #[test]
    fn half_completed_without_attempts_emits_nothing() {
        let sc = Scenario::new();
        let subject = sc.fx.subject(&sc.class_id, "Math");
        let topic = sc.fx.topic(&subject, "Algebra");
        let st = sc.fx.subtopic(&topic, "Graphs");
        let l1 = sc.fx.lesson(&st, "Axes");
        sc.fx.lesson(&st, "Plotting");
        sc.fx.complete(&sc.student, &l1);

        assert!(sc.compute().is_empty());
    }

    #[test]
    fn untouched_subtopic_starts_at_first_lesson() {
        let sc = Scenario::new();
        let subject = sc.fx.subject(&sc.class_id, "Math");
        let topic = sc.fx.topic(&subject, "Algebra");
        let st = sc.fx.subtopic(&topic, "Graphs");
        let l1 = sc.fx.lesson(&st, "Axes");
        sc.fx.lesson(&st, "Plotting");
        sc.fx.lesson(&st, "Slopes");

        let items = sc.compute();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].plan.item_type, PathItemType::Start);
        assert_eq!(items[0].plan.lesson_id.as_deref(), Some(l1.as_str()));
        assert!(items[0].plan.description.contains("0%"));
    }

    #[test]
    fn revisit_sorts_before_practice_and_start_regardless_of_order() {
        let sc = Scenario::new();
        let subject = sc.fx.subject(&sc.class_id, "Math");
        let topic = sc.fx.topic(&subject, "Algebra");
        let practice = sc.fx.subtopic(&topic, "Practice me");
        let start = sc.fx.subtopic(&topic, "Start me");
        let revisit = sc.fx.subtopic(&topic, "Revisit me");
        let pq = sc.fx.quiz(&practice, "P");
        sc.fx.attempt(&sc.student, &pq, 6.0, 10.0);
        sc.fx.lesson(&start, "Intro");
        let rq = sc.fx.quiz(&revisit, "R");
        sc.fx.attempt(&sc.student, &rq, 1.0, 10.0);

        let items = sc.compute();
        let kinds: Vec<PathItemType> = items.iter().map(|i| i.plan.item_type).collect();
        assert_eq!(
            kinds,
            vec![
                PathItemType::Revisit,
                PathItemType::Practice,
                PathItemType::Start
            ]
        );
        assert_eq!(items[1].plan.subtopic_id, practice);
        assert_eq!(items[2].plan.subtopic_id, start);
    }

    #[test]
    fn repeated_computation_is_identical_and_replaces_cache() {
        let sc = Scenario::new();
        let subject = sc.fx.subject(&sc.class_id, "Math");
        let topic = sc.fx.topic(&subject, "Algebra");
        let a = sc.fx.subtopic(&topic, "A");
        let b = sc.fx.subtopic(&topic, "B");
        let qa = sc.fx.quiz(&a, "QA");
        sc.fx.attempt(&sc.student, &qa, 9.0, 10.0);
        sc.fx.lesson(&b, "B1");

        let first = sc.compute();
        let second = sc.compute();
        assert_eq!(plans(&first), plans(&second));

        let cached = Store::new(&sc.fx.conn)
            .learning_path(&sc.student, &sc.class_id)
            .expect("cached");
        assert_eq!(cached.len(), second.len());
        assert_eq!(plans(&cached), plans(&second));
    }

    #[test]
    fn unknown_classroom_gives_empty_path() {
        let sc = Scenario::new();
        let items = compute_learning_path(&Store::new(&sc.fx.conn), &sc.student, "nope")
            .expect("compute");
        assert!(items.is_empty());
    }

    #[test]
    fn missing_classroom_id_is_invalid_argument() {
        let sc = Scenario::new();
        let e = compute_learning_path(&Store::new(&sc.fx.conn), &sc.student, " ")
            .expect_err("should fail");
        assert_eq!(e.code(), "bad_params");
    }
}
