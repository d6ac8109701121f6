//! Ordered, arena-backed view of a classroom's curriculum plus per-student aggregates.

use crate::error::EngineResult;
use crate::store::{AttemptRecord, CurriculumRows, NodeRow, Store};
use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Subject,
    Topic,
    Subtopic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentRef {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct CurriculumNode {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub children: Vec<usize>,
    pub lessons: Vec<ContentRef>,
    pub quizzes: Vec<ContentRef>,
    /// Position in the flattened subtopic sequence; `None` for subjects and topics.
    pub sequence: Option<usize>,
}

impl CurriculumNode {
    fn new(row: &NodeRow, kind: NodeKind) -> Self {
        Self {
            id: row.id.clone(),
            kind,
            name: row.name.clone(),
            children: Vec::new(),
            lessons: Vec::new(),
            quizzes: Vec::new(),
            sequence: None,
        }
    }
}

/// Quiz performance signal. `NoAttempts` is "no signal", never a 0% score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    NoAttempts,
    Percent(f64),
}

impl Score {
    pub fn mean<I>(percents: I) -> Score
    where
        I: IntoIterator<Item = f64>,
    {
        let mut sum = 0.0;
        let mut n: usize = 0;
        for p in percents {
            sum += p;
            n += 1;
        }
        if n == 0 {
            Score::NoAttempts
        } else {
            Score::Percent(sum / n as f64)
        }
    }

    pub fn percent(self) -> Option<f64> {
        match self {
            Score::NoAttempts => None,
            Score::Percent(p) => Some(p),
        }
    }

    pub fn rounded(self) -> Option<i64> {
        self.percent().map(|p| p.round() as i64)
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Score::NoAttempts => serializer.serialize_none(),
            Score::Percent(p) => serializer.serialize_f64(*p),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CurriculumIndex {
    nodes: Vec<CurriculumNode>,
    subjects: Vec<usize>,
    subtopics: Vec<usize>,
    by_id: HashMap<String, usize>,
}

impl CurriculumIndex {
    /// Unknown classrooms yield an empty index.
    pub fn load(store: &Store<'_>, classroom_id: &str) -> EngineResult<Self> {
        Ok(Self::from_rows(&store.curriculum_rows(classroom_id)?))
    }

    pub fn from_rows(rows: &CurriculumRows) -> Self {
        let mut index = CurriculumIndex::default();

        for row in &rows.subjects {
            let idx = index.push(CurriculumNode::new(row, NodeKind::Subject));
            index.subjects.push(idx);
        }
        for row in &rows.topics {
            index.attach(row, NodeKind::Subject, NodeKind::Topic);
        }
        for row in &rows.subtopics {
            index.attach(row, NodeKind::Topic, NodeKind::Subtopic);
        }
        for row in &rows.lessons {
            if let Some(&st) = index.by_id.get(&row.parent_id) {
                index.nodes[st].lessons.push(ContentRef {
                    id: row.id.clone(),
                    title: row.name.clone(),
                });
            }
        }
        for row in &rows.quizzes {
            if let Some(&st) = index.by_id.get(&row.parent_id) {
                index.nodes[st].quizzes.push(ContentRef {
                    id: row.id.clone(),
                    title: row.name.clone(),
                });
            }
        }

        // Flatten subject -> topic -> subtopic into the explicit curriculum sequence.
        let mut order = Vec::new();
        for &subject in &index.subjects {
            for &topic in &index.nodes[subject].children {
                order.extend(index.nodes[topic].children.iter().copied());
            }
        }
        for (seq, &st) in order.iter().enumerate() {
            index.nodes[st].sequence = Some(seq);
        }
        index.subtopics = order;
        index
    }

    fn push(&mut self, node: CurriculumNode) -> usize {
        let idx = self.nodes.len();
        self.by_id.insert(node.id.clone(), idx);
        self.nodes.push(node);
        idx
    }

    fn attach(&mut self, row: &NodeRow, parent_kind: NodeKind, kind: NodeKind) {
        let Some(&parent) = self.by_id.get(&row.parent_id) else {
            return;
        };
        if self.nodes[parent].kind != parent_kind {
            return;
        }
        let idx = self.push(CurriculumNode::new(row, kind));
        self.nodes[parent].children.push(idx);
    }

    pub fn node(&self, idx: usize) -> &CurriculumNode {
        &self.nodes[idx]
    }

    #[cfg(test)]
    pub fn find(&self, id: &str) -> Option<&CurriculumNode> {
        self.by_id.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn subjects(&self) -> impl Iterator<Item = &CurriculumNode> + '_ {
        self.subjects.iter().map(move |&idx| &self.nodes[idx])
    }

    /// Subtopics in curriculum sequence order.
    pub fn subtopics(&self) -> impl Iterator<Item = &CurriculumNode> + '_ {
        self.subtopics.iter().map(move |&idx| &self.nodes[idx])
    }

    /// The subtopic immediately after `node` in sequence order.
    pub fn next_subtopic(&self, node: &CurriculumNode) -> Option<&CurriculumNode> {
        let seq = node.sequence?;
        self.subtopics.get(seq + 1).map(|&idx| &self.nodes[idx])
    }

    pub fn lesson_ids(&self) -> Vec<String> {
        self.subtopics()
            .flat_map(|st| st.lessons.iter().map(|l| l.id.clone()))
            .collect()
    }

    pub fn quiz_ids(&self) -> Vec<String> {
        self.subtopics()
            .flat_map(|st| st.quizzes.iter().map(|q| q.id.clone()))
            .collect()
    }

    pub fn total_lessons(&self) -> usize {
        self.subtopics().map(|st| st.lessons.len()).sum()
    }

    pub fn tree(&self, progress: Option<&StudentProgress>) -> Vec<SubjectView> {
        self.subjects()
            .map(|subject| SubjectView {
                id: subject.id.clone(),
                name: subject.name.clone(),
                topics: subject
                    .children
                    .iter()
                    .map(|&t| {
                        let topic = self.node(t);
                        TopicView {
                            id: topic.id.clone(),
                            name: topic.name.clone(),
                            subtopics: topic
                                .children
                                .iter()
                                .map(|&st| SubtopicView::new(self.node(st), progress))
                                .collect(),
                        }
                    })
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectView {
    pub id: String,
    pub name: String,
    pub topics: Vec<TopicView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicView {
    pub id: String,
    pub name: String,
    pub subtopics: Vec<SubtopicView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtopicView {
    pub id: String,
    pub name: String,
    pub sequence: usize,
    pub lessons: Vec<ContentRef>,
    pub quizzes: Vec<ContentRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_score: Option<Score>,
}

impl SubtopicView {
    fn new(node: &CurriculumNode, progress: Option<&StudentProgress>) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            sequence: node.sequence.unwrap_or_default(),
            lessons: node.lessons.clone(),
            quizzes: node.quizzes.clone(),
            completion_rate: progress.map(|p| p.completion_rate(node)),
            average_score: progress.map(|p| p.average_score(node)),
        }
    }
}

/// One student's completion flags and current quiz percentages, fetched once per index.
#[derive(Debug, Clone, Default)]
pub struct StudentProgress {
    completed: HashSet<String>,
    percent_by_quiz: HashMap<String, f64>,
}

impl StudentProgress {
    pub fn load(store: &Store<'_>, student_id: &str, index: &CurriculumIndex) -> EngineResult<Self> {
        let completions = store.lesson_completions(student_id, &index.lesson_ids())?;
        let attempts = store.quiz_attempts(student_id, &index.quiz_ids())?;
        Ok(Self::from_records(&completions, &attempts))
    }

    pub fn from_records(completions: &HashMap<String, bool>, attempts: &[AttemptRecord]) -> Self {
        let completed = completions
            .iter()
            .filter(|(_, done)| **done)
            .map(|(id, _)| id.clone())
            .collect();
        let percent_by_quiz = attempts
            .iter()
            .filter_map(|a| a.percent().map(|p| (a.quiz_id.clone(), p)))
            .collect();
        Self {
            completed,
            percent_by_quiz,
        }
    }

    pub fn is_completed(&self, lesson_id: &str) -> bool {
        self.completed.contains(lesson_id)
    }

    /// Percent of the subtopic's lessons completed; 100 when it has none.
    pub fn completion_rate(&self, subtopic: &CurriculumNode) -> f64 {
        if subtopic.lessons.is_empty() {
            return 100.0;
        }
        let done = subtopic
            .lessons
            .iter()
            .filter(|l| self.is_completed(&l.id))
            .count();
        done as f64 / subtopic.lessons.len() as f64 * 100.0
    }

    pub fn average_score(&self, subtopic: &CurriculumNode) -> Score {
        Score::mean(
            subtopic
                .quizzes
                .iter()
                .filter_map(|q| self.percent_by_quiz.get(&q.id).copied()),
        )
    }

    pub fn first_incomplete_lesson<'n>(&self, subtopic: &'n CurriculumNode) -> Option<&'n ContentRef> {
        subtopic.lessons.iter().find(|l| !self.is_completed(&l.id))
    }

    /// Mean over every attempted quiz in the classroom.
    pub fn classroom_average(&self, index: &CurriculumIndex) -> Score {
        Score::mean(
            index
                .subtopics()
                .flat_map(|st| st.quizzes.iter())
                .filter_map(|q| self.percent_by_quiz.get(&q.id).copied()),
        )
    }

    pub fn completed_lessons(&self, index: &CurriculumIndex) -> usize {
        index
            .subtopics()
            .flat_map(|st| st.lessons.iter())
            .filter(|l| self.is_completed(&l.id))
            .count()
    }
}
