//! Core data model types for examforge.
//!
//! These are the canonical records shared by the normalizer and both
//! analysis engines: questions and their options, the exam that groups
//! them, and the response/answer-key inputs to the statistics engine.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// 1-based question identifier, assigned in document order.
pub type QuestionId = u32;

/// An option label: a single uppercase ASCII letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label(char);

impl Label {
    /// Build a label from a letter, upper-casing it. Returns `None` for
    /// anything that is not an ASCII letter.
    pub fn new(c: char) -> Option<Self> {
        let upper = c.to_ascii_uppercase();
        upper.is_ascii_uppercase().then_some(Label(upper))
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Label::new(c).ok_or_else(|| format!("invalid option label: {s:?}")),
            _ => Err(format!("invalid option label: {s:?}")),
        }
    }
}

impl TryFrom<String> for Label {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0.to_string()
    }
}

/// One answer choice of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub label: Label,
    pub text: String,
}

/// A canonical question record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// 1-based id, stable for the life of the exam.
    pub id: QuestionId,
    /// The question stem.
    pub text: String,
    /// Options in encountered order.
    #[serde(default)]
    pub options: Vec<AnswerOption>,
    /// Label of the correct option, when known.
    #[serde(default)]
    pub correct_option: Option<Label>,
    /// Whether normalization found a problem with this question.
    #[serde(default)]
    pub is_flagged: bool,
    /// Human-readable reasons for the flag.
    #[serde(default)]
    pub flag_reasons: Vec<String>,
}

impl Question {
    pub fn new(id: QuestionId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            options: Vec::new(),
            correct_option: None,
            is_flagged: false,
            flag_reasons: Vec::new(),
        }
    }

    /// Look up an option by label.
    pub fn option(&self, label: Label) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.label == label)
    }

    pub(crate) fn flag(&mut self, reason: impl Into<String>) {
        self.is_flagged = true;
        self.flag_reasons.push(reason.into());
    }
}

/// A normalized exam: an ordered list of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub source_file: Option<String>,
    pub questions: Vec<Question>,
    pub total_questions: usize,
}

impl Exam {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source_file: Option<String>,
        questions: Vec<Question>,
    ) -> Self {
        let total_questions = questions.len();
        Self {
            id: id.into(),
            title: title.into(),
            source_file,
            questions,
            total_questions,
        }
    }

    /// Look up a question by id.
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Check the structural invariants both engines rely on.
    pub fn validate(&self) -> Result<()> {
        if self.total_questions != self.questions.len() {
            return Err(AnalysisError::InvalidExam(format!(
                "total_questions is {} but {} questions are present",
                self.total_questions,
                self.questions.len()
            )));
        }

        let mut seen = HashSet::new();
        for q in &self.questions {
            if q.id == 0 {
                return Err(AnalysisError::InvalidExam(
                    "question ids must be positive".into(),
                ));
            }
            if !seen.insert(q.id) {
                return Err(AnalysisError::InvalidExam(format!(
                    "duplicate question id {}",
                    q.id
                )));
            }

            let mut labels = HashSet::new();
            for opt in &q.options {
                if !labels.insert(opt.label) {
                    return Err(AnalysisError::InvalidExam(format!(
                        "question {} repeats option label {}",
                        q.id, opt.label
                    )));
                }
            }

            if let Some(correct) = q.correct_option {
                if q.option(correct).is_none() {
                    return Err(AnalysisError::InvalidExam(format!(
                        "question {} marks {} correct but has no such option",
                        q.id, correct
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Student responses keyed by student identifier, then question id.
///
/// Responses are stored trimmed and upper-cased. A missing entry means the
/// student left the question blank; a value that is not a valid label is
/// kept so it can be counted as answered but incorrect.
///
/// The JSON form maps student ids to `{question_id: answer}` objects. A
/// `null` or blank answer is read as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResponseMatrix {
    rows: BTreeMap<String, BTreeMap<QuestionId, String>>,
}

impl<'de> Deserialize<'de> for ResponseMatrix {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = BTreeMap::<String, BTreeMap<QuestionId, Option<String>>>::deserialize(
            deserializer,
        )?;
        let mut matrix = ResponseMatrix::new();
        for (student, answers) in raw {
            matrix.add_student(student.clone());
            for (question, answer) in answers {
                if let Some(answer) = answer {
                    matrix.insert(student.clone(), question, &answer);
                }
            }
        }
        Ok(matrix)
    }
}

impl ResponseMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a response. Blank answers are treated as absent, but the
    /// student row is still created.
    pub fn insert(&mut self, student: impl Into<String>, question: QuestionId, answer: &str) {
        let row = self.rows.entry(student.into()).or_default();
        let answer = answer.trim().to_uppercase();
        if !answer.is_empty() {
            row.insert(question, answer);
        }
    }

    /// Ensure a student row exists even if it has no answers.
    pub fn add_student(&mut self, student: impl Into<String>) {
        self.rows.entry(student.into()).or_default();
    }

    pub fn student_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Student identifiers in sorted order.
    pub fn students(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// The response a student gave to a question, if any.
    pub fn response(&self, student: &str, question: QuestionId) -> Option<&str> {
        self.rows
            .get(student)
            .and_then(|row| row.get(&question))
            .map(String::as_str)
    }

    /// Every question id mentioned by any row.
    pub fn referenced_questions(&self) -> BTreeSet<QuestionId> {
        self.rows
            .values()
            .flat_map(|row| row.keys().copied())
            .collect()
    }
}

/// Mapping from question id to the correct option label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerKey {
    entries: BTreeMap<QuestionId, Label>,
}

impl AnswerKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, question: QuestionId, label: Label) {
        self.entries.insert(question, label);
    }

    pub fn get(&self, question: QuestionId) -> Option<Label> {
        self.entries.get(&question).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuestionId, Label)> + '_ {
        self.entries.iter().map(|(q, l)| (*q, *l))
    }

    /// Build a key from the `correct_option` fields of an exam.
    pub fn from_exam(exam: &Exam) -> Self {
        exam.questions
            .iter()
            .filter_map(|q| q.correct_option.map(|l| (q.id, l)))
            .collect()
    }
}

impl FromIterator<(QuestionId, Label)> for AnswerKey {
    fn from_iter<I: IntoIterator<Item = (QuestionId, Label)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
