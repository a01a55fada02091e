//! Question-block normalizer.
//!
//! Turns the raw text blocks produced by an extractor into a canonical
//! [`Exam`]. Malformed blocks are kept and flagged rather than rejected, so
//! one bad question never costs the whole document.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::NormalizerConfig;
use crate::error::{AnalysisError, Result};
use crate::model::{AnswerOption, Exam, Label, Question, QuestionId};

/// `1.`, `1)`, `Q1.`, `Q.1`, `Question 1:` followed by the stem. The stem
/// must not start with a digit so `10.5 is ...` is left alone.
static QUESTION_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:question|q)\s*\.?\s*(\d{1,3})\s*[.):\-]?|(\d{1,3})\s*[.):\-])\s*(\D.*)?$",
    )
    .expect("question start pattern is valid")
});

/// `A. text`, `A) text`, `(A) text`, `a: text`, `A - text`.
///
/// Any line shaped like a marker is an option, including the first line
/// after the question number: `1. E. coli is ...` reads as option E with an
/// empty stem, which is then flagged for review.
static OPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(?([A-Za-z])\s*[).:\-]\s*(.*)$").expect("option pattern is valid")
});

/// `Answer: C`, `Ans: (b)`, `Correct answer: A`, `Key: D`.
static ANSWER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:correct\s+answer|answer|ans|key)[\s:.\-]+\(?([A-Za-z])\)?\s*\.?$")
        .expect("answer pattern is valid")
});

static NOISE_LINES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^page\s+\d+(?:\s+of\s+\d+)?$",
        r"^\d+$",
        r"^-+$",
        r"^={3,}$",
        r"(?i)^(?:section|part|unit)\s+[ivxlcdm\d]+$",
        r"(?i)^answer\s+(?:key|sheet)$",
        r"(?i)^\(?\s*continued\s*\)?$",
        r"(?i)^www\.\S+$",
        r"^©.*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("noise pattern is valid"))
    .collect()
});

const DEFAULT_TITLE: &str = "Untitled Exam";

/// Descriptive metadata that travels with a document's blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: Option<String>,
    pub source_file: Option<String>,
}

/// Normalizer output: the exam plus every warning collected on the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedExam {
    pub exam: Exam,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Remove noise lines (page numbers, dividers, headings, URLs) and collapse
/// runs of whitespace inside each remaining line.
pub fn clean_text(raw: &str) -> String {
    raw.lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty() && !is_noise(line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_noise(line: &str) -> bool {
    NOISE_LINES.iter().any(|re| re.is_match(line))
}

/// Split a raw document into question blocks at question-number starters.
///
/// Text before the first starter (titles, instructions) is dropped.
pub fn split_blocks(raw: &str) -> Vec<String> {
    let mut blocks: Vec<String> = Vec::new();
    let mut current: Option<String> = None;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if QUESTION_START.is_match(trimmed) {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            current = Some(trimmed.to_string());
        } else if let Some(block) = current.as_mut() {
            block.push('\n');
            block.push_str(trimmed);
        }
    }

    if let Some(block) = current {
        blocks.push(block);
    }
    blocks
}

/// Normalize already-segmented question blocks into an [`Exam`].
///
/// Ids are assigned 1, 2, 3... over the non-empty blocks in order. Fails
/// with [`AnalysisError::EmptyDocument`] if no block has content.
pub fn normalize(
    blocks: &[String],
    meta: &DocumentMeta,
    config: &NormalizerConfig,
) -> Result<NormalizedExam> {
    let mut questions = Vec::new();
    let mut warnings = Vec::new();

    for (index, block) in blocks.iter().enumerate() {
        let cleaned = if config.strip_noise {
            clean_text(block)
        } else {
            block
                .lines()
                .map(collapse_whitespace)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join("\n")
        };

        if cleaned.is_empty() {
            warnings.push(format!("Block {}: no text after cleaning, skipped", index + 1));
            continue;
        }

        let id = questions.len() as QuestionId + 1;
        let question = parse_block(id, &cleaned, config, &mut warnings);
        tracing::debug!(
            "question {}: {} option(s), flagged={}",
            id,
            question.options.len(),
            question.is_flagged
        );
        questions.push(question);
    }

    if questions.is_empty() {
        return Err(AnalysisError::EmptyDocument);
    }

    let exam = Exam::new(
        exam_id(blocks, meta),
        meta.title.clone().unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        meta.source_file.clone(),
        questions,
    );

    let flagged = exam.questions.iter().filter(|q| q.is_flagged).count();
    tracing::info!(
        "normalized {} question(s), {} flagged, {} warning(s)",
        exam.total_questions,
        flagged,
        warnings.len()
    );

    Ok(NormalizedExam { exam, warnings })
}

/// Segment raw text with [`split_blocks`] and normalize the result.
pub fn normalize_text(
    raw: &str,
    meta: &DocumentMeta,
    config: &NormalizerConfig,
) -> Result<NormalizedExam> {
    let source = if config.strip_noise {
        clean_text(raw)
    } else {
        raw.to_string()
    };
    normalize(&split_blocks(&source), meta, config)
}

/// Stable id derived from the document's name and content.
fn exam_id(blocks: &[String], meta: &DocumentMeta) -> String {
    let mut name = Vec::new();
    name.extend_from_slice(meta.source_file.as_deref().unwrap_or_default().as_bytes());
    for block in blocks {
        name.push(0x1e);
        name.extend_from_slice(block.as_bytes());
    }
    Uuid::new_v5(&Uuid::NAMESPACE_OID, &name).to_string()
}

fn strip_question_number(line: &str) -> &str {
    match QUESTION_START.captures(line) {
        Some(caps) => caps.get(3).map_or("", |m| m.as_str().trim()),
        None => line,
    }
}

fn parse_option_line<'a>(line: &'a str, max_label: char) -> Option<(Label, &'a str)> {
    let caps = OPTION_LINE.captures(line)?;
    let label = caps.get(1).and_then(|m| m.as_str().chars().next())?;
    let label = Label::new(label)?;
    if label.as_char() > max_label {
        return None;
    }
    let text = caps.get(2).map_or("", |m| m.as_str().trim());
    Some((label, text))
}

fn parse_answer_line(line: &str) -> Option<Label> {
    let caps = ANSWER_LINE.captures(line)?;
    caps.get(1)
        .and_then(|m| m.as_str().chars().next())
        .and_then(Label::new)
}

fn append(target: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

/// Parse one cleaned block into a question, pushing warnings as it goes.
fn parse_block(
    id: QuestionId,
    block: &str,
    config: &NormalizerConfig,
    warnings: &mut Vec<String>,
) -> Question {
    let mut question = Question::new(id, String::new());
    let mut stem = String::new();
    let mut answer: Option<Label> = None;
    // Index of the option that continuation lines belong to.
    let mut current: Option<usize> = None;
    let mut skipping_duplicate = false;

    for (i, line) in block.lines().enumerate() {
        let line = if i == 0 {
            strip_question_number(line)
        } else {
            line
        };
        if line.is_empty() {
            continue;
        }

        if let Some(label) = parse_answer_line(line) {
            answer = Some(label);
            continue;
        }

        if let Some((label, text)) = parse_option_line(line, config.max_option_label) {
            if question.option(label).is_some() {
                question.flag(format!("duplicate option label {label}"));
                warnings.push(format!(
                    "Question {id}: duplicate option label {label} dropped"
                ));
                current = None;
                skipping_duplicate = true;
            } else {
                question.options.push(AnswerOption {
                    label,
                    text: text.to_string(),
                });
                current = Some(question.options.len() - 1);
                skipping_duplicate = false;
            }
            continue;
        }

        if skipping_duplicate {
            continue;
        }
        match current {
            Some(idx) => append(&mut question.options[idx].text, line),
            None => append(&mut stem, line),
        }
    }

    question.text = stem;

    if question.text.is_empty() {
        question.flag("empty question text");
        warnings.push(format!("Question {id}: empty question text"));
    }

    if question.options.len() < 2 {
        question.flag("insufficient options");
        warnings.push(format!("Question {id}: missing options"));
    }

    if let Some(label) = answer {
        if !config.inline_answers {
            tracing::debug!("question {id}: ignoring inline answer {label}");
        } else if question.option(label).is_some() {
            question.correct_option = Some(label);
        } else {
            warnings.push(format!(
                "Question {id}: answer {label} does not match any option"
            ));
        }
    }

    question
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn run(raw: &[&str]) -> NormalizedExam {
        normalize(&blocks(raw), &DocumentMeta::default(), &NormalizerConfig::default()).unwrap()
    }

    const SAMPLE_TEXT: &str = "
Page 1

1. What is the capital of France?
(A) London
(B) Berlin
(C) Paris
(D) Madrid
Answer: C

2. Which planet is closest to the Sun?
A. Earth
B. Venus
C. Mercury
D. Mars

3. The speed of light is approximately:
(a) 3 x 10^8 m/s
(b) 3 x 10^6 m/s
Ans: a

4. Who wrote Hamlet?
A) Charles Dickens
B) William Shakespeare
";

    #[test]
    fn parses_stem_and_options() {
        let result = run(&["1. What is the capital of France?\n(A) London\n(B) Paris"]);
        let q = &result.exam.questions[0];
        assert_eq!(q.id, 1);
        assert_eq!(q.text, "What is the capital of France?");
        assert_eq!(q.options.len(), 2);
        assert_eq!(q.options[0].label.as_char(), 'A');
        assert_eq!(q.options[1].text, "Paris");
        assert!(!q.is_flagged);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn multi_line_stem_and_option_continuation() {
        let result = run(&[
            "Which of the following\nis a prime number?\nA. 4\nB. 7, which is\nalso odd\nC. 9",
        ]);
        let q = &result.exam.questions[0];
        assert_eq!(q.text, "Which of the following is a prime number?");
        assert_eq!(q.options[1].text, "7, which is also odd");
        assert_eq!(q.options.len(), 3);
    }

    #[test]
    fn insufficient_options_flagged_and_processing_continues() {
        let result = run(&[
            "1. Define osmosis.",
            "2. Pick one\nA. yes\nB. no",
            "3. Lonely\nA. only",
        ]);
        assert_eq!(result.exam.total_questions, 3);

        let q1 = &result.exam.questions[0];
        assert!(q1.is_flagged);
        assert_eq!(q1.flag_reasons, vec!["insufficient options"]);
        assert!(!result.exam.questions[1].is_flagged);
        assert!(result.exam.questions[2].is_flagged);
        assert_eq!(
            result.warnings,
            vec!["Question 1: missing options", "Question 3: missing options"]
        );
    }

    #[test]
    fn ids_follow_document_order_skipping_empty_blocks() {
        let result = run(&["Q one\nA. a\nB. b", "   \n  ", "Q two\nA. a\nB. b"]);
        let ids: Vec<_> = result.exam.questions.iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(result.exam.questions[1].text, "Q two");
        assert!(result.warnings[0].starts_with("Block 2"));
    }

    #[test]
    fn empty_document_is_an_error() {
        let config = NormalizerConfig::default();
        let meta = DocumentMeta::default();
        assert_eq!(
            normalize(&[], &meta, &config).unwrap_err(),
            AnalysisError::EmptyDocument
        );
        assert_eq!(
            normalize(&blocks(&["", "Page 3"]), &meta, &config).unwrap_err(),
            AnalysisError::EmptyDocument
        );
    }

    #[test]
    fn answer_lines_ignored_by_default() {
        let result = run(&["What is 2 + 2?\nA. 3\nB. 4\nAnswer: B"]);
        let q = &result.exam.questions[0];
        assert_eq!(q.correct_option, None);
        assert_eq!(q.options.len(), 2);
        assert_eq!(q.options[1].text, "4");
    }

    #[test]
    fn inline_answers_when_enabled() {
        let config = NormalizerConfig {
            inline_answers: true,
            ..Default::default()
        };
        let raw = blocks(&[
            "What is 2 + 2?\nA. 3\nB. 4\nAns: (b)",
            "What is 3 + 3?\nA. 6\nB. 5\nKey: E",
        ]);
        let result = normalize(&raw, &DocumentMeta::default(), &config).unwrap();
        assert_eq!(result.exam.questions[0].correct_option, Label::new('B'));
        assert_eq!(result.exam.questions[1].correct_option, None);
        assert_eq!(
            result.warnings,
            vec!["Question 2: answer E does not match any option"]
        );
        assert!(result.exam.validate().is_ok());
    }

    #[test]
    fn duplicate_label_dropped_and_flagged() {
        let result = run(&["Pick\nA. one\nB. two\nB. again\ncontinued text\nC. three"]);
        let q = &result.exam.questions[0];
        let labels: String = q.options.iter().map(|o| o.label.as_char()).collect();
        assert_eq!(labels, "ABC");
        assert_eq!(q.options[1].text, "two");
        assert!(q.is_flagged);
        assert_eq!(q.flag_reasons, vec!["duplicate option label B"]);
        assert!(result.exam.validate().is_ok());
    }

    #[test]
    fn labels_beyond_max_are_text() {
        let result = run(&["Choose\nA. first\nB. second\nZ: not an option"]);
        let q = &result.exam.questions[0];
        assert_eq!(q.options.len(), 2);
        assert_eq!(q.options[1].text, "second Z: not an option");
    }

    #[test]
    fn empty_stem_flagged() {
        let result = run(&["3.\nA. yes\nB. no"]);
        let q = &result.exam.questions[0];
        assert_eq!(q.text, "");
        assert_eq!(q.flag_reasons, vec!["empty question text"]);
    }

    #[test]
    fn stem_shaped_like_an_option_marker_is_an_option() {
        let result = run(&["1. E. coli is a bacterium.\nA. True\nB. False"]);
        let q = &result.exam.questions[0];
        assert_eq!(q.text, "");
        let labels: Vec<char> = q.options.iter().map(|o| o.label.as_char()).collect();
        assert_eq!(labels, vec!['E', 'A', 'B']);
        assert_eq!(q.options[0].text, "coli is a bacterium.");
        assert_eq!(q.flag_reasons, vec!["empty question text"]);
        assert!(result.warnings.contains(&"Question 1: empty question text".to_string()));
    }

    #[test]
    fn question_number_prefixes_stripped() {
        for raw in ["1. Stem", "1) Stem", "Q1. Stem", "Q.1 Stem", "Question 12: Stem", "7 - Stem"] {
            assert_eq!(strip_question_number(raw), "Stem", "prefix of {raw:?}");
        }
        assert_eq!(strip_question_number("10.5 is a decimal"), "10.5 is a decimal");
        assert_eq!(strip_question_number("Quebec is a city"), "Quebec is a city");
    }

    #[test]
    fn clean_text_drops_noise() {
        let raw = "Page 2\n  What   is\tthis?  \n---\n14\n(continued)\nwww.example.com\n© 2024 School\nA. that";
        assert_eq!(clean_text(raw), "What is this?\nA. that");
    }

    #[test]
    fn split_blocks_segments_on_numbers() {
        let blocks = split_blocks(SAMPLE_TEXT);
        assert_eq!(blocks.len(), 4);
        assert!(blocks[0].starts_with("1. What is the capital"));
        assert!(blocks[0].ends_with("Answer: C"));
        assert!(blocks[3].contains("William Shakespeare"));
    }

    #[test]
    fn normalize_text_end_to_end() {
        let meta = DocumentMeta {
            title: Some("Science".into()),
            source_file: Some("paper.pdf".into()),
        };
        let result = normalize_text(SAMPLE_TEXT, &meta, &NormalizerConfig::default()).unwrap();
        let exam = &result.exam;
        assert_eq!(exam.total_questions, 4);
        assert_eq!(exam.title, "Science");
        assert_eq!(exam.source_file.as_deref(), Some("paper.pdf"));
        assert_eq!(exam.questions[2].options[0].text, "3 x 10^8 m/s");
        assert_eq!(exam.questions[2].options[0].label.as_char(), 'A');
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn deterministic_output() {
        let meta = DocumentMeta {
            title: None,
            source_file: Some("paper.txt".into()),
        };
        let config = NormalizerConfig::default();
        let first = normalize_text(SAMPLE_TEXT, &meta, &config).unwrap();
        let second = normalize_text(SAMPLE_TEXT, &meta, &config).unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(first.exam.title, "Untitled Exam");
    }

    #[test]
    fn exam_id_depends_on_content() {
        let meta = DocumentMeta::default();
        let config = NormalizerConfig::default();
        let a = normalize(&blocks(&["One\nA. x\nB. y"]), &meta, &config).unwrap();
        let b = normalize(&blocks(&["Two\nA. x\nB. y"]), &meta, &config).unwrap();
        assert_ne!(a.exam.id, b.exam.id);
    }
}
