//! File-backed inputs: question papers, response sheets and answer keys.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use examforge_core::config::NormalizerConfig;
use examforge_core::normalizer::{self, clean_text, split_blocks, DocumentMeta, NormalizedExam};
use examforge_core::traits::{ExtractedDocument, ExtractionFeed};
use examforge_core::{AnswerKey, Exam, JsonReport, Label, QuestionId, ResponseMatrix};

/// Reads plain-text papers from disk and segments them at question numbers.
pub struct PlainTextFeed {
    strip_noise: bool,
}

impl PlainTextFeed {
    pub fn new(config: &NormalizerConfig) -> Self {
        Self {
            strip_noise: config.strip_noise,
        }
    }
}

#[async_trait]
impl ExtractionFeed for PlainTextFeed {
    fn name(&self) -> &str {
        "plain-text"
    }

    async fn extract(&self, document: &str) -> Result<ExtractedDocument> {
        let raw = tokio::fs::read_to_string(document)
            .await
            .with_context(|| format!("failed to read {document}"))?;
        Ok(extract_text(&raw, Path::new(document), None, self.strip_noise))
    }
}

/// Segment raw paper text into question blocks.
pub fn extract_text(
    raw: &str,
    path: &Path,
    title: Option<String>,
    strip_noise: bool,
) -> ExtractedDocument {
    let source = if strip_noise {
        clean_text(raw)
    } else {
        raw.to_string()
    };
    ExtractedDocument {
        meta: DocumentMeta {
            title: title.or_else(|| {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            }),
            source_file: path.file_name().map(|s| s.to_string_lossy().into_owned()),
        },
        blocks: split_blocks(&source),
    }
}

/// Load an exam from a `.json` file (a normalized exam or a bare exam) or
/// normalize it from a plain-text paper.
pub fn load_exam(
    path: &Path,
    title: Option<String>,
    config: &NormalizerConfig,
) -> Result<NormalizedExam> {
    if has_extension(path, "json") {
        if let Ok(normalized) = NormalizedExam::load_json(path) {
            return Ok(normalized);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let exam: Exam = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse exam JSON: {}", path.display()))?;
        return Ok(NormalizedExam {
            exam,
            warnings: vec![],
        });
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let document = extract_text(&raw, path, title, config.strip_noise);
    normalizer::normalize(&document.blocks, &document.meta, config)
        .with_context(|| format!("failed to normalize {}", path.display()))
}

/// Load a response sheet from `.json` or CSV.
pub fn load_responses(path: &Path) -> Result<ResponseMatrix> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read responses from {}", path.display()))?;
    if has_extension(path, "json") {
        return serde_json::from_str(&content)
            .with_context(|| format!("failed to parse responses JSON: {}", path.display()));
    }
    parse_responses_csv(&content)
        .with_context(|| format!("failed to parse responses CSV: {}", path.display()))
}

/// Parse a response sheet in wide (`student_id,1,2,...`) or long
/// (`student_id,question_id,answer`) form.
pub fn parse_responses_csv(content: &str) -> Result<ResponseMatrix> {
    let content = content.trim_start_matches('\u{feff}');
    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((header_no, header)) = lines.next() else {
        anyhow::bail!("response sheet is empty");
    };
    let header = split_row(header, header_no + 1)?;
    anyhow::ensure!(
        header.len() >= 2,
        "header needs a student column and at least one question column"
    );

    let mut matrix = ResponseMatrix::new();
    let long_form = is_long_form(&header);
    if long_form {
        for (line_no, line) in lines {
            let row = split_row(line, line_no + 1)?;
            anyhow::ensure!(
                row.len() >= 3,
                "line {}: expected student_id,question_id,answer",
                line_no + 1
            );
            let question = parse_question_id(&row[1])
                .with_context(|| format!("line {}: bad question id", line_no + 1))?;
            matrix.insert(row[0].clone(), question, &row[2]);
        }
    } else {
        let questions = header[1..]
            .iter()
            .map(|h| parse_question_id(h))
            .collect::<Result<Vec<_>>>()
            .context("bad question column header")?;
        for (line_no, line) in lines {
            let row = split_row(line, line_no + 1)?;
            let student = row[0].clone();
            matrix.add_student(student.clone());
            for (question, answer) in questions.iter().zip(row.iter().skip(1)) {
                matrix.insert(student.clone(), *question, answer);
            }
        }
    }

    tracing::debug!(
        "parsed {} response sheet: {} student(s)",
        if long_form { "long" } else { "wide" },
        matrix.student_count()
    );
    Ok(matrix)
}

fn is_long_form(header: &[String]) -> bool {
    let lower: Vec<String> = header.iter().map(|h| h.to_lowercase()).collect();
    lower.len() == 3
        && matches!(lower[1].as_str(), "question_id" | "question" | "qid")
        && matches!(lower[2].as_str(), "answer" | "response" | "choice")
}

/// Split a row on commas. Quotes around a cell are stripped, but a comma
/// inside quotes is rejected rather than split.
fn split_row(line: &str, line_no: usize) -> Result<Vec<String>> {
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            ',' if quoted => anyhow::bail!(
                "line {line_no}: quoted cell contains a comma, which response sheets do not support"
            ),
            _ => {}
        }
    }
    Ok(line
        .split(',')
        .map(|cell| cell.trim().trim_matches('"').trim().to_string())
        .collect())
}

/// `3`, `Q3`, `q3` and `Question 3` all name question 3.
fn parse_question_id(raw: &str) -> Result<QuestionId> {
    let lower = raw.trim().to_lowercase();
    let digits = lower
        .strip_prefix("question")
        .or_else(|| lower.strip_prefix('q'))
        .unwrap_or(&lower)
        .trim();
    let id: QuestionId = digits
        .parse()
        .with_context(|| format!("'{raw}' is not a question number"))?;
    anyhow::ensure!(id > 0, "question numbers start at 1, got '{raw}'");
    Ok(id)
}

/// Resolve `--key`: a `.json` file, a text file holding `1:C,2:A`, or the
/// inline `1:C,2:A` form itself.
pub fn load_key(spec: &str) -> Result<AnswerKey> {
    let path = Path::new(spec);
    if path.is_file() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read answer key from {}", path.display()))?;
        if has_extension(path, "json") {
            return serde_json::from_str(&content)
                .with_context(|| format!("failed to parse answer key JSON: {}", path.display()));
        }
        let key = parse_key(&content)?;
        tracing::debug!("loaded {} answer key entries from {}", key.len(), path.display());
        return Ok(key);
    }
    parse_key(spec)
}

/// Parse `1:C,2:A` (also `1=C`, `;` or newline separated).
pub fn parse_key(text: &str) -> Result<AnswerKey> {
    let mut key = AnswerKey::new();
    for entry in text
        .trim_start_matches('\u{feff}')
        .split([',', ';', '\n'])
        .map(str::trim)
        .filter(|e| !e.is_empty())
    {
        let (question, label) = entry
            .split_once([':', '='])
            .with_context(|| format!("answer key entry '{entry}' is not of the form 1:C"))?;
        let question = parse_question_id(question)?;
        let label: Label = label
            .parse()
            .map_err(|e| anyhow::anyhow!("answer key entry '{entry}': {e}"))?;
        key.insert(question, label);
    }
    anyhow::ensure!(!key.is_empty(), "answer key is empty");
    Ok(key)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_csv_with_bom_and_blanks() {
        let csv = "\u{feff}student_id,Q1,Q2,Q3\ns1,a,B,\ns2,C,,D\n";
        let m = parse_responses_csv(csv).unwrap();
        assert_eq!(m.student_count(), 2);
        assert_eq!(m.response("s1", 1), Some("A"));
        assert_eq!(m.response("s1", 3), None);
        assert_eq!(m.response("s2", 2), None);
        assert_eq!(m.response("s2", 3), Some("D"));
    }

    #[test]
    fn long_csv() {
        let csv = "student_id,question_id,answer\ns1,1,A\ns1,2,C\ns2,1,B\n";
        let m = parse_responses_csv(csv).unwrap();
        assert_eq!(m.student_count(), 2);
        assert_eq!(m.response("s1", 2), Some("C"));
        assert_eq!(m.response("s2", 1), Some("B"));
    }

    #[test]
    fn quoted_cells_are_unwrapped() {
        let m = parse_responses_csv("\"student_id\",\"1\",\"2\"\n\"s1\",\"A\",\"\"\n").unwrap();
        assert_eq!(m.response("s1", 1), Some("A"));
        assert_eq!(m.response("s1", 2), None);
    }

    #[test]
    fn quoted_comma_is_rejected() {
        let err = parse_responses_csv("student_id,1,2\n\"s1\",\"A,B\",C\n").unwrap_err();
        assert!(format!("{err:#}").contains("line 2: quoted cell contains a comma"));
    }

    #[test]
    fn bad_header_is_error() {
        assert!(parse_responses_csv("student,first,second\ns1,A,B").is_err());
        assert!(parse_responses_csv("").is_err());
    }

    #[test]
    fn inline_key() {
        let key = parse_key("1:C, 2:a;Q3=D\n4: B").unwrap();
        assert_eq!(key.len(), 4);
        assert_eq!(key.get(2), Label::new('A'));
        assert_eq!(key.get(3), Label::new('D'));
    }

    #[test]
    fn malformed_key_entry() {
        assert!(parse_key("1C").is_err());
        assert!(parse_key("x:C").is_err());
        assert!(parse_key("1:CD").is_err());
        assert!(parse_key(" , ").is_err());
    }

    #[test]
    fn key_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, r#"{"1": "C", "2": "A"}"#).unwrap();
        let key = load_key(path.to_str().unwrap()).unwrap();
        assert_eq!(key.get(1), Label::new('C'));
    }

    #[test]
    fn text_paper_title_from_file_name() {
        let doc = extract_text(
            "Page 1\n1. Define osmosis.\nA. x\nB. y\n",
            Path::new("papers/biology-final.txt"),
            None,
            true,
        );
        assert_eq!(doc.meta.title.as_deref(), Some("biology-final"));
        assert_eq!(doc.meta.source_file.as_deref(), Some("biology-final.txt"));
        assert_eq!(doc.blocks.len(), 1);
    }
}
