//! The `examforge analyze` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use comfy_table::{Cell, Table};
use serde::Serialize;

use examforge_core::engine::{
    AnalysisOutcome, BatchEntry, BatchJob, ExamAnalyzer, ProgressReporter, StatsInput,
};
use examforge_core::{AnswerKey, JsonReport};

use super::load_config;
use crate::feeds::{load_key, load_responses, PlainTextFeed};

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_document_start(&self, document: &str) {
        eprintln!("  Starting: {document}");
    }

    fn on_document_complete(&self, document: &str, outcome: &AnalysisOutcome) {
        eprintln!(
            "  Done: {document} ({} questions, {} warning(s))",
            outcome.normalized.exam.total_questions,
            outcome.normalized.warnings.len()
        );
    }

    fn on_document_error(&self, document: &str, error: &str) {
        eprintln!("  ERROR: {document}: {error}");
    }

    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {completed}/{total} succeeded, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

/// Index of what was written for each document.
#[derive(Debug, Serialize)]
struct ManifestEntry {
    document: String,
    exam_id: Option<String>,
    exam: Option<PathBuf>,
    similarity: Option<PathBuf>,
    statistics: Option<PathBuf>,
    errors: Vec<String>,
}

pub async fn execute(
    inputs: Vec<PathBuf>,
    responses_path: Option<PathBuf>,
    key_spec: Option<String>,
    parallelism: usize,
    output: PathBuf,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");
    anyhow::ensure!(
        key_spec.is_none() || responses_path.is_some(),
        "--key needs --responses"
    );

    let config = load_config(config_path)?;
    let feed = Arc::new(PlainTextFeed::new(&config.normalizer));
    let analyzer = ExamAnalyzer::new(config)?.with_parallelism(parallelism);

    let responses = responses_path.as_deref().map(load_responses).transpose()?;
    let key = key_spec.as_deref().map(load_key).transpose()?;

    let jobs: Vec<BatchJob> = inputs
        .iter()
        .map(|path| BatchJob {
            document: path.display().to_string(),
            stats: responses.clone().map(|responses| StatsInput {
                responses,
                key: key.clone().unwrap_or_default(),
            }),
        })
        .collect();

    eprintln!("examforge v{}: analyzing {} document(s)", env!("CARGO_PKG_VERSION"), jobs.len());
    eprintln!();

    let jobs = if key.is_none() && responses.is_some() {
        with_inline_keys(jobs, &feed, &analyzer).await
    } else {
        jobs
    };

    let entries = analyzer.analyze_batch(feed, jobs, &ConsoleReporter).await;

    std::fs::create_dir_all(&output)?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
    let mut manifest = Vec::with_capacity(entries.len());
    for entry in &entries {
        manifest.push(write_outputs(entry, &output, &timestamp.to_string())?);
    }

    print_summary(&entries);

    let manifest_path = output.join(format!("manifest-{timestamp}.json"));
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
    eprintln!("Results saved to: {}", output.display());

    let failed = manifest.iter().filter(|m| !m.errors.is_empty()).count();
    anyhow::ensure!(
        failed == 0,
        "{failed} of {} document(s) had errors",
        manifest.len()
    );
    Ok(())
}

/// Without `--key`, score each paper against the answers printed in it.
async fn with_inline_keys(
    jobs: Vec<BatchJob>,
    feed: &PlainTextFeed,
    analyzer: &ExamAnalyzer,
) -> Vec<BatchJob> {
    use examforge_core::traits::ExtractionFeed;

    let mut keyed = Vec::with_capacity(jobs.len());
    for mut job in jobs {
        // Failures surface again, with context, when the batch runs the job.
        let normalized = match feed.extract(&job.document).await {
            Ok(doc) => analyzer
                .normalize(doc.blocks, doc.meta)
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };
        match normalized {
            Ok(normalized) => {
                if let Some(stats) = job.stats.as_mut() {
                    stats.key = AnswerKey::from_exam(&normalized.exam);
                    tracing::debug!(
                        "{}: {} inline answer(s) used as the key",
                        job.document,
                        stats.key.len()
                    );
                }
            }
            Err(e) => tracing::debug!("{}: no inline key ({e:#})", job.document),
        }
        keyed.push(job);
    }
    keyed
}

fn write_outputs(entry: &BatchEntry, dir: &Path, timestamp: &str) -> Result<ManifestEntry> {
    let stem = Path::new(&entry.document)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let mut manifest = ManifestEntry {
        document: entry.document.clone(),
        exam_id: None,
        exam: None,
        similarity: None,
        statistics: None,
        errors: vec![],
    };

    let outcome = match &entry.outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            manifest.errors.push(format!("{e:#}"));
            return Ok(manifest);
        }
    };
    manifest.exam_id = Some(outcome.normalized.exam.id.clone());

    let exam_path = dir.join(format!("exam-{stem}-{timestamp}.json"));
    outcome.normalized.save_json(&exam_path)?;
    manifest.exam = Some(exam_path);

    match &outcome.similarity {
        Ok(report) => {
            let path = dir.join(format!("similarity-{stem}-{timestamp}.json"));
            report.save_json(&path)?;
            manifest.similarity = Some(path);
        }
        Err(e) => manifest.errors.push(format!("similarity: {e}")),
    }

    match &outcome.statistics {
        Some(Ok(report)) => {
            let path = dir.join(format!("stats-{stem}-{timestamp}.json"));
            report.save_json(&path)?;
            manifest.statistics = Some(path);
        }
        Some(Err(e)) => manifest.errors.push(format!("statistics: {e}")),
        None => {}
    }

    Ok(manifest)
}

fn print_summary(entries: &[BatchEntry]) {
    let mut table = Table::new();
    table.set_header(vec![
        "Document",
        "Questions",
        "Unique",
        "Duplicates",
        "Near-duplicates",
        "Alpha",
        "Flagged",
    ]);

    for entry in entries {
        let Ok(outcome) = &entry.outcome else {
            table.add_row(vec![Cell::new(&entry.document), Cell::new("failed")]);
            continue;
        };
        let (unique, dups, near) = match &outcome.similarity {
            Ok(r) => (
                r.unique_question_count.to_string(),
                r.duplicate_pairs.len().to_string(),
                r.near_duplicate_pairs.len().to_string(),
            ),
            Err(_) => ("-".into(), "-".into(), "-".into()),
        };
        let (alpha, flagged) = match &outcome.statistics {
            Some(Ok(r)) => (
                format!("{:.4} ({})", r.cronbach_alpha, r.reliability_label),
                r.flagged_question_count.to_string(),
            ),
            Some(Err(_)) => ("error".into(), "-".into()),
            None => ("-".into(), "-".into()),
        };
        table.add_row(vec![
            Cell::new(&entry.document),
            Cell::new(outcome.normalized.exam.total_questions),
            Cell::new(unique),
            Cell::new(dups),
            Cell::new(near),
            Cell::new(alpha),
            Cell::new(flagged),
        ]);
    }

    println!("{table}");
}
