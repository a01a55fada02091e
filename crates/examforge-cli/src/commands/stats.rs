//! The `examforge stats` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use examforge_core::statistics::analyze_statistics;
use examforge_core::{AnswerKey, JsonReport, StatsReport};

use super::normalize::truncate;
use super::{load_config, print_json, report_saved, Format};
use crate::feeds::{load_exam, load_key, load_responses};

pub fn execute(
    input: PathBuf,
    responses_path: PathBuf,
    key_spec: Option<String>,
    output: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let format = Format::parse(&format)?;
    let config = load_config(config_path)?;
    let normalized = load_exam(&input, None, &config.normalizer)?;
    let responses = load_responses(&responses_path)?;

    // Without --key, fall back to answers printed in the paper itself.
    let key = match key_spec {
        Some(spec) => load_key(&spec)?,
        None => AnswerKey::from_exam(&normalized.exam),
    };

    let report = analyze_statistics(&normalized.exam, &responses, &key, &config)
        .with_context(|| format!("statistics failed for {}", input.display()))?;

    match format {
        Format::Json => print_json(&report)?,
        Format::Text => print_summary(&report),
    }

    if let Some(path) = output {
        report.save_json(&path)?;
        report_saved(&path);
    }

    Ok(())
}

pub(crate) fn print_summary(report: &StatsReport) {
    println!(
        "Students: {}  Average score: {:.2}  Std dev: {:.2}",
        report.total_students, report.average_score, report.score_std_dev
    );
    println!(
        "Cronbach's alpha: {:.4} ({})",
        report.cronbach_alpha, report.reliability_label
    );

    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "p", "Difficulty", "D", "Discrimination", "Flags"]);
    for q in &report.question_stats {
        table.add_row(vec![
            Cell::new(q.question_id),
            Cell::new(truncate(&q.question_text, 40)),
            Cell::new(format!("{:.2}", q.difficulty_index)),
            Cell::new(q.difficulty_label),
            Cell::new(format!("{:.2}", q.discrimination_index)),
            Cell::new(q.discrimination_label),
            Cell::new(q.flag_reasons.join("; ")),
        ]);
    }
    println!("{table}");

    println!(
        "Flagged: {}/{} question(s)",
        report.flagged_question_count, report.total_questions
    );
    for w in &report.warnings {
        println!("WARNING: {w}");
    }
}
