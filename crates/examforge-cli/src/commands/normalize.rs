//! The `examforge normalize` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use examforge_core::normalizer::NormalizedExam;
use examforge_core::JsonReport;

use super::{load_config, print_json, report_saved, Format};
use crate::feeds::load_exam;

pub fn execute(
    input: PathBuf,
    title: Option<String>,
    output: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let format = Format::parse(&format)?;
    let config = load_config(config_path)?;
    let normalized = load_exam(&input, title, &config.normalizer)?;

    match format {
        Format::Json => print_json(&normalized)?,
        Format::Text => print_summary(&normalized),
    }

    if let Some(path) = output {
        normalized.save_json(&path)?;
        report_saved(&path);
    }

    Ok(())
}

fn print_summary(normalized: &NormalizedExam) {
    let exam = &normalized.exam;
    println!(
        "Exam: {} ({} questions, id {})",
        exam.title, exam.total_questions, exam.id
    );

    let mut table = Table::new();
    table.set_header(vec!["#", "Question", "Options", "Answer", "Flags"]);
    for q in &exam.questions {
        table.add_row(vec![
            Cell::new(q.id),
            Cell::new(truncate(&q.text, 60)),
            Cell::new(q.options.len()),
            Cell::new(q.correct_option.map(|l| l.to_string()).unwrap_or_default()),
            Cell::new(q.flag_reasons.join("; ")),
        ]);
    }
    println!("{table}");

    for w in &normalized.warnings {
        println!("WARNING: {w}");
    }
}

pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}
