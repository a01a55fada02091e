//! The `examforge similarity` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use examforge_core::similarity::analyze_similarity;
use examforge_core::{JsonReport, SimilarityReport};

use super::normalize::truncate;
use super::{load_config, print_json, report_saved, Format};
use crate::feeds::load_exam;

pub fn execute(
    input: PathBuf,
    output: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let format = Format::parse(&format)?;
    let config = load_config(config_path)?;
    let normalized = load_exam(&input, None, &config.normalizer)?;

    let report = analyze_similarity(&normalized.exam, &config)
        .with_context(|| format!("similarity analysis failed for {}", input.display()))?;

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

pub(crate) fn print_summary(report: &SimilarityReport) {
    println!(
        "Questions: {} total, {} unique, {} duplicate pair(s), {} near-duplicate pair(s)",
        report.total_questions,
        report.unique_question_count,
        report.duplicate_pairs.len(),
        report.near_duplicate_pairs.len()
    );

    let pairs: Vec<_> = report
        .duplicate_pairs
        .iter()
        .chain(&report.near_duplicate_pairs)
        .collect();
    if pairs.is_empty() {
        println!("No similar questions found.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Q1", "Q2", "Score", "Type", "Question"]);
    for pair in pairs {
        table.add_row(vec![
            Cell::new(pair.question_id_1),
            Cell::new(pair.question_id_2),
            Cell::new(format!("{:.4}", pair.similarity_score)),
            Cell::new(pair.similarity_type),
            Cell::new(truncate(&pair.question_text_1, 50)),
        ]);
    }
    println!("{table}");

    for cluster in &report.cluster_summaries {
        let ids: Vec<String> = cluster.question_ids.iter().map(|id| id.to_string()).collect();
        println!(
            "Cluster {}: questions {} ({}, avg {:.4})",
            cluster.cluster_id,
            ids.join(", "),
            cluster.similarity_type,
            cluster.average_similarity
        );
    }
}
