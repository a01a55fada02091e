//! Report contracts with JSON persistence.
//!
//! Field names, numeric ranges and label vocabularies here are the wire
//! contract consumed by dashboards and exports.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::labels::{DifficultyLabel, DiscriminationLabel, ReliabilityLabel, SimilarityType};
use crate::model::{Label, QuestionId};
use crate::normalizer::NormalizedExam;

/// A reported question pair. `question_id_1 < question_id_2` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPair {
    pub question_id_1: QuestionId,
    pub question_text_1: String,
    pub question_id_2: QuestionId,
    pub question_text_2: String,
    /// Cosine similarity in `[0, 1]`, rounded to 4 decimals.
    pub similarity_score: f64,
    pub similarity_type: SimilarityType,
}

/// Display details for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// 1-based, in order of each cluster's lowest question id.
    pub cluster_id: usize,
    pub question_ids: Vec<QuestionId>,
    /// `duplicate` if any edge inside the cluster is a duplicate.
    pub similarity_type: SimilarityType,
    /// Mean score of the reported pairs inside the cluster.
    pub average_similarity: f64,
}

/// Duplicate-detection results for one exam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub exam_id: String,
    pub total_questions: usize,
    /// Questions left after keeping one representative per cluster.
    pub unique_question_count: usize,
    pub duplicate_pairs: Vec<SimilarPair>,
    pub near_duplicate_pairs: Vec<SimilarPair>,
    /// Connected components of size >= 2 over all reported pairs.
    pub clusters: Vec<BTreeSet<QuestionId>>,
    #[serde(default)]
    pub cluster_summaries: Vec<ClusterSummary>,
}

/// How often one option was chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistractorStat {
    pub label: Label,
    pub text: String,
    pub chosen_count: usize,
    /// Fraction of all students who chose this option.
    pub chosen_share: f64,
    pub is_correct: bool,
    /// Correct, or chosen by at least the configured minimum share.
    pub is_effective: bool,
}

/// Item-level CTT metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionStat {
    pub question_id: QuestionId,
    pub question_text: String,
    /// Students with a non-blank response to this question.
    pub respondents: usize,
    /// `p` in `[0, 1]`.
    pub difficulty_index: f64,
    pub difficulty_label: DifficultyLabel,
    /// `D` in `[-1, 1]`.
    pub discrimination_index: f64,
    pub discrimination_label: DiscriminationLabel,
    #[serde(default)]
    pub distractors: Vec<DistractorStat>,
    pub is_flagged: bool,
    #[serde(default)]
    pub flag_reasons: Vec<String>,
}

/// Exam-level CTT results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub exam_id: String,
    pub total_students: usize,
    pub average_score: f64,
    pub score_std_dev: f64,
    pub cronbach_alpha: f64,
    pub reliability_label: ReliabilityLabel,
    /// Alpha was reported as 0 because the input carried no variance.
    #[serde(default)]
    pub degenerate_reliability: bool,
    pub total_questions: usize,
    pub flagged_question_count: usize,
    #[serde(default)]
    pub difficulty_distribution: BTreeMap<DifficultyLabel, usize>,
    pub question_stats: Vec<QuestionStat>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl StatsReport {
    /// Stats for one question.
    pub fn question(&self, id: QuestionId) -> Option<&QuestionStat> {
        self.question_stats.iter().find(|q| q.question_id == id)
    }
}

/// JSON file persistence for report types.
pub trait JsonReport: Serialize + DeserializeOwned {
    /// Save as pretty-printed JSON, creating parent directories.
    fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load from a JSON file.
    fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse report JSON: {}", path.display()))
    }
}

impl JsonReport for SimilarityReport {}
impl JsonReport for StatsReport {}
impl JsonReport for NormalizedExam {}
