//! Analysis configuration.
//!
//! Every threshold and band cut point the engines use lives here, so they
//! can be tuned from `examforge.toml` and tested apart from the algorithms.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Top-level examforge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub normalizer: NormalizerConfig,
    pub similarity: SimilarityConfig,
    pub statistics: StatisticsConfig,
    pub limits: Limits,
}

/// Normalizer behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Use `Answer: X` lines inside a block as the question's correct option.
    pub inline_answers: bool,
    /// Drop page numbers, dividers and similar noise lines before parsing.
    pub strip_noise: bool,
    /// Highest letter accepted as an option label.
    pub max_option_label: char,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            inline_answers: false,
            strip_noise: true,
            max_option_label: 'H',
        }
    }
}

/// Similarity engine thresholds and vectorizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Pairs scoring at or above this are duplicates.
    pub duplicate_threshold: f64,
    /// Pairs scoring at or above this (and below the duplicate threshold)
    /// are near-duplicates.
    pub near_duplicate_threshold: f64,
    /// Largest n-gram length used as a term (1 = unigrams, 2 = + bigrams).
    pub ngram_max: usize,
    /// Use `1 + ln(tf)` instead of the raw term count.
    pub sublinear_tf: bool,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: 0.95,
            near_duplicate_threshold: 0.60,
            ngram_max: 2,
            sublinear_tf: true,
        }
    }
}

/// Difficulty index bands. `p >= easy` is Easy, `p >= moderate` Moderate,
/// anything lower Hard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyBands {
    pub easy: f64,
    pub moderate: f64,
}

impl Default for DifficultyBands {
    fn default() -> Self {
        Self {
            easy: 0.80,
            moderate: 0.40,
        }
    }
}

/// Lower bounds of each discrimination band; below `poor` is Remove.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscriminationBands {
    pub excellent: f64,
    pub good: f64,
    pub fair: f64,
    pub poor: f64,
}

impl Default for DiscriminationBands {
    fn default() -> Self {
        Self {
            excellent: 0.40,
            good: 0.30,
            fair: 0.20,
            poor: 0.0,
        }
    }
}

/// Lower bounds of each reliability band; below `acceptable` is
/// Unacceptable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityBands {
    pub excellent: f64,
    pub good: f64,
    pub acceptable: f64,
}

impl Default for ReliabilityBands {
    fn default() -> Self {
        Self {
            excellent: 0.90,
            good: 0.70,
            acceptable: 0.50,
        }
    }
}

/// When a question gets flagged by the statistics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagRules {
    /// Flag when `D` is below this.
    pub min_discrimination: f64,
    /// Flag when `p` is above this.
    pub max_difficulty: f64,
    /// Flag when `p` is below this.
    pub min_difficulty: f64,
}

impl Default for FlagRules {
    fn default() -> Self {
        Self {
            min_discrimination: 0.20,
            max_difficulty: 0.95,
            min_difficulty: 0.05,
        }
    }
}

/// CTT statistics engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub difficulty: DifficultyBands,
    pub discrimination: DiscriminationBands,
    pub reliability: ReliabilityBands,
    pub flags: FlagRules,
    /// Share of students in each of the upper and lower groups.
    pub group_fraction: f64,
    /// Below this many students the groups fall back to a median split.
    pub min_students_for_group_split: usize,
    /// A distractor chosen by less than this share of students is
    /// ineffective.
    pub distractor_min_share: f64,
    /// Treat any missing answer-key entry as fatal.
    pub strict_answer_key: bool,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            difficulty: DifficultyBands::default(),
            discrimination: DiscriminationBands::default(),
            reliability: ReliabilityBands::default(),
            flags: FlagRules::default(),
            group_fraction: 0.27,
            min_students_for_group_split: 10,
            distractor_min_share: 0.05,
            strict_answer_key: false,
        }
    }
}

/// Input ceilings, enforced before any computation starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_similarity_questions: usize,
    pub max_stats_questions: usize,
    pub max_students: usize,
    /// Deadline for a single engine call made through the orchestrator.
    pub timeout_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_similarity_questions: 5000,
            max_stats_questions: 2000,
            max_students: 100_000,
            timeout_secs: 30,
        }
    }
}

impl AnalysisConfig {
    /// Check that thresholds are in range and bands are ordered.
    pub fn validate(&self) -> std::result::Result<(), AnalysisError> {
        let invalid = |msg: String| -> std::result::Result<(), AnalysisError> {
            Err(AnalysisError::InvalidConfig(msg))
        };
        let unit = |v: f64| (0.0..=1.0).contains(&v);

        let sim = &self.similarity;
        if !unit(sim.duplicate_threshold) || !unit(sim.near_duplicate_threshold) {
            return invalid("similarity thresholds must be within [0, 1]".into());
        }
        if sim.duplicate_threshold <= sim.near_duplicate_threshold {
            return invalid(format!(
                "duplicate_threshold ({}) must be greater than near_duplicate_threshold ({})",
                sim.duplicate_threshold, sim.near_duplicate_threshold
            ));
        }
        if !(1..=2).contains(&sim.ngram_max) {
            return invalid(format!("ngram_max must be 1 or 2, got {}", sim.ngram_max));
        }

        let stats = &self.statistics;
        let d = &stats.difficulty;
        if !(unit(d.easy) && unit(d.moderate) && d.easy > d.moderate) {
            return invalid("difficulty bands must satisfy 0 <= moderate < easy <= 1".into());
        }
        let disc = &stats.discrimination;
        if !(disc.excellent > disc.good && disc.good > disc.fair && disc.fair > disc.poor)
            || disc.poor < -1.0
            || disc.excellent > 1.0
        {
            return invalid(
                "discrimination bands must satisfy -1 <= poor < fair < good < excellent <= 1"
                    .into(),
            );
        }
        let rel = &stats.reliability;
        if !(rel.excellent > rel.good && rel.good > rel.acceptable) || rel.excellent > 1.0 {
            return invalid(
                "reliability bands must satisfy acceptable < good < excellent <= 1".into(),
            );
        }
        if !(stats.group_fraction > 0.0 && stats.group_fraction <= 0.5) {
            return invalid(format!(
                "group_fraction must be within (0, 0.5], got {}",
                stats.group_fraction
            ));
        }
        if !unit(stats.distractor_min_share) {
            return invalid("distractor_min_share must be within [0, 1]".into());
        }
        if !self.normalizer.max_option_label.is_ascii_uppercase() {
            return invalid("max_option_label must be an uppercase letter".into());
        }
        if self.limits.timeout_secs == 0 {
            return invalid("timeout_secs must be at least 1".into());
        }

        Ok(())
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `examforge.toml` in the current directory
/// 2. `~/.config/examforge/config.toml`
pub fn load_config() -> Result<AnalysisConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AnalysisConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("examforge.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str::<AnalysisConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!("loaded configuration from {}", path.display());
            config
        }
        None => AnalysisConfig::default(),
    };

    config.validate()?;
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("examforge"))
}
