//! Classification labels transmitted on the reports.
//!
//! The engine is the only place these bands are evaluated; consumers render
//! the labels as sent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{DifficultyBands, DiscriminationBands, ReliabilityBands};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DifficultyLabel {
    Easy,
    Moderate,
    Hard,
}

impl DifficultyLabel {
    pub fn classify(p: f64, bands: &DifficultyBands) -> Self {
        if p >= bands.easy {
            DifficultyLabel::Easy
        } else if p >= bands.moderate {
            DifficultyLabel::Moderate
        } else {
            DifficultyLabel::Hard
        }
    }

    pub const ALL: [DifficultyLabel; 3] = [
        DifficultyLabel::Easy,
        DifficultyLabel::Moderate,
        DifficultyLabel::Hard,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscriminationLabel {
    Excellent,
    Good,
    Fair,
    Poor,
    Remove,
}

impl DiscriminationLabel {
    pub fn classify(d: f64, bands: &DiscriminationBands) -> Self {
        if d >= bands.excellent {
            DiscriminationLabel::Excellent
        } else if d >= bands.good {
            DiscriminationLabel::Good
        } else if d >= bands.fair {
            DiscriminationLabel::Fair
        } else if d >= bands.poor {
            DiscriminationLabel::Poor
        } else {
            DiscriminationLabel::Remove
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReliabilityLabel {
    Excellent,
    Good,
    Acceptable,
    Unacceptable,
}

impl ReliabilityLabel {
    pub fn classify(alpha: f64, bands: &ReliabilityBands) -> Self {
        if alpha >= bands.excellent {
            ReliabilityLabel::Excellent
        } else if alpha >= bands.good {
            ReliabilityLabel::Good
        } else if alpha >= bands.acceptable {
            ReliabilityLabel::Acceptable
        } else {
            ReliabilityLabel::Unacceptable
        }
    }
}

/// How a reported question pair was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityType {
    Duplicate,
    NearDuplicate,
}

impl fmt::Display for DifficultyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for DiscriminationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for ReliabilityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for SimilarityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityType::Duplicate => write!(f, "duplicate"),
            SimilarityType::NearDuplicate => write!(f, "near_duplicate"),
        }
    }
}
