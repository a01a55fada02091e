//! examforge-core: exam analysis engine.
//!
//! Turns extracted question text into canonical exam records, measures
//! item quality with Classical Test Theory, and detects duplicate or
//! near-duplicate questions. Every engine call is a pure function of its
//! inputs.

pub mod config;
pub mod engine;
pub mod error;
pub mod labels;
pub mod model;
pub mod normalizer;
pub mod report;
pub mod similarity;
pub mod statistics;
pub mod text;
pub mod traits;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
pub use model::{AnswerKey, AnswerOption, Exam, Label, Question, QuestionId, ResponseMatrix};
pub use report::{JsonReport, SimilarityReport, StatsReport};
