//! Async orchestrator around the synchronous engines.
//!
//! Each engine call runs on a blocking worker under a deadline. A failed
//! report never takes the other report of the same document with it, and a
//! failed document never stops the rest of a batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use crate::model::{AnswerKey, Exam, ResponseMatrix};
use crate::normalizer::{self, DocumentMeta, NormalizedExam};
use crate::report::{SimilarityReport, StatsReport};
use crate::similarity::analyze_similarity;
use crate::statistics::analyze_statistics;
use crate::traits::ExtractionFeed;

/// Responses and key for one exam sitting.
#[derive(Debug, Clone, Default)]
pub struct StatsInput {
    pub responses: ResponseMatrix,
    pub key: AnswerKey,
}

/// Everything produced for one document.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub normalized: NormalizedExam,
    pub similarity: Result<SimilarityReport>,
    /// `None` when no responses were supplied.
    pub statistics: Option<Result<StatsReport>>,
}

/// One document in a batch.
#[derive(Debug, Clone)]
pub struct BatchJob {
    /// Identifier handed to the [`ExtractionFeed`].
    pub document: String,
    pub stats: Option<StatsInput>,
}

/// Result for one batch job, in submission order.
#[derive(Debug)]
pub struct BatchEntry {
    pub document: String,
    pub outcome: anyhow::Result<AnalysisOutcome>,
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_document_start(&self, document: &str);
    fn on_document_complete(&self, document: &str, outcome: &AnalysisOutcome);
    fn on_document_error(&self, document: &str, error: &str);
    fn on_batch_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_document_start(&self, _: &str) {}
    fn on_document_complete(&self, _: &str, _: &AnalysisOutcome) {}
    fn on_document_error(&self, _: &str, _: &str) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// Runs the Normalizer, SimilarityEngine and CTTStatisticsEngine.
#[derive(Debug, Clone)]
pub struct ExamAnalyzer {
    config: Arc<AnalysisConfig>,
    timeout: Duration,
    parallelism: usize,
}

impl ExamAnalyzer {
    /// Validates `config` up front so every later call can rely on it.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let timeout = Duration::from_secs(config.limits.timeout_secs);
        Ok(Self {
            config: Arc::new(config),
            timeout,
            parallelism: 4,
        })
    }

    /// Maximum number of documents analyzed at once by [`Self::analyze_batch`].
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Override the per-call deadline taken from `limits.timeout_secs`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub async fn normalize(
        &self,
        blocks: Vec<String>,
        meta: DocumentMeta,
    ) -> Result<NormalizedExam> {
        let config = Arc::clone(&self.config);
        run_blocking(self.timeout, move || {
            normalizer::normalize(&blocks, &meta, &config.normalizer)
        })
        .await
    }

    pub async fn similarity(&self, exam: Arc<Exam>) -> Result<SimilarityReport> {
        let config = Arc::clone(&self.config);
        run_blocking(self.timeout, move || analyze_similarity(&exam, &config)).await
    }

    pub async fn statistics(&self, exam: Arc<Exam>, input: Arc<StatsInput>) -> Result<StatsReport> {
        let config = Arc::clone(&self.config);
        run_blocking(self.timeout, move || {
            analyze_statistics(&exam, &input.responses, &input.key, &config)
        })
        .await
    }

    /// Normalize one document, then produce both reports concurrently.
    ///
    /// Only a normalization failure is returned as `Err`; report failures
    /// are carried on the outcome.
    pub async fn analyze(
        &self,
        blocks: Vec<String>,
        meta: DocumentMeta,
        stats: Option<StatsInput>,
    ) -> Result<AnalysisOutcome> {
        let normalized = self.normalize(blocks, meta).await?;
        let exam = Arc::new(normalized.exam.clone());

        let similarity = self.similarity(Arc::clone(&exam));
        let statistics = async {
            match stats {
                Some(input) => Some(self.statistics(Arc::clone(&exam), Arc::new(input)).await),
                None => None,
            }
        };
        let (similarity, statistics) = tokio::join!(similarity, statistics);

        if let Err(e) = &similarity {
            tracing::warn!("similarity report failed for exam {}: {e}", normalized.exam.id);
        }
        if let Some(Err(e)) = &statistics {
            tracing::warn!("statistics report failed for exam {}: {e}", normalized.exam.id);
        }

        Ok(AnalysisOutcome {
            normalized,
            similarity,
            statistics,
        })
    }

    /// Extract and analyze many documents with bounded concurrency.
    pub async fn analyze_batch(
        &self,
        feed: Arc<dyn ExtractionFeed>,
        jobs: Vec<BatchJob>,
        progress: &dyn ProgressReporter,
    ) -> Vec<BatchEntry> {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let total = jobs.len();

        let mut futures = FuturesUnordered::new();
        for (index, job) in jobs.into_iter().enumerate() {
            let feed = Arc::clone(&feed);
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let BatchJob { document, stats } = job;
                let name = document.clone();
                let inner = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                    progress.on_document_start(&document);

                    let extracted = feed.extract(&document).await?;
                    tracing::debug!(
                        "{} feed returned {} block(s) for {document}",
                        feed.name(),
                        extracted.blocks.len()
                    );
                    let outcome = self
                        .analyze(extracted.blocks, extracted.meta, stats)
                        .await?;
                    anyhow::Ok(outcome)
                };
                (index, name, inner.await)
            });
        }

        let mut entries = Vec::with_capacity(total);
        let mut completed = 0usize;
        let mut failed = 0usize;

        while let Some((index, document, outcome)) = futures.next().await {
            match &outcome {
                Ok(outcome) => {
                    progress.on_document_complete(&document, outcome);
                    completed += 1;
                }
                Err(e) => {
                    tracing::error!("analysis failed for {document}: {e:#}");
                    progress.on_document_error(&document, &format!("{e:#}"));
                    failed += 1;
                }
            }
            entries.push((index, BatchEntry { document, outcome }));
        }

        progress.on_batch_complete(total, completed, failed, start.elapsed());

        entries.sort_by_key(|(index, _)| *index);
        entries.into_iter().map(|(_, entry)| entry).collect()
    }
}

/// Run a synchronous engine call on the blocking pool under a deadline.
///
/// On timeout the worker is abandoned; engine calls own all their state, so
/// nothing needs to be rolled back.
async fn run_blocking<T, F>(timeout: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(f);
    match tokio::time::timeout(timeout, handle).await {
        Err(_) => Err(AnalysisError::Timeout {
            millis: timeout.as_millis() as u64,
        }),
        Ok(Err(join_error)) => Err(AnalysisError::Task(join_error.to_string())),
        Ok(Ok(result)) => result,
    }
}
