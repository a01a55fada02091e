//! Duplicate and near-duplicate question detection.
//!
//! Question stems are embedded as TF-IDF vectors over the exam's own
//! vocabulary and compared pairwise by cosine similarity. Reported pairs
//! form an undirected graph whose connected components are the clusters.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::config::{AnalysisConfig, SimilarityConfig};
use crate::error::{AnalysisError, Result};
use crate::labels::SimilarityType;
use crate::model::{Exam, QuestionId};
use crate::report::{ClusterSummary, SimilarPair, SimilarityReport};
use crate::text;

/// Sparse vector: `(term index, weight)` sorted by index.
pub type SparseVector = Vec<(usize, f64)>;

/// Build one L2-normalized TF-IDF vector per text.
///
/// `idf(t) = ln((1 + N) / (1 + df(t))) + 1`, so a term present in every
/// text still carries weight.
pub fn tfidf_vectors(texts: &[&str], config: &SimilarityConfig) -> Vec<SparseVector> {
    let n = texts.len();
    let doc_terms: Vec<Vec<String>> = texts
        .iter()
        .map(|t| text::terms(t, config.ngram_max))
        .collect();

    let mut document_frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for terms in &doc_terms {
        let unique: BTreeSet<&str> = terms.iter().map(String::as_str).collect();
        for term in unique {
            *document_frequency.entry(term).or_default() += 1;
        }
    }

    let vocabulary: HashMap<&str, usize> = document_frequency
        .keys()
        .enumerate()
        .map(|(i, t)| (*t, i))
        .collect();
    let idf: Vec<f64> = document_frequency
        .values()
        .map(|&df| ((1.0 + n as f64) / (1.0 + df as f64)).ln() + 1.0)
        .collect();

    doc_terms
        .iter()
        .map(|terms| {
            let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
            for term in terms {
                *counts.entry(vocabulary[term.as_str()]).or_default() += 1;
            }
            let mut vector: SparseVector = counts
                .into_iter()
                .map(|(idx, tf)| {
                    let tf = if config.sublinear_tf {
                        1.0 + (tf as f64).ln()
                    } else {
                        tf as f64
                    };
                    (idx, tf * idf[idx])
                })
                .collect();
            let norm = vector.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            if norm > 0.0 {
                for (_, w) in &mut vector {
                    *w /= norm;
                }
            }
            vector
        })
        .collect()
}

/// Cosine similarity of two sparse vectors; 0 if either is the zero vector.
pub fn cosine(a: &SparseVector, b: &SparseVector) -> f64 {
    let norm_a = a.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let (mut i, mut j, mut dot) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

pub(crate) fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

/// Classify a score against the configured cut points.
pub fn classify(score: f64, config: &SimilarityConfig) -> Option<SimilarityType> {
    if score >= config.duplicate_threshold {
        Some(SimilarityType::Duplicate)
    } else if score >= config.near_duplicate_threshold {
        Some(SimilarityType::NearDuplicate)
    } else {
        None
    }
}

/// Run duplicate detection over an exam.
///
/// Rejects exams above `limits.max_similarity_questions` before doing any
/// pairwise work.
pub fn analyze_similarity(exam: &Exam, config: &AnalysisConfig) -> Result<SimilarityReport> {
    config.validate()?;
    let n = exam.questions.len();
    if n > config.limits.max_similarity_questions {
        return Err(AnalysisError::SizeLimitExceeded {
            what: "question count",
            actual: n,
            limit: config.limits.max_similarity_questions,
        });
    }
    exam.validate()?;

    let texts: Vec<&str> = exam.questions.iter().map(|q| q.text.trim()).collect();
    let vectors = tfidf_vectors(&texts, &config.similarity);

    let mut duplicate_pairs = Vec::new();
    let mut near_duplicate_pairs = Vec::new();

    for i in 0..n {
        for j in (i + 1)..n {
            let score = round4(cosine(&vectors[i], &vectors[j]));
            let Some(kind) = classify(score, &config.similarity) else {
                continue;
            };

            let (a, b) = if exam.questions[i].id < exam.questions[j].id {
                (&exam.questions[i], &exam.questions[j])
            } else {
                (&exam.questions[j], &exam.questions[i])
            };
            let pair = SimilarPair {
                question_id_1: a.id,
                question_text_1: a.text.clone(),
                question_id_2: b.id,
                question_text_2: b.text.clone(),
                similarity_score: score,
                similarity_type: kind,
            };
            match kind {
                SimilarityType::Duplicate => duplicate_pairs.push(pair),
                SimilarityType::NearDuplicate => near_duplicate_pairs.push(pair),
            }
        }
    }

    let ids: Vec<QuestionId> = exam.questions.iter().map(|q| q.id).collect();
    let (clusters, cluster_summaries) = build_clusters(
        &ids,
        duplicate_pairs.iter().chain(near_duplicate_pairs.iter()),
    );

    let absorbed: usize = clusters.iter().map(|c| c.len() - 1).sum();
    let report = SimilarityReport {
        exam_id: exam.id.clone(),
        total_questions: exam.total_questions,
        unique_question_count: exam.total_questions - absorbed,
        duplicate_pairs,
        near_duplicate_pairs,
        clusters,
        cluster_summaries,
    };

    tracing::info!(
        "similarity: {} duplicate pair(s), {} near-duplicate pair(s), {} cluster(s), {}/{} unique",
        report.duplicate_pairs.len(),
        report.near_duplicate_pairs.len(),
        report.clusters.len(),
        report.unique_question_count,
        report.total_questions
    );

    Ok(report)
}

/// Union-find over question ids; components of size >= 2 become clusters,
/// ordered by their lowest id.
fn build_clusters<'a>(
    ids: &[QuestionId],
    pairs: impl Iterator<Item = &'a SimilarPair>,
) -> (Vec<BTreeSet<QuestionId>>, Vec<ClusterSummary>) {
    let mut parent: HashMap<QuestionId, QuestionId> = ids.iter().map(|&id| (id, id)).collect();

    fn find(parent: &mut HashMap<QuestionId, QuestionId>, x: QuestionId) -> QuestionId {
        let mut root = x;
        while parent[&root] != root {
            root = parent[&root];
        }
        let mut node = x;
        while node != root {
            let next = parent[&node];
            parent.insert(node, root);
            node = next;
        }
        root
    }

    let pairs: Vec<&SimilarPair> = pairs.collect();
    for pair in &pairs {
        let a = find(&mut parent, pair.question_id_1);
        let b = find(&mut parent, pair.question_id_2);
        if a != b {
            // Keep the smaller id as root so components are easy to order.
            let (root, child) = if a < b { (a, b) } else { (b, a) };
            parent.insert(child, root);
        }
    }

    let mut components: BTreeMap<QuestionId, BTreeSet<QuestionId>> = BTreeMap::new();
    for &id in ids {
        let root = find(&mut parent, id);
        components.entry(root).or_default().insert(id);
    }

    let clusters: Vec<BTreeSet<QuestionId>> = components
        .into_values()
        .filter(|members| members.len() >= 2)
        .collect();

    let summaries = clusters
        .iter()
        .enumerate()
        .map(|(i, members)| {
            let inside: Vec<&&SimilarPair> = pairs
                .iter()
                .filter(|p| members.contains(&p.question_id_1))
                .collect();
            let similarity_type = if inside
                .iter()
                .any(|p| p.similarity_type == SimilarityType::Duplicate)
            {
                SimilarityType::Duplicate
            } else {
                SimilarityType::NearDuplicate
            };
            let average_similarity = if inside.is_empty() {
                0.0
            } else {
                round4(
                    inside.iter().map(|p| p.similarity_score).sum::<f64>() / inside.len() as f64,
                )
            };
            ClusterSummary {
                cluster_id: i + 1,
                question_ids: members.iter().copied().collect(),
                similarity_type,
                average_similarity,
            }
        })
        .collect();

    (clusters, summaries)
}
