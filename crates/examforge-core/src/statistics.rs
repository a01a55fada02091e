//! Classical Test Theory item and test statistics.
//!
//! Every response is folded into a binary correct/incorrect matrix against
//! the answer key. A blank or unrecognised response counts as incorrect and
//! stays in the denominator of every test-level figure.

use std::collections::BTreeMap;

use crate::config::{AnalysisConfig, StatisticsConfig};
use crate::error::{AnalysisError, Result};
use crate::labels::{DifficultyLabel, DiscriminationLabel, ReliabilityLabel};
use crate::model::{AnswerKey, Exam, Label, Question, QuestionId, ResponseMatrix};
use crate::report::{DistractorStat, QuestionStat, StatsReport};
use crate::similarity::round4;

/// Arithmetic mean; 0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator); 0 for fewer than two values.
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Number of students in each of the upper and lower groups.
///
/// Uses `ceil(group_fraction * n)` once there are enough students for a
/// meaningful split, otherwise a median split. Never lets the groups
/// overlap.
pub fn group_size(student_count: usize, config: &StatisticsConfig) -> usize {
    let half = student_count / 2;
    if student_count >= config.min_students_for_group_split {
        ((config.group_fraction * student_count as f64).ceil() as usize).min(half)
    } else {
        half
    }
}

/// Cronbach's alpha over a students × items binary matrix.
///
/// Returns `None` when alpha is undefined for the input: fewer than two
/// students or items, or zero total-score variance.
pub fn cronbach_alpha(items: &[Vec<f64>], totals: &[f64]) -> Option<f64> {
    let k = items.len();
    if k < 2 || totals.len() < 2 {
        return None;
    }
    let total_variance = sample_variance(totals);
    if total_variance <= f64::EPSILON {
        return None;
    }
    let item_variance: f64 = items.iter().map(|item| sample_variance(item)).sum();
    let alpha = (k as f64 / (k - 1) as f64) * (1.0 - item_variance / total_variance);
    Some(alpha.clamp(-1.0, 1.0))
}

/// Compute the statistics report for one exam sitting.
///
/// Fails with [`AnalysisError::DimensionMismatch`] if a response refers to
/// a question the exam does not have, and with
/// [`AnalysisError::MissingAnswerKey`] when the key cannot score the
/// responses at all (or has any gap under `strict_answer_key`). Missing key
/// entries are otherwise flagged on the question and reported as warnings.
pub fn analyze_statistics(
    exam: &Exam,
    responses: &ResponseMatrix,
    key: &AnswerKey,
    config: &AnalysisConfig,
) -> Result<StatsReport> {
    config.validate()?;
    check_limits(exam, responses, config)?;
    exam.validate()?;

    let referenced = responses.referenced_questions();
    if let Some(&question_id) = referenced.iter().find(|id| exam.question(**id).is_none()) {
        return Err(AnalysisError::DimensionMismatch { question_id });
    }

    let unkeyed_referenced: Vec<QuestionId> = referenced
        .iter()
        .copied()
        .filter(|id| key.get(*id).is_none())
        .collect();
    let fatal_gap = !unkeyed_referenced.is_empty()
        && (config.statistics.strict_answer_key || unkeyed_referenced.len() == referenced.len());
    if fatal_gap {
        return Err(AnalysisError::MissingAnswerKey {
            question_ids: unkeyed_referenced,
        });
    }

    let stats_config = &config.statistics;
    let mut warnings = key_warnings(exam, key);

    let students: Vec<&str> = responses.students().collect();
    let n = students.len();

    // Binary outcome per keyed question, indexed like `students`.
    let mut outcomes: BTreeMap<QuestionId, Vec<f64>> = BTreeMap::new();
    for q in &exam.questions {
        if let Some(correct) = key.get(q.id) {
            let column = students
                .iter()
                .map(|s| is_correct(responses.response(s, q.id), correct))
                .collect();
            outcomes.insert(q.id, column);
        }
    }

    let totals: Vec<f64> = (0..n)
        .map(|i| outcomes.values().map(|column| column[i]).sum())
        .collect();

    // Highest score first; ties broken by student id.
    let mut ranking: Vec<usize> = (0..n).collect();
    ranking.sort_by(|&a, &b| {
        totals[b]
            .total_cmp(&totals[a])
            .then_with(|| students[a].cmp(students[b]))
    });
    let g = group_size(n, stats_config);
    let upper = &ranking[..g];
    let lower = &ranking[n - g..];
    tracing::debug!("discrimination groups: {g} upper / {g} lower of {n} students");

    let question_stats: Vec<QuestionStat> = exam
        .questions
        .iter()
        .map(|q| {
            let stat = question_stat(
                q,
                &students,
                responses,
                key.get(q.id),
                outcomes.get(&q.id).map(Vec::as_slice),
                (upper, lower),
                stats_config,
            );
            tracing::debug!(
                "question {}: p={:.4} D={:.4} flags={:?}",
                stat.question_id,
                stat.difficulty_index,
                stat.discrimination_index,
                stat.flag_reasons
            );
            stat
        })
        .collect();

    let items: Vec<Vec<f64>> = outcomes.into_values().collect();
    let (alpha, degenerate_reliability) = match cronbach_alpha(&items, &totals) {
        Some(alpha) => (round4(alpha), false),
        None => {
            warnings.push(degenerate_warning(n, items.len()));
            (0.0, true)
        }
    };

    let mut difficulty_distribution: BTreeMap<DifficultyLabel, usize> =
        DifficultyLabel::ALL.iter().map(|l| (*l, 0)).collect();
    for stat in &question_stats {
        *difficulty_distribution
            .entry(stat.difficulty_label)
            .or_default() += 1;
    }

    for w in &warnings {
        tracing::warn!("{w}");
    }

    let report = StatsReport {
        exam_id: exam.id.clone(),
        total_students: n,
        average_score: round4(mean(&totals)),
        score_std_dev: round4(sample_variance(&totals).sqrt()),
        cronbach_alpha: alpha,
        reliability_label: ReliabilityLabel::classify(alpha, &stats_config.reliability),
        degenerate_reliability,
        total_questions: exam.total_questions,
        flagged_question_count: question_stats.iter().filter(|q| q.is_flagged).count(),
        difficulty_distribution,
        question_stats,
        warnings,
    };

    tracing::info!(
        "statistics: {} student(s), {} question(s), alpha={:.4} ({}), {} flagged",
        report.total_students,
        report.total_questions,
        report.cronbach_alpha,
        report.reliability_label,
        report.flagged_question_count
    );

    Ok(report)
}

fn check_limits(exam: &Exam, responses: &ResponseMatrix, config: &AnalysisConfig) -> Result<()> {
    let limits = &config.limits;
    if responses.student_count() > limits.max_students {
        return Err(AnalysisError::SizeLimitExceeded {
            what: "student count",
            actual: responses.student_count(),
            limit: limits.max_students,
        });
    }
    if exam.questions.len() > limits.max_stats_questions {
        return Err(AnalysisError::SizeLimitExceeded {
            what: "question count",
            actual: exam.questions.len(),
            limit: limits.max_stats_questions,
        });
    }
    Ok(())
}

fn is_correct(response: Option<&str>, correct: Label) -> f64 {
    match response.and_then(|r| r.parse::<Label>().ok()) {
        Some(label) if label == correct => 1.0,
        _ => 0.0,
    }
}

fn key_warnings(exam: &Exam, key: &AnswerKey) -> Vec<String> {
    let mut warnings = Vec::new();

    let unkeyed: Vec<String> = exam
        .questions
        .iter()
        .filter(|q| key.get(q.id).is_none())
        .map(|q| q.id.to_string())
        .collect();
    if !unkeyed.is_empty() {
        warnings.push(format!(
            "No answer key entry for question(s) {}",
            unkeyed.join(", ")
        ));
    }

    for (id, label) in key.iter() {
        match exam.question(id) {
            None => warnings.push(format!(
                "Answer key entry for question {id} does not match any exam question"
            )),
            Some(q) if !q.options.is_empty() && q.option(label).is_none() => {
                warnings.push(format!(
                    "Answer key for question {id} names {label}, which is not an option"
                ))
            }
            Some(_) => {}
        }
    }

    warnings
}

fn degenerate_warning(students: usize, keyed_items: usize) -> String {
    if students < 2 || keyed_items < 2 {
        format!(
            "Cronbach's alpha needs at least 2 students and 2 keyed questions \
             ({students} student(s), {keyed_items} keyed question(s)); reported as 0"
        )
    } else {
        "Total scores have zero variance; Cronbach's alpha reported as 0".to_string()
    }
}

fn fraction_correct(group: &[usize], column: &[f64]) -> f64 {
    if group.is_empty() {
        return 0.0;
    }
    group.iter().map(|&i| column[i]).sum::<f64>() / group.len() as f64
}

fn question_stat(
    q: &Question,
    students: &[&str],
    responses: &ResponseMatrix,
    correct: Option<Label>,
    column: Option<&[f64]>,
    (upper, lower): (&[usize], &[usize]),
    config: &StatisticsConfig,
) -> QuestionStat {
    let respondents = students
        .iter()
        .filter(|s| responses.response(s, q.id).is_some())
        .count();

    let distractors: Vec<DistractorStat> = q
        .options
        .iter()
        .map(|opt| {
            let chosen_count = students
                .iter()
                .filter(|s| {
                    responses
                        .response(s, q.id)
                        .and_then(|r| r.parse::<Label>().ok())
                        == Some(opt.label)
                })
                .count();
            let chosen_share = if students.is_empty() {
                0.0
            } else {
                round4(chosen_count as f64 / students.len() as f64)
            };
            let is_correct = correct == Some(opt.label);
            DistractorStat {
                label: opt.label,
                text: opt.text.clone(),
                chosen_count,
                chosen_share,
                is_correct,
                is_effective: is_correct || chosen_share >= config.distractor_min_share,
            }
        })
        .collect();

    let mut flags = Vec::new();
    let (difficulty_index, discrimination_index) = match column {
        None => {
            flags.push("No answer key entry".to_string());
            if respondents == 0 {
                flags.push("No responses recorded".to_string());
            }
            (0.0, 0.0)
        }
        Some(_) if respondents == 0 => {
            flags.push("No responses recorded".to_string());
            (0.0, 0.0)
        }
        Some(column) => {
            let correct_count: f64 = column.iter().sum();
            let p = round4(correct_count / respondents as f64);
            let d = round4(fraction_correct(upper, column) - fraction_correct(lower, column));

            if d < 0.0 {
                flags.push(format!("Negative discrimination (D={d:.2})"));
            } else if d < config.flags.min_discrimination {
                flags.push(format!("Low discrimination (D={d:.2})"));
            }
            if p > config.flags.max_difficulty {
                flags.push(format!("Very easy (p={p:.2})"));
            }
            if p < config.flags.min_difficulty {
                flags.push(format!("Very difficult (p={p:.2})"));
            }
            let ineffective = distractors.iter().filter(|d| !d.is_effective).count();
            if ineffective >= 2 {
                flags.push(format!("{ineffective} ineffective distractors"));
            }
            (p, d)
        }
    };

    QuestionStat {
        question_id: q.id,
        question_text: q.text.clone(),
        respondents,
        difficulty_index,
        difficulty_label: DifficultyLabel::classify(difficulty_index, &config.difficulty),
        discrimination_index,
        discrimination_label: DiscriminationLabel::classify(
            discrimination_index,
            &config.discrimination,
        ),
        distractors,
        is_flagged: !flags.is_empty(),
        flag_reasons: flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnswerOption;

    fn label(c: char) -> Label {
        Label::new(c).unwrap()
    }

    fn exam(count: u32) -> Exam {
        let questions = (1..=count)
            .map(|id| {
                let mut q = Question::new(id, format!("Question {id}"));
                q.options = ['A', 'B', 'C', 'D']
                    .into_iter()
                    .map(|c| AnswerOption {
                        label: label(c),
                        text: format!("option {c}"),
                    })
                    .collect();
                q
            })
            .collect();
        Exam::new("exam-1", "Test", None, questions)
    }

    fn key_all_a(count: u32) -> AnswerKey {
        (1..=count).map(|id| (id, label('A'))).collect()
    }

    /// One answer string per student, a character per question in order.
    fn matrix(rows: &[(&str, &str)]) -> ResponseMatrix {
        let mut m = ResponseMatrix::new();
        for (student, answers) in rows {
            for (i, c) in answers.chars().enumerate() {
                m.insert(*student, i as QuestionId + 1, &c.to_string());
            }
        }
        m
    }

    fn staircase() -> ResponseMatrix {
        matrix(&[("s1", "AAA"), ("s2", "AAB"), ("s3", "ABB"), ("s4", "BBB")])
    }

    #[test]
    fn variance_helpers() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(sample_variance(&[4.0]), 0.0);
        assert!((sample_variance(&[3.0, 2.0, 1.0, 0.0]) - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn group_sizes() {
        let config = StatisticsConfig::default();
        assert_eq!(group_size(0, &config), 0);
        assert_eq!(group_size(1, &config), 0);
        assert_eq!(group_size(5, &config), 2);
        assert_eq!(group_size(9, &config), 4);
        assert_eq!(group_size(10, &config), 3);
        assert_eq!(group_size(100, &config), 27);

        let wide = StatisticsConfig {
            group_fraction: 0.5,
            ..Default::default()
        };
        assert_eq!(group_size(11, &wide), 5);
    }

    #[test]
    fn staircase_indices_and_alpha() {
        let report = analyze_statistics(
            &exam(3),
            &staircase(),
            &key_all_a(3),
            &AnalysisConfig::default(),
        )
        .unwrap();

        assert_eq!(report.total_students, 4);
        assert_eq!(report.average_score, 1.5);
        assert_eq!(report.score_std_dev, 1.291);
        assert_eq!(report.cronbach_alpha, 0.75);
        assert_eq!(report.reliability_label, ReliabilityLabel::Good);
        assert!(!report.degenerate_reliability);

        let q1 = report.question(1).unwrap();
        assert_eq!(q1.difficulty_index, 0.75);
        assert_eq!(q1.difficulty_label, DifficultyLabel::Moderate);
        assert_eq!(q1.discrimination_index, 0.5);
        assert_eq!(q1.discrimination_label, DiscriminationLabel::Excellent);

        let q2 = report.question(2).unwrap();
        assert_eq!(q2.difficulty_index, 0.5);
        assert_eq!(q2.discrimination_index, 1.0);

        let q3 = report.question(3).unwrap();
        assert_eq!(q3.difficulty_index, 0.25);
        assert_eq!(q3.difficulty_label, DifficultyLabel::Hard);
        assert_eq!(q3.discrimination_index, 0.5);
    }

    #[test]
    fn distractor_counts_and_flag() {
        let report = analyze_statistics(
            &exam(3),
            &staircase(),
            &key_all_a(3),
            &AnalysisConfig::default(),
        )
        .unwrap();
        let q1 = report.question(1).unwrap();

        let a = &q1.distractors[0];
        assert_eq!((a.chosen_count, a.chosen_share, a.is_correct), (3, 0.75, true));
        let b = &q1.distractors[1];
        assert_eq!((b.chosen_count, b.chosen_share, b.is_effective), (1, 0.25, true));
        assert!(!q1.distractors[2].is_effective);
        assert!(!q1.distractors[3].is_effective);
        assert_eq!(q1.flag_reasons, vec!["2 ineffective distractors"]);
    }

    #[test]
    fn everyone_correct_is_ceiling_and_low_discrimination() {
        let responses = matrix(&[
            ("a", "AA"),
            ("b", "AB"),
            ("c", "AA"),
            ("d", "AB"),
            ("e", "AA"),
        ]);
        let report =
            analyze_statistics(&exam(2), &responses, &key_all_a(2), &AnalysisConfig::default())
                .unwrap();
        let q1 = report.question(1).unwrap();
        assert_eq!(q1.difficulty_index, 1.0);
        assert_eq!(q1.difficulty_label, DifficultyLabel::Easy);
        assert_eq!(q1.discrimination_index, 0.0);
        assert_eq!(q1.discrimination_label, DiscriminationLabel::Poor);
        assert!(q1.is_flagged);
        assert!(q1.flag_reasons.contains(&"Low discrimination (D=0.00)".to_string()));
        assert!(q1.flag_reasons.contains(&"Very easy (p=1.00)".to_string()));
    }

    #[test]
    fn negative_discrimination_flagged() {
        // The two strongest students miss Q2, the two weakest get it.
        let responses = matrix(&[
            ("s1", "ABAA"),
            ("s2", "ABAA"),
            ("s3", "BABB"),
            ("s4", "BABB"),
        ]);
        let report =
            analyze_statistics(&exam(4), &responses, &key_all_a(4), &AnalysisConfig::default())
                .unwrap();
        let q2 = report.question(2).unwrap();
        assert_eq!(q2.discrimination_index, -1.0);
        assert_eq!(q2.discrimination_label, DiscriminationLabel::Remove);
        assert!(q2
            .flag_reasons
            .contains(&"Negative discrimination (D=-1.00)".to_string()));
        assert!(!q2.flag_reasons.iter().any(|r| r.starts_with("Low")));
    }

    #[test]
    fn blank_and_invalid_responses() {
        let mut responses = staircase();
        responses.insert("s5", 1, "");
        responses.insert("s5", 2, "Z9");
        let report = analyze_statistics(
            &exam(3),
            &responses,
            &key_all_a(3),
            &AnalysisConfig::default(),
        )
        .unwrap();

        assert_eq!(report.total_students, 5);
        let q1 = report.question(1).unwrap();
        // Blank: not a respondent.
        assert_eq!(q1.respondents, 4);
        assert_eq!(q1.difficulty_index, 0.75);
        let q2 = report.question(2).unwrap();
        // Invalid: answered, incorrect.
        assert_eq!(q2.respondents, 5);
        assert_eq!(q2.difficulty_index, 0.4);
    }

    #[test]
    fn unreferenced_question_reported_without_responses() {
        let report = analyze_statistics(
            &exam(4),
            &staircase(),
            &key_all_a(4),
            &AnalysisConfig::default(),
        )
        .unwrap();
        let q4 = report.question(4).unwrap();
        assert_eq!(q4.respondents, 0);
        assert_eq!(q4.difficulty_index, 0.0);
        assert_eq!(q4.flag_reasons, vec!["No responses recorded"]);
    }

    #[test]
    fn dimension_mismatch() {
        let mut responses = staircase();
        responses.insert("s1", 7, "A");
        let err = analyze_statistics(
            &exam(3),
            &responses,
            &key_all_a(3),
            &AnalysisConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, AnalysisError::DimensionMismatch { question_id: 7 });
    }

    #[test]
    fn partial_key_is_flagged_not_fatal() {
        let key: AnswerKey = [(1, label('A')), (2, label('A'))].into_iter().collect();
        let report =
            analyze_statistics(&exam(3), &staircase(), &key, &AnalysisConfig::default()).unwrap();

        let q3 = report.question(3).unwrap();
        assert!(q3.is_flagged);
        assert_eq!(q3.flag_reasons, vec!["No answer key entry"]);
        assert_eq!(q3.difficulty_index, 0.0);
        assert_eq!(q3.discrimination_index, 0.0);
        assert!(report
            .warnings
            .contains(&"No answer key entry for question(s) 3".to_string()));
        // Totals come from the two keyed items only.
        assert_eq!(report.average_score, 1.25);
    }

    #[test]
    fn partial_key_fatal_when_strict() {
        let mut config = AnalysisConfig::default();
        config.statistics.strict_answer_key = true;
        let key: AnswerKey = [(1, label('A'))].into_iter().collect();
        let err = analyze_statistics(&exam(3), &staircase(), &key, &config).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::MissingAnswerKey {
                question_ids: vec![2, 3]
            }
        );
    }

    #[test]
    fn empty_key_is_fatal() {
        let err = analyze_statistics(
            &exam(3),
            &staircase(),
            &AnswerKey::new(),
            &AnalysisConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AnalysisError::MissingAnswerKey { .. }));
    }

    #[test]
    fn zero_variance_alpha_is_degenerate() {
        let responses = matrix(&[("a", "AA"), ("b", "AA"), ("c", "AA")]);
        let report =
            analyze_statistics(&exam(2), &responses, &key_all_a(2), &AnalysisConfig::default())
                .unwrap();
        assert_eq!(report.cronbach_alpha, 0.0);
        assert!(report.degenerate_reliability);
        assert_eq!(report.reliability_label, ReliabilityLabel::Unacceptable);
        assert!(report.warnings.iter().any(|w| w.contains("zero variance")));
    }

    #[test]
    fn empty_matrix_is_degenerate_not_error() {
        let report = analyze_statistics(
            &exam(2),
            &ResponseMatrix::new(),
            &key_all_a(2),
            &AnalysisConfig::default(),
        )
        .unwrap();
        assert_eq!(report.total_students, 0);
        assert_eq!(report.average_score, 0.0);
        assert!(report.degenerate_reliability);
        assert_eq!(report.flagged_question_count, 2);
    }

    #[test]
    fn size_limits_checked_first() {
        let mut config = AnalysisConfig::default();
        config.limits.max_students = 3;
        let err =
            analyze_statistics(&exam(3), &staircase(), &key_all_a(3), &config).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::SizeLimitExceeded {
                what: "student count",
                actual: 4,
                limit: 3
            }
        );

        let mut config = AnalysisConfig::default();
        config.limits.max_stats_questions = 2;
        let err =
            analyze_statistics(&exam(3), &staircase(), &key_all_a(3), &config).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::SizeLimitExceeded {
                what: "question count",
                ..
            }
        ));
    }

    #[test]
    fn difficulty_distribution_counts_every_question() {
        let report = analyze_statistics(
            &exam(3),
            &staircase(),
            &key_all_a(3),
            &AnalysisConfig::default(),
        )
        .unwrap();
        assert_eq!(report.difficulty_distribution[&DifficultyLabel::Easy], 0);
        assert_eq!(report.difficulty_distribution[&DifficultyLabel::Moderate], 2);
        assert_eq!(report.difficulty_distribution[&DifficultyLabel::Hard], 1);
    }

    #[test]
    fn key_naming_missing_option_warns() {
        let mut key = key_all_a(3);
        key.insert(3, label('F'));
        key.insert(9, label('A'));
        let report =
            analyze_statistics(&exam(3), &staircase(), &key, &AnalysisConfig::default()).unwrap();
        assert!(report
            .warnings
            .contains(&"Answer key for question 3 names F, which is not an option".to_string()));
        assert!(report.warnings.contains(
            &"Answer key entry for question 9 does not match any exam question".to_string()
        ));
    }

    #[test]
    fn ten_students_use_27_percent_groups() {
        // Student i answers the first i of 9 questions correctly.
        let rows: Vec<(String, String)> = (0..10)
            .map(|i| {
                let answers = (0..9).map(|q| if q < i { 'A' } else { 'B' }).collect();
                (format!("s{i:02}"), answers)
            })
            .collect();
        let borrowed: Vec<(&str, &str)> = rows
            .iter()
            .map(|(s, a)| (s.as_str(), a.as_str()))
            .collect();
        let report = analyze_statistics(
            &exam(9),
            &matrix(&borrowed),
            &key_all_a(9),
            &AnalysisConfig::default(),
        )
        .unwrap();
        // Groups of 3: upper = s09, s08, s07; lower = s02, s01, s00.
        // Q1 (index 0): upper all correct, lower only s01 and s02.
        assert_eq!(report.question(1).unwrap().discrimination_index, 0.3333);
        // Q9 (index 8): only s09 correct.
        assert_eq!(report.question(9).unwrap().discrimination_index, 0.3333);
    }
}
