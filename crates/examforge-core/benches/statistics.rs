use criterion::{black_box, criterion_group, criterion_main, Criterion};

use examforge_core::config::AnalysisConfig;
use examforge_core::statistics::analyze_statistics;
use examforge_core::{AnswerKey, AnswerOption, Exam, Label, Question, ResponseMatrix};

const LABELS: [char; 4] = ['A', 'B', 'C', 'D'];

fn make_exam(questions: u32) -> Exam {
    let questions = (1..=questions)
        .map(|id| {
            let mut q = Question::new(id, format!("Question {id}"));
            q.options = LABELS
                .into_iter()
                .map(|c| AnswerOption {
                    label: Label::new(c).unwrap(),
                    text: format!("option {c}"),
                })
                .collect();
            q
        })
        .collect();
    Exam::new("bench", "Bench", None, questions)
}

/// Deterministic pseudo-random sheet: stronger students pick the key more often.
fn make_responses(students: u32, questions: u32) -> ResponseMatrix {
    let mut responses = ResponseMatrix::new();
    for s in 0..students {
        for q in 1..=questions {
            let roll = (s.wrapping_mul(2654435761) ^ q.wrapping_mul(40503)) % 100;
            let label = if roll < 30 + (s * 60 / students) {
                'A'
            } else {
                LABELS[(roll % 4) as usize]
            };
            responses.insert(format!("student-{s:05}"), q, &label.to_string());
        }
    }
    responses
}

fn bench_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics");
    let config = AnalysisConfig::default();

    for (students, questions) in [(30, 20), (200, 50), (1000, 100)] {
        let exam = make_exam(questions);
        let responses = make_responses(students, questions);
        let key: AnswerKey = (1..=questions).map(|q| (q, Label::new('A').unwrap())).collect();

        group.bench_function(format!("students={students},questions={questions}"), |b| {
            b.iter(|| {
                analyze_statistics(
                    black_box(&exam),
                    black_box(&responses),
                    black_box(&key),
                    black_box(&config),
                )
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_statistics);
criterion_main!(benches);
