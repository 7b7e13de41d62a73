// Answer-key validation and automatic scoring for assessments.

use std::collections::HashSet;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Assessment, AssessmentReq, Grade, Question, QuestionReq, QuestionType, SubmissionReq},
};

pub const DEFAULT_PASSING_SCORE: f64 = 70.0;

fn normalize(v: &str) -> String {
    v.trim().to_lowercase()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn validate_question(idx: usize, q: &QuestionReq) -> Result<(), String> {
    let at = |msg: &str| format!("question {}: {msg}", idx + 1);

    if q.text.trim().is_empty() {
        return Err(at("text is required"));
    }
    if let Some(points) = q.points {
        if !(points > 0.0) {
            return Err(at("points must be positive"));
        }
    }
    match q.kind {
        QuestionType::Essay => {}
        QuestionType::MultipleChoice => {
            if q.options.is_empty() {
                return Err(at("multiple-choice needs options"));
            }
            let options: HashSet<String> = q.options.iter().map(|o| normalize(o)).collect();
            if q.correct_answer.is_empty() {
                return Err(at("correct answer is required"));
            }
            if q.correct_answer.iter().any(|a| !options.contains(&normalize(a))) {
                return Err(at("correct answers must be among the options"));
            }
        }
        QuestionType::TrueFalse => match q.correct_answer.as_slice() {
            [a] if matches!(normalize(a).as_str(), "true" | "false") => {}
            _ => return Err(at("true-false needs a single \"true\" or \"false\" answer")),
        },
        QuestionType::ShortAnswer | QuestionType::FillBlank | QuestionType::Matching => {
            if q.correct_answer.iter().all(|a| a.trim().is_empty()) {
                return Err(at("correct answer is required"));
            }
        }
    }
    Ok(())
}

/// Validates an authoring request and assigns ids to the assessment and its questions.
pub fn build_assessment(req: AssessmentReq) -> AppResult<Assessment> {
    if req.title.trim().is_empty() {
        return Err(AppError::Validation("assessment title is required".into()));
    }
    let passing_score = req.passing_score.unwrap_or(DEFAULT_PASSING_SCORE);
    if !(0.0..=100.0).contains(&passing_score) {
        return Err(AppError::Validation("passingScore must be between 0 and 100".into()));
    }
    for (idx, q) in req.questions.iter().enumerate() {
        validate_question(idx, q).map_err(AppError::Validation)?;
    }

    let questions = req
        .questions
        .into_iter()
        .map(|q| Question {
            id: Uuid::new_v4(),
            text: q.text,
            kind: q.kind,
            options: q.options,
            correct_answer: q.correct_answer,
            points: q.points.unwrap_or(1.0),
            explanation: q.explanation,
        })
        .collect();

    Ok(Assessment {
        id: Uuid::new_v4(),
        title: req.title,
        description: req.description,
        questions,
        time_limit: req.time_limit,
        passing_score,
        max_attempts: req.max_attempts,
    })
}

/// Fraction of a question's points earned by `response`, in [0, 1].
/// `None` means the question is not auto-gradable.
fn credit(q: &Question, response: &[String]) -> Option<f64> {
    let key: Vec<String> = q
        .correct_answer
        .iter()
        .map(|a| normalize(a))
        .filter(|a| !a.is_empty())
        .collect();
    if key.is_empty() {
        return None;
    }
    let given: Vec<String> = response.iter().map(|r| normalize(r)).collect();

    let value = match q.kind {
        QuestionType::Matching => {
            let matched = key
                .iter()
                .zip(given.iter())
                .filter(|(want, got)| want == got)
                .count();
            matched as f64 / key.len() as f64
        }
        QuestionType::MultipleChoice if key.len() > 1 => {
            let key: HashSet<&String> = key.iter().collect();
            let picked: HashSet<&String> = given.iter().filter(|g| !g.is_empty()).collect();
            let hits = picked.iter().filter(|p| key.contains(*p)).count();
            let wrong = picked.len() - hits;
            hits.saturating_sub(wrong) as f64 / key.len() as f64
        }
        // Single-answer questions; extra keys on free-text questions are accepted alternatives.
        _ => {
            let answer = given.iter().find(|g| !g.is_empty());
            match answer {
                Some(a) if key.contains(a) => 1.0,
                _ => 0.0,
            }
        }
    };
    Some(value)
}

pub fn grade(assessment: &Assessment, submission: &SubmissionReq) -> Grade {
    let mut earned = 0.0;
    let mut possible = 0.0;

    for q in &assessment.questions {
        let response = submission
            .answers
            .iter()
            .find(|a| a.question_id == q.id)
            .map(|a| a.response.as_slice())
            .unwrap_or(&[]);
        if let Some(fraction) = credit(q, response) {
            possible += q.points;
            earned += fraction * q.points;
        }
    }

    let score = if possible > 0.0 {
        round2((earned / possible * 100.0).clamp(0.0, 100.0))
    } else {
        0.0
    };

    Grade {
        score,
        points_earned: round2(earned),
        points_possible: round2(possible),
        passed: possible > 0.0 && score >= assessment.passing_score,
    }
}
