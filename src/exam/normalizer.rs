// src/exam/normalizer.rs

//! Turns raw question-bank records into session questions.

use std::collections::HashSet;

use rand::{Rng, seq::SliceRandom};

use crate::{
    bank::QuestionBank,
    models::question::{Answer, BankFile, BankQuestion, Question, QuestionType},
    utils::html::{clean_links, sanitize_fragment},
};

/// Answer id for the answer at `position` in the bank: 'a', 'b', ...
fn answer_id(position: usize) -> Option<String> {
    u8::try_from(position)
        .ok()
        .filter(|p| *p < 26)
        .map(|p| char::from(b'a' + p).to_string())
}

/// Normalizes one bank record. Correctness is fixed from the bank's answer
/// positions before the display order is shuffled.
pub fn normalize_question<R: Rng + ?Sized>(
    raw: &BankQuestion,
    source_set: &str,
    rng: &mut R,
) -> Option<Question> {
    let Some(question_type) = QuestionType::from_bank(&raw.assessment_type) else {
        tracing::warn!(
            "Skipping question {} in {}: unknown type {:?}",
            raw.id,
            source_set,
            raw.assessment_type
        );
        return None;
    };
    if raw.prompt.answers.len() > 26 {
        tracing::warn!("Skipping question {} in {}: too many answers", raw.id, source_set);
        return None;
    }

    let mut answers: Vec<Answer> = raw
        .prompt
        .answers
        .iter()
        .enumerate()
        .filter_map(|(position, text)| {
            let id = answer_id(position)?;
            Some(Answer {
                is_correct: raw.correct_response.iter().any(|c| *c == id),
                id,
                text: sanitize_fragment(text),
                feedback: raw
                    .prompt
                    .feedbacks
                    .get(position)
                    .map(|f| sanitize_fragment(f))
                    .unwrap_or_default(),
            })
        })
        .collect();

    answers.shuffle(rng);

    Some(Question {
        id: raw.id,
        question_type,
        prompt_html: sanitize_fragment(&raw.prompt.question),
        answers,
        explanation_html: sanitize_fragment(&raw.prompt.explanation),
        section: raw.section.clone(),
        reference_links: clean_links(raw.prompt.links.as_deref().unwrap_or_default()),
        source_set: source_set.to_string(),
    })
}

/// Normalizes sources in order, dropping any question id already seen in an
/// earlier source (or earlier in the same one).
pub fn normalize_sources<R: Rng + ?Sized>(
    sources: &[(String, BankFile)],
    rng: &mut R,
) -> Vec<Question> {
    let mut seen_ids = HashSet::new();
    let mut questions = Vec::new();
    for (set, file) in sources {
        for raw in &file.results {
            if !seen_ids.insert(raw.id) {
                continue;
            }
            if let Some(question) = normalize_question(raw, set, rng) {
                questions.push(question);
            }
        }
    }
    questions
}

/// Pools every source, shuffles, and keeps the first `length` questions.
/// A smaller pool yields a shorter exam.
pub fn assemble_mock<R: Rng + ?Sized>(
    sources: &[(String, BankFile)],
    length: usize,
    rng: &mut R,
) -> Vec<Question> {
    let mut pool = normalize_sources(sources, rng);
    pool.shuffle(rng);
    if pool.len() < length {
        tracing::warn!(
            "Question pool has {} questions, mock exam shortened from {}",
            pool.len(),
            length
        );
    }
    pool.truncate(length);
    pool
}

/// Loads the named sets in order. A set that fails to load is logged and
/// skipped so the remaining sources still form a pool.
pub async fn load_sources(bank: &dyn QuestionBank, sets: &[String]) -> Vec<(String, BankFile)> {
    let mut sources = Vec::with_capacity(sets.len());
    for set in sets {
        match bank.load(set).await {
            Ok(file) => sources.push((set.clone(), file)),
            Err(e) => tracing::error!("Failed to load {}: {}", set, e),
        }
    }
    sources
}
