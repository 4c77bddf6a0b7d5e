// src/exam/review.rs

//! Rebuilds a review-phase session from a stored submission.

use std::collections::HashMap;

use crate::{
    exam::{ExamError, Phase, scoring, session::ExamSession},
    models::submission::SubmissionRecord,
    store::{Filter, RemoteStore, Table, decode},
};

pub async fn fetch_record(store: &dyn RemoteStore, id: &str) -> Result<SubmissionRecord, ExamError> {
    let row = store
        .select_one(Table::TestLogs, &Filter::new().eq("id", id))
        .await?
        .ok_or_else(|| ExamError::RecordNotFound(id.to_string()))?;
    Ok(decode(Table::TestLogs, row)?)
}

/// Review session for a stored record. Scoring is recomputed from the
/// snapshot and answer map; stored totals are not trusted.
pub fn reconstruct(record: &SubmissionRecord) -> Result<ExamSession, ExamError> {
    let (Some(snapshot), Some(map)) = (&record.questions_snapshot, &record.questions_map) else {
        return Err(ExamError::ReviewUnavailable);
    };

    let positions: HashMap<String, usize> = snapshot
        .iter()
        .enumerate()
        .map(|(index, q)| (q.id.to_string(), index))
        .collect();

    let mut session = ExamSession::new(None);
    session.attempt_id = Some(record.id.clone());
    session.questions = snapshot.clone();
    for (bank_id, ids) in map {
        match positions.get(bank_id) {
            Some(index) => {
                session.answers.insert(*index, ids.clone());
                session.answered.insert(*index);
                session.saved.insert(*index);
            }
            None => tracing::warn!(
                "Record {} answers question {} missing from its snapshot",
                record.id,
                bank_id
            ),
        }
    }

    session.report = Some(scoring::score(&session.questions, &session.answers));
    session.current_index = 0;
    session.selection = session.answers.get(&0).cloned().unwrap_or_default();
    session.phase = Phase::Review;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{LocalCache, MemoryCache, ScopedCache},
        exam::{
            repository::CacheSessionRepository,
            session::{
                ExamEngine,
                tests::{examinee, mock_questions, mock_settings},
            },
        },
        store::{MemoryStore, encode},
    };
    use chrono::Utc;
    use std::sync::Arc;

    fn completed_attempt() -> (ExamEngine<CacheSessionRepository>, SubmissionRecord) {
        let cache: Arc<dyn LocalCache> = Arc::new(MemoryCache::new());
        let repo = CacheSessionRepository::new(ScopedCache::new(cache, "u:mock"));
        let mut engine = ExamEngine::new(mock_settings(600), examinee(), repo);
        engine.prepare(mock_questions(6)).unwrap();
        engine.start(Utc::now()).unwrap();
        // 0: right, 1: wrong, 2: skipped, 3: right (reverse order)
        engine.select_answer("b");
        engine.save_answer();
        engine.select_answer("a");
        engine.save_answer();
        engine.next();
        engine.select_answer("c");
        engine.select_answer("a");
        engine.save_answer();
        let finalized = engine.submit(Utc::now()).unwrap();
        (engine, finalized.record)
    }

    #[tokio::test]
    async fn stored_record_reproduces_live_review() {
        let (mut engine, record) = completed_attempt();
        engine.enter_review().unwrap();

        let store = MemoryStore::new();
        store
            .insert(Table::TestLogs, encode(Table::TestLogs, &record).unwrap())
            .await
            .unwrap();

        let fetched = fetch_record(&store, &record.id).await.unwrap();
        let rebuilt = reconstruct(&fetched).unwrap();
        let live = engine.session();

        assert_eq!(rebuilt.phase, Phase::Review);
        assert_eq!(rebuilt.current_index, 0);
        assert_eq!(rebuilt.answers, live.answers);
        assert_eq!(rebuilt.report, live.report);
        let report = rebuilt.report.unwrap();
        assert_eq!(report.total_correct, 2);
        assert!(!report.correct.contains(&2) && !report.incorrect.contains(&2));
    }

    #[test]
    fn missing_snapshot_or_map_is_unavailable() {
        let (_, mut record) = completed_attempt();
        let map = record.questions_map.take();
        assert!(matches!(reconstruct(&record), Err(ExamError::ReviewUnavailable)));
        record.questions_map = map;
        record.questions_snapshot = None;
        assert!(matches!(reconstruct(&record), Err(ExamError::ReviewUnavailable)));
    }

    #[test]
    fn tampered_totals_are_ignored() {
        let (_, mut record) = completed_attempt();
        record.score = 6;
        record.percentage = 100;
        let rebuilt = reconstruct(&record).unwrap();
        assert_eq!(rebuilt.report.unwrap().total_correct, 2);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            fetch_record(&store, "nope").await,
            Err(ExamError::RecordNotFound(_))
        ));
    }
}
