/// Score resolution tests against in-memory stores and a scripted generator
mod common;

use common::{
    edital, fast_policy, resolver, stored_score, MemoryStore, Script, ScriptedGenerator,
};
use origem_lab_api::db_storage::{EditalRepository, ScoreStore};
use origem_lab_api::errors::AppError;
use origem_lab_api::models::UserProfile;
use origem_lab_api::score_resolver::ScoreResolver;
use origem_lab_api::scoring::{RetryPolicy, ScoreComputeService};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn researcher() -> UserProfile {
    UserProfile {
        lattes_data: Some(json!({"nome": "Ana", "areas": ["biotecnologia"]})),
        user_type: Some("researcher".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_stored_score_is_returned_without_computing() {
    let store = Arc::new(MemoryStore::new());
    store.add_edital(edital("e1", "PIPE"));
    store.add_score(stored_score("e1", "u1", 82, 64));
    let generator = Arc::new(ScriptedGenerator::new(Script::Numbered));
    let resolver = resolver(store.clone(), generator.clone(), fast_policy(1));

    let score = resolver.resolve("e1", "u1", &researcher()).await.unwrap();

    assert_eq!(score.match_percent, 82);
    assert_eq!(score.probabilidade, 64);
    assert!(score.from_cache);
    assert!(score.persisted);
    assert_eq!(generator.call_count(), 0);
    assert_eq!(store.insert_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_miss_computes_once_and_persists() {
    let store = Arc::new(MemoryStore::new());
    store.add_edital(edital("e1", "PIPE"));
    let generator = Arc::new(ScriptedGenerator::new(Script::Numbered));
    let resolver = resolver(store.clone(), generator.clone(), fast_policy(1));

    let first = resolver.resolve("e1", "u1", &researcher()).await.unwrap();

    assert_eq!(generator.call_count(), 1);
    assert!(!first.from_cache);
    assert!(first.persisted);
    assert_eq!(first.match_percent, 50);
    assert_eq!(first.probabilidade, 30);

    let prompt = generator.last_prompt().unwrap();
    assert!(prompt.contains("Título: PIPE"));
    assert!(prompt.contains("Tipo de usuário: researcher"));

    let row = store.score("e1", "u1").unwrap();
    assert_eq!(row.match_percent, 50);
    assert_eq!(row.justificativa.as_deref(), Some("call 0"));
    assert_eq!(row.dados_utilizados["lattes"], json!(true));
    assert_eq!(row.dados_utilizados["cnpj"], json!(false));
    assert_eq!(row.profile_fingerprint.as_deref().map(str::len), Some(64));

    // Second request is served from the store
    let second = resolver.resolve("e1", "u1", &researcher()).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.match_percent, first.match_percent);
    assert_eq!(second.justificativa, first.justificativa);
    assert_eq!(generator.call_count(), 1);
    assert_eq!(store.score_count(), 1);
}

#[tokio::test]
async fn test_ids_are_trimmed() {
    let store = Arc::new(MemoryStore::new());
    store.add_score(stored_score("e1", "u1", 40, 20));
    let generator = Arc::new(ScriptedGenerator::new(Script::Numbered));
    let resolver = resolver(store, generator, fast_policy(1));

    let score = resolver.resolve(" e1 ", "u1\n", &researcher()).await.unwrap();
    assert_eq!(score.match_percent, 40);
}

#[tokio::test]
async fn test_missing_ids_rejected_before_store_access() {
    let store = Arc::new(MemoryStore::new());
    let generator = Arc::new(ScriptedGenerator::new(Script::Numbered));
    let resolver = resolver(store.clone(), generator.clone(), fast_policy(1));

    for (edital_id, user_id) in [("", "u1"), ("e1", ""), ("  ", "  ")] {
        let err = resolver
            .resolve(edital_id, user_id, &UserProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert_eq!(err.public_message(), "edital_id and user_id are required");
    }

    assert_eq!(store.get_calls.load(Ordering::SeqCst), 0);
    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn test_unknown_edital_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let generator = Arc::new(ScriptedGenerator::new(Script::Numbered));
    let resolver = resolver(store.clone(), generator.clone(), fast_policy(1));

    let err = resolver
        .resolve("missing", "u1", &researcher())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(err.status_code().as_u16(), 404);
    assert_eq!(generator.call_count(), 0);
    assert_eq!(store.score_count(), 0);
}

#[tokio::test]
async fn test_unconfigured_store_is_service_unavailable() {
    let generator = Arc::new(ScriptedGenerator::new(Script::Numbered));
    let resolver = ScoreResolver::new(
        None,
        None,
        ScoreComputeService::new(generator.clone(), fast_policy(1)),
        Duration::ZERO,
    );

    let err = resolver.resolve("e1", "u1", &researcher()).await.unwrap_err();
    assert!(matches!(err, AppError::ServiceUnavailable(_)));
    assert_eq!(err.public_message(), "Service not configured");
    assert_eq!(generator.call_count(), 0);

    let err = resolver.user_scores("u1").await.unwrap_err();
    assert!(matches!(err, AppError::ServiceUnavailable(_)));
}

#[tokio::test]
async fn test_compute_failure_retries_once_and_persists_nothing() {
    let store = Arc::new(MemoryStore::new());
    store.add_edital(edital("e1", "PIPE"));
    let generator = Arc::new(ScriptedGenerator::new(Script::Fail));
    let resolver = resolver(store.clone(), generator.clone(), fast_policy(1));

    let err = resolver.resolve("e1", "u1", &researcher()).await.unwrap_err();

    assert!(matches!(err, AppError::ComputeFailed(_)));
    assert_eq!(err.public_message(), "Score computation failed");
    assert_eq!(generator.call_count(), 2);
    assert_eq!(store.insert_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.score_count(), 0);
}

#[tokio::test]
async fn test_malformed_output_is_not_retried() {
    let store = Arc::new(MemoryStore::new());
    store.add_edital(edital("e1", "PIPE"));
    let generator = Arc::new(ScriptedGenerator::new(Script::Fixed(
        "Desculpe, não posso avaliar.".to_string(),
    )));
    let resolver = resolver(store.clone(), generator.clone(), fast_policy(1));

    let err = resolver.resolve("e1", "u1", &researcher()).await.unwrap_err();

    assert!(matches!(err, AppError::MalformedOutput(_)));
    assert_eq!(err.status_code().as_u16(), 500);
    assert_eq!(generator.call_count(), 1);
    assert_eq!(store.score_count(), 0);
}

#[tokio::test]
async fn test_invalid_outer_object_persists_nothing() {
    let store = Arc::new(MemoryStore::new());
    store.add_edital(edital("e1", "PIPE"));
    let generator = Arc::new(ScriptedGenerator::new(Script::Fixed(
        r#"{match: 80, probabilidade: 60, "detalhe": {"nota": "ok"}}"#.to_string(),
    )));
    let resolver = resolver(store.clone(), generator.clone(), fast_policy(1));

    let err = resolver.resolve("e1", "u1", &researcher()).await.unwrap_err();

    assert!(matches!(err, AppError::MalformedOutput(_)));
    assert_eq!(store.insert_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.score_count(), 0);

    // Nothing was stored, so the next request computes again
    let _ = resolver.resolve("e1", "u1", &researcher()).await;
    assert_eq!(generator.call_count(), 2);
}

#[tokio::test]
async fn test_out_of_range_output_is_clamped_before_persisting() {
    let store = Arc::new(MemoryStore::new());
    store.add_edital(edital("e1", "PIPE"));
    let generator = Arc::new(ScriptedGenerator::new(Script::Fixed(
        r#"{"match": 130, "probabilidade": -10, "justificativa": "fora da escala"}"#.to_string(),
    )));
    let resolver = resolver(store.clone(), generator, fast_policy(0));

    let score = resolver.resolve("e1", "u1", &researcher()).await.unwrap();
    assert_eq!(score.match_percent, 100);
    assert_eq!(score.probabilidade, 0);

    let row = store.score("e1", "u1").unwrap();
    assert_eq!((row.match_percent, row.probabilidade), (100, 0));
}

#[tokio::test]
async fn test_attempt_timeout_is_compute_failure() {
    let store = Arc::new(MemoryStore::new());
    store.add_edital(edital("e1", "PIPE"));
    let generator = Arc::new(ScriptedGenerator::new(Script::Slow(Duration::from_secs(2))));
    let policy = RetryPolicy {
        attempt_timeout: Duration::from_millis(50),
        max_retries: 0,
        base_delay: Duration::from_millis(1),
    };
    let resolver = resolver(store.clone(), generator.clone(), policy);

    let err = resolver.resolve("e1", "u1", &researcher()).await.unwrap_err();

    assert!(matches!(err, AppError::ComputeFailed(_)));
    assert_eq!(generator.call_count(), 1);
    assert_eq!(store.score_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_converge_on_one_row() {
    const RACERS: usize = 6;

    let store = Arc::new(MemoryStore::new());
    store.add_edital(edital("e1", "PIPE"));
    // Every racer is held inside the generator until all of them missed the store
    let generator = Arc::new(ScriptedGenerator::with_barrier(Script::Numbered, RACERS));
    let resolver = Arc::new(resolver(store.clone(), generator.clone(), fast_policy(0)));

    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move { resolver.resolve("e1", "u1", &researcher()).await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(generator.call_count(), RACERS);
    assert_eq!(store.score_count(), 1);

    let row = store.score("e1", "u1").unwrap();
    for result in &results {
        assert!(result.persisted);
        assert_eq!(result.match_percent, row.match_percent);
        assert_eq!(result.probabilidade, row.probabilidade);
        assert_eq!(result.justificativa, row.justificativa);
    }
    assert_eq!(results.iter().filter(|r| !r.from_cache).count(), 1);
}

#[tokio::test]
async fn test_conflict_without_row_returns_unpersisted_values() {
    let store = Arc::new(MemoryStore::with_phantom_conflict());
    store.add_edital(edital("e1", "PIPE"));
    let generator = Arc::new(ScriptedGenerator::new(Script::Numbered));
    let resolver = resolver(store.clone(), generator, fast_policy(1));

    let score = resolver.resolve("e1", "u1", &researcher()).await.unwrap();

    assert_eq!(score.match_percent, 50);
    assert!(!score.from_cache);
    assert!(!score.persisted);
    assert_eq!(store.score_count(), 0);
    // One read before computing, one after the conflict
    assert_eq!(store.get_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_reread_after_conflict_returns_unpersisted_values() {
    let store = Arc::new(MemoryStore::with_failing_reread());
    store.add_edital(edital("e1", "PIPE"));
    let generator = Arc::new(ScriptedGenerator::new(Script::Numbered));
    let resolver = resolver(store.clone(), generator.clone(), fast_policy(1));

    let score = resolver.resolve("e1", "u1", &researcher()).await.unwrap();

    assert_eq!(score.match_percent, 50);
    assert_eq!(score.probabilidade, 30);
    assert_eq!(score.justificativa.as_deref(), Some("call 0"));
    assert!(!score.from_cache);
    assert!(!score.persisted);
    assert_eq!(store.get_calls.load(Ordering::SeqCst), 2);
    assert_eq!(generator.call_count(), 1);
}

#[tokio::test]
async fn test_local_cache_spares_store_reads() {
    let store = Arc::new(MemoryStore::new());
    store.add_edital(edital("e1", "PIPE"));
    let generator = Arc::new(ScriptedGenerator::new(Script::Numbered));
    let resolver = ScoreResolver::new(
        Some(store.clone() as Arc<dyn ScoreStore>),
        Some(store.clone() as Arc<dyn EditalRepository>),
        ScoreComputeService::new(generator.clone(), fast_policy(1)),
        Duration::from_secs(60),
    );

    let first = resolver.resolve("e1", "u1", &researcher()).await.unwrap();
    let second = resolver.resolve("e1", "u1", &researcher()).await.unwrap();
    let third = resolver.resolve("e1", "u1", &researcher()).await.unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache && third.from_cache);
    assert_eq!(second.match_percent, first.match_percent);
    assert_eq!(generator.call_count(), 1);
    assert_eq!(store.get_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_user_scores_sorted_with_summary() {
    let store = Arc::new(MemoryStore::new());
    store.add_score(stored_score("e1", "u1", 35, 20));
    store.add_score(stored_score("e2", "u1", 90, 60));
    store.add_score(stored_score("e3", "u1", 70, 40));
    store.add_score(stored_score("e1", "other", 99, 99));
    let generator = Arc::new(ScriptedGenerator::new(Script::Numbered));
    let resolver = resolver(store, generator, fast_policy(1));

    let response = resolver.user_scores("u1").await.unwrap();

    let order: Vec<&str> = response.scores.iter().map(|s| s.edital_id.as_str()).collect();
    assert_eq!(order, vec!["e2", "e3", "e1"]);
    assert_eq!(response.summary.total, 3);
    assert_eq!(response.summary.average_match, 65.0);
    assert_eq!(response.summary.average_probabilidade, 40.0);
    assert_eq!(response.summary.high_fit_count, 2);
    assert_eq!(response.summary.high_fit_percent, 66.7);
}

#[tokio::test]
async fn test_user_without_scores_has_empty_summary() {
    let store = Arc::new(MemoryStore::new());
    let generator = Arc::new(ScriptedGenerator::new(Script::Numbered));
    let resolver = resolver(store, generator, fast_policy(1));

    let response = resolver.user_scores("nobody").await.unwrap();
    assert!(response.scores.is_empty());
    assert_eq!(response.summary.total, 0);
    assert_eq!(response.summary.high_fit_percent, 0.0);
}
