//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use origem_lab_api::config::Config;
use origem_lab_api::db_storage::{EditalRepository, ScoreStore, StoreError};
use origem_lab_api::errors::AppError;
use origem_lab_api::gemini_client::TextGenerator;
use origem_lab_api::models::{Edital, NewScore, StoredScore};
use origem_lab_api::score_resolver::ScoreResolver;
use origem_lab_api::scoring::{RetryPolicy, ScoreComputeService};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;
use uuid::Uuid;

/// Helper function to create test config
pub fn create_test_config(gemini_base_url: String) -> Config {
    Config {
        database_url: None,
        port: 8080,
        gemini_api_key: "test_key".to_string(),
        gemini_base_url,
        gemini_model: "gemini-test".to_string(),
        generation_timeout_secs: 5,
        generation_max_retries: 1,
        score_cache_ttl_secs: 0,
        n8n_webhook_url: None,
        n8n_timeout_secs: 5,
        run_migrations: false,
    }
}

/// Retry policy with short delays for tests.
pub fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        attempt_timeout: Duration::from_secs(5),
        max_retries,
        base_delay: Duration::from_millis(1),
    }
}

pub fn edital(id: &str, titulo: &str) -> Edital {
    Edital {
        id: id.to_string(),
        titulo: Some(titulo.to_string()),
        orgao: Some("FAPESP".to_string()),
        area: Some("Inovação".to_string()),
        publico_empresa: Some(true),
        ..Default::default()
    }
}

pub fn stored_score(edital_id: &str, user_id: &str, match_percent: i32, probabilidade: i32) -> StoredScore {
    StoredScore {
        id: Uuid::new_v4(),
        edital_id: edital_id.to_string(),
        user_id: user_id.to_string(),
        match_percent,
        probabilidade,
        justificativa: Some(format!("stored {}", match_percent)),
        dados_utilizados: serde_json::json!({}),
        profile_fingerprint: None,
        created_at: Utc::now(),
    }
}

/// Score store and edital repository backed by a mutex-guarded map.
///
/// Insert is check-and-set under the lock, mirroring the unique constraint.
#[derive(Default)]
pub struct MemoryStore {
    scores: Mutex<HashMap<(String, String), StoredScore>>,
    editais: Mutex<HashMap<String, Edital>>,
    pub get_calls: AtomicUsize,
    pub insert_calls: AtomicUsize,
    /// Report `Conflict` on insert without storing anything.
    pub phantom_conflict: bool,
    /// Fail every read once a conflict has been reported.
    pub fail_reads_after_conflict: bool,
    conflicted: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phantom_conflict() -> Self {
        Self {
            phantom_conflict: true,
            ..Self::default()
        }
    }

    /// Insert reports `Conflict` and the follow-up read fails.
    pub fn with_failing_reread() -> Self {
        Self {
            phantom_conflict: true,
            fail_reads_after_conflict: true,
            ..Self::default()
        }
    }

    pub fn add_edital(&self, edital: Edital) {
        self.editais
            .lock()
            .unwrap()
            .insert(edital.id.clone(), edital);
    }

    pub fn add_score(&self, score: StoredScore) {
        self.scores
            .lock()
            .unwrap()
            .insert((score.edital_id.clone(), score.user_id.clone()), score);
    }

    pub fn score_count(&self) -> usize {
        self.scores.lock().unwrap().len()
    }

    pub fn score(&self, edital_id: &str, user_id: &str) -> Option<StoredScore> {
        self.scores
            .lock()
            .unwrap()
            .get(&(edital_id.to_string(), user_id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ScoreStore for MemoryStore {
    async fn get_score(
        &self,
        edital_id: &str,
        user_id: &str,
    ) -> Result<Option<StoredScore>, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads_after_conflict && self.conflicted.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        Ok(self.score(edital_id, user_id))
    }

    async fn insert_score(&self, score: &NewScore) -> Result<StoredScore, StoreError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.phantom_conflict {
            self.conflicted.store(true, Ordering::SeqCst);
            return Err(StoreError::Conflict);
        }

        let mut scores = self.scores.lock().unwrap();
        let key = (score.edital_id.clone(), score.user_id.clone());
        if scores.contains_key(&key) {
            return Err(StoreError::Conflict);
        }

        let row = StoredScore {
            id: Uuid::new_v4(),
            edital_id: score.edital_id.clone(),
            user_id: score.user_id.clone(),
            match_percent: score.match_percent,
            probabilidade: score.probabilidade,
            justificativa: Some(score.justificativa.clone()),
            dados_utilizados: serde_json::to_value(&score.dados_utilizados).unwrap(),
            profile_fingerprint: Some(score.profile_fingerprint.clone()),
            created_at: Utc::now(),
        };
        scores.insert(key, row.clone());
        Ok(row)
    }

    async fn list_user_scores(&self, user_id: &str) -> Result<Vec<StoredScore>, StoreError> {
        Ok(self
            .scores
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl EditalRepository for MemoryStore {
    async fn find_edital(&self, edital_id: &str) -> Result<Option<Edital>, StoreError> {
        Ok(self.editais.lock().unwrap().get(edital_id).cloned())
    }
}

/// How the scripted generator answers.
pub enum Script {
    /// Distinct valid JSON per call: match = 50 + n, probabilidade = 30 + n.
    Numbered,
    /// The same raw text every call.
    Fixed(String),
    /// Always fail with `ComputeFailed`.
    Fail,
    /// Sleep before answering.
    Slow(Duration),
}

/// Text generator returning scripted output and recording its prompts.
pub struct ScriptedGenerator {
    script: Script,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
    /// Holds every call until this many calls are in flight.
    barrier: Option<Barrier>,
}

impl ScriptedGenerator {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            barrier: None,
        }
    }

    pub fn with_barrier(script: Script, parties: usize) -> Self {
        Self {
            barrier: Some(Barrier::new(parties)),
            ..Self::new(script)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, AppError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }

        match &self.script {
            Script::Numbered => Ok(format!(
                "Aqui está: {{\"match\": {}, \"probabilidade\": {}, \"justificativa\": \"call {}\"}}",
                50 + n,
                30 + n,
                n
            )),
            Script::Fixed(text) => Ok(text.clone()),
            Script::Fail => Err(AppError::ComputeFailed("provider down".to_string())),
            Script::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok("{\"match\": 1, \"probabilidade\": 1}".to_string())
            }
        }
    }
}

/// Resolver wired to the given fakes, with the local cache disabled.
pub fn resolver(
    store: Arc<MemoryStore>,
    generator: Arc<ScriptedGenerator>,
    policy: RetryPolicy,
) -> ScoreResolver {
    ScoreResolver::new(
        Some(store.clone() as Arc<dyn ScoreStore>),
        Some(store as Arc<dyn EditalRepository>),
        ScoreComputeService::new(generator, policy),
        Duration::ZERO,
    )
}
