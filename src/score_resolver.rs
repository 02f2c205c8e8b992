//! Score resolution: store lookup, compute on miss, persist, race recovery.
//!
//! ```text
//! CHECK_CACHE ─ hit ──────────────────────────────────────────────► cached
//!      │ miss
//! FETCH_EDITAL ─ none ────────────────────────────────────────────► NotFound
//!      │
//! COMPUTE ─ error ────────────────────────────────────────────────► ComputeFailed
//!      │
//! PERSIST ─ ok ───────────────────────────────────────────────────► computed
//!      │ conflict
//! REFETCH ─ found ────────────────────────────────────────────────► winner's row
//!      └─ missing / error ────────────────────────────► computed, persisted = false
//! ```
//!
//! The store's unique constraint on (edital_id, user_id) is the only coordination between
//! concurrent requests. No lock is taken here.

use crate::analytics::summarize_scores;
use crate::context_formatter::{data_sources, format_edital, format_profile, profile_fingerprint};
use crate::db_storage::{EditalRepository, ScoreStore, StoreError};
use crate::errors::{AppError, ResultExt};
use crate::models::{
    NewScore, ResolvedScore, StoredScore, UserProfile, UserScoreEntry, UserScoresResponse,
};
use crate::scoring::ScoreComputeService;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

type ScoreKey = (String, String);

pub struct ScoreResolver {
    scores: Option<Arc<dyn ScoreStore>>,
    editais: Option<Arc<dyn EditalRepository>>,
    compute: ScoreComputeService,
    /// Process-local copy of rows already persisted. Never holds unpersisted values.
    recent: Option<Cache<ScoreKey, StoredScore>>,
}

impl ScoreResolver {
    /// Creates a resolver.
    ///
    /// # Arguments
    ///
    /// * `scores` / `editais` - Store handles; `None` makes every call fail with
    ///   `ServiceUnavailable`.
    /// * `compute` - Score computation service.
    /// * `cache_ttl` - Lifetime of the local copy of persisted scores; zero disables it.
    pub fn new(
        scores: Option<Arc<dyn ScoreStore>>,
        editais: Option<Arc<dyn EditalRepository>>,
        compute: ScoreComputeService,
        cache_ttl: Duration,
    ) -> Self {
        let recent = (!cache_ttl.is_zero()).then(|| {
            Cache::builder()
                .time_to_live(cache_ttl)
                .max_capacity(10_000)
                .build()
        });

        Self {
            scores,
            editais,
            compute,
            recent,
        }
    }

    /// Returns the score for (edital_id, user_id), computing and persisting it at most once.
    pub async fn resolve(
        &self,
        edital_id: &str,
        user_id: &str,
        profile: &UserProfile,
    ) -> Result<ResolvedScore, AppError> {
        let edital_id = edital_id.trim();
        let user_id = user_id.trim();
        if edital_id.is_empty() || user_id.is_empty() {
            return Err(AppError::InvalidRequest(
                "edital_id and user_id are required".to_string(),
            ));
        }

        let (scores, editais) = self.stores()?;
        let key: ScoreKey = (edital_id.to_string(), user_id.to_string());

        // CHECK_CACHE
        if let Some(row) = self.lookup_recent(&key).await {
            tracing::debug!("Score cache hit (local) for {:?}", key);
            return Ok(ResolvedScore::from_stored(&row));
        }
        if let Some(row) = scores.get_score(edital_id, user_id).await? {
            tracing::info!("Score cache hit for edital {} / user {}", edital_id, user_id);
            self.remember(key, &row).await;
            return Ok(ResolvedScore::from_stored(&row));
        }

        // FETCH_EDITAL
        let edital = editais
            .find_edital(edital_id)
            .await
            .map_err(AppError::from)
            .with_context(|| format!("Failed to load edital {}", edital_id))?
            .ok_or_else(|| AppError::NotFound("Edital not found".to_string()))?;

        // COMPUTE
        let edital_text = format_edital(&edital);
        let profile_text = format_profile(profile);
        tracing::info!(
            "Computing score for edital {} / user {} ({} edital chars, {} profile chars)",
            edital_id,
            user_id,
            edital_text.chars().count(),
            profile_text.chars().count()
        );
        let computed = self.compute.compute(&edital_text, &profile_text).await?;

        // PERSIST
        let new_score = NewScore {
            edital_id: edital_id.to_string(),
            user_id: user_id.to_string(),
            match_percent: computed.match_percent,
            probabilidade: computed.probabilidade,
            justificativa: computed.justificativa.clone(),
            dados_utilizados: data_sources(profile),
            profile_fingerprint: profile_fingerprint(&profile_text),
        };

        match scores.insert_score(&new_score).await {
            Ok(row) => {
                self.remember(key, &row).await;
                Ok(ResolvedScore {
                    from_cache: false,
                    ..ResolvedScore::from_stored(&row)
                })
            }
            Err(StoreError::Conflict) => {
                tracing::info!(
                    "Score for edital {} / user {} inserted concurrently; re-reading",
                    edital_id,
                    user_id
                );
                // REFETCH
                match scores.get_score(edital_id, user_id).await {
                    Ok(Some(row)) => {
                        self.remember(key, &row).await;
                        Ok(ResolvedScore::from_stored(&row))
                    }
                    Ok(None) => {
                        tracing::warn!(
                            "Conflict on insert but no score found for edital {} / user {}; \
                             returning unpersisted values",
                            edital_id,
                            user_id
                        );
                        Ok(unpersisted(new_score))
                    }
                    Err(e) => {
                        tracing::error!(
                            "Re-read after conflict failed for edital {} / user {}: {}",
                            edital_id,
                            user_id,
                            e
                        );
                        Ok(unpersisted(new_score))
                    }
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stored scores of a user with summary percentages.
    pub async fn user_scores(&self, user_id: &str) -> Result<UserScoresResponse, AppError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::InvalidRequest("user_id is required".to_string()));
        }
        let (scores, _) = self.stores()?;

        let mut rows = scores.list_user_scores(user_id).await?;
        rows.sort_by(|a, b| {
            b.match_percent
                .cmp(&a.match_percent)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let summary = summarize_scores(&rows);
        Ok(UserScoresResponse {
            scores: rows.into_iter().map(UserScoreEntry::from).collect(),
            summary,
        })
    }

    /// True when both the score store and the edital repository are wired.
    pub fn is_configured(&self) -> bool {
        self.scores.is_some() && self.editais.is_some()
    }

    fn stores(&self) -> Result<(&Arc<dyn ScoreStore>, &Arc<dyn EditalRepository>), AppError> {
        match (&self.scores, &self.editais) {
            (Some(scores), Some(editais)) => Ok((scores, editais)),
            _ => Err(AppError::ServiceUnavailable(
                "score store is not configured".to_string(),
            )),
        }
    }

    async fn lookup_recent(&self, key: &ScoreKey) -> Option<StoredScore> {
        match &self.recent {
            Some(cache) => cache.get(key).await,
            None => None,
        }
    }

    async fn remember(&self, key: ScoreKey, row: &StoredScore) {
        if let Some(cache) = &self.recent {
            cache.insert(key, row.clone()).await;
        }
    }
}

fn unpersisted(score: NewScore) -> ResolvedScore {
    ResolvedScore {
        match_percent: score.match_percent,
        probabilidade: score.probabilidade,
        justificativa: Some(score.justificativa),
        from_cache: false,
        persisted: false,
    }
}
