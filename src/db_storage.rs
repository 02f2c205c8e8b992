use crate::errors::AppError;
use crate::models::{Edital, NewScore, StoredScore};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use std::fmt;

/// Postgres SQLSTATE for `unique_violation`.
pub const UNIQUE_VIOLATION: &str = "23505";

const SCORE_COLUMNS: &str = "id, edital_id, user_id, match_percent, probabilidade, \
     justificativa, dados_utilizados, profile_fingerprint, created_at";

/// Failures surfaced by the score store.
///
/// `Conflict` is the signal the resolver reacts to when another request already inserted a
/// score for the same (edital, user) key.
#[derive(Debug)]
pub enum StoreError {
    /// A row for the key already exists.
    Conflict,
    /// The store is not configured or cannot be reached.
    Unavailable(String),
    /// Any other database error.
    Database(sqlx::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Conflict => write!(f, "score already exists for key"),
            StoreError::Unavailable(msg) => write!(f, "score store unavailable: {}", msg),
            StoreError::Database(e) => write!(f, "database error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            return StoreError::Conflict;
        }
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => {
                AppError::InternalError("unexpected score conflict".to_string())
            }
            StoreError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
            StoreError::Database(e) => AppError::DatabaseError(e),
        }
    }
}

/// True when `err` is a Postgres unique-constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

/// Durable scores keyed by (edital_id, user_id).
///
/// Implementations must reject a second insert for the same key with
/// `StoreError::Conflict`; that rejection is the only concurrency control scores rely on.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn get_score(
        &self,
        edital_id: &str,
        user_id: &str,
    ) -> Result<Option<StoredScore>, StoreError>;

    async fn insert_score(&self, score: &NewScore) -> Result<StoredScore, StoreError>;

    /// All scores of a user, highest match first.
    async fn list_user_scores(&self, user_id: &str) -> Result<Vec<StoredScore>, StoreError>;
}

/// Read access to funding calls.
#[async_trait]
pub trait EditalRepository: Send + Sync {
    async fn find_edital(&self, edital_id: &str) -> Result<Option<Edital>, StoreError>;
}

/// Postgres-backed store for scores and editais.
pub struct PgScoreStore {
    pool: PgPool,
}

impl PgScoreStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScoreStore for PgScoreStore {
    async fn get_score(
        &self,
        edital_id: &str,
        user_id: &str,
    ) -> Result<Option<StoredScore>, StoreError> {
        let row = sqlx::query_as::<_, StoredScore>(&format!(
            "SELECT {} FROM public.edital_scores WHERE edital_id = $1 AND user_id = $2 LIMIT 1",
            SCORE_COLUMNS
        ))
        .bind(edital_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                "Database error reading score ({}, {}): {:?}",
                edital_id,
                user_id,
                e
            );
            StoreError::from(e)
        })?;

        Ok(row)
    }

    async fn insert_score(&self, score: &NewScore) -> Result<StoredScore, StoreError> {
        let row = sqlx::query_as::<_, StoredScore>(&format!(
            r#"
            INSERT INTO public.edital_scores (
                edital_id, user_id, match_percent, probabilidade,
                justificativa, dados_utilizados, profile_fingerprint
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            SCORE_COLUMNS
        ))
        .bind(&score.edital_id)
        .bind(&score.user_id)
        .bind(score.match_percent)
        .bind(score.probabilidade)
        .bind(&score.justificativa)
        .bind(Json(&score.dados_utilizados))
        .bind(&score.profile_fingerprint)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;

        tracing::info!(
            "Stored score {} for edital {} / user {}",
            row.id,
            row.edital_id,
            row.user_id
        );
        Ok(row)
    }

    async fn list_user_scores(&self, user_id: &str) -> Result<Vec<StoredScore>, StoreError> {
        let rows = sqlx::query_as::<_, StoredScore>(&format!(
            "SELECT {} FROM public.edital_scores WHERE user_id = $1 \
             ORDER BY match_percent DESC, created_at DESC",
            SCORE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(rows)
    }
}

#[async_trait]
impl EditalRepository for PgScoreStore {
    async fn find_edital(&self, edital_id: &str) -> Result<Option<Edital>, StoreError> {
        let edital = sqlx::query_as::<_, Edital>(
            r#"
            SELECT
                id::text AS id, titulo, numero, orgao, area, descricao, valor, local,
                vagas, publico_pesquisador, publico_empresa, sobre,
                criterios_elegibilidade, data_encerramento
            FROM public.editais
            WHERE id::text = $1
            LIMIT 1
            "#,
        )
        .bind(edital_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(edital)
    }
}
