use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

// ============ Database Models ============

/// A published funding call ("edital").
///
/// Owned by the ingestion pipeline; this service only reads it. Every attribute other than
/// the id may be missing in the source data.
#[derive(Debug, Clone, Default, FromRow, Serialize, Deserialize)]
pub struct Edital {
    /// Unique identifier of the call.
    pub id: String,
    /// Title of the call.
    pub titulo: Option<String>,
    /// Official call number (e.g. "FAPESP 12/2024").
    pub numero: Option<String>,
    /// Issuing body.
    pub orgao: Option<String>,
    /// Knowledge or economic area.
    pub area: Option<String>,
    /// Free-text description.
    pub descricao: Option<String>,
    /// Monetary value, as published.
    pub valor: Option<String>,
    /// Location or coverage.
    pub local: Option<String>,
    /// Number of seats/slots.
    pub vagas: Option<i32>,
    /// Whether the call targets researchers.
    pub publico_pesquisador: Option<bool>,
    /// Whether the call targets companies.
    pub publico_empresa: Option<bool>,
    /// "About" text from the call page.
    pub sobre: Option<String>,
    /// Eligibility criteria text.
    pub criterios_elegibilidade: Option<String>,
    /// Submission closing date.
    pub data_encerramento: Option<NaiveDate>,
}

/// A persisted score row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct StoredScore {
    pub id: Uuid,
    pub edital_id: String,
    pub user_id: String,
    /// Match percentage (0-100).
    pub match_percent: i32,
    /// Approval probability percentage (0-100).
    pub probabilidade: i32,
    pub justificativa: Option<String>,
    /// Which profile sources were available when the score was computed.
    pub dados_utilizados: Value,
    /// SHA-256 (hex) of the formatted profile text.
    pub profile_fingerprint: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A score ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewScore {
    pub edital_id: String,
    pub user_id: String,
    pub match_percent: i32,
    pub probabilidade: i32,
    pub justificativa: String,
    pub dados_utilizados: DataSources,
    pub profile_fingerprint: String,
}

// ============ Domain Models ============

/// Profile data supplied by the caller. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Academic CV data (Lattes).
    pub lattes_data: Option<Value>,
    /// Company registry data (CNPJ).
    pub cnpj_data: Option<Value>,
    /// Personal id data (CPF).
    pub cpf_data: Option<Value>,
    /// User type tag (e.g. "researcher", "company").
    pub user_type: Option<String>,
}

/// Record of which profile sources fed a score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSources {
    pub lattes: bool,
    pub cnpj: bool,
    pub cpf: bool,
    pub user_type: Option<String>,
}

/// Output of one generation round, already clamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputedScore {
    pub match_percent: i32,
    pub probabilidade: i32,
    pub justificativa: String,
}

/// Final outcome of a score resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScore {
    pub match_percent: i32,
    pub probabilidade: i32,
    pub justificativa: Option<String>,
    /// The values came from the store rather than from this request's computation.
    pub from_cache: bool,
    /// The returned values are known to be the persisted ones.
    pub persisted: bool,
}

impl ResolvedScore {
    pub fn from_stored(row: &StoredScore) -> Self {
        Self {
            match_percent: row.match_percent,
            probabilidade: row.probabilidade,
            justificativa: row.justificativa.clone(),
            from_cache: true,
            persisted: true,
        }
    }
}

// ============ API Request/Response Models ============

/// Body of `POST /api/calculate-edital-scores`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CalculateScoreRequest {
    #[serde(default)]
    pub edital_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub user_data: Option<UserProfile>,
}

/// Success body of `POST /api/calculate-edital-scores`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalculateScoreResponse {
    #[serde(rename = "match")]
    pub match_percent: i32,
    pub probabilidade: i32,
    pub justificativa: Option<String>,
    pub from_cache: bool,
    pub persisted: bool,
}

impl From<ResolvedScore> for CalculateScoreResponse {
    fn from(score: ResolvedScore) -> Self {
        Self {
            match_percent: score.match_percent,
            probabilidade: score.probabilidade,
            justificativa: score.justificativa,
            from_cache: score.from_cache,
            persisted: score.persisted,
        }
    }
}

/// One entry of `GET /api/users/:user_id/scores`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserScoreEntry {
    pub edital_id: String,
    #[serde(rename = "match")]
    pub match_percent: i32,
    pub probabilidade: i32,
    pub justificativa: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<StoredScore> for UserScoreEntry {
    fn from(row: StoredScore) -> Self {
        Self {
            edital_id: row.edital_id,
            match_percent: row.match_percent,
            probabilidade: row.probabilidade,
            justificativa: row.justificativa,
            created_at: row.created_at,
        }
    }
}

/// Aggregates over a user's stored scores.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScoreSummary {
    pub total: usize,
    pub average_match: f64,
    pub average_probabilidade: f64,
    pub high_fit_count: usize,
    pub high_fit_percent: f64,
}

/// Body of `GET /api/users/:user_id/scores`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserScoresResponse {
    pub scores: Vec<UserScoreEntry>,
    pub summary: ScoreSummary,
}
