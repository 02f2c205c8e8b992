//! Edital/profile fit scoring through a text-generation provider.
//!
//! The model is asked for a plain JSON object with `match`, `probabilidade` and
//! `justificativa`. Its output is treated as untrusted text: the first balanced JSON object
//! is extracted, numbers are rounded and clamped into 0..=100, and missing values fall back
//! to defaults instead of failing.

use crate::config::Config;
use crate::errors::AppError;
use crate::gemini_client::TextGenerator;
use crate::models::ComputedScore;
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Rationale used when the model does not provide one.
pub const DEFAULT_JUSTIFICATIVA: &str = "Análise não disponível.";

/// Instruction template. `{edital}` and `{perfil}` are replaced before sending.
pub const SCORING_PROMPT_TEMPLATE: &str = r#"Você é um especialista em captação de recursos e editais de fomento no Brasil.
Avalie a compatibilidade entre o EDITAL e o PERFIL abaixo.

EDITAL:
{edital}

PERFIL:
{perfil}

Responda SOMENTE com um objeto JSON puro, sem markdown e sem texto adicional, com exatamente estas chaves:
{"match": <inteiro de 0 a 100 indicando a aderência do perfil ao edital>, "probabilidade": <inteiro de 0 a 100 indicando a chance de aprovação>, "justificativa": "<explicação curta em português, no máximo 3 frases>"}"#;

/// Timeout and retry settings for the generation call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Upper bound for one generation attempt.
    pub attempt_timeout: Duration,
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Base delay before a retry; up to the same amount of random jitter is added.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(30),
            max_retries: 1,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempt_timeout: Duration::from_secs(config.generation_timeout_secs),
            max_retries: config.generation_max_retries,
            ..Self::default()
        }
    }

    fn jittered_delay(&self) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let jitter_ms = rand::thread_rng().gen_range(0..=base_ms);
        Duration::from_millis(base_ms + jitter_ms)
    }
}

/// Computes fit scores for an edital/profile pair.
pub struct ScoreComputeService {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl ScoreComputeService {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self { generator, policy }
    }

    /// Builds the prompt, calls the generator and parses its answer.
    ///
    /// # Errors
    ///
    /// * `ComputeFailed` - every attempt failed or timed out.
    /// * `MalformedOutput` - the answer has no parseable JSON object.
    pub async fn compute(
        &self,
        edital_text: &str,
        profile_text: &str,
    ) -> Result<ComputedScore, AppError> {
        let prompt = build_prompt(edital_text, profile_text);
        let raw = self.generate_with_retry(&prompt).await?;
        let score = parse_score_output(&raw)?;

        tracing::info!(
            match_percent = score.match_percent,
            probabilidade = score.probabilidade,
            "Score computed"
        );
        Ok(score)
    }

    async fn generate_with_retry(&self, prompt: &str) -> Result<String, AppError> {
        let mut attempt: u32 = 0;
        loop {
            let result = match tokio::time::timeout(
                self.policy.attempt_timeout,
                self.generator.generate(prompt),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AppError::ComputeFailed(format!(
                    "Generation timed out after {}s",
                    self.policy.attempt_timeout.as_secs_f32()
                ))),
            };

            match result {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.policy.max_retries => {
                    let delay = self.policy.jittered_delay();
                    tracing::warn!(
                        "Generation attempt {} failed ({}); retrying in {}ms",
                        attempt + 1,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_compute_failure() => return Err(e),
                Err(e) => return Err(AppError::ComputeFailed(e.to_string())),
            }
        }
    }
}

/// Fills the instruction template.
pub fn build_prompt(edital_text: &str, profile_text: &str) -> String {
    SCORING_PROMPT_TEMPLATE
        .replace("{edital}", edital_text)
        .replace("{perfil}", profile_text)
}

/// Parses raw model output into a clamped score.
pub fn parse_score_output(raw: &str) -> Result<ComputedScore, AppError> {
    let text = strip_code_fences(raw);

    let candidate = JsonObjectCandidates::new(&text).next().ok_or_else(|| {
        AppError::MalformedOutput(format!(
            "no JSON object in model output ({} chars)",
            raw.chars().count()
        ))
    })?;

    // Only the first object counts. Objects nested in it are never tried on their own.
    let object = match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => map,
        _ => {
            return Err(AppError::MalformedOutput(
                "model output JSON could not be parsed".to_string(),
            ))
        }
    };

    let justificativa = object
        .get("justificativa")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_JUSTIFICATIVA)
        .to_string();

    Ok(ComputedScore {
        match_percent: read_percent(object.get("match"), "match"),
        probabilidade: read_percent(object.get("probabilidade"), "probabilidade"),
        justificativa,
    })
}

/// Rounds and clamps a percentage; missing or non-numeric values count as 0.
pub fn read_percent(value: Option<&Value>, field: &str) -> i32 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .ok(),
        _ => None,
    };

    match number.filter(|n| n.is_finite()) {
        Some(n) => clamp_percent(n),
        None => {
            tracing::warn!("Model output missing numeric '{}'; using 0", field);
            0
        }
    }
}

/// Rounds to the nearest integer and clamps into 0..=100.
pub fn clamp_percent(value: f64) -> i32 {
    value.round().clamp(0.0, 100.0) as i32
}

fn strip_code_fences(raw: &str) -> String {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("fence pattern is valid")
    });

    match fence.captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().to_string(),
        None => raw.to_string(),
    }
}

/// Yields top-level balanced `{...}` substrings, left to right.
///
/// Braces inside JSON string literals are ignored, so a `}` inside the rationale does not
/// close the object early. Scanning resumes after the end of each yielded object, so nested
/// objects are never yielded. An opening brace that is never closed yields nothing.
pub struct JsonObjectCandidates<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> JsonObjectCandidates<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }
}

impl<'a> Iterator for JsonObjectCandidates<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while let Some(offset) = self.text[self.pos..].find('{') {
            let start = self.pos + offset;
            self.pos = start + 1;

            let mut depth = 0usize;
            let mut in_string = false;
            let mut escaped = false;
            for (i, ch) in self.text[start..].char_indices() {
                if in_string {
                    match ch {
                        _ if escaped => escaped = false,
                        '\\' => escaped = true,
                        '"' => in_string = false,
                        _ => {}
                    }
                    continue;
                }
                match ch {
                    '"' => in_string = true,
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            let end = start + i + 1;
                            self.pos = end;
                            return Some(&self.text[start..end]);
                        }
                    }
                    _ => {}
                }
            }
        }
        None
    }
}
