//! Word and character limits for grant application form fields.

use crate::errors::AppError;
use axum::{extract::rejection::JsonRejection, Json};
use serde::{Deserialize, Serialize};

/// One form field to check.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FieldInput {
    pub name: String,
    #[serde(default)]
    pub text: String,
    pub max_words: Option<usize>,
    pub max_chars: Option<usize>,
}

/// Body of `POST /api/application/validate`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ValidateApplicationRequest {
    #[serde(default)]
    pub fields: Vec<FieldInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FieldReport {
    pub name: String,
    pub words: usize,
    pub chars: usize,
    pub max_words: Option<usize>,
    pub max_chars: Option<usize>,
    pub within_limits: bool,
    /// Share of the word limit used, rounded.
    pub words_percent: Option<u32>,
    /// Share of the character limit used, rounded.
    pub chars_percent: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub fields: Vec<FieldReport>,
}

/// Whitespace-separated tokens.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Unicode scalar values, ignoring leading and trailing whitespace.
pub fn count_chars(text: &str) -> usize {
    text.trim().chars().count()
}

fn usage_percent(count: usize, limit: usize) -> u32 {
    ((count as f64 * 100.0) / limit as f64).round() as u32
}

pub fn check_field(field: &FieldInput) -> FieldReport {
    let words = count_words(&field.text);
    let chars = count_chars(&field.text);

    let within_limits = field.max_words.map_or(true, |max| words <= max)
        && field.max_chars.map_or(true, |max| chars <= max);

    FieldReport {
        name: field.name.clone(),
        words,
        chars,
        max_words: field.max_words,
        max_chars: field.max_chars,
        within_limits,
        words_percent: field.max_words.map(|max| usage_percent(words, max)),
        chars_percent: field.max_chars.map(|max| usage_percent(chars, max)),
    }
}

/// Checks every field; the form is valid when all fields are within their limits.
pub fn validate_application(
    request: &ValidateApplicationRequest,
) -> Result<ValidationReport, AppError> {
    if request.fields.is_empty() {
        return Err(AppError::InvalidRequest(
            "at least one field is required".to_string(),
        ));
    }
    if let Some(field) = request
        .fields
        .iter()
        .find(|f| f.max_words == Some(0) || f.max_chars == Some(0))
    {
        return Err(AppError::InvalidRequest(format!(
            "limits for field '{}' must be positive",
            field.name
        )));
    }

    let fields: Vec<FieldReport> = request.fields.iter().map(check_field).collect();
    let valid = fields.iter().all(|f| f.within_limits);

    Ok(ValidationReport { valid, fields })
}

/// POST /api/application/validate
pub async fn validate_application_handler(
    payload: Result<Json<ValidateApplicationRequest>, JsonRejection>,
) -> Result<Json<ValidationReport>, AppError> {
    let Json(request) =
        payload.map_err(|e| AppError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;

    let report = validate_application(&request)?;
    if !report.valid {
        tracing::debug!(
            "Application form over limits: {:?}",
            report
                .fields
                .iter()
                .filter(|f| !f.within_limits)
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
        );
    }
    Ok(Json(report))
}
