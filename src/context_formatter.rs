//! Reduces an edital and a user profile into compact text blocks for the scoring prompt.
//!
//! Both functions are total: absent fields are skipped, long fields are truncated on
//! character boundaries.

use crate::models::{DataSources, Edital, UserProfile};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Upper bound for long free-text fields of an edital.
pub const EDITAL_TEXT_LIMIT: usize = 500;
/// Upper bound for each serialized profile sub-record.
pub const PROFILE_SECTION_LIMIT: usize = 1500;

const EMPTY_PROFILE: &str = "Nenhum dado de perfil disponível.";

/// Truncates `text` to at most `max_chars` characters, appending "..." when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

/// Line-oriented description of an edital listing only present fields.
pub fn format_edital(edital: &Edital) -> String {
    let mut lines: Vec<String> = Vec::new();

    let mut push = |label: &str, value: Option<String>| {
        if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
            lines.push(format!("{}: {}", label, v));
        }
    };

    push("Título", edital.titulo.clone());
    push("Número", edital.numero.clone());
    push("Órgão", edital.orgao.clone());
    push("Área", edital.area.clone());
    push(
        "Descrição",
        edital
            .descricao
            .as_deref()
            .map(|d| truncate_chars(d, EDITAL_TEXT_LIMIT)),
    );
    push("Valor", edital.valor.clone());
    push("Local", edital.local.clone());
    push("Vagas", edital.vagas.map(|v| v.to_string()));
    push(
        "Público pesquisador",
        edital.publico_pesquisador.map(yes_no),
    );
    push("Público empresa", edital.publico_empresa.map(yes_no));
    push(
        "Sobre",
        edital
            .sobre
            .as_deref()
            .map(|s| truncate_chars(s, EDITAL_TEXT_LIMIT)),
    );
    push(
        "Critérios de elegibilidade",
        edital
            .criterios_elegibilidade
            .as_deref()
            .map(|c| truncate_chars(c, EDITAL_TEXT_LIMIT)),
    );
    push(
        "Data de encerramento",
        edital
            .data_encerramento
            .map(|d| d.format("%d/%m/%Y").to_string()),
    );

    lines.join("\n")
}

/// Block describing the profile sub-records present in the request.
pub fn format_profile(profile: &UserProfile) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(user_type) = profile.user_type.as_deref().filter(|t| !t.trim().is_empty()) {
        sections.push(format!("Tipo de usuário: {}", user_type.trim()));
    }
    if let Some(section) = format_section("Currículo Lattes", profile.lattes_data.as_ref()) {
        sections.push(section);
    }
    if let Some(section) = format_section("Dados da empresa (CNPJ)", profile.cnpj_data.as_ref()) {
        sections.push(section);
    }
    if let Some(section) = format_section("Dados pessoais (CPF)", profile.cpf_data.as_ref()) {
        sections.push(section);
    }

    if sections.is_empty() {
        return EMPTY_PROFILE.to_string();
    }
    sections.join("\n\n")
}

/// Availability record stored alongside a score.
pub fn data_sources(profile: &UserProfile) -> DataSources {
    DataSources {
        lattes: is_present(profile.lattes_data.as_ref()),
        cnpj: is_present(profile.cnpj_data.as_ref()),
        cpf: is_present(profile.cpf_data.as_ref()),
        user_type: profile
            .user_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
    }
}

/// Hex SHA-256 of a formatted profile block.
pub fn profile_fingerprint(profile_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(profile_text.as_bytes());
    hex::encode(hasher.finalize())
}

fn format_section(label: &str, data: Option<&Value>) -> Option<String> {
    let data = data.filter(|d| is_present(Some(d)))?;
    let rendered = match data {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    };
    Some(format!(
        "{}:\n{}",
        label,
        truncate_chars(&rendered, PROFILE_SECTION_LIMIT)
    ))
}

fn is_present(data: Option<&Value>) -> bool {
    match data {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

fn yes_no(flag: bool) -> String {
    let label = if flag { "Sim" } else { "Não" };
    label.to_string()
}
