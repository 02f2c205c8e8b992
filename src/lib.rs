//! Origem.Lab Score API Library
//!
//! This library provides the server-side pieces of the Origem.Lab funding-opportunity
//! platform: edital/profile fit scoring backed by a generative model and a Postgres score
//! store, an n8n assistant proxy, and grant application form limit checks.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Core business logic.
//! - `data`: Data access layer.
//! - `integrations`: External service integrations.
//! - `analytics`: Summary percentages over stored scores.
//! - `application_limits`: Word/character limits for application form fields.
//! - `assistant_proxy`: n8n webhook proxy for the assistant chat.
//! - `circuit_breaker`: Circuit breaker for the generation provider.
//! - `config`: Configuration management.
//! - `context_formatter`: Edital and profile text blocks for the scoring prompt.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Score store and edital repository.
//! - `errors`: Error handling types.
//! - `gemini_client`: Gemini text-generation client.
//! - `handlers`: HTTP request handlers and router.
//! - `models`: Core data models.
//! - `score_resolver`: Cache-check, compute, persist and race recovery for scores.
//! - `scoring`: Prompt, retry policy and model output parsing.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;

pub mod analytics;
pub mod application_limits;
pub mod assistant_proxy;
pub mod circuit_breaker;
pub mod config;
pub mod context_formatter;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod gemini_client;
pub mod handlers;
pub mod models;
pub mod score_resolver;
pub mod scoring;
