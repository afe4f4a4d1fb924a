//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// The hosted extractive-QA model used when `QA_ENDPOINT` is not set.
const DEFAULT_QA_ENDPOINT: &str =
    "https://api-inference.huggingface.co/models/deepset/roberta-base-squad2";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When unset, the service runs on the in-memory store instead of Postgres.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    /// Optional base URL of an OpenAI-compatible endpoint (e.g. a Gemini proxy).
    pub generation_api_base: Option<String>,
    pub generation_model: String,
    pub qa_endpoint: String,
    pub qa_api_key: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL").ok();

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load API Keys (as optional) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let qa_api_key = std::env::var("QA_API_KEY").ok();

        // --- Load Adapter-specific Settings ---
        let generation_api_base = std::env::var("GENERATION_API_BASE").ok();
        let generation_model =
            std::env::var("GENERATION_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let qa_endpoint =
            std::env::var("QA_ENDPOINT").unwrap_or_else(|_| DEFAULT_QA_ENDPOINT.to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            generation_api_base,
            generation_model,
            qa_endpoint,
            qa_api_key,
        })
    }
}
