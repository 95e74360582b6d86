//! Application configuration, loaded from the environment at startup.

use std::env;
use tracing::Level;

use crate::types::config::{SessionConfig, DEFAULT_MODEL, DEFAULT_PERSONA, DEFAULT_VOICE};

// --- Application Constants ---

/// Samples aggregated before a capture chunk is encoded and sent.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// Frames requested per output stream callback.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// Ring-buffer depth for the output path. Kept short so an interruption
/// cuts playback within this bound.
pub const OUTPUT_LATENCY_MS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable: {0}")]
    MissingVar(String),

    #[error("invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

/// Everything the panel needs at startup. Immutable for the process
/// lifetime; a session reset reuses the same values.
#[derive(Debug)]
pub struct Config {
    api_key: String,
    pub model: String,
    pub voice: String,
    pub persona: String,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `GEMINI_API_KEY`: Required. Credential for the Gemini Live API.
    // *   `GEMINI_MODEL`: (Optional) Speech model id.
    // *   `GEMINI_VOICE`: (Optional) Prebuilt voice name.
    // *   `GEMINI_PERSONA`: (Optional) System instruction for the assistant.
    // *   `RUST_LOG`: (Optional) Logging level, defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env for local development; ignored if not present.
        dotenvy::dotenv().ok();

        let api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let model = env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let voice = env::var("GEMINI_VOICE").unwrap_or_else(|_| DEFAULT_VOICE.to_string());
        let persona = env::var("GEMINI_PERSONA").unwrap_or_else(|_| DEFAULT_PERSONA.to_string());

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            api_key,
            model,
            voice,
            persona,
            log_level,
        })
    }

    /// The per-session view of this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.api_key.clone())
            .with_model(&self.model)
            .with_voice(&self.voice)
            .with_persona(&self.persona)
            .build()
    }
}
