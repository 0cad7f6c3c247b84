//! # Configuration Management
//!
//! Loads application configuration from layered sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//!
//! Configuration is fixed at process start; nothing here is hot-reloadable.
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, HOST, PORT, ...)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use crate::audio::InputFormat;
use crate::transcription::model::ModelSize;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub audio: AudioSettings,
    pub models: ModelsConfig,
    pub enrichment: EnrichmentConfig,
}

/// Server bind settings.
///
/// - `host = "127.0.0.1"`: localhost only (development)
/// - `host = "0.0.0.0"`: accept connections from any address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Audio pipeline settings.
///
/// ## Fields:
/// - `sample_rate`: target rate the speech model expects (16000)
/// - `default_input_rate`: assumed client hardware rate until a `metadata`
///   message reports the real one
/// - `input_format`: payload sample encoding, "float32" or "pcm16";
///   fixed per deployment, both appear in practice
/// - `decode_interval_secs`: minimum time between decode firings
/// - `overlap_secs`: trailing audio retained across a decode window
/// - `min_buffer_secs`: minimum buffered audio before a decode may fire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub default_input_rate: u32,
    pub input_format: String,
    pub decode_interval_secs: f64,
    pub overlap_secs: f64,
    pub min_buffer_secs: f64,
}

impl AudioSettings {
    /// Parsed form of `input_format`; validation guarantees this succeeds
    /// after startup.
    pub fn parsed_input_format(&self) -> Result<InputFormat> {
        self.input_format.parse()
    }
}

/// Speech model settings.
///
/// ## Fields:
/// - `whisper_model`: model size to load ("tiny", "base", "small",
///   "medium", "large")
/// - `model_dir`: optional local directory holding config.json,
///   tokenizer.json and model.safetensors; when unset, files are fetched
///   from the HuggingFace hub and cached
/// - `language`: optional language hint for decoding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub whisper_model: String,
    pub model_dir: Option<String>,
    pub language: Option<String>,
}

/// LLM enrichment settings.
///
/// The credential is NOT configuration: it comes from the OPENAI_API_KEY
/// environment variable, and its absence downgrades enrichment to a no-op
/// instead of failing connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub api_base: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8765,
            },
            audio: AudioSettings {
                sample_rate: 16000,          // Whisper's input rate
                default_input_rate: 44100,   // common browser capture rate
                input_format: "float32".to_string(),
                decode_interval_secs: 6.0,   // sentence-sized windows
                overlap_secs: 1.0,
                min_buffer_secs: 2.0,
            },
            models: ModelsConfig {
                whisper_model: "tiny".to_string(),
                model_dir: None,
                language: Some("en".to_string()),
            },
            enrichment: EnrichmentConfig {
                model: "gpt-4o-mini".to_string(),
                max_tokens: 600,
                temperature: 0.0,
                api_base: "https://api.openai.com/v1".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_HOST=0.0.0.0`: override server host
    /// - `HOST=0.0.0.0` / `PORT=3000`: deployment-platform special cases
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml if present
            .add_source(config::File::with_name("config").required(false))
            // 3. Environment variables with APP_ prefix
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject bare HOST/PORT.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Runs once at startup, before the model loads or the server binds.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate cannot be 0"));
        }

        if self.audio.default_input_rate == 0 {
            return Err(anyhow::anyhow!("Default input sample rate cannot be 0"));
        }

        self.audio.parsed_input_format()?;

        if self.audio.decode_interval_secs <= 0.0 {
            return Err(anyhow::anyhow!("Decode interval must be positive"));
        }

        if self.audio.overlap_secs < 0.0 {
            return Err(anyhow::anyhow!("Overlap duration cannot be negative"));
        }

        if self.audio.overlap_secs >= self.audio.decode_interval_secs {
            return Err(anyhow::anyhow!(
                "Overlap duration ({}) must be shorter than the decode interval ({})",
                self.audio.overlap_secs,
                self.audio.decode_interval_secs
            ));
        }

        if self.audio.min_buffer_secs <= 0.0 {
            return Err(anyhow::anyhow!("Minimum buffer duration must be positive"));
        }

        self.models.whisper_model.parse::<ModelSize>()?;

        if self.enrichment.max_tokens == 0 {
            return Err(anyhow::anyhow!("Enrichment max_tokens cannot be 0"));
        }

        if !(0.0..=2.0).contains(&self.enrichment.temperature) {
            return Err(anyhow::anyhow!(
                "Enrichment temperature must be within [0.0, 2.0]"
            ));
        }

        if self.enrichment.api_base.is_empty() {
            return Err(anyhow::anyhow!("Enrichment api_base cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.decode_interval_secs, 6.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_zero_rejected() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overlap_must_stay_below_interval() {
        let mut config = AppConfig::default();
        config.audio.overlap_secs = 6.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_input_format_rejected() {
        let mut config = AppConfig::default();
        config.audio.input_format = "mp3".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_model_size_rejected() {
        let mut config = AppConfig::default();
        config.models.whisper_model = "gigantic".to_string();
        assert!(config.validate().is_err());
    }
}
