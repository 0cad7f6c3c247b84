//! # Transcription Engine
//!
//! Process-wide entry point for speech decoding. Owns the single loaded
//! Whisper model behind an async mutex: the decoder's KV cache makes the
//! handle stateful, so concurrent windows from different connections are
//! serialized here rather than corrupting each other.
//!
//! ## Signal Contract:
//! - `Ok("")`: the window decoded cleanly to nothing (silence/noise).
//!   Callers send no message for it.
//! - `Err(..)`: the decode itself failed. Callers log it distinctly and
//!   keep the connection alive.

use crate::config::AppConfig;
use crate::transcription::model::{ModelSize, WhisperModel};
use anyhow::Result;
use candle_core::Device;
use std::path::Path;
use std::time::Instant;
use tokio::sync::Mutex;

/// Serialized access to the shared speech model.
pub struct TranscriptionEngine {
    model: Mutex<WhisperModel>,
    sample_rate: u32,
}

impl TranscriptionEngine {
    /// Load the configured model at startup. A load failure is fatal here,
    /// before any connection is accepted, never during one.
    pub async fn load(config: &AppConfig) -> Result<Self> {
        let size: ModelSize = config.models.whisper_model.parse()?;
        let model_dir = config.models.model_dir.as_deref().map(Path::new);

        let model = WhisperModel::load(
            size,
            model_dir,
            config.models.language.as_deref(),
            Device::Cpu,
        )
        .await?;

        Ok(Self {
            model: Mutex::new(model),
            sample_rate: config.audio.sample_rate,
        })
    }

    /// Decode one window of normalized samples to text.
    ///
    /// Runs outside the connection's message loop (callers spawn it), and
    /// one window at a time across the whole process.
    pub async fn transcribe(&self, window: &[f32]) -> Result<String> {
        let started = Instant::now();
        let window_secs = window.len() as f64 / self.sample_rate as f64;

        let text = {
            let mut model = self.model.lock().await;
            model.transcribe(window)?
        };

        tracing::info!(
            "Decoded {:.2}s window -> {} chars in {:.2}s",
            window_secs,
            text.len(),
            started.elapsed().as_secs_f64()
        );

        Ok(text)
    }

    /// Name of the loaded model, for the health endpoint.
    pub async fn model_name(&self) -> String {
        self.model.lock().await.size().to_string()
    }
}
