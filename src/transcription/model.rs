//! # Whisper Model
//!
//! Loads and runs Whisper via Candle. Weights, tokenizer and model config
//! come either from a local model-asset directory or from the HuggingFace
//! hub (downloaded once, cached by hf-hub).
//!
//! ## Loading Process:
//! 1. Resolve config.json, tokenizer.json, model.safetensors
//! 2. Build the mel filter bank for the model's bin count
//! 3. Initialize weights on the target device
//!
//! ## Decoding:
//! Greedy decode with a repetition guard. The decoder keeps a KV cache
//! between steps, which makes `transcribe` take `&mut self`; callers
//! serialize access (see `engine`).

use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, audio, Config};
use tokenizers::Tokenizer;
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

/// Available Whisper model sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// HuggingFace model repository for this size.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }

    /// Approximate weight size in MB.
    pub fn size_mb(&self) -> u32 {
        match self {
            ModelSize::Tiny => 39,
            ModelSize::Base => 74,
            ModelSize::Small => 244,
            ModelSize::Medium => 769,
            ModelSize::Large => 1550,
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// Resolved locations of the three files a model load needs.
struct ModelAssets {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

/// A loaded Whisper model ready for decoding.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    size: ModelSize,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,

    // Special token ids resolved from the tokenizer at load time
    sot_token: u32,
    eot_token: u32,
    transcribe_token: u32,
    no_timestamps_token: u32,
    language_token: Option<u32>,
}

impl WhisperModel {
    /// Load a model from a local asset directory, or from the hub when no
    /// directory is configured.
    pub async fn load(
        size: ModelSize,
        model_dir: Option<&Path>,
        language: Option<&str>,
        device: Device,
    ) -> Result<Self> {
        tracing::info!("Loading Whisper {} model (~{}MB)...", size, size.size_mb());
        let start_time = std::time::Instant::now();

        let assets = match model_dir {
            Some(dir) => Self::local_assets(dir)?,
            None => Self::hub_assets(size).await?,
        };

        let config: Config = serde_json::from_reader(std::fs::File::open(&assets.config)?)?;

        let tokenizer = Tokenizer::from_file(&assets.tokenizer)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let mel_filters = mel_filter_bank(config.num_mel_bins as usize);

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[assets.weights], m::DTYPE, &device)?
        };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        let sot_token = special_token(&tokenizer, m::SOT_TOKEN)?;
        let eot_token = special_token(&tokenizer, m::EOT_TOKEN)?;
        let transcribe_token = special_token(&tokenizer, m::TRANSCRIBE_TOKEN)?;
        let no_timestamps_token = special_token(&tokenizer, m::NO_TIMESTAMPS_TOKEN)?;
        let language_token =
            language.and_then(|lang| tokenizer.token_to_id(&format!("<|{}|>", lang)));

        tracing::info!(
            "Whisper {} model loaded in {:.2}s",
            size,
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self {
            model,
            config,
            device,
            size,
            tokenizer,
            mel_filters,
            sot_token,
            eot_token,
            transcribe_token,
            no_timestamps_token,
            language_token,
        })
    }

    /// Resolve model files from a local directory.
    fn local_assets(dir: &Path) -> Result<ModelAssets> {
        let assets = ModelAssets {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        };

        for path in [&assets.config, &assets.tokenizer, &assets.weights] {
            if !path.exists() {
                return Err(anyhow!(
                    "Model asset missing from {}: {}",
                    dir.display(),
                    path.display()
                ));
            }
        }

        tracing::info!("Using local model assets from {}", dir.display());
        Ok(assets)
    }

    /// Download (or reuse cached) model files from the HuggingFace hub.
    async fn hub_assets(size: ModelSize) -> Result<ModelAssets> {
        use hf_hub::api::tokio::ApiBuilder;

        let mut builder = ApiBuilder::new().with_progress(false);
        if let Ok(token) = std::env::var("HF_TOKEN") {
            builder = builder.with_token(Some(token));
        }
        let api = builder
            .build()
            .map_err(|e| anyhow!("Failed to initialize HuggingFace API: {}", e))?;

        let repo = api.model(size.repo_name().to_string());
        tracing::info!("Fetching model files from {}", size.repo_name());

        let config = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to fetch config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to fetch tokenizer.json from {}: {}", size.repo_name(), e))?;
        let weights = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to fetch weights from {}: {}", size.repo_name(), e))?;

        Ok(ModelAssets {
            config,
            tokenizer,
            weights,
        })
    }

    /// Decode one audio window to text.
    ///
    /// ## Audio Requirements:
    /// - 16kHz mono, 32-bit floats in [-1.0, 1.0]
    /// - Windows up to ~30 seconds (longer input is truncated by the mel
    ///   framing)
    ///
    /// Returns an empty string when the model heard nothing worth
    /// reporting; errors are reserved for actual decode failures.
    pub fn transcribe(&mut self, audio_data: &[f32]) -> Result<String> {
        if audio_data.is_empty() {
            return Err(anyhow!("Audio window is empty"));
        }

        let start_time = std::time::Instant::now();

        // Mel features
        let mel = audio::pcm_to_mel(&self.config, audio_data, &self.mel_filters);
        let mel_len = mel.len();
        let n_mels = self.config.num_mel_bins as usize;
        let mel = Tensor::from_vec(mel, (1, n_mels, mel_len / n_mels), &self.device)?;

        // Encoder
        let encoder_output = self.model.encoder.forward(&mel, true)?;

        // Decoder prompt: SOT [language] task no-timestamps
        let mut tokens = vec![self.sot_token];
        if let Some(lang) = self.language_token {
            tokens.push(lang);
        }
        tokens.push(self.transcribe_token);
        tokens.push(self.no_timestamps_token);

        const MAX_DECODE_TOKENS: usize = 224;

        let mut output_tokens: Vec<u32> = Vec::new();

        for step in 0..MAX_DECODE_TOKENS {
            let token_tensor = Tensor::new(&tokens[..], &self.device)?.unsqueeze(0)?;
            // flush on the first step resets the decoder KV cache
            let logits = self
                .model
                .decoder
                .forward(&token_tensor, &encoder_output, step == 0)?;

            let last_logits = logits.i((0, tokens.len() - 1, ..))?;
            let next_token = last_logits.argmax(0)?.to_scalar::<u32>()?;

            if next_token == self.eot_token {
                break;
            }

            if is_repetitive(&output_tokens, next_token) {
                tracing::debug!("Stopping decode at step {} on repetition", step);
                break;
            }

            tokens.push(next_token);
            output_tokens.push(next_token);
        }

        let text = self.decode_tokens(&output_tokens)?;

        tracing::debug!(
            "Decoded {:.2}s window in {:.2}s: '{}'",
            audio_data.len() as f64 / m::SAMPLE_RATE as f64,
            start_time.elapsed().as_secs_f64(),
            text
        );

        Ok(text)
    }

    /// Model size this instance was loaded with.
    pub fn size(&self) -> ModelSize {
        self.size
    }

    /// Turn decoded tokens into cleaned text.
    fn decode_tokens(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        Ok(text.trim().to_string())
    }
}

/// Look up a special token id, failing loudly when the tokenizer does not
/// know it (wrong tokenizer file for the model).
fn special_token(tokenizer: &Tokenizer, token: &str) -> Result<u32> {
    tokenizer
        .token_to_id(token)
        .ok_or_else(|| anyhow!("Tokenizer has no id for {}", token))
}

/// Stop when the tail of the output degenerates into a loop: the same
/// token three times in a row, or the same 3-gram twice.
fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
    let n = tokens.len();

    if n >= 2 && tokens[n - 1] == new_token && tokens[n - 2] == new_token {
        return true;
    }

    if n >= 5 {
        let candidate = [tokens[n - 2], tokens[n - 1], new_token];
        let previous = &tokens[n - 5..n - 2];
        if previous == candidate {
            return true;
        }
    }

    false
}

/// Triangular mel filter bank over the 201 FFT bins of Whisper's 400-point
/// STFT, laid out as `n_mels x 201` row-major (the layout `pcm_to_mel`
/// expects).
fn mel_filter_bank(n_mels: usize) -> Vec<f32> {
    const N_FFT_BINS: usize = m::N_FFT / 2 + 1;
    const F_MAX: f32 = m::SAMPLE_RATE as f32 / 2.0;

    fn hz_to_mel(hz: f32) -> f32 {
        2595.0 * (1.0 + hz / 700.0).log10()
    }
    fn mel_to_hz(mel: f32) -> f32 {
        700.0 * (10f32.powf(mel / 2595.0) - 1.0)
    }

    // n_mels + 2 evenly spaced points on the mel scale
    let mel_max = hz_to_mel(F_MAX);
    let points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect();

    let bin_hz = F_MAX / (N_FFT_BINS - 1) as f32;
    let mut filters = vec![0.0f32; n_mels * N_FFT_BINS];

    for mel_idx in 0..n_mels {
        let (left, center, right) = (points[mel_idx], points[mel_idx + 1], points[mel_idx + 2]);
        for bin in 0..N_FFT_BINS {
            let freq = bin as f32 * bin_hz;
            let weight = if freq >= left && freq <= center && center > left {
                (freq - left) / (center - left)
            } else if freq > center && freq <= right && right > center {
                (right - freq) / (right - center)
            } else {
                0.0
            };
            // Slaney-style area normalization
            let norm = 2.0 / (right - left);
            filters[mel_idx * N_FFT_BINS + bin] = weight * norm;
        }
    }

    filters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_size_parsing() {
        assert_eq!("tiny".parse::<ModelSize>().unwrap(), ModelSize::Tiny);
        assert_eq!("LARGE".parse::<ModelSize>().unwrap(), ModelSize::Large);
        assert!("enormous".parse::<ModelSize>().is_err());
    }

    #[test]
    fn test_repetition_guard() {
        // Same token three times
        assert!(is_repetitive(&[5, 5], 5));
        assert!(!is_repetitive(&[5, 6], 5));

        // Same 3-gram twice
        assert!(is_repetitive(&[1, 2, 3, 1, 2], 3));
        assert!(!is_repetitive(&[1, 2, 3, 1, 2], 4));

        // Too short to loop
        assert!(!is_repetitive(&[9], 9));
    }

    #[test]
    fn test_mel_filter_bank_shape() {
        let filters = mel_filter_bank(80);
        assert_eq!(filters.len(), 80 * 201);

        // Every filter should have some mass
        for mel_idx in 0..80 {
            let row = &filters[mel_idx * 201..(mel_idx + 1) * 201];
            assert!(row.iter().any(|&w| w > 0.0), "filter {} is empty", mel_idx);
        }
    }
}
