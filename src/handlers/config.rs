use crate::{error::AppResult, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Read-only view of the effective configuration. There is no update
/// counterpart: configuration is fixed at process start.
pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port
            },
            "audio": {
                "sample_rate": config.audio.sample_rate,
                "default_input_rate": config.audio.default_input_rate,
                "input_format": config.audio.input_format,
                "decode_interval_secs": config.audio.decode_interval_secs,
                "overlap_secs": config.audio.overlap_secs,
                "min_buffer_secs": config.audio.min_buffer_secs
            },
            "models": {
                "whisper_model": config.models.whisper_model,
                "model_dir": config.models.model_dir,
                "language": config.models.language
            },
            "enrichment": {
                "model": config.enrichment.model,
                "max_tokens": config.enrichment.max_tokens,
                "temperature": config.enrichment.temperature,
                "api_base": config.enrichment.api_base
            }
        }
    })))
}
