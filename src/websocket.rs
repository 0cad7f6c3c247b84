//! # Audio Stream Handler
//!
//! One WebSocket connection per client at `/ws/audio`. The client streams
//! JSON text frames; the server answers with transcription and context
//! messages on the same connection.
//!
//! ## Wire Protocol:
//! - **Client → Server**: `{"type": "metadata", "sampleRate": 44100}`
//!   reports the capture hardware rate, repeatable
//! - **Client → Server**: `{"type": "audio", "data": "<base64>"}` carries
//!   one raw sample payload (float32 or pcm16 per deployment)
//! - **Server → Client**: `{"type": "transcription", "text", "timestamp"}`
//! - **Server → Client**: `{"type": "context_partial", "json": {...}}`
//! - Unrecognized `type` tags and malformed JSON are dropped silently; a
//!   bad message never terminates the connection.
//!
//! ## Scheduling:
//! Each append re-evaluates the decode trigger. When it fires, the actor
//! snapshots the window and trims the buffer to the overlap synchronously
//! (cheap), then decodes on a background task so the next audio chunk is
//! accepted immediately. Enrichment runs as a second detached task per
//! non-empty transcript. Both kinds of task are aborted if the client
//! disconnects first.

use crate::audio::{ingest, resample, DecodeTrigger, InputFormat, SegmentBuffer};
use crate::config::AudioSettings;
use crate::enrichment::{ContextPayload, EnrichmentClient};
use crate::state::{AppState, DecodeOutcome};
use crate::transcription::TranscriptionEngine;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How many recent transcript fragments feed one enrichment prompt.
const RECENT_FRAGMENT_LIMIT: usize = 4;

/// Heartbeat ping cadence and the silence window after which a peer is
/// considered gone.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(90);

/// Inbound messages, classified by the `type` tag.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientMessage {
    /// Capture metadata; sets the resampling source rate
    #[serde(rename = "metadata")]
    Metadata {
        #[serde(rename = "sampleRate")]
        sample_rate: Option<u32>,
    },

    /// One base64 audio payload
    #[serde(rename = "audio")]
    Audio { data: String },

    /// Anything with an unrecognized tag, ignored silently
    #[serde(other)]
    Unknown,
}

/// Outbound messages.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ServerMessage {
    #[serde(rename = "transcription")]
    Transcription { text: String, timestamp: String },

    #[serde(rename = "context_partial")]
    ContextPartial { json: ContextPayload },
}

/// Per-connection ingestion state: buffer, trigger and source rate, owned
/// exclusively by the connection's actor. Kept free of actix types so the
/// scheduling behavior is testable as a plain state machine.
struct ConnectionState {
    buffer: SegmentBuffer,
    trigger: DecodeTrigger,
    input_rate: u32,
    input_format: InputFormat,
    target_rate: u32,
}

impl ConnectionState {
    fn new(audio: &AudioSettings, input_format: InputFormat, now: Instant) -> Self {
        Self {
            buffer: SegmentBuffer::new(audio.sample_rate, audio.overlap_secs),
            trigger: DecodeTrigger::new(
                Duration::from_secs_f64(audio.decode_interval_secs),
                Duration::from_secs_f64(audio.min_buffer_secs),
                now,
            ),
            input_rate: audio.default_input_rate,
            input_format,
            target_rate: audio.sample_rate,
        }
    }

    /// Record the client's reported hardware rate.
    fn set_input_rate(&mut self, rate: u32) {
        if rate > 0 {
            self.input_rate = rate;
        }
    }

    /// Decode, resample and buffer one audio payload, then evaluate the
    /// decode trigger. Returns the normalized window when a decode should
    /// run.
    fn ingest_payload(&mut self, payload: &str, now: Instant) -> Result<Option<Vec<f32>>> {
        let samples = ingest::decode_payload(payload, self.input_format)?;
        let resampled = resample::resample(&samples, self.input_rate, self.target_rate);
        self.buffer.append(&ingest::float_to_pcm(&resampled));

        let buffered = Duration::from_secs_f64(self.buffer.duration_seconds());
        if self.trigger.should_fire(buffered, now) {
            let window = self.buffer.drain_window();
            return Ok(Some(SegmentBuffer::window_to_float(&window)));
        }

        Ok(None)
    }

    /// Seconds of audio currently buffered.
    fn buffered_seconds(&self) -> f64 {
        self.buffer.duration_seconds()
    }
}

/// WebSocket actor owning one client's stream.
pub struct StreamSocket {
    conn: ConnectionState,
    engine: Arc<TranscriptionEngine>,
    enricher: Arc<EnrichmentClient>,
    state: AppState,

    /// Rolling tail of recent transcripts fed to enrichment
    recent_fragments: VecDeque<String>,

    /// In-flight decode/enrichment tasks, aborted on disconnect
    inflight: Vec<JoinHandle<()>>,

    last_heartbeat: Instant,
}

impl StreamSocket {
    pub fn new(
        state: AppState,
        engine: Arc<TranscriptionEngine>,
        enricher: Arc<EnrichmentClient>,
        input_format: InputFormat,
    ) -> Self {
        let config = state.get_config();
        Self {
            conn: ConnectionState::new(&config.audio, input_format, Instant::now()),
            engine,
            enricher,
            state,
            recent_fragments: VecDeque::new(),
            inflight: Vec::new(),
            last_heartbeat: Instant::now(),
        }
    }

    fn handle_metadata(&mut self, sample_rate: Option<u32>) {
        let default_rate = self.state.get_config().audio.default_input_rate;
        let rate = sample_rate.unwrap_or(default_rate);
        self.conn.set_input_rate(rate);
        info!("Client reported hardware sample rate: {}Hz", rate);
    }

    fn handle_audio(&mut self, payload: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match self.conn.ingest_payload(payload, Instant::now()) {
            Ok(Some(window)) => self.spawn_decode(window, ctx),
            Ok(None) => {}
            Err(err) => {
                // Drop the chunk, keep the stream.
                warn!("Dropping audio chunk: {}", err);
            }
        }
    }

    /// Run the speech model on a window without blocking ingestion.
    fn spawn_decode(&mut self, window: Vec<f32>, ctx: &mut ws::WebsocketContext<Self>) {
        self.inflight.retain(|handle| !handle.is_finished());

        debug!(
            "Decode trigger fired: {:.2}s window, {:.2}s retained",
            window.len() as f64 / self.state.get_config().audio.sample_rate as f64,
            self.conn.buffered_seconds()
        );

        let engine = self.engine.clone();
        let state = self.state.clone();
        let addr = ctx.address();

        let handle = tokio::spawn(async move {
            match engine.transcribe(&window).await {
                Ok(text) => {
                    let text = text.trim().to_string();
                    if text.is_empty() {
                        // No speech in the window; nothing to report.
                        state.record_decode(DecodeOutcome::Silent);
                    } else {
                        state.record_decode(DecodeOutcome::Transcribed);
                        addr.do_send(TranscriptReady {
                            text,
                            timestamp: chrono::Utc::now().to_rfc3339(),
                        });
                    }
                }
                Err(err) => {
                    // A failed decode is distinct from an empty one.
                    state.record_decode(DecodeOutcome::Failed);
                    error!("Window decode failed: {:#}", err);
                }
            }
        });

        self.inflight.push(handle);
    }

    /// Fire the enrichment call for the current transcript tail. Detached:
    /// its only output is a message back to this actor, and a dead actor
    /// just drops it.
    fn spawn_enrichment(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        self.inflight.retain(|handle| !handle.is_finished());

        let fragments: Vec<String> = self.recent_fragments.iter().cloned().collect();
        let enricher = self.enricher.clone();
        let state = self.state.clone();
        let addr = ctx.address();

        let handle = tokio::spawn(async move {
            match enricher.enrich(&fragments).await {
                Ok(Some(payload)) => {
                    state.record_enrichment(true);
                    addr.do_send(ContextReady(payload));
                }
                Ok(None) => {
                    state.record_enrichment(false);
                    debug!("No context produced for this cycle");
                }
                Err(err) => {
                    // Logged and swallowed; no retry, no client message.
                    state.record_enrichment(false);
                    warn!("Enrichment call failed: {:#}", err);
                }
            }
        });

        self.inflight.push(handle);
    }

    fn send_json(&self, message: &ServerMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(err) => error!("Failed to serialize outbound message: {}", err),
        }
    }
}

/// Decode result delivered back to the connection actor.
#[derive(Message)]
#[rtype(result = "()")]
struct TranscriptReady {
    text: String,
    timestamp: String,
}

/// Enrichment result delivered back to the connection actor.
#[derive(Message)]
#[rtype(result = "()")]
struct ContextReady(ContextPayload);

impl Actor for StreamSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("Stream connection opened");
        self.state.connection_opened();

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!("Stream heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Buffer and transcript tail die with the actor; in-flight work is
        // cancelled rather than left running for a client that is gone.
        for handle in self.inflight.drain(..) {
            handle.abort();
        }
        self.state.connection_closed();
        info!("Stream connection closed");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for StreamSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Metadata { sample_rate }) => self.handle_metadata(sample_rate),
                Ok(ClientMessage::Audio { data }) => self.handle_audio(&data, ctx),
                Ok(ClientMessage::Unknown) => {
                    debug!("Ignoring message with unrecognized type tag");
                }
                Err(err) => {
                    warn!("Dropping malformed message: {}", err);
                }
            },
            Ok(ws::Message::Binary(_)) => {
                // The protocol is JSON text frames only.
                warn!("Ignoring unexpected binary frame");
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!("Stream closed by client: {:?}", reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Ignoring unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!("WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<TranscriptReady> for StreamSocket {
    type Result = ();

    fn handle(&mut self, msg: TranscriptReady, ctx: &mut Self::Context) {
        self.recent_fragments.push_back(msg.text.clone());
        while self.recent_fragments.len() > RECENT_FRAGMENT_LIMIT {
            self.recent_fragments.pop_front();
        }

        self.send_json(
            &ServerMessage::Transcription {
                text: msg.text,
                timestamp: msg.timestamp,
            },
            ctx,
        );

        self.spawn_enrichment(ctx);
    }
}

impl Handler<ContextReady> for StreamSocket {
    type Result = ();

    fn handle(&mut self, msg: ContextReady, ctx: &mut Self::Context) {
        self.send_json(&ServerMessage::ContextPartial { json: msg.0 }, ctx);
    }
}

/// WebSocket endpoint handler: upgrades the HTTP request and hands the
/// connection to a fresh `StreamSocket`.
pub async fn stream_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    engine: web::Data<TranscriptionEngine>,
    enricher: web::Data<EnrichmentClient>,
) -> ActixResult<HttpResponse> {
    info!(
        "New stream connection from {:?}",
        req.connection_info().peer_addr()
    );

    let input_format = state
        .get_config()
        .audio
        .parsed_input_format()
        .map_err(actix_web::error::ErrorInternalServerError)?;

    let socket = StreamSocket::new(
        state.get_ref().clone(),
        engine.into_inner(),
        enricher.into_inner(),
        input_format,
    );

    ws::start(socket, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    fn default_audio() -> AudioSettings {
        AppConfig::default().audio
    }

    /// Base64-encode `seconds` of float32 samples at `rate`.
    fn chunk(seconds: f64, rate: u32, value: f32) -> String {
        let n = (seconds * rate as f64) as usize;
        let mut bytes = Vec::with_capacity(n * 4);
        for _ in 0..n {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        BASE64.encode(bytes)
    }

    #[test]
    fn metadata_message_parses() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "metadata", "sampleRate": 48000}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Metadata {
                sample_rate: Some(48000)
            }
        ));
    }

    #[test]
    fn metadata_without_rate_parses() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "metadata"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Metadata { sample_rate: None }));
    }

    #[test]
    fn unknown_type_tag_is_ignored_not_an_error() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "telemetry", "foo": 1}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Unknown));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(serde_json::from_str::<ClientMessage>("not json at all").is_err());
    }

    #[test]
    fn transcription_wire_shape() {
        let json = serde_json::to_value(ServerMessage::Transcription {
            text: "hello world".to_string(),
            timestamp: "2025-01-01T12:00:00+00:00".to_string(),
        })
        .unwrap();

        assert_eq!(json["type"], "transcription");
        assert_eq!(json["text"], "hello world");
        assert_eq!(json["timestamp"], "2025-01-01T12:00:00+00:00");
    }

    #[test]
    fn context_partial_wire_shape() {
        let json = serde_json::to_value(ServerMessage::ContextPartial {
            json: ContextPayload {
                context: "ctx".to_string(),
                model: "gpt-4o-mini".to_string(),
                generated_at: "2025-01-01T12:00:00+00:00".to_string(),
                source_len: 3,
            },
        })
        .unwrap();

        assert_eq!(json["type"], "context_partial");
        assert_eq!(json["json"]["context"], "ctx");
        assert_eq!(json["json"]["model"], "gpt-4o-mini");
        assert_eq!(json["json"]["source_len"], 3);
    }

    #[test]
    fn three_seconds_of_audio_never_triggers_a_decode() {
        // Interval 6s / min 2s defaults: three seconds of streaming sits
        // below the interval no matter how fast the chunks arrive.
        let start = Instant::now();
        let mut conn = ConnectionState::new(&default_audio(), InputFormat::Float32, start);
        conn.set_input_rate(44100);

        for i in 1..=3 {
            let window = conn
                .ingest_payload(&chunk(1.0, 44100, 0.0), start + Duration::from_secs(i))
                .unwrap();
            assert!(window.is_none(), "unexpected decode at t={}s", i);
        }
    }

    #[test]
    fn six_seconds_past_the_interval_triggers_exactly_one_decode() {
        let start = Instant::now();
        let mut conn = ConnectionState::new(&default_audio(), InputFormat::Float32, start);
        conn.set_input_rate(16000);

        let mut windows = Vec::new();
        for i in 1..=7 {
            if let Some(window) = conn
                .ingest_payload(&chunk(1.0, 16000, 0.1), start + Duration::from_secs(i))
                .unwrap()
            {
                windows.push((i, window));
            }
        }

        assert_eq!(windows.len(), 1, "expected exactly one decode window");
        let (fired_at, window) = &windows[0];
        assert_eq!(*fired_at, 6);
        assert_eq!(window.len(), 6 * 16000);
    }

    #[test]
    fn buffer_keeps_the_overlap_after_a_decode() {
        let start = Instant::now();
        let audio = default_audio();
        let mut conn = ConnectionState::new(&audio, InputFormat::Float32, start);
        conn.set_input_rate(16000);

        for i in 1..=6 {
            conn.ingest_payload(&chunk(1.0, 16000, 0.1), start + Duration::from_secs(i))
                .unwrap();
        }

        // One overlap's worth of audio remains for continuity.
        assert!((conn.buffered_seconds() - audio.overlap_secs).abs() < 1e-6);
    }

    #[test]
    fn resampling_applies_to_buffered_duration() {
        let start = Instant::now();
        let mut conn = ConnectionState::new(&default_audio(), InputFormat::Float32, start);
        conn.set_input_rate(44100);

        conn.ingest_payload(&chunk(1.0, 44100, 0.2), start + Duration::from_secs(1))
            .unwrap();

        // One second of 44.1kHz input is one second at 16kHz, give or take
        // a sample.
        assert!((conn.buffered_seconds() - 1.0).abs() < 1.0 / 16000.0 + 1e-9);
    }

    #[test]
    fn bad_payload_is_reported_but_state_survives() {
        let start = Instant::now();
        let mut conn = ConnectionState::new(&default_audio(), InputFormat::Float32, start);

        assert!(conn
            .ingest_payload("!!!not-base64!!!", start + Duration::from_secs(1))
            .is_err());
        assert_eq!(conn.buffered_seconds(), 0.0);

        // The connection keeps working afterwards.
        assert!(conn
            .ingest_payload(&chunk(0.5, 44100, 0.0), start + Duration::from_secs(2))
            .unwrap()
            .is_none());
        assert!(conn.buffered_seconds() > 0.0);
    }
}
