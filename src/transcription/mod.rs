//! # Transcription Module
//!
//! Speech-to-text via Whisper on Candle: pure Rust, no whisper.cpp FFI.
//!
//! ## Key Components:
//! - **Model**: weight/tokenizer loading (local dir or HuggingFace hub),
//!   mel features, greedy decode
//! - **Engine**: the process-wide serialized decode entry point
//!
//! The model is loaded once at startup and shared by every connection.

pub mod engine;
pub mod model;

pub use engine::TranscriptionEngine;
