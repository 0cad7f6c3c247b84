//! # Enrichment Module
//!
//! Turns fresh transcripts into supplementary "context" via an external
//! LLM completion endpoint. Dispatched as a detached task per transcript:
//! the ingestion loop never waits on it, and its failures never reach the
//! connection.
//!
//! ## Key Components:
//! - **Client**: reqwest call to the chat-completions endpoint
//! - **Prompt**: fuses the rolling transcript tail into the request
//! - **Extract**: strict-parse → bracket-scan → best-line ladder over the
//!   response

pub mod client;
pub mod extract;
pub mod prompt;

pub use client::{ContextPayload, EnrichmentClient};
