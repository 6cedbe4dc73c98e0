//! Voiceflow analytics API access.
//!
//! This module provides the HTTP client, the paginated retrieval
//! loop built on top of it, and evaluation setup and batch runs.

pub mod client;
pub mod error;
pub mod evaluations;
pub mod paginator;

pub use client::{ClientConfig, VoiceflowClient};
pub use paginator::{Paginator, RetrievalOptions, SortOrder, StopReason, TranscriptFilter};
