//! Gateway crate: generative completion and text embedding providers.
//!
//! The core never talks to a model API directly — it goes through the
//! `LlmProvider` and `EmbedProvider` traits defined here, so tests can swap
//! in deterministic mocks.

pub mod embedding;
pub mod http;
pub mod provider;
