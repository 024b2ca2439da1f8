//! fable — character-grounded conversational agent.
//!
//! Ingests a book, extracts a cast of characters with affect traits, then
//! routes each user message to the most appropriate character, answers in
//! that character's voice, and evolves a per-character emotional state.
//! Long-term context lives in a vector similarity store instead of an
//! unbounded transcript.

pub mod affect;
pub mod book;
pub mod character;
pub mod config;
pub mod error;
pub mod memory;
pub mod parse;
pub mod pipeline;
pub mod session;
pub mod types;

pub use error::{Error, Result};
