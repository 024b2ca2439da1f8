//! Character cast: extraction from source text and per-message resolution.

pub mod extractor;
pub mod resolver;
