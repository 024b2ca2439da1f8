use fable_llm::embedding::EmbedError;
use fable_llm::provider::LlmError;

use crate::memory::index::IndexError;

/// Error taxonomy for the core pipeline.
///
/// `Parse` is fatal only at upload-time character extraction; everywhere
/// else malformed structured output is handled locally as "no signal" and
/// never reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Empty or malformed user input. Reported to the caller, no side effects.
    #[error("invalid input: {0}")]
    Input(String),

    /// Embedding or generation gateway failure that survived local recovery
    /// (retry exhaustion, transport outage). Fails the turn with no
    /// transcript or memory mutation.
    #[error("gateway failure: {0}")]
    Gateway(String),

    /// Malformed structured output from a generative call.
    #[error("malformed model output: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<LlmError> for Error {
    fn from(e: LlmError) -> Self {
        Self::Gateway(e.to_string())
    }
}

impl From<EmbedError> for Error {
    fn from(e: EmbedError) -> Self {
        match e {
            EmbedError::EmptyInput => Self::Input("empty input".into()),
            other => Self::Gateway(other.to_string()),
        }
    }
}

impl From<IndexError> for Error {
    fn from(e: IndexError) -> Self {
        Self::Gateway(e.to_string())
    }
}
