//! Rolling short-term transcript with archival into long-term memory.
//!
//! The transcript grows one user/character pair per turn. `archive`
//! compresses the whole transcript into a summary record in the
//! `conversations` collection and then truncates the transcript down to a
//! tail window, so the session carries recent context verbatim and older
//! context only through retrieval.

use chrono::Utc;
use fable_llm::provider::{CompletionRequest, LlmProvider};

use crate::error::Result;
use crate::memory::{UpsertOutcome, VectorMemory};
use crate::types::{Collection, Speaker, TranscriptEntry};

pub struct ConversationSession {
    transcript: Vec<TranscriptEntry>,
    max_summary_length: usize,
    keep_window: usize,
}

impl ConversationSession {
    pub fn new(max_summary_length: usize, keep_window: usize) -> Self {
        Self { transcript: Vec::new(), max_summary_length, keep_window }
    }

    /// Append one completed turn: the user message and the reply.
    pub fn push_pair(&mut self, user: &str, reply: &str) {
        self.transcript.push(TranscriptEntry::user(user));
        self.transcript.push(TranscriptEntry::character(reply));
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// The tail window of the transcript, newest last.
    pub fn recent(&self) -> &[TranscriptEntry] {
        let start = self.transcript.len().saturating_sub(self.keep_window);
        &self.transcript[start..]
    }

    /// Summarize the transcript and store it in the `conversations`
    /// collection, then truncate the transcript to the keep window.
    ///
    /// Returns `Ok(false)` on an empty transcript. On any error the
    /// transcript is left intact so the next turn retries with the same
    /// content.
    pub async fn archive(
        &mut self,
        llm: &dyn LlmProvider,
        memory: &VectorMemory,
        responder: &str,
    ) -> Result<bool> {
        if self.transcript.is_empty() {
            return Ok(false);
        }

        let log = self
            .transcript
            .iter()
            .map(|e| match e.speaker {
                Speaker::User => format!("User: {}", e.text),
                Speaker::Character => format!("{responder}: {}", e.text),
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = summary_prompt(&log, responder);
        let request = CompletionRequest::prompt(prompt, 512, 0.3);
        let response = llm.complete(request).await?;
        let summary = truncate_on_word(response.content.trim(), self.max_summary_length);

        let outcome = memory.upsert_one(Collection::Conversations, &summary).await?;
        match &outcome {
            UpsertOutcome::Skipped(id) => {
                tracing::debug!(id, "conversation summary already stored");
            }
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => {
                tracing::info!(id, len = summary.len(), "archived conversation summary");
            }
            UpsertOutcome::Failed(reason) => {
                tracing::warn!(reason = %reason, "conversation summary not stored");
            }
        }

        if self.transcript.len() > self.keep_window {
            let drop = self.transcript.len() - self.keep_window;
            self.transcript.drain(..drop);
        }
        Ok(true)
    }
}

fn summary_prompt(log: &str, responder: &str) -> String {
    let timestamp = Utc::now().format("%Y-%m-%d %H:%M UTC");
    format!(
        r#"Summarize this conversation between a user and {responder} (at {timestamp}):

{log}

Rules:
- Factual and concise, third person
- Keep names, decisions, and emotional beats
- No preamble, return only the summary text"#
    )
}

/// Truncate to at most `max` characters, backing up to the last word
/// boundary and appending an ellipsis. Short input passes through.
fn truncate_on_word(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let head: String = text.chars().take(max).collect();
    let cut = head.rfind(char::is_whitespace).unwrap_or(head.len());
    format!("{}...", head[..cut].trim_end())
}
