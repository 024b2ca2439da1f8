//! Character resolution: which character is this message addressing?
//!
//! Ordered fallback chain, most specific first; each stage returns
//! `Option<Character>` and the first `Some` wins. The two LLM stages treat
//! gateway errors and malformed output as "no match" and fall through to
//! the literal scan; if nothing resolves the caller answers as a generic
//! assistant.

use fable_llm::provider::{CompletionRequest, LlmProvider};
use serde::Deserialize;

use crate::parse;
use crate::types::{Character, Speaker, TranscriptEntry};

#[derive(Deserialize)]
struct MatchReply {
    #[serde(rename = "match")]
    name: Option<String>,
    #[serde(default)]
    confidence: f32,
}

fn character_list(characters: &[Character]) -> String {
    characters
        .iter()
        .map(|c| format!("- {}: {}", c.name, c.summary))
        .collect::<Vec<_>>()
        .join("\n")
}

fn match_prompt(subject: &str, characters: &[Character]) -> String {
    format!(
        r#"Analyze this message and identify which character it's addressing:

Message: "{subject}"

Available characters:
{}

Rules:
1. Match based on name mentions OR contextual relevance
2. Consider nicknames, titles, and role references
3. If multiple matches, choose the most specific
4. If no match, return null

Respond ONLY with JSON format:
{{ "match": "character_name" | null, "confidence": 0.0-1.0 }}"#,
        character_list(characters)
    )
}

fn format_transcript(transcript: &[TranscriptEntry]) -> String {
    transcript
        .iter()
        .map(|e| match e.speaker {
            Speaker::User => format!("User: {}", e.text),
            Speaker::Character => format!("Character: {}", e.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve the addressed character, or `None` for the generic-assistant
/// escape hatch.
pub async fn resolve(
    llm: &dyn LlmProvider,
    characters: &[Character],
    message: &str,
    transcript: &[TranscriptEntry],
    confidence_floor: f32,
) -> Option<Character> {
    if characters.is_empty() {
        return None;
    }

    if let Some(c) = llm_match(llm, characters, message, confidence_floor).await {
        tracing::debug!(character = %c.name, "resolved by direct match");
        return Some(c);
    }

    if !transcript.is_empty() {
        let history = format_transcript(transcript);
        if let Some(c) = llm_match(llm, characters, &history, confidence_floor).await {
            tracing::debug!(character = %c.name, "resolved from conversation history");
            return Some(c);
        }
    }

    if let Some(c) = substring_match(characters, message) {
        tracing::debug!(character = %c.name, "resolved by literal name scan");
        return Some(c);
    }

    None
}

/// One LLM matching stage. Gateway error or unparseable output is "no
/// match", never an error.
async fn llm_match(
    llm: &dyn LlmProvider,
    characters: &[Character],
    subject: &str,
    confidence_floor: f32,
) -> Option<Character> {
    let request = CompletionRequest::prompt(match_prompt(subject, characters), 128, 0.0);
    let raw = match llm.complete(request).await {
        Ok(resp) => resp.content,
        Err(e) => {
            tracing::warn!(error = %e, "character match call failed, falling through");
            return None;
        }
    };

    let reply = parse_match_reply(&raw)?;
    if reply.confidence < confidence_floor {
        return None;
    }
    let name = reply.name?;
    characters
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(&name))
        .cloned()
}

fn parse_match_reply(raw: &str) -> Option<MatchReply> {
    let cleaned = parse::clean_json_response(raw);
    let object = parse::extract_json_object(&cleaned)?;
    serde_json::from_str(object).ok()
}

/// Literal fallback: first character whose name (or a name token of three
/// or more characters, so first names still hit) appears case-insensitively
/// in the message. List order wins.
fn substring_match(characters: &[Character], message: &str) -> Option<Character> {
    let lower = message.to_lowercase();
    characters
        .iter()
        .find(|c| {
            let name = c.name.to_lowercase();
            lower.contains(&name)
                || name
                    .split_whitespace()
                    .any(|token| token.len() >= 3 && lower.contains(token))
        })
        .cloned()
}
