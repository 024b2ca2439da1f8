//! Character extraction from the source text.
//!
//! One structured LLM call at upload time. This is the one place a parse
//! failure is surfaced to the caller — without a cast the session cannot
//! run, and the upload should be retried.

use fable_llm::provider::{CompletionRequest, LlmProvider};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::parse;
use crate::types::{Character, Traits};

fn extraction_prompt(text: &str) -> String {
    format!(
        r#"Extract characters from this text: "{text}"

For each character, return:
- "name": string, the character's name
- "traits": object with only these two properties:
  - "arousal": float (0 to 1, emotional intensity)
  - "valence": float (0 to 1, emotional positivity, 0=negative, 1=positive)
- "summary": string, brief and direct yet detailed character description (max 100 words)

Rules:
- Base traits on text evidence only
- If no clear traits, use 0.5 for both arousal and valence
- Return JSON array only, no extra text

Example output:
[
    {{"name": "John", "traits": {{"arousal": 0.8, "valence": 0.2}}, "summary": "An angry soldier seeking revenge"}},
    {{"name": "Mary", "traits": {{"arousal": 0.3, "valence": 0.7}}, "summary": "A calm healer helping others"}}
]"#
    )
}

#[derive(Deserialize)]
struct RawCharacter {
    name: String,
    #[serde(default)]
    traits: Option<RawTraits>,
    #[serde(default)]
    summary: String,
}

#[derive(Deserialize)]
struct RawTraits {
    #[serde(default = "default_trait")]
    arousal: f32,
    #[serde(default = "default_trait")]
    valence: f32,
}

fn default_trait() -> f32 {
    0.5
}

/// Extract the cast of characters with base affect traits from `text`.
pub async fn extract(llm: &dyn LlmProvider, text: &str) -> Result<Vec<Character>> {
    if text.trim().is_empty() {
        return Err(Error::Input("book text must be non-empty".into()));
    }

    let request = CompletionRequest::prompt(extraction_prompt(text), 2048, 0.2);
    let response = llm.complete(request).await?;

    let characters = parse_characters(&response.content)?;
    tracing::info!(count = characters.len(), "extracted characters");
    Ok(characters)
}

/// Parse and normalize the extraction response. Trait values are clamped
/// to [0, 1]; missing traits default to 0.5/0.5.
pub fn parse_characters(raw: &str) -> Result<Vec<Character>> {
    let cleaned = parse::clean_json_response(raw);
    let array = parse::extract_json_array(&cleaned)
        .ok_or_else(|| Error::Parse("no JSON array in extraction output".into()))?;
    let parsed: Vec<RawCharacter> =
        serde_json::from_str(array).map_err(|e| Error::Parse(e.to_string()))?;

    Ok(parsed
        .into_iter()
        .filter(|r| !r.name.trim().is_empty())
        .map(|r| {
            let traits = r
                .traits
                .map(|t| Traits { arousal: t.arousal, valence: t.valence })
                .unwrap_or_default()
                .normalized();
            Character { name: r.name, traits, summary: r.summary }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fable_llm::provider::MockProvider;

    #[tokio::test]
    async fn extracts_characters_from_fenced_array() {
        let llm = MockProvider::new(
            "```json\n[\
             {\"name\": \"Tessie Hutchinson\", \"traits\": {\"arousal\": 0.7, \"valence\": 0.3}, \"summary\": \"Protests the lottery\"},\
             {\"name\": \"Bill Hutchinson\", \"traits\": {\"arousal\": 0.4, \"valence\": 0.5}, \"summary\": \"Her resigned husband\"}\
             ]\n```",
        );
        let chars = extract(&llm, "some book text").await.unwrap();
        assert_eq!(chars.len(), 2);
        assert_eq!(chars[0].name, "Tessie Hutchinson");
        assert!((chars[0].traits.valence - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn empty_text_is_input_error() {
        let llm = MockProvider::new("[]");
        assert!(matches!(extract(&llm, "  ").await, Err(Error::Input(_))));
    }

    #[test]
    fn missing_traits_default_to_neutral() {
        let chars = parse_characters("[{\"name\": \"Old Man Warner\"}]").unwrap();
        assert_eq!(chars.len(), 1);
        assert!((chars[0].traits.arousal - 0.5).abs() < 1e-6);
        assert!((chars[0].traits.valence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_traits_are_clamped() {
        let chars = parse_characters(
            "[{\"name\": \"X\", \"traits\": {\"arousal\": 1.9, \"valence\": -0.4}}]",
        )
        .unwrap();
        assert!((chars[0].traits.arousal - 1.0).abs() < 1e-6);
        assert!(chars[0].traits.valence.abs() < 1e-6);
    }

    #[test]
    fn nameless_entries_are_dropped() {
        let chars = parse_characters("[{\"name\": \"  \"}, {\"name\": \"Mary\"}]").unwrap();
        assert_eq!(chars.len(), 1);
        assert_eq!(chars[0].name, "Mary");
    }

    #[test]
    fn prose_without_array_is_parse_error() {
        assert!(matches!(
            parse_characters("I could not find any characters."),
            Err(Error::Parse(_))
        ));
    }
}
