//! Per-character emotional state machine.
//!
//! The state is a continuous (arousal, valence) point seeded from the
//! character's base traits; a discrete label is derived on read. Every
//! update clamps into [0, 1] and then decays both dimensions, so emotions
//! fade absent further stimulus.

use fable_llm::provider::{CompletionRequest, LlmProvider};

use crate::parse;
use crate::types::{AffectState, Sentiment, Traits};

/// Arousal gain per unit of message intensity.
const AROUSAL_GAIN: f32 = 0.4;
/// Valence gain per unit of message polarity.
const VALENCE_GAIN: f32 = 0.5;
/// Decay applied to both dimensions after every update.
const DECAY_RATE: f32 = 0.9;

/// Derived emotion label, classified from (arousal, valence) by fixed
/// thresholds. Table-driven, no learning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmotionLabel {
    Rage,
    Despair,
    Irritation,
    Ecstasy,
    Peace,
    Thrill,
    Panic,
    Boredom,
    Neutral,
}

impl EmotionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rage => "rage",
            Self::Despair => "despair",
            Self::Irritation => "irritation",
            Self::Ecstasy => "ecstasy",
            Self::Peace => "peace",
            Self::Thrill => "thrill",
            Self::Panic => "panic",
            Self::Boredom => "boredom",
            Self::Neutral => "neutral",
        }
    }
}

/// Emotional state machine for one character within one session.
#[derive(Debug, Clone)]
pub struct AffectEngine {
    state: AffectState,
}

impl AffectEngine {
    /// Seed arousal/valence from the character's base traits.
    pub fn new(traits: Traits) -> Self {
        Self { state: AffectState::from_traits(traits) }
    }

    pub fn state(&self) -> AffectState {
        self.state
    }

    /// Apply one sentiment reading: gain, clamp, then decay. The order
    /// matters — decay runs on the clamped value.
    pub fn apply(&mut self, sentiment: Sentiment) {
        let s = sentiment.clamped();
        self.state.arousal += s.intensity * AROUSAL_GAIN;
        self.state.valence += s.polarity * VALENCE_GAIN;
        self.state.clamp();
        self.state.decay(DECAY_RATE);
    }

    /// Extract sentiment for `message` from the gateway and apply it.
    /// Gateway failure or malformed output degrades to the neutral
    /// fallback — this never fails the caller.
    pub async fn update(&mut self, llm: &dyn LlmProvider, message: &str) {
        let sentiment = analyze_sentiment(llm, message).await;
        self.apply(sentiment);
    }

    /// Deterministic classification of the current state.
    pub fn label(&self) -> EmotionLabel {
        let AffectState { arousal, valence } = self.state;
        if valence < 0.35 {
            if arousal > 0.75 {
                EmotionLabel::Rage
            } else if arousal < 0.25 {
                EmotionLabel::Despair
            } else {
                EmotionLabel::Irritation
            }
        } else if valence > 0.65 {
            if arousal > 0.75 {
                EmotionLabel::Ecstasy
            } else if arousal < 0.25 {
                EmotionLabel::Peace
            } else {
                EmotionLabel::Thrill
            }
        } else if arousal > 0.7 {
            EmotionLabel::Panic
        } else if arousal < 0.3 {
            EmotionLabel::Boredom
        } else {
            EmotionLabel::Neutral
        }
    }
}

fn sentiment_prompt(text: &str) -> String {
    format!(
        r#"Analyze the sentiment of this text: "{text}"

Provide a JSON object with:
- "polarity": float from -1 (very negative) to 1 (very positive)
- "intensity": float from 0 (neutral) to 1 (extreme emotion)

Consider:
- Emotional keywords and their strength
- Context and connotations
- Punctuation and emphasis (e.g., "!" increases intensity)

Examples:
"I love this!" -> {{"polarity": 0.9, "intensity": 0.8}}
"This is awful" -> {{"polarity": -0.7, "intensity": 0.6}}

Return only the JSON object, no additional text:"#
    )
}

/// Ask the gateway for (polarity, intensity). Any failure — transport or
/// malformed JSON — yields [`Sentiment::NEUTRAL`].
pub async fn analyze_sentiment(llm: &dyn LlmProvider, text: &str) -> Sentiment {
    let request = CompletionRequest::prompt(sentiment_prompt(text), 128, 0.0);
    let raw = match llm.complete(request).await {
        Ok(resp) => resp.content,
        Err(e) => {
            tracing::warn!(error = %e, "sentiment analysis failed, using neutral fallback");
            return Sentiment::NEUTRAL;
        }
    };

    parse_sentiment(&raw).unwrap_or_else(|| {
        tracing::warn!("malformed sentiment output, using neutral fallback");
        Sentiment::NEUTRAL
    })
}

fn parse_sentiment(raw: &str) -> Option<Sentiment> {
    let cleaned = parse::clean_json_response(raw);
    let object = parse::extract_json_object(&cleaned)?;
    let value: serde_json::Value = serde_json::from_str(object).ok()?;
    let polarity = value.get("polarity").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
    let intensity = value.get("intensity").and_then(|v| v.as_f64()).unwrap_or(0.5) as f32;
    Some(Sentiment { polarity, intensity }.clamped())
}
