use serde::{Deserialize, Serialize};

/// Base affect traits extracted from the source text. Immutable once the
/// character is created; the live [`AffectState`] evolves separately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Traits {
    pub arousal: f32,
    pub valence: f32,
}

impl Traits {
    /// Clamp both dimensions to [0.0, 1.0].
    pub fn normalized(self) -> Self {
        Self {
            arousal: self.arousal.clamp(0.0, 1.0),
            valence: self.valence.clamp(0.0, 1.0),
        }
    }
}

impl Default for Traits {
    fn default() -> Self {
        Self { arousal: 0.5, valence: 0.5 }
    }
}

/// A character extracted from the book. The name is the unique key,
/// compared case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub traits: Traits,
    pub summary: String,
}

impl Character {
    /// Case-insensitive lookup key.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Live emotional state of one character for the lifetime of a session.
/// Both values stay in [0.0, 1.0] after every update (clamp then decay).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffectState {
    pub arousal: f32,
    pub valence: f32,
}

impl AffectState {
    pub fn from_traits(traits: Traits) -> Self {
        let t = traits.normalized();
        Self { arousal: t.arousal, valence: t.valence }
    }

    /// Clamp both dimensions to [0.0, 1.0].
    pub fn clamp(&mut self) {
        self.arousal = self.arousal.clamp(0.0, 1.0);
        self.valence = self.valence.clamp(0.0, 1.0);
    }

    /// Multiply both dimensions by the decay rate. Applied after every
    /// update so emotions fade absent further stimulus.
    pub fn decay(&mut self, rate: f32) {
        self.arousal *= rate;
        self.valence *= rate;
    }
}

impl Default for AffectState {
    fn default() -> Self {
        Self { arousal: 0.5, valence: 0.5 }
    }
}

/// Message sentiment as extracted by the generative gateway.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sentiment {
    /// -1 (very negative) to 1 (very positive).
    pub polarity: f32,
    /// 0 (neutral) to 1 (extreme emotion).
    pub intensity: f32,
}

impl Sentiment {
    /// Neutral fallback used when the gateway fails or returns garbage.
    pub const NEUTRAL: Self = Self { polarity: 0.0, intensity: 0.5 };

    pub fn clamped(self) -> Self {
        Self {
            polarity: self.polarity.clamp(-1.0, 1.0),
            intensity: self.intensity.clamp(0.0, 1.0),
        }
    }
}

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    User,
    Character,
}

/// One line of the rolling short-term transcript. Append-only within a
/// session; the tail window survives archival.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
}

impl TranscriptEntry {
    pub fn user(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::User, text: text.into() }
    }

    pub fn character(text: impl Into<String>) -> Self {
        Self { speaker: Speaker::Character, text: text.into() }
    }
}

/// The named vector collections the system persists into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    /// Raw book passages.
    BookChunks,
    /// One record per extracted character (stringified character record).
    Characters,
    /// Compressed session summaries.
    Conversations,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Self::BookChunks, Self::Characters, Self::Conversations];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BookChunks => "book_chunks",
            Self::Characters => "characters",
            Self::Conversations => "conversations",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "book_chunks" => Some(Self::BookChunks),
            "characters" => Some(Self::Characters),
            "conversations" => Some(Self::Conversations),
            _ => None,
        }
    }
}
