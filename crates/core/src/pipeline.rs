//! Turn orchestration: resolve the addressed character, update affect,
//! retrieve grounding, generate the reply, and archive the exchange.
//!
//! One [`Pipeline`] is shared across sessions; all per-conversation state
//! (cast, affect engines, transcript) lives in the [`Session`].

use std::collections::HashMap;
use std::sync::Arc;

use fable_llm::embedding::EmbedProvider;
use fable_llm::provider::{CompletionRequest, LlmProvider};
use uuid::Uuid;

use crate::affect::{AffectEngine, EmotionLabel};
use crate::book;
use crate::character::{extractor, resolver};
use crate::config::FableCfg;
use crate::error::{Error, Result};
use crate::memory::{Retriever, VectorIndex, VectorMemory};
use crate::session::ConversationSession;
use crate::types::{AffectState, Character, Collection, Speaker, TranscriptEntry};

/// Result of one chat turn. `character` and `emotion` are absent on the
/// generic-assistant fallback.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub character: Option<String>,
    pub emotion: Option<(AffectState, EmotionLabel)>,
}

/// Per-conversation state: cast, one affect engine per character keyed by
/// lowercase name, and the rolling transcript.
pub struct Session {
    pub id: Uuid,
    characters: Vec<Character>,
    affect: HashMap<String, AffectEngine>,
    conversation: ConversationSession,
}

impl Session {
    pub fn new(cfg: &FableCfg) -> Self {
        Self {
            id: Uuid::new_v4(),
            characters: Vec::new(),
            affect: HashMap::new(),
            conversation: ConversationSession::new(cfg.max_summary_length, cfg.transcript_keep),
        }
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    pub fn conversation(&self) -> &ConversationSession {
        &self.conversation
    }

    /// Replace the cast and reseed every affect engine from base traits.
    fn install_cast(&mut self, characters: Vec<Character>) {
        self.affect = characters
            .iter()
            .map(|c| (c.key(), AffectEngine::new(c.traits)))
            .collect();
        self.characters = characters;
    }

    fn engine(&mut self, character: &Character) -> &mut AffectEngine {
        self.affect
            .entry(character.key())
            .or_insert_with(|| AffectEngine::new(character.traits))
    }
}

pub struct Pipeline {
    llm: Arc<dyn LlmProvider>,
    memory: VectorMemory,
    retriever: Retriever,
    cfg: FableCfg,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbedProvider>,
        cfg: FableCfg,
    ) -> Self {
        let memory = VectorMemory::new(index.clone(), embedder.clone(), cfg.dedup_threshold);
        let retriever = Retriever::new(index, embedder);
        Self { llm, memory, retriever, cfg }
    }

    pub fn memory(&self) -> &VectorMemory {
        &self.memory
    }

    /// Ingest a book: chunk and store the text, extract the cast, persist
    /// each character record, and install the cast in the session.
    ///
    /// An empty extraction is an error — without a cast the session cannot
    /// answer in character, and the upload should be retried.
    pub async fn ingest_book(&self, session: &mut Session, text: &str) -> Result<Vec<Character>> {
        if text.trim().is_empty() {
            return Err(Error::Input("book text must be non-empty".into()));
        }

        let chunks = book::split_text(text, self.cfg.chunk_size, self.cfg.chunk_overlap);
        self.memory.upsert(Collection::BookChunks, &chunks).await?;
        tracing::info!(session = %session.id, chunks = chunks.len(), "book text stored");

        let characters = extractor::extract(self.llm.as_ref(), text).await?;
        if characters.is_empty() {
            return Err(Error::Parse("no characters found in book text".into()));
        }

        for character in &characters {
            let record =
                serde_json::to_string(character).map_err(|e| Error::Parse(e.to_string()))?;
            self.memory.upsert_one(Collection::Characters, &record).await?;
        }

        session.install_cast(characters.clone());
        tracing::info!(session = %session.id, cast = characters.len(), "cast installed");
        Ok(characters)
    }

    /// One chat turn. Empty input is rejected; everything downstream
    /// degrades rather than fails, except reply generation itself.
    pub async fn chat(&self, session: &mut Session, message: &str) -> Result<ChatReply> {
        if message.trim().is_empty() {
            return Err(Error::Input("message must be non-empty".into()));
        }

        if session.characters.is_empty() {
            self.recover_cast(session, message).await;
        }

        let resolved = resolver::resolve(
            self.llm.as_ref(),
            &session.characters,
            message,
            session.conversation.recent(),
            self.cfg.resolver_confidence,
        )
        .await;

        let Some(character) = resolved else {
            return self.generic_turn(session, message).await;
        };

        let engine = session.engine(&character);
        engine.update(self.llm.as_ref(), message).await;
        let (state, label) = (engine.state(), engine.label());

        let knowledge = self
            .retriever
            .retrieve(
                message,
                self.cfg.retrieval_threshold,
                self.cfg.retrieval_limit,
                &Collection::ALL,
            )
            .await?;

        let prompt = persona_prompt(
            &character,
            label,
            &knowledge,
            session.conversation.recent(),
            message,
        );
        let request = CompletionRequest::prompt(prompt, 1024, 0.7);
        let response = self.llm.complete(request).await?;
        let text = response.content.trim().to_owned();

        session.conversation.push_pair(message, &text);
        if let Err(e) = session
            .conversation
            .archive(self.llm.as_ref(), &self.memory, &character.name)
            .await
        {
            tracing::warn!(session = %session.id, error = %e, "archival failed, reply kept");
        }

        Ok(ChatReply {
            text,
            character: Some(character.name),
            emotion: Some((state, label)),
        })
    }

    /// No character addressed: answer as a plain assistant. No attribution,
    /// no affect update, and no memory writes — the exchange stays in the
    /// transcript only, where the next in-character turn archives it.
    async fn generic_turn(&self, session: &mut Session, message: &str) -> Result<ChatReply> {
        tracing::debug!(session = %session.id, "no character resolved, generic reply");
        let prompt = format!("You are a helpful assistant. User: {message}");
        let request = CompletionRequest::prompt(prompt, 1024, 0.7);
        let response = self.llm.complete(request).await?;
        let text = response.content.trim().to_owned();

        session.conversation.push_pair(message, &text);
        Ok(ChatReply { text, character: None, emotion: None })
    }

    /// Best effort: reload the cast from the `characters` collection when
    /// the in-memory list is empty (fresh session against an existing
    /// index). Failures leave the session generic.
    async fn recover_cast(&self, session: &mut Session, message: &str) {
        let records = match self
            .retriever
            .retrieve(
                message,
                self.cfg.retrieval_threshold,
                self.cfg.retrieval_limit,
                &[Collection::Characters],
            )
            .await
        {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(session = %session.id, error = %e, "cast recovery failed");
                return;
            }
        };

        let characters: Vec<Character> = records
            .iter()
            .filter_map(|r| serde_json::from_str(r).ok())
            .collect();
        if !characters.is_empty() {
            tracing::info!(session = %session.id, cast = characters.len(), "cast recovered");
            session.install_cast(characters);
        }
    }
}

fn persona_prompt(
    character: &Character,
    label: EmotionLabel,
    knowledge: &[String],
    recent: &[TranscriptEntry],
    message: &str,
) -> String {
    let knowledge = if knowledge.is_empty() {
        "(none)".to_owned()
    } else {
        knowledge.iter().map(|k| format!("- {k}")).collect::<Vec<_>>().join("\n")
    };
    let transcript = if recent.is_empty() {
        "(start of conversation)".to_owned()
    } else {
        recent
            .iter()
            .map(|e| match e.speaker {
                Speaker::User => format!("User: {}", e.text),
                Speaker::Character => format!("{}: {}", character.name, e.text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are {name}. {summary}

Your current emotional state is: {emotion}. Let it color your tone and word choice.

What you know that may be relevant:
{knowledge}

Recent conversation:
{transcript}

Stay fully in character as {name}. Never mention being an AI or a language model.

User: {message}
{name}:"#,
        name = character.name,
        summary = character.summary,
        emotion = label.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryIndex;
    use crate::types::Traits;
    use fable_llm::embedding::MockEmbedder;
    use fable_llm::provider::{ScriptStep, ScriptedProvider};

    fn cast() -> Vec<Character> {
        vec![Character {
            name: "Tessie Hutchinson".into(),
            traits: Traits { arousal: 0.5, valence: 0.5 },
            summary: "Protests the lottery".into(),
        }]
    }

    fn pipeline(llm: ScriptedProvider) -> Pipeline {
        Pipeline::new(
            Arc::new(llm),
            Arc::new(InMemoryIndex::new()),
            Arc::new(MockEmbedder::new(3)),
            FableCfg::default(),
        )
    }

    fn session_with_cast(cfg: &FableCfg) -> Session {
        let mut session = Session::new(cfg);
        session.install_cast(cast());
        session
    }

    /// Script for a full in-character turn: match, sentiment, reply, summary.
    fn full_turn_script(reply: &str) -> Vec<ScriptStep> {
        vec![
            ScriptStep::Reply("{\"match\": \"Tessie Hutchinson\", \"confidence\": 0.9}".into()),
            ScriptStep::Reply("{\"polarity\": -0.5, \"intensity\": 0.6}".into()),
            ScriptStep::Reply(reply.into()),
            ScriptStep::Reply("They talked about the lottery.".into()),
        ]
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let p = pipeline(ScriptedProvider::new(vec![]));
        let mut session = session_with_cast(&FableCfg::default());
        assert!(matches!(p.chat(&mut session, "   ").await, Err(Error::Input(_))));
        assert!(session.conversation().transcript().is_empty());
    }

    #[tokio::test]
    async fn full_turn_attributes_reply_and_emotion() {
        let p = pipeline(ScriptedProvider::new(full_turn_script("It isn't fair!")));
        let mut session = session_with_cast(&FableCfg::default());

        let reply = p.chat(&mut session, "Tessie, what do you think of the drawing?").await.unwrap();
        assert_eq!(reply.text, "It isn't fair!");
        assert_eq!(reply.character.as_deref(), Some("Tessie Hutchinson"));

        let (state, _) = reply.emotion.unwrap();
        // 0.5 + 0.6*0.4 = 0.74 -> 0.666; 0.5 - 0.5*0.5 = 0.25 -> 0.225
        assert!((state.arousal - 0.666).abs() < 1e-3);
        assert!((state.valence - 0.225).abs() < 1e-3);

        assert_eq!(session.conversation().transcript().len(), 2);
    }

    #[tokio::test]
    async fn generic_fallback_with_no_cast() {
        // no characters: resolve short-circuits, only the reply is generated
        let p = pipeline(ScriptedProvider::new(vec![
            ScriptStep::Reply("Happy to help.".into()),
        ]));
        let mut session = Session::new(&FableCfg::default());

        let reply = p.chat(&mut session, "what's the weather like?").await.unwrap();
        assert_eq!(reply.text, "Happy to help.");
        assert!(reply.character.is_none());
        assert!(reply.emotion.is_none());

        // escape hatch writes nothing to memory
        assert_eq!(p.memory().count(Collection::Conversations).await.unwrap(), 0);
        assert_eq!(session.conversation().transcript().len(), 2);
    }

    #[tokio::test]
    async fn generation_failure_leaves_transcript_untouched() {
        let p = pipeline(ScriptedProvider::new(vec![
            ScriptStep::Reply("{\"match\": \"Tessie Hutchinson\", \"confidence\": 0.9}".into()),
            ScriptStep::Reply("{\"polarity\": 0.0, \"intensity\": 0.0}".into()),
            ScriptStep::Fail("down".into()),
        ]));
        let mut session = session_with_cast(&FableCfg::default());

        assert!(p.chat(&mut session, "Tessie?").await.is_err());
        assert!(session.conversation().transcript().is_empty());
    }

    #[tokio::test]
    async fn archive_failure_still_returns_the_reply() {
        // summary call fails; the reply must survive and the transcript keep
        // the turn for the next archive attempt
        let p = pipeline(ScriptedProvider::new(vec![
            ScriptStep::Reply("{\"match\": \"Tessie Hutchinson\", \"confidence\": 0.9}".into()),
            ScriptStep::Reply("{\"polarity\": 0.0, \"intensity\": 0.0}".into()),
            ScriptStep::Reply("Still here.".into()),
            ScriptStep::Fail("down".into()),
        ]));
        let mut session = session_with_cast(&FableCfg::default());

        let reply = p.chat(&mut session, "Tessie, are you there?").await.unwrap();
        assert_eq!(reply.text, "Still here.");
        assert_eq!(session.conversation().transcript().len(), 2);
    }

    #[tokio::test]
    async fn ingest_installs_cast_and_stores_chunks() {
        let extraction = "[{\"name\": \"Tessie Hutchinson\", \
                          \"traits\": {\"arousal\": 0.6, \"valence\": 0.4}, \
                          \"summary\": \"Protests the lottery\"}]";
        let p = pipeline(ScriptedProvider::new(vec![ScriptStep::Reply(extraction.into())]));
        let mut session = Session::new(&FableCfg::default());

        let characters =
            p.ingest_book(&mut session, "The morning of June 27th was clear and sunny.").await.unwrap();
        assert_eq!(characters.len(), 1);
        assert_eq!(session.characters().len(), 1);
        assert!(p.memory().count(Collection::BookChunks).await.unwrap() >= 1);
        assert_eq!(p.memory().count(Collection::Characters).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ingest_with_no_characters_is_a_parse_error() {
        let p = pipeline(ScriptedProvider::new(vec![ScriptStep::Reply("[]".into())]));
        let mut session = Session::new(&FableCfg::default());
        assert!(matches!(
            p.ingest_book(&mut session, "A treatise on soil drainage.").await,
            Err(Error::Parse(_))
        ));
        assert!(session.characters().is_empty());
    }

    #[tokio::test]
    async fn ingest_empty_text_is_an_input_error() {
        let p = pipeline(ScriptedProvider::new(vec![]));
        let mut session = Session::new(&FableCfg::default());
        assert!(matches!(p.ingest_book(&mut session, "\n\n").await, Err(Error::Input(_))));
    }
}
