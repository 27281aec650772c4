use crate::protocol::openai_chat::{
    ChatCompletionChunk, ChunkChoice, ChunkDelta, ChunkUsage, CHUNK_ID, FINISH_STOP,
    OBJECT_CHUNK, OBJECT_COMPLETION, ROLE_ASSISTANT,
};
use crate::util::unix_now_secs;

/// Values fixed for the lifetime of one translation and stamped on every chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkContext {
    created: u64,
    model: String,
}

impl ChunkContext {
    /// Start a context now for `model`.
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self::with_created(model, unix_now_secs())
    }

    #[must_use]
    pub fn with_created(model: impl Into<String>, created: u64) -> Self {
        Self {
            created,
            model: model.into(),
        }
    }

    #[must_use]
    pub fn created(&self) -> u64 {
        self.created
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Streaming chunk for one non-empty delta.
    #[must_use]
    pub fn wrap<'a>(&'a self, delta: &'a str) -> ChatCompletionChunk<'a> {
        self.envelope(
            OBJECT_CHUNK,
            ChunkDelta {
                role: Some(ROLE_ASSISTANT),
                content: Some(delta),
            },
            None,
        )
    }

    /// Final streaming chunk: empty delta, `finish_reason: "stop"`.
    #[must_use]
    pub fn wrap_terminal(&self) -> ChatCompletionChunk<'_> {
        self.envelope(OBJECT_CHUNK, ChunkDelta::default(), Some(FINISH_STOP))
    }

    /// Buffered reply: the whole content in one chunk, already stopped.
    #[must_use]
    pub fn wrap_completion<'a>(&'a self, content: &'a str) -> ChatCompletionChunk<'a> {
        self.envelope(
            OBJECT_COMPLETION,
            ChunkDelta {
                role: Some(ROLE_ASSISTANT),
                content: Some(content),
            },
            Some(FINISH_STOP),
        )
    }

    fn envelope<'a>(
        &'a self,
        object: &'static str,
        delta: ChunkDelta<'a>,
        finish_reason: Option<&'static str>,
    ) -> ChatCompletionChunk<'a> {
        ChatCompletionChunk {
            id: CHUNK_ID,
            object,
            created: self.created,
            model: &self.model,
            choices: [ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: ChunkUsage::default(),
            system_fingerprint: None,
        }
    }
}
