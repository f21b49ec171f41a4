//! Chat session: transcript, draft and the one-exchange-at-a-time guard.
//!
//! An exchange moves Idle → Pending through [`ChatSession::begin`], which mints
//! the only [`PendingExchange`] token, and back to Idle through
//! [`ChatSession::finish`], which consumes it. [`ChatSession::submit`] runs
//! both around a backend call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::{ApiError, ChatBackend};
use crate::config::Config;
use crate::messages::{ChatReply, Source};

/// Transcript entry shown when an exchange fails for any reason.
pub const APOLOGY: &str = "Sorry, something went wrong. Please try again.";

/// Used when the backend replies without an answer.
pub const DEFAULT_ANSWER_PLACEHOLDER: &str =
    "The knowledge base returned no answer for this question.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One transcript entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    id: String,
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// What to hand the sources callback when a reply carries no sources.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DefaultSources {
    #[default]
    Empty,
    Fixed(Vec<Source>),
}

impl DefaultSources {
    fn sources(&self) -> Vec<Source> {
        match self {
            DefaultSources::Empty => Vec::new(),
            DefaultSources::Fixed(sources) => sources.clone(),
        }
    }
}

/// Per-session behavior: which endpoint to ask and which fallbacks to use.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub endpoint: String,
    pub answer_placeholder: String,
    pub default_sources: DefaultSources,
}

impl SessionOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            answer_placeholder: DEFAULT_ANSWER_PLACEHOLDER.into(),
            default_sources: DefaultSources::Empty,
        }
    }

    /// Session asking the configured chat endpoint.
    pub fn chat(config: &Config) -> Self {
        Self::new(config.api.endpoints.chat.clone())
    }

    /// Session asking the configured sources endpoint.
    pub fn sources(config: &Config) -> Self {
        Self::new(config.api.endpoints.sources.clone())
    }

    pub fn with_answer_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.answer_placeholder = placeholder.into();
        self
    }

    pub fn with_default_sources(mut self, default_sources: DefaultSources) -> Self {
        self.default_sources = default_sources;
        self
    }
}

/// Proof that an exchange is in flight. Only one exists per session at a time.
#[derive(Debug)]
#[must_use = "a pending exchange must be passed to ChatSession::finish"]
pub struct PendingExchange {
    id: Uuid,
    question: String,
}

impl PendingExchange {
    pub fn question(&self) -> &str {
        &self.question
    }
}

/// In-memory chat session.
#[derive(Debug)]
pub struct ChatSession {
    options: SessionOptions,
    transcript: Vec<Message>,
    draft: String,
    pending: Option<Uuid>,
}

impl ChatSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            transcript: Vec::new(),
            draft: String::new(),
            pending: None,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// True exactly while an exchange is pending.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether [`begin`](Self::begin) would accept the current draft.
    pub fn can_submit(&self) -> bool {
        !self.is_busy() && !self.draft.trim().is_empty()
    }

    /// Idle → Pending. Appends the user message, clears the draft and marks
    /// the session busy. Returns `None`, changing nothing, when busy or when
    /// the draft is blank.
    pub fn begin(&mut self) -> Option<PendingExchange> {
        if !self.can_submit() {
            return None;
        }
        let question = std::mem::take(&mut self.draft);
        self.transcript.push(Message::new(Role::User, question.clone()));
        let id = Uuid::new_v4();
        self.pending = Some(id);
        tracing::debug!(exchange = %id, "exchange started");
        Some(PendingExchange { id, question })
    }

    /// Pending → Idle. Appends the assistant message and returns it.
    ///
    /// On success `on_sources` is called once with the reply's sources (or the
    /// default-sources policy when the reply has none). On failure the error
    /// is logged, the apology is appended and `on_sources` is not called.
    /// A token that does not belong to this session's pending exchange is
    /// ignored and `None` is returned.
    pub fn finish<F>(
        &mut self,
        exchange: PendingExchange,
        result: Result<ChatReply, ApiError>,
        on_sources: F,
    ) -> Option<&Message>
    where
        F: FnOnce(Vec<Source>),
    {
        if self.pending != Some(exchange.id) {
            tracing::warn!(exchange = %exchange.id, "ignoring stale exchange");
            return None;
        }
        self.pending = None;

        match result {
            Ok(reply) => {
                let answer = reply
                    .answer
                    .filter(|a| !a.is_empty())
                    .unwrap_or_else(|| self.options.answer_placeholder.clone());
                let sources = reply
                    .sources
                    .unwrap_or_else(|| self.options.default_sources.sources());
                tracing::debug!(exchange = %exchange.id, sources = sources.len(), "exchange succeeded");
                self.transcript.push(Message::new(Role::Assistant, answer));
                on_sources(sources);
                self.transcript.last()
            }
            Err(e) => {
                tracing::error!(exchange = %exchange.id, error = %e, "chat exchange failed");
                self.transcript.push(Message::new(Role::Assistant, APOLOGY));
                self.transcript.last()
            }
        }
    }

    /// Pending → Idle without a reply, for an exchange whose token was lost.
    /// Appends the apology and returns true if an exchange was pending.
    pub fn abandon(&mut self) -> bool {
        let Some(id) = self.pending.take() else {
            return false;
        };
        tracing::warn!(exchange = %id, "chat exchange abandoned before a reply arrived");
        self.transcript.push(Message::new(Role::Assistant, APOLOGY));
        true
    }

    /// Submit the draft to `backend` and wait for the outcome.
    ///
    /// Returns the assistant message, or `None` if the submission was rejected.
    /// Dropping the future before it completes abandons the exchange.
    pub async fn submit<B, F>(&mut self, backend: &B, on_sources: F) -> Option<&Message>
    where
        B: ChatBackend + ?Sized,
        F: FnOnce(Vec<Source>),
    {
        let exchange = self.begin()?;
        let endpoint = self.options.endpoint.clone();
        let guard = AbandonOnDrop {
            session: self,
            armed: true,
        };
        let result = backend.ask(&endpoint, exchange.question()).await;
        guard.disarm();
        self.finish(exchange, result, on_sources)
    }
}

/// Abandons the pending exchange unless disarmed.
struct AbandonOnDrop<'a> {
    session: &'a mut ChatSession,
    armed: bool,
}

impl AbandonOnDrop<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.abandon();
        }
    }
}
