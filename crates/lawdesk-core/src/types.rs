use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Conversation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of a session's chat log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// ── Legal data ───────────────────────────────────────────────────────────

/// Which law.go.kr search target a keyword is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Statute,
    Precedent,
}

/// Declared per-index search targets; indices past the end fall back to precedent.
pub const KEYWORD_TARGETS: [ContentType; 2] = [ContentType::Statute, ContentType::Precedent];

impl ContentType {
    /// Value of the `target` query parameter.
    pub fn target(self) -> &'static str {
        match self {
            Self::Statute => "law",
            Self::Precedent => "prec",
        }
    }

    /// Label used in rendered excerpts.
    pub fn label(self) -> &'static str {
        match self {
            Self::Statute => "법령",
            Self::Precedent => "판례",
        }
    }

    pub fn for_keyword_index(index: usize) -> Self {
        KEYWORD_TARGETS
            .get(index)
            .copied()
            .unwrap_or(Self::Precedent)
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.target())
    }
}

/// A single statute or precedent hit, already truncated for prompting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalExcerpt {
    pub content_type: ContentType,
    pub title: String,
    pub body: String,
}

// ── Pipeline ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    KeywordExtraction,
    Retrieval,
    Filtering,
    Synthesis,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeywordExtraction => "keyword_extraction",
            Self::Retrieval => "retrieval",
            Self::Filtering => "filtering",
            Self::Synthesis => "synthesis",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a successful turn produced besides the assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReport {
    pub keywords: Vec<String>,
    /// Searches that returned a payload (regardless of how many items it held).
    pub retrievals_found: usize,
    pub filtered_context: String,
    pub report: String,
}

/// Progress notifications published while a turn runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineEvent {
    Stage {
        session: String,
        stage: Stage,
        message: String,
    },
    Retrieval {
        session: String,
        keyword: String,
        content_type: ContentType,
        found: bool,
    },
    Completed {
        session: String,
    },
    Failed {
        session: String,
        stage: Stage,
        error: String,
    },
}

impl PipelineEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::Stage { .. } => "stage",
            Self::Retrieval { .. } => "retrieval",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn session(&self) -> &str {
        match self {
            Self::Stage { session, .. }
            | Self::Retrieval { session, .. }
            | Self::Completed { session }
            | Self::Failed { session, .. } => session,
        }
    }
}
