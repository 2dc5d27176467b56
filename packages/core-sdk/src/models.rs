use serde::{Deserialize, Serialize};

/**
 * \brief Message role; anything outside these four is rejected while decoding.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        }
    }

    /** \brief Roles that end up in the saved transcript. */
    pub fn is_visible(&self) -> bool {
        matches!(self, Role::User | Role::Assistant)
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "function" => Ok(Role::Function),
            other => Err(anyhow::anyhow!("unknown role: {}", other)),
        }
    }
}

/**
 * \brief Chat message, shaped like the OpenAI chat message format.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/**
 * \brief Per-request model selection and sampling temperature.
 */
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

/**
 * \brief Body accepted by both chat endpoints.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /** \brief Client-supplied chat id; generated when absent. */
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub chat_settings: Option<ChatSettings>,
    pub messages: Vec<Message>,
    /** \brief Overrides the server API key for this request only. */
    #[serde(default)]
    pub preview_token: Option<String>,
}

impl ChatRequest {
    pub fn requested_model(&self) -> Option<&str> {
        self.chat_settings
            .as_ref()
            .and_then(|s| s.model.as_deref())
            .filter(|m| !m.trim().is_empty())
    }

    pub fn requested_temperature(&self) -> Option<f64> {
        self.chat_settings.as_ref().and_then(|s| s.temperature)
    }

    pub fn preview_token(&self) -> Option<&str> {
        self.preview_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

/**
 * \brief Persisted chat transcript.
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub id: String,
    pub title: String,
    pub user_id: String,
    pub path: String,
    pub messages: Vec<Message>,
    pub completion: String,
    /** \brief Unix milliseconds, set by the store on write. */
    #[serde(default)]
    pub created_at: i64,
}

/**
 * \brief History list entry.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub path: String,
    pub created_at: i64,
}

/**
 * \brief Identity resolved from the current session.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub name: Option<String>,
}
