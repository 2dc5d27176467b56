use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};

use crate::models::{ChatRecord, ChatSummary, Message};

pub const TITLE_MAX_CHARS: usize = 100;
const CHAT_ID_LEN: usize = 7;

/**
 * \brief Storage collaborator for finished chats.
 * \details Saving an id that already exists for the same user replaces the record (last write wins).
 */
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn save_chat(&self, record: ChatRecord) -> Result<()>;

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>>;

    async fn get_chat(&self, user_id: &str, chat_id: &str) -> Result<Option<ChatRecord>>;

    /** \brief Returns whether a chat was removed. */
    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<bool>;
}

/**
 * \brief Short random alphanumeric id for chats without a client id.
 */
pub fn new_chat_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CHAT_ID_LEN)
        .map(char::from)
        .collect()
}

pub fn chat_path(chat_id: &str) -> String {
    format!("/chat/{}", chat_id)
}

/**
 * \brief First `TITLE_MAX_CHARS` characters of `content`.
 */
pub fn derive_title(content: &str) -> String {
    content.chars().take(TITLE_MAX_CHARS).collect()
}

/**
 * \brief Builds the record saved once a stream completes.
 * \details System and function messages are dropped; the title comes from the first message left.
 */
pub fn build_chat_record(
    chat_id: Option<String>,
    user_id: &str,
    messages: &[Message],
    completion: String,
) -> Result<ChatRecord> {
    let visible = messages
        .iter()
        .filter(|m| m.role.is_visible())
        .cloned()
        .collect::<Vec<_>>();
    let first = visible
        .first()
        .ok_or_else(|| anyhow!("no user or assistant message to title the chat"))?;
    let title = derive_title(&first.content);
    let id = chat_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(new_chat_id);
    let path = chat_path(&id);

    Ok(ChatRecord {
        id,
        title,
        user_id: user_id.to_string(),
        path,
        messages: visible,
        completion,
        created_at: 0,
    })
}

/**
 * \brief Completion hook body: build the record and write it.
 */
pub async fn persist_completion(
    store: &dyn ChatStore,
    chat_id: Option<String>,
    user_id: &str,
    messages: &[Message],
    completion: String,
) -> Result<()> {
    let record = build_chat_record(chat_id, user_id, messages, completion)?;
    let chat_id = record.id.clone();
    let message_count = record.messages.len();
    let completion_len = record.completion.len();
    store.save_chat(record).await?;
    tracing::info!(
        chat_id = %chat_id,
        user_id = %user_id,
        messages = message_count,
        completion_len,
        "chat saved"
    );
    Ok(())
}
