use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::{path::PathBuf, thread, time::Duration};
use time::OffsetDateTime;

use crate::models::{ChatRecord, ChatSummary, Message, SessionUser};
use crate::persist::ChatStore;

pub const DEFAULT_DB_PATH: &str = "chatbridge.db";

/**
 * \brief Opens the SQLite file at `path`.
 */
pub fn open_db(path: &std::path::Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/**
 * \brief Creates the tables used for chats and sessions.
 */
pub fn migrate(conn: &Connection) -> Result<()> {
    retry_on_locked(|| {
        conn.execute_batch(
            r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS chats (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            title TEXT NOT NULL,
            path TEXT NOT NULL,
            completion TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chats_user ON chats(user_id, created_at);

        CREATE TABLE IF NOT EXISTS chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id TEXT NOT NULL REFERENCES chats(id),
            position INTEGER NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            user_name TEXT
        );
        "#,
        )
    })?;
    Ok(())
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/**
 * \brief Writes a chat and its messages in one transaction.
 * \details An existing id owned by the same user is overwritten; one owned by someone else is refused.
 */
pub fn save_chat(conn: &Connection, record: &ChatRecord) -> Result<i64> {
    let created_at = now_millis();
    let written = retry_on_locked(|| {
        let tx = conn.unchecked_transaction()?;
        let rows = tx.execute(
            "INSERT INTO chats (id, user_id, title, path, completion, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                title=excluded.title,
                path=excluded.path,
                completion=excluded.completion,
                created_at=excluded.created_at
             WHERE chats.user_id=excluded.user_id",
            params![
                record.id,
                record.user_id,
                record.title,
                record.path,
                record.completion,
                created_at
            ],
        )?;
        if rows == 0 {
            return Ok(false);
        }
        tx.execute(
            "DELETE FROM chat_messages WHERE chat_id=?1",
            params![record.id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chat_messages (chat_id, position, role, content) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, message) in record.messages.iter().enumerate() {
                stmt.execute(params![
                    record.id,
                    position as i64,
                    message.role.as_str(),
                    message.content
                ])?;
            }
        }
        tx.commit()?;
        Ok(true)
    })?;
    if !written {
        bail!("chat id {} belongs to another user", record.id);
    }
    Ok(created_at)
}

/**
 * \brief Loads one chat owned by `user_id`.
 */
pub fn load_chat(conn: &Connection, user_id: &str, chat_id: &str) -> Result<Option<ChatRecord>> {
    let head = conn
        .query_row(
            "SELECT id, user_id, title, path, completion, created_at FROM chats WHERE id=?1 AND user_id=?2",
            params![chat_id, user_id],
            |row| {
                Ok(ChatRecord {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    title: row.get(2)?,
                    path: row.get(3)?,
                    completion: row.get(4)?,
                    created_at: row.get(5)?,
                    messages: Vec::new(),
                })
            },
        )
        .optional()?;
    let Some(mut record) = head else {
        return Ok(None);
    };
    record.messages = load_messages(conn, chat_id)?;
    Ok(Some(record))
}

/**
 * \brief Reads the saved messages of a chat in order.
 */
pub fn load_messages(conn: &Connection, chat_id: &str) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT role, content FROM chat_messages WHERE chat_id=?1 ORDER BY position ASC",
    )?;
    let rows = stmt
        .query_map(params![chat_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter()
        .map(|(role, content)| -> Result<Message> {
            let role = role
                .parse::<crate::models::Role>()
                .map_err(|e| anyhow!("chat {}: {}", chat_id, e))?;
            Ok(Message { role, content })
        })
        .collect()
}

/**
 * \brief Lists a user's chats, newest first.
 */
pub fn list_chats(conn: &Connection, user_id: &str) -> Result<Vec<ChatSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, path, created_at FROM chats WHERE user_id=?1 ORDER BY created_at DESC, id ASC",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok(ChatSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                path: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/**
 * \brief Deletes a chat and its messages; returns whether it existed for this user.
 */
pub fn delete_chat(conn: &Connection, user_id: &str, chat_id: &str) -> Result<bool> {
    let removed = retry_on_locked(|| {
        let tx = conn.unchecked_transaction()?;
        let owned = tx
            .query_row(
                "SELECT 1 FROM chats WHERE id=?1 AND user_id=?2",
                params![chat_id, user_id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !owned {
            return Ok(false);
        }
        // children first; chat_messages.chat_id references chats(id)
        tx.execute(
            "DELETE FROM chat_messages WHERE chat_id=?1",
            params![chat_id],
        )?;
        tx.execute(
            "DELETE FROM chats WHERE id=?1 AND user_id=?2",
            params![chat_id, user_id],
        )?;
        tx.commit()?;
        Ok(true)
    })?;
    Ok(removed)
}

/**
 * \brief Stores a session token for a user.
 */
pub fn insert_session(
    conn: &Connection,
    token: &str,
    user_id: &str,
    user_name: Option<&str>,
) -> Result<()> {
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO sessions (token, user_id, user_name) VALUES (?1, ?2, ?3)",
            params![token, user_id, user_name],
        )
    })?;
    Ok(())
}

/**
 * \brief Resolves a session token to its user.
 */
pub fn find_session(conn: &Connection, token: &str) -> Result<Option<SessionUser>> {
    conn.query_row(
        "SELECT user_id, user_name FROM sessions WHERE token=?1",
        params![token],
        |row| {
            Ok(SessionUser {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

/**
 * \brief `ChatStore` over a SQLite file; each call opens its own connection off the async runtime.
 */
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /**
     * \brief Opens (and migrates) the database at `path`.
     */
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conn = open_db(&path)?;
        migrate(&conn)?;
        Ok(Self { path })
    }

    pub(crate) async fn with_conn<T, F>(&self, action: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open_db(&path)?;
            action(&conn)
        })
        .await
        .map_err(|e| anyhow!("storage task failed: {}", e))?
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn save_chat(&self, record: ChatRecord) -> Result<()> {
        self.with_conn(move |conn| save_chat(conn, &record).map(|_| ()))
            .await
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>> {
        let user_id = user_id.to_string();
        self.with_conn(move |conn| list_chats(conn, &user_id)).await
    }

    async fn get_chat(&self, user_id: &str, chat_id: &str) -> Result<Option<ChatRecord>> {
        let user_id = user_id.to_string();
        let chat_id = chat_id.to_string();
        self.with_conn(move |conn| load_chat(conn, &user_id, &chat_id))
            .await
    }

    async fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<bool> {
        let user_id = user_id.to_string();
        let chat_id = chat_id.to_string();
        self.with_conn(move |conn| delete_chat(conn, &user_id, &chat_id))
            .await
    }
}

/**
 * \brief Retry helper for SQLite lock contention.
 * \details Backs off on `database is locked` / busy errors, at most 6 attempts.
 */
fn retry_on_locked<T, F>(mut action: F) -> Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    const MAX_RETRIES: usize = 5;
    for attempt in 0..=MAX_RETRIES {
        match action() {
            Ok(value) => return Ok(value),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) && attempt < MAX_RETRIES =>
            {
                let backoff = Duration::from_millis(200 * (attempt as u64 + 1));
                thread::sleep(backoff);
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    unreachable!("retry_on_locked should have returned within the loop");
}
