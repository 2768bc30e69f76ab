//! Durable chat session and message store.
//!
//! Sessions are created or resumed by opaque UUID; messages are append-only
//! and owned exclusively by one session. History handed to the orchestrator
//! is always chronological oldest-first regardless of internal retrieval
//! order.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::{debug, info};
use uuid::Uuid;

use tally_core::error::TallyError;

use crate::db::Database;

/// Default title assigned to freshly created sessions.
pub const DEFAULT_SESSION_TITLE: &str = "New Session";

/// Persisted message roles. The transient function-result role used inside
/// a turn's conversation buffer is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// A chat session row.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: Uuid,
    pub user: Option<String>,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A persisted chat message row.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: Option<String>,
    pub created_at: i64,
}

/// Repository for chat sessions and their messages.
pub struct ChatStore {
    db: Arc<Database>,
}

impl ChatStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a new session with the default title and optional owner.
    pub fn create_session(&self, user: Option<&str>) -> Result<ChatSession, TallyError> {
        let session = ChatSession {
            id: Uuid::new_v4(),
            user: user.map(str::to_string),
            title: DEFAULT_SESSION_TITLE.to_string(),
            created_at: Utc::now().timestamp(),
            updated_at: Utc::now().timestamp(),
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_sessions (id, user, title, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    session.id.to_string(),
                    session.user,
                    session.title,
                    session.created_at,
                    session.updated_at,
                ],
            )
            .map_err(|e| TallyError::Storage(format!("Failed to create session: {}", e)))?;
            Ok(())
        })?;

        info!(session_id = %session.id, "Chat session created");
        Ok(session)
    }

    /// Find a session by ID.
    pub fn get_session(&self, id: Uuid) -> Result<Option<ChatSession>, TallyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, user, title, created_at, updated_at
                     FROM chat_sessions WHERE id = ?1",
                )
                .map_err(|e| TallyError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![id.to_string()], |row| {
                    Ok(row_to_session(row))
                })
                .optional()
                .map_err(|e| TallyError::Storage(e.to_string()))?;

            match result {
                Some(session) => Ok(Some(session?)),
                None => Ok(None),
            }
        })
    }

    /// Resolve an existing session or create a new one.
    ///
    /// An explicit identifier that does not resolve signals
    /// `SessionNotFound`; an absent identifier creates a fresh session.
    pub fn resolve_or_create_session(
        &self,
        id: Option<Uuid>,
        user: Option<&str>,
    ) -> Result<ChatSession, TallyError> {
        match id {
            Some(id) => self
                .get_session(id)?
                .ok_or(TallyError::SessionNotFound(id)),
            None => self.create_session(user),
        }
    }

    /// Load the most recent `limit` messages for a session, oldest-first.
    ///
    /// Returns fewer than `limit` when history is shorter, and an empty
    /// vector for a fresh session. Retrieval runs newest-first with a rowid
    /// tiebreak for same-second inserts, then reverses.
    pub fn load_recent_history(
        &self,
        session_id: Uuid,
        limit: u64,
    ) -> Result<Vec<StoredMessage>, TallyError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, session_id, role, content, created_at
                     FROM chat_messages
                     WHERE session_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2",
                )
                .map_err(|e| TallyError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(
                    rusqlite::params![session_id.to_string(), limit as i64],
                    |row| Ok(row_to_message(row)),
                )
                .map_err(|e| TallyError::Storage(e.to_string()))?;

            let mut messages = Vec::new();
            for row in rows {
                let msg = row.map_err(|e| TallyError::Storage(e.to_string()))??;
                messages.push(msg);
            }
            messages.reverse();
            Ok(messages)
        })
    }

    /// Append a message to a session.
    ///
    /// Content may be absent on degenerate error paths. Each call is one
    /// atomic insert; an unknown session signals `SessionNotFound`.
    pub fn append_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: Option<&str>,
    ) -> Result<StoredMessage, TallyError> {
        let message = StoredMessage {
            id: Uuid::new_v4(),
            session_id,
            role,
            content: content.map(str::to_string),
            created_at: Utc::now().timestamp(),
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chat_messages (id, session_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    message.id.to_string(),
                    message.session_id.to_string(),
                    message.role.as_str(),
                    message.content,
                    message.created_at,
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    TallyError::SessionNotFound(session_id)
                }
                other => TallyError::Storage(format!("Failed to append message: {}", other)),
            })?;
            Ok(())
        })?;

        debug!(session_id = %session_id, role = role.as_str(), "Message appended");
        Ok(message)
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<ChatSession, TallyError> {
    let id: String = row
        .get(0)
        .map_err(|e| TallyError::Storage(e.to_string()))?;
    Ok(ChatSession {
        id: Uuid::parse_str(&id)
            .map_err(|e| TallyError::Storage(format!("Malformed session id: {}", e)))?,
        user: row.get(1).map_err(|e| TallyError::Storage(e.to_string()))?,
        title: row.get(2).map_err(|e| TallyError::Storage(e.to_string()))?,
        created_at: row.get(3).map_err(|e| TallyError::Storage(e.to_string()))?,
        updated_at: row.get(4).map_err(|e| TallyError::Storage(e.to_string()))?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<StoredMessage, TallyError> {
    let id: String = row
        .get(0)
        .map_err(|e| TallyError::Storage(e.to_string()))?;
    let session_id: String = row
        .get(1)
        .map_err(|e| TallyError::Storage(e.to_string()))?;
    let role: String = row
        .get(2)
        .map_err(|e| TallyError::Storage(e.to_string()))?;

    Ok(StoredMessage {
        id: Uuid::parse_str(&id)
            .map_err(|e| TallyError::Storage(format!("Malformed message id: {}", e)))?,
        session_id: Uuid::parse_str(&session_id)
            .map_err(|e| TallyError::Storage(format!("Malformed session id: {}", e)))?,
        role: MessageRole::parse(&role)
            .ok_or_else(|| TallyError::Storage(format!("Unknown message role: {}", role)))?,
        content: row.get(3).map_err(|e| TallyError::Storage(e.to_string()))?,
        created_at: row.get(4).map_err(|e| TallyError::Storage(e.to_string()))?,
    })
}
