//! Conversation history stores.
//!
//! Turns are append-only and keyed by (user, conversation). Reads return the
//! most recent turns, newest first.

use crate::types::{Role, Turn};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use docchat_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Turns read when the caller does not say otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 5;

/// Persistent conversation log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Record one turn.
    async fn append(&self, user_id: &str, conversation_id: &str, role: Role, content: &str) -> AppResult<()>;

    /// Up to `limit` most recent turns, newest first.
    async fn recent(&self, user_id: &str, conversation_id: &str, limit: usize) -> AppResult<Vec<Turn>>;
}

fn db_err(e: impl std::fmt::Display) -> AppError {
    AppError::History(e.to_string())
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHistoryStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(db_err)?;
        Self::init(conn)
    }

    /// Database that lives only as long as the store.
    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            CREATE TABLE IF NOT EXISTS chat_history (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chat_history_conversation
                ON chat_history (user_id, conversation_id, created_at);
            ",
        )
        .map_err(db_err)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn append_blocking(
        conn: &Mutex<Connection>,
        user_id: &str,
        conversation_id: &str,
        role: Role,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let conn = conn.lock().map_err(|_| db_err("connection lock poisoned"))?;
        conn.execute(
            "INSERT INTO chat_history (user_id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_id,
                conversation_id,
                role.as_str(),
                content,
                created_at.to_rfc3339_opts(SecondsFormat::Micros, true)
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn recent_blocking(
        conn: &Mutex<Connection>,
        user_id: &str,
        conversation_id: &str,
        limit: usize,
    ) -> AppResult<Vec<Turn>> {
        let conn = conn.lock().map_err(|_| db_err("connection lock poisoned"))?;
        let mut stmt = conn
            .prepare(
                "SELECT role, content, created_at FROM chat_history
                 WHERE user_id = ?1 AND conversation_id = ?2
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![user_id, conversation_id, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(db_err)?;

        let mut turns = Vec::new();
        for row in rows {
            let (role, content, created_at) = row.map_err(db_err)?;
            let role = Role::parse(&role).ok_or_else(|| db_err(format!("unknown role '{}'", role)))?;
            let timestamp = DateTime::parse_from_rfc3339(&created_at)
                .map_err(db_err)?
                .with_timezone(&Utc);
            turns.push(Turn {
                role,
                content,
                timestamp,
            });
        }
        Ok(turns)
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, user_id: &str, conversation_id: &str, role: Role, content: &str) -> AppResult<()> {
        let conn = Arc::clone(&self.conn);
        let (user_id, conversation_id, content) =
            (user_id.to_string(), conversation_id.to_string(), content.to_string());
        let created_at = Utc::now();

        tokio::task::spawn_blocking(move || {
            Self::append_blocking(&conn, &user_id, &conversation_id, role, &content, created_at)
        })
        .await
        .map_err(db_err)?
    }

    async fn recent(&self, user_id: &str, conversation_id: &str, limit: usize) -> AppResult<Vec<Turn>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = Arc::clone(&self.conn);
        let (user_id, conversation_id) = (user_id.to_string(), conversation_id.to_string());

        tokio::task::spawn_blocking(move || Self::recent_blocking(&conn, &user_id, &conversation_id, limit))
            .await
            .map_err(db_err)?
    }
}

/// Process-local store for tests and throwaway sessions.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    turns: Mutex<HashMap<(String, String), Vec<Turn>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, user_id: &str, conversation_id: &str, role: Role, content: &str) -> AppResult<()> {
        let mut turns = self.turns.lock().map_err(|_| db_err("history lock poisoned"))?;
        turns
            .entry((user_id.to_string(), conversation_id.to_string()))
            .or_default()
            .push(Turn {
                role,
                content: content.to_string(),
                timestamp: Utc::now(),
            });
        Ok(())
    }

    async fn recent(&self, user_id: &str, conversation_id: &str, limit: usize) -> AppResult<Vec<Turn>> {
        let turns = self.turns.lock().map_err(|_| db_err("history lock poisoned"))?;
        Ok(turns
            .get(&(user_id.to_string(), conversation_id.to_string()))
            .map(|log| log.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn exercise(store: &dyn HistoryStore) {
        store.append("u1", "c1", Role::User, "first question").await.unwrap();
        store.append("u1", "c1", Role::Assistant, "first answer").await.unwrap();
        store.append("u1", "c1", Role::User, "second question").await.unwrap();
        store.append("u1", "c2", Role::User, "other conversation").await.unwrap();
        store.append("u2", "c1", Role::User, "other user").await.unwrap();

        let turns = store.recent("u1", "c1", DEFAULT_HISTORY_LIMIT).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["second question", "first answer", "first question"]);
        assert_eq!(turns[1].role, Role::Assistant);

        let limited = store.recent("u1", "c1", 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].content, "second question");

        assert!(store.recent("u3", "c1", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        exercise(&InMemoryHistoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_in_memory_store() {
        exercise(&SqliteHistoryStore::in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".docchat").join("history.sqlite");

        {
            let store = SqliteHistoryStore::open(&path).unwrap();
            store.append("u", "c", Role::User, "hello").await.unwrap();
        }

        let reopened = SqliteHistoryStore::open(&path).unwrap();
        let turns = reopened.recent("u", "c", 5).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "hello");
    }
}
