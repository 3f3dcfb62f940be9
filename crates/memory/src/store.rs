//! SQLite-backed session and turn storage.

use crate::types::{ChatTurn, TurnRole};
use chrono::{DateTime, Utc};
use colloquy_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Tenant-scoped conversation memory store.
///
/// Sessions are the correlation key threading retrieval and generation
/// across turns; the turn log is append-only. The connection is shared
/// behind a mutex; statements are short-lived, and turns within one
/// session are expected to arrive sequentially (the webhook pipeline
/// serializes per-session delivery).
#[derive(Clone)]
pub struct MemoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl MemoryStore {
    /// Open (or create) the memory store at the given path.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Memory(format!("Failed to open memory store: {}", e)))?;
        Self::bootstrap(conn)
    }

    /// Open an in-memory store (tests, stateless deployments).
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Memory(format!("Failed to open memory store: {}", e)))?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('user', 'ai')),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);
            "#,
        )
        .map_err(|e| AppError::Memory(format!("Failed to create memory tables: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Memory("Memory store lock poisoned".to_string()))
    }

    /// Create a new session for a tenant and return its id.
    pub fn create_session(&self, tenant_id: &str) -> AppResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (id, tenant_id, created_at) VALUES (?1, ?2, ?3)",
            params![id, tenant_id, Utc::now().to_rfc3339()],
        )
        .map_err(|e| AppError::Memory(format!("Failed to create session: {}", e)))?;

        tracing::debug!("Created session {} for tenant {}", id, tenant_id);
        Ok(id)
    }

    /// Look up the tenant that owns a session.
    ///
    /// Returns `None` for unknown sessions. Callers use this to refuse a
    /// session id presented under the wrong tenant.
    pub fn session_tenant(&self, session_id: &str) -> AppResult<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT tenant_id FROM sessions WHERE id = ?1")
            .map_err(|e| AppError::Memory(format!("Failed to prepare query: {}", e)))?;

        let mut rows = stmt
            .query(params![session_id])
            .map_err(|e| AppError::Memory(format!("Failed to query session: {}", e)))?;

        match rows
            .next()
            .map_err(|e| AppError::Memory(format!("Failed to read session row: {}", e)))?
        {
            Some(row) => {
                let tenant: String = row
                    .get(0)
                    .map_err(|e| AppError::Memory(format!("Failed to read tenant id: {}", e)))?;
                Ok(Some(tenant))
            }
            None => Ok(None),
        }
    }

    /// Append a turn to a session's transcript.
    pub fn append_turn(&self, session_id: &str, role: TurnRole, content: &str) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![session_id, role.as_str(), content, Utc::now().to_rfc3339()],
        )
        .map_err(|e| AppError::Memory(format!("Failed to append turn: {}", e)))?;

        Ok(())
    }

    /// Fetch the most recent `limit` turns, returned oldest -> newest.
    pub fn recent_turns(&self, session_id: &str, limit: usize) -> AppResult<Vec<ChatTurn>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, role, content, created_at FROM messages
                 WHERE session_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )
            .map_err(|e| AppError::Memory(format!("Failed to prepare query: {}", e)))?;

        let mut turns = Self::collect_turns(&mut stmt, params![session_id, limit as i64])?;
        // Rows arrive newest first; reverse into chronological order.
        turns.reverse();
        Ok(turns)
    }

    /// Fetch the full ordered transcript, oldest -> newest.
    pub fn full_transcript(&self, session_id: &str) -> AppResult<Vec<ChatTurn>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, session_id, role, content, created_at FROM messages
                 WHERE session_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )
            .map_err(|e| AppError::Memory(format!("Failed to prepare query: {}", e)))?;

        Self::collect_turns(&mut stmt, params![session_id])
    }

    /// Delete a session and its transcript.
    pub fn delete_session(&self, session_id: &str) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM messages WHERE session_id = ?1",
            params![session_id],
        )
        .map_err(|e| AppError::Memory(format!("Failed to delete messages: {}", e)))?;
        conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])
            .map_err(|e| AppError::Memory(format!("Failed to delete session: {}", e)))?;

        tracing::info!("Deleted session {} and its history", session_id);
        Ok(())
    }

    fn collect_turns<P: rusqlite::Params>(
        stmt: &mut rusqlite::Statement<'_>,
        params: P,
    ) -> AppResult<Vec<ChatTurn>> {
        let rows = stmt
            .query_map(params, |row| {
                let role_str: String = row.get(2)?;
                let created_at_str: String = row.get(4)?;
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    role_str,
                    row.get::<_, String>(3)?,
                    created_at_str,
                ))
            })
            .map_err(|e| AppError::Memory(format!("Failed to query turns: {}", e)))?;

        let mut turns = Vec::new();
        for row in rows {
            let (id, session_id, role_str, content, created_at_str) =
                row.map_err(|e| AppError::Memory(format!("Failed to read turn row: {}", e)))?;

            let role = TurnRole::parse(&role_str)?;
            let created_at = created_at_str
                .parse::<DateTime<Utc>>()
                .map_err(|e| AppError::Memory(format!("Invalid turn timestamp: {}", e)))?;

            turns.push(ChatTurn {
                id,
                session_id,
                role,
                content,
                created_at,
            });
        }

        Ok(turns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_session_round_trip() {
        let store = store();
        let session = store.create_session("tenant-a").unwrap();

        assert_eq!(
            store.session_tenant(&session).unwrap().as_deref(),
            Some("tenant-a")
        );
        assert!(store.session_tenant("missing").unwrap().is_none());
    }

    #[test]
    fn test_recent_turns_window_and_order() {
        let store = store();
        let session = store.create_session("tenant-a").unwrap();

        for i in 0..8 {
            store
                .append_turn(&session, TurnRole::User, &format!("q{}", i))
                .unwrap();
            store
                .append_turn(&session, TurnRole::Ai, &format!("a{}", i))
                .unwrap();
        }

        let recent = store.recent_turns(&session, 5).unwrap();
        assert_eq!(recent.len(), 5);
        // Oldest first within the window; the newest turn is last.
        assert_eq!(recent.last().unwrap().content, "a7");
        assert_eq!(recent[0].content, "a5");
    }

    #[test]
    fn test_full_transcript_is_chronological() {
        let store = store();
        let session = store.create_session("tenant-a").unwrap();

        store.append_turn(&session, TurnRole::User, "first").unwrap();
        store.append_turn(&session, TurnRole::Ai, "second").unwrap();
        store.append_turn(&session, TurnRole::User, "third").unwrap();

        let transcript = store.full_transcript(&session).unwrap();
        let contents: Vec<_> = transcript.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_delete_session_removes_transcript() {
        let store = store();
        let session = store.create_session("tenant-a").unwrap();
        store.append_turn(&session, TurnRole::User, "hello").unwrap();

        store.delete_session(&session).unwrap();

        assert!(store.session_tenant(&session).unwrap().is_none());
        assert!(store.full_transcript(&session).unwrap().is_empty());
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");

        let session = {
            let store = MemoryStore::open(&path).unwrap();
            let session = store.create_session("tenant-a").unwrap();
            store.append_turn(&session, TurnRole::User, "hello").unwrap();
            session
        };

        let reopened = MemoryStore::open(&path).unwrap();
        let transcript = reopened.full_transcript(&session).unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].content, "hello");
    }

    #[test]
    fn test_sessions_are_isolated() {
        let store = store();
        let a = store.create_session("tenant-a").unwrap();
        let b = store.create_session("tenant-b").unwrap();

        store.append_turn(&a, TurnRole::User, "for a").unwrap();
        store.append_turn(&b, TurnRole::User, "for b").unwrap();

        let turns_a = store.recent_turns(&a, 10).unwrap();
        assert_eq!(turns_a.len(), 1);
        assert_eq!(turns_a[0].content, "for a");
    }
}
