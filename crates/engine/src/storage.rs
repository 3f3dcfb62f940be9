//! SQLite-backed document storage with tenant isolation.
//!
//! Chunks are stored with their embedding as a little-endian f32 BLOB and
//! mirrored into an FTS5 table for the lexical search leg. All document
//! queries go through a [`TenantScope`] handle; there is no API that reads
//! documents without a tenant key, so a bug in query construction cannot
//! widen a read across tenants.

use chrono::Utc;
use colloquy_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A stored chunk row, as returned by the search legs.
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: String,
    pub filename: String,
    pub content: String,
}

/// Tenant and document storage.
#[derive(Clone)]
pub struct DocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl DocumentStore {
    /// Open (or create) the document store at the given path.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Storage(format!("Failed to open document store: {}", e)))?;
        Self::bootstrap(conn)
    }

    /// Open an in-memory store (tests).
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Storage(format!("Failed to open document store: {}", e)))?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                preferred_languages TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                filename TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_tenant ON documents(tenant_id);
            CREATE INDEX IF NOT EXISTS idx_documents_tenant_file
                ON documents(tenant_id, filename);

            CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
                content,
                chunk_id UNINDEXED,
                tenant_id UNINDEXED
            );
            "#,
        )
        .map_err(|e| AppError::Storage(format!("Failed to create document tables: {}", e)))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Storage("Document store lock poisoned".to_string()))
    }

    /// Create a tenant and return its id.
    pub fn create_tenant(
        &self,
        name: &str,
        preferred_languages: Option<&str>,
    ) -> AppResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tenants (id, name, preferred_languages, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, preferred_languages, Utc::now().to_rfc3339()],
        )
        .map_err(|e| AppError::Storage(format!("Failed to create tenant: {}", e)))?;

        tracing::info!("Created tenant '{}' ({})", name, id);
        Ok(id)
    }

    /// Fetch a tenant's preferred-language hint.
    pub fn tenant_languages(&self, tenant_id: &str) -> AppResult<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT preferred_languages FROM tenants WHERE id = ?1")
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let mut rows = stmt
            .query(params![tenant_id])
            .map_err(|e| AppError::Storage(format!("Failed to query tenant: {}", e)))?;

        match rows
            .next()
            .map_err(|e| AppError::Storage(format!("Failed to read tenant row: {}", e)))?
        {
            Some(row) => row
                .get::<_, Option<String>>(0)
                .map_err(|e| AppError::Storage(format!("Failed to read languages: {}", e))),
            None => Ok(None),
        }
    }

    /// Obtain the tenant-bound handle that all document access goes through.
    pub fn scope<'a>(&'a self, tenant_id: &'a str) -> TenantScope<'a> {
        TenantScope {
            store: self,
            tenant_id,
        }
    }
}

/// Tenant-bound document access.
///
/// Every query issued through this handle carries the scope's tenant id;
/// the handle is the isolation boundary.
pub struct TenantScope<'a> {
    store: &'a DocumentStore,
    tenant_id: &'a str,
}

impl TenantScope<'_> {
    /// The tenant this scope is bound to.
    pub fn tenant_id(&self) -> &str {
        self.tenant_id
    }

    /// Insert one chunk with its embedding. Returns the chunk id.
    pub fn insert_chunk(
        &self,
        filename: &str,
        content: &str,
        embedding: &[f32],
    ) -> AppResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.store.lock()?;
        conn.execute(
            "INSERT INTO documents (id, tenant_id, filename, content, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                self.tenant_id,
                filename,
                content,
                embedding_to_bytes(embedding),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::Storage(format!("Failed to insert chunk: {}", e)))?;

        conn.execute(
            "INSERT INTO documents_fts (content, chunk_id, tenant_id) VALUES (?1, ?2, ?3)",
            params![content, id, self.tenant_id],
        )
        .map_err(|e| AppError::Storage(format!("Failed to index chunk: {}", e)))?;

        Ok(id)
    }

    /// Nearest chunks by cosine distance to the query embedding, ascending.
    pub fn semantic_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
    ) -> AppResult<Vec<(StoredChunk, f32)>> {
        let conn = self.store.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, filename, content, embedding FROM documents WHERE tenant_id = ?1",
            )
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![self.tenant_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })
            .map_err(|e| AppError::Storage(format!("Failed to query chunks: {}", e)))?;

        let mut results: Vec<(StoredChunk, f32)> = Vec::new();
        for row in rows {
            let (id, filename, content, embedding_bytes) =
                row.map_err(|e| AppError::Storage(format!("Failed to read chunk row: {}", e)))?;

            let embedding = bytes_to_embedding(&embedding_bytes)?;
            let distance = 1.0 - cosine_similarity(query_embedding, &embedding);
            results.push((
                StoredChunk {
                    id,
                    filename,
                    content,
                },
                distance,
            ));
        }

        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);

        tracing::debug!(
            "Semantic search returned {} chunks for tenant {}",
            results.len(),
            self.tenant_id
        );
        Ok(results)
    }

    /// Chunks matching the query text, best lexical rank first (bm25).
    ///
    /// The raw query is reduced to a disjunction of quoted terms so that
    /// punctuation and FTS operators in natural-language questions cannot
    /// produce syntax errors.
    pub fn lexical_search(&self, query: &str, limit: usize) -> AppResult<Vec<StoredChunk>> {
        let match_query = match build_match_query(query) {
            Some(q) => q,
            None => return Ok(Vec::new()),
        };

        let conn = self.store.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT d.id, d.filename, d.content
                 FROM documents_fts
                 JOIN documents d ON d.id = documents_fts.chunk_id
                 WHERE documents_fts MATCH ?1 AND d.tenant_id = ?2
                 ORDER BY documents_fts.rank
                 LIMIT ?3",
            )
            .map_err(|e| AppError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map(params![match_query, self.tenant_id, limit as i64], |row| {
                Ok(StoredChunk {
                    id: row.get(0)?,
                    filename: row.get(1)?,
                    content: row.get(2)?,
                })
            })
            .map_err(|e| AppError::Storage(format!("Failed to query chunks: {}", e)))?;

        let mut results = Vec::new();
        for row in rows {
            results
                .push(row.map_err(|e| AppError::Storage(format!("Failed to read row: {}", e)))?);
        }

        tracing::debug!(
            "Lexical search returned {} chunks for tenant {}",
            results.len(),
            self.tenant_id
        );
        Ok(results)
    }

    /// Delete all chunks ingested under a filename. Returns the count.
    pub fn delete_by_filename(&self, filename: &str) -> AppResult<usize> {
        let conn = self.store.lock()?;
        conn.execute(
            "DELETE FROM documents_fts WHERE chunk_id IN
                 (SELECT id FROM documents WHERE tenant_id = ?1 AND filename = ?2)",
            params![self.tenant_id, filename],
        )
        .map_err(|e| AppError::Storage(format!("Failed to delete index rows: {}", e)))?;

        let deleted = conn
            .execute(
                "DELETE FROM documents WHERE tenant_id = ?1 AND filename = ?2",
                params![self.tenant_id, filename],
            )
            .map_err(|e| AppError::Storage(format!("Failed to delete chunks: {}", e)))?;

        Ok(deleted)
    }

    /// Delete every chunk belonging to this tenant. Returns the count.
    pub fn delete_all(&self) -> AppResult<usize> {
        let conn = self.store.lock()?;
        conn.execute(
            "DELETE FROM documents_fts WHERE tenant_id = ?1",
            params![self.tenant_id],
        )
        .map_err(|e| AppError::Storage(format!("Failed to delete index rows: {}", e)))?;

        let deleted = conn
            .execute(
                "DELETE FROM documents WHERE tenant_id = ?1",
                params![self.tenant_id],
            )
            .map_err(|e| AppError::Storage(format!("Failed to delete chunks: {}", e)))?;

        Ok(deleted)
    }

    /// Number of chunks stored for this tenant.
    pub fn chunk_count(&self) -> AppResult<u32> {
        let conn = self.store.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE tenant_id = ?1",
            params![self.tenant_id],
            |row| row.get::<_, i64>(0).map(|v| v as u32),
        )
        .map_err(|e| AppError::Storage(format!("Failed to count chunks: {}", e)))
    }
}

/// Reduce free text to an FTS5 match expression: quoted terms joined by OR.
///
/// Returns `None` when no searchable terms remain.
fn build_match_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Convert embedding vector to bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Storage(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    let mut embedding = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        embedding.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    Ok(embedding)
}

/// Calculate cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_tenant() -> (DocumentStore, String) {
        let store = DocumentStore::open_in_memory().unwrap();
        let tenant = store.create_tenant("acme", Some("en")).unwrap();
        (store, tenant)
    }

    #[test]
    fn test_tenant_languages() {
        let (store, tenant) = store_with_tenant();
        assert_eq!(store.tenant_languages(&tenant).unwrap().as_deref(), Some("en"));
        assert!(store.tenant_languages("missing").unwrap().is_none());
    }

    #[test]
    fn test_insert_and_semantic_search() {
        let (store, tenant) = store_with_tenant();
        let scope = store.scope(&tenant);

        scope
            .insert_chunk("a.md", "close to query", &[1.0, 0.0, 0.0])
            .unwrap();
        scope
            .insert_chunk("b.md", "orthogonal", &[0.0, 1.0, 0.0])
            .unwrap();

        let results = scope.semantic_search(&[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.content, "close to query");
        assert!(results[0].1 < results[1].1); // ascending distance
    }

    #[test]
    fn test_lexical_search_matches_terms() {
        let (store, tenant) = store_with_tenant();
        let scope = store.scope(&tenant);

        scope
            .insert_chunk("refunds.md", "Our refund window is 30 days.", &[1.0, 0.0])
            .unwrap();
        scope
            .insert_chunk("shipping.md", "Shipping takes 5 business days.", &[0.0, 1.0])
            .unwrap();

        let results = scope.lexical_search("refund window?", 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].filename, "refunds.md");
    }

    #[test]
    fn test_lexical_search_survives_punctuation() {
        let (store, tenant) = store_with_tenant();
        let scope = store.scope(&tenant);
        scope
            .insert_chunk("refunds.md", "Our refund window is 30 days.", &[1.0])
            .unwrap();

        // Apostrophes and FTS operators must not produce syntax errors.
        let results = scope.lexical_search("what's the \"refund\" (window)?", 5).unwrap();
        assert_eq!(results.len(), 1);

        let empty = scope.lexical_search("??? !!!", 5).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_tenant_isolation() {
        let store = DocumentStore::open_in_memory().unwrap();
        let tenant_a = store.create_tenant("a", None).unwrap();
        let tenant_b = store.create_tenant("b", None).unwrap();

        // B's chunk is lexically and semantically identical to the query.
        store
            .scope(&tenant_b)
            .insert_chunk("secret.md", "refund window secrets", &[1.0, 0.0])
            .unwrap();

        let scope_a = store.scope(&tenant_a);
        assert!(scope_a.semantic_search(&[1.0, 0.0], 5).unwrap().is_empty());
        assert!(scope_a.lexical_search("refund window", 5).unwrap().is_empty());
        assert_eq!(scope_a.chunk_count().unwrap(), 0);
    }

    #[test]
    fn test_delete_by_filename() {
        let (store, tenant) = store_with_tenant();
        let scope = store.scope(&tenant);

        scope.insert_chunk("a.md", "chunk one", &[1.0]).unwrap();
        scope.insert_chunk("a.md", "chunk two", &[1.0]).unwrap();
        scope.insert_chunk("b.md", "keep me", &[1.0]).unwrap();

        assert_eq!(scope.delete_by_filename("a.md").unwrap(), 2);
        assert_eq!(scope.chunk_count().unwrap(), 1);
        // The FTS mirror is cleaned too.
        assert!(scope.lexical_search("chunk", 5).unwrap().is_empty());
        let remaining = scope.lexical_search("keep", 5).unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn test_delete_all() {
        let (store, tenant) = store_with_tenant();
        let scope = store.scope(&tenant);
        scope.insert_chunk("a.md", "one", &[1.0]).unwrap();
        scope.insert_chunk("b.md", "two", &[1.0]).unwrap();

        assert_eq!(scope.delete_all().unwrap(), 2);
        assert_eq!(scope.chunk_count().unwrap(), 0);
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("documents.db");

        let tenant = {
            let store = DocumentStore::open(&path).unwrap();
            let tenant = store.create_tenant("acme", None).unwrap();
            store
                .scope(&tenant)
                .insert_chunk("a.md", "persistent content", &[1.0, 0.0])
                .unwrap();
            tenant
        };

        let reopened = DocumentStore::open(&path).unwrap();
        let scope = reopened.scope(&tenant);
        assert_eq!(scope.chunk_count().unwrap(), 1);
        assert_eq!(scope.lexical_search("persistent", 5).unwrap().len(), 1);
    }

    #[test]
    fn test_build_match_query() {
        assert_eq!(
            build_match_query("what's your return policy?").unwrap(),
            "\"what\" OR \"your\" OR \"return\" OR \"policy\""
        );
        assert!(build_match_query("a ?!").is_none());
    }

    #[test]
    fn test_embedding_round_trip() {
        let embedding = vec![0.25, -1.5, 3.0];
        let bytes = embedding_to_bytes(&embedding);
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), embedding);
    }
}
