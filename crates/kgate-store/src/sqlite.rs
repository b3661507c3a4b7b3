//! SQLite backend with FTS5 full-text search.
//!
//! A single database file holds both stores:
//! - `knowledge` table plus the `knowledge_fts` virtual table for search
//! - `archived_knowledge` table for promotion snapshots
//!
//! Relevance is FTS5 `bm25`, negated so that higher scores rank first.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use kgate_core::repository::{prepare_save, sort_by_score_desc};
use kgate_core::{
    ArchiveRepository, ArchivedKnowledge, KgateError, Knowledge, KnowledgeRepository, Result,
    SearchResult, Status, StatusUpdate,
};

const KNOWLEDGE_COLUMNS: &str = "id, title, content, tags, user_id, source, status,
     github_path, pr_url, promoted_from_id, created_at, updated_at";

fn backend(e: rusqlite::Error) -> KgateError {
    KgateError::Backend(e.to_string())
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| KgateError::Serialization(format!("invalid timestamp '{value}': {e}")))
}

fn parse_opt_time(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_time).transpose()
}

/// Build an FTS5 query that ORs the alphanumeric terms of free text.
///
/// Quoting every term keeps user input from being read as FTS5 syntax.
fn fts_query(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" OR "))
}

/// Row as stored, before enum and timestamp parsing.
struct StoredKnowledge {
    id: String,
    title: String,
    content: String,
    tags: String,
    user_id: String,
    source: String,
    status: String,
    github_path: String,
    pr_url: String,
    promoted_from_id: String,
    created_at: String,
    updated_at: String,
}

impl StoredKnowledge {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            content: row.get(2)?,
            tags: row.get(3)?,
            user_id: row.get(4)?,
            source: row.get(5)?,
            status: row.get(6)?,
            github_path: row.get(7)?,
            pr_url: row.get(8)?,
            promoted_from_id: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_knowledge(self) -> Result<Knowledge> {
        Ok(Knowledge {
            id: self.id,
            title: self.title,
            content: self.content,
            tags: serde_json::from_str(&self.tags)?,
            user_id: self.user_id,
            source: self.source.parse()?,
            status: self.status.parse()?,
            github_path: self.github_path,
            pr_url: self.pr_url,
            promoted_from_id: self.promoted_from_id,
            created_at: Some(parse_time(&self.created_at)?),
            updated_at: Some(parse_time(&self.updated_at)?),
            score: None,
        })
    }
}

/// Knowledge and archive repositories on one SQLite database.
pub struct SqliteKnowledgeStore {
    conn: Mutex<Connection>,
}

impl SqliteKnowledgeStore {
    /// Open or create a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`KgateError::Backend`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(backend)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`KgateError::Backend`] if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| KgateError::Backend("sqlite connection lock poisoned".to_string()))
    }

    /// Create tables, the FTS5 index and its sync triggers.
    fn create_schema(&self) -> Result<()> {
        self.conn()?
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS knowledge (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                user_id TEXT NOT NULL,
                source TEXT NOT NULL,
                status TEXT NOT NULL,
                github_path TEXT NOT NULL DEFAULT '',
                pr_url TEXT NOT NULL DEFAULT '',
                promoted_from_id TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS knowledge_fts USING fts5(
                title,
                content,
                tags,
                content='knowledge',
                content_rowid='rowid'
            );

            CREATE TRIGGER IF NOT EXISTS knowledge_ai AFTER INSERT ON knowledge BEGIN
                INSERT INTO knowledge_fts(rowid, title, content, tags)
                VALUES (new.rowid, new.title, new.content, new.tags);
            END;

            CREATE TRIGGER IF NOT EXISTS knowledge_ad AFTER DELETE ON knowledge BEGIN
                INSERT INTO knowledge_fts(knowledge_fts, rowid, title, content, tags)
                VALUES ('delete', old.rowid, old.title, old.content, old.tags);
            END;

            CREATE TRIGGER IF NOT EXISTS knowledge_au AFTER UPDATE ON knowledge BEGIN
                INSERT INTO knowledge_fts(knowledge_fts, rowid, title, content, tags)
                VALUES ('delete', old.rowid, old.title, old.content, old.tags);
                INSERT INTO knowledge_fts(rowid, title, content, tags)
                VALUES (new.rowid, new.title, new.content, new.tags);
            END;

            CREATE INDEX IF NOT EXISTS idx_knowledge_github_path ON knowledge(github_path);
            CREATE INDEX IF NOT EXISTS idx_knowledge_pr_url ON knowledge(pr_url);
            CREATE INDEX IF NOT EXISTS idx_knowledge_promoted_from_id ON knowledge(promoted_from_id);

            CREATE TABLE IF NOT EXISTS archived_knowledge (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                user_id TEXT NOT NULL,
                source TEXT NOT NULL,
                status TEXT NOT NULL,
                github_path TEXT NOT NULL DEFAULT '',
                pr_url TEXT NOT NULL DEFAULT '',
                promoted_from_id TEXT NOT NULL DEFAULT '',
                created_at TEXT,
                updated_at TEXT,
                archived_at TEXT NOT NULL,
                promoted_to_id TEXT NOT NULL
            );
            ",
            )
            .map_err(backend)?;

        Ok(())
    }

    fn load(conn: &Connection, id: &str) -> Result<Option<Knowledge>> {
        conn.query_row(
            &format!("SELECT {KNOWLEDGE_COLUMNS} FROM knowledge WHERE id = ?1"),
            params![id],
            StoredKnowledge::from_row,
        )
        .optional()
        .map_err(backend)?
        .map(StoredKnowledge::into_knowledge)
        .transpose()
    }

    fn find_by_column(&self, column: &str, value: &str) -> Result<Option<Knowledge>> {
        if value.trim().is_empty() {
            return Ok(None);
        }
        self.conn()?
            .query_row(
                &format!(
                    "SELECT {KNOWLEDGE_COLUMNS} FROM knowledge WHERE {column} = ?1
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                params![value],
                StoredKnowledge::from_row,
            )
            .optional()
            .map_err(backend)?
            .map(StoredKnowledge::into_knowledge)
            .transpose()
    }

    /// Get count of active knowledge records.
    ///
    /// # Errors
    ///
    /// Returns [`KgateError::Backend`] if the query fails.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM knowledge", [], |row| row.get(0))
            .map_err(backend)?;
        Ok(count as u64)
    }

    /// Most recent snapshot whose `column` equals `value`.
    fn load_archive(&self, column: &str, value: &str) -> Result<Option<ArchivedKnowledge>> {
        type ArchiveRow = (StoredKnowledge, Option<String>, Option<String>, String, String);

        let row: Option<ArchiveRow> = self
            .conn()?
            .query_row(
                &format!(
                    "SELECT id, title, content, tags, user_id, source, status, github_path, pr_url,
                            promoted_from_id, '', '', created_at, updated_at, archived_at, promoted_to_id
                     FROM archived_knowledge WHERE {column} = ?1
                     ORDER BY archived_at DESC LIMIT 1"
                ),
                params![value],
                |row| {
                    Ok((
                        StoredKnowledge::from_row(row)?,
                        row.get(12)?,
                        row.get(13)?,
                        row.get(14)?,
                        row.get(15)?,
                    ))
                },
            )
            .optional()
            .map_err(backend)?;

        let Some((stored, created_at, updated_at, archived_at, promoted_to_id)) = row else {
            return Ok(None);
        };

        Ok(Some(ArchivedKnowledge {
            id: stored.id,
            title: stored.title,
            content: stored.content,
            tags: serde_json::from_str(&stored.tags)?,
            user_id: stored.user_id,
            source: stored.source.parse()?,
            status: stored.status.parse()?,
            github_path: stored.github_path,
            pr_url: stored.pr_url,
            promoted_from_id: stored.promoted_from_id,
            created_at: parse_opt_time(created_at)?,
            updated_at: parse_opt_time(updated_at)?,
            archived_at: Some(parse_time(&archived_at)?),
            promoted_to_id,
        }))
    }
}

#[async_trait]
impl KnowledgeRepository for SqliteKnowledgeStore {
    async fn save(&self, knowledge: Knowledge) -> Result<Knowledge> {
        let conn = self.conn()?;
        let stored_created_at = if knowledge.id.is_empty() {
            None
        } else {
            Self::load(&conn, &knowledge.id)?.and_then(|k| k.created_at)
        };
        let saved = prepare_save(knowledge, stored_created_at, Utc::now());

        conn.execute(
            &format!(
                "INSERT INTO knowledge ({KNOWLEDGE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    content = excluded.content,
                    tags = excluded.tags,
                    user_id = excluded.user_id,
                    source = excluded.source,
                    status = excluded.status,
                    github_path = excluded.github_path,
                    pr_url = excluded.pr_url,
                    promoted_from_id = excluded.promoted_from_id,
                    created_at = excluded.created_at,
                    updated_at = excluded.updated_at"
            ),
            params![
                saved.id,
                saved.title,
                saved.content,
                serde_json::to_string(&saved.tags)?,
                saved.user_id,
                saved.source.as_str(),
                saved.status.as_str(),
                saved.github_path,
                saved.pr_url,
                saved.promoted_from_id,
                saved.created_at.map(|t| t.to_rfc3339()),
                saved.updated_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(backend)?;

        debug!(id = %saved.id, "saved knowledge to sqlite");
        Ok(saved)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<SearchResult> {
        let Some(fts) = fts_query(query) else {
            return Ok(SearchResult::empty());
        };
        if limit == 0 {
            return Ok(SearchResult::empty());
        }

        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT k.id, k.title, k.content, k.tags, k.user_id, k.source, k.status,
                        k.github_path, k.pr_url, k.promoted_from_id, k.created_at, k.updated_at,
                        bm25(knowledge_fts) AS rank
                 FROM knowledge_fts f
                 JOIN knowledge k ON k.rowid = f.rowid
                 WHERE knowledge_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
            )
            .map_err(backend)?;

        let rows = stmt
            .query_map(params![fts, limit as i64], |row| {
                Ok((StoredKnowledge::from_row(row)?, row.get::<_, f64>(12)?))
            })
            .map_err(backend)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(backend)?;

        let mut items = rows
            .into_iter()
            .map(|(stored, rank)| {
                let mut k = stored.into_knowledge()?;
                k.score = Some(-rank);
                Ok(k)
            })
            .collect::<Result<Vec<_>>>()?;
        sort_by_score_desc(&mut items);

        Ok(SearchResult::from_items(items))
    }

    async fn get(&self, id: &str) -> Result<Option<Knowledge>> {
        Self::load(&*self.conn()?, id)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM knowledge WHERE id = ?1", params![id])
            .map_err(backend)?;
        Ok(removed > 0)
    }

    async fn find_by_github_path(&self, path: &str) -> Result<Option<Knowledge>> {
        self.find_by_column("github_path", path)
    }

    async fn find_by_pr_url(&self, url: &str) -> Result<Option<Knowledge>> {
        self.find_by_column("pr_url", url)
    }

    async fn find_by_promoted_from_id(&self, id: &str) -> Result<Option<Knowledge>> {
        self.find_by_column("promoted_from_id", id)
    }

    async fn update_status(
        &self,
        id: &str,
        status: Status,
        update: StatusUpdate,
    ) -> Result<Knowledge> {
        let conn = self.conn()?;
        let mut knowledge =
            Self::load(&conn, id)?.ok_or_else(|| KgateError::NotFound(id.to_string()))?;
        update.apply(&mut knowledge, status, Utc::now());

        conn.execute(
            "UPDATE knowledge
             SET status = ?2, pr_url = ?3, github_path = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                id,
                knowledge.status.as_str(),
                knowledge.pr_url,
                knowledge.github_path,
                knowledge.updated_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(backend)?;

        Ok(knowledge)
    }
}

#[async_trait]
impl ArchiveRepository for SqliteKnowledgeStore {
    async fn save(&self, mut archived: ArchivedKnowledge) -> Result<ArchivedKnowledge> {
        let archived_at = *archived.archived_at.get_or_insert_with(Utc::now);

        // First writer wins; a repeated archive keeps the original snapshot.
        self.conn()?
            .execute(
            "INSERT INTO archived_knowledge
                (id, title, content, tags, user_id, source, status, github_path, pr_url,
                 promoted_from_id, created_at, updated_at, archived_at, promoted_to_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO NOTHING",
            params![
                archived.id,
                archived.title,
                archived.content,
                serde_json::to_string(&archived.tags)?,
                archived.user_id,
                archived.source.as_str(),
                archived.status.as_str(),
                archived.github_path,
                archived.pr_url,
                archived.promoted_from_id,
                archived.created_at.map(|t| t.to_rfc3339()),
                archived.updated_at.map(|t| t.to_rfc3339()),
                archived_at.to_rfc3339(),
                archived.promoted_to_id,
            ],
        )
        .map_err(backend)?;

        ArchiveRepository::get(self, &archived.id)
            .await?
            .ok_or_else(|| KgateError::Backend(format!("archive {} missing after insert", archived.id)))
    }

    async fn get(&self, id: &str) -> Result<Option<ArchivedKnowledge>> {
        self.load_archive("id", id)
    }

    async fn find_by_pr_url(&self, url: &str) -> Result<Option<ArchivedKnowledge>> {
        if url.trim().is_empty() {
            return Ok(None);
        }
        self.load_archive("pr_url", url)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use kgate_core::{PromotionWorkflow, Source};

    fn store() -> SqliteKnowledgeStore {
        SqliteKnowledgeStore::in_memory().unwrap()
    }

    #[tokio::test]
    async fn creates_schema_on_init() {
        let store = store();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn save_then_get_roundtrips_every_field() {
        let store = store();
        let before = Utc::now();
        let mut k = Knowledge::new("Title", "Hello world").with_tags(vec!["x".to_string(), "y".to_string()]);
        k.user_id = "user-123".to_string();

        let saved = KnowledgeRepository::save(&store, k).await.unwrap();
        let fetched = KnowledgeRepository::get(&store, &saved.id).await.unwrap().unwrap();

        assert_eq!(fetched, saved);
        assert_eq!(fetched.tags, vec!["x".to_string(), "y".to_string()]);
        assert_eq!(fetched.user_id, "user-123");
        assert!(fetched.updated_at.unwrap() >= before);
    }

    #[tokio::test]
    async fn save_upserts_on_existing_id() {
        let store = store();
        let first = KnowledgeRepository::save(&store, Knowledge::new("Original", "body"))
            .await
            .unwrap();
        let edit = Knowledge::new("Updated", "new body").with_id(first.id.clone());
        let second = KnowledgeRepository::save(&store, edit).await.unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(second.created_at, first.created_at);
        let fetched = KnowledgeRepository::get(&store, &first.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Updated");
    }

    #[tokio::test]
    async fn fts_indexes_title_and_content() {
        let store = store();
        KnowledgeRepository::save(
            &store,
            Knowledge::new("Alpha", "This project uses Rust and machine learning."),
        )
        .await
        .unwrap();
        KnowledgeRepository::save(&store, Knowledge::new("Beta", "A Python data pipeline."))
            .await
            .unwrap();

        let result = store.search("machine learning", 10).await.unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.items[0].title, "Alpha");
        assert!(result.items[0].score.is_some());

        let result = store.search("Beta", 10).await.unwrap();
        assert_eq!(result.items[0].title, "Beta");
    }

    #[tokio::test]
    async fn search_ranks_more_relevant_first() {
        let store = store();
        KnowledgeRepository::save(
            &store,
            Knowledge::new("Rust Project", "Rust is great for systems programming with Rust tools."),
        )
        .await
        .unwrap();
        KnowledgeRepository::save(
            &store,
            Knowledge::new("Python Project", "Python is great. Also mentions Rust once."),
        )
        .await
        .unwrap();

        let result = store.search("Rust", 10).await.unwrap();
        assert_eq!(result.total, 2);
        assert_eq!(result.items[0].title, "Rust Project");
        assert!(result.items[0].score.unwrap() >= result.items[1].score.unwrap());
    }

    #[tokio::test]
    async fn search_tolerates_fts_syntax_in_query() {
        let store = store();
        KnowledgeRepository::save(&store, Knowledge::new("C++ tips", "templates"))
            .await
            .unwrap();

        let result = store.search("\"C++\" AND (", 10).await.unwrap();
        assert_eq!(result.total, 1);
        assert!(store.search("***", 10).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn search_empty_corpus_and_limit() {
        let store = store();
        let empty = store.search("anything", 10).await.unwrap();
        assert_eq!(empty.total, 0);

        for i in 0..4 {
            KnowledgeRepository::save(&store, Knowledge::new(format!("note {i}"), "shared words"))
                .await
                .unwrap();
        }
        assert_eq!(store.search("shared", 2).await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn delete_removes_from_table_and_index() {
        let store = store();
        let saved = KnowledgeRepository::save(&store, Knowledge::new("Gone", "ephemeral"))
            .await
            .unwrap();

        assert!(store.delete(&saved.id).await.unwrap());
        assert!(!store.delete(&saved.id).await.unwrap());
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.search("ephemeral", 10).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn update_status_and_secondary_lookups() {
        let store = store();
        let saved = KnowledgeRepository::save(&store, Knowledge::new("t", "c"))
            .await
            .unwrap();

        let updated = store
            .update_status(
                &saved.id,
                Status::Proposed,
                StatusUpdate::default().with_pr_url("https://github.com/o/r/pull/3"),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, Status::Proposed);
        assert_eq!(updated.created_at, saved.created_at);

        let found = KnowledgeRepository::find_by_pr_url(&store, "https://github.com/o/r/pull/3")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, saved.id);
        assert_eq!(found.status, Status::Proposed);
        assert!(store.find_by_github_path("").await.unwrap().is_none());

        let err = store
            .update_status("missing", Status::Proposed, StatusUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, KgateError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_status_in_row_is_a_serialization_error() {
        let store = store();
        let saved = KnowledgeRepository::save(&store, Knowledge::new("t", "c"))
            .await
            .unwrap();
        store
            .conn()
            .unwrap()
            .execute("UPDATE knowledge SET status = 'archived' WHERE id = ?1", params![saved.id])
            .unwrap();

        let err = KnowledgeRepository::get(&store, &saved.id).await.unwrap_err();
        assert!(matches!(err, KgateError::Serialization(_)));
    }

    #[tokio::test]
    async fn archive_is_write_once() {
        let store = store();
        let k = Knowledge::new("t", "c").with_id("k-1");

        let first = ArchiveRepository::save(&store, ArchivedKnowledge::snapshot(&k, "team-1"))
            .await
            .unwrap();
        let second = ArchiveRepository::save(&store, ArchivedKnowledge::snapshot(&k, "team-2"))
            .await
            .unwrap();

        assert_eq!(second.promoted_to_id, "team-1");
        assert_eq!(second.archived_at, first.archived_at);
        assert!(ArchiveRepository::get(&store, "absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn promotion_workflow_runs_on_one_database() {
        let store = Arc::new(store());
        let workflow = PromotionWorkflow::new(store.clone(), store.clone());

        let draft = KnowledgeRepository::save(store.as_ref(), Knowledge::new("Tip", "Use clippy"))
            .await
            .unwrap();
        workflow.promote(&draft.id, None).await.unwrap();
        let outcome = workflow.accept(&draft.id, "docs/tips/clippy.md").await.unwrap();

        assert_eq!(outcome.team.source, Source::Team);
        assert_eq!(store.count().unwrap(), 1);
        let archived = ArchiveRepository::get(store.as_ref(), &draft.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(archived.promoted_to_id, outcome.team.id);
        assert_eq!(archived.status, Status::Proposed);
    }

    #[tokio::test]
    async fn accept_retry_with_renamed_path_keeps_one_team_record() {
        let store = Arc::new(store());
        let workflow = PromotionWorkflow::new(store.clone(), store.clone());

        let draft = KnowledgeRepository::save(store.as_ref(), Knowledge::new("Tip", "Use clippy"))
            .await
            .unwrap();
        workflow
            .promote(&draft.id, Some("https://github.com/o/r/pull/8"))
            .await
            .unwrap();

        // Earlier run stopped after creating the team record.
        let mut team = KnowledgeRepository::get(store.as_ref(), &draft.id)
            .await
            .unwrap()
            .unwrap();
        team.id = String::new();
        team.source = Source::Team;
        team.status = Status::Promoted;
        team.pr_url = String::new();
        team.github_path = "docs/tips/old.md".to_string();
        team.promoted_from_id = draft.id.clone();
        let team = KnowledgeRepository::save(store.as_ref(), team).await.unwrap();

        let found = store.find_by_promoted_from_id(&draft.id).await.unwrap().unwrap();
        assert_eq!(found.id, team.id);

        let outcome = workflow.accept(&draft.id, "docs/tips/clippy.md").await.unwrap();
        assert_eq!(outcome.team.id, team.id);
        assert_eq!(outcome.team.github_path, "docs/tips/clippy.md");
        assert_eq!(store.count().unwrap(), 1);

        let archived = ArchiveRepository::find_by_pr_url(store.as_ref(), "https://github.com/o/r/pull/8")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(archived.id, draft.id);
        assert_eq!(archived.promoted_to_id, team.id);
        assert!(ArchiveRepository::find_by_pr_url(store.as_ref(), " ")
            .await
            .unwrap()
            .is_none());

        let again = workflow
            .accept_merged_pr("https://github.com/o/r/pull/8", "docs/tips/clippy.md")
            .await
            .unwrap();
        assert!(again.already_completed);
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kgate.db");
        let rt = tokio::runtime::Runtime::new().unwrap();

        let id = {
            let store = SqliteKnowledgeStore::open(&path).unwrap();
            rt.block_on(KnowledgeRepository::save(&store, Knowledge::new("Persisted", "on disk")))
                .unwrap()
                .id
        };

        let reopened = SqliteKnowledgeStore::open(&path).unwrap();
        let fetched = rt
            .block_on(KnowledgeRepository::get(&reopened, &id))
            .unwrap()
            .unwrap();
        assert_eq!(fetched.title, "Persisted");
    }
}
