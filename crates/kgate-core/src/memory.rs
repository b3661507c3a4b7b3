//! In-memory reference backends.
//!
//! Used by tests and by `backend = "memory"` for local experiments. Search
//! scores a record by the fraction of query terms found in its title,
//! content and tags.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::error::{KgateError, Result};
use crate::knowledge::{ArchivedKnowledge, Knowledge, SearchResult, Status};
use crate::repository::{
    prepare_save, sort_by_score_desc, ArchiveRepository, KnowledgeRepository, StatusUpdate,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| KgateError::Backend("in-memory store lock poisoned".to_string()))
}

fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn relevance(query_terms: &[String], knowledge: &Knowledge) -> f64 {
    let mut haystack: HashSet<String> = terms(&knowledge.title).collect();
    haystack.extend(terms(&knowledge.content));
    for tag in &knowledge.tags {
        haystack.extend(terms(tag));
    }
    let hits = query_terms.iter().filter(|t| haystack.contains(*t)).count();
    hits as f64 / query_terms.len() as f64
}

/// Knowledge records kept in a map keyed by id.
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeRepository {
    records: Mutex<BTreeMap<String, Knowledge>>,
}

impl InMemoryKnowledgeRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`KgateError::Backend`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.records)?.len())
    }

    /// # Errors
    ///
    /// Returns [`KgateError::Backend`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn find_by(&self, pred: impl Fn(&Knowledge) -> bool) -> Result<Option<Knowledge>> {
        Ok(lock(&self.records)?.values().find(|k| pred(k)).cloned())
    }
}

#[async_trait]
impl KnowledgeRepository for InMemoryKnowledgeRepository {
    async fn save(&self, knowledge: Knowledge) -> Result<Knowledge> {
        let mut records = lock(&self.records)?;
        let stored_created_at = records.get(&knowledge.id).and_then(|k| k.created_at);
        let saved = prepare_save(knowledge, stored_created_at, Utc::now());
        records.insert(saved.id.clone(), saved.clone());
        debug!(id = %saved.id, "saved knowledge in memory");
        Ok(saved)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<SearchResult> {
        let query_terms: Vec<String> = terms(query).collect();
        if query_terms.is_empty() || limit == 0 {
            return Ok(SearchResult::empty());
        }

        let mut items: Vec<Knowledge> = lock(&self.records)?
            .values()
            .filter_map(|k| {
                let score = relevance(&query_terms, k);
                (score > 0.0).then(|| {
                    let mut hit = k.clone();
                    hit.score = Some(score);
                    hit
                })
            })
            .collect();

        sort_by_score_desc(&mut items);
        items.truncate(limit);
        Ok(SearchResult::from_items(items))
    }

    async fn get(&self, id: &str) -> Result<Option<Knowledge>> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(lock(&self.records)?.remove(id).is_some())
    }

    async fn find_by_github_path(&self, path: &str) -> Result<Option<Knowledge>> {
        if path.trim().is_empty() {
            return Ok(None);
        }
        self.find_by(|k| k.github_path == path)
    }

    async fn find_by_pr_url(&self, url: &str) -> Result<Option<Knowledge>> {
        if url.trim().is_empty() {
            return Ok(None);
        }
        self.find_by(|k| k.pr_url == url)
    }

    async fn find_by_promoted_from_id(&self, id: &str) -> Result<Option<Knowledge>> {
        if id.trim().is_empty() {
            return Ok(None);
        }
        self.find_by(|k| k.promoted_from_id == id)
    }

    async fn update_status(
        &self,
        id: &str,
        status: Status,
        update: StatusUpdate,
    ) -> Result<Knowledge> {
        let mut records = lock(&self.records)?;
        let knowledge = records
            .get_mut(id)
            .ok_or_else(|| KgateError::NotFound(id.to_string()))?;
        update.apply(knowledge, status, Utc::now());
        Ok(knowledge.clone())
    }
}

/// Archive snapshots kept in a map keyed by the original knowledge id.
#[derive(Debug, Default)]
pub struct InMemoryArchiveRepository {
    records: Mutex<BTreeMap<String, ArchivedKnowledge>>,
}

impl InMemoryArchiveRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Returns [`KgateError::Backend`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(lock(&self.records)?.len())
    }

    /// # Errors
    ///
    /// Returns [`KgateError::Backend`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl ArchiveRepository for InMemoryArchiveRepository {
    async fn save(&self, mut archived: ArchivedKnowledge) -> Result<ArchivedKnowledge> {
        let mut records = lock(&self.records)?;
        if let Some(existing) = records.get(&archived.id) {
            return Ok(existing.clone());
        }
        archived.archived_at.get_or_insert_with(Utc::now);
        records.insert(archived.id.clone(), archived.clone());
        Ok(archived)
    }

    async fn get(&self, id: &str) -> Result<Option<ArchivedKnowledge>> {
        Ok(lock(&self.records)?.get(id).cloned())
    }

    async fn find_by_pr_url(&self, url: &str) -> Result<Option<ArchivedKnowledge>> {
        if url.trim().is_empty() {
            return Ok(None);
        }
        Ok(lock(&self.records)?
            .values()
            .find(|a| a.pr_url == url)
            .cloned())
    }
}
