//! Promotion workflow: `draft → proposed` in the personal store, then
//! `proposed → promoted` across stores with archival.
//!
//! The cross-store step is not transactional. Every step checks what already
//! exists before writing, so re-running [`PromotionWorkflow::accept`] after a
//! partial failure finishes the job without a second team record or archive.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{LifecycleError, Result, ValidationError};
use crate::knowledge::{ArchivedKnowledge, Knowledge, Status};
use crate::lifecycle::{require_non_blank, Lifecycle};
use crate::repository::{ArchiveRepository, KnowledgeRepository, StatusUpdate};

/// Move a draft to `proposed`, attaching `pr_url` when one is given.
///
/// # Errors
///
/// - [`ValidationError::IdRequired`] if `id` is blank
/// - [`LifecycleError::KnowledgeNotFound`] if no record has this id
/// - [`LifecycleError::NotDraft`] if the record is not a draft
/// - backend errors from the repository
pub async fn promote(
    repo: &dyn KnowledgeRepository,
    id: &str,
    pr_url: Option<&str>,
) -> Result<Knowledge> {
    let id = require_non_blank(id, ValidationError::IdRequired)?;

    let knowledge = repo
        .get(id)
        .await?
        .ok_or(LifecycleError::KnowledgeNotFound)?;
    Lifecycle::check_promotable(&knowledge)?;

    let update = match pr_url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => StatusUpdate::default().with_pr_url(url),
        None => StatusUpdate::default(),
    };
    let updated = repo.update_status(id, Status::Proposed, update).await?;
    info!(id = %updated.id, pr_url = %updated.pr_url, "knowledge proposed for promotion");
    Ok(updated)
}

/// Result of accepting a proposal into the team store.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptOutcome {
    /// The `team/promoted` record.
    pub team: Knowledge,
    /// The snapshot of the personal record.
    pub archived: ArchivedKnowledge,
    /// True when an earlier run had already finished every step.
    pub already_completed: bool,
}

/// Lifecycle operations that span the knowledge store and the archive.
#[derive(Clone)]
pub struct PromotionWorkflow {
    knowledge: Arc<dyn KnowledgeRepository>,
    archive: Arc<dyn ArchiveRepository>,
}

impl PromotionWorkflow {
    #[must_use]
    pub fn new(knowledge: Arc<dyn KnowledgeRepository>, archive: Arc<dyn ArchiveRepository>) -> Self {
        Self { knowledge, archive }
    }

    /// See [`promote`].
    ///
    /// # Errors
    ///
    /// Same as [`promote`].
    pub async fn promote(&self, id: &str, pr_url: Option<&str>) -> Result<Knowledge> {
        promote(self.knowledge.as_ref(), id, pr_url).await
    }

    /// Accept the personal proposal `id` as team knowledge stored at `github_path`.
    ///
    /// Creates (or reuses) the team record, archives the personal record and
    /// removes it from the active store. Safe to call again after any partial
    /// failure.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::IdRequired`] / [`ValidationError::GithubPathRequired`] for blank input
    /// - [`LifecycleError::KnowledgeNotFound`] if neither the record nor an archive exists
    /// - [`LifecycleError::NotProposed`] if the record is not `personal/proposed`
    /// - [`LifecycleError::GithubPathConflict`] if the path belongs to other knowledge
    /// - backend errors from either repository
    pub async fn accept(&self, id: &str, github_path: &str) -> Result<AcceptOutcome> {
        let id = require_non_blank(id, ValidationError::IdRequired)?;
        let github_path = require_non_blank(github_path, ValidationError::GithubPathRequired)?;

        let Some(personal) = self.knowledge.get(id).await? else {
            return self.completed(id).await;
        };
        Lifecycle::check_acceptable(&personal)?;

        let team = match self.knowledge.find_by_promoted_from_id(&personal.id).await? {
            Some(existing) => {
                warn!(id = %personal.id, team_id = %existing.id, "reusing team record from an interrupted promotion");
                if existing.github_path == github_path {
                    existing
                } else {
                    self.claim_path(&personal.id, github_path).await?;
                    let mut moved = existing;
                    moved.github_path = github_path.to_string();
                    Lifecycle::validate_state(&moved)?;
                    self.knowledge.save(moved).await?
                }
            }
            None => {
                self.claim_path(&personal.id, github_path).await?;
                let record = Lifecycle::team_record(&personal, github_path);
                Lifecycle::validate_state(&record)?;
                self.knowledge.save(record).await?
            }
        };

        let archived = self
            .archive
            .save(Lifecycle::archive_snapshot(&personal, &team))
            .await?;
        self.knowledge.delete(&personal.id).await?;

        info!(id = %personal.id, team_id = %team.id, github_path, "knowledge promoted to team store");
        Ok(AcceptOutcome {
            team,
            archived,
            already_completed: false,
        })
    }

    /// Accept the proposal whose pull request is `pr_url`.
    ///
    /// Once the personal record has been archived the pull request is
    /// resolved through the archive, so re-running reports completion.
    ///
    /// # Errors
    ///
    /// [`ValidationError::PrUrlRequired`] for a blank url,
    /// [`LifecycleError::KnowledgeNotFound`] if neither a record nor an archive
    /// carries it, then as [`Self::accept`].
    pub async fn accept_merged_pr(&self, pr_url: &str, github_path: &str) -> Result<AcceptOutcome> {
        let pr_url = require_non_blank(pr_url, ValidationError::PrUrlRequired)?.trim();
        let id = match self.knowledge.find_by_pr_url(pr_url).await? {
            Some(personal) => personal.id,
            None => {
                self.archive
                    .find_by_pr_url(pr_url)
                    .await?
                    .ok_or(LifecycleError::KnowledgeNotFound)?
                    .id
            }
        };
        self.accept(&id, github_path).await
    }

    /// Fail if `github_path` already belongs to knowledge not promoted from `source_id`.
    async fn claim_path(&self, source_id: &str, github_path: &str) -> Result<()> {
        match self.knowledge.find_by_github_path(github_path).await? {
            Some(existing) if existing.promoted_from_id != source_id => {
                Err(LifecycleError::GithubPathConflict {
                    github_path: github_path.to_string(),
                    linked_id: existing.id,
                }
                .into())
            }
            _ => Ok(()),
        }
    }

    /// The personal record is gone: report the earlier promotion if there was one.
    async fn completed(&self, id: &str) -> Result<AcceptOutcome> {
        let archived = self
            .archive
            .get(id)
            .await?
            .ok_or(LifecycleError::KnowledgeNotFound)?;
        let team = self
            .knowledge
            .get(&archived.promoted_to_id)
            .await?
            .ok_or(LifecycleError::KnowledgeNotFound)?;
        Ok(AcceptOutcome {
            team,
            archived,
            already_completed: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::KgateError;
    use crate::knowledge::{SearchResult, Source};
    use crate::memory::{InMemoryArchiveRepository, InMemoryKnowledgeRepository};

    const PATH: &str = "docs/knowledge/rust-tips.md";
    const PR: &str = "https://github.com/org/repo/pull/42";

    /// Wraps the in-memory store and fails `delete` while `fail_delete` is set.
    #[derive(Default)]
    struct CrashingStore {
        inner: InMemoryKnowledgeRepository,
        fail_delete: AtomicBool,
    }

    #[async_trait]
    impl KnowledgeRepository for CrashingStore {
        async fn save(&self, knowledge: Knowledge) -> Result<Knowledge> {
            self.inner.save(knowledge).await
        }
        async fn search(&self, query: &str, limit: usize) -> Result<SearchResult> {
            self.inner.search(query, limit).await
        }
        async fn get(&self, id: &str) -> Result<Option<Knowledge>> {
            self.inner.get(id).await
        }
        async fn delete(&self, id: &str) -> Result<bool> {
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(KgateError::Backend("simulated crash".to_string()));
            }
            self.inner.delete(id).await
        }
        async fn find_by_github_path(&self, path: &str) -> Result<Option<Knowledge>> {
            self.inner.find_by_github_path(path).await
        }
        async fn find_by_pr_url(&self, url: &str) -> Result<Option<Knowledge>> {
            self.inner.find_by_pr_url(url).await
        }
        async fn find_by_promoted_from_id(&self, id: &str) -> Result<Option<Knowledge>> {
            self.inner.find_by_promoted_from_id(id).await
        }
        async fn update_status(
            &self,
            id: &str,
            status: Status,
            update: StatusUpdate,
        ) -> Result<Knowledge> {
            self.inner.update_status(id, status, update).await
        }
    }

    struct Fixture {
        store: Arc<CrashingStore>,
        archive: Arc<InMemoryArchiveRepository>,
        workflow: PromotionWorkflow,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(CrashingStore::default());
        let archive = Arc::new(InMemoryArchiveRepository::new());
        let workflow = PromotionWorkflow::new(store.clone(), archive.clone());
        Fixture {
            store,
            archive,
            workflow,
        }
    }

    async fn proposed(f: &Fixture) -> Knowledge {
        let draft = f
            .store
            .save(Knowledge::new("Rust tips", "Prefer iterators"))
            .await
            .unwrap();
        f.workflow.promote(&draft.id, Some(PR)).await.unwrap()
    }

    fn message(err: KgateError) -> String {
        err.to_string()
    }

    // === promote ===

    #[tokio::test]
    async fn promote_moves_draft_to_proposed() {
        let f = fixture();
        let draft = f.store.save(Knowledge::new("t", "c")).await.unwrap();

        let updated = f.workflow.promote(&draft.id, None).await.unwrap();
        assert_eq!(updated.status, Status::Proposed);
        assert_eq!(updated.pr_url, "");
        assert_eq!(
            f.store.get(&draft.id).await.unwrap().unwrap().status,
            Status::Proposed
        );
    }

    #[tokio::test]
    async fn promote_twice_is_rejected() {
        let f = fixture();
        let draft = f.store.save(Knowledge::new("t", "c")).await.unwrap();
        f.workflow.promote(&draft.id, None).await.unwrap();

        let err = f.workflow.promote(&draft.id, None).await.unwrap_err();
        assert_eq!(message(err), "only draft knowledge can be promoted");
    }

    #[tokio::test]
    async fn promote_validates_id_and_existence() {
        let f = fixture();
        for blank in ["", "   "] {
            let err = f.workflow.promote(blank, None).await.unwrap_err();
            assert_eq!(message(err), "id is required");
        }
        let err = f.workflow.promote("missing-id", None).await.unwrap_err();
        assert_eq!(message(err), "knowledge not found");
    }

    #[tokio::test]
    async fn promote_attaches_pr_url() {
        let f = fixture();
        let k = proposed(&f).await;
        assert_eq!(k.pr_url, PR);
        assert!(Lifecycle::validate_state(&k).is_ok());
    }

    // === accept ===

    #[tokio::test]
    async fn accept_creates_team_record_and_archives_personal() {
        let f = fixture();
        let personal = proposed(&f).await;

        let outcome = f.workflow.accept(&personal.id, PATH).await.unwrap();
        assert!(!outcome.already_completed);

        let team = &outcome.team;
        assert_eq!(team.source, Source::Team);
        assert_eq!(team.status, Status::Promoted);
        assert_eq!(team.github_path, PATH);
        assert_eq!(team.promoted_from_id, personal.id);
        assert_eq!(team.pr_url, "");
        assert_ne!(team.id, personal.id);

        assert_eq!(outcome.archived.id, personal.id);
        assert_eq!(outcome.archived.promoted_to_id, team.id);
        assert_eq!(outcome.archived.pr_url, PR);
        assert!(outcome.archived.archived_at.is_some());

        assert!(f.store.get(&personal.id).await.unwrap().is_none());
        assert_eq!(f.store.inner.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn accept_rejects_draft() {
        let f = fixture();
        let draft = f.store.save(Knowledge::new("t", "c")).await.unwrap();
        let err = f.workflow.accept(&draft.id, PATH).await.unwrap_err();
        assert_eq!(message(err), "only proposed knowledge can be accepted");
    }

    #[tokio::test]
    async fn accept_requires_id_and_path() {
        let f = fixture();
        assert_eq!(
            message(f.workflow.accept(" ", PATH).await.unwrap_err()),
            "id is required"
        );
        assert_eq!(
            message(f.workflow.accept("k", "").await.unwrap_err()),
            "github_path is required"
        );
        assert_eq!(
            message(f.workflow.accept("missing", PATH).await.unwrap_err()),
            "knowledge not found"
        );
    }

    #[tokio::test]
    async fn accept_refuses_path_owned_by_other_knowledge() {
        let f = fixture();
        let first = proposed(&f).await;
        f.workflow.accept(&first.id, PATH).await.unwrap();

        let second = f
            .store
            .save(Knowledge::new("Other", "other"))
            .await
            .unwrap();
        f.workflow.promote(&second.id, None).await.unwrap();

        let err = f.workflow.accept(&second.id, PATH).await.unwrap_err();
        assert!(matches!(
            err,
            KgateError::Lifecycle(LifecycleError::GithubPathConflict { .. })
        ));
        assert!(f.store.get(&second.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn accept_again_after_completion_is_a_no_op() {
        let f = fixture();
        let personal = proposed(&f).await;
        let first = f.workflow.accept(&personal.id, PATH).await.unwrap();

        let again = f.workflow.accept(&personal.id, PATH).await.unwrap();
        assert!(again.already_completed);
        assert_eq!(again.team.id, first.team.id);
        assert_eq!(f.archive.len().unwrap(), 1);
        assert_eq!(f.store.inner.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn accept_recovers_from_crash_before_delete() {
        let f = fixture();
        let personal = proposed(&f).await;

        f.store.fail_delete.store(true, Ordering::SeqCst);
        assert!(f.workflow.accept(&personal.id, PATH).await.is_err());
        // Orphaned duplicate: live personal and live team record.
        assert_eq!(f.store.inner.len().unwrap(), 2);

        f.store.fail_delete.store(false, Ordering::SeqCst);
        let outcome = f.workflow.accept(&personal.id, PATH).await.unwrap();

        assert_eq!(f.store.inner.len().unwrap(), 1);
        assert_eq!(f.archive.len().unwrap(), 1);
        assert_eq!(outcome.archived.promoted_to_id, outcome.team.id);
        let by_path = f.store.find_by_github_path(PATH).await.unwrap().unwrap();
        assert_eq!(by_path.id, outcome.team.id);
    }

    #[tokio::test]
    async fn accept_retry_with_renamed_path_reuses_team_record() {
        let f = fixture();
        let personal = proposed(&f).await;

        f.store.fail_delete.store(true, Ordering::SeqCst);
        assert!(f.workflow.accept(&personal.id, PATH).await.is_err());

        f.store.fail_delete.store(false, Ordering::SeqCst);
        let renamed = "docs/knowledge/renamed.md";
        let outcome = f.workflow.accept(&personal.id, renamed).await.unwrap();

        assert_eq!(f.store.inner.len().unwrap(), 1);
        assert_eq!(f.archive.len().unwrap(), 1);
        assert_eq!(outcome.team.github_path, renamed);
        assert_eq!(outcome.archived.promoted_to_id, outcome.team.id);
        assert!(f.store.find_by_github_path(PATH).await.unwrap().is_none());
        let team = f
            .store
            .find_by_promoted_from_id(&personal.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(team.id, outcome.team.id);
    }

    #[tokio::test]
    async fn accept_retry_cannot_move_onto_foreign_path() {
        let f = fixture();
        let other = proposed(&f).await;
        f.workflow.accept(&other.id, PATH).await.unwrap();

        let personal = f
            .store
            .save(Knowledge::new("Second", "second"))
            .await
            .unwrap();
        f.workflow.promote(&personal.id, None).await.unwrap();
        f.store.fail_delete.store(true, Ordering::SeqCst);
        assert!(f.workflow.accept(&personal.id, "docs/second.md").await.is_err());
        f.store.fail_delete.store(false, Ordering::SeqCst);

        let err = f.workflow.accept(&personal.id, PATH).await.unwrap_err();
        assert!(matches!(
            err,
            KgateError::Lifecycle(LifecycleError::GithubPathConflict { .. })
        ));
    }

    #[tokio::test]
    async fn accept_merged_pr_resolves_by_pr_url() {
        let f = fixture();
        let personal = proposed(&f).await;

        let outcome = f.workflow.accept_merged_pr(PR, PATH).await.unwrap();
        assert_eq!(outcome.team.promoted_from_id, personal.id);

        let again = f.workflow.accept_merged_pr(PR, PATH).await.unwrap();
        assert!(again.already_completed);
        assert_eq!(again.team.id, outcome.team.id);

        let err = f
            .workflow
            .accept_merged_pr("https://github.com/org/repo/pull/404", PATH)
            .await
            .unwrap_err();
        assert_eq!(message(err), "knowledge not found");
        assert_eq!(
            message(f.workflow.accept_merged_pr("", PATH).await.unwrap_err()),
            "pr_url is required"
        );
    }
}
