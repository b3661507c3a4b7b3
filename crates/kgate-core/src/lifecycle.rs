//! Lifecycle rules for knowledge records.
//!
//! Core invariant: **status only moves forward, `draft → proposed → promoted`.**
//!
//! Valid state combinations:
//!
//! | source   | status   | github_path | pr_url      | promoted_from_id |
//! |----------|----------|-------------|-------------|------------------|
//! | personal | draft    | ""          | ""          | ""               |
//! | personal | proposed | ""          | set or ""   | ""               |
//! | team     | promoted | set         | ""          | set or ""        |

use crate::error::{LifecycleError, ValidationError};
use crate::knowledge::{ArchivedKnowledge, Knowledge, Source, Status};

impl Status {
    /// Whether `self → next` is one of the two forward edges.
    #[must_use]
    pub fn can_transition_to(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Draft, Status::Proposed) | (Status::Proposed, Status::Promoted)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == Status::Promoted
    }
}

/// Return `value` when it has non-whitespace content, `missing` otherwise.
///
/// # Errors
///
/// Returns `missing` if `value` is empty or whitespace-only.
pub fn require_non_blank(value: &str, missing: ValidationError) -> Result<&str, ValidationError> {
    if value.trim().is_empty() {
        Err(missing)
    } else {
        Ok(value)
    }
}

/// Checks applied before any status change or cross-store promotion.
///
/// Rules enforced:
/// - only a `draft` can be promoted to `proposed`
/// - only a `personal/proposed` can be accepted into the team store
/// - every record written by the workflow matches the state table above
pub struct Lifecycle;

impl Lifecycle {
    /// Check that `knowledge` is one of the valid state combinations.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] naming the first violated rule.
    pub fn validate_state(knowledge: &Knowledge) -> Result<(), LifecycleError> {
        let invalid = |reason: &str| Err(LifecycleError::InvalidState(reason.to_string()));

        match (knowledge.source, knowledge.status) {
            (Source::Personal, Status::Draft) => {
                if !knowledge.github_path.is_empty() {
                    return invalid("personal draft must not have github_path");
                }
                if !knowledge.pr_url.is_empty() {
                    return invalid("personal draft must not have pr_url");
                }
                if !knowledge.promoted_from_id.is_empty() {
                    return invalid("personal draft must not have promoted_from_id");
                }
                Ok(())
            }
            (Source::Personal, Status::Proposed) => {
                if !knowledge.github_path.is_empty() {
                    return invalid("personal proposal must not have github_path");
                }
                if !knowledge.promoted_from_id.is_empty() {
                    return invalid("personal proposal must not have promoted_from_id");
                }
                Ok(())
            }
            (Source::Team, Status::Promoted) => {
                if knowledge.github_path.is_empty() {
                    return invalid("team knowledge requires github_path");
                }
                if !knowledge.pr_url.is_empty() {
                    return invalid("team knowledge must not have pr_url");
                }
                Ok(())
            }
            (Source::Personal, Status::Promoted) => {
                invalid("promoted knowledge must live in the team store")
            }
            (Source::Team, _) => invalid("team knowledge is always promoted"),
        }
    }

    /// Check that `knowledge` may move from `draft` to `proposed`.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotDraft`] for any other status.
    pub fn check_promotable(knowledge: &Knowledge) -> Result<(), LifecycleError> {
        if knowledge.status.can_transition_to(Status::Proposed) {
            Ok(())
        } else {
            Err(LifecycleError::NotDraft)
        }
    }

    /// Check that `knowledge` is a personal proposal ready for the team store.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NotProposed`] unless the record is `personal/proposed`.
    pub fn check_acceptable(knowledge: &Knowledge) -> Result<(), LifecycleError> {
        if knowledge.source == Source::Personal
            && knowledge.status.can_transition_to(Status::Promoted)
        {
            Ok(())
        } else {
            Err(LifecycleError::NotProposed)
        }
    }

    /// Build the unsaved team record that supersedes `personal`.
    #[must_use]
    pub fn team_record(personal: &Knowledge, github_path: &str) -> Knowledge {
        let mut team = Knowledge::new(personal.title.clone(), personal.content.clone())
            .with_tags(personal.tags.clone());
        team.user_id = personal.user_id.clone();
        team.source = Source::Team;
        team.status = Status::Promoted;
        team.github_path = github_path.to_string();
        team.promoted_from_id = personal.id.clone();
        team
    }

    /// Snapshot `personal` for the archive, linked to the team record.
    #[must_use]
    pub fn archive_snapshot(personal: &Knowledge, team: &Knowledge) -> ArchivedKnowledge {
        ArchivedKnowledge::snapshot(personal, team.id.clone())
    }
}
