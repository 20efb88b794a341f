//! Admin review surface.
//!
//! Every operation is reached through [`AdminReviewService::authorize`], which is the
//! single admin role check. Document decisions are persisted first and only on the
//! revision the admin reviewed; the educator status is then re-derived from the
//! stored documents, so a failed recompute never rolls a decision back and can
//! simply be retried.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::access::{require_admin, AccessError, Actor, AdminClaim};
use super::collaborators::Collaborators;
use super::documents::{DocumentStore, FilePolicy};
use super::domain::{
    CriminalRecordVerification, DiplomaVerificationStatus, DocumentDecision, DocumentId,
    DocumentStatus, DocumentType, EducatorId, EducatorProfile, InterviewStatus, UserId,
    VerificationDocument, VerificationStatus, VideoInterview,
};
use super::errors::{ValidationError, VerificationError};
use super::repository::VerificationRepository;
use super::settings::VerificationSettings;
use super::state_machine::{transition, VerificationEvent};
use super::views::{DocumentLink, ReviewQueueEntry};

const AWAITING_REVIEW: [VerificationStatus; 3] = [
    VerificationStatus::DocumentsSubmitted,
    VerificationStatus::DocumentsVerified,
    VerificationStatus::InterviewScheduled,
];

/// Document decision together with the educator state it produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub document: VerificationDocument,
    pub profile: EducatorProfile,
}

pub struct AdminReviewService<R> {
    repository: Arc<R>,
    documents: DocumentStore<R>,
    settings: VerificationSettings,
}

impl<R> AdminReviewService<R>
where
    R: VerificationRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        collaborators: Collaborators,
        settings: VerificationSettings,
    ) -> Self {
        let documents = DocumentStore::new(
            repository.clone(),
            collaborators.storage,
            FilePolicy::new(settings.max_upload_bytes),
        );
        Self {
            repository,
            documents,
            settings,
        }
    }

    pub fn authorize(&self, actor: &Actor) -> Result<AdminSession<'_, R>, AccessError> {
        let claim = require_admin(actor)?;
        Ok(AdminSession {
            service: self,
            claim,
        })
    }
}

/// Admin operations, available only after [`AdminReviewService::authorize`].
pub struct AdminSession<'a, R> {
    service: &'a AdminReviewService<R>,
    claim: AdminClaim,
}

impl<'a, R> AdminSession<'a, R>
where
    R: VerificationRepository + 'static,
{
    pub fn reviewer(&self) -> &UserId {
        self.claim.reviewer()
    }

    pub fn approve_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<ReviewOutcome, VerificationError> {
        let reviewed = self.service.documents.fetch(document_id)?;
        self.load(&reviewed.educator_id)?;

        let decision = DocumentDecision::approve(&reviewed, Utc::now());
        let document = self.decide(reviewed, &decision)?;

        let profile = self
            .after_document_decision(&document)
            .map_err(|source| recompute_error(&document, source))?;

        Ok(ReviewOutcome { document, profile })
    }

    pub fn reject_document(
        &self,
        document_id: &DocumentId,
        reason: &str,
    ) -> Result<ReviewOutcome, VerificationError> {
        let reason = required_reason(reason)?;
        let reviewed = self.service.documents.fetch(document_id)?;
        self.load(&reviewed.educator_id)?;

        let decision = DocumentDecision::reject(&reviewed, reason, Utc::now());
        let document = self.decide(reviewed, &decision)?;

        let profile = self
            .after_document_decision(&document)
            .map_err(|source| recompute_error(&document, source))?;

        Ok(ReviewOutcome { document, profile })
    }

    /// Book the video interview once all four documents are approved.
    pub fn schedule_interview(
        &self,
        educator_id: &EducatorId,
        date: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> Result<EducatorProfile, VerificationError> {
        let date = date.ok_or(ValidationError::MissingInterviewDate)?;

        // Re-derive first so a stale documents_verified status cannot be trusted.
        let mut profile = self.service.documents.recompute(educator_id)?;
        let next = transition(
            profile.verification_status,
            VerificationEvent::InterviewScheduled,
        )?;

        if let Some(notes) = clean(notes) {
            profile.admin_notes = Some(notes);
        }
        profile.interview_scheduled_date = Some(date);
        profile.verification_status = next;
        profile.updated_at = Utc::now();
        self.service.repository.update_educator(profile.clone())?;

        let interview = match self.service.repository.pending_interview(educator_id)? {
            Some(mut interview) => {
                interview.scheduled_for = date;
                interview
            }
            None => VideoInterview::pending(educator_id.clone(), date),
        };
        self.service.repository.save_interview(interview)?;

        info!(educator = %educator_id, scheduled_for = %date, "interview scheduled");
        Ok(profile)
    }

    /// Grant the verified badge after a successful interview.
    pub fn approve_educator(
        &self,
        educator_id: &EducatorId,
    ) -> Result<EducatorProfile, VerificationError> {
        let mut profile = self.load(educator_id)?;
        let next = transition(
            profile.verification_status,
            VerificationEvent::EducatorApproved,
        )?;
        let now = Utc::now();

        // The interview is closed before the profile write: if the latter fails the
        // educator stays interview_scheduled and the approval can be replayed.
        if let Some(mut interview) = self.service.repository.pending_interview(educator_id)? {
            interview.status = InterviewStatus::Passed;
            interview.overall_result = Some(InterviewStatus::Passed);
            interview.failure_reason = None;
            interview.completed_at = Some(now);
            self.service.repository.save_interview(interview)?;
        }

        profile.verification_status = next;
        profile.updated_at = now;
        self.service.repository.update_educator(profile.clone())?;

        info!(educator = %educator_id, reviewer = %self.reviewer().0, "educator verified");
        Ok(profile)
    }

    pub fn reject_educator(
        &self,
        educator_id: &EducatorId,
        reason: &str,
    ) -> Result<EducatorProfile, VerificationError> {
        let reason = required_reason(reason)?;
        let mut profile = self.load(educator_id)?;
        let next = transition(
            profile.verification_status,
            VerificationEvent::EducatorRejected,
        )?;
        let now = Utc::now();

        let mut interview = match self.service.repository.pending_interview(educator_id)? {
            Some(interview) => interview,
            None => VideoInterview::pending(
                educator_id.clone(),
                profile.interview_scheduled_date.unwrap_or(now),
            ),
        };
        interview.status = InterviewStatus::Failed;
        interview.overall_result = Some(InterviewStatus::Failed);
        interview.failure_reason = Some(reason.clone());
        interview.completed_at = Some(now);
        self.service.repository.save_interview(interview)?;

        profile.verification_status = next;
        profile.updated_at = now;
        self.service.repository.update_educator(profile.clone())?;

        info!(educator = %educator_id, reviewer = %self.reviewer().0, %reason, "educator rejected after interview");
        Ok(profile)
    }

    pub fn update_notes(
        &self,
        educator_id: &EducatorId,
        notes: Option<String>,
    ) -> Result<EducatorProfile, VerificationError> {
        let mut profile = self.load(educator_id)?;
        profile.admin_notes = clean(notes);
        profile.updated_at = Utc::now();
        self.service.repository.update_educator(profile.clone())?;
        Ok(profile)
    }

    /// Record that DREETS answered. Informational only: the diploma document keeps
    /// its own review status.
    pub fn mark_regulator_responded(
        &self,
        educator_id: &EducatorId,
    ) -> Result<EducatorProfile, VerificationError> {
        let mut profile = self.load(educator_id)?;
        if profile.diploma.dreets_verification_sent_at.is_none() {
            warn!(educator = %educator_id, "DREETS response recorded without a prior dispatch");
        }
        let now = Utc::now();
        profile.diploma.dreets_verified = true;
        profile.diploma.dreets_response_date = Some(now);
        profile.updated_at = now;
        self.service.repository.update_educator(profile.clone())?;
        info!(educator = %educator_id, "DREETS response recorded");
        Ok(profile)
    }

    pub fn delete_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<EducatorProfile, VerificationError> {
        let document = self.service.documents.fetch(document_id)?;
        self.service.documents.remove(&document)?;

        if document.document_type == DocumentType::Diploma {
            let mut profile = self
                .load(&document.educator_id)
                .map_err(|source| recompute_error(&document, source))?;
            profile.diploma.diploma_url = None;
            profile.diploma.diploma_verification_status = DiplomaVerificationStatus::Pending;
            profile.diploma.diploma_rejected_reason = None;
            profile.updated_at = Utc::now();
            self.service
                .repository
                .update_educator(profile)
                .map_err(|source| recompute_error(&document, source.into()))?;
        }

        self.service
            .documents
            .recompute(&document.educator_id)
            .map_err(|source| recompute_error(&document, source))
    }

    pub fn document_link(
        &self,
        document_id: &DocumentId,
    ) -> Result<DocumentLink, VerificationError> {
        let document = self.service.documents.fetch(document_id)?;
        let ttl = self.service.settings.signed_url_ttl();
        let url = self.service.documents.signed_link(&document, ttl)?;
        Ok(DocumentLink {
            document_id: document.id,
            url,
            expires_in_secs: ttl.as_secs(),
        })
    }

    /// Educators waiting on an admin action, oldest update first.
    pub fn review_queue(&self, limit: usize) -> Result<Vec<ReviewQueueEntry>, VerificationError> {
        let mut profiles = self
            .service
            .repository
            .educators_with_status(&AWAITING_REVIEW, limit)?;
        profiles.sort_by_key(|profile| profile.updated_at);

        profiles
            .iter()
            .map(|profile| {
                let documents = self.service.documents.documents(&profile.id)?;
                Ok(ReviewQueueEntry::build(profile, &documents))
            })
            .collect()
    }

    pub fn recompute(&self, educator_id: &EducatorId) -> Result<EducatorProfile, VerificationError> {
        self.service.documents.recompute(educator_id)
    }

    pub fn criminal_record_history(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Vec<CriminalRecordVerification>, VerificationError> {
        self.load(educator_id)?;
        Ok(self.service.repository.criminal_record_checks(educator_id)?)
    }

    fn load(&self, educator_id: &EducatorId) -> Result<EducatorProfile, VerificationError> {
        self.service
            .repository
            .fetch_educator(educator_id)?
            .ok_or_else(|| VerificationError::EducatorNotFound(educator_id.clone()))
    }

    /// Persist `decision` on the revision that was reviewed.
    ///
    /// The criminal record audit row is written before the document row, and
    /// replaying a decision restores a missing row.
    fn decide(
        &self,
        reviewed: VerificationDocument,
        decision: &DocumentDecision,
    ) -> Result<VerificationDocument, VerificationError> {
        if reviewed.document_type == DocumentType::CriminalRecord {
            self.ensure_criminal_check(&reviewed, decision)?;
        }

        if decision.is_recorded_on(&reviewed) {
            info!(
                document = %reviewed.id,
                status = %reviewed.status.label(),
                "decision already recorded; re-evaluating educator"
            );
            return Ok(reviewed);
        }

        let document = self
            .service
            .repository
            .record_decision(&reviewed.id, decision)?;
        info!(
            educator = %document.educator_id,
            document = %document.id,
            kind = %document.document_type,
            status = %document.status.label(),
            reviewer = %self.reviewer().0,
            "document decision recorded"
        );
        Ok(document)
    }

    /// Append the audit row for a criminal record decision unless the latest row
    /// for this upload already carries the same verdict.
    fn ensure_criminal_check(
        &self,
        reviewed: &VerificationDocument,
        decision: &DocumentDecision,
    ) -> Result<(), VerificationError> {
        let is_clean = decision.status == DocumentStatus::Approved;
        let checks = self
            .service
            .repository
            .criminal_record_checks(&reviewed.educator_id)?;
        let recorded = checks
            .iter()
            .filter(|entry| {
                entry.document_id == reviewed.id && entry.verified_at >= reviewed.uploaded_at
            })
            .max_by_key(|entry| entry.verified_at)
            .is_some_and(|entry| {
                entry.is_clean == is_clean && entry.notes == decision.rejection_reason
            });
        if recorded {
            return Ok(());
        }

        let entry = CriminalRecordVerification {
            id: format!("crv-{}", Uuid::new_v4().simple()),
            educator_id: reviewed.educator_id.clone(),
            document_id: reviewed.id.clone(),
            verified_at: decision.decided_at,
            is_clean,
            notes: decision.rejection_reason.clone(),
            reviewer: self.reviewer().clone(),
        };
        self.service.repository.append_criminal_record_check(entry)?;
        Ok(())
    }

    /// Educator-level consequences of a stored document decision.
    fn after_document_decision(
        &self,
        document: &VerificationDocument,
    ) -> Result<EducatorProfile, VerificationError> {
        let educator_id = &document.educator_id;

        match (document.document_type, document.status) {
            (DocumentType::CriminalRecord, DocumentStatus::Rejected) => {
                let mut profile = self.load(educator_id)?;
                let current = profile.verification_status;
                let next = transition(current, VerificationEvent::CriminalRecordRejected)?;
                if next != current {
                    profile.verification_status = next;
                    profile.updated_at = Utc::now();
                    self.service.repository.update_educator(profile.clone())?;
                    warn!(
                        educator = %educator_id,
                        from = %current,
                        "criminal record rejected; badge and visibility revoked"
                    );
                }
                Ok(profile)
            }
            (DocumentType::Diploma, status) => {
                let mut profile = self.load(educator_id)?;
                let (flag, reason) = match status {
                    DocumentStatus::Approved => (DiplomaVerificationStatus::Verified, None),
                    DocumentStatus::Rejected => (
                        DiplomaVerificationStatus::Rejected,
                        document.rejection_reason.clone(),
                    ),
                    DocumentStatus::Pending => (DiplomaVerificationStatus::Pending, None),
                };
                if profile.diploma.diploma_verification_status != flag
                    || profile.diploma.diploma_rejected_reason != reason
                {
                    profile.diploma.diploma_verification_status = flag;
                    profile.diploma.diploma_rejected_reason = reason;
                    profile.updated_at = Utc::now();
                    self.service.repository.update_educator(profile)?;
                }
                self.service.documents.recompute(educator_id)
            }
            _ => self.service.documents.recompute(educator_id),
        }
    }
}

fn required_reason(reason: &str) -> Result<String, ValidationError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        Err(ValidationError::MissingReason)
    } else {
        Ok(trimmed.to_string())
    }
}

fn clean(notes: Option<String>) -> Option<String> {
    notes
        .map(|notes| notes.trim().to_string())
        .filter(|notes| !notes.is_empty())
}

fn recompute_error(document: &VerificationDocument, source: VerificationError) -> VerificationError {
    VerificationError::Recompute {
        document: document.id.clone(),
        source: Box::new(source),
    }
}
