use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::domain::{
    DiplomaVerificationStatus, DocumentId, DocumentType, EducatorId, EducatorProfile,
    VerificationDocument, VideoInterview,
};
use super::state_machine::DocumentAggregate;

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub document_id: DocumentId,
    pub document_type: DocumentType,
    pub status: &'static str,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl From<&VerificationDocument> for DocumentSummary {
    fn from(document: &VerificationDocument) -> Self {
        Self {
            document_id: document.id.clone(),
            document_type: document.document_type,
            status: document.status.label(),
            file_name: document.file_name.clone(),
            uploaded_at: document.uploaded_at,
            verified_at: document.verified_at,
            rejection_reason: document.rejection_reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InterviewSummary {
    pub interview_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&VideoInterview> for InterviewSummary {
    fn from(interview: &VideoInterview) -> Self {
        Self {
            interview_id: interview.id.clone(),
            scheduled_for: interview.scheduled_for,
            status: interview.status.label(),
            failure_reason: interview.failure_reason.clone(),
            completed_at: interview.completed_at,
        }
    }
}

/// Full verification file as shown to its owner or to an admin.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationOverview {
    pub educator_id: EducatorId,
    pub status: &'static str,
    pub verification_badge: bool,
    pub profile_visible: bool,
    pub documents: Vec<DocumentSummary>,
    pub missing_documents: Vec<DocumentType>,
    pub diploma_verification_status: DiplomaVerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diploma_rejected_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dreets_verification_sent_at: Option<DateTime<Utc>>,
    pub dreets_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interview_scheduled_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interview: Option<InterviewSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
}

impl VerificationOverview {
    pub fn build(
        profile: &EducatorProfile,
        documents: &[VerificationDocument],
        latest_interview: Option<&VideoInterview>,
        include_admin_notes: bool,
    ) -> Self {
        let aggregate = DocumentAggregate::from_documents(documents);
        let visibility = profile.visibility();
        let mut summaries: Vec<DocumentSummary> =
            documents.iter().map(DocumentSummary::from).collect();
        summaries.sort_by_key(|summary| summary.document_type);

        Self {
            educator_id: profile.id.clone(),
            status: profile.verification_status.label(),
            verification_badge: visibility.verification_badge,
            profile_visible: visibility.profile_visible,
            documents: summaries,
            missing_documents: aggregate.missing(),
            diploma_verification_status: profile.diploma.diploma_verification_status,
            diploma_rejected_reason: profile.diploma.diploma_rejected_reason.clone(),
            dreets_verification_sent_at: profile.diploma.dreets_verification_sent_at,
            dreets_verified: profile.diploma.dreets_verified,
            interview_scheduled_date: profile.interview_scheduled_date,
            interview: latest_interview.map(InterviewSummary::from),
            admin_notes: if include_admin_notes {
                profile.admin_notes.clone()
            } else {
                None
            },
        }
    }
}

/// One row of the admin review queue.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewQueueEntry {
    pub educator_id: EducatorId,
    pub display_name: String,
    pub status: &'static str,
    pub pending_documents: usize,
    pub approved_documents: usize,
    pub rejected_documents: usize,
    pub missing_documents: Vec<DocumentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interview_scheduled_date: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewQueueEntry {
    pub fn build(profile: &EducatorProfile, documents: &[VerificationDocument]) -> Self {
        use super::domain::DocumentStatus;

        let aggregate = DocumentAggregate::from_documents(documents);
        let count = |status: DocumentStatus| {
            DocumentType::REQUIRED
                .iter()
                .filter(|kind| aggregate.status_of(**kind) == Some(status))
                .count()
        };

        Self {
            educator_id: profile.id.clone(),
            display_name: profile.display_name(),
            status: profile.verification_status.label(),
            pending_documents: count(DocumentStatus::Pending),
            approved_documents: count(DocumentStatus::Approved),
            rejected_documents: count(DocumentStatus::Rejected),
            missing_documents: aggregate.missing(),
            interview_scheduled_date: profile.interview_scheduled_date,
            updated_at: profile.updated_at,
        }
    }
}

/// What families see of a verified educator.
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfileView {
    pub educator_id: EducatorId,
    pub first_name: String,
    pub last_name: String,
    pub verification_badge: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diploma_delivery_date: Option<NaiveDate>,
}

impl From<&EducatorProfile> for PublicProfileView {
    fn from(profile: &EducatorProfile) -> Self {
        Self {
            educator_id: profile.id.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            verification_badge: profile.verification_badge(),
            region: profile.diploma.region.clone(),
            diploma_delivery_date: profile.diploma.diploma_delivery_date,
        }
    }
}

/// Time-limited link to a stored document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentLink {
    pub document_id: DocumentId,
    pub url: String,
    pub expires_in_secs: u64,
}
