//! Verification state machine.
//!
//! The profile status is either derived from the document set (the three document
//! phases) or set by an explicit admin decision. Every move goes through
//! [`transition`] so the legal edges live in one place.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::domain::{DocumentStatus, DocumentType, VerificationDocument, VerificationStatus};

/// Snapshot of the latest record per canonical document type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentAggregate {
    latest: BTreeMap<DocumentType, DocumentStatus>,
    duplicates: BTreeSet<DocumentType>,
}

impl DocumentAggregate {
    pub fn from_documents<'a, I>(documents: I) -> Self
    where
        I: IntoIterator<Item = &'a VerificationDocument>,
    {
        let mut newest: BTreeMap<DocumentType, &VerificationDocument> = BTreeMap::new();
        let mut duplicates = BTreeSet::new();

        for document in documents {
            match newest.get(&document.document_type) {
                Some(existing) => {
                    duplicates.insert(document.document_type);
                    if document.uploaded_at > existing.uploaded_at {
                        newest.insert(document.document_type, document);
                    }
                }
                None => {
                    newest.insert(document.document_type, document);
                }
            }
        }

        let latest = newest
            .into_iter()
            .map(|(kind, document)| (kind, document.status))
            .collect();

        Self { latest, duplicates }
    }

    pub fn status_of(&self, kind: DocumentType) -> Option<DocumentStatus> {
        self.latest.get(&kind).copied()
    }

    pub fn missing(&self) -> Vec<DocumentType> {
        DocumentType::REQUIRED
            .into_iter()
            .filter(|kind| !self.latest.contains_key(kind))
            .collect()
    }

    pub fn all_present(&self) -> bool {
        DocumentType::REQUIRED
            .iter()
            .all(|kind| self.latest.contains_key(kind))
    }

    /// Duplicate rows for a type mean storage lost its uniqueness guarantee; the
    /// aggregate then refuses to report the set as approved.
    pub fn is_consistent(&self) -> bool {
        self.duplicates.is_empty()
    }

    pub fn duplicates(&self) -> impl Iterator<Item = DocumentType> + '_ {
        self.duplicates.iter().copied()
    }

    pub fn all_approved(&self) -> bool {
        self.is_consistent()
            && DocumentType::REQUIRED
                .iter()
                .all(|kind| self.status_of(*kind) == Some(DocumentStatus::Approved))
    }

    pub fn criminal_record_rejected(&self) -> bool {
        self.status_of(DocumentType::CriminalRecord) == Some(DocumentStatus::Rejected)
    }

    pub fn phase(&self) -> VerificationStatus {
        if self.all_approved() {
            VerificationStatus::DocumentsVerified
        } else if self.all_present() {
            VerificationStatus::DocumentsSubmitted
        } else {
            VerificationStatus::PendingDocuments
        }
    }
}

/// Inputs that may move an educator's verification status.
#[derive(Debug, Clone, Copy)]
pub enum VerificationEvent<'a> {
    DocumentsChanged(&'a DocumentAggregate),
    CriminalRecordRejected,
    InterviewScheduled,
    EducatorApproved,
    EducatorRejected,
}

impl VerificationEvent<'_> {
    pub const fn action(&self) -> &'static str {
        match self {
            VerificationEvent::DocumentsChanged(_) => "recompute documents",
            VerificationEvent::CriminalRecordRejected => "reject criminal record",
            VerificationEvent::InterviewScheduled => "schedule interview",
            VerificationEvent::EducatorApproved => "approve educator",
            VerificationEvent::EducatorRejected => "reject educator",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} while educator is {from}")]
pub struct TransitionError {
    pub from: VerificationStatus,
    pub action: &'static str,
}

/// Apply an event to the current status.
///
/// Document recomputation never fails. A rejected criminal record forces
/// `rejected_criminal_record` from every state, so a recompute reaches the same
/// result as the rejection itself. Otherwise, outside the document phases the
/// status is left untouched, except that a scheduled interview falls back to the
/// document phase once its documents stop being fully approved.
pub fn transition(
    current: VerificationStatus,
    event: VerificationEvent<'_>,
) -> Result<VerificationStatus, TransitionError> {
    use VerificationStatus::*;

    match (current, event) {
        (_, VerificationEvent::CriminalRecordRejected) => Ok(RejectedCriminalRecord),
        (_, VerificationEvent::DocumentsChanged(aggregate))
            if aggregate.criminal_record_rejected() =>
        {
            Ok(RejectedCriminalRecord)
        }
        (status, VerificationEvent::DocumentsChanged(aggregate)) => {
            let phase = aggregate.phase();
            let next = match status {
                PendingDocuments | DocumentsSubmitted | DocumentsVerified => phase,
                InterviewScheduled if phase != DocumentsVerified => phase,
                other => other,
            };
            Ok(next)
        }
        (DocumentsVerified, VerificationEvent::InterviewScheduled) => Ok(InterviewScheduled),
        // Rescheduling keeps the educator in the interview stage.
        (InterviewScheduled, VerificationEvent::InterviewScheduled) => Ok(InterviewScheduled),
        (InterviewScheduled, VerificationEvent::EducatorApproved) => Ok(Verified),
        (InterviewScheduled, VerificationEvent::EducatorRejected) => Ok(RejectedInterview),
        (from, event) => Err(TransitionError {
            from,
            action: event.action(),
        }),
    }
}
