use chrono::{Duration, Utc};

use crate::workflows::verification::domain::{
    DocumentId, DocumentStatus, DocumentType, EducatorId, VerificationDocument, VerificationStatus,
};
use crate::workflows::verification::state_machine::{
    transition, DocumentAggregate, VerificationEvent,
};

fn document(kind: DocumentType, status: DocumentStatus, age_minutes: i64) -> VerificationDocument {
    VerificationDocument {
        id: DocumentId::generate(),
        educator_id: EducatorId("edu-1".to_string()),
        document_type: kind,
        storage_path: format!("edu-1/{}.pdf", kind.label()),
        file_name: format!("{}.pdf", kind.label()),
        content_type: "application/pdf".to_string(),
        size_bytes: 10,
        status,
        uploaded_at: Utc::now() - Duration::minutes(age_minutes),
        verified_at: None,
        rejection_reason: None,
    }
}

fn full_set(status: DocumentStatus) -> Vec<VerificationDocument> {
    DocumentType::REQUIRED
        .into_iter()
        .map(|kind| document(kind, status, 5))
        .collect()
}

#[test]
fn empty_set_is_pending_documents() {
    let aggregate = DocumentAggregate::from_documents(&Vec::<VerificationDocument>::new());
    assert_eq!(aggregate.phase(), VerificationStatus::PendingDocuments);
    assert_eq!(aggregate.missing(), DocumentType::REQUIRED.to_vec());
}

#[test]
fn partial_set_stays_pending_documents() {
    let documents = vec![
        document(DocumentType::Diploma, DocumentStatus::Approved, 5),
        document(DocumentType::IdCard, DocumentStatus::Approved, 5),
        document(DocumentType::Insurance, DocumentStatus::Approved, 5),
    ];
    let aggregate = DocumentAggregate::from_documents(&documents);
    assert_eq!(aggregate.phase(), VerificationStatus::PendingDocuments);
    assert_eq!(aggregate.missing(), vec![DocumentType::CriminalRecord]);
}

#[test]
fn complete_set_with_pending_items_is_submitted() {
    let mut documents = full_set(DocumentStatus::Approved);
    documents[1].status = DocumentStatus::Pending;
    let aggregate = DocumentAggregate::from_documents(&documents);
    assert_eq!(aggregate.phase(), VerificationStatus::DocumentsSubmitted);
}

#[test]
fn complete_set_with_rejected_item_is_submitted() {
    let mut documents = full_set(DocumentStatus::Approved);
    documents[2].status = DocumentStatus::Rejected;
    let aggregate = DocumentAggregate::from_documents(&documents);
    assert_eq!(aggregate.phase(), VerificationStatus::DocumentsSubmitted);
}

#[test]
fn all_four_approved_is_documents_verified() {
    let aggregate = DocumentAggregate::from_documents(&full_set(DocumentStatus::Approved));
    assert!(aggregate.all_approved());
    assert_eq!(aggregate.phase(), VerificationStatus::DocumentsVerified);
}

#[test]
fn duplicate_rows_block_approval_even_when_latest_is_approved() {
    let mut documents = full_set(DocumentStatus::Approved);
    documents.push(document(DocumentType::Insurance, DocumentStatus::Rejected, 60));

    let aggregate = DocumentAggregate::from_documents(&documents);

    assert!(!aggregate.is_consistent());
    assert_eq!(
        aggregate.duplicates().collect::<Vec<_>>(),
        vec![DocumentType::Insurance]
    );
    assert_eq!(
        aggregate.status_of(DocumentType::Insurance),
        Some(DocumentStatus::Approved),
        "latest upload wins for reporting"
    );
    assert!(!aggregate.all_approved());
    assert_eq!(aggregate.phase(), VerificationStatus::DocumentsSubmitted);
}

#[test]
fn recompute_moves_between_document_phases_in_both_directions() {
    let approved = DocumentAggregate::from_documents(&full_set(DocumentStatus::Approved));
    let submitted = DocumentAggregate::from_documents(&full_set(DocumentStatus::Pending));

    assert_eq!(
        transition(
            VerificationStatus::DocumentsSubmitted,
            VerificationEvent::DocumentsChanged(&approved)
        ),
        Ok(VerificationStatus::DocumentsVerified)
    );
    assert_eq!(
        transition(
            VerificationStatus::DocumentsVerified,
            VerificationEvent::DocumentsChanged(&submitted)
        ),
        Ok(VerificationStatus::DocumentsSubmitted)
    );
}

#[test]
fn recompute_regresses_scheduled_interview_when_documents_change() {
    let mut documents = full_set(DocumentStatus::Approved);
    documents[0].status = DocumentStatus::Pending;
    let aggregate = DocumentAggregate::from_documents(&documents);

    assert_eq!(
        transition(
            VerificationStatus::InterviewScheduled,
            VerificationEvent::DocumentsChanged(&aggregate)
        ),
        Ok(VerificationStatus::DocumentsSubmitted)
    );

    let approved = DocumentAggregate::from_documents(&full_set(DocumentStatus::Approved));
    assert_eq!(
        transition(
            VerificationStatus::InterviewScheduled,
            VerificationEvent::DocumentsChanged(&approved)
        ),
        Ok(VerificationStatus::InterviewScheduled)
    );
}

#[test]
fn recompute_leaves_terminal_states_untouched() {
    let submitted = DocumentAggregate::from_documents(&full_set(DocumentStatus::Pending));
    for status in [
        VerificationStatus::Verified,
        VerificationStatus::RejectedCriminalRecord,
        VerificationStatus::RejectedInterview,
    ] {
        assert_eq!(
            transition(status, VerificationEvent::DocumentsChanged(&submitted)),
            Ok(status)
        );
    }
}

#[test]
fn criminal_record_rejection_wins_from_every_state() {
    for status in [
        VerificationStatus::PendingDocuments,
        VerificationStatus::DocumentsSubmitted,
        VerificationStatus::DocumentsVerified,
        VerificationStatus::InterviewScheduled,
        VerificationStatus::Verified,
        VerificationStatus::RejectedInterview,
        VerificationStatus::RejectedCriminalRecord,
    ] {
        assert_eq!(
            transition(status, VerificationEvent::CriminalRecordRejected),
            Ok(VerificationStatus::RejectedCriminalRecord)
        );
    }
}

#[test]
fn recompute_with_rejected_criminal_record_is_terminal_from_every_state() {
    let mut documents = full_set(DocumentStatus::Approved);
    documents[1].status = DocumentStatus::Rejected;
    let aggregate = DocumentAggregate::from_documents(&documents);
    assert!(aggregate.criminal_record_rejected());

    for status in [
        VerificationStatus::PendingDocuments,
        VerificationStatus::DocumentsSubmitted,
        VerificationStatus::DocumentsVerified,
        VerificationStatus::InterviewScheduled,
        VerificationStatus::Verified,
        VerificationStatus::RejectedInterview,
        VerificationStatus::RejectedCriminalRecord,
    ] {
        assert_eq!(
            transition(status, VerificationEvent::DocumentsChanged(&aggregate)),
            Ok(VerificationStatus::RejectedCriminalRecord),
            "recompute from {status}"
        );
    }
}

#[test]
fn interview_requires_verified_documents() {
    let err = transition(
        VerificationStatus::DocumentsSubmitted,
        VerificationEvent::InterviewScheduled,
    )
    .expect_err("cannot schedule before documents are verified");
    assert_eq!(err.from, VerificationStatus::DocumentsSubmitted);
    assert_eq!(
        err.to_string(),
        "cannot schedule interview while educator is documents_submitted"
    );
}

#[test]
fn educator_decisions_require_a_scheduled_interview() {
    assert_eq!(
        transition(
            VerificationStatus::InterviewScheduled,
            VerificationEvent::EducatorApproved
        ),
        Ok(VerificationStatus::Verified)
    );
    assert_eq!(
        transition(
            VerificationStatus::InterviewScheduled,
            VerificationEvent::EducatorRejected
        ),
        Ok(VerificationStatus::RejectedInterview)
    );
    assert!(transition(
        VerificationStatus::DocumentsVerified,
        VerificationEvent::EducatorApproved
    )
    .is_err());
    assert!(transition(
        VerificationStatus::RejectedCriminalRecord,
        VerificationEvent::EducatorApproved
    )
    .is_err());
}

#[test]
fn badge_and_visibility_follow_status() {
    for status in [
        VerificationStatus::PendingDocuments,
        VerificationStatus::DocumentsSubmitted,
        VerificationStatus::DocumentsVerified,
        VerificationStatus::InterviewScheduled,
        VerificationStatus::RejectedCriminalRecord,
        VerificationStatus::RejectedInterview,
    ] {
        let visibility = status.projection();
        assert!(!visibility.verification_badge, "{status} must not carry a badge");
        assert!(!visibility.profile_visible, "{status} must not be listed");
    }

    let verified = VerificationStatus::Verified.projection();
    assert!(verified.verification_badge && verified.profile_visible);
}
