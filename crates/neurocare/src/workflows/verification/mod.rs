//! Educator verification and trust pipeline.
//!
//! Educators upload four documents, admins review them, and the profile moves
//! through `pending_documents → documents_submitted → documents_verified →
//! interview_scheduled → verified`. A rejected criminal record ends the pipeline
//! from any state. Badge and visibility are projected from the status.

pub mod access;
pub mod collaborators;
pub mod diploma;
pub mod documents;
pub mod domain;
pub mod errors;
pub mod gating;
pub mod repository;
pub mod review;
pub mod router;
pub mod service;
pub mod settings;
pub mod state_machine;
pub mod views;

#[cfg(test)]
mod tests;

pub use access::{AccessError, Actor, Role};
pub use collaborators::{
    Collaborators, DependencyError, FileUpload, ObjectStorage, OcrReport, OcrService,
    RegulatorNotifier, RegulatorReceipt, RegulatorRequest, StorageError, SubscriptionProvider,
    SubscriptionStatus,
};
pub use diploma::{DiplomaDetails, DiplomaOutcome};
pub use domain::{
    CriminalRecordVerification, DiplomaAnalysis, DiplomaValidation, DiplomaVerificationStatus,
    DocumentDecision, DocumentId, DocumentStatus, DocumentType, EducatorId, EducatorProfile,
    EducatorRegistration, InterviewStatus, UserId, VerificationDocument, VerificationMethod,
    VerificationStatus, VideoInterview, Visibility,
};
pub use errors::{ValidationError, VerificationError};
pub use gating::{GateDecision, SubscriptionGate, SubscriptionLimits};
pub use repository::{RepositoryError, VerificationRepository};
pub use review::{AdminReviewService, AdminSession, ReviewOutcome};
pub use router::{verification_router, VerificationState};
pub use service::EducatorVerificationService;
pub use settings::VerificationSettings;
pub use state_machine::{transition, DocumentAggregate, TransitionError, VerificationEvent};
pub use views::{ReviewQueueEntry, VerificationOverview};
