use super::domain::{
    CriminalRecordVerification, DocumentDecision, DocumentId, EducatorId, EducatorProfile,
    UserId, VerificationDocument, VerificationStatus, VideoInterview,
};

/// Storage abstraction for everything the verification pipeline persists.
///
/// Implementations must keep a single document row per (educator, document type):
/// `upsert_document` overwrites the existing row for that pair and keeps its id.
pub trait VerificationRepository: Send + Sync {
    fn insert_educator(&self, profile: EducatorProfile)
        -> Result<EducatorProfile, RepositoryError>;
    fn update_educator(&self, profile: EducatorProfile) -> Result<(), RepositoryError>;
    fn fetch_educator(&self, id: &EducatorId) -> Result<Option<EducatorProfile>, RepositoryError>;
    fn fetch_educator_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<EducatorProfile>, RepositoryError>;
    fn educators_with_status(
        &self,
        statuses: &[VerificationStatus],
        limit: usize,
    ) -> Result<Vec<EducatorProfile>, RepositoryError>;

    fn upsert_document(
        &self,
        document: VerificationDocument,
    ) -> Result<VerificationDocument, RepositoryError>;
    /// Apply a review decision to the stored row and return it. Fails with
    /// `Conflict` when the row no longer [`matches`](DocumentDecision::matches) the
    /// reviewed revision.
    fn record_decision(
        &self,
        id: &DocumentId,
        decision: &DocumentDecision,
    ) -> Result<VerificationDocument, RepositoryError>;
    fn fetch_document(
        &self,
        id: &DocumentId,
    ) -> Result<Option<VerificationDocument>, RepositoryError>;
    fn documents_for(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Vec<VerificationDocument>, RepositoryError>;
    fn delete_document(&self, id: &DocumentId) -> Result<(), RepositoryError>;

    /// Append-only: entries are never updated once written.
    fn append_criminal_record_check(
        &self,
        entry: CriminalRecordVerification,
    ) -> Result<(), RepositoryError>;
    fn criminal_record_checks(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Vec<CriminalRecordVerification>, RepositoryError>;

    fn pending_interview(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Option<VideoInterview>, RepositoryError>;
    fn save_interview(&self, interview: VideoInterview) -> Result<(), RepositoryError>;
    fn interviews_for(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Vec<VideoInterview>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
