use super::access::AccessError;
use super::collaborators::StorageError;
use super::domain::{DocumentId, EducatorId};
use super::repository::RepositoryError;
use super::state_machine::TransitionError;

/// Input rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("a rejection reason is required")]
    MissingReason,
    #[error("an interview date is required")]
    MissingInterviewDate,
    #[error("a region is required for DREETS diploma verification")]
    MissingRegion,
    #[error("{0} must not be empty")]
    MissingField(&'static str),
    #[error("uploaded file is empty")]
    EmptyFile,
    #[error("unsupported file type '{0}': expected an image or a PDF")]
    UnsupportedFileType(String),
    #[error("file is {size} bytes, above the {max} byte limit")]
    FileTooLarge { size: u64, max: u64 },
}

/// Error raised by the verification services.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("educator {0} not found")]
    EducatorNotFound(EducatorId),
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),
    #[error("an educator profile already exists for this account")]
    AlreadyRegistered,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The document decision was saved; only the derived educator status is stale.
    #[error("document {document} was saved but the educator status could not be recomputed: {source}")]
    Recompute {
        document: DocumentId,
        #[source]
        source: Box<VerificationError>,
    },
}

impl VerificationError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VerificationError::EducatorNotFound(_)
                | VerificationError::DocumentNotFound(_)
                | VerificationError::Repository(RepositoryError::NotFound)
        )
    }
}
