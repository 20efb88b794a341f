use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::collaborators::{FileUpload, ObjectStorage, StorageError};
use super::domain::{
    DocumentId, DocumentStatus, DocumentType, EducatorId, EducatorProfile, StoredFile,
    VerificationDocument,
};
use super::errors::{ValidationError, VerificationError};
use super::repository::{RepositoryError, VerificationRepository};
use super::settings::DEFAULT_MAX_UPLOAD_BYTES;
use super::state_machine::{transition, DocumentAggregate, VerificationEvent};

/// Accepted upload shapes: any image or a PDF, up to a size cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilePolicy {
    max_upload_bytes: u64,
}

impl FilePolicy {
    pub fn new(max_upload_bytes: u64) -> Self {
        let max_upload_bytes = if max_upload_bytes == 0 {
            DEFAULT_MAX_UPLOAD_BYTES
        } else {
            max_upload_bytes
        };
        Self { max_upload_bytes }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Resolve and check the content type, then the size. The declared type wins;
    /// the file name is only consulted when none was sent.
    pub fn validate(&self, upload: &FileUpload) -> Result<mime::Mime, ValidationError> {
        if upload.bytes.is_empty() {
            return Err(ValidationError::EmptyFile);
        }

        let declared = upload
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty());
        let content_type = match declared {
            Some(raw) => raw
                .parse::<mime::Mime>()
                .map_err(|_| ValidationError::UnsupportedFileType(raw.to_string()))?,
            None => mime_guess::from_path(&upload.file_name)
                .first()
                .ok_or_else(|| ValidationError::UnsupportedFileType(upload.file_name.clone()))?,
        };

        let accepted = content_type.type_() == mime::IMAGE
            || content_type.essence_str() == mime::APPLICATION_PDF.essence_str();
        if !accepted {
            return Err(ValidationError::UnsupportedFileType(
                content_type.essence_str().to_string(),
            ));
        }

        if upload.size() > self.max_upload_bytes {
            return Err(ValidationError::FileTooLarge {
                size: upload.size(),
                max: self.max_upload_bytes,
            });
        }

        Ok(content_type)
    }
}

impl Default for FilePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

/// Storage path of an uploaded document: `<educator>/<type>_<unix millis>.<ext>`.
pub fn storage_path(
    educator_id: &EducatorId,
    kind: DocumentType,
    upload: &FileUpload,
    content_type: &mime::Mime,
    uploaded_at: DateTime<Utc>,
) -> String {
    let extension = upload
        .extension()
        .map(str::to_ascii_lowercase)
        .or_else(|| {
            mime_guess::get_mime_extensions(content_type)
                .and_then(|extensions| extensions.first())
                .map(|ext| ext.to_string())
        })
        .unwrap_or_else(|| "bin".to_string());

    format!(
        "{}/{}_{}.{}",
        educator_id,
        kind.label(),
        uploaded_at.timestamp_millis(),
        extension
    )
}

/// Adapter between uploads, object storage and the document rows.
pub struct DocumentStore<R> {
    repository: Arc<R>,
    storage: Arc<dyn ObjectStorage>,
    policy: FilePolicy,
}

impl<R> DocumentStore<R>
where
    R: VerificationRepository + 'static,
{
    pub fn new(repository: Arc<R>, storage: Arc<dyn ObjectStorage>, policy: FilePolicy) -> Self {
        Self {
            repository,
            storage,
            policy,
        }
    }

    pub fn policy(&self) -> &FilePolicy {
        &self.policy
    }

    /// Upload a file and record it as the educator's current document of that type.
    ///
    /// Re-uploading reuses the existing row, resets it to pending and clears the
    /// previous decision.
    pub fn store(
        &self,
        educator_id: &EducatorId,
        kind: DocumentType,
        upload: &FileUpload,
    ) -> Result<VerificationDocument, VerificationError> {
        let content_type = self.policy.validate(upload)?;
        let uploaded_at = Utc::now();
        let path = storage_path(educator_id, kind, upload, &content_type, uploaded_at);
        let storage_path = self.storage.upload(&path, upload)?;

        let stored = StoredFile {
            storage_path,
            file_name: upload.file_name.clone(),
            content_type: content_type.essence_str().to_string(),
            size_bytes: upload.size(),
        };

        let existing = self.current(educator_id, kind)?;
        let previous_path = existing
            .as_ref()
            .map(|document| document.storage_path.clone());

        let document = match existing {
            Some(mut document) => {
                document.replace_file(stored, uploaded_at);
                document
            }
            None => VerificationDocument {
                id: DocumentId::generate(),
                educator_id: educator_id.clone(),
                document_type: kind,
                storage_path: stored.storage_path,
                file_name: stored.file_name,
                content_type: stored.content_type,
                size_bytes: stored.size_bytes,
                status: DocumentStatus::Pending,
                uploaded_at,
                verified_at: None,
                rejection_reason: None,
            },
        };

        let saved = self.repository.upsert_document(document)?;

        if let Some(previous) = previous_path.filter(|path| path != &saved.storage_path) {
            if let Err(err) = self.storage.remove(&previous) {
                warn!(educator = %educator_id, path = %previous, error = %err, "failed to remove superseded document file");
            }
        }

        info!(
            educator = %educator_id,
            document = %saved.id,
            kind = %kind,
            size = saved.size_bytes,
            "verification document stored"
        );
        Ok(saved)
    }

    pub fn current(
        &self,
        educator_id: &EducatorId,
        kind: DocumentType,
    ) -> Result<Option<VerificationDocument>, RepositoryError> {
        let latest = self
            .repository
            .documents_for(educator_id)?
            .into_iter()
            .filter(|document| document.document_type == kind)
            .max_by_key(|document| document.uploaded_at);
        Ok(latest)
    }

    pub fn fetch(&self, id: &DocumentId) -> Result<VerificationDocument, VerificationError> {
        self.repository
            .fetch_document(id)?
            .ok_or_else(|| VerificationError::DocumentNotFound(id.clone()))
    }

    pub fn documents(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Vec<VerificationDocument>, RepositoryError> {
        self.repository.documents_for(educator_id)
    }

    pub fn aggregate(&self, educator_id: &EducatorId) -> Result<DocumentAggregate, RepositoryError> {
        let documents = self.repository.documents_for(educator_id)?;
        let aggregate = DocumentAggregate::from_documents(&documents);
        if !aggregate.is_consistent() {
            let duplicates: Vec<&'static str> =
                aggregate.duplicates().map(DocumentType::label).collect();
            warn!(
                educator = %educator_id,
                ?duplicates,
                "duplicate document rows found; treating the set as not approved"
            );
        }
        Ok(aggregate)
    }

    /// Delete the stored file and its row. A file already missing from storage is
    /// not an error.
    pub fn remove(&self, document: &VerificationDocument) -> Result<(), VerificationError> {
        match self.storage.remove(&document.storage_path) {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        self.repository.delete_document(&document.id)?;
        info!(
            educator = %document.educator_id,
            document = %document.id,
            kind = %document.document_type,
            "verification document deleted"
        );
        Ok(())
    }

    pub fn signed_link(
        &self,
        document: &VerificationDocument,
        ttl: Duration,
    ) -> Result<String, StorageError> {
        self.storage.signed_url(&document.storage_path, ttl)
    }

    /// Re-derive the educator status from the stored documents.
    ///
    /// Always reads fresh state, so it can be retried after any partial failure.
    pub fn recompute(&self, educator_id: &EducatorId) -> Result<EducatorProfile, VerificationError> {
        let mut profile = self
            .repository
            .fetch_educator(educator_id)?
            .ok_or_else(|| VerificationError::EducatorNotFound(educator_id.clone()))?;

        let aggregate = self.aggregate(educator_id)?;
        let current = profile.verification_status;
        let next = transition(current, VerificationEvent::DocumentsChanged(&aggregate))?;

        if next != current {
            profile.verification_status = next;
            profile.updated_at = Utc::now();
            self.repository.update_educator(profile.clone())?;
            info!(
                educator = %educator_id,
                from = %current,
                to = %next,
                "verification status recomputed"
            );
        }

        Ok(profile)
    }
}
