use std::sync::Arc;

use tracing::info;

use super::access::{require_educator, require_owner_or_admin, Actor};
use super::collaborators::{Collaborators, FileUpload};
use super::diploma::{DiplomaDetails, DiplomaOutcome, DiplomaVerifier};
use super::documents::{DocumentStore, FilePolicy};
use super::domain::{
    DocumentType, EducatorId, EducatorProfile, EducatorRegistration, VerificationDocument,
    VideoInterview,
};
use super::errors::{ValidationError, VerificationError};
use super::repository::VerificationRepository;
use super::settings::VerificationSettings;
use super::views::{PublicProfileView, VerificationOverview};

/// Educator-facing side of the pipeline: registration, uploads and status.
pub struct EducatorVerificationService<R> {
    repository: Arc<R>,
    documents: Arc<DocumentStore<R>>,
    diploma: DiplomaVerifier<R>,
}

impl<R> EducatorVerificationService<R>
where
    R: VerificationRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        collaborators: Collaborators,
        settings: VerificationSettings,
    ) -> Self {
        let documents = Arc::new(DocumentStore::new(
            repository.clone(),
            collaborators.storage.clone(),
            FilePolicy::new(settings.max_upload_bytes),
        ));
        let diploma = DiplomaVerifier::new(
            repository.clone(),
            documents.clone(),
            collaborators.ocr,
            collaborators.regulator,
            settings,
        );

        Self {
            repository,
            documents,
            diploma,
        }
    }

    /// Create the verification file of a freshly signed-up educator.
    pub fn register(
        &self,
        actor: &Actor,
        registration: EducatorRegistration,
    ) -> Result<EducatorProfile, VerificationError> {
        require_educator(actor)?;

        let registration = EducatorRegistration {
            first_name: required(registration.first_name, "first_name")?,
            last_name: required(registration.last_name, "last_name")?,
            email: required(registration.email, "email")?,
            phone: registration
                .phone
                .map(|phone| phone.trim().to_string())
                .filter(|phone| !phone.is_empty()),
            verification_method: registration.verification_method,
        };

        if self
            .repository
            .fetch_educator_by_user(&actor.user_id)?
            .is_some()
        {
            return Err(VerificationError::AlreadyRegistered);
        }

        let profile = EducatorProfile::new(EducatorId::generate(), actor.user_id.clone(), registration);
        let stored = self.repository.insert_educator(profile)?;
        info!(educator = %stored.id, method = ?stored.verification_method, "educator registered");
        Ok(stored)
    }

    /// Upload one of the required documents.
    ///
    /// Diplomas go through the diploma flow, keeping the metadata already on file.
    pub fn upload_document(
        &self,
        actor: &Actor,
        educator_id: &EducatorId,
        kind: DocumentType,
        upload: FileUpload,
    ) -> Result<VerificationDocument, VerificationError> {
        let profile = self.load(educator_id)?;
        require_owner_or_admin(actor, &profile)?;

        if kind == DocumentType::Diploma {
            let details = DiplomaDetails {
                diploma_number: profile.diploma.diploma_number.clone(),
                delivery_date: profile.diploma.diploma_delivery_date,
                region: profile.diploma.region.clone(),
            };
            return self
                .diploma
                .submit(profile, upload, details)
                .map(|outcome| outcome.document);
        }

        let document = self.documents.store(educator_id, kind, &upload)?;
        self.documents
            .recompute(educator_id)
            .map_err(|source| VerificationError::Recompute {
                document: document.id.clone(),
                source: Box::new(source),
            })?;
        Ok(document)
    }

    pub fn submit_diploma(
        &self,
        actor: &Actor,
        educator_id: &EducatorId,
        upload: FileUpload,
        details: DiplomaDetails,
    ) -> Result<DiplomaOutcome, VerificationError> {
        let profile = self.load(educator_id)?;
        require_owner_or_admin(actor, &profile)?;
        self.diploma.submit(profile, upload, details)
    }

    pub fn overview(
        &self,
        actor: &Actor,
        educator_id: &EducatorId,
    ) -> Result<VerificationOverview, VerificationError> {
        let profile = self.load(educator_id)?;
        require_owner_or_admin(actor, &profile)?;

        let documents = self.documents.documents(educator_id)?;
        let interviews = self.repository.interviews_for(educator_id)?;
        let latest_interview = latest(&interviews);

        Ok(VerificationOverview::build(
            &profile,
            &documents,
            latest_interview,
            actor.is_admin(),
        ))
    }

    /// Public listing data; unverified educators are reported as not found.
    pub fn public_profile(
        &self,
        educator_id: &EducatorId,
    ) -> Result<PublicProfileView, VerificationError> {
        let profile = self.load(educator_id)?;
        if !profile.profile_visible() {
            return Err(VerificationError::EducatorNotFound(educator_id.clone()));
        }
        Ok(PublicProfileView::from(&profile))
    }

    /// Profile owned by the calling educator.
    pub fn own_profile(&self, actor: &Actor) -> Result<EducatorProfile, VerificationError> {
        require_educator(actor)?;
        self.repository
            .fetch_educator_by_user(&actor.user_id)?
            .ok_or_else(|| VerificationError::EducatorNotFound(EducatorId(actor.user_id.0.clone())))
    }

    fn load(&self, educator_id: &EducatorId) -> Result<EducatorProfile, VerificationError> {
        self.repository
            .fetch_educator(educator_id)?
            .ok_or_else(|| VerificationError::EducatorNotFound(educator_id.clone()))
    }
}

fn required(value: String, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(trimmed.to_string())
    }
}

pub(crate) fn latest(interviews: &[VideoInterview]) -> Option<&VideoInterview> {
    interviews
        .iter()
        .max_by_key(|interview| (interview.completed_at.is_none(), interview.scheduled_for))
}
