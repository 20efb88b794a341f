//! Diploma intake: validation, storage, OCR enrichment and the DREETS hand-off.
//!
//! OCR and regulator results are advisory. Neither collaborator can block a
//! submission, and neither feeds the verification state machine.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::collaborators::{
    DependencyError, FileUpload, OcrService, RegulatorNotifier, RegulatorRequest,
};
use super::documents::DocumentStore;
use super::domain::{
    DiplomaAnalysis, DiplomaVerificationStatus, DocumentType, EducatorProfile,
    VerificationDocument, VerificationMethod,
};
use super::errors::{ValidationError, VerificationError};
use super::repository::VerificationRepository;
use super::settings::VerificationSettings;

/// Optional metadata typed in next to the diploma upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiplomaDetails {
    #[serde(default)]
    pub diploma_number: Option<String>,
    #[serde(default)]
    pub delivery_date: Option<NaiveDate>,
    #[serde(default)]
    pub region: Option<String>,
}

impl DiplomaDetails {
    /// Trim free-text fields and enforce the region rule for DREETS professions.
    pub fn normalized(self, method: VerificationMethod) -> Result<Self, ValidationError> {
        let clean = |value: Option<String>| {
            value
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let details = Self {
            diploma_number: clean(self.diploma_number),
            delivery_date: self.delivery_date,
            region: clean(self.region),
        };

        if method == VerificationMethod::Dreets && details.region.is_none() {
            return Err(ValidationError::MissingRegion);
        }

        Ok(details)
    }
}

/// Result of a diploma submission.
#[derive(Debug, Clone, Serialize)]
pub struct DiplomaOutcome {
    pub document: VerificationDocument,
    pub profile: EducatorProfile,
    pub analysis: Option<DiplomaAnalysis>,
    pub regulator_notified: bool,
}

pub struct DiplomaVerifier<R> {
    repository: Arc<R>,
    documents: Arc<DocumentStore<R>>,
    ocr: Arc<dyn OcrService>,
    regulator: Arc<dyn RegulatorNotifier>,
    settings: VerificationSettings,
}

impl<R> DiplomaVerifier<R>
where
    R: VerificationRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        documents: Arc<DocumentStore<R>>,
        ocr: Arc<dyn OcrService>,
        regulator: Arc<dyn RegulatorNotifier>,
        settings: VerificationSettings,
    ) -> Self {
        Self {
            repository,
            documents,
            ocr,
            regulator,
            settings,
        }
    }

    /// Store a new diploma for `profile` and enrich it.
    ///
    /// Validation happens before any write. A new diploma resets the diploma review
    /// flag and any previous regulator exchange.
    pub fn submit(
        &self,
        mut profile: EducatorProfile,
        upload: FileUpload,
        details: DiplomaDetails,
    ) -> Result<DiplomaOutcome, VerificationError> {
        let details = details.normalized(profile.verification_method)?;
        self.documents.policy().validate(&upload)?;

        let document = self
            .documents
            .store(&profile.id, DocumentType::Diploma, &upload)?;

        let analysis = self.analyze(&profile, &upload);

        let diploma = &mut profile.diploma;
        diploma.diploma_url = Some(document.storage_path.clone());
        diploma.diploma_verification_status = DiplomaVerificationStatus::Pending;
        diploma.diploma_rejected_reason = None;
        diploma.diploma_number = details.diploma_number;
        diploma.diploma_delivery_date = details.delivery_date;
        diploma.region = details.region;
        diploma.analysis = analysis.clone();
        diploma.dreets_verification_sent_at = None;
        diploma.dreets_verified = false;
        diploma.dreets_response_date = None;

        let regulator_notified = if profile.verification_method == VerificationMethod::Dreets
            && self.settings.regulator_dispatch
        {
            match self.dispatch_to_regulator(&profile, &document) {
                Some(sent_at) => {
                    profile.diploma.dreets_verification_sent_at = Some(sent_at);
                    true
                }
                None => false,
            }
        } else {
            false
        };

        profile.updated_at = Utc::now();
        self.repository.update_educator(profile.clone())?;

        let profile = self
            .documents
            .recompute(&profile.id)
            .map_err(|source| VerificationError::Recompute {
                document: document.id.clone(),
                source: Box::new(source),
            })?;

        info!(
            educator = %profile.id,
            document = %document.id,
            analyzed = analysis.is_some(),
            regulator_notified,
            "diploma submitted"
        );

        Ok(DiplomaOutcome {
            document,
            profile,
            analysis,
            regulator_notified,
        })
    }

    /// Run OCR on the uploaded diploma. Failures are logged and yield `None`.
    pub fn analyze(&self, profile: &EducatorProfile, upload: &FileUpload) -> Option<DiplomaAnalysis> {
        let report = match self.ocr.analyze_diploma(upload) {
            Ok(report) if report.success => report,
            Ok(_) => {
                let err = DependencyError::InvalidResponse {
                    service: "ocr",
                    reason: "analysis reported failure".to_string(),
                };
                warn!(educator = %profile.id, error = %err, "diploma OCR skipped");
                return None;
            }
            Err(err) => {
                warn!(educator = %profile.id, error = %err, "diploma OCR skipped");
                return None;
            }
        };

        let confidence = if report.confidence.is_finite() {
            report.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Some(DiplomaAnalysis {
            text: report.text,
            confidence,
            validation: report.validation,
            analyzed_at: Utc::now(),
        })
    }

    /// Forward the diploma to the regional authority. Returns the dispatch time on
    /// success; any failure is logged and reported as `None`.
    pub fn dispatch_to_regulator(
        &self,
        profile: &EducatorProfile,
        document: &VerificationDocument,
    ) -> Option<DateTime<Utc>> {
        let diploma_url = match self
            .documents
            .signed_link(document, self.settings.signed_url_ttl())
        {
            Ok(url) => url,
            Err(err) => {
                warn!(educator = %profile.id, error = %err, "could not sign diploma url for DREETS");
                return None;
            }
        };

        let request = RegulatorRequest {
            educator_id: profile.id.clone(),
            diploma_url,
            metadata: regulator_metadata(profile),
        };

        match self.regulator.send_verification_request(request) {
            Ok(receipt) if receipt.success => {
                info!(educator = %profile.id, "diploma forwarded to DREETS");
                Some(Utc::now())
            }
            Ok(_) => {
                warn!(educator = %profile.id, "DREETS notification was not accepted");
                None
            }
            Err(err) => {
                warn!(educator = %profile.id, error = %err, "DREETS notification failed");
                None
            }
        }
    }
}

fn regulator_metadata(profile: &EducatorProfile) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("educator_name".to_string(), profile.display_name());
    metadata.insert("educator_email".to_string(), profile.email.clone());
    if let Some(number) = &profile.diploma.diploma_number {
        metadata.insert("diploma_number".to_string(), number.clone());
    }
    if let Some(date) = profile.diploma.diploma_delivery_date {
        metadata.insert("delivery_date".to_string(), date.format("%Y-%m-%d").to_string());
    }
    if let Some(region) = &profile.diploma.region {
        metadata.insert("region".to_string(), region.clone());
    }
    metadata
}
