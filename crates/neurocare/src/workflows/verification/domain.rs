use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for educator profiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EducatorId(pub String);

impl EducatorId {
    pub fn generate() -> Self {
        Self(format!("edu-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for EducatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for uploaded verification documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn generate() -> Self {
        Self(format!("doc-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque user reference issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// The four documents every educator must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Diploma,
    CriminalRecord,
    IdCard,
    Insurance,
}

impl DocumentType {
    pub const REQUIRED: [DocumentType; 4] = [
        DocumentType::Diploma,
        DocumentType::CriminalRecord,
        DocumentType::IdCard,
        DocumentType::Insurance,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            DocumentType::Diploma => "diploma",
            DocumentType::CriminalRecord => "criminal_record",
            DocumentType::IdCard => "id_card",
            DocumentType::Insurance => "insurance",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "diploma" => Some(DocumentType::Diploma),
            "criminal_record" => Some(DocumentType::CriminalRecord),
            "id_card" => Some(DocumentType::IdCard),
            "insurance" => Some(DocumentType::Insurance),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Review state of a single uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
}

impl DocumentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Approved => "approved",
            DocumentStatus::Rejected => "rejected",
        }
    }
}

/// Position of an educator in the verification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    PendingDocuments,
    DocumentsSubmitted,
    DocumentsVerified,
    InterviewScheduled,
    Verified,
    RejectedCriminalRecord,
    RejectedInterview,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            VerificationStatus::PendingDocuments => "pending_documents",
            VerificationStatus::DocumentsSubmitted => "documents_submitted",
            VerificationStatus::DocumentsVerified => "documents_verified",
            VerificationStatus::InterviewScheduled => "interview_scheduled",
            VerificationStatus::Verified => "verified",
            VerificationStatus::RejectedCriminalRecord => "rejected_criminal_record",
            VerificationStatus::RejectedInterview => "rejected_interview",
        }
    }

    /// Terminal states are never left through document recomputation.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            VerificationStatus::Verified
                | VerificationStatus::RejectedCriminalRecord
                | VerificationStatus::RejectedInterview
        )
    }

    /// States whose value is fully determined by the document set.
    pub const fn is_document_phase(self) -> bool {
        matches!(
            self,
            VerificationStatus::PendingDocuments
                | VerificationStatus::DocumentsSubmitted
                | VerificationStatus::DocumentsVerified
        )
    }

    /// Badge and visibility are a pure function of the status.
    pub const fn projection(self) -> Visibility {
        match self {
            VerificationStatus::Verified => Visibility {
                verification_badge: true,
                profile_visible: true,
            },
            _ => Visibility {
                verification_badge: false,
                profile_visible: false,
            },
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Public flags derived from [`VerificationStatus::projection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visibility {
    pub verification_badge: bool,
    pub profile_visible: bool,
}

/// Tri-state diploma review flag kept alongside the diploma document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiplomaVerificationStatus {
    Pending,
    Verified,
    Rejected,
}

/// How an educator's diploma is confirmed. `Dreets` professions require the regional
/// authority to be notified and a region to be provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    #[default]
    Standard,
    Dreets,
}

/// Structural verdict returned by the OCR collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiplomaValidation {
    pub is_valid: bool,
    #[serde(default)]
    pub detected_number: Option<String>,
    #[serde(default)]
    pub detected_delivery_date: Option<NaiveDate>,
    #[serde(default)]
    pub issues: Vec<String>,
}

/// Advisory OCR output stored on the profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiplomaAnalysis {
    pub text: String,
    pub confidence: f32,
    pub validation: DiplomaValidation,
    pub analyzed_at: DateTime<Utc>,
}

/// Diploma related fields of an educator profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiplomaRecord {
    pub diploma_url: Option<String>,
    pub diploma_verification_status: DiplomaVerificationStatus,
    pub diploma_rejected_reason: Option<String>,
    pub diploma_number: Option<String>,
    pub diploma_delivery_date: Option<NaiveDate>,
    pub region: Option<String>,
    pub analysis: Option<DiplomaAnalysis>,
    pub dreets_verification_sent_at: Option<DateTime<Utc>>,
    pub dreets_verified: bool,
    pub dreets_response_date: Option<DateTime<Utc>>,
}

impl Default for DiplomaRecord {
    fn default() -> Self {
        Self {
            diploma_url: None,
            diploma_verification_status: DiplomaVerificationStatus::Pending,
            diploma_rejected_reason: None,
            diploma_number: None,
            diploma_delivery_date: None,
            region: None,
            analysis: None,
            dreets_verification_sent_at: None,
            dreets_verified: false,
            dreets_response_date: None,
        }
    }
}

/// Registration payload submitted by a newly signed-up educator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducatorRegistration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub verification_method: VerificationMethod,
}

/// Educator profile as persisted by the repository.
///
/// Badge and visibility are intentionally not stored: they are read through
/// [`EducatorProfile::visibility`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EducatorProfile {
    pub id: EducatorId,
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub verification_method: VerificationMethod,
    pub verification_status: VerificationStatus,
    pub admin_notes: Option<String>,
    pub interview_scheduled_date: Option<DateTime<Utc>>,
    pub diploma: DiplomaRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EducatorProfile {
    pub fn new(id: EducatorId, user_id: UserId, registration: EducatorRegistration) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            first_name: registration.first_name,
            last_name: registration.last_name,
            email: registration.email,
            phone: registration.phone,
            verification_method: registration.verification_method,
            verification_status: VerificationStatus::PendingDocuments,
            admin_notes: None,
            interview_scheduled_date: None,
            diploma: DiplomaRecord::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn visibility(&self) -> Visibility {
        self.verification_status.projection()
    }

    pub fn verification_badge(&self) -> bool {
        self.visibility().verification_badge
    }

    pub fn profile_visible(&self) -> bool {
        self.visibility().profile_visible
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// One uploaded verification document. Storage keeps a single row per
/// (educator, type); re-upload overwrites it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationDocument {
    pub id: DocumentId,
    pub educator_id: EducatorId,
    pub document_type: DocumentType,
    pub storage_path: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub status: DocumentStatus,
    pub uploaded_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

impl VerificationDocument {
    /// Point the row at a freshly uploaded file and reset the review state.
    pub fn replace_file(&mut self, stored: StoredFile, uploaded_at: DateTime<Utc>) {
        self.storage_path = stored.storage_path;
        self.file_name = stored.file_name;
        self.content_type = stored.content_type;
        self.size_bytes = stored.size_bytes;
        self.status = DocumentStatus::Pending;
        self.uploaded_at = uploaded_at;
        self.verified_at = None;
        self.rejection_reason = None;
    }
}

/// Admin verdict on the revision of a document that was actually reviewed.
///
/// A re-upload between review and write changes `uploaded_at` and the storage
/// path, so the decision no longer [`matches`](DocumentDecision::matches) the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDecision {
    pub reviewed_upload: DateTime<Utc>,
    pub reviewed_path: String,
    pub status: DocumentStatus,
    pub decided_at: DateTime<Utc>,
    pub rejection_reason: Option<String>,
}

impl DocumentDecision {
    pub fn approve(reviewed: &VerificationDocument, decided_at: DateTime<Utc>) -> Self {
        Self {
            reviewed_upload: reviewed.uploaded_at,
            reviewed_path: reviewed.storage_path.clone(),
            status: DocumentStatus::Approved,
            decided_at,
            rejection_reason: None,
        }
    }

    pub fn reject(
        reviewed: &VerificationDocument,
        reason: String,
        decided_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reviewed_upload: reviewed.uploaded_at,
            reviewed_path: reviewed.storage_path.clone(),
            status: DocumentStatus::Rejected,
            decided_at,
            rejection_reason: Some(reason),
        }
    }

    pub fn matches(&self, document: &VerificationDocument) -> bool {
        document.uploaded_at == self.reviewed_upload && document.storage_path == self.reviewed_path
    }

    /// True when `document` already carries this verdict.
    pub fn is_recorded_on(&self, document: &VerificationDocument) -> bool {
        document.status == self.status && document.rejection_reason == self.rejection_reason
    }

    pub fn apply(&self, document: &mut VerificationDocument) {
        document.status = self.status;
        document.verified_at = Some(self.decided_at);
        document.rejection_reason = self.rejection_reason.clone();
    }
}

/// Metadata of a file after it has been written to object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub storage_path: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
}

/// Append-only evidence behind every criminal record decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriminalRecordVerification {
    pub id: String,
    pub educator_id: EducatorId,
    pub document_id: DocumentId,
    pub verified_at: DateTime<Utc>,
    pub is_clean: bool,
    pub notes: Option<String>,
    pub reviewer: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    Pending,
    Passed,
    Failed,
}

impl InterviewStatus {
    pub const fn label(self) -> &'static str {
        match self {
            InterviewStatus::Pending => "pending",
            InterviewStatus::Passed => "passed",
            InterviewStatus::Failed => "failed",
        }
    }
}

/// Video interview booked once all documents are approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInterview {
    pub id: String,
    pub educator_id: EducatorId,
    pub scheduled_for: DateTime<Utc>,
    pub status: InterviewStatus,
    pub overall_result: Option<InterviewStatus>,
    pub failure_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl VideoInterview {
    pub fn pending(educator_id: EducatorId, scheduled_for: DateTime<Utc>) -> Self {
        Self {
            id: format!("itw-{}", Uuid::new_v4().simple()),
            educator_id,
            scheduled_for,
            status: InterviewStatus::Pending,
            overall_result: None,
            failure_reason: None,
            completed_at: None,
        }
    }
}
