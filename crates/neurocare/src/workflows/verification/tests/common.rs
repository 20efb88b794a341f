use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::workflows::verification::collaborators::{
    Collaborators, DependencyError, FileUpload, ObjectStorage, OcrReport, OcrService,
    RegulatorNotifier, RegulatorReceipt, RegulatorRequest, StorageError, SubscriptionProvider,
    SubscriptionStatus,
};
use crate::workflows::verification::domain::{
    CriminalRecordVerification, DiplomaValidation, DocumentDecision, DocumentId, DocumentType,
    EducatorId, EducatorProfile, EducatorRegistration, UserId, VerificationDocument,
    VerificationMethod, VerificationStatus, VideoInterview,
};
use crate::workflows::verification::repository::{RepositoryError, VerificationRepository};
use crate::workflows::verification::{
    verification_router, Actor, AdminReviewService, EducatorVerificationService, Role,
    SubscriptionGate, SubscriptionLimits, VerificationSettings, VerificationState,
};

pub(super) const ADMIN_ID: &str = "admin-1";

pub(super) fn admin() -> Actor {
    Actor::new(ADMIN_ID, Role::Admin)
}

pub(super) fn educator(user: &str) -> Actor {
    Actor::new(user, Role::Educator)
}

pub(super) fn registration(method: VerificationMethod) -> EducatorRegistration {
    EducatorRegistration {
        first_name: "Camille".to_string(),
        last_name: "Moreau".to_string(),
        email: "camille@example.org".to_string(),
        phone: Some("+33 6 12 34 56 78".to_string()),
        verification_method: method,
    }
}

pub(super) fn pdf(name: &str) -> FileUpload {
    FileUpload::new(
        name,
        Some("application/pdf".to_string()),
        b"%PDF-1.4 test document".to_vec(),
    )
}

pub(super) fn interview_date() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 11, 3, 14, 30, 0)
        .single()
        .expect("valid date")
}

pub(super) struct Harness {
    pub(super) educators: EducatorVerificationService<MemoryRepository>,
    pub(super) review: AdminReviewService<MemoryRepository>,
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) storage: Arc<MemoryStorage>,
    pub(super) regulator: Arc<RecordingRegulator>,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self::with(Arc::new(StubOcr::default()), VerificationSettings::default())
    }

    pub(super) fn with(ocr: Arc<dyn OcrService>, settings: VerificationSettings) -> Self {
        Self::build(ocr, RecordingRegulator::default(), settings)
    }

    pub(super) fn with_regulator(regulator: RecordingRegulator) -> Self {
        Self::build(
            Arc::new(StubOcr::default()),
            regulator,
            VerificationSettings::default(),
        )
    }

    fn build(
        ocr: Arc<dyn OcrService>,
        regulator: RecordingRegulator,
        settings: VerificationSettings,
    ) -> Self {
        let repository = Arc::new(MemoryRepository::default());
        let storage = Arc::new(MemoryStorage::default());
        let regulator = Arc::new(regulator);
        let collaborators = Collaborators::new(storage.clone(), ocr, regulator.clone());
        let educators = EducatorVerificationService::new(
            repository.clone(),
            collaborators.clone(),
            settings.clone(),
        );
        let review = AdminReviewService::new(repository.clone(), collaborators, settings);
        Self {
            educators,
            review,
            repository,
            storage,
            regulator,
        }
    }

    pub(super) fn register(&self, user: &str, method: VerificationMethod) -> EducatorProfile {
        self.educators
            .register(&educator(user), registration(method))
            .expect("registration succeeds")
    }

    /// Upload all four documents and return them keyed by type.
    pub(super) fn upload_all(
        &self,
        user: &str,
        educator_id: &EducatorId,
    ) -> BTreeMap<DocumentType, DocumentId> {
        DocumentType::REQUIRED
            .into_iter()
            .map(|kind| {
                let document = self
                    .educators
                    .upload_document(
                        &educator(user),
                        educator_id,
                        kind,
                        pdf(&format!("{}.pdf", kind.label())),
                    )
                    .expect("upload succeeds");
                (kind, document.id)
            })
            .collect()
    }

    pub(super) fn approve_all(&self, documents: &BTreeMap<DocumentType, DocumentId>) {
        let session = self.review.authorize(&admin()).expect("admin session");
        for id in documents.values() {
            session.approve_document(id).expect("approve succeeds");
        }
    }

    /// Register, upload, approve, schedule and approve an educator.
    pub(super) fn verified_educator(
        &self,
        user: &str,
    ) -> (EducatorProfile, BTreeMap<DocumentType, DocumentId>) {
        let profile = self.register(user, VerificationMethod::Standard);
        let documents = self.upload_all(user, &profile.id);
        self.approve_all(&documents);
        let session = self.review.authorize(&admin()).expect("admin session");
        session
            .schedule_interview(&profile.id, Some(interview_date()), None)
            .expect("interview scheduled");
        let profile = session
            .approve_educator(&profile.id)
            .expect("educator approved");
        (profile, documents)
    }

    pub(super) fn status(&self, educator_id: &EducatorId) -> VerificationStatus {
        self.profile(educator_id).verification_status
    }

    pub(super) fn profile(&self, educator_id: &EducatorId) -> EducatorProfile {
        self.repository
            .fetch_educator(educator_id)
            .expect("fetch succeeds")
            .expect("educator present")
    }

    pub(super) fn into_router(self) -> axum::Router {
        let gate = SubscriptionGate::new(
            Arc::new(StaticSubscriptions::default()),
            SubscriptionLimits::default(),
        );
        verification_router(VerificationState {
            educators: Arc::new(self.educators),
            review: Arc::new(self.review),
            gate: Arc::new(gate),
        })
    }
}

/// Repository writes that tests can make fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RepositoryCall {
    UpdateEducator,
    RecordDecision,
    AppendCriminalCheck,
}

#[derive(Default)]
pub(super) struct MemoryRepository {
    educators: Mutex<HashMap<EducatorId, EducatorProfile>>,
    documents: Mutex<Vec<VerificationDocument>>,
    checks: Mutex<Vec<CriminalRecordVerification>>,
    interviews: Mutex<Vec<VideoInterview>>,
    failures: Mutex<Vec<RepositoryCall>>,
    stale: Mutex<Option<VerificationDocument>>,
}

impl MemoryRepository {
    /// Bypass the upsert to simulate storage that lost its uniqueness guarantee.
    pub(super) fn push_raw_document(&self, document: VerificationDocument) {
        self.documents
            .lock()
            .expect("documents mutex poisoned")
            .push(document);
    }

    /// Drop the criminal record audit trail, as after a lost audit write.
    pub(super) fn clear_criminal_checks(&self) {
        self.checks.lock().expect("checks mutex poisoned").clear();
    }

    /// Make the next `call` return `Unavailable`.
    pub(super) fn fail_next(&self, call: RepositoryCall) {
        self.failures
            .lock()
            .expect("failures mutex poisoned")
            .push(call);
    }

    /// Serve `document` on the next fetch of its id, as a reader that loaded the row
    /// before a concurrent write would see it.
    pub(super) fn serve_stale(&self, document: VerificationDocument) {
        *self.stale.lock().expect("stale mutex poisoned") = Some(document);
    }

    fn check(&self, call: RepositoryCall) -> Result<(), RepositoryError> {
        let mut failures = self.failures.lock().expect("failures mutex poisoned");
        match failures.iter().position(|pending| *pending == call) {
            Some(index) => {
                failures.remove(index);
                Err(RepositoryError::Unavailable(format!("{call:?} failed")))
            }
            None => Ok(()),
        }
    }
}

impl VerificationRepository for MemoryRepository {
    fn insert_educator(
        &self,
        profile: EducatorProfile,
    ) -> Result<EducatorProfile, RepositoryError> {
        let mut guard = self.educators.lock().expect("educators mutex poisoned");
        if guard.contains_key(&profile.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    fn update_educator(&self, profile: EducatorProfile) -> Result<(), RepositoryError> {
        self.check(RepositoryCall::UpdateEducator)?;
        let mut guard = self.educators.lock().expect("educators mutex poisoned");
        if !guard.contains_key(&profile.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(profile.id.clone(), profile);
        Ok(())
    }

    fn fetch_educator(&self, id: &EducatorId) -> Result<Option<EducatorProfile>, RepositoryError> {
        let guard = self.educators.lock().expect("educators mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn fetch_educator_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<EducatorProfile>, RepositoryError> {
        let guard = self.educators.lock().expect("educators mutex poisoned");
        Ok(guard
            .values()
            .find(|profile| &profile.user_id == user_id)
            .cloned())
    }

    fn educators_with_status(
        &self,
        statuses: &[VerificationStatus],
        limit: usize,
    ) -> Result<Vec<EducatorProfile>, RepositoryError> {
        let guard = self.educators.lock().expect("educators mutex poisoned");
        Ok(guard
            .values()
            .filter(|profile| statuses.contains(&profile.verification_status))
            .take(limit)
            .cloned()
            .collect())
    }

    fn upsert_document(
        &self,
        document: VerificationDocument,
    ) -> Result<VerificationDocument, RepositoryError> {
        let mut guard = self.documents.lock().expect("documents mutex poisoned");
        match guard.iter_mut().find(|existing| {
            existing.educator_id == document.educator_id
                && existing.document_type == document.document_type
        }) {
            Some(existing) => {
                let id = existing.id.clone();
                *existing = VerificationDocument { id, ..document };
                Ok(existing.clone())
            }
            None => {
                guard.push(document.clone());
                Ok(document)
            }
        }
    }

    fn record_decision(
        &self,
        id: &DocumentId,
        decision: &DocumentDecision,
    ) -> Result<VerificationDocument, RepositoryError> {
        self.check(RepositoryCall::RecordDecision)?;
        let mut guard = self.documents.lock().expect("documents mutex poisoned");
        let existing = guard
            .iter_mut()
            .find(|existing| &existing.id == id)
            .ok_or(RepositoryError::NotFound)?;
        if !decision.matches(existing) {
            return Err(RepositoryError::Conflict);
        }
        decision.apply(existing);
        Ok(existing.clone())
    }

    fn fetch_document(
        &self,
        id: &DocumentId,
    ) -> Result<Option<VerificationDocument>, RepositoryError> {
        let mut stale = self.stale.lock().expect("stale mutex poisoned");
        if stale.as_ref().is_some_and(|document| &document.id == id) {
            return Ok(stale.take());
        }
        drop(stale);
        let guard = self.documents.lock().expect("documents mutex poisoned");
        Ok(guard.iter().find(|document| &document.id == id).cloned())
    }

    fn documents_for(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Vec<VerificationDocument>, RepositoryError> {
        let guard = self.documents.lock().expect("documents mutex poisoned");
        Ok(guard
            .iter()
            .filter(|document| &document.educator_id == educator_id)
            .cloned()
            .collect())
    }

    fn delete_document(&self, id: &DocumentId) -> Result<(), RepositoryError> {
        let mut guard = self.documents.lock().expect("documents mutex poisoned");
        guard.retain(|document| &document.id != id);
        Ok(())
    }

    fn append_criminal_record_check(
        &self,
        entry: CriminalRecordVerification,
    ) -> Result<(), RepositoryError> {
        self.check(RepositoryCall::AppendCriminalCheck)?;
        self.checks
            .lock()
            .expect("checks mutex poisoned")
            .push(entry);
        Ok(())
    }

    fn criminal_record_checks(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Vec<CriminalRecordVerification>, RepositoryError> {
        let guard = self.checks.lock().expect("checks mutex poisoned");
        Ok(guard
            .iter()
            .filter(|entry| &entry.educator_id == educator_id)
            .cloned()
            .collect())
    }

    fn pending_interview(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Option<VideoInterview>, RepositoryError> {
        let guard = self.interviews.lock().expect("interviews mutex poisoned");
        Ok(guard
            .iter()
            .find(|interview| {
                &interview.educator_id == educator_id && interview.completed_at.is_none()
            })
            .cloned())
    }

    fn save_interview(&self, interview: VideoInterview) -> Result<(), RepositoryError> {
        let mut guard = self.interviews.lock().expect("interviews mutex poisoned");
        match guard.iter_mut().find(|existing| existing.id == interview.id) {
            Some(existing) => *existing = interview,
            None => guard.push(interview),
        }
        Ok(())
    }

    fn interviews_for(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Vec<VideoInterview>, RepositoryError> {
        let guard = self.interviews.lock().expect("interviews mutex poisoned");
        Ok(guard
            .iter()
            .filter(|interview| &interview.educator_id == educator_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct MemoryStorage {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub(super) fn paths(&self) -> Vec<String> {
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

impl ObjectStorage for MemoryStorage {
    fn upload(&self, path: &str, file: &FileUpload) -> Result<String, StorageError> {
        let mut guard = self.objects.lock().expect("storage mutex poisoned");
        guard.insert(path.to_string(), file.bytes.clone());
        Ok(path.to_string())
    }

    fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError> {
        let guard = self.objects.lock().expect("storage mutex poisoned");
        if !guard.contains_key(path) {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(format!(
            "memory://verification-documents/{path}?expires_in={}",
            ttl.as_secs()
        ))
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        let mut guard = self.objects.lock().expect("storage mutex poisoned");
        guard
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

#[derive(Default)]
pub(super) struct StubOcr;

impl OcrService for StubOcr {
    fn analyze_diploma(&self, _file: &FileUpload) -> Result<OcrReport, DependencyError> {
        Ok(OcrReport {
            success: true,
            text: "Diplôme d'État d'Éducateur Spécialisé".to_string(),
            confidence: 0.92,
            validation: DiplomaValidation {
                is_valid: true,
                detected_number: Some("DEES-2021-0042".to_string()),
                detected_delivery_date: None,
                issues: Vec::new(),
            },
        })
    }
}

pub(super) struct FailingOcr;

impl OcrService for FailingOcr {
    fn analyze_diploma(&self, _file: &FileUpload) -> Result<OcrReport, DependencyError> {
        Err(DependencyError::Unavailable {
            service: "ocr",
            reason: "connection refused".to_string(),
        })
    }
}

/// How the fake regional authority answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) enum RegulatorReply {
    #[default]
    Accepted,
    Refused,
    Unavailable,
}

#[derive(Default)]
pub(super) struct RecordingRegulator {
    requests: Mutex<Vec<RegulatorRequest>>,
    reply: RegulatorReply,
}

impl RecordingRegulator {
    pub(super) fn replying(reply: RegulatorReply) -> Self {
        Self {
            requests: Mutex::default(),
            reply,
        }
    }

    pub(super) fn requests(&self) -> Vec<RegulatorRequest> {
        self.requests
            .lock()
            .expect("regulator mutex poisoned")
            .clone()
    }
}

impl RegulatorNotifier for RecordingRegulator {
    fn send_verification_request(
        &self,
        request: RegulatorRequest,
    ) -> Result<RegulatorReceipt, DependencyError> {
        self.requests
            .lock()
            .expect("regulator mutex poisoned")
            .push(request);
        match self.reply {
            RegulatorReply::Accepted => Ok(RegulatorReceipt { success: true }),
            RegulatorReply::Refused => Ok(RegulatorReceipt { success: false }),
            RegulatorReply::Unavailable => Err(DependencyError::Unavailable {
                service: "dreets",
                reason: "gateway timeout".to_string(),
            }),
        }
    }
}

#[derive(Default)]
pub(super) struct StaticSubscriptions {
    pub(super) subscribed: Vec<EducatorId>,
}

impl SubscriptionProvider for StaticSubscriptions {
    fn active_subscription(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Option<SubscriptionStatus>, DependencyError> {
        Ok(self
            .subscribed
            .contains(educator_id)
            .then(|| SubscriptionStatus {
                plan: "pro".to_string(),
                active: true,
                current_period_end: None,
            }))
    }
}

pub(super) struct UnavailableSubscriptions;

impl SubscriptionProvider for UnavailableSubscriptions {
    fn active_subscription(
        &self,
        _educator_id: &EducatorId,
    ) -> Result<Option<SubscriptionStatus>, DependencyError> {
        Err(DependencyError::Unavailable {
            service: "billing",
            reason: "timeout".to_string(),
        })
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
