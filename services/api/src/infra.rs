use metrics_exporter_prometheus::PrometheusHandle;
use neurocare::workflows::verification::{
    CriminalRecordVerification, DependencyError, DiplomaValidation, DocumentDecision, DocumentId,
    EducatorId, EducatorProfile, FileUpload, ObjectStorage, OcrReport, OcrService,
    RegulatorNotifier, RegulatorReceipt, RegulatorRequest, RepositoryError, StorageError,
    SubscriptionProvider, SubscriptionStatus, UserId, VerificationDocument,
    VerificationRepository, VerificationStatus, VideoInterview,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
}

#[derive(Default)]
struct Tables {
    educators: HashMap<EducatorId, EducatorProfile>,
    documents: Vec<VerificationDocument>,
    criminal_record_checks: Vec<CriminalRecordVerification>,
    interviews: Vec<VideoInterview>,
}

/// Process-local repository. Every table sits behind one lock so a single call
/// never observes a half-applied write.
#[derive(Default, Clone)]
pub(crate) struct InMemoryVerificationRepository {
    tables: Arc<Mutex<Tables>>,
}

impl VerificationRepository for InMemoryVerificationRepository {
    fn insert_educator(
        &self,
        profile: EducatorProfile,
    ) -> Result<EducatorProfile, RepositoryError> {
        let mut tables = lock(&self.tables)?;
        if tables.educators.contains_key(&profile.id)
            || tables
                .educators
                .values()
                .any(|existing| existing.user_id == profile.user_id)
        {
            return Err(RepositoryError::Conflict);
        }
        tables.educators.insert(profile.id.clone(), profile.clone());
        Ok(profile)
    }

    fn update_educator(&self, profile: EducatorProfile) -> Result<(), RepositoryError> {
        let mut tables = lock(&self.tables)?;
        match tables.educators.get_mut(&profile.id) {
            Some(existing) => {
                *existing = profile;
                Ok(())
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    fn fetch_educator(&self, id: &EducatorId) -> Result<Option<EducatorProfile>, RepositoryError> {
        Ok(lock(&self.tables)?.educators.get(id).cloned())
    }

    fn fetch_educator_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<EducatorProfile>, RepositoryError> {
        Ok(lock(&self.tables)?
            .educators
            .values()
            .find(|profile| &profile.user_id == user_id)
            .cloned())
    }

    fn educators_with_status(
        &self,
        statuses: &[VerificationStatus],
        limit: usize,
    ) -> Result<Vec<EducatorProfile>, RepositoryError> {
        let tables = lock(&self.tables)?;
        let mut matching: Vec<EducatorProfile> = tables
            .educators
            .values()
            .filter(|profile| statuses.contains(&profile.verification_status))
            .cloned()
            .collect();
        matching.sort_by_key(|profile| profile.updated_at);
        matching.truncate(limit);
        Ok(matching)
    }

    fn upsert_document(
        &self,
        document: VerificationDocument,
    ) -> Result<VerificationDocument, RepositoryError> {
        let mut tables = lock(&self.tables)?;
        let existing = tables.documents.iter_mut().find(|existing| {
            existing.educator_id == document.educator_id
                && existing.document_type == document.document_type
        });
        match existing {
            Some(existing) => {
                let id = existing.id.clone();
                *existing = VerificationDocument { id, ..document };
                Ok(existing.clone())
            }
            None => {
                tables.documents.push(document.clone());
                Ok(document)
            }
        }
    }

    fn record_decision(
        &self,
        id: &DocumentId,
        decision: &DocumentDecision,
    ) -> Result<VerificationDocument, RepositoryError> {
        let mut tables = lock(&self.tables)?;
        let existing = tables
            .documents
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
        Ok(lock(&self.tables)?
            .documents
            .iter()
            .find(|document| &document.id == id)
            .cloned())
    }

    fn documents_for(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Vec<VerificationDocument>, RepositoryError> {
        Ok(lock(&self.tables)?
            .documents
            .iter()
            .filter(|document| &document.educator_id == educator_id)
            .cloned()
            .collect())
    }

    fn delete_document(&self, id: &DocumentId) -> Result<(), RepositoryError> {
        let mut tables = lock(&self.tables)?;
        let before = tables.documents.len();
        tables.documents.retain(|document| &document.id != id);
        if tables.documents.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    fn append_criminal_record_check(
        &self,
        entry: CriminalRecordVerification,
    ) -> Result<(), RepositoryError> {
        lock(&self.tables)?.criminal_record_checks.push(entry);
        Ok(())
    }

    fn criminal_record_checks(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Vec<CriminalRecordVerification>, RepositoryError> {
        Ok(lock(&self.tables)?
            .criminal_record_checks
            .iter()
            .filter(|entry| &entry.educator_id == educator_id)
            .cloned()
            .collect())
    }

    fn pending_interview(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Option<VideoInterview>, RepositoryError> {
        Ok(lock(&self.tables)?
            .interviews
            .iter()
            .find(|interview| {
                &interview.educator_id == educator_id && interview.completed_at.is_none()
            })
            .cloned())
    }

    fn save_interview(&self, interview: VideoInterview) -> Result<(), RepositoryError> {
        let mut tables = lock(&self.tables)?;
        match tables
            .interviews
            .iter_mut()
            .find(|existing| existing.id == interview.id)
        {
            Some(existing) => *existing = interview,
            None => tables.interviews.push(interview),
        }
        Ok(())
    }

    fn interviews_for(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Vec<VideoInterview>, RepositoryError> {
        Ok(lock(&self.tables)?
            .interviews
            .iter()
            .filter(|interview| &interview.educator_id == educator_id)
            .cloned()
            .collect())
    }
}

/// Bucket kept in memory. Signed links use the `memory://` scheme.
#[derive(Clone)]
pub(crate) struct InMemoryObjectStorage {
    bucket: String,
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryObjectStorage {
    pub(crate) fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::default(),
        }
    }

    fn objects(&self) -> Result<MutexGuard<'_, BTreeMap<String, Vec<u8>>>, StorageError> {
        self.objects
            .lock()
            .map_err(|_| StorageError::Unavailable("object store poisoned".to_string()))
    }
}

impl ObjectStorage for InMemoryObjectStorage {
    fn upload(&self, path: &str, file: &FileUpload) -> Result<String, StorageError> {
        self.objects()?.insert(path.to_string(), file.bytes.clone());
        Ok(path.to_string())
    }

    fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError> {
        if !self.objects()?.contains_key(path) {
            return Err(StorageError::NotFound(path.to_string()));
        }
        Ok(format!(
            "memory://{}/{}?expires_in={}",
            self.bucket,
            path,
            ttl.as_secs()
        ))
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        self.objects()?
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

/// Reads the embedded text layer of a PDF or plain-text scan. Images carry no text
/// layer and are reported as unanalysable.
#[derive(Default, Clone, Copy)]
pub(crate) struct TextLayerOcr;

impl OcrService for TextLayerOcr {
    fn analyze_diploma(&self, file: &FileUpload) -> Result<OcrReport, DependencyError> {
        let text: String = String::from_utf8_lossy(&file.bytes)
            .chars()
            .filter(|ch| ch.is_alphanumeric() || ch.is_whitespace() || "-/'.".contains(*ch))
            .collect();
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

        if text.is_empty() {
            return Err(DependencyError::InvalidResponse {
                service: "ocr",
                reason: format!("no text layer found in {}", file.file_name),
            });
        }

        let detected_number = text
            .split_whitespace()
            .find(|token| {
                token.contains('-') && token.chars().filter(|ch| ch.is_ascii_digit()).count() >= 4
            })
            .map(str::to_string);

        let mut issues = Vec::new();
        if detected_number.is_none() {
            issues.push("diploma number not found".to_string());
        }
        let mentions_diploma = text.to_lowercase().contains("dipl");
        if !mentions_diploma {
            issues.push("document does not mention a diploma".to_string());
        }

        Ok(OcrReport {
            success: true,
            confidence: if issues.is_empty() { 0.8 } else { 0.4 },
            validation: DiplomaValidation {
                is_valid: issues.is_empty(),
                detected_number,
                detected_delivery_date: None,
                issues,
            },
            text,
        })
    }
}

/// Stands in for the DREETS mail hand-off by logging the request.
#[derive(Default, Clone)]
pub(crate) struct LoggingRegulatorNotifier {
    sent: Arc<Mutex<Vec<RegulatorRequest>>>,
}

impl LoggingRegulatorNotifier {
    pub(crate) fn sent(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or_default()
    }
}

impl RegulatorNotifier for LoggingRegulatorNotifier {
    fn send_verification_request(
        &self,
        request: RegulatorRequest,
    ) -> Result<RegulatorReceipt, DependencyError> {
        info!(
            educator = %request.educator_id,
            region = request.metadata.get("region").map(String::as_str).unwrap_or("unknown"),
            "DREETS verification request queued"
        );
        self.sent
            .lock()
            .map_err(|_| DependencyError::Unavailable {
                service: "dreets",
                reason: "outbox poisoned".to_string(),
            })?
            .push(request);
        Ok(RegulatorReceipt { success: true })
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemorySubscriptions {
    active: Arc<Mutex<HashMap<EducatorId, SubscriptionStatus>>>,
}

impl InMemorySubscriptions {
    pub(crate) fn activate(&self, educator_id: EducatorId, plan: &str) {
        if let Ok(mut active) = self.active.lock() {
            active.insert(
                educator_id,
                SubscriptionStatus {
                    plan: plan.to_string(),
                    active: true,
                    current_period_end: None,
                },
            );
        }
    }
}

impl SubscriptionProvider for InMemorySubscriptions {
    fn active_subscription(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Option<SubscriptionStatus>, DependencyError> {
        let active = self.active.lock().map_err(|_| DependencyError::Unavailable {
            service: "billing",
            reason: "subscription cache poisoned".to_string(),
        })?;
        Ok(active.get(educator_id).cloned())
    }
}
