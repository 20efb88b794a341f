//! Outbound collaborators consumed by the verification pipeline.
//!
//! Object storage, OCR, the DREETS notifier and the subscription provider are all
//! external systems; the pipeline only depends on these traits.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{DiplomaValidation, EducatorId};

/// Raw file received from an educator before it reaches object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn extension(&self) -> Option<&str> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }
}

pub trait ObjectStorage: Send + Sync {
    fn upload(&self, path: &str, file: &FileUpload) -> Result<String, StorageError>;
    fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, StorageError>;
    fn remove(&self, path: &str) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object {0} not found in storage")]
    NotFound(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Raw answer of the OCR service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrReport {
    pub success: bool,
    pub text: String,
    pub confidence: f32,
    pub validation: DiplomaValidation,
}

pub trait OcrService: Send + Sync {
    fn analyze_diploma(&self, file: &FileUpload) -> Result<OcrReport, DependencyError>;
}

/// Payload forwarded to the regional DREETS office.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulatorRequest {
    pub educator_id: EducatorId,
    pub diploma_url: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegulatorReceipt {
    pub success: bool,
}

pub trait RegulatorNotifier: Send + Sync {
    fn send_verification_request(
        &self,
        request: RegulatorRequest,
    ) -> Result<RegulatorReceipt, DependencyError>;
}

/// Subscription snapshot exposed by the billing provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    pub plan: String,
    pub active: bool,
    #[serde(default)]
    pub current_period_end: Option<DateTime<Utc>>,
}

pub trait SubscriptionProvider: Send + Sync {
    fn active_subscription(
        &self,
        educator_id: &EducatorId,
    ) -> Result<Option<SubscriptionStatus>, DependencyError>;
}

/// Failure of an advisory collaborator. These are logged, never surfaced.
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },
    #[error("{service} returned an unusable response: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },
}

/// Bundle of the collaborators the verification services call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn ObjectStorage>,
    pub ocr: Arc<dyn OcrService>,
    pub regulator: Arc<dyn RegulatorNotifier>,
}

impl Collaborators {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        ocr: Arc<dyn OcrService>,
        regulator: Arc<dyn RegulatorNotifier>,
    ) -> Self {
        Self {
            storage,
            ocr,
            regulator,
        }
    }
}
