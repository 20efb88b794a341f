use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 5 * 1024 * 1024;
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 3600;

/// Tunables for document intake and the DREETS hand-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSettings {
    pub max_upload_bytes: u64,
    pub signed_url_ttl_secs: u64,
    pub regulator_dispatch: bool,
}

impl VerificationSettings {
    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            signed_url_ttl_secs: DEFAULT_SIGNED_URL_TTL_SECS,
            regulator_dispatch: true,
        }
    }
}
