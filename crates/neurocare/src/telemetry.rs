use crate::config::{LogFormat, TelemetryConfig};
use std::fmt;
use tracing_subscriber::filter::{LevelFilter, ParseError};
use tracing_subscriber::EnvFilter;

/// Verification decisions are audited through these targets. They are raised to
/// `info` when the configured default level is quieter than that.
const AUDIT_DIRECTIVES: [&str; 1] = ["neurocare::workflows::verification=info"];

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(f, "invalid log filter '{}'", value)
            }
            TelemetryError::Subscriber(err) => {
                write!(f, "could not install tracing subscriber: {err}")
            }
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// `RUST_LOG` wins over the configured level. Audit targets are appended to the
/// configured level only, and never lower its verbosity.
pub fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let level = config.log_level.trim();
    let mut directives = vec![level.to_string()];
    if default_level(level) < LevelFilter::INFO {
        directives.extend(AUDIT_DIRECTIVES.iter().map(|directive| directive.to_string()));
    }
    let value = directives.join(",");

    EnvFilter::try_new(&value).map_err(|source| TelemetryError::EnvFilter { value, source })
}

/// Level of the target-less directive in `level`, `OFF` when there is none.
fn default_level(level: &str) -> LevelFilter {
    level
        .split(',')
        .map(str::trim)
        .filter(|directive| !directive.contains('='))
        .find_map(|directive| directive.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::OFF)
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false);

    match config.format {
        LogFormat::Compact => builder
            .compact()
            .try_init()
            .map_err(TelemetryError::Subscriber),
        LogFormat::Json => builder
            .json()
            .with_current_span(false)
            .try_init()
            .map_err(TelemetryError::Subscriber),
    }
}
