//! Error types for op-sync.
//!
//! Every fallible operation returns [`SyncError`]. Sub-enums group the
//! failure by where it happened: configuration loading, parameter decoding,
//! calls to the vault or a target service, client-side sealing, and the
//! planning/apply passes.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for op-sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// One or more spec parameters are missing or mistyped.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A call to the vault or a target service failed.
    #[error("{0}")]
    Service(#[from] ServiceError),

    /// Client-side sealing failed.
    #[error("Encryption failed: {0}")]
    Crypto(#[from] CryptoError),

    /// Planning or apply errors.
    #[error("{0}")]
    Plan(#[from] PlanError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The run was cancelled or hit its deadline.
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// No configuration file was given and none was discovered.
    #[error("No configuration file found (looked for {candidates})")]
    NotDiscovered {
        /// Comma separated file names that were searched for.
        candidates: String,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// A spec entry is malformed.
    #[error("Invalid spec \"{name}\": {message}")]
    InvalidSpec {
        /// Spec name.
        name: String,
        /// What is wrong with it.
        message: String,
    },
}

/// One bad field found while decoding a parameter bag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// A required parameter is absent.
    Missing {
        /// Parameter key.
        key: String,
    },

    /// A parameter is present but has the wrong type.
    InvalidType {
        /// Parameter key.
        key: String,
        /// Name of the expected type.
        expected: &'static str,
    },

    /// A parameter has the right type but an unacceptable value.
    InvalidValue {
        /// Parameter key.
        key: String,
        /// Why the value was rejected.
        message: String,
    },
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { key } => write!(f, "parameter \"{key}\" is required"),
            Self::InvalidType { key, expected } => {
                write!(f, "invalid type for parameter \"{key}\", want {expected}")
            }
            Self::InvalidValue { key, message } => {
                write!(f, "invalid value for parameter \"{key}\": {message}")
            }
        }
    }
}

/// Every field error collected while decoding one parameter bag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", join_fields(.errors))]
pub struct ValidationError {
    /// The collected field errors, in the order they were found.
    pub errors: Vec<FieldError>,
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Returns true if a field error mentions `key`.
    #[must_use]
    pub fn mentions(&self, key: &str) -> bool {
        self.errors.iter().any(|e| match e {
            FieldError::Missing { key: k }
            | FieldError::InvalidType { key: k, .. }
            | FieldError::InvalidValue { key: k, .. } => k == key,
        })
    }
}

/// Errors from the vault CLI or a target service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The addressed resource does not exist yet.
    #[error("{service}: {resource} not found")]
    NotFound {
        /// Service that reported the absence.
        service: String,
        /// Resource that was looked up.
        resource: String,
    },

    /// An external command exited unsuccessfully.
    #[error("`{command}` failed: {message}")]
    CommandFailed {
        /// Command line that was run.
        command: String,
        /// Trimmed stderr or spawn error.
        message: String,
    },

    /// A service API call failed.
    #[error("{service} API request failed: {message}")]
    Api {
        /// Service name.
        service: String,
        /// HTTP status, when one was received.
        status: Option<u16>,
        /// Error message from the service.
        message: String,
    },

    /// A service answered with something that could not be understood.
    #[error("Invalid response from {service}: {message}")]
    InvalidResponse {
        /// Service name.
        service: String,
        /// Description of the response issue.
        message: String,
    },

    /// No credentials could be found for a service.
    #[error("Missing credentials for {service}: {message}")]
    MissingCredentials {
        /// Service name.
        service: String,
        /// How to provide them.
        message: String,
    },
}

/// Errors from sealed-box encryption.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The public key is not valid base64.
    #[error("invalid base64 in public key")]
    InvalidBase64,

    /// The decoded public key is not a Curve25519 key.
    #[error("invalid public key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The sealing primitive itself failed.
    #[error("sealed box encryption failed")]
    SealFailed,
}

/// A spec that could not be planned.
#[derive(Debug)]
pub struct SpecFailure {
    /// Spec name.
    pub spec: String,
    /// Why planning failed.
    pub error: SyncError,
}

/// Planning and apply errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// A spec names a type with no registered backend.
    #[error("backend for type \"{backend}\" not found")]
    UnknownBackend {
        /// The unregistered type.
        backend: String,
    },

    /// Spec names were requested that the configuration does not define.
    #[error("unknown secrets {}", quoted_list(.names))]
    UnknownSpecs {
        /// Sorted unknown names.
        names: Vec<String>,
    },

    /// One or more specs failed to plan; no plans are returned.
    #[error("{}", join_failures(.failures))]
    SpecsFailed {
        /// Every failure in spec order.
        failures: Vec<SpecFailure>,
    },

    /// Applying a plan failed; later plans were not applied.
    #[error("failed to apply \"{spec}\": {source}")]
    ApplyFailed {
        /// Spec the failed plan came from.
        spec: String,
        /// Underlying error.
        source: Box<SyncError>,
    },
}

fn quoted_list(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("\"{n}\"")).collect();
    format!("[{}]", quoted.join(" "))
}

fn join_failures(failures: &[SpecFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("spec \"{}\": {}", f.spec, f.error))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type alias for op-sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this is a target-specific "does not exist" error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Service(ServiceError::NotFound { .. }))
    }
}

impl ServiceError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(service: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::NotFound {
            service: service.into(),
            resource: resource.into(),
        }
    }

    /// Creates an API error without an HTTP status.
    #[must_use]
    pub fn api(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            service: service.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Creates an API error for a failed HTTP response.
    #[must_use]
    pub fn http(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            service: service.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Returns true if this is the not-found sentinel.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl ConfigError {
    /// Creates an invalid spec error.
    #[must_use]
    pub fn invalid_spec(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSpec {
            name: name.into(),
            message: message.into(),
        }
    }
}
