use thiserror::Error;

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Focus failure: {0}")]
    Focus(String),

    #[error("Clipboard failure: {0}")]
    Clipboard(String),

    #[error("Application not ready: {0}")]
    ApplicationStateNotReady(String),

    #[error("Loaded record does not match. Expected '{expected_id}', found '{found_id}'")]
    IdentifierMismatch {
        expected_id: String,
        found_id: String,
    },

    #[error("Unexpected modal dialog: '{popup_text}'")]
    UnexpectedModal { popup_text: String },

    #[error("Invalid key sequence '{sequence}': {reason}")]
    InvalidKeySequence { sequence: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Unclassified(String),
}

/// Closed set of failure kinds the state machine reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Focus,
    Clipboard,
    ApplicationStateNotReady,
    IdentifierMismatch,
    UnexpectedModal,
    Unclassified,
}

impl ErrorKind {
    /// Whether an error of this kind is safe to re-attempt in place.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::Focus | ErrorKind::Clipboard | ErrorKind::ApplicationStateNotReady
        )
    }
}

impl AutomationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AutomationError::Focus(_) => ErrorKind::Focus,
            AutomationError::Clipboard(_) => ErrorKind::Clipboard,
            AutomationError::ApplicationStateNotReady(_) => ErrorKind::ApplicationStateNotReady,
            AutomationError::IdentifierMismatch { .. } => ErrorKind::IdentifierMismatch,
            AutomationError::UnexpectedModal { .. } => ErrorKind::UnexpectedModal,
            _ => ErrorKind::Unclassified,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Stable code used in logs and reports.
    pub fn error_code(&self) -> &'static str {
        match self {
            AutomationError::Focus(_) => "E3002_FOCUS_FAILURE",
            AutomationError::Clipboard(_) => "E3001_CLIPBOARD_FAILURE",
            AutomationError::ApplicationStateNotReady(_) => "E1001_INVALID_STATE",
            AutomationError::IdentifierMismatch { .. } => "E2001_ID_MISMATCH",
            AutomationError::UnexpectedModal { .. } => "E2002_UNEXPECTED_POPUP",
            AutomationError::InvalidKeySequence { .. } => "E4001_INVALID_KEY_SEQUENCE",
            AutomationError::Config(_) => "E4002_INVALID_CONFIG",
            AutomationError::PlatformError(_) => "E5001_PLATFORM",
            AutomationError::UnsupportedPlatform(_) => "E5002_UNSUPPORTED_PLATFORM",
            AutomationError::Io(_) => "E5003_IO",
            AutomationError::Internal(_) => "E0001_INTERNAL",
            AutomationError::Unclassified(_) => "E0000_UNKNOWN_AUTOMATION_ERROR",
        }
    }

    /// Structured payload for the variants that carry one.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            AutomationError::IdentifierMismatch {
                expected_id,
                found_id,
            } => serde_json::json!({ "expected_id": expected_id, "found_id": found_id }),
            AutomationError::UnexpectedModal { popup_text } => {
                serde_json::json!({ "popup_text": popup_text })
            }
            _ => serde_json::Value::Null,
        }
    }
}
