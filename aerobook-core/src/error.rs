use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Raw failure of a single distribution API call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream returned error {code}: {message}")]
    Business { code: i32, message: String },

    #[error("upstream transport failure: {message}")]
    Transport { status: Option<u16>, message: String },

    #[error("upstream call timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure taxonomy of the booking workflow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("session expired ({code}): {message}")]
    SessionExpired { code: i32, message: String },

    #[error("no itinerary in the fresh search matches leg {leg_index} ({route})")]
    NoMatchFound { leg_index: usize, route: String },

    #[error("booking already exists for this offer: {message}")]
    BookingAlreadyExists { code: i32, message: String },

    #[error("upstream business error {code}: {message}")]
    UpstreamBusiness { code: i32, message: String },

    #[error("transient upstream failure: {0}")]
    Transient(String),

    #[error("precondition not met: {0}")]
    ValidationPrecondition(String),

    #[error("invalid leg transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("session store failure: {0}")]
    Store(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    SessionExpired,
    NoMatchFound,
    BookingAlreadyExists,
    UpstreamBusinessError,
    Transient,
    ValidationPrecondition,
    InvalidTransition,
    Store,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = serde_json::to_value(self).map_err(|_| fmt::Error)?;
        f.write_str(value.as_str().unwrap_or_default())
    }
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::SessionExpired { .. } => ErrorKind::SessionExpired,
            BookingError::NoMatchFound { .. } => ErrorKind::NoMatchFound,
            BookingError::BookingAlreadyExists { .. } => ErrorKind::BookingAlreadyExists,
            BookingError::UpstreamBusiness { .. } => ErrorKind::UpstreamBusinessError,
            BookingError::Transient(_) => ErrorKind::Transient,
            BookingError::ValidationPrecondition(_) => ErrorKind::ValidationPrecondition,
            BookingError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            BookingError::Store(_) => ErrorKind::Store,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, BookingError::SessionExpired { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, BookingError::Transient(_))
    }
}

pub const DEFAULT_SESSION_EXPIRED_CODES: &[i32] = &[5, 6];
pub const DEFAULT_BOOKING_EXISTS_CODES: &[i32] = &[21];

/// Maps distribution API failures onto [`BookingError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassifier {
    pub session_expired_codes: Vec<i32>,
    pub booking_exists_codes: Vec<i32>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            session_expired_codes: DEFAULT_SESSION_EXPIRED_CODES.to_vec(),
            booking_exists_codes: DEFAULT_BOOKING_EXISTS_CODES.to_vec(),
        }
    }
}

impl ErrorClassifier {
    pub fn classify(&self, error: UpstreamError) -> BookingError {
        match error {
            UpstreamError::Business { code, message } => self.classify_fault(code, message),
            UpstreamError::Transport { status, message } => match status {
                Some(408) | Some(429) => BookingError::Transient(message),
                Some(s) if (400..500).contains(&s) => BookingError::UpstreamBusiness {
                    code: s as i32,
                    message,
                },
                _ => BookingError::Transient(message),
            },
            UpstreamError::Timeout(after) => {
                BookingError::Transient(format!("timed out after {:?}", after))
            }
        }
    }

    /// Classifies a business error code carried inside an otherwise successful response.
    pub fn classify_fault(&self, code: i32, message: impl Into<String>) -> BookingError {
        let message = message.into();
        if self.session_expired_codes.contains(&code) || mentions_expired_trace(&message) {
            BookingError::SessionExpired { code, message }
        } else if self.booking_exists_codes.contains(&code) {
            BookingError::BookingAlreadyExists { code, message }
        } else {
            BookingError::UpstreamBusiness { code, message }
        }
    }
}

fn mentions_expired_trace(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    (lower.contains("traceid") || lower.contains("session"))
        && (lower.contains("expired") || lower.contains("invalid"))
}
