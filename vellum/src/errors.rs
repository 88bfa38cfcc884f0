use backtrace::Backtrace;
use parking_lot::Mutex;
use serde::{de, ser};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;
use std::sync::Arc;

/// Error kinds for Vellum operations.
///
/// Each kind names one category of failure so callers can decide how to react,
/// typically by matching on [`VellumError::kind`]. The kinds that describe a
/// missing or contended document carry the identity (and for lock conflicts the
/// stale version) so the caller has what it needs to re-fetch and retry.
///
/// # Examples
///
/// ```rust,ignore
/// use vellum::errors::{ErrorKind, VellumError};
///
/// match repository.update(id, item).await {
///     Err(e) if matches!(e.kind(), ErrorKind::OptimisticLockConflict { .. }) => {
///         // re-fetch, re-apply, retry
///     }
///     other => other?,
/// };
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Identity Errors
    /// The identifier is malformed or cannot be normalized
    InvalidIdentifier,

    // Typing Errors
    /// A value of the wrong runtime type was passed to a typed operation
    ValidationError,
    /// An operator received a value of the wrong shape
    InvalidOperand,
    /// A logical connective received something that is not a query expression
    TypeMismatch,

    // Document Errors
    /// No document matched the identity
    DocumentNotFound { id: String },
    /// The conditional write found the document at a different version
    OptimisticLockConflict { id: String, version: i64 },
    /// A document with the same identity already exists
    UniqueConstraintViolation,

    // Encoding Errors
    /// Error mapping an object to or from a document
    ObjectMappingError,

    // Hook Errors
    /// Raised by lifecycle hooks; never produced by the repository itself
    HookError,

    // Operation Errors
    /// The operation is not valid in the current context
    InvalidOperation,
    /// Error reported by the storage backend
    BackendError,

    /// Error from an external store adapter, tagged with the adapter name
    Extension(String),

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidIdentifier => write!(f, "Invalid identifier"),
            ErrorKind::ValidationError => write!(f, "Validation error"),
            ErrorKind::InvalidOperand => write!(f, "Invalid operand"),
            ErrorKind::TypeMismatch => write!(f, "Type mismatch"),
            ErrorKind::DocumentNotFound { id } => write!(f, "Document {} not found", id),
            ErrorKind::OptimisticLockConflict { id, version } => {
                write!(f, "Optimistic lock conflict on {} at version {}", id, version)
            }
            ErrorKind::UniqueConstraintViolation => write!(f, "Unique constraint violation"),
            ErrorKind::ObjectMappingError => write!(f, "Object mapping error"),
            ErrorKind::HookError => write!(f, "Hook error"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::BackendError => write!(f, "Backend error"),
            ErrorKind::Extension(name) => write!(f, "{} error", name),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom Vellum error type.
///
/// `VellumError` carries a message, an [`ErrorKind`], an optional cause and a
/// lazily resolved backtrace.
///
/// # Examples
///
/// ```rust,ignore
/// use vellum::errors::{ErrorKind, VellumError};
///
/// let err = VellumError::new("Document abc not found", ErrorKind::DocumentNotFound { id: "abc".into() });
/// let cause = VellumError::new("connection reset", ErrorKind::BackendError);
/// let err = VellumError::new_with_cause("Find failed", ErrorKind::BackendError, cause);
/// ```
#[derive(Clone)]
pub struct VellumError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<VellumError>>,
    backtrace: Arc<Mutex<Backtrace>>,
}

impl VellumError {
    /// Creates a new `VellumError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        VellumError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Arc::new(Mutex::new(Backtrace::new_unresolved())),
        }
    }

    /// Creates a new `VellumError` chained to the error that caused it.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: VellumError) -> Self {
        VellumError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(Mutex::new(Backtrace::new_unresolved())),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&VellumError> {
        self.cause.as_deref()
    }
}

impl Display for VellumError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for VellumError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => {
                let mut backtrace = self.backtrace.lock();
                backtrace.resolve();
                write!(f, "{}\n{:?}", self.message, *backtrace)
            }
        }
    }
}

impl Error for VellumError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for Vellum operations.
pub type VellumResult<T> = Result<T, VellumError>;

impl de::Error for VellumError {
    fn custom<T: Display>(msg: T) -> Self {
        VellumError::new(&msg.to_string(), ErrorKind::ObjectMappingError)
    }
}

impl ser::Error for VellumError {
    fn custom<T: Display>(msg: T) -> Self {
        VellumError::new(&msg.to_string(), ErrorKind::ObjectMappingError)
    }
}

impl From<bson::ser::Error> for VellumError {
    fn from(err: bson::ser::Error) -> Self {
        VellumError::new(
            &format!("Document encoding error: {}", err),
            ErrorKind::ObjectMappingError,
        )
    }
}

impl From<bson::de::Error> for VellumError {
    fn from(err: bson::de::Error) -> Self {
        VellumError::new(
            &format!("Document decoding error: {}", err),
            ErrorKind::ObjectMappingError,
        )
    }
}

impl From<String> for VellumError {
    fn from(msg: String) -> Self {
        VellumError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for VellumError {
    fn from(msg: &str) -> Self {
        VellumError::new(msg, ErrorKind::InternalError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vellum_error_new_creates_error() {
        let error = VellumError::new("An error occurred", ErrorKind::BackendError);
        assert_eq!(error.message, "An error occurred");
        assert_eq!(error.error_kind, ErrorKind::BackendError);
        assert!(error.cause.is_none());
    }

    #[test]
    fn vellum_error_new_with_cause_creates_error() {
        let cause = VellumError::new("socket closed", ErrorKind::BackendError);
        let error = VellumError::new_with_cause("Find failed", ErrorKind::BackendError, cause);
        assert_eq!(error.message(), "Find failed");
        assert_eq!(error.cause().map(|c| c.message()), Some("socket closed"));
        assert!(error.source().is_some());
    }

    #[test]
    fn vellum_error_display_formats_message_only() {
        let error = VellumError::new("An error occurred", ErrorKind::InternalError);
        assert_eq!(format!("{}", error), "An error occurred");
    }

    #[test]
    fn vellum_error_debug_formats_with_cause() {
        let cause = VellumError::new("inner", ErrorKind::BackendError);
        let error = VellumError::new_with_cause("outer", ErrorKind::BackendError, cause);
        let formatted = format!("{:?}", error);
        assert!(formatted.contains("outer"));
        assert!(formatted.contains("Caused by:"));
    }

    #[test]
    fn vellum_error_debug_without_cause_contains_message() {
        let error = VellumError::new("lonely", ErrorKind::InternalError);
        assert!(format!("{:?}", error).contains("lonely"));
        assert!(error.source().is_none());
    }

    #[test]
    fn lock_conflict_kind_carries_context() {
        let kind = ErrorKind::OptimisticLockConflict {
            id: "42".to_string(),
            version: 3,
        };
        let error = VellumError::new("stale", kind.clone());
        assert_eq!(error.kind(), &kind);
        assert_eq!(
            kind.to_string(),
            "Optimistic lock conflict on 42 at version 3"
        );
    }

    #[test]
    fn document_not_found_kind_displays_id() {
        let kind = ErrorKind::DocumentNotFound { id: "abc".to_string() };
        assert_eq!(kind.to_string(), "Document abc not found");
    }

    #[test]
    fn serde_custom_maps_to_object_mapping_error() {
        let error = <VellumError as de::Error>::custom("bad field");
        assert_eq!(error.kind(), &ErrorKind::ObjectMappingError);
        let error = <VellumError as ser::Error>::custom("bad value");
        assert_eq!(error.kind(), &ErrorKind::ObjectMappingError);
    }

    #[test]
    fn string_conversions_are_internal_errors() {
        let error: VellumError = "boom".into();
        assert_eq!(error.kind(), &ErrorKind::InternalError);
        let error: VellumError = String::from("boom").into();
        assert_eq!(error.message(), "boom");
    }
}
