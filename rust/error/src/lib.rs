// Error codes shared by every crate in the provider. They loosely follow the
// gRPC status codes so that callers can classify failures without matching
// on concrete error types.
use std::error::Error;

#[cfg(feature = "sqlx")]
mod sqlx;
#[cfg(feature = "sqlx")]
pub use sqlx::*;

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum ErrorCodes {
    // Success is used where Ok would clash with the Result variant.
    Success = 0,
    // UNKNOWN indicates an error that could not be classified.
    Unknown = 2,
    // INVALID_ARGUMENT indicates the request carried a malformed or missing field.
    InvalidArgument = 3,
    // DEADLINE_EXCEEDED means the operation did not finish in time.
    DeadlineExceeded = 4,
    // NOT_FOUND means a referenced entity (secret, role, database) does not exist.
    NotFound = 5,
    // ALREADY_EXISTS means an entity we attempted to create already exists.
    AlreadyExists = 6,
    // PERMISSION_DENIED indicates the caller lacks the privilege for the operation.
    PermissionDenied = 7,
    // FAILED_PRECONDITION indicates the live state does not allow the operation.
    FailedPrecondition = 9,
    // ABORTED indicates the operation was aborted, typically by a concurrent change.
    Aborted = 10,
    // UNIMPLEMENTED indicates the requested resource type is not supported.
    Unimplemented = 12,
    // INTERNAL errors are internal errors.
    Internal = 13,
    // UNAVAILABLE indicates the database or secret store could not be reached.
    Unavailable = 14,
    // UNAUTHENTICATED indicates the credentials were rejected.
    Unauthenticated = 16,
}

impl ErrorCodes {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCodes::InvalidArgument => "ValidationError",
            ErrorCodes::NotFound => "NotFoundError",
            ErrorCodes::AlreadyExists | ErrorCodes::FailedPrecondition => "ConflictError",
            ErrorCodes::Unavailable | ErrorCodes::Unauthenticated => "ConnectError",
            ErrorCodes::Internal => "InternalError",
            _ => "ProviderError",
        }
    }

    /// Errors with these codes may succeed when the same request is replayed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCodes::Unavailable | ErrorCodes::DeadlineExceeded | ErrorCodes::Aborted
        )
    }
}

pub trait ProviderError: Error + Send {
    fn code(&self) -> ErrorCodes;
    fn boxed(self) -> Box<dyn ProviderError>
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
    fn should_trace_error(&self) -> bool {
        true
    }
}

impl Error for Box<dyn ProviderError> {}

impl ProviderError for Box<dyn ProviderError> {
    fn code(&self) -> ErrorCodes {
        self.as_ref().code()
    }

    fn should_trace_error(&self) -> bool {
        self.as_ref().should_trace_error()
    }
}

impl ProviderError for std::io::Error {
    fn code(&self) -> ErrorCodes {
        match self.kind() {
            std::io::ErrorKind::NotFound => ErrorCodes::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCodes::PermissionDenied,
            std::io::ErrorKind::TimedOut => ErrorCodes::DeadlineExceeded,
            std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::ConnectionReset => {
                ErrorCodes::Unavailable
            }
            _ => ErrorCodes::Unknown,
        }
    }
}
