use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// No response was obtained (DNS, refused connection, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("{message}")]
    RequestFailed { status: u16, message: String },

    /// A client-side precondition failed; nothing was sent.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    AuthenticationFailed(String),

    #[error("species creation failed: {0}")]
    SpeciesCreationFailed(#[source] Box<ClientError>),

    #[error("submission failed: {0}")]
    SubmissionFailed(#[source] Box<ClientError>),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("credential store error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("a location request is already in progress")]
    LocationBusy,

    #[error("location unavailable: {0}")]
    LocationUnavailable(String),
}

impl ClientError {
    /// HTTP status of the underlying server rejection, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::RequestFailed { status, .. } => Some(*status),
            ClientError::SpeciesCreationFailed(inner) | ClientError::SubmissionFailed(inner) => {
                inner.status()
            }
            _ => None,
        }
    }

    /// True when the stored token was rejected and the caller should log out.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// The server-supplied message for a rejected request.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ClientError::RequestFailed { message, .. } => Some(message),
            ClientError::SpeciesCreationFailed(inner) | ClientError::SubmissionFailed(inner) => {
                inner.server_message()
            }
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::MalformedResponse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_errors_expose_status() {
        let err = ClientError::SubmissionFailed(Box::new(ClientError::RequestFailed {
            status: 401,
            message: "Not authenticated".to_string(),
        }));
        assert!(err.is_unauthorized());
        assert_eq!(err.server_message(), Some("Not authenticated"));
        assert_eq!(err.to_string(), "submission failed: Not authenticated");
    }

    #[test]
    fn test_local_errors_have_no_status() {
        let err = ClientError::Validation("Location name is required".to_string());
        assert_eq!(err.status(), None);
        assert!(!err.is_unauthorized());
    }
}
