use std::path::PathBuf;

use thiserror::Error;

/// Raised while planning a case tree. These are the only errors that abort a
/// whole run; everything that happens inside a case is folded into its
/// outcome instead.
#[derive(Debug, Error)]
pub enum ExpansionError {
    #[error("expected a case object or a list of case objects, found {found}")]
    NotACaseTree { found: &'static str },
    #[error("element {index} of the case list is not an object (found {found})")]
    NotACase { index: usize, found: &'static str },
    #[error("case `{id}`: directive `{directive}` must be a non-negative integer, found {value}")]
    MalformedDirective {
        id: String,
        directive: &'static str,
        value: String,
    },
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Expansion(#[from] ExpansionError),
    #[error("parallel branch panicked: {0}")]
    BranchPanicked(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{}", status_message(.status_text, .body))]
    Status {
        status: u16,
        status_text: String,
        content_type: String,
        body: String,
    },
    #[error("Request failed: {0}")]
    Network(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Failed to read `{}`: {message}", .path.display())]
    File { path: PathBuf, message: String },
}

fn status_message(status_text: &str, body: &str) -> String {
    if !status_text.is_empty() {
        status_text.to_string()
    } else if !body.trim().is_empty() {
        body.trim().to_string()
    } else {
        "Unsuccessful HTTP response".to_string()
    }
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn classification(&self) -> Option<&'static str> {
        match self.status()? {
            400..=499 => Some("client error"),
            500..=599 => Some("server error"),
            _ => None,
        }
    }

    pub fn error_body(&self) -> Option<&str> {
        match self {
            TransportError::Status { body, .. } if !body.is_empty() => Some(body),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Property '{0}' is required for signing.")]
    MissingField(&'static str),
    #[error("Invalid signature url `{url}`: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("Invalid signing key: {0}")]
    InvalidKey(String),
    #[error("Failed to read private key `{path}`")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Everything that can go wrong inside a single case.
#[derive(Debug, Error)]
pub enum CaseError {
    #[error("Property '{field}' cannot be an array.")]
    StructuralValidation { field: &'static str },
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{0}")]
    Verification(String),
    #[error("Hook `{name}` failed: {message}")]
    Hook { name: String, message: String },
    #[error("{0}")]
    Configuration(String),
}

impl CaseError {
    /// Text compared against `testErrorMessage` for negative tests.
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            CaseError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} name cannot be empty")]
    EmptyName { kind: &'static str },
    #[error("{kind} `{name}` is already registered")]
    Duplicate { kind: &'static str, name: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read `{}`: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse `{}`: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("`{}` must contain a JSON object", .path.display())]
    NotAnObject { path: PathBuf },
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to write `{}`: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_uses_reason_phrase() {
        let err = TransportError::Status {
            status: 401,
            status_text: "Unauthorized".into(),
            content_type: "application/json".into(),
            body: "{\"code\":1}".into(),
        };
        assert_eq!(err.to_string(), "Unauthorized");
        assert_eq!(err.classification(), Some("client error"));
        assert_eq!(err.error_body(), Some("{\"code\":1}"));
    }

    #[test]
    fn status_error_falls_back_to_body_then_generic() {
        let with_body = TransportError::Status {
            status: 599,
            status_text: String::new(),
            content_type: String::new(),
            body: " upstream down ".into(),
        };
        assert_eq!(with_body.to_string(), "upstream down");
        assert_eq!(with_body.classification(), Some("server error"));

        let bare = TransportError::Status {
            status: 599,
            status_text: String::new(),
            content_type: String::new(),
            body: String::new(),
        };
        assert_eq!(bare.to_string(), "Unsuccessful HTTP response");
    }

    #[test]
    fn case_error_message_is_display_text() {
        let err = CaseError::StructuralValidation { field: "formData" };
        assert_eq!(err.message(), "Property 'formData' cannot be an array.");

        let err = CaseError::from(TransportError::Network("connection refused".into()));
        assert_eq!(err.message(), "Request failed: connection refused");
        assert!(err.transport().is_some());
    }
}
