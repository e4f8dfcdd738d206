//! Unified error type for all CloudBase operations.
//!
//! Every failure surfaced by this crate (missing credentials, network
//! faults, unparseable responses, structured platform errors) is
//! normalized into a single [`CloudBaseError`] so callers can branch on
//! the remote error code without caring which layer produced it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure class of a [`CloudBaseError`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing credential pairing. Fatal, never retried.
    Configuration,
    /// Network-level failure (connect, timeout, broken transfer).
    Transport,
    /// The response body was not valid JSON (e.g. an HTML error page).
    ResponseParse,
    /// The platform returned a structured error envelope.
    RemoteService,
}

/// Top-level error type for all CloudBase operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudBaseError {
    /// Failure class.
    pub kind: ErrorKind,
    /// Remote error code (e.g. "InvalidParameter.RoleNotExist"), or a
    /// crate-level code for local failures.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Remote request id, when the platform returned one.
    pub request_id: Option<String>,
    /// The API action that failed.
    pub action: Option<String>,
    /// The underlying error, when this error wraps another one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<Box<CloudBaseError>>,
}

impl fmt::Display for CloudBaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref action) = self.action {
            write!(f, "[{}] ", action)?;
        }
        write!(f, "{}", self.message)?;
        if !self.code.is_empty() {
            write!(f, " [{}]", self.code)?;
        }
        if let Some(ref req_id) = self.request_id {
            write!(f, " [RequestId: {}]", req_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for CloudBaseError {}

impl CloudBaseError {
    /// Create an error with an explicit kind and code.
    pub fn new(kind: ErrorKind, code: &str, message: &str) -> Self {
        Self {
            kind,
            code: code.to_string(),
            message: message.to_string(),
            request_id: None,
            action: None,
            original: None,
        }
    }

    /// Build a configuration error (missing/mismatched credentials).
    pub fn configuration(message: &str) -> Self {
        Self::new(ErrorKind::Configuration, "ConfigurationError", message)
    }

    /// Build an invalid-argument error (caller passed bad input).
    pub fn invalid_argument(message: &str) -> Self {
        Self::new(ErrorKind::Configuration, "InvalidArgument", message)
    }

    /// Build a transport error.
    pub fn transport(message: &str) -> Self {
        Self::new(ErrorKind::Transport, "TransportError", message)
    }

    /// Build a parse error for a non-JSON response body.
    pub fn response_parse(message: &str) -> Self {
        Self::new(ErrorKind::ResponseParse, "ResponseParseError", message)
    }

    /// Build a structured platform error.
    pub fn remote(code: &str, message: &str) -> Self {
        Self::new(ErrorKind::RemoteService, code, message)
    }

    /// With remote request id.
    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    /// With the API action name.
    pub fn with_action(mut self, action: &str) -> Self {
        self.action = Some(action.to_string());
        self
    }

    /// With the underlying error this one wraps.
    pub fn with_original(mut self, original: CloudBaseError) -> Self {
        self.original = Some(Box::new(original));
        self
    }

    /// Whether this error carries the given remote error code.
    pub fn is_code(&self, code: &str) -> bool {
        self.code == code
    }
}

impl From<reqwest::Error> for CloudBaseError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            kind: ErrorKind::Transport,
            code: "TransportError".to_string(),
            message: err.to_string(),
            request_id: None,
            action: None,
            original: None,
        }
    }
}

/// Convenience result type for CloudBase operations.
pub type CloudBaseResult<T> = Result<T, CloudBaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_action_and_code() {
        let err = CloudBaseError::remote("ResourceInUse.Function", "function already exists")
            .with_action("CreateFunction");
        let s = err.to_string();
        assert!(s.starts_with("[CreateFunction]"));
        assert!(s.contains("function already exists"));
        assert!(s.contains("ResourceInUse.Function"));
    }

    #[test]
    fn display_with_request_id() {
        let err = CloudBaseError::remote("InternalError", "boom").with_request_id("req-1".into());
        assert!(err.to_string().contains("[RequestId: req-1]"));
    }

    #[test]
    fn is_code_matches_exactly() {
        let err = CloudBaseError::remote("InvalidParameter.RoleNotExist", "no such role");
        assert!(err.is_code("InvalidParameter.RoleNotExist"));
        assert!(!err.is_code("InvalidParameter"));
    }

    #[test]
    fn configuration_kind() {
        let err = CloudBaseError::configuration("secretId and secretKey must be a pair");
        assert_eq!(err.kind, ErrorKind::Configuration);
        assert!(err.request_id.is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let err = CloudBaseError::remote("NoSuchEnv", "env not found")
            .with_request_id("r-9".into())
            .with_action("DescribeEnvs");
        let json = serde_json::to_string(&err).unwrap();
        let back: CloudBaseError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, "NoSuchEnv");
        assert_eq!(back.kind, ErrorKind::RemoteService);
        assert_eq!(back.action.as_deref(), Some("DescribeEnvs"));
    }
}
