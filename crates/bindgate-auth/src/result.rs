//! Authentication verdicts

use std::fmt;

/// Outcome of one authentication attempt
///
/// Every variant except [`AuthResult::Authenticated`] maps to the same
/// unauthorized response, so callers cannot tell which check failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthResult {
    /// Bind succeeded; carries the user's distinguished name
    Authenticated(String),
    /// Username matched no entry, or more than one
    NotFound,
    /// Entry found but the password was rejected
    BindFailed,
    /// The directory could not be reached or used
    TransportError(TransportFailure),
}

impl AuthResult {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthResult::Authenticated(_))
    }

    /// Stable label for logs and metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            AuthResult::Authenticated(_) => "authenticated",
            AuthResult::NotFound => "not_found",
            AuthResult::BindFailed => "bind_failed",
            AuthResult::TransportError(_) => "transport_error",
        }
    }

    pub(crate) fn transport(kind: TransportFailureKind, message: impl Into<String>) -> Self {
        AuthResult::TransportError(TransportFailure {
            kind,
            message: message.into(),
        })
    }
}

/// Where a transport-level failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailureKind {
    /// Server unreachable, TLS handshake or STARTTLS failure
    Connect,
    /// Service account bind rejected or interrupted
    ServiceBind,
    /// User search failed
    Search,
    /// User bind interrupted (not a password rejection)
    UserBind,
    /// Round trips exceeded the configured timeout
    Timeout,
}

impl TransportFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportFailureKind::Connect => "connect",
            TransportFailureKind::ServiceBind => "service_bind",
            TransportFailureKind::Search => "search",
            TransportFailureKind::UserBind => "user_bind",
            TransportFailureKind::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: TransportFailureKind,
    pub message: String,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(
            AuthResult::Authenticated("uid=joe".into()).outcome(),
            "authenticated"
        );
        assert_eq!(AuthResult::NotFound.outcome(), "not_found");
        assert_eq!(AuthResult::BindFailed.outcome(), "bind_failed");
        assert_eq!(
            AuthResult::transport(TransportFailureKind::Timeout, "late").outcome(),
            "transport_error"
        );
    }

    #[test]
    fn test_only_authenticated_carries_dn() {
        let ok = AuthResult::Authenticated("uid=joe,dc=example,dc=org".into());
        assert!(ok.is_authenticated());
        assert!(!AuthResult::BindFailed.is_authenticated());
        assert!(!AuthResult::NotFound.is_authenticated());
    }

    #[test]
    fn test_transport_failure_display() {
        let failure = TransportFailure {
            kind: TransportFailureKind::ServiceBind,
            message: "code 49".into(),
        };
        assert_eq!(failure.to_string(), "service_bind: code 49");
    }
}
