//! HTTP Basic credential extraction
//!
//! Decoding is a pure function of the header value so the authenticator
//! can be tested without an HTTP stack.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Username/password pair taken from a single request
#[derive(Debug, Clone)]
pub struct Credential {
    username: String,
    password: SecretString,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Authorization header does not use the Basic scheme")]
    MissingScheme,

    #[error("Basic credentials are not valid base64")]
    InvalidEncoding,

    #[error("Basic credentials are not valid UTF-8")]
    InvalidUtf8,

    #[error("Basic credentials are missing the ':' separator")]
    MissingSeparator,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Decode an `Authorization: Basic <base64(username:password)>` value
    pub fn from_authorization_header(header: &str) -> Result<Self, CredentialError> {
        let header = header.trim();
        let (scheme, encoded) = header
            .split_once(' ')
            .ok_or(CredentialError::MissingScheme)?;

        if !scheme.eq_ignore_ascii_case("basic") {
            return Err(CredentialError::MissingScheme);
        }

        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|_| CredentialError::InvalidEncoding)?;

        let credentials = String::from_utf8(decoded).map_err(|_| CredentialError::InvalidUtf8)?;

        // Split on the first ':' only; passwords may contain colons
        let (username, password) = credentials
            .split_once(':')
            .ok_or(CredentialError::MissingSeparator)?;

        Ok(Self::new(username, password))
    }
}

/// Build a Basic `Authorization` header value
pub fn basic_authorization_header(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{}:{}", username, password)))
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.username == other.username
            && self.password.expose_secret() == other.password.expose_secret()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_basic_header() {
        let header = basic_authorization_header("joe", "joespassword");
        assert_eq!(header, "Basic am9lOmpvZXNwYXNzd29yZA==");

        let cred = Credential::from_authorization_header(&header).unwrap();
        assert_eq!(cred.username(), "joe");
        assert_eq!(cred.password().expose_secret(), "joespassword");
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let cred = Credential::from_authorization_header("basic am9lOmpvZXNwYXNzd29yZA==").unwrap();
        assert_eq!(cred, Credential::new("joe", "joespassword"));
    }

    #[test]
    fn test_password_may_contain_colon() {
        let header = basic_authorization_header("joe", "pa:ss:word");
        let cred = Credential::from_authorization_header(&header).unwrap();
        assert_eq!(cred.username(), "joe");
        assert_eq!(cred.password().expose_secret(), "pa:ss:word");
    }

    #[test]
    fn test_empty_password_is_decoded() {
        let cred = Credential::from_authorization_header(&basic_authorization_header("joe", ""))
            .unwrap();
        assert_eq!(cred.password().expose_secret(), "");
    }

    #[test]
    fn test_rejects_malformed_headers() {
        assert_eq!(
            Credential::from_authorization_header("Bearer abc").unwrap_err(),
            CredentialError::MissingScheme
        );
        assert_eq!(
            Credential::from_authorization_header("Basic").unwrap_err(),
            CredentialError::MissingScheme
        );
        assert_eq!(
            Credential::from_authorization_header("Basic !!!notbase64").unwrap_err(),
            CredentialError::InvalidEncoding
        );
        assert_eq!(
            Credential::from_authorization_header(&format!("Basic {}", BASE64.encode("joe")))
                .unwrap_err(),
            CredentialError::MissingSeparator
        );
        assert_eq!(
            Credential::from_authorization_header(&format!("Basic {}", BASE64.encode([0xff, 0xfe])))
                .unwrap_err(),
            CredentialError::InvalidUtf8
        );
    }

    #[test]
    fn test_debug_does_not_leak_password() {
        let cred = Credential::new("joe", "joespassword");
        let debug = format!("{:?}", cred);
        assert!(debug.contains("joe"));
        assert!(!debug.contains("joespassword"));
    }
}
