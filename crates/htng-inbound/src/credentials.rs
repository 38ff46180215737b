//! WSSE credential verification (spec §4.7 step 1). Password comparison
//! is constant-time, grounded on the teacher's HMAC token check in
//! `fc-scheduler/src/auth.rs`.

use async_trait::async_trait;
use htng_common::PropertyId;
use htng_errors::CoreError;
use subtle::ConstantTimeEq;

/// Resolves the property a WSSE username identifies and checks the
/// password against what's on file for it. Implemented by the host
/// (typically backed by `htng-config`'s property mapping store).
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Looks up the expected password for `username`, returning
    /// `(property_id, expected_password)`, or a fatal error if the
    /// username is unknown.
    async fn lookup(&self, username: &str) -> Result<(PropertyId, String), CoreError>;
}

/// Verify a candidate username/password pair, returning the resolved
/// `PropertyId` on success. Authentication failures always classify as
/// `Client`/`Authentication failed` regardless of whether the username
/// was unknown or the password mismatched, so a caller can't probe for
/// valid usernames by timing or error content.
pub async fn authenticate(verifier: &dyn CredentialVerifier, username: &str, password: &str) -> Result<PropertyId, CoreError> {
    let auth_failed = || CoreError::classify(Some("Client"), "Authentication failed");

    let (property_id, expected_password) = match verifier.lookup(username).await {
        Ok(found) => found,
        Err(_) => return Err(auth_failed()),
    };

    if password_matches(password, &expected_password) {
        Ok(property_id)
    } else {
        Err(auth_failed())
    }
}

fn password_matches(candidate: &str, expected: &str) -> bool {
    candidate.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticVerifier {
        username: &'static str,
        password: &'static str,
        property_id: PropertyId,
    }

    #[async_trait]
    impl CredentialVerifier for StaticVerifier {
        async fn lookup(&self, username: &str) -> Result<(PropertyId, String), CoreError> {
            if username == self.username {
                Ok((self.property_id, self.password.to_string()))
            } else {
                Err(CoreError::classify(None, "unknown username"))
            }
        }
    }

    fn verifier() -> StaticVerifier {
        StaticVerifier { username: "chan_user", password: "s3cr3t", property_id: 7 }
    }

    #[tokio::test]
    async fn accepts_matching_credentials() {
        let property_id = authenticate(&verifier(), "chan_user", "s3cr3t").await.unwrap();
        assert_eq!(property_id, 7);
    }

    #[tokio::test]
    async fn rejects_wrong_password() {
        let err = authenticate(&verifier(), "chan_user", "wrong").await.unwrap_err();
        assert_eq!(err.kind, htng_errors::ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn rejects_unknown_username() {
        let err = authenticate(&verifier(), "ghost", "anything").await.unwrap_err();
        assert_eq!(err.kind, htng_errors::ErrorKind::Authentication);
    }
}
