use http::{HeaderMap, header::AUTHORIZATION};
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha512};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum AuthenticationError {
    #[error("the request was not authenticated")]
    Unauthenticated,
    #[error("invalid token provided")]
    InvalidToken,
}

/// Grants access to requests that present the configured bearer token
///
/// Only the digest of the token is kept in memory.
#[derive(Debug, Clone)]
pub(crate) struct BearerAuthenticator {
    digest: Vec<u8>,
}

impl BearerAuthenticator {
    pub(crate) fn new(token: &Secret<String>) -> Self {
        Self {
            digest: Sha512::digest(token.expose_secret().as_bytes()).to_vec(),
        }
    }

    pub(crate) fn authenticate(&self, headers: &HeaderMap) -> Result<(), AuthenticationError> {
        let provided = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or_else(|| {
                debug!("request without bearer token");
                AuthenticationError::Unauthenticated
            })?;
        if Sha512::digest(provided.as_bytes())[..] == self.digest[..] {
            Ok(())
        } else {
            warn!("invalid token provided");
            Err(AuthenticationError::InvalidToken)
        }
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn bearer_tokens() {
        let auth = BearerAuthenticator::new(&Secret::new("s3cret".to_string()));
        let mut headers = HeaderMap::new();
        assert_eq!(
            auth.authenticate(&headers),
            Err(AuthenticationError::Unauthenticated)
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer wrong"));
        assert_eq!(
            auth.authenticate(&headers),
            Err(AuthenticationError::InvalidToken)
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token s3cret"));
        assert_eq!(
            auth.authenticate(&headers),
            Err(AuthenticationError::Unauthenticated)
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(auth.authenticate(&headers), Ok(()));
    }
}
