//! Session token verification.
//!
//! Tokens are HS256 JWTs minted by the auth service (out of scope here);
//! the hub only verifies them at handshake. An invalid or absent token
//! still yields a connection, limited to public data.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;

/// Claims carried by a session token.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Operator user id.
    pub sub: String,
    #[allow(dead_code)]
    pub exp: usize,
}

/// Verify a token; `None` means the session stays unauthenticated.
pub fn verify_token(token: &str, secret: Option<&str>) -> Option<Claims> {
    let secret = secret?;
    if token.is_empty() {
        return None;
    }

    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    ) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            tracing::debug!(error = %e, "session token rejected");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        exp: usize,
    }

    fn mint(secret: &str, exp: usize) -> String {
        encode(
            &Header::default(),
            &TestClaims {
                sub: "operator-1".into(),
                exp,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_claims() {
        let token = mint("secret", 4_102_444_800); // year 2100
        let claims = verify_token(&token, Some("secret")).unwrap();
        assert_eq!(claims.sub, "operator-1");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = mint("secret", 4_102_444_800);
        assert!(verify_token(&token, Some("other")).is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = mint("secret", 1_000_000);
        assert!(verify_token(&token, Some("secret")).is_none());
    }

    #[test]
    fn no_secret_means_no_auth() {
        let token = mint("secret", 4_102_444_800);
        assert!(verify_token(&token, None).is_none());
    }
}
