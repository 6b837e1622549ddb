//! Local identity, resolved once per session from the bearer token.
//!
//! The token is a JWT whose payload segment carries `user_id` (or `sub`)
//! and `username` claims. Only the claims are read here; signature
//! verification belongs to the server. Consumers that cannot resolve an
//! identity fall back to [`LocalIdentity::anonymous`] so optimistic sends
//! still render.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use thiserror::Error;

/// The signed-in user as seen by the reconciler and presence tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub user_id: String,
    pub display_name: String,
}

impl LocalIdentity {
    /// Placeholder identity used when no token is available or the token
    /// cannot be decoded.
    pub fn anonymous() -> Self {
        Self {
            user_id: "me".to_owned(),
            display_name: "You".to_owned(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("token is not a three-segment JWT")]
    MalformedToken,
    #[error("token payload is not valid base64url")]
    PayloadEncoding,
    #[error("token claims are not valid JSON")]
    ClaimsDecode,
    #[error("token claims carry no user id")]
    MissingUserId,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Decode the claims segment of a bearer token into a [`LocalIdentity`].
pub fn resolve_identity(token: &str) -> Result<LocalIdentity, IdentityError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => return Err(IdentityError::MalformedToken),
    };
    if segments.next().is_some() {
        return Err(IdentityError::MalformedToken);
    }

    let raw = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| IdentityError::PayloadEncoding)?;
    let claims: Claims =
        serde_json::from_slice(&raw).map_err(|_| IdentityError::ClaimsDecode)?;

    let user_id = claims
        .user_id
        .or(claims.sub)
        .ok_or(IdentityError::MissingUserId)?;
    let display_name = claims
        .username
        .or(claims.name)
        .unwrap_or_else(|| user_id.clone());

    Ok(LocalIdentity {
        user_id,
        display_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_claims(claims: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims);
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn resolves_user_id_and_username() {
        let token = token_with_claims(r#"{"user_id":"u1","username":"alice","role":"member"}"#);
        let identity = resolve_identity(&token).expect("token should resolve");
        assert_eq!(identity.user_id, "u1");
        assert_eq!(identity.display_name, "alice");
    }

    #[test]
    fn falls_back_to_sub_and_user_id_for_name() {
        let token = token_with_claims(r#"{"sub":"u2"}"#);
        let identity = resolve_identity(&token).expect("token should resolve");
        assert_eq!(identity.user_id, "u2");
        assert_eq!(identity.display_name, "u2");
    }

    #[test]
    fn rejects_non_jwt_tokens() {
        assert_eq!(
            resolve_identity("opaque-token"),
            Err(IdentityError::MalformedToken)
        );
        assert_eq!(
            resolve_identity("a.b.c.d"),
            Err(IdentityError::MalformedToken)
        );
    }

    #[test]
    fn rejects_claims_without_user_id() {
        let token = token_with_claims(r#"{"role":"member"}"#);
        assert_eq!(resolve_identity(&token), Err(IdentityError::MissingUserId));
    }

    #[test]
    fn rejects_undecodable_payloads() {
        let header = URL_SAFE_NO_PAD.encode("{}");
        assert_eq!(
            resolve_identity(&format!("{header}.!!!.sig")),
            Err(IdentityError::PayloadEncoding)
        );
    }
}
