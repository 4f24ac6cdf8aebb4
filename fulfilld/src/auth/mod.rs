//! Authentication for the three HTTP zones: JWT bearer tokens for user
//! routes, and the `X-Internal-Secret` header (constant-time compared) for
//! the internal and callback zones.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use subtle::ConstantTimeEq;

use crate::errors::Error;
use crate::AppState;

/// The authenticated user, inserted into request extensions by
/// [`jwt_auth_middleware`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
}

/// Claims issued by the auth service. The user id lives in `uid`, with the
/// standard `sub` claim as a fallback.
#[derive(Debug, Deserialize)]
struct UserClaims {
    #[serde(default)]
    uid: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[allow(dead_code)]
    exp: u64,
}

impl UserClaims {
    fn user_id(self) -> Option<String> {
        self.uid.filter(|u| !u.is_empty()).or(self.sub).filter(|u| !u.is_empty())
    }
}

pub fn decode_user_token(token: &str, secret: &str) -> Result<CurrentUser, Error> {
    let validation = Validation::new(Algorithm::HS256);
    let key = DecodingKey::from_secret(secret.as_bytes());

    let token_data =
        decode::<UserClaims>(token, &key, &validation).map_err(|_| Error::Unauthenticated {
            message: Some("invalid token".to_string()),
        })?;

    let id = token_data.claims.user_id().ok_or(Error::Unauthenticated {
        message: Some("invalid token claims".to_string()),
    })?;

    Ok(CurrentUser { id })
}

/// Validates the bearer token, applies the general per-user rate limit and
/// exposes [`CurrentUser`] to handlers.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Error> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(Error::Unauthenticated {
            message: Some("missing authorization header".to_string()),
        })?;

    let token = header.strip_prefix("Bearer ").ok_or(Error::Unauthenticated {
        message: Some("invalid authorization format".to_string()),
    })?;

    let user = decode_user_token(token, &state.config.jwt.secret_key)?;

    state.limiters.general.check(&user.id)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Shared-secret check for service-to-service calls. Constant-time compare
/// so the header cannot be probed byte by byte.
pub async fn internal_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Error> {
    let provided = request
        .headers()
        .get("X-Internal-Secret")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let expected = state.config.internal_secret.as_bytes();
    if provided.as_bytes().ct_eq(expected).unwrap_u8() != 1 {
        return Err(Error::Forbidden);
    }

    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(Error::Unauthenticated {
                message: Some("user not authenticated".to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    fn make_token(claims: serde_json::Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn future_exp() -> u64 {
        (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as u64
    }

    #[test]
    fn test_uid_claim_preferred_over_sub() {
        let token = make_token(json!({
            "uid": "user-42",
            "sub": "other",
            "exp": future_exp()
        }));
        let user = decode_user_token(&token, SECRET).unwrap();
        assert_eq!(user.id, "user-42");
    }

    #[test]
    fn test_sub_claim_fallback() {
        let token = make_token(json!({ "sub": "user-7", "exp": future_exp() }));
        let user = decode_user_token(&token, SECRET).unwrap();
        assert_eq!(user.id, "user-7");
    }

    #[test]
    fn test_missing_user_claims_rejected() {
        let token = make_token(json!({ "exp": future_exp() }));
        assert!(decode_user_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = make_token(json!({ "uid": "u1", "exp": future_exp() }));
        assert!(decode_user_token(&token, "another-secret-another-secret-xx").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let past = (chrono::Utc::now() - chrono::Duration::hours(1)).timestamp() as u64;
        let token = make_token(json!({ "uid": "u1", "exp": past }));
        assert!(decode_user_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(decode_user_token("not.a.jwt", SECRET).is_err());
    }
}
