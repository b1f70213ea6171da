use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ledger_core::credit::MemberRole;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Claims carried by tokens from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub org_id: String,
    pub role: String,
    pub exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The verified caller of a request.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub org_id: String,
    pub role: MemberRole,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl TryFrom<IdentityClaims> for Identity {
    type Error = AuthError;

    fn try_from(claims: IdentityClaims) -> Result<Self, Self::Error> {
        let role = claims
            .role
            .parse::<MemberRole>()
            .map_err(|_| AuthError::InvalidToken(format!("unsupported role '{}'", claims.role)))?;
        if claims.sub.trim().is_empty() || claims.org_id.trim().is_empty() {
            return Err(AuthError::InvalidToken(
                "token subject and org_id are required".to_string(),
            ));
        }
        Ok(Self {
            user_id: claims.sub,
            org_id: claims.org_id,
            role,
            email: claims.email,
            name: claims.name,
        })
    }
}

/// HS256 signing and verification with a shared secret.
#[derive(Clone)]
pub struct JwtAuth {
    secret: String,
}

impl JwtAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn issue(
        &self,
        user_id: &str,
        org_id: &str,
        role: MemberRole,
        ttl_hours: i64,
    ) -> Result<(String, usize), AuthError> {
        let exp = (Utc::now() + Duration::hours(ttl_hours)).timestamp();
        let exp = usize::try_from(exp)
            .map_err(|_| AuthError::Signing("token expiration out of range".to_string()))?;
        let claims = IdentityClaims {
            sub: user_id.to_string(),
            org_id: org_id.to_string(),
            role: role.as_str().to_string(),
            exp,
            email: None,
            name: None,
        };
        self.encode_claims(&claims).map(|token| (token, exp))
    }

    pub fn encode_claims(&self, claims: &IdentityClaims) -> Result<String, AuthError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|err| AuthError::Signing(err.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let decoded = decode::<IdentityClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|err| AuthError::InvalidToken(err.to_string()))?;
        Identity::try_from(decoded.claims)
    }
}

pub fn identity_from_headers(auth: &JwtAuth, headers: &HeaderMap) -> Result<Identity, AuthError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)?;
    auth.verify(token)
}
