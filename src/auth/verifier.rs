use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use std::collections::HashMap;

use crate::auth::claims::Claims;

/// Verifies bearer tokens issued by the identity provider.
pub struct TokenVerifier {
    keys: KeySource,
    validation: Validation,
}

enum KeySource {
    /// RS256 keys from the user pool's JWKS, by key id. Only access tokens
    /// issued to `client_id` are accepted.
    Jwks {
        keys: HashMap<String, DecodingKey>,
        client_id: String,
    },
    /// Shared secret for local development.
    Hmac(DecodingKey),
}

impl TokenVerifier {
    pub fn from_jwks(jwks: &JwkSet, issuer: &str, client_id: &str) -> Result<Self, AuthError> {
        let mut keys = HashMap::new();
        for jwk in &jwks.keys {
            let Some(kid) = jwk.common.key_id.clone() else {
                continue;
            };
            let key = DecodingKey::from_jwk(jwk).map_err(|e| AuthError::Keys(e.to_string()))?;
            keys.insert(kid, key);
        }
        if keys.is_empty() {
            return Err(AuthError::Keys("JWKS contains no usable keys".to_string()));
        }

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[issuer]);
        // Access tokens carry `client_id` rather than `aud`; checked in `verify`.
        validation.validate_aud = false;

        Ok(Self {
            keys: KeySource::Jwks {
                keys,
                client_id: client_id.to_string(),
            },
            validation,
        })
    }

    /// Fetch the pool's JWKS document and build a verifier from it.
    pub async fn discover(issuer: &str, client_id: &str) -> Result<Self, AuthError> {
        let url = format!("{}/.well-known/jwks.json", issuer.trim_end_matches('/'));
        let jwks: JwkSet = reqwest::get(&url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::Keys(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::Keys(e.to_string()))?;
        Self::from_jwks(&jwks, issuer, client_id)
    }

    pub fn with_hmac_secret(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        Self {
            keys: KeySource::Hmac(DecodingKey::from_secret(secret.as_bytes())),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let key = match &self.keys {
            KeySource::Hmac(key) => key,
            KeySource::Jwks { keys, .. } => {
                let header = decode_header(token).map_err(|_| AuthError::InvalidToken)?;
                let kid = header.kid.ok_or(AuthError::InvalidToken)?;
                keys.get(&kid).ok_or(AuthError::UnknownKey)?
            }
        };

        let claims = decode::<Claims>(token, key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                AuthError::InvalidToken
            })?;

        if let KeySource::Jwks { client_id, .. } = &self.keys {
            if claims.token_use.as_deref() != Some("access") {
                tracing::debug!(token_use = ?claims.token_use, "Token rejected: not an access token");
                return Err(AuthError::InvalidToken);
            }
            if claims.client_id.as_deref() != Some(client_id.as_str()) {
                tracing::debug!(client_id = ?claims.client_id, "Token rejected: issued to another client");
                return Err(AuthError::InvalidToken);
            }
        }

        Ok(claims)
    }
}

/// `https://cognito-idp.<region>.amazonaws.com/<pool id>`
pub fn cognito_issuer(region: &str, user_pool_id: &str) -> String {
    format!("https://cognito-idp.{region}.amazonaws.com/{user_pool_id}")
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Token signed with an unknown key")]
    UnknownKey,

    #[error("Failed to load signing keys: {0}")]
    Keys(String),
}
