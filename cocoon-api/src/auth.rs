// Copyright (c) 2023 The Cocoon Authors

use crate::error::ApiError;
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use cocoon_models::CocoonError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tonic::metadata::MetadataMap;

/// Type claim of the tokens minted at login
pub const TOKEN_TYPE_CLI: &str = "token.cli";

/// Claims of a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// session id
    pub id: String,
    /// identity id
    pub identity: String,
    /// token type, only [`TOKEN_TYPE_CLI`] is accepted
    #[serde(rename = "type")]
    pub token_type: String,
    /// expiry, unix seconds
    pub exp: u64,
}

/// PHC string of an argon2id hash of `password`
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Cocoon(CocoonError::Internal(format!("failed to hash password: {}", e))))
}

/// Whether `password` matches the stored `hash`. Malformed hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Signs and checks session tokens
#[derive(Clone)]
pub struct TokenSigner {
    key: String,
    ttl: Duration,
}

impl TokenSigner {
    /// HS256 signer using `key`; tokens expire after `ttl`
    pub fn new(key: &str, ttl: Duration) -> Self {
        TokenSigner {
            key: key.to_string(),
            ttl,
        }
    }

    /// Token for the session `session_id` of `identity`
    pub fn sign(&self, session_id: &str, identity: &str) -> Result<String, ApiError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ApiError::TokenError(e.to_string()))?;
        let claims = Claims {
            id: session_id.to_string(),
            identity: identity.to_string(),
            token_type: TOKEN_TYPE_CLI.to_string(),
            exp: (now + self.ttl).as_secs(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.key.as_bytes()),
        )
        .map_err(|e| ApiError::TokenError(e.to_string()))
    }

    /// Claims of a valid, unexpired CLI token
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.key.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|_| CocoonError::InvalidOrExpiredToken)?;
        if data.claims.token_type != TOKEN_TYPE_CLI {
            return Err(CocoonError::InvalidOrExpiredToken.into());
        }
        Ok(data.claims)
    }
}

/// Token of a request: the `access_token` entry or a bearer `authorization`
pub fn request_token(metadata: &MetadataMap) -> Option<String> {
    if let Some(token) = metadata.get("access_token").and_then(|v| v.to_str().ok()) {
        return Some(token.to_string());
    }
    let auth = metadata.get("authorization")?.to_str().ok()?;
    let (scheme, token) = auth.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim().to_string())
    } else {
        None
    }
}
