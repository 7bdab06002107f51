//! Password hashing and token minting.
//!
//! Passwords are stored as Argon2id PHC strings. Tokens are HS256 JWTs whose subject is the
//! username; refresh tokens carry a random `jti` that is recorded in the allow-list.

use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm as Argon2Algorithm, Argon2, Params, Version};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

use crate::config::{JwtConfig, PasswordConfig};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(cfg: &PasswordConfig) -> AppResult<Self> {
        let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
            .map_err(|e| AppError::Internal(format!("invalid password hash parameters: {e}")))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Argon2Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
    }

    /// Returns false for a mismatch and for a stored hash that cannot be parsed.
    pub fn verify(&self, password: &str, stored_hash: &str) -> bool {
        match PasswordHash::new(stored_hash) {
            Ok(parsed) => self
                .argon2()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(err) => {
                tracing::warn!(error = %err, "stored password hash is malformed");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub jti: String,
    pub kind: TokenKind,
    pub iat: i64,
    pub exp: i64,
}

/// A freshly signed refresh token together with what the allow-list needs to know about it.
#[derive(Debug, Clone)]
pub struct IssuedRefresh {
    pub token: String,
    pub jti: String,
    pub expires_at: chrono::DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(cfg: &JwtConfig) -> Self {
        let secret = cfg.secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl: Duration::minutes(cfg.access_token_minutes),
            refresh_ttl: Duration::days(cfg.refresh_token_days),
        }
    }

    fn sign(&self, subject: &str, kind: TokenKind, ttl: Duration) -> AppResult<(String, Claims)> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            kind,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))?;
        Ok((token, claims))
    }

    pub fn issue_access(&self, username: &str) -> AppResult<String> {
        self.sign(username, TokenKind::Access, self.access_ttl)
            .map(|(token, _)| token)
    }

    pub fn issue_refresh(&self, username: &str) -> AppResult<IssuedRefresh> {
        let (token, claims) = self.sign(username, TokenKind::Refresh, self.refresh_ttl)?;
        let expires_at = chrono::DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AppError::Internal("refresh expiry out of range".to_string()))?;
        Ok(IssuedRefresh {
            token,
            jti: claims.jti,
            expires_at,
        })
    }

    /// Checks signature and expiry, then that the token is of the expected kind.
    pub fn decode(&self, token: &str, expected: TokenKind) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                AppError::Unauthorized("Invalid or expired token.".to_string())
            })?
            .claims;

        if claims.kind != expected {
            tracing::debug!(kind = ?claims.kind, expected = ?expected, "token kind mismatch");
            return Err(AppError::Unauthorized("Invalid or expired token.".to_string()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
pub(crate) fn test_password_config() -> PasswordConfig {
    PasswordConfig {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> TokenService {
        TokenService::new(&JwtConfig {
            secret: "unit-test-secret".to_string(),
            access_token_minutes: 5,
            refresh_token_days: 1,
        })
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = PasswordHasher::new(&test_password_config()).unwrap();
        let hash = hasher.hash("correct horse").unwrap();

        assert_ne!(hash, "correct horse");
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &hash));
        assert!(!hasher.verify("wrong horse", &hash));
    }

    #[test]
    fn test_hash_is_salted() {
        let hasher = PasswordHasher::new(&test_password_config()).unwrap();
        let a = hasher.hash("same password").unwrap();
        let b = hasher.hash("same password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_malformed_hash() {
        let hasher = PasswordHasher::new(&test_password_config()).unwrap();
        assert!(!hasher.verify("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_access_token_roundtrip() {
        let svc = tokens();
        let token = svc.issue_access("maria").unwrap();
        let claims = svc.decode(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, "maria");
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn test_kind_is_enforced() {
        let svc = tokens();
        let refresh = svc.issue_refresh("maria").unwrap();
        assert!(matches!(
            svc.decode(&refresh.token, TokenKind::Access),
            Err(AppError::Unauthorized(_))
        ));

        let access = svc.issue_access("maria").unwrap();
        assert!(matches!(
            svc.decode(&access, TokenKind::Refresh),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_refresh_tokens_get_distinct_ids() {
        let svc = tokens();
        let a = svc.issue_refresh("maria").unwrap();
        let b = svc.issue_refresh("maria").unwrap();
        assert_ne!(a.jti, b.jti);
        assert!(a.expires_at > Utc::now());
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let other = TokenService::new(&JwtConfig {
            secret: "another-secret".to_string(),
            access_token_minutes: 5,
            refresh_token_days: 1,
        });
        let token = other.issue_access("maria").unwrap();
        assert!(tokens().decode(&token, TokenKind::Access).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let svc = TokenService::new(&JwtConfig {
            secret: "unit-test-secret".to_string(),
            access_token_minutes: -1,
            refresh_token_days: 1,
        });
        let token = svc.issue_access("maria").unwrap();
        assert!(svc.decode(&token, TokenKind::Access).is_err());
    }
}
