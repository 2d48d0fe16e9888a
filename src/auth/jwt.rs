/// Signed access-token encode/decode.
///
/// Keys are derived once from configuration; `encode`/`decode` are pure
/// functions of (claims, key, clock). Expiry is checked with zero leeway so
/// an expired token is rejected the second it lapses.

use std::str::FromStr;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ConfigError};

#[derive(Clone)]
pub struct AccessTokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
}

impl AccessTokenCodec {
    /// Build the codec from settings. Fails when the signing secret is unset
    /// or the algorithm is not an HMAC variant; both are startup-fatal.
    pub fn from_settings(settings: &JwtSettings) -> Result<Self, AppError> {
        if settings.secret.trim().is_empty() {
            return Err(ConfigError::Missing("jwt.secret").into());
        }

        let algorithm = Algorithm::from_str(&settings.algorithm).map_err(|_| {
            AppError::Config(ConfigError::Invalid(
                "jwt.algorithm",
                settings.algorithm.clone(),
            ))
        })?;
        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(ConfigError::Invalid("jwt.algorithm", settings.algorithm.clone()).into());
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            algorithm,
            issuer: settings.issuer.clone(),
        })
    }

    /// Issue a signed token with `exp = now + ttl_seconds`.
    pub fn encode(
        &self,
        user_id: Uuid,
        email: &str,
        ttl_seconds: i64,
    ) -> Result<String, AppError> {
        let claims = Claims::new(user_id, email.to_string(), ttl_seconds, self.issuer.clone());

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verify signature, issuer, and expiry, and return the claims.
    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AuthError::TokenExpired.into()
                }
                _ => AuthError::TokenInvalid.into(),
            })
    }
}
