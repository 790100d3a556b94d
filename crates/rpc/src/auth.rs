//! Bearer token (JWT) authentication for privileged endpoints.

use crate::handler::plain_text_response;
use conduit_metrics::rpc::record_auth_rejection;
use conduit_primitives::constants::auth::{JWT_SECRET_LENGTH, JWT_TOKEN_EXPIRY};
use hyper::{header::AUTHORIZATION, Body, HeaderMap, Response, StatusCode};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize, Serializer};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("failed to access jwt secret at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid jwt secret: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("invalid jwt secret length {0}, expected {JWT_SECRET_LENGTH} bytes")]
    InvalidLength(usize),
}

/// The 32-byte HS256 secret shared by both ends of an authenticated link.
#[derive(Clone, PartialEq, Eq)]
pub struct JwtSecret([u8; JWT_SECRET_LENGTH]);

impl fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JwtSecret(..)")
    }
}

impl JwtSecret {
    pub fn random() -> Self {
        let mut bytes = [0u8; JWT_SECRET_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse a hex encoded secret, with or without `0x` prefix and surrounding whitespace.
    pub fn from_hex(encoded: &str) -> Result<Self, SecretError> {
        let trimmed = encoded.trim();
        let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))?;
        let bytes: [u8; JWT_SECRET_LENGTH] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| SecretError::InvalidLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    pub fn from_file(path: &Path) -> Result<Self, SecretError> {
        let content = fs::read_to_string(path).map_err(|source| SecretError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_hex(&content)
    }

    /// Read the secret at `path`, generating and storing a new one if the file does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, SecretError> {
        if path.exists() {
            return Self::from_file(path);
        }
        let secret = Self::random();
        secret.write_to(path)?;
        info!(path = %path.display(), "generated a new jwt secret");
        Ok(secret)
    }

    /// Store the hex encoded secret, readable by the owner only.
    pub fn write_to(&self, path: &Path) -> Result<(), SecretError> {
        let io_err = |source| SecretError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, self.to_hex()).map_err(io_err)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(io_err)?;
        }
        Ok(())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Issue an HS256 token carrying the given issued-at time.
    pub fn token(&self, iat: u64) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            iat: Some(iat as f64),
            exp: None,
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.0),
        )
    }

    /// `Authorization` header value with a token issued now.
    pub fn bearer(&self) -> Result<String, jsonwebtoken::errors::Error> {
        Ok(format!("Bearer {}", self.token(unix_now())?))
    }
}

/// Registered claims the gate looks at.
///
/// Both are NumericDate values: seconds since the unix epoch, integral or fractional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_numeric_date"
    )]
    pub iat: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_numeric_date"
    )]
    pub exp: Option<f64>,
}

/// Whole seconds go on the wire as integers.
fn serialize_numeric_date<S: Serializer>(date: &Option<f64>, s: S) -> Result<S::Ok, S::Error> {
    match date {
        Some(secs) if secs.fract() == 0.0 && *secs >= 0.0 && *secs <= u64::MAX as f64 => {
            s.serialize_u64(*secs as u64)
        }
        Some(secs) => s.serialize_f64(*secs),
        None => s.serialize_none(),
    }
}

/// Why a request was refused.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing token")]
    MissingToken,
    #[error("invalid token")]
    InvalidToken,
    /// Signature, algorithm or encoding problems, with the verifier's own message.
    #[error("{0}")]
    Verification(jsonwebtoken::errors::Error),
    #[error("token is expired")]
    Expired,
    #[error("missing issued-at")]
    MissingIssuedAt,
    #[error("stale token")]
    Stale,
    #[error("future token")]
    Future,
}

impl AuthError {
    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::InvalidToken => "invalid_token",
            Self::Verification(_) => "verification",
            Self::Expired => "expired",
            Self::MissingIssuedAt => "missing_iat",
            Self::Stale => "stale",
            Self::Future => "future",
        }
    }

    /// The 403 answer for this rejection.
    pub fn into_response(self) -> Response<Body> {
        plain_text_response(StatusCode::FORBIDDEN, &self.to_string())
    }
}

/// Checks bearer tokens against a [JwtSecret](JwtSecret).
///
/// Only HS256 is accepted. A token must carry an issued-at claim within the tolerance of the
/// server clock in either direction, and must not be past its `exp` claim if it has one.
#[derive(Clone)]
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
    tolerance: Duration,
}

impl fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtValidator")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}

impl JwtValidator {
    pub fn new(secret: &JwtSecret) -> Self {
        // claims are checked by hand, the issued-at window replaces exp/nbf handling
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            tolerance: JWT_TOKEN_EXPIRY,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Validate an `Authorization` header value against the current time.
    pub fn validate(&self, authorization: Option<&str>) -> Result<Claims, AuthError> {
        self.validate_at(authorization, unix_now())
    }

    /// Validate an `Authorization` header value against `now` (unix seconds).
    pub fn validate_at(&self, authorization: Option<&str>, now: u64) -> Result<Claims, AuthError> {
        let token = authorization
            .and_then(|auth| auth.strip_prefix("Bearer "))
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|err| match err.kind() {
                ErrorKind::InvalidToken => AuthError::InvalidToken,
                _ => AuthError::Verification(err),
            })?
            .claims;

        let now = now as f64;
        if claims.exp.is_some_and(|exp| now >= exp) {
            return Err(AuthError::Expired);
        }
        let iat = claims.iat.ok_or(AuthError::MissingIssuedAt)?;
        let tolerance = self.tolerance.as_secs_f64();
        if now - iat > tolerance {
            return Err(AuthError::Stale);
        }
        if iat - now > tolerance {
            return Err(AuthError::Future);
        }
        Ok(claims)
    }
}

/// Gate a request on its `Authorization` header.
///
/// # Returns
/// * `Result<Claims, Response<Body>>` - The token claims, or the 403 response to send back.
#[allow(clippy::result_large_err)]
pub fn check_jwt_secret(
    headers: &HeaderMap,
    validator: &JwtValidator,
) -> Result<Claims, Response<Body>> {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    validator.validate(authorization).map_err(|err| {
        debug!(%err, "rejected unauthenticated request");
        record_auth_rejection(err.reason());
        err.into_response()
    })
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
