#![forbid(unsafe_code)]

use std::fmt;
use std::fs;
use std::sync::{Mutex, PoisonError};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;
use tracing::debug;

use crate::outbound::{storage_error_from_ureq, unix_now_secs};
use crate::store::{StorageError, StoreOp};

pub const TOKEN_URI_DEFAULT: &str = "https://oauth2.googleapis.com/token";
/// Sheets access plus read-only Drive, which the lookup by title needs.
pub const SHEETS_SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive.readonly";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3_600;
const REFRESH_MARGIN_SECS: u64 = 60;

fn default_token_uri() -> String {
    TOKEN_URI_DEFAULT.to_string()
}

/// The fields of a Google service-account key file that the token exchange uses.
#[derive(Clone, PartialEq, Eq, serde::Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_json(raw: &str) -> Result<Self, String> {
        let key: Self = serde_json::from_str(raw)
            .map_err(|err| format!("invalid service account key: {err}"))?;
        if key.client_email.trim().is_empty() || key.private_key.trim().is_empty() {
            return Err("service account key lacks client_email or private_key".to_string());
        }
        Ok(key)
    }

    pub fn from_file(path: &str) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|err| format!("failed to read credentials file '{path}': {err}"))?;
        Self::from_json(&raw)
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum SheetsCredentials {
    /// Fixed bearer token. Not refreshed.
    AccessToken(String),
    ServiceAccount(ServiceAccountKey),
}

impl fmt::Debug for SheetsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetsCredentials::AccessToken(_) => f.write_str("AccessToken(..)"),
            SheetsCredentials::ServiceAccount(key) => {
                f.debug_tuple("ServiceAccount").field(key).finish()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

impl AssertionClaims {
    pub fn for_key(key: &ServiceAccountKey, issued_at: u64) -> Self {
        Self {
            iss: key.client_email.clone(),
            scope: SHEETS_SCOPES.to_string(),
            aud: key.token_uri.clone(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        }
    }
}

/// RS256-signed JWT assertion for the OAuth jwt-bearer grant.
pub fn signed_assertion(key: &ServiceAccountKey, issued_at: u64) -> Result<String, StorageError> {
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|err| {
        StorageError::AuthFailed {
            detail: format!("unusable private key: {err}"),
        }
    })?;
    encode(
        &Header::new(Algorithm::RS256),
        &AssertionClaims::for_key(key, issued_at),
        &encoding_key,
    )
    .map_err(|err| StorageError::AuthFailed {
        detail: format!("failed to sign assertion: {err}"),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: u64,
}

pub fn parse_token_response(body: &Value, now: u64) -> Result<CachedToken, StorageError> {
    let token = body
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| StorageError::MalformedResponse {
            op: StoreOp::Authenticate,
            detail: "token response carried no access_token".to_string(),
        })?;
    let lifetime = body
        .get("expires_in")
        .and_then(Value::as_u64)
        .unwrap_or(ASSERTION_LIFETIME_SECS);
    Ok(CachedToken {
        token: token.to_string(),
        expires_at: now + lifetime,
    })
}

/// Hands out bearer tokens. Service-account tokens are cached and exchanged
/// again shortly before they expire.
pub struct TokenSource {
    credentials: SheetsCredentials,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(credentials: SheetsCredentials) -> Self {
        Self {
            credentials,
            cached: Mutex::new(None),
        }
    }

    pub fn bearer(&self, agent: &ureq::Agent) -> Result<String, StorageError> {
        let key = match &self.credentials {
            SheetsCredentials::AccessToken(token) => return Ok(token.clone()),
            SheetsCredentials::ServiceAccount(key) => key,
        };
        let now = unix_now_secs();
        if let Some(token) = self.cached_at(now) {
            return Ok(token);
        }
        let fresh = exchange(agent, key, now)?;
        debug!(
            client_email = %key.client_email,
            expires_at = fresh.expires_at,
            "service account token refreshed"
        );
        let token = fresh.token.clone();
        self.remember(fresh);
        Ok(token)
    }

    /// Drops the cached token. False when the credentials cannot be refreshed.
    pub fn invalidate(&self) -> bool {
        match self.credentials {
            SheetsCredentials::AccessToken(_) => false,
            SheetsCredentials::ServiceAccount(_) => {
                *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
                true
            }
        }
    }

    fn cached_at(&self, now: u64) -> Option<String> {
        self.cached
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|cached| now + REFRESH_MARGIN_SECS < cached.expires_at)
            .map(|cached| cached.token.clone())
    }

    fn remember(&self, token: CachedToken) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }
}

fn exchange(
    agent: &ureq::Agent,
    key: &ServiceAccountKey,
    now: u64,
) -> Result<CachedToken, StorageError> {
    let assertion = signed_assertion(key, now)?;
    let response = agent
        .post(&key.token_uri)
        .send_form(&[
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", assertion.as_str()),
        ])
        .map_err(|err| storage_error_from_ureq(StoreOp::Authenticate, "", err))?;
    let body: Value = serde_json::from_reader(response.into_reader()).map_err(|err| {
        StorageError::MalformedResponse {
            op: StoreOp::Authenticate,
            detail: err.to_string(),
        }
    })?;
    parse_token_response(&body, now)
}
