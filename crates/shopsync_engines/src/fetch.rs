#![forbid(unsafe_code)]

use std::env;
use std::fmt;

use serde_json::Value;
use shopsync_contracts::{Record, RecordCategory, RecordId};
use shopsync_storage::outbound::{classify_transport, non_empty, outbound_agent, parse_timeout_ms};
use tracing::debug;
use url::Url;

pub const SHOPIFY_API_VERSION_DEFAULT: &str = "2024-01";

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Found(Record),
    /// The source answered and has no such record.
    NotFound,
    /// The source has no resource for this category; nothing was asked.
    Unsupported,
}

/// Upstream fetch failure. Every variant is worth retrying later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: &'static str,
    pub status: Option<u16>,
    pub detail: String,
}

impl FetchError {
    pub fn new(kind: &'static str, status: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(
                f,
                "record fetch failed ({}, http {}): {}",
                self.kind, status, self.detail
            ),
            None => write!(f, "record fetch failed ({}): {}", self.kind, self.detail),
        }
    }
}

impl std::error::Error for FetchError {}

/// Source of full records when a notification only carries the identifier.
pub trait RecordFetcher: Send + Sync {
    fn fetch_full_record(
        &self,
        category: &RecordCategory,
        id: &RecordId,
    ) -> Result<FetchOutcome, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopifyFetchConfig {
    pub api_base: String,
    pub access_token: String,
    pub api_version: String,
    pub timeout_ms: u64,
}

impl ShopifyFetchConfig {
    /// `Ok(None)` when no shop is configured; fetching is then disabled.
    pub fn from_env() -> Result<Option<Self>, String> {
        Self::from_var_map(|key| env::var(key).ok())
    }

    pub fn from_var_map<F>(get: F) -> Result<Option<Self>, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(shop) = non_empty(get("SHOPSYNC_SHOPIFY_SHOP_DOMAIN")) else {
            return Ok(None);
        };
        let access_token = non_empty(get("SHOPSYNC_SHOPIFY_ACCESS_TOKEN")).ok_or_else(|| {
            "SHOPSYNC_SHOPIFY_ACCESS_TOKEN must be set when SHOPSYNC_SHOPIFY_SHOP_DOMAIN is set"
                .to_string()
        })?;
        let api_base = if shop.starts_with("http://") || shop.starts_with("https://") {
            shop
        } else {
            format!("https://{shop}")
        };
        Url::parse(&api_base)
            .map_err(|err| format!("invalid SHOPSYNC_SHOPIFY_SHOP_DOMAIN: {err}"))?;
        let api_version = non_empty(get("SHOPSYNC_SHOPIFY_API_VERSION"))
            .unwrap_or_else(|| SHOPIFY_API_VERSION_DEFAULT.to_string());
        let timeout_ms = parse_timeout_ms(get("SHOPSYNC_OUTBOUND_TIMEOUT_MS"));
        Ok(Some(Self {
            api_base,
            access_token,
            api_version,
            timeout_ms,
        }))
    }
}

/// Shopify Admin REST fetcher: `GET /admin/api/{version}/{plural}/{id}.json`.
pub struct ShopifyRecordFetcher {
    config: ShopifyFetchConfig,
    agent: ureq::Agent,
}

impl ShopifyRecordFetcher {
    pub fn new(config: ShopifyFetchConfig) -> Self {
        Self {
            agent: outbound_agent(config.timeout_ms),
            config,
        }
    }

    pub fn record_url(&self, category: &RecordCategory, id: &RecordId) -> Option<Url> {
        record_url(&self.config, category, id)
    }
}

impl RecordFetcher for ShopifyRecordFetcher {
    fn fetch_full_record(
        &self,
        category: &RecordCategory,
        id: &RecordId,
    ) -> Result<FetchOutcome, FetchError> {
        let Some(url) = self.record_url(category, id) else {
            return Ok(FetchOutcome::Unsupported);
        };
        debug!(category = category.as_str(), id = id.as_str(), "fetching full record");
        let response = match self
            .agent
            .get(url.as_str())
            .set("X-Shopify-Access-Token", &self.config.access_token)
            .set("Accept", "application/json")
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(FetchOutcome::NotFound),
            Err(ureq::Error::Status(status, _)) => {
                return Err(FetchError::new(
                    "http_non_200",
                    Some(status),
                    format!("shopify returned http status {status}"),
                ))
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(FetchError::new(
                    classify_transport(&transport).as_str(),
                    None,
                    transport.to_string(),
                ));
            }
        };
        let body: Value = serde_json::from_reader(response.into_reader())
            .map_err(|err| FetchError::new("json_parse", None, err.to_string()))?;
        unwrap_envelope(category, body)
    }
}

fn record_url(config: &ShopifyFetchConfig, category: &RecordCategory, id: &RecordId) -> Option<Url> {
    let plural = category.plural_key()?;
    let mut url = Url::parse(&config.api_base).ok()?;
    url.path_segments_mut()
        .ok()?
        .pop_if_empty()
        .extend(["admin", "api", config.api_version.as_str(), plural])
        .push(&format!("{}.json", id.as_str()));
    Some(url)
}

/// Shopify wraps single resources as `{"customer": {...}}`.
fn unwrap_envelope(category: &RecordCategory, body: Value) -> Result<FetchOutcome, FetchError> {
    let inner = match body {
        Value::Object(mut map) => map.remove(category.as_str()),
        _ => None,
    };
    match inner {
        Some(Value::Null) | None => Ok(FetchOutcome::NotFound),
        Some(value) => Record::from_json(value)
            .map(FetchOutcome::Found)
            .map_err(|err| FetchError::new("json_shape", None, err.to_string())),
    }
}
