//! # Chamber of Commerce API Call
//!
//! Dataset-specific client for the active-business JSON-stat endpoint. It
//! turns a set of [`RequestParams`] into the HTTP request the portal
//! expects, classifies failures and hands the raw payload bytes back to the
//! pipeline (parsing happens downstream so the cache can store the payload
//! verbatim).

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::configs::config_app::ApiSection;
use crate::retrieve::ky_http::ApiClient;
use crate::statistics::camcom::provinces;

/// Path of the active-business dataset, relative to the configured base URL.
pub const DATASET_PATH: &str = "api/json-stat/imprese-attive";

#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level failure (connect, timeout) after the retry budget was
    /// spent.
    #[error(transparent)]
    Transport(#[from] anyhow::Error),

    /// The server answered with a non-2xx status. A 5xx here means the
    /// retry middleware already exhausted its attempts.
    #[error("statistical API answered with HTTP status {status}")]
    Http { status: u16 },

    /// 2xx answer with an empty body; treated as a malformed payload.
    #[error("statistical API returned an empty body")]
    EmptyBody,
}

/// Immutable description of one extraction unit: which province, which
/// period window, optionally restricted to one ATECO sector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParams {
    /// Province display name (official casing).
    pub provincia: String,
    /// Two-letter province code sent to the API.
    pub provincia_code: String,
    /// Start period (`YYYY`, `YYYY-MM` or `YYYY-MM-DD`).
    pub inizio: String,
    /// End period, same formats as `inizio`.
    pub fine: String,
    /// Optional ATECO sector-code filter.
    pub settore: Option<String>,
}

impl RequestParams {
    /// Resolves a user-supplied province name into request parameters.
    /// Returns `None` when the province is not in the registry.
    pub fn resolve(
        provincia: &str,
        inizio: &str,
        fine: &str,
        settore: Option<String>,
    ) -> Option<Self> {
        let display = provinces::province_display_name(provincia)?;
        let code = provinces::province_code(provincia)?;
        Some(Self {
            provincia: display.to_string(),
            provincia_code: code.to_string(),
            inizio: inizio.to_string(),
            fine: fine.to_string(),
            settore,
        })
    }

    /// Query-string pairs for the dataset endpoint.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("provincia", self.provincia_code.clone()),
            ("inizio", self.inizio.clone()),
            ("fine", self.fine.clone()),
        ];
        if let Some(settore) = &self.settore {
            query.push(("settore", settore.clone()));
        }
        query
    }

    /// Cache key for this request: a readable tag (normalized province and
    /// period window) plus a short digest of the full parameter set, so two
    /// requests differing only in the sector filter never collide.
    pub fn cache_key(&self) -> String {
        let mut tag = format!(
            "{}_{}_{}",
            provinces::normalize_name(&self.provincia),
            self.inizio,
            self.fine
        );
        if let Some(settore) = &self.settore {
            tag.push('_');
            tag.push_str(&provinces::normalize_name(settore));
        }

        let mut hasher = Sha256::new();
        for (key, value) in self.query() {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"&");
        }
        let digest = hex::encode(hasher.finalize());

        format!("{tag}-{}", &digest[..8])
    }
}

/// Client for the active-business dataset endpoint.
pub struct ApiCall {
    client: ApiClient,
}

impl ApiCall {
    /// Builds the client from the `api` configuration section.
    pub fn new(api: &ApiSection) -> Result<Self, FetchError> {
        let client = ApiClient::new(
            &api.base_url,
            std::time::Duration::from_secs(api.timeout_secs),
            api.max_retries,
            std::time::Duration::from_millis(api.retry_delay_ms),
        )?;
        Ok(Self { client })
    }

    /// Fetches the raw JSON-stat payload for `params`.
    ///
    /// Retries on transient failures happen inside the HTTP client; by the
    /// time an error reaches this method it is final. Client errors (4xx)
    /// were never retried and surface directly.
    pub async fn fetch(&self, params: &RequestParams) -> Result<Vec<u8>, FetchError> {
        let query = params.query();
        debug!(
            provincia = %params.provincia_code,
            inizio = %params.inizio,
            fine = %params.fine,
            "requesting dataset"
        );

        let response = self
            .client
            .get_bytes(DATASET_PATH, &query, Some(self.headers()))
            .await?;

        if !response.success {
            error!(
                status = response.status,
                provincia = %params.provincia_code,
                "dataset request failed"
            );
            return Err(FetchError::Http {
                status: response.status,
            });
        }
        if response.body.is_empty() {
            return Err(FetchError::EmptyBody);
        }

        info!(
            bytes = response.body.len(),
            provincia = %params.provincia_code,
            "dataset fetched"
        );
        Ok(response.body)
    }

    /// Default headers for the open-data portal.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let header_list = [
            ("accept", "application/json, text/plain, */*"),
            ("accept-language", "it-IT,it;q=0.9,en-US;q=0.8,en;q=0.7"),
            ("user-agent", "camcom-estrattore/0.1"),
        ];
        for (name, value) in header_list {
            if let (Ok(h_name), Ok(h_value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(h_name, h_value);
            }
        }
        headers
    }
}
