use crate::error::{Result, ScannerError};
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Browser identities rotated across requests so the upstream sees ordinary
/// traffic rather than one fixed client string.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:120.0) Gecko/20100101 Firefox/120.0",
];

/// HTTP client for provider scraping: per-request timeout, rotating
/// identity headers, JSON/text fetch helpers.
pub struct ScrapingClient {
    client: reqwest::Client,
}

impl ScrapingClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()?;
        Ok(Self { client })
    }

    fn identity_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        let ua = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        headers.insert(USER_AGENT, HeaderValue::from_static(ua));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/html;q=0.9, */*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB,en;q=0.9"));
        headers.insert("Sec-Fetch-Dest", HeaderValue::from_static("empty"));
        headers.insert("Sec-Fetch-Mode", HeaderValue::from_static("cors"));
        headers.insert("Sec-Fetch-Site", HeaderValue::from_static("same-origin"));
        headers
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET (json) {}", url);
        let resp = self
            .client
            .get(url)
            .headers(Self::identity_headers())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScannerError::scraping(
                format!("GET {url} failed"),
                Some(status.as_u16()),
            ));
        }
        Ok(resp.json::<T>().await?)
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        debug!("GET (text) {}", url);
        let resp = self
            .client
            .get(url)
            .headers(Self::identity_headers())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScannerError::scraping(
                format!("GET {url} failed"),
                Some(status.as_u16()),
            ));
        }
        Ok(resp.text().await?)
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        debug!("POST (json) {}", url);
        let resp = self
            .client
            .post(url)
            .headers(Self::identity_headers())
            .json(body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ScannerError::scraping(
                format!("POST {url} failed"),
                Some(status.as_u16()),
            ));
        }
        Ok(resp.json::<T>().await?)
    }

    /// Cheap reachability probe. Never errors; any transport failure is false.
    pub async fn probe(&self, url: &str) -> bool {
        match self
            .client
            .get(url)
            .headers(Self::identity_headers())
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success() || resp.status().is_redirection(),
            Err(_) => false,
        }
    }
}
