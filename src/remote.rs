use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::DatasetId;
use crate::error::MirrorError;

pub trait RemoteHost: Send + Sync {
    fn source_url(&self, id: &DatasetId) -> String;
    /// `Ok(false)` only when the host answers 404 for the dataset.
    fn dataset_exists(&self, id: &DatasetId) -> Result<bool, MirrorError>;
}

pub trait MetadataSource: Send + Sync {
    fn fetch_table(&self) -> Result<String, MirrorError>;
}

impl<T: RemoteHost + ?Sized> RemoteHost for &T {
    fn source_url(&self, id: &DatasetId) -> String {
        (**self).source_url(id)
    }

    fn dataset_exists(&self, id: &DatasetId) -> Result<bool, MirrorError> {
        (**self).dataset_exists(id)
    }
}

impl<T: MetadataSource + ?Sized> MetadataSource for &T {
    fn fetch_table(&self) -> Result<String, MirrorError> {
        (**self).fetch_table()
    }
}

#[derive(Clone)]
pub struct RemoteHttpClient {
    client: Client,
    base_url: String,
    metadata_url: String,
}

impl RemoteHttpClient {
    pub fn new(base_url: &str, metadata_url: &str) -> Result<Self, MirrorError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("on-mirror/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| MirrorError::RemoteHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| MirrorError::RemoteHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            metadata_url: metadata_url.to_string(),
        })
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, MirrorError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(MirrorError::RemoteHttp(err.to_string()));
                }
            }
        }
    }
}

impl RemoteHost for RemoteHttpClient {
    fn source_url(&self, id: &DatasetId) -> String {
        dataset_source_url(&self.base_url, id)
    }

    fn dataset_exists(&self, id: &DatasetId) -> Result<bool, MirrorError> {
        let url = self.source_url(id);
        let response = self.send_with_retries(|| self.client.get(&url))?;
        Ok(response.status() != StatusCode::NOT_FOUND)
    }
}

impl MetadataSource for RemoteHttpClient {
    fn fetch_table(&self) -> Result<String, MirrorError> {
        let response = self.send_with_retries(|| self.client.get(&self.metadata_url))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "metadata request failed".to_string());
            return Err(MirrorError::RemoteStatus { status, message });
        }
        response
            .text()
            .map_err(|err| MirrorError::RemoteHttp(err.to_string()))
    }
}

pub fn dataset_source_url(base_url: &str, id: &DatasetId) -> String {
    format!("{}/{}.git", base_url.trim_end_matches('/'), id.as_str())
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
