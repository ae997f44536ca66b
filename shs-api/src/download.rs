//! The seam between request objects and whatever performs the HTTP call.
//!
//! Request objects produce [`DownloadRequest`]s and hand them to a
//! [`DownloadClient`]. The client owns transport, authentication, retries and
//! caching; the helpers here (cache paths, failed-interval retry) are shared
//! by every client implementation.

use crate::{error::Result, mime_type::MimeType};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const REQUEST_FILENAME: &str = "request.json";
const RESPONSE_FILENAME: &str = "response";

/// Error type the Statistical API reports for an interval it failed to compute.
pub const EXECUTION_ERROR: &str = "EXECUTION_ERROR";

/// Everything a download client needs to perform one POST request.
#[derive(Debug, PartialEq, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub post_values: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub data_type: MimeType,
    /// Where responses are cached; no caching when `None`
    pub data_folder: Option<PathBuf>,
    pub save_response: bool,
}

impl DownloadRequest {
    /// A JSON POST request carrying `payload`.
    pub fn post_json(url: String, payload: Value) -> DownloadRequest {
        DownloadRequest {
            url,
            post_values: Some(payload),
            headers: vec![("content-type".to_string(), MimeType::Json.as_str().to_string())],
            data_type: MimeType::Json,
            data_folder: None,
            save_response: false,
        }
    }

    /// Same request with a different payload.
    pub fn with_post_values(&self, payload: Value) -> DownloadRequest {
        DownloadRequest {
            post_values: Some(payload),
            ..self.clone()
        }
    }

    /// Hex SHA-256 of the URL and payload; names the cache directory.
    pub fn request_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.url.as_bytes());
        if let Some(payload) = &self.post_values {
            hasher.update(payload.to_string().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    pub fn storage_dir(&self) -> Option<PathBuf> {
        self.data_folder
            .as_ref()
            .map(|folder| folder.join(self.request_hash()))
    }

    pub fn request_path(&self) -> Option<PathBuf> {
        self.storage_dir().map(|dir| dir.join(REQUEST_FILENAME))
    }

    pub fn response_path(&self) -> Option<PathBuf> {
        self.storage_dir().map(|dir| {
            dir.join(RESPONSE_FILENAME)
                .with_extension(self.data_type.extension())
        })
    }
}

/// Performs a [`DownloadRequest`] and returns the decoded JSON response.
#[async_trait]
pub trait DownloadClient: Send + Sync {
    async fn execute(&self, request: &DownloadRequest) -> Result<Value>;
}

/// Return a previously saved response for `request`, if any.
pub fn read_cached(request: &DownloadRequest) -> Result<Option<Value>> {
    let Some(path) = request.response_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    debug!("Reading cached response from {}", path.display());
    let contents = std::fs::read_to_string(&path)?;
    Ok(Some(serde_json::from_str(&contents)?))
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// Save the request and its response under the request's storage directory.
pub fn write_cached(request: &DownloadRequest, response: &Value) -> Result<()> {
    let (Some(request_path), Some(response_path)) = (request.request_path(), request.response_path()) else {
        return Ok(());
    };
    let request_info = serde_json::json!({
        "url": request.url,
        "payload": request.post_values,
    });
    write_json(&request_path, &request_info)?;
    write_json(&response_path, response)?;
    debug!("Saved response to {}", response_path.display());
    Ok(())
}

/// Positions and intervals of `data` entries that failed with an execution error.
pub fn failed_intervals(response: &Value) -> Vec<(usize, Value)> {
    let Some(entries) = response.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .enumerate()
        .filter(|(_, entry)| {
            entry
                .pointer("/error/type")
                .and_then(Value::as_str)
                .is_some_and(|kind| kind == EXECUTION_ERROR)
        })
        .filter_map(|(index, entry)| entry.get("interval").map(|interval| (index, interval.clone())))
        .collect()
}

/// Re-request intervals the service failed to compute, one interval at a
/// time, and splice successful results back into `response`.
pub async fn retry_failed_intervals<C: DownloadClient + ?Sized>(
    client: &C,
    request: &DownloadRequest,
    mut response: Value,
    n_retries: u32,
) -> Result<Value> {
    let Some(payload) = &request.post_values else {
        return Ok(response);
    };

    for round in 1..=n_retries {
        let failed = failed_intervals(&response);
        if failed.is_empty() {
            break;
        }
        info!(
            "Retry round {}/{}: re-requesting {} failed intervals",
            round,
            n_retries,
            failed.len()
        );

        for (index, interval) in failed {
            let mut interval_payload = payload.clone();
            if let Some(aggregation) = interval_payload
                .get_mut("aggregation")
                .and_then(Value::as_object_mut)
            {
                aggregation.insert("timeRange".to_string(), interval.clone());
            }

            let retried = match client.execute(&request.with_post_values(interval_payload)).await {
                Ok(retried) => retried,
                Err(e) => {
                    warn!("Retry of interval {} failed: {}", interval, e);
                    continue;
                }
            };

            match retried.pointer("/data/0") {
                Some(entry) if entry.get("error").is_none() => {
                    if let Some(slot) = response.pointer_mut(&format!("/data/{}", index)) {
                        *slot = entry.clone();
                    }
                }
                _ => warn!("Interval {} failed again", interval),
            }
        }
    }
    Ok(response)
}
