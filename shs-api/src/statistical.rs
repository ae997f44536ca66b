//! Sentinel Hub Statistical API requests.
//!
//! See the
//! [Statistical API documentation](https://docs.sentinel-hub.com/api/latest/api/statistical/).

use crate::{
    bounds::{bounds, BBox, Geometry},
    config::ShConfig,
    download::{retry_failed_intervals, DownloadClient, DownloadRequest},
    error::{Result, StatisticalError},
    mime_type::MimeType,
};
use log::{debug, info};
use serde_json::{json, Map, Value};
use shs_utils::{
    merge::update_other_args,
    time::{parse_time_interval, serialize_time, TimeSpec},
};
use std::path::PathBuf;

/// Path of the Statistical API under `/api/v1/`.
pub const SERVICE_ENDPOINT: &str = "statistics";

fn default_calculations() -> Value {
    json!({ "default": {} })
}

/// Assemble the full request body.
///
/// The entries of `request_data` are copied; any entry without a
/// `dataFilter` gets an empty one. Missing or empty `calculations` become
/// `{"default": {}}`. `other_args` is deep-merged over the result.
pub fn body(
    request_bounds: Value,
    request_data: &[Value],
    aggregation: Value,
    calculations: Option<Value>,
    other_args: Option<&Map<String, Value>>,
) -> Result<Value> {
    let data = request_data
        .iter()
        .map(|entry| match entry {
            Value::Object(fields) => {
                let mut fields = fields.clone();
                fields
                    .entry("dataFilter")
                    .or_insert_with(|| Value::Object(Map::new()));
                Ok(Value::Object(fields))
            }
            other => Err(StatisticalError::InvalidInput(format!(
                "input data entries must be objects, got {}",
                other
            ))),
        })
        .collect::<Result<Vec<Value>>>()?;

    let calculations = match calculations {
        None | Some(Value::Null) => default_calculations(),
        Some(Value::Object(fields)) if fields.is_empty() => default_calculations(),
        Some(calculations) => calculations,
    };

    let mut request_body = Map::new();
    request_body.insert(
        "input".to_string(),
        json!({ "bounds": request_bounds, "data": data }),
    );
    request_body.insert("aggregation".to_string(), aggregation);
    request_body.insert("calculations".to_string(), calculations);

    if let Some(other_args) = other_args {
        update_other_args(&mut request_body, other_args);
    }
    Ok(Value::Object(request_body))
}

/// Build the `aggregation` part of the request body.
///
/// `size` is the `(width, height)` of the image data is aggregated from and
/// `resolution` its `(resx, resy)` in units of the request CRS. Both may be
/// given; the service decides what to make of that.
pub fn aggregation(
    evalscript: &str,
    time_interval: impl Into<TimeSpec>,
    aggregation_interval: &str,
    size: Option<(u32, u32)>,
    resolution: Option<(f64, f64)>,
    other_args: Option<&Map<String, Value>>,
) -> Result<Value> {
    let interval = parse_time_interval(&time_interval.into(), true)?;
    let (start_time, end_time) = serialize_time(&interval, true);

    let mut payload = Map::new();
    payload.insert("evalscript".to_string(), json!(evalscript));
    payload.insert(
        "timeRange".to_string(),
        json!({ "from": start_time, "to": end_time }),
    );
    payload.insert(
        "aggregationInterval".to_string(),
        json!({ "of": aggregation_interval }),
    );

    if let Some((width, height)) = size {
        payload.insert("width".to_string(), json!(width));
        payload.insert("height".to_string(), json!(height));
    }
    if let Some((resx, resy)) = resolution {
        payload.insert("resx".to_string(), json!(resx));
        payload.insert("resy".to_string(), json!(resy));
    }

    if let Some(other_args) = other_args {
        update_other_args(&mut payload, other_args);
    }
    Ok(Value::Object(payload))
}

/// A Statistical API request: the finished payload plus what a download
/// client needs to submit it.
#[derive(Debug, Clone, PartialEq)]
pub struct SentinelHubStatistical {
    payload: Value,
    mime_type: MimeType,
    config: ShConfig,
    data_folder: Option<PathBuf>,
}

impl SentinelHubStatistical {
    /// `aggregation` is typically built with [`aggregation`] and the entries
    /// of `input_data` with [`crate::input_data::input_data`].
    pub fn new(
        aggregation: Value,
        input_data: &[Value],
        bbox: Option<&BBox>,
        geometry: Option<&Geometry>,
        calculations: Option<Value>,
        config: ShConfig,
    ) -> Result<SentinelHubStatistical> {
        let request_bounds = bounds(bbox, geometry, None)?;
        let payload = body(request_bounds, input_data, aggregation, calculations, None)?;
        debug!("Built statistical payload with {} inputs", input_data.len());
        Ok(SentinelHubStatistical {
            payload,
            mime_type: MimeType::Json,
            config,
            data_folder: None,
        })
    }

    /// Cache responses under `data_folder`.
    pub fn with_data_folder(mut self, data_folder: impl Into<PathBuf>) -> SentinelHubStatistical {
        self.data_folder = Some(data_folder.into());
        self
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn mime_type(&self) -> MimeType {
        self.mime_type
    }

    pub fn config(&self) -> &ShConfig {
        &self.config
    }

    pub fn url(&self) -> String {
        format!("{}/api/v1/{}", self.config.base_url(), SERVICE_ENDPOINT)
    }

    pub fn download_list(&self) -> Vec<DownloadRequest> {
        let mut request = DownloadRequest::post_json(self.url(), self.payload.clone());
        request.data_type = self.mime_type;
        request.data_folder = self.data_folder.clone();
        request.save_response = self.data_folder.is_some();
        vec![request]
    }

    /// Submit every request with `client`, re-requesting failed intervals
    /// up to `n_interval_retries` times.
    pub async fn get_data<C: DownloadClient + ?Sized>(&self, client: &C) -> Result<Vec<Value>> {
        let mut results = Vec::new();
        for request in self.download_list() {
            info!("Requesting statistics from {}", request.url);
            let response = client.execute(&request).await?;
            let response =
                retry_failed_intervals(client, &request, response, self.config.n_interval_retries)
                    .await?;
            results.push(response);
        }
        Ok(results)
    }
}
