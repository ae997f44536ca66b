use crate::{
    data_collection::DataCollection,
    error::{Result, StatisticalError},
};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use shs_utils::{
    merge::update_other_args,
    time::{parse_time_interval, serialize_time, TimeSpec},
};
use std::str::FromStr;

/// Order in which overlapping tiles are mosaicked.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum MosaickingOrder {
    MostRecent,
    LeastRecent,
    LeastCc,
}

impl MosaickingOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            MosaickingOrder::MostRecent => "mostRecent",
            MosaickingOrder::LeastRecent => "leastRecent",
            MosaickingOrder::LeastCc => "leastCC",
        }
    }
}

impl FromStr for MosaickingOrder {
    type Err = StatisticalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "mostRecent" | "most-recent" => Ok(MosaickingOrder::MostRecent),
            "leastRecent" | "least-recent" => Ok(MosaickingOrder::LeastRecent),
            "leastCC" | "least-cc" => Ok(MosaickingOrder::LeastCc),
            other => Err(StatisticalError::InvalidInput(format!(
                "unknown mosaicking order '{}'",
                other
            ))),
        }
    }
}

/// Interpolation used when the service resamples source data.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum ResamplingType {
    Nearest,
    Bilinear,
    Bicubic,
}

impl ResamplingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResamplingType::Nearest => "NEAREST",
            ResamplingType::Bilinear => "BILINEAR",
            ResamplingType::Bicubic => "BICUBIC",
        }
    }
}

impl FromStr for ResamplingType {
    type Err = StatisticalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "NEAREST" => Ok(ResamplingType::Nearest),
            "BILINEAR" => Ok(ResamplingType::Bilinear),
            "BICUBIC" => Ok(ResamplingType::Bicubic),
            _ => Err(StatisticalError::InvalidInput(format!(
                "unknown resampling type '{}'",
                s
            ))),
        }
    }
}

/// Build one entry of `input.data`.
///
/// `maxcc` is the maximal cloud coverage as a fraction in `[0, 1]`; the
/// service expects a percentage.
pub fn input_data(
    collection: &DataCollection,
    time_interval: Option<&TimeSpec>,
    maxcc: Option<f64>,
    mosaicking_order: Option<MosaickingOrder>,
    upsampling: Option<ResamplingType>,
    downsampling: Option<ResamplingType>,
    other_args: Option<&Map<String, Value>>,
) -> Result<Value> {
    let mut data_filter = Map::new();
    if let Some(time_interval) = time_interval {
        let interval = parse_time_interval(time_interval, true)?;
        let (from, to) = serialize_time(&interval, true);
        data_filter.insert("timeRange".to_string(), json!({ "from": from, "to": to }));
    }
    if let Some(maxcc) = maxcc {
        if !(0.0..=1.0).contains(&maxcc) {
            return Err(StatisticalError::InvalidInput(format!(
                "maxcc should be a number on the interval [0, 1], got {}",
                maxcc
            )));
        }
        if !collection.has_cloud_coverage() {
            warn!("Collection {} has no cloud coverage, maxcc will likely be ignored", collection);
        }
        data_filter.insert(
            "maxCloudCoverage".to_string(),
            json!((maxcc * 100.0).round() as u32),
        );
    }
    if let Some(order) = mosaicking_order {
        data_filter.insert("mosaickingOrder".to_string(), json!(order.as_str()));
    }
    data_filter.extend(collection.data_filters());

    let mut entry = Map::new();
    entry.insert("type".to_string(), json!(collection.api_id()));
    entry.insert("dataFilter".to_string(), Value::Object(data_filter));

    let mut processing = Map::new();
    if let Some(upsampling) = upsampling {
        processing.insert("upsampling".to_string(), json!(upsampling.as_str()));
    }
    if let Some(downsampling) = downsampling {
        processing.insert("downsampling".to_string(), json!(downsampling.as_str()));
    }
    if !processing.is_empty() {
        entry.insert("processing".to_string(), Value::Object(processing));
    }

    if let Some(other_args) = other_args {
        update_other_args(&mut entry, other_args);
    }
    Ok(Value::Object(entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_entry() {
        let entry = input_data(&DataCollection::Sentinel2L2A, None, None, None, None, None, None).unwrap();
        assert_eq!(entry, json!({"type": "sentinel-2-l2a", "dataFilter": {}}));
    }

    #[test]
    fn test_full_entry() {
        let interval: TimeSpec = ("2020-06-01", "2020-07-01").into();
        let entry = input_data(
            &DataCollection::Sentinel2L1C,
            Some(&interval),
            Some(0.3),
            Some(MosaickingOrder::LeastCc),
            Some(ResamplingType::Bilinear),
            None,
            None,
        )
        .unwrap();
        assert_eq!(
            entry,
            json!({
                "type": "sentinel-2-l1c",
                "dataFilter": {
                    "timeRange": {"from": "2020-06-01T00:00:00Z", "to": "2020-07-01T00:00:00Z"},
                    "maxCloudCoverage": 30,
                    "mosaickingOrder": "leastCC"
                },
                "processing": {"upsampling": "BILINEAR"}
            })
        );
    }

    #[test]
    fn test_maxcc_out_of_range() {
        let result = input_data(&DataCollection::Sentinel2L2A, None, Some(1.5), None, None, None, None);
        assert!(matches!(result, Err(StatisticalError::InvalidInput(_))));
    }

    #[test]
    fn test_collection_filters_and_other_args() {
        let extra = json!({"id": "s1", "dataFilter": {"orbitDirection": "ASCENDING"}});
        let entry = input_data(
            &DataCollection::Sentinel1IW,
            None,
            None,
            None,
            None,
            Some(ResamplingType::Nearest),
            extra.as_object(),
        )
        .unwrap();
        assert_eq!(entry["id"], "s1");
        assert_eq!(entry["dataFilter"]["polarization"], "DV");
        assert_eq!(entry["dataFilter"]["orbitDirection"], "ASCENDING");
        assert_eq!(entry["processing"]["downsampling"], "NEAREST");
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("leastCC".parse::<MosaickingOrder>().unwrap(), MosaickingOrder::LeastCc);
        assert_eq!("bicubic".parse::<ResamplingType>().unwrap(), ResamplingType::Bicubic);
        assert!("newest".parse::<MosaickingOrder>().is_err());
    }
}
