use crate::error::StatisticalError;
use serde_json::{json, Map, Value};
use std::{fmt, str::FromStr};

/// A Sentinel Hub data collection that can be used as a request input.
///
/// See: <https://docs.sentinel-hub.com/api/latest/data/>
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum DataCollection {
    Sentinel2L1C,
    Sentinel2L2A,
    /// Sentinel-1 GRD, interferometric wide swath, dual vertical polarization
    Sentinel1IW,
    Sentinel3Olci,
    Sentinel3Slstr,
    Sentinel5PL2,
    LandsatOtL1,
    LandsatOtL2,
    Modis,
    Dem,
    /// Bring-your-own-COG collection, identified by its collection id
    Byoc(String),
    /// Collection produced by the batch processing API
    Batch(String),
}

impl DataCollection {
    /// Identifier used in `input.data[].type`.
    pub fn api_id(&self) -> String {
        match self {
            DataCollection::Sentinel2L1C => "sentinel-2-l1c".to_string(),
            DataCollection::Sentinel2L2A => "sentinel-2-l2a".to_string(),
            DataCollection::Sentinel1IW => "sentinel-1-grd".to_string(),
            DataCollection::Sentinel3Olci => "sentinel-3-olci".to_string(),
            DataCollection::Sentinel3Slstr => "sentinel-3-slstr".to_string(),
            DataCollection::Sentinel5PL2 => "sentinel-5p-l2".to_string(),
            DataCollection::LandsatOtL1 => "landsat-ot-l1".to_string(),
            DataCollection::LandsatOtL2 => "landsat-ot-l2".to_string(),
            DataCollection::Modis => "modis".to_string(),
            DataCollection::Dem => "dem".to_string(),
            DataCollection::Byoc(id) => format!("byoc-{}", id),
            DataCollection::Batch(id) => format!("batch-{}", id),
        }
    }

    /// Filters implied by the collection itself, merged into `dataFilter`.
    pub fn data_filters(&self) -> Map<String, Value> {
        match self {
            DataCollection::Sentinel1IW => json!({
                "acquisitionMode": "IW",
                "polarization": "DV",
                "resolution": "HIGH"
            })
            .as_object()
            .cloned()
            .unwrap_or_default(),
            _ => Map::new(),
        }
    }

    /// Whether the collection carries a cloud cover estimate.
    pub fn has_cloud_coverage(&self) -> bool {
        matches!(
            self,
            DataCollection::Sentinel2L1C
                | DataCollection::Sentinel2L2A
                | DataCollection::LandsatOtL1
                | DataCollection::LandsatOtL2
        )
    }
}

impl fmt::Display for DataCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.api_id())
    }
}

impl FromStr for DataCollection {
    type Err = StatisticalError;

    /// Parses an API id such as `sentinel-2-l2a` or `byoc-<collection id>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        let collection = match lowered.as_str() {
            "sentinel-2-l1c" => DataCollection::Sentinel2L1C,
            "sentinel-2-l2a" => DataCollection::Sentinel2L2A,
            "sentinel-1-grd" => DataCollection::Sentinel1IW,
            "sentinel-3-olci" => DataCollection::Sentinel3Olci,
            "sentinel-3-slstr" => DataCollection::Sentinel3Slstr,
            "sentinel-5p-l2" => DataCollection::Sentinel5PL2,
            "landsat-ot-l1" => DataCollection::LandsatOtL1,
            "landsat-ot-l2" => DataCollection::LandsatOtL2,
            "modis" => DataCollection::Modis,
            "dem" => DataCollection::Dem,
            other => match (other.strip_prefix("byoc-"), other.strip_prefix("batch-")) {
                (Some(id), _) if !id.is_empty() => DataCollection::Byoc(id.to_string()),
                (_, Some(id)) if !id.is_empty() => DataCollection::Batch(id.to_string()),
                _ => {
                    return Err(StatisticalError::InvalidInput(format!(
                        "unknown data collection '{}'",
                        s
                    )))
                }
            },
        };
        Ok(collection)
    }
}
