use crate::error::{Result, StatisticalError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use shs_utils::merge::update_other_args;
use std::{fmt, str::FromStr};

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub struct Crs(pub u32);

impl Crs {
    pub const WGS84: Crs = Crs(4326);
    pub const POP_WEB: Crs = Crs(3857);

    /// The OGC URL form of the CRS expected in `input.bounds.properties.crs`.
    pub fn opengis_string(&self) -> String {
        if *self == Crs::WGS84 {
            "http://www.opengis.net/def/crs/OGC/1.3/CRS84".to_string()
        } else {
            format!("http://www.opengis.net/def/crs/EPSG/0/{}", self.0)
        }
    }
}

impl Default for Crs {
    fn default() -> Self {
        Crs::WGS84
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for Crs {
    type Err = StatisticalError;

    /// Accepts `4326`, `EPSG:4326` and `epsg:4326`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let code = trimmed
            .split_once(':')
            .filter(|(authority, _)| authority.eq_ignore_ascii_case("epsg"))
            .map_or(trimmed, |(_, code)| code);
        code.parse::<u32>()
            .map(Crs)
            .map_err(|_| StatisticalError::Bounds(format!("unrecognized CRS '{}'", s)))
    }
}

/// An axis-aligned bounding box in a given CRS.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub crs: Crs,
}

impl BBox {
    /// Build a bounding box from two opposite corners, in any order.
    pub fn new(corner: (f64, f64), opposite: (f64, f64), crs: Crs) -> Result<BBox> {
        let coords = [corner.0, corner.1, opposite.0, opposite.1];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(StatisticalError::Bounds(format!(
                "bounding box coordinates must be finite, got {:?}",
                coords
            )));
        }
        let bbox = BBox {
            min_x: corner.0.min(opposite.0),
            min_y: corner.1.min(opposite.1),
            max_x: corner.0.max(opposite.0),
            max_y: corner.1.max(opposite.1),
            crs,
        };
        if bbox.min_x == bbox.max_x || bbox.min_y == bbox.max_y {
            return Err(StatisticalError::Bounds(format!(
                "bounding box {:?} has zero area",
                bbox.as_array()
            )));
        }
        Ok(bbox)
    }

    /// Parse `"min_x,min_y,max_x,max_y"` in the given CRS.
    pub fn parse(s: &str, crs: Crs) -> Result<BBox> {
        let values = s
            .split(',')
            .map(|part| part.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<f64>, _>>()
            .map_err(|e| StatisticalError::Bounds(format!("invalid bounding box '{}': {}", s, e)))?;
        match values.as_slice() {
            [x1, y1, x2, y2] => BBox::new((*x1, *y1), (*x2, *y2), crs),
            _ => Err(StatisticalError::Bounds(format!(
                "bounding box needs 4 coordinates, got {}",
                values.len()
            ))),
        }
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

/// A GeoJSON geometry in a given CRS. The GeoJSON itself is kept opaque.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Geometry {
    geojson: Value,
    pub crs: Crs,
}

impl Geometry {
    pub fn new(geojson: Value, crs: Crs) -> Result<Geometry> {
        match geojson.get("type") {
            Some(Value::String(_)) => Ok(Geometry { geojson, crs }),
            _ => Err(StatisticalError::Bounds(
                "geometry must be a GeoJSON object with a 'type' member".to_string(),
            )),
        }
    }

    /// GeoJSON without any embedded `crs` member.
    pub fn geojson(&self) -> Value {
        let mut geojson = self.geojson.clone();
        if let Some(object) = geojson.as_object_mut() {
            object.remove("crs");
        }
        geojson
    }
}

/// Resolve a bounding box and/or geometry into the `input.bounds` object.
///
/// At least one of the two is required. When both are given they must share
/// a CRS.
pub fn bounds(
    bbox: Option<&BBox>,
    geometry: Option<&Geometry>,
    other_args: Option<&Map<String, Value>>,
) -> Result<Value> {
    let crs = match (bbox, geometry) {
        (None, None) => {
            return Err(StatisticalError::Bounds(
                "'bbox' and/or 'geometry' have to be provided".to_string(),
            ))
        }
        (Some(bbox), Some(geometry)) if bbox.crs != geometry.crs => {
            return Err(StatisticalError::Bounds(format!(
                "bbox ({}) and geometry ({}) should be in the same CRS",
                bbox.crs, geometry.crs
            )))
        }
        (Some(bbox), _) => bbox.crs,
        (None, Some(geometry)) => geometry.crs,
    };

    let mut request_bounds = Map::new();
    request_bounds.insert("properties".to_string(), json!({ "crs": crs.opengis_string() }));
    if let Some(bbox) = bbox {
        request_bounds.insert("bbox".to_string(), json!(bbox.as_array()));
    }
    if let Some(geometry) = geometry {
        request_bounds.insert("geometry".to_string(), geometry.geojson());
    }
    if let Some(other_args) = other_args {
        update_other_args(&mut request_bounds, other_args);
    }
    Ok(Value::Object(request_bounds))
}
