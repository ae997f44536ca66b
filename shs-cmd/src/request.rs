//! Building and submitting Statistical API requests from CLI arguments.

use anyhow::Context;
use chrono::Local;
use clap::Args;
use log::{info, warn};
use serde_json::Value;
use shs_api::{
    bounds::{BBox, Crs, Geometry},
    client::StatisticalDownloadClient,
    config::ShConfig,
    data_collection::DataCollection,
    download::failed_intervals,
    input_data::{input_data, MosaickingOrder},
    statistical::{aggregation, SentinelHubStatistical},
};
use shs_utils::time::TimeSpec;
use std::path::{Path, PathBuf};

/// Arguments describing a single Statistical API request.
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Bounding box as min_x,min_y,max_x,max_y
    #[arg(long, allow_hyphen_values = true)]
    pub bbox: Option<String>,

    /// CRS of the bounding box and geometry (EPSG code)
    #[arg(long, default_value = "4326")]
    pub crs: Crs,

    /// Path to a GeoJSON geometry or feature
    #[arg(short = 'g', long)]
    pub geometry: Option<PathBuf>,

    /// Path to the evalscript
    #[arg(short = 'e', long)]
    pub evalscript: PathBuf,

    /// Start of the time interval (YYYY-MM-DD or ISO 8601)
    #[arg(long = "from")]
    pub time_from: String,

    /// End of the time interval, defaults to today
    #[arg(long = "to")]
    pub time_to: Option<String>,

    /// ISO 8601 duration of each aggregation interval
    #[arg(long, default_value = "P1D")]
    pub interval: String,

    /// Data collection API id, e.g. sentinel-2-l2a or byoc-<id>
    #[arg(long, default_value = "sentinel-2-l2a")]
    pub collection: DataCollection,

    /// Maximal cloud coverage in [0, 1]
    #[arg(long)]
    pub maxcc: Option<f64>,

    /// mostRecent, leastRecent or leastCC
    #[arg(long)]
    pub mosaicking_order: Option<MosaickingOrder>,

    /// Image size as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Resolution as RESX,RESY in CRS units
    #[arg(long, value_parser = parse_resolution)]
    pub resolution: Option<(f64, f64)>,

    /// Path to a JSON file holding the calculations object
    #[arg(long)]
    pub calculations: Option<PathBuf>,
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (width, height) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let width = width.trim().parse::<u32>().map_err(|e| e.to_string())?;
    let height = height.trim().parse::<u32>().map_err(|e| e.to_string())?;
    Ok((width, height))
}

fn parse_resolution(s: &str) -> Result<(f64, f64), String> {
    let (resx, resy) = s
        .split_once(',')
        .ok_or_else(|| format!("expected RESX,RESY, got '{}'", s))?;
    let resx = resx.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let resy = resy.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok((resx, resy))
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

fn read_geometry(path: &Path, crs: Crs) -> anyhow::Result<Geometry> {
    let mut geojson = read_json(path)?;
    // a Feature carries its geometry in a member
    if geojson.get("type").and_then(Value::as_str) == Some("Feature") {
        geojson = geojson
            .get("geometry")
            .cloned()
            .context("GeoJSON feature has no geometry")?;
    }
    Ok(Geometry::new(geojson, crs)?)
}

/// Turn CLI arguments into a ready-to-submit request.
pub fn build_request(args: &RequestArgs, config: ShConfig) -> anyhow::Result<SentinelHubStatistical> {
    let evalscript = std::fs::read_to_string(&args.evalscript)
        .with_context(|| format!("Failed to read evalscript {}", args.evalscript.display()))?;
    let time_to = args
        .time_to
        .clone()
        .unwrap_or_else(|| Local::now().naive_local().date().format("%Y-%m-%d").to_string());
    let time_interval: TimeSpec = (args.time_from.as_str(), time_to.as_str()).into();

    let aggregation = aggregation(
        &evalscript,
        time_interval,
        &args.interval,
        args.size,
        args.resolution,
        None,
    )?;
    let entry = input_data(
        &args.collection,
        None,
        args.maxcc,
        args.mosaicking_order,
        None,
        None,
        None,
    )?;

    let bbox = args
        .bbox
        .as_deref()
        .map(|bbox| BBox::parse(bbox, args.crs))
        .transpose()?;
    let geometry = args
        .geometry
        .as_deref()
        .map(|path| read_geometry(path, args.crs))
        .transpose()?;
    let calculations = args.calculations.as_deref().map(read_json).transpose()?;

    Ok(SentinelHubStatistical::new(
        aggregation,
        &[entry],
        bbox.as_ref(),
        geometry.as_ref(),
        calculations,
        config,
    )?)
}

/// Print the payload a request would send.
pub fn run_payload(args: &RequestArgs) -> anyhow::Result<()> {
    let request = build_request(args, ShConfig::default())?;
    println!("{}", serde_json::to_string_pretty(request.payload())?);
    Ok(())
}

/// Submit a request and write the response JSON to `output` (stdout if absent).
pub async fn run_stats(
    args: &RequestArgs,
    config_path: Option<&Path>,
    data_folder: Option<&Path>,
    output: Option<&Path>,
    redownload: bool,
) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => ShConfig::load(path)?,
        None => ShConfig::from_env()?,
    };
    let mut request = build_request(args, config.clone())?;
    if let Some(folder) = data_folder {
        request = request.with_data_folder(folder);
    }

    let client = StatisticalDownloadClient::new(config)?.with_redownload(redownload);
    let response = request
        .get_data(&client)
        .await?
        .into_iter()
        .next()
        .context("Statistical API returned no response")?;

    let intervals = response
        .get("data")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let failed = failed_intervals(&response).len();
    if failed > 0 {
        warn!("{} of {} intervals failed", failed, intervals);
    }
    info!("Received statistics for {} intervals", intervals);

    let rendered = serde_json::to_string_pretty(&response)?;
    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            info!("Statistics written to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}
