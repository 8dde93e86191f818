//! JSON scanner configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use taggrid_core::{GridShape, GridSpec, GridSpecError, RelGaps, TileSize};
use taggrid_tags::{CatalogError, PatternError, TagCatalog, TagPattern, TagSource};

use crate::Roi;

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
    #[error("expected a JSON object at {0}")]
    NotAnObject(&'static str),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    Grid(#[from] GridSpecError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("camera needs either `id` or `filename`")]
    MissingSource,
    #[error("camera size must be non-zero (got {height}x{width}, height first)")]
    InvalidSize { height: u32, width: u32 },
    #[error("fourcc must be exactly four characters (got {0:?})")]
    InvalidFourcc(String),
    #[error("smoothing factor {0} is outside [0, 1)")]
    InvalidSmoothing(f64),
    #[error("reconnection delay {0} must be a non-negative number of seconds")]
    InvalidDelay(f64),
    #[error("{name} must be positive (got {value})")]
    InvalidRate { name: &'static str, value: f64 },
    #[error("crop factor {axis} = {value} is outside (0, 1]")]
    InvalidCrop { axis: char, value: f64 },
    #[error("relative gap {axis} = {value} leaves no room for tiles")]
    NoRoomForTiles { axis: char, value: f64 },
    #[error("aspect ratio must be positive (got {0})")]
    InvalidAspectRatio(f64),
    #[error("pixels per tile bit must be at least 1")]
    ZeroPxPerBit,
    #[error("ROI corners must be finite numbers")]
    InvalidRoi,
    #[error("remote notifications are enabled but no `url` is set")]
    MissingUrl,
}

fn default_reconnection_delay() -> f64 {
    0.5
}

fn default_px_per_bit() -> usize {
    8
}

fn default_true() -> bool {
    true
}

fn default_interval() -> f64 {
    1.0
}

fn default_rate() -> f64 {
    4.0
}

fn default_display_rate() -> f64 {
    60.0
}

/// Where frames come from and how the capture should be configured.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Camera device index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    /// Image file or directory of images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<PathBuf>,
    /// Requested frame size as `[height, width]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<[u32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fourcc: Option<String>,
    /// Weight of the previous frame when blending consecutive frames.
    #[serde(default)]
    pub smooth: f64,
    /// Minimum seconds between reconnection attempts.
    #[serde(default = "default_reconnection_delay")]
    pub reconnection_delay: f64,
}

/// Per-cell crop applied inside each tile window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CropFactors {
    pub x: f64,
    pub y: f64,
}

impl Default for CropFactors {
    fn default() -> Self {
        Self { x: 1.0, y: 1.0 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DimensionsConfig {
    pub grid: GridShape,
    pub tile: TileSize,
    #[serde(default)]
    pub gap: RelGaps,
    #[serde(default)]
    pub roi: Roi,
    #[serde(default)]
    pub crop: CropFactors,
    /// Width / height of the rectified ROI; derived from the grid when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<f64>,
    /// Rectified pixels per tile bit.
    #[serde(default = "default_px_per_bit")]
    pub px_per_bit: usize,
}

impl DimensionsConfig {
    pub fn grid_spec(&self) -> GridSpec {
        GridSpec {
            shape: self.grid,
            tile: self.tile,
            gaps: self.gap,
        }
    }

    /// Size of the rectified ROI image, `(width, height)`.
    ///
    /// Chosen so that every tile window spans `px_per_bit` pixels per bit
    /// once the gaps are taken out.
    pub fn rectified_size(&self) -> Result<(usize, usize), ConfigError> {
        let width = axis_extent(
            'x',
            self.tile.width * self.px_per_bit,
            self.grid.cols,
            self.gap.x,
        )?;
        let height = match self.aspect_ratio {
            Some(aspect) if aspect.is_finite() && aspect > 0.0 => {
                ((width as f64 / aspect).round() as usize).max(1)
            }
            Some(aspect) => return Err(ConfigError::InvalidAspectRatio(aspect)),
            None => axis_extent(
                'y',
                self.tile.height * self.px_per_bit,
                self.grid.rows,
                self.gap.y,
            )?,
        };
        Ok((width, height))
    }
}

fn axis_extent(axis: char, tile_px: usize, count: usize, gap: f64) -> Result<usize, ConfigError> {
    let denom = 1.0 + gap - gap * count as f64;
    if denom <= 0.0 {
        return Err(ConfigError::NoRoomForTiles { axis, value: gap });
    }
    Ok(((tile_px * count) as f64 / denom).ceil().max(1.0) as usize)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub stdout: bool,
    #[serde(default)]
    pub stderr: bool,
    #[serde(default)]
    pub remote: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Re-send the last notification every `interval` seconds.
    #[serde(default)]
    pub repeat: bool,
    #[serde(default = "default_interval")]
    pub interval: f64,
    /// JSON document the grid is written into.
    #[serde(default)]
    pub template: Value,
    /// JSON pointer into `template`; empty means the grid is the whole payload.
    #[serde(default, rename = "assignTo", alias = "assign_to")]
    pub assign_to: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stderr: false,
            remote: false,
            url: None,
            repeat: false,
            interval: default_interval(),
            template: Value::Null,
            assign_to: String::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Decode cycles per second.
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Consumer loop iterations per second.
    #[serde(default = "default_display_rate")]
    pub display_rate: f64,
    /// Start with visualization artifacts enabled.
    #[serde(default)]
    pub visualize: bool,
    /// Switch visualization off after this many idle seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_hide: Option<f64>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            display_rate: default_display_rate(),
            visualize: false,
            auto_hide: None,
        }
    }
}

/// Complete scanner configuration, as stored on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub camera: CameraConfig,
    pub dimensions: DimensionsConfig,
    #[serde(default)]
    pub tags: Vec<TagSource>,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

impl ScannerConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load and validate.
    pub fn load_validated(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let config = Self::load_json(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn with_roi(mut self, roi: Roi) -> Self {
        self.dimensions.roi = roi;
        self
    }

    pub fn patterns(&self) -> Result<Vec<TagPattern>, ConfigError> {
        Ok(TagPattern::from_sources(&self.tags, self.dimensions.tile)?)
    }

    pub fn build_catalog(&self) -> Result<TagCatalog, ConfigError> {
        let patterns = self.patterns()?;
        Ok(TagCatalog::build(&patterns, self.dimensions.tile)?)
    }

    /// Check every setting before any thread is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cam = &self.camera;
        if cam.id.is_none() && cam.filename.is_none() {
            return Err(ConfigError::MissingSource);
        }
        if let Some([height, width]) = cam.size {
            if height == 0 || width == 0 {
                return Err(ConfigError::InvalidSize { height, width });
            }
        }
        if let Some(fourcc) = &cam.fourcc {
            if fourcc.chars().count() != 4 {
                return Err(ConfigError::InvalidFourcc(fourcc.clone()));
            }
        }
        if let Some(fps) = cam.fps {
            check_rate("camera fps", fps)?;
        }
        if !(0.0..1.0).contains(&cam.smooth) {
            return Err(ConfigError::InvalidSmoothing(cam.smooth));
        }
        if !(cam.reconnection_delay.is_finite() && cam.reconnection_delay >= 0.0) {
            return Err(ConfigError::InvalidDelay(cam.reconnection_delay));
        }

        let dims = &self.dimensions;
        dims.grid_spec().validate()?;
        for (axis, value) in [('x', dims.crop.x), ('y', dims.crop.y)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidCrop { axis, value });
            }
        }
        if dims.px_per_bit == 0 {
            return Err(ConfigError::ZeroPxPerBit);
        }
        if !dims.roi.is_finite() {
            return Err(ConfigError::InvalidRoi);
        }
        dims.rectified_size()?;
        self.build_catalog()?;

        let notify = &self.notify;
        if notify.remote && notify.url.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingUrl);
        }
        if notify.repeat {
            check_rate("notify interval", notify.interval)?;
        }

        check_rate("scan rate", self.scan.rate)?;
        check_rate("display rate", self.scan.display_rate)?;
        if let Some(auto_hide) = self.scan.auto_hide {
            check_rate("auto hide timeout", auto_hide)?;
        }
        Ok(())
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidRate { name, value })
    }
}

/// Rewrite `dimensions.roi` in the config file at `path`, leaving every other
/// entry as the user wrote it.
pub fn store_roi(path: impl AsRef<Path>, roi: &Roi) -> Result<(), ConfigIoError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)?;
    let mut value: Value = serde_json::from_str(&raw)?;
    let root = value.as_object_mut().ok_or(ConfigIoError::NotAnObject("/"))?;
    let dims = root
        .entry("dimensions")
        .or_insert_with(|| Value::Object(Default::default()))
        .as_object_mut()
        .ok_or(ConfigIoError::NotAnObject("/dimensions"))?;
    dims.insert("roi".to_owned(), serde_json::to_value(roi)?);

    let updated: ScannerConfig = serde_json::from_value(value.clone())?;
    updated.validate()?;
    fs::write(path, serde_json::to_string_pretty(&value)?)?;
    Ok(())
}
