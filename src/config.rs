use crate::models::{FieldKind, Rect, Script};
use crate::utils::IdCardError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the whole extraction pipeline.
///
/// Every section falls back to its defaults, so a JSON file only needs the
/// keys it wants to override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub card: CardConfig,
    pub fields: FieldConfig,
    pub ocr: OcrConfig,
    /// Worker threads for per-field extraction (0 = one per CPU)
    pub workers: usize,
    /// Per-request deadline in milliseconds
    pub timeout_ms: Option<u64>,
}

impl PipelineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, IdCardError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IdCardError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, IdCardError> {
        let config: PipelineConfig = serde_json::from_str(raw)
            .map_err(|e| IdCardError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), IdCardError> {
        if !(0.0..=1.0).contains(&self.card.min_confidence) {
            return Err(IdCardError::Config(
                "card.min_confidence must be within [0, 1]".to_string(),
            ));
        }
        if self.card.canonical_width < 100 {
            return Err(IdCardError::Config(
                "card.canonical_width must be at least 100 pixels".to_string(),
            ));
        }
        if self.card.aspect_tolerance <= 0.0 {
            return Err(IdCardError::Config(
                "card.aspect_tolerance must be positive".to_string(),
            ));
        }
        for (kind, region) in &self.fields.layout {
            if !region.is_valid() {
                return Err(IdCardError::Config(format!(
                    "fields.layout.{} lies outside the card",
                    kind
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardConfig {
    /// Minimum detector confidence for a card candidate
    pub min_confidence: f32,
    /// Allowed relative deviation from the ID-1 aspect ratio
    pub aspect_tolerance: f32,
    /// Minimum share of the photo the card must cover
    pub min_area_fraction: f32,
    /// Width of the canonical card image in pixels
    pub canonical_width: u32,
    /// Gaussian blur applied before binarization
    pub blur_sigma: f32,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            aspect_tolerance: 0.25,
            min_area_fraction: 0.05,
            canonical_width: 1000,
            blur_sigma: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    pub default_threshold: f32,
    pub thresholds: BTreeMap<FieldKind, f32>,
    pub layout: BTreeMap<FieldKind, LayoutRegion>,
}

impl FieldConfig {
    pub fn threshold(&self, kind: FieldKind) -> f32 {
        self.thresholds
            .get(&kind)
            .copied()
            .unwrap_or(self.default_threshold)
    }
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            default_threshold: 0.35,
            thresholds: BTreeMap::new(),
            layout: default_layout(),
        }
    }
}

/// Rectangle in card-relative coordinates (0..1 on both axes).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl LayoutRegion {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        LayoutRegion {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.x >= 0.0
            && self.y >= 0.0
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= 1.0 + f32::EPSILON
            && self.y + self.height <= 1.0 + f32::EPSILON
    }

    pub fn to_pixels(&self, width: u32, height: u32) -> Rect {
        let w = width as f32;
        let h = height as f32;
        Rect::new(
            (self.x * w).round() as u32,
            (self.y * h).round() as u32,
            (self.width * w).round() as u32,
            (self.height * h).round() as u32,
        )
    }
}

/// Front side of the Egyptian card: portrait and serial on the left, names,
/// address and national ID stacked on the right.
fn default_layout() -> BTreeMap<FieldKind, LayoutRegion> {
    BTreeMap::from([
        (FieldKind::FirstName, LayoutRegion::new(0.40, 0.25, 0.57, 0.10)),
        (FieldKind::SecondName, LayoutRegion::new(0.40, 0.35, 0.57, 0.10)),
        (FieldKind::Address, LayoutRegion::new(0.40, 0.46, 0.57, 0.20)),
        (FieldKind::NationalId, LayoutRegion::new(0.40, 0.80, 0.57, 0.11)),
        (FieldKind::Serial, LayoutRegion::new(0.03, 0.80, 0.27, 0.10)),
        (FieldKind::Photo, LayoutRegion::new(0.03, 0.12, 0.27, 0.62)),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Extra pixels kept around each field box
    pub margin_px: u32,
    /// Crops shorter than this are upscaled before recognition
    pub min_crop_height: u32,
    /// Directory holding `*.traineddata`, `None` for the system default
    pub tessdata_dir: Option<PathBuf>,
    /// Models for Arabic text and digit fields; the card mixes in English
    pub language: String,
    /// Model for Latin-script fields such as the serial
    pub latin_language: String,
}

impl OcrConfig {
    pub fn language_for(&self, script: Script) -> &str {
        match script {
            Script::Arabic | Script::Digits => &self.language,
            Script::Latin => &self.latin_language,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            margin_px: 6,
            min_crop_height: 48,
            tessdata_dir: None,
            language: "ara+eng".to_string(),
            latin_language: "eng".to_string(),
        }
    }
}
