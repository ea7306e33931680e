use crate::config::{FieldConfig, LayoutRegion};
use crate::models::{CardRegion, FieldBox, FieldKind};
use crate::processing::ImageProcessor;
use crate::utils::IdCardError;
use image::{imageops, DynamicImage, GrayImage};
use imageproc::contrast::otsu_level;
use log::{debug, info};
use std::collections::BTreeMap;

/// Multi-class detector for the printed fields of a canonical card image.
pub trait FieldDetector: Send + Sync {
    fn detect(&self, card: &CardRegion) -> Result<Vec<FieldBox>, IdCardError>;
}

/// Detector driven by the fixed layout of the card front. Each region is
/// scored from its pixels: intensity spread for the portrait, ink coverage
/// for text fields.
pub struct TemplateFieldDetector {
    layout: BTreeMap<FieldKind, LayoutRegion>,
}

// Share of dark pixels at which a text field counts as fully inked
const FULL_INK: f32 = 0.06;
// Above this share the region is a solid block rather than print
const MAX_INK: f32 = 0.45;
// Standard deviation treated as full contrast
const FULL_CONTRAST: f32 = 40.0;

impl TemplateFieldDetector {
    pub fn new(layout: BTreeMap<FieldKind, LayoutRegion>) -> Self {
        TemplateFieldDetector { layout }
    }

    pub fn from_config(config: &FieldConfig) -> Self {
        Self::new(config.layout.clone())
    }

    fn score(kind: FieldKind, region: &GrayImage) -> f32 {
        let (mean, stddev) = ImageProcessor::intensity_stats(region);
        let contrast = (stddev / FULL_CONTRAST).min(1.0);
        if !kind.is_textual() {
            return contrast;
        }
        if stddev < 4.0 {
            return 0.0;
        }

        let level = otsu_level(region);
        let total = (region.width() * region.height()) as f32;
        let dark = region.pixels().filter(|p| p[0] <= level).count() as f32;
        // Print is darker than the card background; flip for inverted crops.
        let ink = if (level as f32) < mean {
            dark / total
        } else {
            1.0 - dark / total
        };

        let ink_score = if ink <= MAX_INK {
            (ink / FULL_INK).min(1.0)
        } else {
            (1.0 - (ink - MAX_INK) / 0.3).max(0.0)
        };
        contrast * ink_score
    }
}

impl FieldDetector for TemplateFieldDetector {
    fn detect(&self, card: &CardRegion) -> Result<Vec<FieldBox>, IdCardError> {
        let gray = DynamicImage::ImageRgb8(card.image.clone()).to_luma8();
        let (width, height) = gray.dimensions();

        let boxes = self
            .layout
            .iter()
            .filter_map(|(kind, region)| {
                let rect = region.to_pixels(width, height).clip(width, height)?;
                let crop = imageops::crop_imm(&gray, rect.x, rect.y, rect.width, rect.height)
                    .to_image();
                Some(FieldBox {
                    kind: *kind,
                    rect,
                    confidence: Self::score(*kind, &crop),
                })
            })
            .collect();
        Ok(boxes)
    }
}

/// Turns raw detector output into at most one box per label.
pub struct FieldLocalizer;

impl FieldLocalizer {
    pub fn localize(
        detector: &dyn FieldDetector,
        card: &CardRegion,
        config: &FieldConfig,
    ) -> Result<Vec<FieldBox>, IdCardError> {
        let raw = detector.detect(card)?;
        debug!("Field detector returned {} boxes", raw.len());
        let fields = Self::select(raw, card.width(), card.height(), config);
        info!(
            "Fields kept: [{}]",
            fields
                .iter()
                .map(|f| format!("{} {:.2}", f.kind, f.confidence))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(fields)
    }

    /// Clip, threshold and suppress per label. Labels never compete with each
    /// other: fields cannot overlap on a physical card.
    pub fn select(
        raw: Vec<FieldBox>,
        width: u32,
        height: u32,
        config: &FieldConfig,
    ) -> Vec<FieldBox> {
        let mut best: BTreeMap<FieldKind, FieldBox> = BTreeMap::new();
        for field in raw {
            let Some(rect) = field.rect.clip(width, height) else {
                continue;
            };
            if field.confidence < config.threshold(field.kind) {
                debug!(
                    "Dropping {} box with confidence {:.2}",
                    field.kind, field.confidence
                );
                continue;
            }
            let candidate = FieldBox { rect, ..field };
            match best.get(&field.kind) {
                Some(kept) if kept.confidence >= candidate.confidence => {}
                _ => {
                    best.insert(field.kind, candidate);
                }
            }
        }
        best.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Point, Rect};
    use image::{Rgb, RgbImage};

    fn card(image: RgbImage) -> CardRegion {
        let (w, h) = (image.width() as f32, image.height() as f32);
        CardRegion {
            image,
            corners: [
                Point::new(0.0, 0.0),
                Point::new(w, 0.0),
                Point::new(w, h),
                Point::new(0.0, h),
            ],
            confidence: 1.0,
        }
    }

    fn field(kind: FieldKind, rect: Rect, confidence: f32) -> FieldBox {
        FieldBox {
            kind,
            rect,
            confidence,
        }
    }

    #[test]
    fn test_highest_confidence_per_label_wins() {
        let raw = vec![
            field(FieldKind::FirstName, Rect::new(10, 10, 50, 10), 0.5),
            field(FieldKind::FirstName, Rect::new(12, 10, 50, 10), 0.8),
            field(FieldKind::FirstName, Rect::new(300, 10, 50, 10), 0.6),
            field(FieldKind::Address, Rect::new(10, 30, 50, 20), 0.7),
        ];
        let kept = FieldLocalizer::select(raw, 400, 250, &FieldConfig::default());
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].kind, FieldKind::FirstName);
        assert_eq!(kept[0].confidence, 0.8);
        assert_eq!(kept[1].kind, FieldKind::Address);
    }

    #[test]
    fn test_overlapping_labels_both_survive() {
        let raw = vec![
            field(FieldKind::FirstName, Rect::new(10, 10, 100, 20), 0.9),
            field(FieldKind::SecondName, Rect::new(10, 12, 100, 20), 0.6),
        ];
        let kept = FieldLocalizer::select(raw, 400, 250, &FieldConfig::default());
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_per_label_thresholds() {
        let mut config = FieldConfig::default();
        config.thresholds.insert(FieldKind::Address, 0.8);
        let raw = vec![
            field(FieldKind::Address, Rect::new(10, 30, 50, 20), 0.7),
            field(FieldKind::NationalId, Rect::new(10, 60, 50, 20), 0.4),
            field(FieldKind::Serial, Rect::new(10, 90, 50, 20), 0.2),
        ];
        let kept = FieldLocalizer::select(raw, 400, 250, &config);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].kind, FieldKind::NationalId);
    }

    #[test]
    fn test_boxes_clipped_to_card() {
        let raw = vec![
            field(FieldKind::NationalId, Rect::new(350, 200, 100, 100), 0.9),
            field(FieldKind::Serial, Rect::new(500, 10, 10, 10), 0.9),
        ];
        let kept = FieldLocalizer::select(raw, 400, 250, &FieldConfig::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].rect, Rect::new(350, 200, 50, 50));
    }

    #[test]
    fn test_template_scores_printed_and_blank_regions() {
        let config = FieldConfig::default();
        let mut image = RgbImage::from_pixel(1000, 631, Rgb([225, 220, 210]));
        // Fake print: dark strokes inside the first-name region, address left blank.
        let name = config.layout[&FieldKind::FirstName].to_pixels(1000, 631);
        for y in (name.y + 15)..(name.y + 45) {
            for x in (name.x + 40)..(name.x + 500) {
                if (x / 6) % 3 == 0 {
                    image.put_pixel(x, y, Rgb([30, 30, 30]));
                }
            }
        }
        let detector = TemplateFieldDetector::from_config(&config);
        let boxes = detector.detect(&card(image)).unwrap();
        let score = |kind: FieldKind| {
            boxes
                .iter()
                .find(|b| b.kind == kind)
                .map(|b| b.confidence)
                .unwrap()
        };
        assert_eq!(boxes.len(), FieldKind::ALL.len());
        assert!(score(FieldKind::FirstName) > 0.5, "{}", score(FieldKind::FirstName));
        assert_eq!(score(FieldKind::Address), 0.0);
        assert_eq!(score(FieldKind::Photo), 0.0);

        let kept = FieldLocalizer::select(boxes, 1000, 631, &config);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].kind, FieldKind::FirstName);
    }
}
