use crate::config::CardConfig;
use crate::models::{CardCandidate, CardRegion, Point, CARD_ASPECT_RATIO};
use crate::processing::ImageProcessor;
use crate::utils::IdCardError;
use image::{imageops, DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::contrast::{otsu_level, threshold};
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::geometry::min_area_rect;
use log::{debug, info};
use std::cmp::Ordering;

/// Finds card-shaped quadrilaterals in a photo.
pub trait CardDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<CardCandidate>, IdCardError>;
}

/// Classical detector: binarize the photo with Otsu in both polarities and
/// score the minimum-area rectangle of every outer contour.
///
/// A photo cropped to the card edges has no card contour at all, so the
/// frame itself is offered as a candidate when its shape fits and it holds
/// some print.
pub struct ContourCardDetector {
    config: CardConfig,
}

// Share of the photo a card usually covers; smaller regions lose confidence
const TYPICAL_FILL: f32 = 0.2;
// The frame never outranks a clean contour match
const FRAME_CONFIDENCE: f32 = 0.9;
// Below this intensity spread the frame is blank
const MIN_FRAME_STDDEV: f32 = 8.0;

impl ContourCardDetector {
    pub fn new(config: CardConfig) -> Self {
        ContourCardDetector { config }
    }

    fn candidates_from_mask(&self, mask: &GrayImage) -> Vec<CardCandidate> {
        let (width, height) = mask.dimensions();
        let image_area = width as f32 * height as f32;
        let mut candidates = Vec::new();

        for contour in find_contours::<i32>(mask) {
            if contour.border_type != BorderType::Outer || contour.points.len() < 4 {
                continue;
            }
            // The card has to be fully visible; regions hugging the frame are background.
            if touches_frame(&contour.points, width, height) {
                continue;
            }

            let contour_area = polygon_area(
                &contour
                    .points
                    .iter()
                    .map(|p| Point::new(p.x as f32, p.y as f32))
                    .collect::<Vec<_>>(),
            );
            let fill = contour_area / image_area;
            if fill < self.config.min_area_fraction {
                continue;
            }

            let rect = min_area_rect(&contour.points);
            let corners = order_corners(rect.map(|p| Point::new(p.x as f32, p.y as f32)));
            let rect_area = polygon_area(&corners);
            if rect_area <= 0.0 {
                continue;
            }

            let rectangularity = (contour_area / rect_area).min(1.0);
            let aspect = aspect_score(&corners, self.config.aspect_tolerance);
            let confidence = rectangularity * aspect * (fill / TYPICAL_FILL).min(1.0);
            if confidence > 0.0 {
                candidates.push(CardCandidate {
                    corners,
                    confidence,
                });
            }
        }
        candidates
    }

    fn frame_candidate(&self, gray: &GrayImage) -> Option<CardCandidate> {
        let (width, height) = gray.dimensions();
        if width < 2 || height < 2 {
            return None;
        }
        let (w, h) = (width as f32 - 1.0, height as f32 - 1.0);
        let corners = [
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(w, h),
            Point::new(0.0, h),
        ];
        let aspect = aspect_score(&corners, self.config.aspect_tolerance);
        let (_, stddev) = ImageProcessor::intensity_stats(gray);
        if aspect <= 0.0 || stddev < MIN_FRAME_STDDEV {
            return None;
        }
        Some(CardCandidate {
            corners,
            confidence: FRAME_CONFIDENCE * aspect,
        })
    }
}

impl CardDetector for ContourCardDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<CardCandidate>, IdCardError> {
        let gray = image.to_luma8();
        let gray = if self.config.blur_sigma > 0.0 {
            gaussian_blur_f32(&gray, self.config.blur_sigma)
        } else {
            gray
        };

        let level = otsu_level(&gray);
        let bright = threshold(&gray, level);
        let mut dark = bright.clone();
        imageops::invert(&mut dark);

        let mut candidates = self.candidates_from_mask(&bright);
        candidates.extend(self.candidates_from_mask(&dark));
        candidates.extend(self.frame_candidate(&gray));
        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        debug!("Contour detector found {} card candidates (otsu level {})", candidates.len(), level);
        Ok(candidates)
    }
}

/// Picks the best card candidate and warps it to the canonical card image.
pub struct CardLocalizer;

impl CardLocalizer {
    pub fn localize(
        detector: &dyn CardDetector,
        image: &DynamicImage,
        config: &CardConfig,
    ) -> Result<CardRegion, IdCardError> {
        let candidates = detector.detect(image)?;
        debug!("Card detector returned {} candidates", candidates.len());

        let best = candidates
            .into_iter()
            .map(|c| CardCandidate {
                corners: landscape(order_corners(c.corners)),
                confidence: c.confidence,
            })
            .filter(|c| c.confidence >= config.min_confidence)
            .filter(|c| aspect_score(&c.corners, config.aspect_tolerance) > 0.0)
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(Ordering::Equal)
            })
            .ok_or(IdCardError::NoCardDetected)?;

        let canonical = Self::warp(&image.to_rgb8(), &best.corners, config.canonical_width)?;
        info!(
            "Card localized with confidence {:.2}, canonical size {}x{}",
            best.confidence,
            canonical.width(),
            canonical.height()
        );

        Ok(CardRegion {
            image: canonical,
            corners: best.corners,
            confidence: best.confidence,
        })
    }

    pub fn canonical_height(width: u32) -> u32 {
        ((width as f32 / CARD_ASPECT_RATIO).round() as u32).max(1)
    }

    fn warp(image: &RgbImage, corners: &[Point; 4], width: u32) -> Result<RgbImage, IdCardError> {
        let height = Self::canonical_height(width);
        let (w, h) = (width as f32 - 1.0, height as f32 - 1.0);
        let from = corners.map(|p| (p.x, p.y));
        let to = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

        let projection = Projection::from_control_points(from, to).ok_or_else(|| {
            IdCardError::Detection("Card corners do not define a valid perspective transform".to_string())
        })?;

        let mut canonical = RgbImage::new(width, height);
        warp_into(
            image,
            &projection,
            Interpolation::Bilinear,
            Rgb([0, 0, 0]),
            &mut canonical,
        );
        Ok(canonical)
    }
}

/// Order four corners as top-left, top-right, bottom-right, bottom-left.
///
/// Corners are sorted clockwise around their centroid, then rotated so the
/// one nearest the image origin comes first (the upper one on a tie).
pub fn order_corners(points: [Point; 4]) -> [Point; 4] {
    let cx = points.iter().map(|p| p.x).sum::<f32>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f32>() / 4.0;
    let angle = |p: &Point| (p.y - cy).atan2(p.x - cx);

    let mut ordered = points;
    // Image y grows downwards, so increasing angle runs clockwise on screen.
    ordered.sort_by(|a, b| angle(a).partial_cmp(&angle(b)).unwrap_or(Ordering::Equal));

    let first = (0..4)
        .min_by(|&i, &j| {
            let (a, b) = (&ordered[i], &ordered[j]);
            let (sa, sb) = (a.x + a.y, b.x + b.y);
            if (sa - sb).abs() < 1e-3 {
                a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal)
            } else {
                sa.partial_cmp(&sb).unwrap_or(Ordering::Equal)
            }
        })
        .unwrap_or(0);
    ordered.rotate_left(first);
    ordered
}

/// Rotate the corner order so the long edge runs horizontally. A portrait
/// quadrilateral is assumed to be the card turned a quarter clockwise.
fn landscape(corners: [Point; 4]) -> [Point; 4] {
    let [tl, tr, br, bl] = corners;
    if tl.distance(&tr) >= tr.distance(&br) {
        corners
    } else {
        [tr, br, bl, tl]
    }
}

/// 1.0 for an exact ID-1 ratio, falling linearly to 0.0 at the tolerance.
fn aspect_score(corners: &[Point; 4], tolerance: f32) -> f32 {
    let [tl, tr, br, bl] = corners;
    let horizontal = (tl.distance(tr) + bl.distance(br)) / 2.0;
    let vertical = (tl.distance(bl) + tr.distance(br)) / 2.0;
    let (long, short) = if horizontal >= vertical {
        (horizontal, vertical)
    } else {
        (vertical, horizontal)
    };
    if short <= 0.0 {
        return 0.0;
    }
    let deviation = (long / short / CARD_ASPECT_RATIO - 1.0).abs();
    (1.0 - deviation / tolerance).clamp(0.0, 1.0)
}

fn polygon_area(points: &[Point]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0f64;
    for (i, p) in points.iter().enumerate() {
        let q = &points[(i + 1) % points.len()];
        twice_area += p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
    }
    (twice_area.abs() / 2.0) as f32
}

fn touches_frame(points: &[imageproc::point::Point<i32>], width: u32, height: u32) -> bool {
    let (max_x, max_y) = (width as i32 - 1, height as i32 - 1);
    points
        .iter()
        .any(|p| p.x <= 0 || p.y <= 0 || p.x >= max_x || p.y >= max_y)
}
