use crate::utils::IdCardError;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::path::Path;

pub struct ImageProcessor;

impl ImageProcessor {
    /// Read an image from disk. The file is only read, never moved or removed.
    pub fn load_image(image_path: &Path) -> Result<DynamicImage, IdCardError> {
        image::open(image_path).map_err(|e| {
            IdCardError::ImageLoad(format!(
                "Failed to open image {}: {}",
                image_path.display(),
                e
            ))
        })
    }

    pub fn load_from_memory(bytes: &[u8]) -> Result<DynamicImage, IdCardError> {
        image::load_from_memory(bytes)
            .map_err(|e| IdCardError::ImageLoad(format!("Failed to decode image: {}", e)))
    }

    /// Crop a field out of the card and prepare it for recognition: grayscale,
    /// upscaled when shorter than `min_height`, contrast stretched.
    pub fn prepare_field_crop(
        card: &RgbImage,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        min_height: u32,
    ) -> GrayImage {
        let crop = imageops::crop_imm(card, x, y, width, height).to_image();
        let gray = DynamicImage::ImageRgb8(crop).to_luma8();

        let gray = if gray.height() > 0 && gray.height() < min_height {
            let scale = min_height as f32 / gray.height() as f32;
            let new_width = ((gray.width() as f32 * scale).round() as u32).max(1);
            imageops::resize(&gray, new_width, min_height, FilterType::CatmullRom)
        } else {
            gray
        };

        Self::stretch_contrast(&gray)
    }

    /// Linear stretch of the intensity range to 0..=255.
    pub fn stretch_contrast(img: &GrayImage) -> GrayImage {
        let (min, max) = img
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
        if max <= min {
            return img.clone();
        }
        let range = (max - min) as f32;
        let mut stretched = img.clone();
        for pixel in stretched.pixels_mut() {
            let value = (pixel[0] - min) as f32 * 255.0 / range;
            pixel[0] = value.round() as u8;
        }
        stretched
    }

    /// Mean and standard deviation of the intensities.
    pub fn intensity_stats(img: &GrayImage) -> (f32, f32) {
        let n = (img.width() * img.height()) as f64;
        if n == 0.0 {
            return (0.0, 0.0);
        }
        let (sum, sum_sq) = img.pixels().fold((0.0f64, 0.0f64), |(s, sq), p| {
            let v = p[0] as f64;
            (s + v, sq + v * v)
        });
        let mean = sum / n;
        let variance = (sum_sq / n - mean * mean).max(0.0);
        (mean as f32, variance.sqrt() as f32)
    }

    pub fn encode_png(img: &GrayImage) -> Result<Vec<u8>, IdCardError> {
        let mut buffer = Vec::with_capacity(img.width() as usize * img.height() as usize / 4);
        DynamicImage::ImageLuma8(img.clone())
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| IdCardError::Recognition(format!("Failed to encode field crop: {}", e)))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn test_stretch_contrast() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([100 + x as u8 * 10]));
        let stretched = ImageProcessor::stretch_contrast(&img);
        assert_eq!(stretched.get_pixel(0, 0)[0], 0);
        assert_eq!(stretched.get_pixel(3, 0)[0], 255);
    }

    #[test]
    fn test_flat_image_unchanged() {
        let img = GrayImage::from_pixel(3, 3, Luma([77]));
        assert_eq!(ImageProcessor::stretch_contrast(&img), img);
    }

    #[test]
    fn test_small_crop_is_upscaled() {
        let card = RgbImage::from_pixel(200, 100, Rgb([200, 200, 200]));
        let crop = ImageProcessor::prepare_field_crop(&card, 10, 10, 60, 20, 48);
        assert_eq!(crop.height(), 48);
        assert_eq!(crop.width(), 144);

        let crop = ImageProcessor::prepare_field_crop(&card, 0, 0, 100, 60, 48);
        assert_eq!((crop.width(), crop.height()), (100, 60));
    }

    #[test]
    fn test_png_round_trip_dimensions() {
        let img = GrayImage::from_pixel(12, 7, Luma([10]));
        let png = ImageProcessor::encode_png(&img).unwrap();
        let decoded = ImageProcessor::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 7));
    }

    #[test]
    fn test_intensity_stats() {
        let img = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 0 } else { 100 }]));
        let (mean, stddev) = ImageProcessor::intensity_stats(&img);
        assert_eq!(mean, 50.0);
        assert_eq!(stddev, 50.0);
    }

    #[test]
    fn test_missing_file_is_image_load_error() {
        let err = ImageProcessor::load_image(Path::new("/nonexistent/card.jpg")).unwrap_err();
        assert!(matches!(err, IdCardError::ImageLoad(_)));
    }
}
