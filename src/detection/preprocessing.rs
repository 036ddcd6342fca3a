use image::{DynamicImage, GrayImage, Luma, imageops::FilterType};
use imageproc::contrast::equalize_histogram;
use imageproc::edges::canny;
use imageproc::filter::{bilateral_filter, gaussian_blur_f32};

use crate::config::PreprocessSettings;

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

pub fn mean_intensity(img: &GrayImage) -> f32 {
    let count = img.width() as u64 * img.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = img.pixels().map(|p| p[0] as u64).sum();
    sum as f32 / count as f32
}

/// Gaussian sigma used for a square block of `block_size` pixels.
fn block_sigma(block_size: u32) -> f32 {
    0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Local binarization: a pixel is white when it is brighter than its
/// Gaussian-weighted neighbourhood mean minus `bias`.
pub fn adaptive_threshold(img: &GrayImage, block_size: u32, bias: i16) -> GrayImage {
    let local_mean = gaussian_blur_f32(img, block_sigma(block_size));
    let mut out = GrayImage::new(img.width(), img.height());
    for (x, y, pixel) in img.enumerate_pixels() {
        let threshold = local_mean.get_pixel(x, y)[0] as i16 - bias;
        let value = if pixel[0] as i16 > threshold { 255 } else { 0 };
        out.put_pixel(x, y, Luma([value]));
    }
    out
}

/// Upscale so the height reaches `min_height`, keeping the aspect ratio.
pub fn upscale_to_min_height(img: &GrayImage, min_height: u32) -> GrayImage {
    let (width, height) = img.dimensions();
    if height == 0 || height >= min_height {
        return img.clone();
    }
    let scale = min_height as f32 / height as f32;
    let scaled_w = ((width as f32 * scale).round() as u32).max(1);
    image::imageops::resize(img, scaled_w, min_height, FilterType::CatmullRom)
}

/// Edge-preserving smoothing over a `diameter` window
pub fn smooth_edges(img: &GrayImage, diameter: u32, sigma_color: f32, sigma_space: f32) -> GrayImage {
    bilateral_filter(img, diameter, sigma_color, sigma_space)
}

/// Normalizes a plate crop before it reaches a recognition engine.
#[derive(Debug, Clone, Default)]
pub struct PlatePreprocessor {
    settings: PreprocessSettings,
}

impl PlatePreprocessor {
    pub fn new(settings: PreprocessSettings) -> Self {
        Self { settings }
    }

    /// Grayscale, night-shot binarization, upscale, smoothing and equalization,
    /// returned as RGB. The crop must be non-empty.
    pub fn process(&self, crop: &DynamicImage) -> DynamicImage {
        let s = &self.settings;
        let mut gray = to_grayscale(crop);

        if mean_intensity(&gray) < s.low_light_threshold {
            gray = adaptive_threshold(&gray, s.block_size, s.bias);
        }

        gray = upscale_to_min_height(&gray, s.min_height);
        gray = smooth_edges(&gray, s.smoothing_diameter, s.sigma_color, s.sigma_space);
        gray = equalize_histogram(&gray);

        DynamicImage::ImageRgb8(DynamicImage::ImageLuma8(gray).to_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32, base: u8) -> DynamicImage {
        let img = RgbImage::from_fn(width, height, |x, _| {
            let v = base.saturating_add((x % 40) as u8);
            Rgb([v, v, v])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_small_crop_is_upscaled_to_min_height() {
        let pre = PlatePreprocessor::default();
        let out = pre.process(&gradient(60, 20, 120));
        assert_eq!(out.height(), 40);
        assert_eq!(out.width(), 120);
        assert!(matches!(out, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_tall_crop_keeps_size() {
        let pre = PlatePreprocessor::default();
        let out = pre.process(&gradient(100, 50, 120));
        assert_eq!((out.width(), out.height()), (100, 50));
    }

    #[test]
    fn test_dark_crop_is_binarized() {
        let dark = gradient(80, 45, 10);
        let gray = to_grayscale(&dark);
        assert!(mean_intensity(&gray) < 70.0);
        let binary = adaptive_threshold(&gray, 11, 2);
        assert!(binary.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_smoothing_keeps_flat_image() {
        let flat = GrayImage::from_pixel(12, 12, Luma([90u8]));
        let out = smooth_edges(&flat, 11, 17.0, 17.0);
        assert!(out.pixels().all(|p| p[0] == 90));
    }

    #[test]
    fn test_smoothing_preserves_strong_edge() {
        let step = GrayImage::from_fn(20, 10, |x, _| Luma([if x < 10 { 20u8 } else { 230 }]));
        let out = smooth_edges(&step, 11, 17.0, 17.0);
        assert!(out.get_pixel(8, 5)[0] < 40);
        assert!(out.get_pixel(11, 5)[0] > 210);
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let pre = PlatePreprocessor::default();
        let crop = gradient(70, 30, 40);
        assert_eq!(pre.process(&crop).to_rgb8(), pre.process(&crop).to_rgb8());
    }
}
