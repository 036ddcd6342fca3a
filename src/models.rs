use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in source image pixel coordinates, `(x1, y1)` inclusive,
/// `(x2, y2)` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn is_positive(&self) -> bool {
        self.x2 > self.x1 && self.y2 > self.y1
    }

    /// Clip the box to an image of the given size.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let w = width as i32;
        let h = height as i32;
        Self {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        }
    }
}

/// A detector-proposed plate location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl Region {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self { bbox, confidence }
    }

    /// Crop the region out of `img`. Returns `None` when the clipped box is empty.
    pub fn crop(&self, img: &DynamicImage) -> Option<DynamicImage> {
        let b = self.bbox.clamp_to(img.width(), img.height());
        if !b.is_positive() {
            return None;
        }
        Some(img.crop_imm(
            b.x1 as u32,
            b.y1 as u32,
            b.width() as u32,
            b.height() as u32,
        ))
    }
}

/// A candidate reading produced by one recognition engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionHypothesis {
    pub text: String,
    pub confidence: f32,
    pub engine_id: String,
}

/// Cleaned, template-corrected plate text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrectedPlate {
    pub text: String,
    pub confidence: f32,
}

impl CorrectedPlate {
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Where a persisted detection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Image,
    Video,
    Live,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Image => "image",
            Source::Video => "video",
            Source::Live => "live",
        }
    }
}

impl TryFrom<&str> for Source {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "image" => Ok(Source::Image),
            "video" => Ok(Source::Video),
            "live" => Ok(Source::Live),
            other => anyhow::bail!("unknown detection source '{}'", other),
        }
    }
}

/// Connected edge component, the raw material of the contour detector.
#[derive(Debug, Clone)]
pub struct Contour {
    pub label: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: u32,
}

impl Contour {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn area(&self) -> u32 {
        self.pixel_count
    }

    pub fn aspect_ratio(&self) -> f32 {
        let w = self.width() as f32;
        let h = self.height() as f32;
        if h == 0.0 {
            return 0.0;
        }
        w / h
    }

    /// Share of the bounding box covered by edge pixels.
    pub fn edge_density(&self) -> f32 {
        let box_area = (self.width() * self.height()) as f32;
        if box_area == 0.0 {
            return 0.0;
        }
        self.pixel_count as f32 / box_area
    }

    pub fn to_bbox(&self) -> BoundingBox {
        BoundingBox::new(
            self.min_x as i32,
            self.min_y as i32,
            self.max_x as i32 + 1,
            self.max_y as i32 + 1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    #[test]
    fn test_crop_clamps_to_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(50, 40));
        let region = Region::new(BoundingBox::new(30, 20, 80, 90), 0.7);
        let crop = region.crop(&img).expect("crop should be non-empty");
        assert_eq!(crop.width(), 20);
        assert_eq!(crop.height(), 20);
    }

    #[test]
    fn test_crop_outside_image_is_none() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(50, 40));
        let region = Region::new(BoundingBox::new(60, 50, 80, 90), 0.7);
        assert!(region.crop(&img).is_none());
    }

    #[test]
    fn test_source_round_trip_names() {
        assert_eq!(Source::try_from("live").unwrap(), Source::Live);
        assert_eq!(Source::Video.as_str(), "video");
        assert!(Source::try_from("camera").is_err());
    }
}
