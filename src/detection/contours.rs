use image::{DynamicImage, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;

use crate::detection::{PlateDetector, preprocessing};
use crate::models::{Contour, Region};

/// Find contours in binary edge image using connected components
pub fn find_contours(edges: &GrayImage, min_area: u32) -> Vec<Contour> {
    // Label connected components (white pixels = edges)
    let labeled = connected_components(edges, Connectivity::Eight, Luma([0]));

    let mut regions: HashMap<u32, (u32, u32, u32, u32, u32)> = HashMap::new();

    for (x, y, label) in labeled.enumerate_pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue; // Skip background
        }

        regions.entry(label_val)
            .and_modify(|(min_x, min_y, max_x, max_y, count)| {
                *min_x = (*min_x).min(x);
                *min_y = (*min_y).min(y);
                *max_x = (*max_x).max(x);
                *max_y = (*max_y).max(y);
                *count += 1;
            })
            .or_insert((x, y, x, y, 1));
    }

    let mut contours: Vec<Contour> = regions.into_iter()
        .map(|(label, (min_x, min_y, max_x, max_y, count))| {
            Contour {
                label,
                min_x,
                min_y,
                max_x,
                max_y,
                pixel_count: count,
            }
        })
        .filter(|c| c.pixel_count >= min_area)
        .collect();
    // HashMap order is random; detector output order must be stable.
    contours.sort_by_key(|c| (c.min_y, c.min_x, c.label));
    contours
}

/// Model-free plate detector: edges of the character strokes are merged
/// into blobs and plate-shaped blobs become regions.
///
/// Confidence blends how close the blob's aspect ratio is to a typical plate
/// with how densely it is filled by edges. It is a heuristic score, good
/// enough to rank candidates, not a calibrated probability.
#[derive(Debug, Clone)]
pub struct ContourPlateDetector {
    pub blur_sigma: f32,
    pub low_threshold: f32,
    pub high_threshold: f32,
    /// Dilation radius that merges neighbouring characters.
    pub merge_radius: u8,
    pub min_area: u32,
    pub min_aspect: f32,
    pub max_aspect: f32,
    pub ideal_aspect: f32,
}

impl Default for ContourPlateDetector {
    fn default() -> Self {
        Self {
            blur_sigma: 1.5,
            low_threshold: 50.0,
            high_threshold: 100.0,
            merge_radius: 3,
            min_area: 200,
            min_aspect: 1.8,
            max_aspect: 7.0,
            ideal_aspect: 4.0,
        }
    }
}

impl ContourPlateDetector {
    fn score(&self, contour: &Contour) -> f32 {
        let aspect = contour.aspect_ratio();
        let aspect_fit = (1.0 - (aspect - self.ideal_aspect).abs() / self.ideal_aspect).clamp(0.0, 1.0);
        let fill = contour.edge_density().clamp(0.0, 1.0);
        (0.6 * aspect_fit + 0.4 * fill).clamp(0.0, 1.0)
    }
}

impl PlateDetector for ContourPlateDetector {
    fn detect(&self, image: &DynamicImage) -> Vec<Region> {
        if image.width() == 0 || image.height() == 0 {
            return Vec::new();
        }
        let gray = preprocessing::to_grayscale(image);
        let blurred = preprocessing::apply_blur(&gray, self.blur_sigma);
        let edges = preprocessing::detect_edges(&blurred, self.low_threshold, self.high_threshold);
        let merged = dilate(&edges, Norm::LInf, self.merge_radius);

        find_contours(&merged, self.min_area)
            .into_iter()
            .filter(|c| {
                let aspect = c.aspect_ratio();
                aspect >= self.min_aspect && aspect <= self.max_aspect
            })
            .map(|c| Region::new(c.to_bbox(), self.score(&c)))
            .collect()
    }
}
