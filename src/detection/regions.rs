use crate::config::SelectionSettings;
use crate::models::Region;

/// How many regions a caller wants out of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Every qualifying region, highest confidence first.
    AllQualifying,
    /// Only the highest-confidence region.
    BestOnly,
}

/// Filters and ranks raw detector output.
#[derive(Debug, Clone)]
pub struct RegionSelector {
    pub min_confidence: f32,
    pub min_width: i32,
    pub min_height: i32,
}

impl Default for RegionSelector {
    fn default() -> Self {
        Self::from(&SelectionSettings::default())
    }
}

impl From<&SelectionSettings> for RegionSelector {
    fn from(s: &SelectionSettings) -> Self {
        Self {
            min_confidence: s.min_confidence,
            min_width: s.min_width,
            min_height: s.min_height,
        }
    }
}

impl RegionSelector {
    pub fn qualifies(&self, region: &Region) -> bool {
        region.bbox.is_positive()
            && region.confidence >= self.min_confidence
            && region.bbox.width() >= self.min_width
            && region.bbox.height() >= self.min_height
    }

    /// Clip every region to the image, then keep the ones that pass.
    fn surviving(&self, regions: &[Region], width: u32, height: u32) -> Vec<Region> {
        regions
            .iter()
            .map(|r| Region::new(r.bbox.clamp_to(width, height), r.confidence))
            .filter(|r| self.qualifies(r))
            .collect()
    }

    /// All qualifying regions sorted by confidence, descending. Equal
    /// confidences keep detector order.
    pub fn select_all(&self, regions: &[Region], width: u32, height: u32) -> Vec<Region> {
        let mut kept = self.surviving(regions, width, height);
        kept.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        kept
    }

    /// The single best region; on a tie the first one the detector reported.
    pub fn select_best(&self, regions: &[Region], width: u32, height: u32) -> Option<Region> {
        self.surviving(regions, width, height)
            .into_iter()
            .fold(None, |best: Option<Region>, r| match best {
                Some(b) if b.confidence >= r.confidence => Some(b),
                _ => Some(r),
            })
    }

    pub fn select(&self, mode: SelectionMode, regions: &[Region], width: u32, height: u32) -> Vec<Region> {
        match mode {
            SelectionMode::AllQualifying => self.select_all(regions, width, height),
            SelectionMode::BestOnly => self.select_best(regions, width, height).into_iter().collect(),
        }
    }
}
