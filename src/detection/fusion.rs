use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use image::DynamicImage;

use crate::config::CountrySetting;
use crate::detection::ocr::{EngineOutcome, Recognizer};
use crate::detection::preprocessing::PlatePreprocessor;
use crate::detection::syntax;
use crate::models::{CorrectedPlate, RecognitionHypothesis};

/// Runs recognition engines in priority order and keeps the first usable
/// answer. Engines are never merged: the first engine that returns a
/// non-empty reading decides the result for the crop.
pub struct RecognitionFusionEngine {
    engines: Vec<Arc<dyn Recognizer>>,
    preprocessor: PlatePreprocessor,
    country: Arc<CountrySetting>,
}

impl RecognitionFusionEngine {
    pub fn new(
        engines: Vec<Arc<dyn Recognizer>>,
        preprocessor: PlatePreprocessor,
        country: Arc<CountrySetting>,
    ) -> Self {
        Self {
            engines,
            preprocessor,
            country,
        }
    }

    pub fn engine_names(&self) -> Vec<String> {
        self.engines.iter().map(|e| e.name().to_string()).collect()
    }

    /// Read a plate crop. An empty crop, or a crop no engine can read,
    /// gives an empty plate with confidence 0.
    pub fn recognize(&self, crop: &DynamicImage) -> CorrectedPlate {
        if crop.width() == 0 || crop.height() == 0 {
            return CorrectedPlate::empty();
        }

        let prepared = self.preprocessor.process(crop);
        let country = self.country.get();

        for engine in &self.engines {
            let outcome = catch_unwind(AssertUnwindSafe(|| engine.read(&prepared)))
                .unwrap_or_else(|_| EngineOutcome::Failed("engine panicked".to_string()));

            match outcome {
                EngineOutcome::Failed(reason) => {
                    tracing::warn!(engine = engine.name(), error = %reason, "Recognition engine failed, trying next");
                }
                EngineOutcome::NoResult => {
                    tracing::debug!(engine = engine.name(), "Recognition engine returned nothing");
                }
                EngineOutcome::Hypotheses(hypotheses) => {
                    let Some(best) = best_hypothesis(&hypotheses) else {
                        continue;
                    };
                    let text = syntax::correct(&best.text, &country);
                    if text.is_empty() {
                        tracing::debug!(engine = engine.name(), raw = %best.text, "Reading had no plate characters");
                        continue;
                    }
                    tracing::debug!(
                        engine = engine.name(),
                        raw = %best.text,
                        plate = %text,
                        confidence = best.confidence,
                        "Plate recognized"
                    );
                    return CorrectedPlate {
                        text,
                        confidence: best.confidence.clamp(0.0, 1.0),
                    };
                }
            }
        }

        CorrectedPlate::empty()
    }
}

/// Highest confidence wins; the earliest hypothesis wins a tie.
fn best_hypothesis(hypotheses: &[RecognitionHypothesis]) -> Option<&RecognitionHypothesis> {
    hypotheses.iter().fold(None, |best, h| match best {
        Some(b) if b.confidence >= h.confidence => Some(b),
        _ => Some(h),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        outcome: EngineOutcome,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, outcome: EngineOutcome) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Recognizer for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn read(&self, _image: &DynamicImage) -> EngineOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    struct Panicking;

    impl Recognizer for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn read(&self, _image: &DynamicImage) -> EngineOutcome {
            panic!("model exploded");
        }
    }

    fn hyp(text: &str, confidence: f32, engine: &str) -> RecognitionHypothesis {
        RecognitionHypothesis {
            text: text.to_string(),
            confidence,
            engine_id: engine.to_string(),
        }
    }

    fn crop() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(60, 20, Rgb([200, 200, 200])))
    }

    fn engine(engines: Vec<Arc<dyn Recognizer>>) -> RecognitionFusionEngine {
        RecognitionFusionEngine::new(
            engines,
            PlatePreprocessor::default(),
            Arc::new(CountrySetting::new("IN")),
        )
    }

    #[test]
    fn test_falls_back_when_primary_fails() {
        let primary = Scripted::new("primary", EngineOutcome::Failed("missing dependency".into()));
        let baseline = Scripted::new(
            "baseline",
            EngineOutcome::Hypotheses(vec![hyp("KA01AB1234", 0.7, "baseline")]),
        );
        let fusion = engine(vec![primary.clone(), baseline.clone()]);
        let plate = fusion.recognize(&crop());
        assert_eq!(plate.text, "KA01AB1234");
        assert_eq!(plate.confidence, 0.7);
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(baseline.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_falls_back_when_primary_panics() {
        let baseline = Scripted::new(
            "baseline",
            EngineOutcome::Hypotheses(vec![hyp("MH12DE1433", 0.6, "baseline")]),
        );
        let fusion = engine(vec![Arc::new(Panicking), baseline]);
        assert_eq!(fusion.recognize(&crop()).text, "MH12DE1433");
    }

    #[test]
    fn test_first_engine_with_result_wins() {
        let primary = Scripted::new(
            "primary",
            EngineOutcome::Hypotheses(vec![hyp("ab12", 0.3, "primary")]),
        );
        let baseline = Scripted::new(
            "baseline",
            EngineOutcome::Hypotheses(vec![hyp("KA01AB1234", 0.99, "baseline")]),
        );
        let fusion = engine(vec![primary, baseline.clone()]);
        let plate = fusion.recognize(&crop());
        assert_eq!(plate.text, "AB12");
        assert_eq!(baseline.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_best_hypothesis_is_cleaned_and_corrected() {
        let primary = Scripted::new(
            "primary",
            EngineOutcome::Hypotheses(vec![
                hyp("IND", 0.4, "primary"),
                hyp("ka 0i*ab1z34", 0.8, "primary"),
            ]),
        );
        let plate = engine(vec![primary]).recognize(&crop());
        assert_eq!(plate.text, "KA01AB1234");
        assert_eq!(plate.confidence, 0.8);
    }

    #[test]
    fn test_empty_results_move_to_next_engine() {
        let none = Scripted::new("none", EngineOutcome::NoResult);
        let symbols = Scripted::new(
            "symbols",
            EngineOutcome::Hypotheses(vec![hyp("*-*", 0.9, "symbols")]),
        );
        let last = Scripted::new("last", EngineOutcome::Hypotheses(vec![hyp("DL3C1234", 0.5, "last")]));
        let plate = engine(vec![none, symbols, last]).recognize(&crop());
        assert_eq!(plate.text, "DL3C1234");
    }

    #[test]
    fn test_all_engines_failing_gives_empty_plate() {
        let a = Scripted::new("a", EngineOutcome::Failed("boom".into()));
        let b = Scripted::new("b", EngineOutcome::NoResult);
        assert_eq!(engine(vec![a, b]).recognize(&crop()), CorrectedPlate::empty());
    }

    #[test]
    fn test_empty_crop_short_circuits() {
        let a = Scripted::new("a", EngineOutcome::Hypotheses(vec![hyp("X", 1.0, "a")]));
        let fusion = engine(vec![a.clone()]);
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert_eq!(fusion.recognize(&empty), CorrectedPlate::empty());
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }
}
