use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::RecognitionSettings;
use crate::models::RecognitionHypothesis;

/// What one engine made of one crop.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutcome {
    Hypotheses(Vec<RecognitionHypothesis>),
    NoResult,
    Failed(String),
}

impl EngineOutcome {
    /// `NoResult` when the list is empty.
    pub fn from_hypotheses(hypotheses: Vec<RecognitionHypothesis>) -> Self {
        if hypotheses.is_empty() {
            EngineOutcome::NoResult
        } else {
            EngineOutcome::Hypotheses(hypotheses)
        }
    }
}

/// A text-recognition engine. Implementations report failures as
/// `EngineOutcome::Failed` rather than returning errors.
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;
    fn read(&self, image: &DynamicImage) -> EngineOutcome;
}

/// Standard model location used by `ocrs-cli`.
pub fn default_model_dir() -> anyhow::Result<PathBuf> {
    let home_dir = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))?;
    Ok(Path::new(&home_dir).join(".cache/ocrs"))
}

/// Load the ocrs engine from `model_dir`.
pub fn init_ocr_engine(model_dir: &Path) -> anyhow::Result<OcrEngine> {
    let detection_model_path = model_dir.join("text-detection.rten");
    let recognition_model_path = model_dir.join("text-recognition.rten");

    if !detection_model_path.exists() || !recognition_model_path.exists() {
        anyhow::bail!(
            "OCR models not found. Please run: ocrs-cli --help (or download models manually)\n\
             Expected locations:\n  - {}\n  - {}",
            detection_model_path.display(),
            recognition_model_path.display()
        );
    }

    let detection_model = Model::load_file(&detection_model_path)?;
    let recognition_model = Model::load_file(&recognition_model_path)?;

    let engine = OcrEngine::new(OcrEngineParams {
        detection_model: Some(detection_model),
        recognition_model: Some(recognition_model),
        ..Default::default()
    })?;

    Ok(engine)
}

/// Recognizer backed by the ocrs neural engine.
pub struct OcrsRecognizer {
    engine: OcrEngine,
    confidence: f32,
}

impl OcrsRecognizer {
    pub fn load(model_dir: &Path, confidence: f32) -> anyhow::Result<Self> {
        Ok(Self {
            engine: init_ocr_engine(model_dir)?,
            confidence,
        })
    }

    fn read_lines(&self, image: &DynamicImage) -> anyhow::Result<Vec<String>> {
        let img = image.to_rgb8();
        let img_source = ImageSource::from_bytes(img.as_raw(), img.dimensions())
            .map_err(|e| anyhow::anyhow!("Invalid OCR input image: {:?}", e))?;
        let ocr_input = self.engine.prepare_input(img_source)?;
        let text = self.engine.get_text(&ocr_input)?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl Recognizer for OcrsRecognizer {
    fn name(&self) -> &str {
        "ocrs"
    }

    fn read(&self, image: &DynamicImage) -> EngineOutcome {
        match self.read_lines(image) {
            // ocrs has no per-line score, every line gets the configured one.
            Ok(lines) => EngineOutcome::from_hypotheses(
                lines
                    .into_iter()
                    .map(|text| RecognitionHypothesis {
                        text,
                        confidence: self.confidence,
                        engine_id: self.name().to_string(),
                    })
                    .collect(),
            ),
            Err(e) => EngineOutcome::Failed(e.to_string()),
        }
    }
}

/// Build the configured engines in priority order. Engines that cannot be
/// loaded are logged and left out; having none at all is an error.
pub fn build_recognizers(settings: &RecognitionSettings) -> anyhow::Result<Vec<Arc<dyn Recognizer>>> {
    let mut engines: Vec<Arc<dyn Recognizer>> = Vec::new();

    for name in &settings.engines {
        match name.as_str() {
            "ocrs" => {
                let model_dir = match &settings.model_dir {
                    Some(dir) => dir.clone(),
                    None => default_model_dir()?,
                };
                match OcrsRecognizer::load(&model_dir, settings.ocrs_confidence) {
                    Ok(engine) => engines.push(Arc::new(engine)),
                    Err(e) => tracing::warn!(engine = "ocrs", error = %e, "Recognition engine unavailable"),
                }
            }
            #[cfg(feature = "tesseract")]
            "tesseract" => {
                match TesseractRecognizer::load(settings.tessdata_dir.as_deref(), &settings.tess_language) {
                    Ok(engine) => engines.push(Arc::new(engine)),
                    Err(e) => tracing::warn!(engine = "tesseract", error = %e, "Recognition engine unavailable"),
                }
            }
            #[cfg(not(feature = "tesseract"))]
            "tesseract" => {
                tracing::info!("Built without the `tesseract` feature, skipping tesseract engine");
            }
            other => tracing::warn!(engine = other, "Unknown recognition engine"),
        }
    }

    if engines.is_empty() {
        anyhow::bail!("No recognition engine could be loaded (configured: {:?})", settings.engines);
    }
    tracing::info!(
        engines = ?engines.iter().map(|e| e.name().to_string()).collect::<Vec<_>>(),
        "Recognition engines ready"
    );
    Ok(engines)
}

#[cfg(feature = "tesseract")]
pub use tesseract::TesseractRecognizer;

#[cfg(feature = "tesseract")]
mod tesseract {
    use super::{EngineOutcome, Recognizer};
    use crate::models::RecognitionHypothesis;
    use image::DynamicImage;
    use leptess::{LepTess, Variable};
    use parking_lot::Mutex;
    use std::io::Cursor;
    use std::path::Path;

    const PLATE_CHARSET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    /// Page segmentation mode 7: a single text line.
    const PSM_SINGLE_LINE: &str = "7";

    struct TessHandle(LepTess);

    // LepTess wraps raw tesseract pointers. Access is serialized by the mutex
    // below, so moving the handle between pool threads is sound.
    unsafe impl Send for TessHandle {}

    /// Recognizer backed by a Tesseract instance restricted to plate characters.
    pub struct TesseractRecognizer {
        api: Mutex<TessHandle>,
    }

    impl TesseractRecognizer {
        pub fn load(tessdata_dir: Option<&Path>, language: &str) -> anyhow::Result<Self> {
            let datapath = tessdata_dir.map(|p| p.to_string_lossy().into_owned());
            let mut api = LepTess::new(datapath.as_deref(), language)
                .map_err(|e| anyhow::anyhow!("Failed to initialise tesseract: {}", e))?;
            api.set_variable(Variable::TesseditCharWhitelist, PLATE_CHARSET)
                .map_err(|e| anyhow::anyhow!("Failed to set tesseract whitelist: {}", e))?;
            api.set_variable(Variable::TesseditPagesegMode, PSM_SINGLE_LINE)
                .map_err(|e| anyhow::anyhow!("Failed to set tesseract page mode: {}", e))?;
            Ok(Self {
                api: Mutex::new(TessHandle(api)),
            })
        }

        fn read_text(&self, image: &DynamicImage) -> anyhow::Result<(String, f32)> {
            let mut png = Vec::new();
            image.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

            let mut guard = self.api.lock();
            let api = &mut guard.0;
            api.set_image_from_mem(&png)
                .map_err(|e| anyhow::anyhow!("tesseract rejected image: {}", e))?;
            let text = api.get_utf8_text()?;
            let confidence = api.mean_text_conf().max(0) as f32 / 100.0;
            Ok((text.trim().to_string(), confidence))
        }
    }

    impl Recognizer for TesseractRecognizer {
        fn name(&self) -> &str {
            "tesseract"
        }

        fn read(&self, image: &DynamicImage) -> EngineOutcome {
            match self.read_text(image) {
                Ok((text, _)) if text.is_empty() => EngineOutcome::NoResult,
                Ok((text, confidence)) => EngineOutcome::Hypotheses(vec![RecognitionHypothesis {
                    text,
                    confidence,
                    engine_id: self.name().to_string(),
                }]),
                Err(e) => EngineOutcome::Failed(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_models_fail_to_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = OcrsRecognizer::load(dir.path(), 0.9).err().expect("load should fail");
        assert!(err.to_string().contains("OCR models not found"));
    }

    #[test]
    fn test_no_loadable_engine_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = RecognitionSettings {
            model_dir: Some(dir.path().to_path_buf()),
            engines: vec!["ocrs".to_string(), "paddle".to_string()],
            ..Default::default()
        };
        assert!(build_recognizers(&settings).is_err());
    }

    #[cfg(feature = "tesseract")]
    #[test]
    fn test_tesseract_without_traineddata_fails_to_load() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(TesseractRecognizer::load(Some(dir.path()), "eng").is_err());
    }

    #[cfg(feature = "tesseract")]
    #[test]
    fn test_tesseract_without_data_leaves_no_engine() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = RecognitionSettings {
            tessdata_dir: Some(dir.path().to_path_buf()),
            model_dir: Some(dir.path().to_path_buf()),
            engines: vec!["tesseract".to_string()],
            ..Default::default()
        };
        // Empty tessdata: the engine is skipped and nothing else is configured.
        assert!(build_recognizers(&settings).is_err());
    }

    #[test]
    fn test_empty_hypotheses_become_no_result() {
        assert_eq!(EngineOutcome::from_hypotheses(vec![]), EngineOutcome::NoResult);
    }
}
