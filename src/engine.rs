use crate::config::PipelineConfig;
use crate::processing::{
    CardDetector, ContourCardDetector, FieldDetector, TemplateFieldDetector, TextRecognizer,
};
use crate::utils::IdCardError;
use log::info;
use once_cell::sync::OnceCell;
use std::fmt;
use std::time::Instant;

/// The detector and recognizer backends used by one pipeline.
pub struct ModelSet {
    pub card_detector: Box<dyn CardDetector>,
    pub field_detector: Box<dyn FieldDetector>,
    pub recognizer: Box<dyn TextRecognizer>,
}

impl ModelSet {
    pub fn new(
        card_detector: Box<dyn CardDetector>,
        field_detector: Box<dyn FieldDetector>,
        recognizer: Box<dyn TextRecognizer>,
    ) -> Self {
        ModelSet {
            card_detector,
            field_detector,
            recognizer,
        }
    }

    /// Contour card detector and layout field detector, with the given recognizer.
    pub fn classical(config: &PipelineConfig, recognizer: Box<dyn TextRecognizer>) -> Self {
        Self::new(
            Box::new(ContourCardDetector::new(config.card.clone())),
            Box::new(TemplateFieldDetector::from_config(&config.fields)),
            recognizer,
        )
    }

    /// Classical detectors with the Tesseract recognizer.
    #[cfg(feature = "tesseract")]
    pub fn tesseract(config: &PipelineConfig) -> Result<Self, IdCardError> {
        let recognizer = crate::processing::TesseractRecognizer::new(&config.ocr)?;
        Ok(Self::classical(config, Box::new(recognizer)))
    }
}

type Loader = Box<dyn Fn() -> Result<ModelSet, IdCardError> + Send + Sync>;

/// Models loaded at most once and then shared read-only by every request.
///
/// Loading happens on first use behind a one-time-init guard; concurrent
/// first callers block until the single load finishes. A failed load is not
/// cached, the next request tries again.
pub struct SharedModels {
    models: OnceCell<ModelSet>,
    loader: Loader,
}

impl SharedModels {
    pub fn lazy<F>(loader: F) -> Self
    where
        F: Fn() -> Result<ModelSet, IdCardError> + Send + Sync + 'static,
    {
        SharedModels {
            models: OnceCell::new(),
            loader: Box::new(loader),
        }
    }

    pub fn preloaded(models: ModelSet) -> Self {
        SharedModels {
            models: OnceCell::with_value(models),
            loader: Box::new(|| {
                Err(IdCardError::ModelLoad(
                    "preloaded models cannot be reloaded".to_string(),
                ))
            }),
        }
    }

    pub fn get(&self) -> Result<&ModelSet, IdCardError> {
        self.models.get_or_try_init(|| {
            let started = Instant::now();
            let models = (self.loader)()?;
            info!("Models loaded in {:?}", started.elapsed());
            Ok(models)
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.models.get().is_some()
    }
}

impl fmt::Debug for SharedModels {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SharedModels")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Script, TextFragment};
    use image::GrayImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct SilentRecognizer;

    impl TextRecognizer for SilentRecognizer {
        fn recognize(
            &self,
            _image: &GrayImage,
            _script: Script,
        ) -> Result<Vec<TextFragment>, IdCardError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_loader_runs_once_across_threads() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let shared = Arc::new(SharedModels::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ModelSet::classical(
                &PipelineConfig::default(),
                Box::new(SilentRecognizer),
            ))
        }));
        assert!(!shared.is_loaded());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || shared.get().is_ok())
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(shared.is_loaded());
    }

    #[test]
    fn test_failed_load_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let shared = SharedModels::lazy(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(IdCardError::ModelLoad("weights missing".to_string()))
            } else {
                Ok(ModelSet::classical(
                    &PipelineConfig::default(),
                    Box::new(SilentRecognizer),
                ))
            }
        });
        assert!(matches!(shared.get(), Err(IdCardError::ModelLoad(_))));
        assert!(shared.get().is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_preloaded_models() {
        let shared = SharedModels::preloaded(ModelSet::classical(
            &PipelineConfig::default(),
            Box::new(SilentRecognizer),
        ));
        assert!(shared.is_loaded());
        assert!(shared.get().is_ok());
    }
}
