use crate::config::PipelineConfig;
use crate::engine::{ModelSet, SharedModels};
use crate::models::*;
use crate::processing::text::{clean_address, clean_name, clean_serial};
use crate::processing::{CardLocalizer, FieldLocalizer, ImageProcessor, NameComposer, TextExtractor};
use crate::utils::IdCardError;
use crate::validation::NationalIdDecoder;
use image::DynamicImage;
use log::{info, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline for one request.
#[derive(Debug, Clone)]
pub struct RequestGuard {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestGuard {
    pub fn new(token: CancellationToken, timeout: Option<Duration>) -> Self {
        RequestGuard {
            token,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled() || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    pub fn check(&self) -> Result<(), IdCardError> {
        if self.is_expired() {
            Err(IdCardError::Timeout)
        } else {
            Ok(())
        }
    }
}

/// Runs the whole extraction: card → fields → text → name and national ID.
///
/// One processor can serve concurrent requests; models are shared read-only
/// and per-field recognition runs on the processor's own bounded pool.
pub struct IdCardProcessor {
    models: Arc<SharedModels>,
    config: PipelineConfig,
    pool: ThreadPool,
}

impl IdCardProcessor {
    pub fn new(models: Arc<SharedModels>, config: PipelineConfig) -> Result<Self, IdCardError> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("nid-field-{}", i))
            .build()
            .map_err(|e| IdCardError::Config(format!("Failed to build worker pool: {}", e)))?;
        Ok(IdCardProcessor {
            models,
            config,
            pool,
        })
    }

    /// Convenience constructor for models that are already loaded.
    pub fn with_models(models: ModelSet, config: PipelineConfig) -> Result<Self, IdCardError> {
        Self::new(Arc::new(SharedModels::preloaded(models)), config)
    }

    // Main entry point used by callers holding an image on disk
    pub fn detect_and_process_id_card<P: AsRef<Path>>(
        &self,
        image_path: P,
    ) -> Result<ExtractionResult, IdCardError> {
        self.process_path(image_path, &CancellationToken::new())
    }

    pub fn process_path<P: AsRef<Path>>(
        &self,
        image_path: P,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, IdCardError> {
        let image = ImageProcessor::load_image(image_path.as_ref())?;
        self.process_image(&image, cancel)
    }

    pub fn process_image(
        &self,
        image: &DynamicImage,
        cancel: &CancellationToken,
    ) -> Result<ExtractionResult, IdCardError> {
        let guard = RequestGuard::new(cancel.clone(), self.config.timeout());
        let started = Instant::now();
        let models = self.models.get()?;
        guard.check()?;

        // Step 1: Find and canonicalize the card
        let card = CardLocalizer::localize(models.card_detector.as_ref(), image, &self.config.card)?;
        guard.check()?;

        // Step 2: Locate the printed fields
        let fields =
            FieldLocalizer::localize(models.field_detector.as_ref(), &card, &self.config.fields)?;
        if fields.is_empty() {
            return Err(IdCardError::NoFieldsDetected);
        }
        guard.check()?;

        // Step 3: Recognize every text field in parallel
        let texts = self.extract_fields(models, &card, &fields, &guard)?;

        // Step 4: Compose names and decode the national ID
        let result = Self::assemble(&card, &fields, texts);
        info!(
            "Extraction finished in {:?}: {} fields, {} missing",
            started.elapsed(),
            result.fields.len(),
            result.missing_fields.len()
        );
        Ok(result)
    }

    fn extract_fields(
        &self,
        models: &ModelSet,
        card: &CardRegion,
        fields: &[FieldBox],
        guard: &RequestGuard,
    ) -> Result<BTreeMap<FieldKind, FieldText>, IdCardError> {
        let ocr = &self.config.ocr;
        let results: Vec<Option<FieldText>> = self.pool.install(|| {
            fields
                .par_iter()
                .filter(|field| field.kind.is_textual())
                .map(|field| {
                    if guard.is_expired() {
                        return None;
                    }
                    Some(TextExtractor::extract(
                        models.recognizer.as_ref(),
                        card,
                        field,
                        ocr,
                    ))
                })
                .collect()
        });

        let skipped = results.iter().filter(|r| r.is_none()).count();
        if skipped > 0 {
            warn!("Request expired with {} fields not extracted", skipped);
            return Err(IdCardError::Timeout);
        }
        Ok(results
            .into_iter()
            .flatten()
            .map(|text| (text.field.kind, text))
            .collect())
    }

    fn assemble(
        card: &CardRegion,
        fields: &[FieldBox],
        texts: BTreeMap<FieldKind, FieldText>,
    ) -> ExtractionResult {
        let text_of = |kind: FieldKind, clean: fn(&str) -> String| -> Option<String> {
            texts
                .get(&kind)
                .map(|t| clean(&t.text))
                .filter(|t| !t.is_empty())
        };

        let first_name = text_of(FieldKind::FirstName, clean_name);
        let second_name = text_of(FieldKind::SecondName, clean_name);
        let address = text_of(FieldKind::Address, clean_address);
        let serial = text_of(FieldKind::Serial, clean_serial);
        let raw_id = text_of(FieldKind::NationalId, |t| t.trim().to_string());

        let full_name = Some(NameComposer::compose(
            first_name.as_deref().unwrap_or(""),
            second_name.as_deref().unwrap_or(""),
        ))
        .filter(|n| !n.is_empty());

        let mut result = ExtractionResult {
            first_name,
            second_name,
            full_name,
            address,
            serial,
            portrait: fields
                .iter()
                .find(|f| f.kind == FieldKind::Photo)
                .map(|f| f.rect),
            card_confidence: card.confidence,
            ..Default::default()
        };

        if let Some(raw) = raw_id {
            match NationalIdDecoder::decode(&raw) {
                Ok(identity) => {
                    result.birth_date = Some(identity.birth_date);
                    result.governorate = identity.governorate;
                    result.gender = Some(identity.gender);
                    result.id_error = identity.governorate_error();
                    result.national_id = Some(identity.national_id);
                }
                Err(e) => {
                    warn!("National ID '{}' could not be decoded: {}", raw, e);
                    let digits = NationalIdDecoder::normalize_digits(&raw);
                    result.national_id = Some(digits).filter(|d| !d.is_empty());
                    result.id_error = Some(e);
                }
            }
        }

        result.missing_fields = FieldKind::ALL
            .iter()
            .copied()
            .filter(|kind| match kind {
                FieldKind::FirstName => result.first_name.is_none(),
                FieldKind::SecondName => result.second_name.is_none(),
                FieldKind::Address => result.address.is_none(),
                FieldKind::NationalId => result.national_id.is_none(),
                FieldKind::Serial => result.serial.is_none(),
                FieldKind::Photo => result.portrait.is_none(),
            })
            .collect();
        result.fields = texts.into_values().collect();
        result
    }
}
