use crate::config::OcrConfig;
use crate::models::{CardRegion, FieldBox, FieldText, Rect, Script, TextFragment};
use crate::processing::ImageProcessor;
use crate::utils::IdCardError;
use image::GrayImage;
use log::{debug, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Bilingual text recognition over one cropped field.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage, script: Script)
        -> Result<Vec<TextFragment>, IdCardError>;
}

/// Crops a field from the card, runs recognition and assembles the fragments
/// in reading order.
pub struct TextExtractor;

impl TextExtractor {
    /// Never fails: recognizer errors and empty output both give an empty
    /// `FieldText` and the caller decides what a missing field means.
    pub fn extract(
        recognizer: &dyn TextRecognizer,
        card: &CardRegion,
        field: &FieldBox,
        config: &OcrConfig,
    ) -> FieldText {
        let Some(script) = field.kind.script() else {
            return FieldText::empty(*field);
        };

        let area = field.rect.expand(config.margin_px, card.width(), card.height());
        if area.is_empty() {
            return FieldText::empty(*field);
        }
        let crop = ImageProcessor::prepare_field_crop(
            &card.image,
            area.x,
            area.y,
            area.width,
            area.height,
            config.min_crop_height,
        );

        let fragments = match recognizer.recognize(&crop, script) {
            Ok(fragments) => fragments,
            Err(e) => {
                warn!("Recognition failed for {}: {}", field.kind, e);
                return FieldText::empty(*field);
            }
        };

        let fragments: Vec<TextFragment> = fragments
            .into_iter()
            .filter(|f| !f.text.trim().is_empty())
            .collect();
        if fragments.is_empty() {
            debug!("No text recognized for {}", field.kind);
            return FieldText::empty(*field);
        }

        let confidence = fragments
            .iter()
            .map(|f| f.confidence)
            .fold(f32::INFINITY, f32::min)
            .clamp(0.0, 1.0);
        let count = fragments.len();
        let text = Self::assemble(fragments, script);
        debug!(
            "{}: {} fragments, confidence {:.2}",
            field.kind, count, confidence
        );

        FieldText {
            field: *field,
            text,
            confidence,
            fragments: count,
        }
    }

    /// Join fragments line by line (top to bottom), each line in the script's
    /// reading direction.
    pub fn assemble(mut fragments: Vec<TextFragment>, script: Script) -> String {
        fragments.sort_by(|a, b| {
            a.rect
                .center_y()
                .partial_cmp(&b.rect.center_y())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut lines: Vec<(Rect, Vec<TextFragment>)> = Vec::new();
        for fragment in fragments {
            let center = fragment.rect.center_y();
            match lines.last_mut() {
                Some((band, line))
                    if center >= band.y as f32 && center <= band.bottom() as f32 =>
                {
                    line.push(fragment)
                }
                _ => lines.push((fragment.rect, vec![fragment])),
            }
        }

        lines
            .into_iter()
            .map(|(_, mut line)| {
                if script.is_right_to_left() {
                    line.sort_by(|a, b| b.rect.right().cmp(&a.rect.right()));
                } else {
                    line.sort_by_key(|f| f.rect.x);
                }
                line.iter()
                    .map(|f| f.text.trim())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Parse word-level rows of Tesseract TSV output
/// (`level page block par line word left top width height conf text`).
pub fn parse_tsv(tsv: &str) -> Vec<TextFragment> {
    tsv.lines()
        .filter_map(|row| {
            let cols: Vec<&str> = row.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" {
                return None;
            }
            let left = cols[6].parse::<u32>().ok()?;
            let top = cols[7].parse::<u32>().ok()?;
            let width = cols[8].parse::<u32>().ok()?;
            let height = cols[9].parse::<u32>().ok()?;
            let conf = cols[10].trim().parse::<f32>().ok()?;
            let text = cols[11].trim();
            if conf < 0.0 || text.is_empty() {
                return None;
            }
            Some(TextFragment {
                text: text.to_string(),
                rect: Rect::new(left, top, width, height),
                confidence: (conf / 100.0).clamp(0.0, 1.0),
            })
        })
        .collect()
}

/// Idle engines that can move between threads but not be shared by them.
///
/// `run` checks out an idle engine, or creates one when all are busy, and
/// puts it back once the task hands it back. An engine whose task failed is
/// dropped.
pub struct EnginePool<T> {
    idle: Mutex<Vec<T>>,
}

impl<T> EnginePool<T> {
    pub fn new() -> Self {
        EnginePool {
            idle: Mutex::new(Vec::new()),
        }
    }

    pub fn with_engine(engine: T) -> Self {
        EnginePool {
            idle: Mutex::new(vec![engine]),
        }
    }

    pub fn run<R, E>(
        &self,
        create: impl FnOnce() -> Result<T, E>,
        task: impl FnOnce(T) -> Result<(T, R), E>,
    ) -> Result<R, E> {
        let idle = self.lock().pop();
        let engine = match idle {
            Some(engine) => engine,
            None => {
                debug!("All engines busy, creating another");
                create()?
            }
        };
        let (engine, output) = task(engine)?;
        self.lock().push(engine);
        Ok(output)
    }

    pub fn idle(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        // A panicking task never holds the lock, the list itself stays sound.
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for EnginePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "tesseract")]
pub use self::tesseract_backend::TesseractRecognizer;

#[cfg(feature = "tesseract")]
mod tesseract_backend {
    use super::{parse_tsv, EnginePool, TextRecognizer};
    use crate::config::OcrConfig;
    use crate::models::{Script, TextFragment};
    use crate::processing::ImageProcessor;
    use crate::utils::IdCardError;
    use image::GrayImage;
    use log::info;
    use tesseract::{PageSegMode, Tesseract};

    // ASCII and Arabic-Indic digits
    const DIGIT_WHITELIST: &str = "0123456789٠١٢٣٤٥٦٧٨٩";
    const LATIN_WHITELIST: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Tesseract backend. Engines are configured per script and reused across
    /// fields and requests; each is used by one worker at a time.
    pub struct TesseractRecognizer {
        config: OcrConfig,
        arabic: EnginePool<Tesseract>,
        digits: EnginePool<Tesseract>,
        latin: EnginePool<Tesseract>,
    }

    impl TesseractRecognizer {
        /// Loads one engine per script up front so missing language data
        /// fails here rather than on the first request.
        pub fn new(config: &OcrConfig) -> Result<Self, IdCardError> {
            if let Some(dir) = &config.tessdata_dir {
                if dir.to_str().is_none() {
                    return Err(IdCardError::ModelLoad(
                        "tessdata path is not valid UTF-8".to_string(),
                    ));
                }
            }
            let load = |script| {
                create_engine(config, script).map_err(|e| {
                    IdCardError::ModelLoad(format!(
                        "Failed to initialize Tesseract ({}): {}",
                        config.language_for(script),
                        e
                    ))
                })
            };
            let recognizer = TesseractRecognizer {
                arabic: EnginePool::with_engine(load(Script::Arabic)?),
                digits: EnginePool::with_engine(load(Script::Digits)?),
                latin: EnginePool::with_engine(load(Script::Latin)?),
                config: config.clone(),
            };
            info!(
                "Tesseract ready with '{}' and '{}'",
                config.language, config.latin_language
            );
            Ok(recognizer)
        }

        fn pool(&self, script: Script) -> &EnginePool<Tesseract> {
            match script {
                Script::Arabic => &self.arabic,
                Script::Digits => &self.digits,
                Script::Latin => &self.latin,
            }
        }
    }

    fn create_engine(config: &OcrConfig, script: Script) -> Result<Tesseract, IdCardError> {
        let datapath = config.tessdata_dir.as_ref().and_then(|dir| dir.to_str());
        let mut tess = Tesseract::new(datapath, Some(config.language_for(script)))
            .map_err(|e| IdCardError::Recognition(format!("Tesseract init error: {}", e)))?;

        let whitelist = match script {
            Script::Arabic => None,
            Script::Digits => Some(DIGIT_WHITELIST),
            Script::Latin => Some(LATIN_WHITELIST),
        };
        if let Some(whitelist) = whitelist {
            tess = tess
                .set_variable("tessedit_char_whitelist", whitelist)
                .map_err(|e| {
                    IdCardError::Recognition(format!("Tesseract set variable error: {}", e))
                })?;
        }
        tess.set_page_seg_mode(match script {
            Script::Arabic => PageSegMode::PsmSingleBlock,
            Script::Digits | Script::Latin => PageSegMode::PsmSingleLine,
        });
        Ok(tess)
    }

    impl TextRecognizer for TesseractRecognizer {
        fn recognize(
            &self,
            image: &GrayImage,
            script: Script,
        ) -> Result<Vec<TextFragment>, IdCardError> {
            let png = ImageProcessor::encode_png(image)?;

            self.pool(script).run(
                || create_engine(&self.config, script),
                |tess| {
                    let mut tess = tess
                        .set_image_from_mem(&png)
                        .map_err(|e| {
                            IdCardError::Recognition(format!("Tesseract set image error: {}", e))
                        })?
                        .recognize()
                        .map_err(|e| IdCardError::Recognition(format!("Tesseract error: {}", e)))?;
                    let tsv = tess.get_tsv_text(0).map_err(|e| {
                        IdCardError::Recognition(format!("Tesseract TSV error: {}", e))
                    })?;
                    Ok((tess, parse_tsv(&tsv)))
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldKind, Point};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use image::{Rgb, RgbImage};

    fn fragment(text: &str, x: u32, y: u32, confidence: f32) -> TextFragment {
        TextFragment {
            text: text.to_string(),
            rect: Rect::new(x, y, 40, 20),
            confidence,
        }
    }

    struct ScriptedRecognizer {
        output: Result<Vec<TextFragment>, String>,
        seen: Mutex<Vec<(u32, u32, Script)>>,
    }

    impl TextRecognizer for ScriptedRecognizer {
        fn recognize(
            &self,
            image: &GrayImage,
            script: Script,
        ) -> Result<Vec<TextFragment>, IdCardError> {
            self.seen
                .lock()
                .unwrap()
                .push((image.width(), image.height(), script));
            self.output.clone().map_err(IdCardError::Recognition)
        }
    }

    fn card() -> CardRegion {
        CardRegion {
            image: RgbImage::from_pixel(1000, 631, Rgb([220, 220, 220])),
            corners: [Point::new(0.0, 0.0); 4],
            confidence: 1.0,
        }
    }

    fn field_box(kind: FieldKind) -> FieldBox {
        FieldBox {
            kind,
            rect: Rect::new(400, 158, 570, 63),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_arabic_fragments_read_right_to_left() {
        let fragments = vec![
            fragment("محمد", 10, 5, 0.9),
            fragment("أحمد", 200, 5, 0.9),
            fragment("علي", 100, 7, 0.9),
        ];
        assert_eq!(TextExtractor::assemble(fragments, Script::Arabic), "أحمد علي محمد");
    }

    #[test]
    fn test_digit_fragments_read_left_to_right() {
        let fragments = vec![
            fragment("4567", 200, 5, 0.9),
            fragment("2900", 10, 6, 0.9),
            fragment("10123", 100, 4, 0.9),
        ];
        assert_eq!(TextExtractor::assemble(fragments, Script::Digits), "2900 10123 4567");
    }

    #[test]
    fn test_lines_read_top_to_bottom() {
        let fragments = vec![
            fragment("الجيزة", 10, 60, 0.9),
            fragment("شارع", 200, 5, 0.9),
            fragment("الهرم", 100, 5, 0.9),
            fragment("العمرانية", 150, 62, 0.9),
        ];
        assert_eq!(
            TextExtractor::assemble(fragments, Script::Arabic),
            "شارع الهرم العمرانية الجيزة"
        );
    }

    #[test]
    fn test_confidence_is_worst_fragment() {
        let recognizer = ScriptedRecognizer {
            output: Ok(vec![
                fragment("أحمد", 200, 5, 0.95),
                fragment("محمد", 10, 5, 0.41),
                fragment("  ", 100, 5, 0.01),
            ]),
            seen: Mutex::new(Vec::new()),
        };
        let text = TextExtractor::extract(
            &recognizer,
            &card(),
            &field_box(FieldKind::FirstName),
            &OcrConfig::default(),
        );
        assert_eq!(text.text, "أحمد محمد");
        assert_eq!(text.confidence, 0.41);
        assert_eq!(text.fragments, 2);

        let seen = recognizer.seen.lock().unwrap();
        assert_eq!(seen[0], (582, 75, Script::Arabic));
    }

    #[test]
    fn test_no_fragments_is_empty_not_error() {
        let recognizer = ScriptedRecognizer {
            output: Ok(Vec::new()),
            seen: Mutex::new(Vec::new()),
        };
        let text = TextExtractor::extract(
            &recognizer,
            &card(),
            &field_box(FieldKind::NationalId),
            &OcrConfig::default(),
        );
        assert!(text.is_empty());
        assert_eq!(text.confidence, 0.0);
        assert_eq!(recognizer.seen.lock().unwrap()[0].2, Script::Digits);
    }

    #[test]
    fn test_recognizer_error_degrades_to_empty() {
        let recognizer = ScriptedRecognizer {
            output: Err("engine crashed".to_string()),
            seen: Mutex::new(Vec::new()),
        };
        let text = TextExtractor::extract(
            &recognizer,
            &card(),
            &field_box(FieldKind::Address),
            &OcrConfig::default(),
        );
        assert!(text.is_empty());
        assert_eq!(text.field.kind, FieldKind::Address);
    }

    #[test]
    fn test_photo_is_not_recognized() {
        let recognizer = ScriptedRecognizer {
            output: Ok(vec![fragment("x", 0, 0, 1.0)]),
            seen: Mutex::new(Vec::new()),
        };
        let text = TextExtractor::extract(
            &recognizer,
            &card(),
            &field_box(FieldKind::Photo),
            &OcrConfig::default(),
        );
        assert!(text.is_empty());
        assert!(recognizer.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_parse_tsv_words() {
        let tsv = "1\t1\t0\t0\t0\t0\t0\t0\t570\t63\t-1\t\n\
                   4\t1\t1\t1\t1\t0\t12\t8\t300\t30\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t200\t8\t80\t30\t91.5\tأحمد\n\
                   5\t1\t1\t1\t1\t2\t12\t9\t90\t29\t63\tمحمد\n\
                   5\t1\t1\t1\t1\t3\t120\t9\t10\t29\t-1\t \n";
        let fragments = parse_tsv(tsv);
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "أحمد");
        assert_eq!(fragments[0].rect, Rect::new(200, 8, 80, 30));
        assert!((fragments[0].confidence - 0.915).abs() < 1e-6);
        assert!((fragments[1].confidence - 0.63).abs() < 1e-6);
    }

    #[test]
    fn test_serial_is_read_as_latin() {
        let recognizer = ScriptedRecognizer {
            output: Ok(vec![fragment("FA", 5, 5, 0.8), fragment("1234567", 60, 5, 0.7)]),
            seen: Mutex::new(Vec::new()),
        };
        let text = TextExtractor::extract(
            &recognizer,
            &card(),
            &field_box(FieldKind::Serial),
            &OcrConfig::default(),
        );
        assert_eq!(text.text, "FA 1234567");
        assert_eq!(recognizer.seen.lock().unwrap()[0].2, Script::Latin);
    }

    #[test]
    fn test_engine_pool_reuses_idle_engine() {
        let created = AtomicUsize::new(0);
        let pool: EnginePool<usize> = EnginePool::new();
        for _ in 0..5 {
            let used = pool
                .run(
                    || Ok::<_, IdCardError>(created.fetch_add(1, Ordering::SeqCst)),
                    |engine| Ok((engine, engine)),
                )
                .unwrap();
            assert_eq!(used, 0);
        }
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn test_engine_pool_grows_only_when_busy() {
        let created = AtomicUsize::new(0);
        let pool = EnginePool::with_engine(100usize);
        let nested = pool
            .run(
                || Ok::<_, IdCardError>(created.fetch_add(1, Ordering::SeqCst)),
                |outer| {
                    let inner = pool.run(
                        || Ok::<_, IdCardError>(created.fetch_add(1, Ordering::SeqCst)),
                        |inner| Ok((inner, inner)),
                    )?;
                    Ok((outer, (outer, inner)))
                },
            )
            .unwrap();
        assert_eq!(nested, (100, 0));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.idle(), 2);
    }

    #[test]
    fn test_engine_pool_drops_failed_engine() {
        let pool = EnginePool::with_engine(7usize);
        let err = pool
            .run(
                || Ok(8),
                |_engine| Err::<(usize, ()), _>(IdCardError::Recognition("bad image".to_string())),
            )
            .unwrap_err();
        assert!(matches!(err, IdCardError::Recognition(_)));
        assert_eq!(pool.idle(), 0);

        let used = pool.run(|| Ok::<_, IdCardError>(8), |e| Ok((e, e))).unwrap();
        assert_eq!(used, 8);
        assert_eq!(pool.idle(), 1);
    }
}
