pub mod card;
pub mod fields;
pub mod image;
pub mod ocr;
pub mod text;

pub use card::{CardDetector, CardLocalizer, ContourCardDetector};
pub use fields::{FieldDetector, FieldLocalizer, TemplateFieldDetector};
pub use self::image::ImageProcessor;
pub use ocr::{TextExtractor, TextRecognizer};
#[cfg(feature = "tesseract")]
pub use ocr::TesseractRecognizer;
pub use text::NameComposer;
