use crate::models::Governorate;
use crate::utils::NationalIdError;
use chrono::NaiveDate;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ID-1 card size (85.60mm × 53.98mm)
pub const CARD_WIDTH_MM: f32 = 85.60;
pub const CARD_HEIGHT_MM: f32 = 53.98;
pub const CARD_ASPECT_RATIO: f32 = CARD_WIDTH_MM / CARD_HEIGHT_MM;

/// Printed fields on the front of the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    FirstName,
    SecondName,
    Address,
    NationalId,
    Serial,
    Photo,
}

impl FieldKind {
    pub const ALL: [FieldKind; 6] = [
        FieldKind::FirstName,
        FieldKind::SecondName,
        FieldKind::Address,
        FieldKind::NationalId,
        FieldKind::Serial,
        FieldKind::Photo,
    ];

    /// Script the field is printed in, `None` for non-text regions.
    pub fn script(&self) -> Option<Script> {
        match self {
            FieldKind::FirstName | FieldKind::SecondName | FieldKind::Address => {
                Some(Script::Arabic)
            }
            FieldKind::NationalId => Some(Script::Digits),
            FieldKind::Serial => Some(Script::Latin),
            FieldKind::Photo => None,
        }
    }

    pub fn is_textual(&self) -> bool {
        self.script().is_some()
    }

    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::FirstName => "first_name",
            FieldKind::SecondName => "second_name",
            FieldKind::Address => "address",
            FieldKind::NationalId => "national_id",
            FieldKind::Serial => "serial",
            FieldKind::Photo => "photo",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    /// Arabic words, read right-to-left
    Arabic,
    /// Digit strings (Arabic-Indic or ASCII), read left-to-right
    Digits,
    /// Latin letters and digits, read left-to-right
    Latin,
}

impl Script {
    pub fn is_right_to_left(&self) -> bool {
        matches!(self, Script::Arabic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Point { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Rect { x, y, width, height }
    }

    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn center_y(&self) -> f32 {
        self.y as f32 + self.height as f32 / 2.0
    }

    /// Intersect with a `width × height` frame; `None` when nothing is left.
    pub fn clip(&self, width: u32, height: u32) -> Option<Rect> {
        let x0 = self.x.min(width);
        let y0 = self.y.min(height);
        let x1 = self.right().min(width);
        let y1 = self.bottom().min(height);
        let clipped = Rect::new(x0, y0, x1 - x0, y1 - y0);
        if clipped.is_empty() {
            None
        } else {
            Some(clipped)
        }
    }

    /// Grow by `margin` on every side, staying inside a `width × height` frame.
    pub fn expand(&self, margin: u32, width: u32, height: u32) -> Rect {
        let x0 = self.x.saturating_sub(margin);
        let y0 = self.y.saturating_sub(margin);
        let x1 = self.right().saturating_add(margin).min(width);
        let y1 = self.bottom().saturating_add(margin).min(height);
        Rect::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

/// Canonical (cropped, deskewed, upright) card image.
#[derive(Debug, Clone)]
pub struct CardRegion {
    pub image: RgbImage,
    /// Source quadrilateral in the input photo, ordered TL, TR, BR, BL.
    pub corners: [Point; 4],
    pub confidence: f32,
}

impl CardRegion {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A detected card candidate before canonicalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardCandidate {
    pub corners: [Point; 4],
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldBox {
    pub kind: FieldKind,
    pub rect: Rect,
    pub confidence: f32,
}

/// A piece of recognized text, positioned inside the crop it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub rect: Rect,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldText {
    pub field: FieldBox,
    pub text: String,
    pub confidence: f32,
    pub fragments: usize,
}

impl FieldText {
    pub fn empty(field: FieldBox) -> Self {
        FieldText {
            field,
            text: String::new(),
            confidence: 0.0,
            fragments: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "Male"),
            Gender::Female => write!(f, "Female"),
        }
    }
}

/// Demographic attributes carried by a structurally valid national identifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedIdentity {
    pub national_id: String,
    pub birth_date: NaiveDate,
    pub governorate_code: String,
    pub governorate: Option<Governorate>,
    pub sequence: String,
    pub gender: Gender,
}

impl DecodedIdentity {
    /// The non-fatal lookup error, if the governorate code is not in the table.
    pub fn governorate_error(&self) -> Option<NationalIdError> {
        match self.governorate {
            Some(_) => None,
            None => Some(NationalIdError::UnknownGovernorate(
                self.governorate_code.clone(),
            )),
        }
    }

    pub fn is_born_abroad(&self) -> bool {
        self.governorate == Some(Governorate::BornAbroad)
    }

    /// Completed years of age at `date`.
    pub fn age_on(&self, date: NaiveDate) -> u32 {
        date.years_since(self.birth_date).unwrap_or(0)
    }
}

/// Everything extracted from one card photo.
///
/// Attributes are `None` when their field was not detected or recognized.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub first_name: Option<String>,
    pub second_name: Option<String>,
    pub full_name: Option<String>,
    pub national_id: Option<String>,
    pub address: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub governorate: Option<Governorate>,
    pub gender: Option<Gender>,
    pub serial: Option<String>,
    pub portrait: Option<Rect>,
    pub card_confidence: f32,
    pub fields: Vec<FieldText>,
    pub missing_fields: Vec<FieldKind>,
    /// National ID decode problem; structural errors leave the demographic
    /// attributes empty, an unknown governorate leaves date and gender set.
    pub id_error: Option<NationalIdError>,
}

impl ExtractionResult {
    pub fn field(&self, kind: FieldKind) -> Option<&FieldText> {
        self.fields.iter().find(|f| f.field.kind == kind)
    }

    /// True when every textual field was read and the national ID decoded cleanly.
    pub fn is_complete(&self) -> bool {
        self.missing_fields.is_empty() && self.id_error.is_none()
    }
}
