use crate::models::{DecodedIdentity, Gender, Governorate};
use crate::utils::NationalIdError;
use chrono::NaiveDate;
use log::debug;

pub const NATIONAL_ID_LENGTH: usize = 14;

/// Decoder for the 14-digit Egyptian national identifier.
///
/// Layout: `C YYMMDD GG SSSS P` where `C` is the century digit, `GG` the
/// governorate code, `SSSS` the sequence number and `P` the gender digit.
pub struct NationalIdDecoder;

impl NationalIdDecoder {
    /// Map Arabic-Indic digits to ASCII and drop every non-digit character.
    pub fn normalize_digits(raw: &str) -> String {
        raw.chars().filter_map(to_ascii_digit).collect()
    }

    /// Decode raw OCR output into a validated identity.
    ///
    /// Structural violations abort with the first error found; nothing partial
    /// is returned. An unknown governorate code is not fatal and is reported
    /// through [`DecodedIdentity::governorate_error`].
    pub fn decode(raw: &str) -> Result<DecodedIdentity, NationalIdError> {
        let digits = Self::normalize_digits(raw);
        if digits.len() != NATIONAL_ID_LENGTH {
            return Err(NationalIdError::InvalidFormat {
                length: digits.len(),
            });
        }
        let d: Vec<u32> = digits.chars().filter_map(|c| c.to_digit(10)).collect();

        let century_char = digits.chars().next().unwrap_or('0');
        let century_base = match d[0] {
            2 => 1900,
            3 => 2000,
            _ => return Err(NationalIdError::InvalidCentury(century_char)),
        };

        let year = century_base + (d[1] * 10 + d[2]) as i32;
        let month = d[3] * 10 + d[4];
        let day = d[5] * 10 + d[6];
        let birth_date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or(NationalIdError::InvalidDate { year, month, day })?;

        let governorate_code = digits[7..9].to_string();
        let governorate = Governorate::from_code(&governorate_code);
        if governorate.is_none() {
            debug!("Governorate code {} is not in the table", governorate_code);
        }

        let sequence = digits[9..13].to_string();
        let gender = if d[13] % 2 == 1 {
            Gender::Male
        } else {
            Gender::Female
        };

        Ok(DecodedIdentity {
            national_id: digits,
            birth_date,
            governorate_code,
            governorate,
            sequence,
            gender,
        })
    }
}

fn to_ascii_digit(c: char) -> Option<char> {
    match c {
        '0'..='9' => Some(c),
        // Arabic-Indic
        '\u{0660}'..='\u{0669}' => char::from_digit(c as u32 - 0x0660, 10),
        // Extended Arabic-Indic (Persian/Urdu forms)
        '\u{06F0}'..='\u{06F9}' => char::from_digit(c as u32 - 0x06F0, 10),
        _ => None,
    }
}
