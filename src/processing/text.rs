use crate::validation::NationalIdDecoder;
use once_cell::sync::Lazy;
use regex::Regex;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
// Letters and combining marks (Arabic diacritics) only
static NON_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{M}\s]").unwrap());
// Addresses also keep numbers and the usual separators
static NON_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{M}\p{N}\s\-/،,.]").unwrap());

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Strip OCR noise (digits, bars, stray punctuation) from a name field.
pub fn clean_name(text: &str) -> String {
    collapse_whitespace(&NON_NAME.replace_all(text, " "))
}

pub fn clean_address(text: &str) -> String {
    collapse_whitespace(&NON_ADDRESS.replace_all(text, " "))
}

/// Card serials mix Latin letters and digits; Arabic-Indic digits become ASCII.
pub fn clean_serial(text: &str) -> String {
    text.chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() {
                Some(c.to_ascii_uppercase())
            } else {
                NationalIdDecoder::normalize_digits(&c.to_string()).chars().next()
            }
        })
        .collect()
}

/// Builds the full name from the first-name and second-name fields.
pub struct NameComposer;

impl NameComposer {
    /// First name, then the rest of the name, separated by one space. Either
    /// part may be empty; both empty gives an empty name.
    pub fn compose(first_name: &str, second_name: &str) -> String {
        let first = collapse_whitespace(first_name);
        let second = collapse_whitespace(second_name);
        match (first.is_empty(), second.is_empty()) {
            (false, false) => format!("{} {}", first, second),
            (false, true) => first,
            (true, false) => second,
            (true, true) => String::new(),
        }
    }
}
