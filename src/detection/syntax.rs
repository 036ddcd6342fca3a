//! Position-wise plate correction against a country character-class template.
//!
//! OCR engines routinely swap look-alike glyphs (`O`/`0`, `I`/`1`, `S`/`5`).
//! When a reading has exactly the length of the active country's plate format,
//! each position is forced into the class the format expects.

/// Expected character class at one plate position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Letter,
    Digit,
}

use CharClass::{Digit as D, Letter as L};

const IN_TEMPLATE: &[CharClass] = &[L, L, D, D, L, L, D, D, D, D]; // KA01AB1234
const UK_TEMPLATE: &[CharClass] = &[L, L, D, D, L, L, L]; // AB12CDE
const DE_TEMPLATE: &[CharClass] = &[L, L, L, D, D, D, D]; // BMW1234

pub const SUPPORTED_COUNTRIES: &[&str] = &["IN", "UK", "DE"];

pub fn template(country: &str) -> Option<&'static [CharClass]> {
    match country.to_ascii_uppercase().as_str() {
        "IN" => Some(IN_TEMPLATE),
        "UK" => Some(UK_TEMPLATE),
        "DE" => Some(DE_TEMPLATE),
        _ => None,
    }
}

fn letter_to_digit(c: char) -> char {
    match c {
        'O' | 'Q' | 'D' => '0',
        'I' | 'L' => '1',
        'Z' => '2',
        'S' => '5',
        'B' => '8',
        'G' => '6',
        other => other,
    }
}

fn digit_to_letter(c: char) -> char {
    match c {
        '0' => 'O',
        '1' => 'I',
        '2' => 'Z',
        '5' => 'S',
        '6' => 'G',
        '8' => 'B',
        other => other,
    }
}

/// Uppercase and keep only `[A-Z0-9]`.
pub fn clean(text: &str) -> String {
    text.chars()
        .flat_map(|c| c.to_uppercase())
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect()
}

/// Clean `text` and, when its length matches the country template, remap
/// look-alike characters position by position. Unknown countries and length
/// mismatches return the cleaned text.
pub fn correct(text: &str, country: &str) -> String {
    let cleaned = clean(text);
    let Some(pattern) = template(country) else {
        return cleaned;
    };
    if cleaned.len() != pattern.len() {
        return cleaned;
    }

    cleaned
        .chars()
        .zip(pattern.iter())
        .map(|(c, expected)| match expected {
            CharClass::Digit if c.is_ascii_alphabetic() => letter_to_digit(c),
            CharClass::Letter if c.is_ascii_digit() => digit_to_letter(c),
            _ => c,
        })
        .collect()
}
