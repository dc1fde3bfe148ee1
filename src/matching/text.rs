//! Text normalization for matching Turkish bank descriptions against ledger data.
//!
//! Bank exports are usually upper-cased with the locale-insensitive rules of
//! whatever system produced them, so "Ayşe", "AYSE" and "AYŞE" all have to meet
//! in the middle. Everything is folded to plain ASCII upper case and split into
//! alphanumeric tokens; matches are only ever made on token boundaries.

use std::sync::LazyLock;

use regex::Regex;

static IBAN_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{2}[0-9]{2}[A-Z0-9]{11,30}$").expect("IBAN pattern is valid")
});

/// Fold a string to upper-case ASCII using Turkish rules for dotted and
/// dotless i and stripping the usual diacritics.
pub fn fold_turkish(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            'İ' | 'ı' | 'I' | 'i' | 'Î' | 'î' => out.push('I'),
            'Ş' | 'ş' => out.push('S'),
            'Ğ' | 'ğ' => out.push('G'),
            'Ü' | 'ü' | 'Û' | 'û' => out.push('U'),
            'Ö' | 'ö' => out.push('O'),
            'Ç' | 'ç' => out.push('C'),
            'Â' | 'â' => out.push('A'),
            // combining dot above, left behind by naive lower-casing of 'İ'
            '\u{0307}' => {}
            c => out.extend(c.to_uppercase()),
        }
    }
    out
}

/// Folded alphanumeric tokens. Punctuation and whitespace are separators.
pub fn tokens(input: &str) -> Vec<String> {
    fold_turkish(input)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when `needle`'s tokens appear contiguously in `haystack`.
///
/// "ALI" does not match inside "KALINCA", and "MEHMET DEMIR" does not match
/// "MEHMET ALI DEMIR".
pub fn contains_phrase(haystack: &[String], needle: &[String]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Unit number with separators dropped: "D.101", "d-101" and "D 101" all give "D101".
pub fn unit_key(unit: &str) -> String {
    tokens(unit).concat()
}

/// True when some run of consecutive tokens concatenates to `unit`'s key.
///
/// This lets a unit written as "D.101" in the ledger match "D101", "D-101" or
/// "D 101" in a description, without matching "D1010" or "AD101".
pub fn contains_unit(haystack: &[String], unit: &str) -> bool {
    let key = unit_key(unit);
    if key.is_empty() {
        return false;
    }

    for start in 0..haystack.len() {
        let mut joined = String::new();
        for token in &haystack[start..] {
            joined.push_str(token);
            if joined.len() >= key.len() {
                break;
            }
        }
        if joined == key {
            return true;
        }
    }
    false
}

/// IBAN with whitespace removed and letters upper-cased.
pub fn normalize_iban(iban: &str) -> String {
    iban.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Structural IBAN check (country code, check digits, 11-30 alphanumerics).
/// Expects input already passed through [`normalize_iban`].
pub fn is_iban_shaped(iban: &str) -> bool {
    IBAN_SHAPE.is_match(iban)
}
