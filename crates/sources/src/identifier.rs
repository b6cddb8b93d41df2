//! ISBN validation and canonicalization
//!
//! Every identifier is stored and compared as a 13-digit ISBN. ISBN-10
//! inputs are converted on the way in so both spellings of one book
//! share a catalog row.

use bookfinder_common::{BookFinderError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical book identifier (ISBN-13 digits)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Isbn(String);

impl Isbn {
    /// Validate and canonicalize an identifier
    ///
    /// Separators (hyphens, spaces, dots, ...) are stripped first. The
    /// remainder must be a checksum-valid ISBN-10 or ISBN-13.
    pub fn parse(raw: &str) -> Result<Self> {
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect();

        match cleaned.len() {
            10 if is_valid_isbn10(&cleaned) => Ok(Self(isbn10_to_isbn13(&cleaned))),
            13 if is_valid_isbn13(&cleaned) => Ok(Self(cleaned)),
            _ => Err(BookFinderError::invalid_identifier(raw.trim())),
        }
    }

    /// Parse an optional identifier, treating blank input as absent
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>> {
        match raw.map(str::trim) {
            Some(value) if !value.is_empty() => Self::parse(value).map(Some),
            _ => Ok(None),
        }
    }

    /// Canonical form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// ISBN-10 form, available for 978-prefixed identifiers
    pub fn to_isbn10(&self) -> Option<String> {
        let body = self.0.strip_prefix("978")?;
        let core = &body[..9];
        let sum: u32 = core
            .chars()
            .zip((2..=10).rev())
            .map(|(c, weight)| c.to_digit(10).unwrap_or(0) * weight)
            .sum();
        let check = (11 - sum % 11) % 11;
        let check_char = if check == 10 {
            'X'
        } else {
            char::from_digit(check, 10).unwrap_or('0')
        };
        Some(format!("{}{}", core, check_char))
    }
}

impl fmt::Display for Isbn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Isbn {
    type Err = BookFinderError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Isbn {
    type Error = BookFinderError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Isbn> for String {
    fn from(isbn: Isbn) -> Self {
        isbn.0
    }
}

impl AsRef<str> for Isbn {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn is_valid_isbn10(code: &str) -> bool {
    let chars: Vec<char> = code.chars().collect();
    if !chars[..9].iter().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let check = match chars[9] {
        'X' => 10,
        c => match c.to_digit(10) {
            Some(d) => d,
            None => return false,
        },
    };

    let sum: u32 = chars[..9]
        .iter()
        .zip((2..=10).rev())
        .map(|(c, weight)| c.to_digit(10).unwrap_or(0) * weight)
        .sum::<u32>()
        + check;

    sum % 11 == 0
}

fn is_valid_isbn13(code: &str) -> bool {
    if !code.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    if !(code.starts_with("978") || code.starts_with("979")) {
        return false;
    }
    isbn13_check_digit(&code[..12]) == code.chars().nth(12).and_then(|c| c.to_digit(10))
}

/// Check digit for the first 12 digits of an ISBN-13
fn isbn13_check_digit(first12: &str) -> Option<u32> {
    let mut sum = 0;
    for (i, c) in first12.chars().enumerate() {
        let digit = c.to_digit(10)?;
        sum += if i % 2 == 0 { digit } else { digit * 3 };
    }
    Some((10 - sum % 10) % 10)
}

fn isbn10_to_isbn13(isbn10: &str) -> String {
    let first12 = format!("978{}", &isbn10[..9]);
    let check = isbn13_check_digit(&first12).unwrap_or(0);
    format!("{}{}", first12, check)
}
