use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::Error;

pub const MIN_CODE_LEN: usize = 8;
pub const MAX_CODE_LEN: usize = 10;

/// A redemption code: uppercase ASCII alphanumeric, 8 to 10 characters,
/// with at least one letter and at least one digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Code(String);

impl Code {
    /// Strips everything that is not ASCII alphanumeric, uppercases the rest
    /// and validates the result.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let normalized = normalize(raw);
        if is_valid_shape(&normalized) {
            Ok(Code(normalized))
        } else {
            Err(Error::InvalidCode(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// `"ab3d-9f8k"` => `"AB3D9F8K"`. Does not validate.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Length 8..=10, only `[A-Z0-9]`, mixed letters and digits.
pub fn is_valid_shape(candidate: &str) -> bool {
    let len = candidate.len();
    if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&len) {
        return false;
    }
    let mut has_letter = false;
    let mut has_digit = false;
    for c in candidate.chars() {
        match c {
            'A'..='Z' => has_letter = true,
            '0'..='9' => has_digit = true,
            _ => return false,
        }
    }
    has_letter && has_digit
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Code {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Code {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Code::parse(s)
    }
}

impl TryFrom<String> for Code {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Code::parse(&value)
    }
}

impl From<Code> for String {
    fn from(code: Code) -> Self {
        code.0
    }
}
