//! Generation target descriptors.
//! Textual form: `<CODE>-<SUBLEVEL>`, e.g. `FC-7`, `CH2-2`; a bare `CH28` means sublevel 1.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

fn descriptor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<code>[A-Za-z][A-Za-z0-9]*)(?:-(?P<sub>[0-9]+))?$")
            .expect("descriptor pattern is valid")
    })
}

/// Identifies a generation scenario and the sublevel within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetDescriptor {
    code: String,
    sublevel: u32,
}

/// Errors raised when a descriptor string cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("target {0:?} is not of the form CODE or CODE-SUBLEVEL")]
    Malformed(String),
    #[error("sublevel of target {0:?} must be at least 1")]
    ZeroSublevel(String),
}

impl TargetDescriptor {
    #[must_use]
    pub fn new(code: impl Into<String>, sublevel: u32) -> Self {
        Self {
            code: code.into(),
            sublevel,
        }
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub const fn sublevel(&self) -> u32 {
        self.sublevel
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.code, self.sublevel)
    }
}

impl FromStr for TargetDescriptor {
    type Err = TargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = descriptor_pattern()
            .captures(trimmed)
            .ok_or_else(|| TargetParseError::Malformed(s.to_string()))?;
        let sublevel = match caps.name("sub") {
            Some(sub) => sub
                .as_str()
                .parse::<u32>()
                .map_err(|_| TargetParseError::Malformed(s.to_string()))?,
            None => 1,
        };
        if sublevel == 0 {
            return Err(TargetParseError::ZeroSublevel(s.to_string()));
        }
        Ok(Self::new(&caps["code"], sublevel))
    }
}

impl TryFrom<String> for TargetDescriptor {
    type Error = TargetParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TargetDescriptor> for String {
    fn from(value: TargetDescriptor) -> Self {
        value.to_string()
    }
}
