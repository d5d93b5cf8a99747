//! Trial record lines and their concatenation.
//!
//! A record summarizes one sweep on a single line:
//!
//! ```text
//! {"seed": 0x00000000, "num": 0x08000000, "result": {"{kocha: 15}": 103414735, "{kocha: 3}": 1}}
//! ```
//!
//! The hex literals make the line invalid JSON, so parsing rewrites them to
//! decimal before handing the line to `serde_json`.

use regex::{Captures, Regex};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

use crate::histogram::Histogram;

fn hex_field_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#""(?P<field>seed|num)"\s*:\s*0[xX](?P<hex>[0-9A-Fa-f]+)"#)
            .expect("record pattern is valid")
    })
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{field} literal 0x{literal} does not fit in 64 bits")]
    HexOverflow { field: String, literal: String },
    #[error("malformed trial record: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("seed {0:#X} does not fit in 32 bits")]
    SeedOutOfRange(u64),
    #[error("no trial records to concatenate")]
    Empty,
    #[error("trial records are not contiguous: expected seed 0x{expected:08X}, found 0x{found:08X}")]
    Gap { expected: u64, found: u64 },
}

#[derive(Deserialize)]
struct RawRecord {
    seed: u64,
    num: u64,
    result: Histogram,
}

/// One sweep's histogram together with the seed range that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialRecord {
    pub seed: u32,
    pub num: u64,
    pub result: Histogram,
}

impl TrialRecord {
    #[must_use]
    pub const fn new(seed: u32, num: u64, result: Histogram) -> Self {
        Self { seed, num, result }
    }

    /// One past the last seed covered, without 32-bit wraparound.
    #[must_use]
    pub fn end(&self) -> u64 {
        u64::from(self.seed) + self.num
    }
}

impl fmt::Display for TrialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"{{"seed": 0x{:08X}, "num": 0x{:08X}, "result": {{"#,
            self.seed, self.num
        )?;
        for (i, (key, count)) in self.result.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let key = serde_json::to_string(key).map_err(|_| fmt::Error)?;
            write!(f, "{key}: {count}")?;
        }
        f.write_str("}}")
    }
}

impl FromStr for TrialRecord {
    type Err = RecordError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut overflow = None;
        let normalized = hex_field_pattern().replace_all(line.trim(), |caps: &Captures<'_>| {
            let field = &caps["field"];
            match u64::from_str_radix(&caps["hex"], 16) {
                Ok(value) => format!(r#""{field}": {value}"#),
                Err(_) => {
                    overflow.get_or_insert_with(|| RecordError::HexOverflow {
                        field: field.to_string(),
                        literal: caps["hex"].to_string(),
                    });
                    caps[0].to_string()
                }
            }
        });
        if let Some(err) = overflow {
            return Err(err);
        }

        let raw: RawRecord = serde_json::from_str(&normalized)?;
        let seed = u32::try_from(raw.seed).map_err(|_| RecordError::SeedOutOfRange(raw.seed))?;
        Ok(Self::new(seed, raw.num, raw.result))
    }
}

/// Merge records covering adjacent seed ranges into one.
///
/// Records are ordered by seed, must tile the range without gaps or overlap, and the
/// merged result lists its keys in lexicographic order.
///
/// # Errors
///
/// Returns [`RecordError::Empty`] for no input and [`RecordError::Gap`] when a
/// record does not start where the previous one ended.
pub fn concat(records: impl IntoIterator<Item = TrialRecord>) -> Result<TrialRecord, RecordError> {
    let mut records: Vec<TrialRecord> = records.into_iter().collect();
    records.sort_by_key(|record| record.seed);

    let (first, last) = match (records.first(), records.last()) {
        (Some(first), Some(last)) => (first.seed, last.end()),
        _ => return Err(RecordError::Empty),
    };

    for pair in records.windows(2) {
        if pair[0].end() != u64::from(pair[1].seed) {
            return Err(RecordError::Gap {
                expected: pair[0].end(),
                found: u64::from(pair[1].seed),
            });
        }
    }

    let mut merged = Histogram::new();
    for record in &records {
        merged.merge(&record.result);
    }
    Ok(TrialRecord::new(
        first,
        last - u64::from(first),
        merged.sorted(),
    ))
}

/// Parse one record per non-blank line.
///
/// # Errors
///
/// Returns the first line that fails to parse.
pub fn parse_lines(text: &str) -> Result<Vec<TrialRecord>, RecordError> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::parse)
        .collect()
}
