//! Per-seed reports for notable trials.

use log::warn;
use std::io::Write;

use crate::feature::FeatureKey;
use crate::generation::GenerationResult;
use crate::rules::ClassificationRule;

/// `field = value, ..., seed = 0xXXXXXXXX`
#[must_use]
pub fn format_line(seed: u32, values: &FeatureKey) -> String {
    let mut line = String::new();
    for field in values.fields() {
        line.push_str(&format!("{} = {}, ", field.name, field.value));
    }
    line.push_str(&format!("seed = 0x{seed:08X}"));
    line
}

/// Writes one line per notable trial to a sink.
///
/// Write failures are logged and swallowed so reporting never aborts a sweep.
#[derive(Debug)]
pub struct NotableReporter<W: Write> {
    sink: W,
    emitted: u64,
}

impl<W: Write> NotableReporter<W> {
    #[must_use]
    pub const fn new(sink: W) -> Self {
        Self { sink, emitted: 0 }
    }

    /// Emit a line when `rule` marks `result` as notable. Returns whether it did.
    pub fn maybe_emit(
        &mut self,
        seed: u32,
        result: &GenerationResult,
        rule: &ClassificationRule,
    ) -> bool {
        let Some(values) = rule.notable_values(result) else {
            return false;
        };
        self.emitted += 1;
        if let Err(err) = writeln!(self.sink, "{}", format_line(seed, &values)) {
            warn!("failed to write notable report for seed 0x{seed:08X}: {err}");
        }
        true
    }

    #[must_use]
    pub const fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn flush(&mut self) {
        if let Err(err) = self.sink.flush() {
            warn!("failed to flush notable reports: {err}");
        }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}
