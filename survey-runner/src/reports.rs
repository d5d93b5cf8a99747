use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::io::Write;
use std::time::Duration;

use survey_engine::{Histogram, SeedOrder, SweepRun};

/// A finished sweep and how long it took.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub run: SweepRun,
    pub elapsed: Duration,
}

/// `%.4g`-style formatting: four significant digits, trailing zeros trimmed,
/// scientific notation outside `1e-4 <= |v| < 1e4`.
pub fn format_significant(value: f64, precision: usize) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("{value}");
    }
    let precision = precision.max(1);
    let scientific = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let limit = i32::try_from(precision).unwrap_or(i32::MAX);
    if exponent < -4 || exponent >= limit {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa),
            exponent.unsigned_abs()
        )
    } else {
        let decimals = usize::try_from(limit - 1 - exponent).unwrap_or(0);
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Probability as a percentage; small values keep three significant decimals.
pub fn percentage(probability: f64) -> String {
    let percent = probability * 100.0;
    if percent <= 1e-6 || percent >= 1.0 {
        format!("{}%", format_significant(percent, 4))
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let digits = (-percent.log10().floor()) as usize;
        format!("{percent:.prec$}%", prec = digits + 3)
    }
}

/// Probability as `1/N` odds.
pub fn fraction(probability: f64) -> String {
    if probability <= 0.0 {
        return "1/∞".to_string();
    }
    let inverse = 1.0 / probability;
    if (1.0..=1e4).contains(&inverse) || inverse >= 1e6 {
        format!("1/{}", format_significant(inverse, 4))
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let whole = inverse as u64;
        format!("1/{whole}")
    }
}

fn seed_range(run: &SweepRun) -> String {
    let base = run.base_seed();
    match (run.trial_count(), run.order()) {
        (0, _) => format!("seed = 0x{base:08X}, no trials"),
        (1, _) => format!("seed = 0x{base:08X}"),
        (count, SeedOrder::Linear) => {
            #[allow(clippy::cast_possible_truncation)]
            let last = base.wrapping_add((count - 1) as u32);
            format!("seed = 0x{base:08X}, ..., 0x{last:08X}")
        }
        (count, SeedOrder::Permuted) => {
            format!("seed = 0x{base:08X}, {count} permuted")
        }
    }
}

/// Entries ordered by descending count, ties broken by key.
fn ranked(histogram: &Histogram) -> Vec<(&str, u64)> {
    let mut entries: Vec<_> = histogram.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries
}

pub fn generate_record_report(out: &mut dyn Write, outcomes: &[SweepOutcome]) -> Result<()> {
    for outcome in outcomes {
        writeln!(out, "{}", outcome.run.record())?;
    }
    Ok(())
}

pub fn generate_console_report(
    out: &mut dyn Write,
    outcomes: &[SweepOutcome],
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Survey Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "=================".cyan())?;

    for outcome in outcomes {
        let run = &outcome.run;
        writeln!(
            out,
            "{} ({})",
            run.target().to_string().bold(),
            seed_range(run)
        )?;
        let failed = if run.failed_trials() > 0 {
            run.failed_trials().to_string().red()
        } else {
            run.failed_trials().to_string().green()
        };
        writeln!(
            out,
            "   Trials: {} ok, {failed} failed   Notable: {}   Time: {:?}",
            run.successful_trials(),
            run.notable_reports(),
            outcome.elapsed
        )?;

        if run.histogram().is_empty() {
            writeln!(out, "   No trials classified.")?;
            writeln!(out)?;
            continue;
        }

        let width = run
            .histogram()
            .iter()
            .map(|(key, _)| key.chars().count())
            .max()
            .unwrap_or(0)
            .max(3);
        writeln!(
            out,
            "   {:width$}  {:>12}  {:>12}  {:>12}",
            "key", "count", "percent", "odds"
        )?;
        #[allow(clippy::cast_precision_loss)]
        let trials = run.successful_trials() as f64;
        for (key, count) in ranked(run.histogram()) {
            #[allow(clippy::cast_precision_loss)]
            let probability = (count as f64 / trials).clamp(0.0, 1.0);
            writeln!(
                out,
                "   {key:width$}  {count:>12}  {:>12}  {:>12}",
                percentage(probability),
                fraction(probability)
            )?;
        }
        writeln!(out)?;
    }

    writeln!(out, "Total time: {total_duration:?}")?;
    Ok(())
}

#[derive(Serialize)]
struct RunSummary<'a> {
    target: String,
    base_seed: String,
    trial_count: u64,
    order: SeedOrder,
    keys_per_trial: usize,
    successful_trials: u64,
    failed_trials: u64,
    notable_reports: u64,
    elapsed_ms: u128,
    record: String,
    result: &'a Histogram,
}

pub fn generate_json_report(out: &mut dyn Write, outcomes: &[SweepOutcome]) -> Result<()> {
    let summaries: Vec<RunSummary<'_>> = outcomes
        .iter()
        .map(|outcome| {
            let run = &outcome.run;
            RunSummary {
                target: run.target().to_string(),
                base_seed: format!("0x{:08X}", run.base_seed()),
                trial_count: run.trial_count(),
                order: run.order(),
                keys_per_trial: run.keys_per_trial(),
                successful_trials: run.successful_trials(),
                failed_trials: run.failed_trials(),
                notable_reports: run.notable_reports(),
                elapsed_ms: outcome.elapsed.as_millis(),
                record: run.record().to_string(),
                result: run.histogram(),
            }
        })
        .collect();
    let json_output = serde_json::to_string_pretty(&summaries)?;
    writeln!(out, "{json_output}")?;
    Ok(())
}
