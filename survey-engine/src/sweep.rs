//! Sweep orchestration.
//!
//! Each trial runs to completion (generate, classify, aggregate, report)
//! before the next seed starts. Sharded sweeps give every worker its own
//! generator, aggregator and notable buffer, then merge in index order.
//!
//! Notable lines are buffered and reach the caller's sink only once the sweep
//! has finished and passed its consistency checks; a failed sweep writes none.

use log::{debug, info, warn};
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use thiserror::Error;

use crate::config::{ConfigError, SweepConfig};
use crate::generation::Generator;
use crate::histogram::{Aggregator, Histogram};
use crate::notable::NotableReporter;
use crate::record::TrialRecord;
use crate::registry::{ClassificationRegistry, RegistryError};
use crate::rules::ClassificationRule;
use crate::sequence::{LcgJump, SeedOrder, SeedSequencer, SeedTransform};
use crate::target::TargetDescriptor;

/// A generator error attributed to the seed it happened on.
#[derive(Debug, Error)]
#[error("generation failed on seed 0x{seed:08X}: {source}")]
pub struct GenerationFailure {
    pub seed: u32,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Generation(#[from] GenerationFailure),
    #[error(
        "histogram total {actual} does not match {expected} ({trials} trials x {keys_per_trial} keys)"
    )]
    InvariantViolation {
        expected: u64,
        actual: u64,
        trials: u64,
        keys_per_trial: usize,
    },
    #[error("accounted for {accounted} trials but the sweep covers {expected}")]
    TrialAccounting { expected: u64, accounted: u64 },
    #[error("sweep was cancelled")]
    Cancelled,
    #[error("orchestrator is {0:?}; an orchestrator runs a single sweep")]
    InvalidState(SweepPhase),
    #[error("sweep worker {0} panicked")]
    WorkerPanicked(usize),
}

impl SweepError {
    #[must_use]
    pub const fn is_unsupported_target(&self) -> bool {
        matches!(self, Self::Registry(RegistryError::UnsupportedTarget(_)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    Idle,
    Running,
    Finalizing,
    Done,
}

/// Cooperative cancellation flag, checked between trials.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Finalized, read-only outcome of a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepRun {
    target: TargetDescriptor,
    base_seed: u32,
    trial_count: u64,
    order: SeedOrder,
    keys_per_trial: usize,
    histogram: Histogram,
    successful_trials: u64,
    failed_trials: u64,
    notable_reports: u64,
}

impl SweepRun {
    #[must_use]
    pub const fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    #[must_use]
    pub const fn base_seed(&self) -> u32 {
        self.base_seed
    }

    #[must_use]
    pub const fn trial_count(&self) -> u64 {
        self.trial_count
    }

    #[must_use]
    pub const fn order(&self) -> SeedOrder {
        self.order
    }

    #[must_use]
    pub const fn keys_per_trial(&self) -> usize {
        self.keys_per_trial
    }

    #[must_use]
    pub const fn histogram(&self) -> &Histogram {
        &self.histogram
    }

    #[must_use]
    pub const fn successful_trials(&self) -> u64 {
        self.successful_trials
    }

    #[must_use]
    pub const fn failed_trials(&self) -> u64 {
        self.failed_trials
    }

    #[must_use]
    pub const fn notable_reports(&self) -> u64 {
        self.notable_reports
    }

    /// The `{"seed": ..., "num": ..., "result": {...}}` record of this run.
    #[must_use]
    pub fn record(&self) -> TrialRecord {
        TrialRecord::new(self.base_seed, self.trial_count, self.histogram.clone())
    }
}

struct TrialContext<'s, T> {
    target: &'s TargetDescriptor,
    rule: &'s ClassificationRule,
    sequencer: &'s SeedSequencer<T>,
    tolerate_failures: bool,
    progress_interval: u64,
    cancel: &'s CancelToken,
    abort: &'s CancelToken,
}

impl<T: SeedTransform> TrialContext<'_, T> {
    fn sweep_range<G: Generator, W: Write>(
        &self,
        indices: Range<u64>,
        generator: &mut G,
        reporter: &mut NotableReporter<W>,
    ) -> Result<Aggregator, SweepError> {
        let mut aggregator = Aggregator::new();
        for index in indices {
            if self.cancel.is_cancelled() || self.abort.is_cancelled() {
                return Err(SweepError::Cancelled);
            }
            let seed = self.sequencer.seed_at(index);
            if self.sequencer.len() < self.progress_interval
                || u64::from(seed) % self.progress_interval == 0
            {
                debug!("Generating {} on seed 0x{seed:08X}", self.target);
            }

            match generator.generate(seed, self.target) {
                Ok(result) => {
                    let keys = self.rule.classify(&result);
                    aggregator.record_trial(&keys);
                    reporter.maybe_emit(seed, &result, self.rule);
                }
                Err(err) => {
                    let failure = GenerationFailure {
                        seed,
                        source: Box::new(err),
                    };
                    if !self.tolerate_failures {
                        return Err(failure.into());
                    }
                    warn!("{failure}");
                    aggregator.record_failure();
                }
            }
        }
        Ok(aggregator)
    }
}

/// Drives one sweep from `Idle` to `Done`.
pub struct SweepOrchestrator<'a, T = LcgJump> {
    config: &'a SweepConfig,
    registry: &'a ClassificationRegistry,
    sequencer: SeedSequencer<T>,
    cancel: CancelToken,
    phase: SweepPhase,
}

impl<'a> SweepOrchestrator<'a, LcgJump> {
    #[must_use]
    pub fn new(config: &'a SweepConfig, registry: &'a ClassificationRegistry) -> Self {
        Self::with_transform(config, registry, LcgJump)
    }
}

impl<'a, T: SeedTransform> SweepOrchestrator<'a, T> {
    /// Use `transform` for [`SeedOrder::Permuted`] sweeps.
    #[must_use]
    pub fn with_transform(
        config: &'a SweepConfig,
        registry: &'a ClassificationRegistry,
        transform: T,
    ) -> Self {
        Self {
            config,
            registry,
            sequencer: SeedSequencer::with_transform(
                config.base_seed,
                config.trial_count,
                config.order,
                transform,
            ),
            cancel: CancelToken::new(),
            phase: SweepPhase::Idle,
        }
    }

    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub const fn phase(&self) -> SweepPhase {
        self.phase
    }

    #[must_use]
    pub const fn sequencer(&self) -> &SeedSequencer<T> {
        &self.sequencer
    }

    /// Run every trial on the calling thread. Notable lines are written to
    /// `notable_sink` once the sweep succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid config, an unsupported target, a generation
    /// failure when failures are not tolerated, cancellation, or a failed consistency
    /// check. No run is produced in any of those cases.
    pub fn run<G: Generator, W: Write>(
        &mut self,
        generator: &mut G,
        notable_sink: W,
    ) -> Result<SweepRun, SweepError> {
        let rule = self.begin()?;
        let abort = CancelToken::new();
        let ctx = self.context(rule, &abort);
        let mut reporter = NotableReporter::new(Vec::new());
        let outcome = ctx.sweep_range(0..self.sequencer.len(), generator, &mut reporter);
        let emitted = reporter.emitted();
        let run = self.finish(rule, outcome, emitted)?;
        write_notable(notable_sink, &[reporter.into_inner()]);
        Ok(run)
    }

    /// Run the sweep across `config.workers` threads, each with a generator built by
    /// `factory(worker_index)`. Workers are capped at the trial count. Notable lines
    /// are written per shard, in index order, once the sweep succeeds, so the sink
    /// receives exactly what [`SweepOrchestrator::run`] would write.
    ///
    /// # Errors
    ///
    /// Same conditions as [`SweepOrchestrator::run`]; additionally a panicking worker
    /// aborts the sweep. The first failing or panicking shard stops the others.
    pub fn run_sharded<G, F, W>(&mut self, factory: F, notable_sink: W) -> Result<SweepRun, SweepError>
    where
        G: Generator,
        F: Fn(usize) -> G + Sync,
        W: Write,
        T: Sync,
    {
        let rule = self.begin()?;
        let abort = CancelToken::new();
        let ranges = self.sequencer.partition(self.config.workers);
        let ctx = self.context(rule, &abort);
        info!(
            "Sharding {} trials of {} across {} workers",
            self.sequencer.len(),
            self.config.target,
            ranges.len()
        );

        let shards: Vec<Result<(Aggregator, u64, Vec<u8>), SweepError>> = thread::scope(|scope| {
            let handles: Vec<_> = ranges
                .into_iter()
                .enumerate()
                .map(|(worker, indices)| {
                    let ctx = &ctx;
                    let factory = &factory;
                    scope.spawn(move || {
                        let _guard = AbortOnPanic(ctx.abort);
                        let mut generator = factory(worker);
                        let mut reporter = NotableReporter::new(Vec::new());
                        let outcome = ctx.sweep_range(indices, &mut generator, &mut reporter);
                        if outcome.is_err() {
                            ctx.abort.cancel();
                        }
                        outcome.map(|aggregator| {
                            let emitted = reporter.emitted();
                            (aggregator, emitted, reporter.into_inner())
                        })
                    })
                })
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(worker, handle)| {
                    handle
                        .join()
                        .unwrap_or(Err(SweepError::WorkerPanicked(worker)))
                })
                .collect()
        });

        let mut merged = Aggregator::new();
        let mut emitted = 0;
        let mut lines = Vec::new();
        let mut errors = Vec::new();
        for shard in shards {
            match shard {
                Ok((aggregator, shard_emitted, shard_lines)) => {
                    merged.merge(&aggregator);
                    emitted += shard_emitted;
                    lines.push(shard_lines);
                }
                Err(err) => errors.push(err),
            }
        }

        let outcome = match first_cause(errors) {
            Some(err) => Err(err),
            None => Ok(merged),
        };
        let run = self.finish(rule, outcome, emitted)?;
        write_notable(notable_sink, &lines);
        Ok(run)
    }

    fn begin(&mut self) -> Result<&'a ClassificationRule, SweepError> {
        if self.phase != SweepPhase::Idle {
            return Err(SweepError::InvalidState(self.phase));
        }
        let registry = self.registry;
        let checked = self
            .config
            .validate()
            .map_err(SweepError::from)
            .and_then(|()| registry.resolve(&self.config.target).map_err(SweepError::from));
        match checked {
            Ok(rule) => {
                self.phase = SweepPhase::Running;
                info!(
                    "Sweeping {} from seed 0x{:08X} over {} trials ({:?} order)",
                    self.config.target,
                    self.config.base_seed,
                    self.sequencer.len(),
                    self.config.order
                );
                Ok(rule)
            }
            Err(err) => {
                self.phase = SweepPhase::Done;
                Err(err)
            }
        }
    }

    fn context<'s>(
        &'s self,
        rule: &'s ClassificationRule,
        abort: &'s CancelToken,
    ) -> TrialContext<'s, T> {
        TrialContext {
            target: &self.config.target,
            rule,
            sequencer: &self.sequencer,
            tolerate_failures: self.config.tolerate_failures,
            progress_interval: self.config.progress_interval,
            cancel: &self.cancel,
            abort,
        }
    }

    fn finish(
        &mut self,
        rule: &ClassificationRule,
        outcome: Result<Aggregator, SweepError>,
        notable_reports: u64,
    ) -> Result<SweepRun, SweepError> {
        let aggregator = match outcome {
            Ok(aggregator) => aggregator,
            Err(err) => {
                self.phase = SweepPhase::Done;
                return Err(err);
            }
        };

        self.phase = SweepPhase::Finalizing;
        let verified = self.verify(rule, &aggregator);
        self.phase = SweepPhase::Done;
        verified?;

        if aggregator.failed_trials() > 0 {
            warn!(
                "{} of {} trials on {} failed to generate and are excluded from the histogram",
                aggregator.failed_trials(),
                self.sequencer.len(),
                self.config.target
            );
        }
        info!(
            "Finished {}: {} distinct keys, {} notable seeds",
            self.config.target,
            aggregator.histogram().len(),
            notable_reports
        );

        Ok(SweepRun {
            target: self.config.target.clone(),
            base_seed: self.config.base_seed,
            trial_count: self.sequencer.len(),
            order: self.config.order,
            keys_per_trial: rule.keys_per_trial(),
            successful_trials: aggregator.successful_trials(),
            failed_trials: aggregator.failed_trials(),
            histogram: aggregator.into_histogram(),
            notable_reports,
        })
    }

    fn verify(&self, rule: &ClassificationRule, aggregator: &Aggregator) -> Result<(), SweepError> {
        let accounted = aggregator.successful_trials() + aggregator.failed_trials();
        if accounted != self.sequencer.len() {
            return Err(SweepError::TrialAccounting {
                expected: self.sequencer.len(),
                accounted,
            });
        }
        let expected = aggregator.expected_total(rule.keys_per_trial());
        let actual = aggregator.histogram().total();
        if actual != expected {
            return Err(SweepError::InvariantViolation {
                expected,
                actual,
                trials: aggregator.successful_trials(),
                keys_per_trial: rule.keys_per_trial(),
            });
        }
        Ok(())
    }
}

/// Trips the abort token if a worker unwinds, so siblings stop at their next trial.
struct AbortOnPanic<'t>(&'t CancelToken);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.cancel();
        }
    }
}

fn write_notable<W: Write>(notable_sink: W, chunks: &[Vec<u8>]) {
    let mut sink = BufWriter::new(notable_sink);
    for chunk in chunks {
        if let Err(err) = sink.write_all(chunk) {
            warn!("failed to write notable reports: {err}");
            return;
        }
    }
    if let Err(err) = sink.flush() {
        warn!("failed to flush notable reports: {err}");
    }
}

/// Prefer a real failure over the cancellations it triggered in sibling shards.
fn first_cause(errors: Vec<SweepError>) -> Option<SweepError> {
    errors.into_iter().reduce(|kept, next| {
        if matches!(kept, SweepError::Cancelled) {
            next
        } else {
            kept
        }
    })
}
