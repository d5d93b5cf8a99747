//! Survey Engine
//!
//! Seed sweeps over a deterministic cave floor generator: every seed in a range
//! is generated, reduced to feature keys by a per-target classification rule, and
//! tallied into a histogram. Notable floors are reported by seed as they occur.

pub mod catalog;
pub mod config;
pub mod feature;
pub mod generation;
pub mod histogram;
pub mod notable;
pub mod record;
pub mod registry;
pub mod rules;
pub mod sequence;
pub mod spawn_tables;
pub mod sweep;
pub mod target;

// Re-export commonly used types
pub use config::{ConfigError, SweepConfig};
pub use feature::{FeatureField, FeatureKey, FeatureValue};
pub use generation::{EntityKind, FromFn, GenerationResult, Generator, PlacedEntity, from_fn};
pub use histogram::{Aggregator, Histogram};
pub use notable::{NotableReporter, format_line};
pub use record::{RecordError, TrialRecord, concat, parse_lines};
pub use registry::{ClassificationRegistry, RegistryError, RuleEntry, RuleFile};
pub use rules::{
    ClassificationRule, Condition, EntityMatch, Expected, KeyTemplate, NotableRule, Probe,
    RuleError,
};
pub use sequence::{LcgJump, SeedOrder, SeedSequencer, SeedTransform};
pub use spawn_tables::{GenerationError, SpawnTableError, SpawnTableGenerator, SpawnTables};
pub use sweep::{
    CancelToken, GenerationFailure, SweepError, SweepOrchestrator, SweepPhase, SweepRun,
};
pub use target::{TargetDescriptor, TargetParseError};
