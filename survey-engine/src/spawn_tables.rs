//! Reference generator driven by per-floor spawn tables.
//!
//! Each trial seeds a `ChaCha8Rng` from an HMAC-SHA256 of `(seed, target)`, so a
//! floor depends only on those two values and never on sweep order or sharding.

use hmac::{Hmac, Mac};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::generation::{EntityKind, GenerationResult, Generator, PlacedEntity};
use crate::target::TargetDescriptor;

const DEFAULT_SPAWN_TABLES: &str = include_str!("../assets/spawn_tables.json");

#[derive(Debug, Error)]
pub enum SpawnTableError {
    #[error("failed to parse spawn tables: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read spawn tables {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{target}: chance {chance} for {subject} is outside [0, 1]")]
    InvalidChance {
        target: TargetDescriptor,
        subject: String,
        chance: f64,
    },
    #[error("{target}: {name} has min {min} above max {max}")]
    InvertedRange {
        target: TargetDescriptor,
        name: String,
        min: u32,
        max: u32,
    },
}

/// Per-trial failure of the reference generator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("no spawn table for {0}")]
    MissingTable(TargetDescriptor),
}

const fn one() -> u32 {
    1
}

const fn certain() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarryEntry {
    pub item: String,
    #[serde(default = "certain")]
    pub chance: f64,
}

/// `chance` gates the whole group; a placed group has `min..=max` members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnEntry {
    pub name: String,
    #[serde(default)]
    pub kind: EntityKind,
    #[serde(default = "one")]
    pub min: u32,
    #[serde(default = "one")]
    pub max: u32,
    #[serde(default = "certain")]
    pub chance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrying: Option<CarryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagEntry {
    pub flag: String,
    #[serde(default = "certain")]
    pub chance: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloorTable {
    #[serde(default)]
    pub spawns: Vec<SpawnEntry>,
    #[serde(default)]
    pub flags: Vec<FlagEntry>,
}

impl FloorTable {
    fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> GenerationResult {
        let mut result = GenerationResult::new();
        for spawn in &self.spawns {
            if !rng.gen_bool(spawn.chance) {
                continue;
            }
            let count = rng.gen_range(spawn.min..=spawn.max);
            for _ in 0..count {
                let mut entity = PlacedEntity {
                    kind: spawn.kind,
                    name: spawn.name.clone(),
                    carrying: None,
                };
                if let Some(carry) = &spawn.carrying
                    && rng.gen_bool(carry.chance)
                {
                    entity = entity.carrying(carry.item.clone());
                }
                result.push(entity);
            }
        }
        for flag in &self.flags {
            if rng.gen_bool(flag.chance) {
                result.set_flag(flag.flag.clone());
            }
        }
        result
    }

    fn validate(&self, target: &TargetDescriptor) -> Result<(), SpawnTableError> {
        let invalid = |subject: &str, chance: f64| SpawnTableError::InvalidChance {
            target: target.clone(),
            subject: subject.to_string(),
            chance,
        };
        for spawn in &self.spawns {
            if !(0.0..=1.0).contains(&spawn.chance) {
                return Err(invalid(&spawn.name, spawn.chance));
            }
            if spawn.min > spawn.max {
                return Err(SpawnTableError::InvertedRange {
                    target: target.clone(),
                    name: spawn.name.clone(),
                    min: spawn.min,
                    max: spawn.max,
                });
            }
            if let Some(carry) = &spawn.carrying
                && !(0.0..=1.0).contains(&carry.chance)
            {
                return Err(invalid(&carry.item, carry.chance));
            }
        }
        for flag in &self.flags {
            if !(0.0..=1.0).contains(&flag.chance) {
                return Err(invalid(&flag.flag, flag.chance));
            }
        }
        Ok(())
    }
}

/// Validated spawn tables keyed by target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpawnTables {
    tables: BTreeMap<TargetDescriptor, FloorTable>,
}

impl SpawnTables {
    #[must_use]
    pub fn load_from_static() -> Self {
        Self::from_json(DEFAULT_SPAWN_TABLES).unwrap_or_default()
    }

    #[must_use]
    pub fn default_tables() -> &'static Self {
        static TABLES: OnceLock<SpawnTables> = OnceLock::new();
        TABLES.get_or_init(Self::load_from_static)
    }

    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a table has an out-of-range
    /// chance or an inverted count range.
    pub fn from_json(json: &str) -> Result<Self, SpawnTableError> {
        let tables: Self = serde_json::from_str(json)?;
        for (target, table) in &tables.tables {
            table.validate(target)?;
        }
        Ok(tables)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or fails [`SpawnTables::from_json`].
    pub fn load(path: &Path) -> Result<Self, SpawnTableError> {
        let json = std::fs::read_to_string(path).map_err(|source| SpawnTableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    #[must_use]
    pub fn get(&self, target: &TargetDescriptor) -> Option<&FloorTable> {
        self.tables.get(target)
    }

    pub fn targets(&self) -> impl Iterator<Item = &TargetDescriptor> {
        self.tables.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

fn derive_stream_seed(seed: u32, target: &TargetDescriptor) -> u64 {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(&seed.to_le_bytes()).expect("HMAC accepts any key length");
    mac.update(target.to_string().as_bytes());
    let digest = mac.finalize().into_bytes();
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed_bytes)
}

/// Deterministic [`Generator`] over shared spawn tables. Cheap to clone per worker.
#[derive(Debug, Clone)]
pub struct SpawnTableGenerator {
    tables: Arc<SpawnTables>,
    generated: u64,
}

impl SpawnTableGenerator {
    #[must_use]
    pub const fn new(tables: Arc<SpawnTables>) -> Self {
        Self {
            tables,
            generated: 0,
        }
    }

    #[must_use]
    pub fn builtin() -> Self {
        Self::new(Arc::new(SpawnTables::default_tables().clone()))
    }

    /// Floors produced by this instance.
    #[must_use]
    pub const fn generated(&self) -> u64 {
        self.generated
    }
}

impl Generator for SpawnTableGenerator {
    type Error = GenerationError;

    fn generate(
        &mut self,
        seed: u32,
        target: &TargetDescriptor,
    ) -> Result<GenerationResult, Self::Error> {
        let table = self
            .tables
            .get(target)
            .ok_or_else(|| GenerationError::MissingTable(target.clone()))?;
        let mut rng = ChaCha8Rng::seed_from_u64(derive_stream_seed(seed, target));
        self.generated += 1;
        Ok(table.roll(&mut rng))
    }
}
