//! Generation results and the generator seam.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::marker::PhantomData;

use crate::target::TargetDescriptor;

/// Broad category of a placed entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Creature,
    Treasure,
}

/// One entity placed by the generator, optionally carrying an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedEntity {
    #[serde(default)]
    pub kind: EntityKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrying: Option<String>,
}

impl PlacedEntity {
    #[must_use]
    pub fn creature(name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Creature,
            name: name.into(),
            carrying: None,
        }
    }

    #[must_use]
    pub fn treasure(name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Treasure,
            name: name.into(),
            carrying: None,
        }
    }

    #[must_use]
    pub fn carrying(mut self, item: impl Into<String>) -> Self {
        self.carrying = Some(item.into());
        self
    }
}

/// Output of a single deterministic trial.
///
/// Owned by the trial that produced it and dropped once classified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationResult {
    entities: Vec<PlacedEntity>,
    flags: BTreeSet<String>,
}

impl GenerationResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entity(mut self, entity: PlacedEntity) -> Self {
        self.entities.push(entity);
        self
    }

    #[must_use]
    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into());
        self
    }

    pub fn push(&mut self, entity: PlacedEntity) {
        self.entities.push(entity);
    }

    pub fn set_flag(&mut self, flag: impl Into<String>) {
        self.flags.insert(flag.into());
    }

    #[must_use]
    pub fn entities(&self) -> &[PlacedEntity] {
        &self.entities
    }

    #[must_use]
    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().map(String::as_str)
    }
}

/// Deterministic producer of generation results.
///
/// Implementations may keep mutable scratch state between calls, which is why
/// `generate` takes `&mut self`; a sharded sweep builds one generator per worker.
pub trait Generator {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Generate the floor for `seed` on `target`.
    ///
    /// # Errors
    ///
    /// Returns an error when this seed cannot be generated for the target.
    fn generate(
        &mut self,
        seed: u32,
        target: &TargetDescriptor,
    ) -> Result<GenerationResult, Self::Error>;
}

/// Generator backed by a closure.
pub struct FromFn<F, E> {
    f: F,
    _error: PhantomData<fn() -> E>,
}

/// Wrap a closure as a [`Generator`].
pub fn from_fn<F, E>(f: F) -> FromFn<F, E>
where
    F: FnMut(u32, &TargetDescriptor) -> Result<GenerationResult, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    FromFn {
        f,
        _error: PhantomData,
    }
}

impl<F, E> Generator for FromFn<F, E>
where
    F: FnMut(u32, &TargetDescriptor) -> Result<GenerationResult, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    fn generate(
        &mut self,
        seed: u32,
        target: &TargetDescriptor,
    ) -> Result<GenerationResult, Self::Error> {
        (self.f)(seed, target)
    }
}
