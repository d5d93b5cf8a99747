//! Feature keys: the comparable reduction of a generation result.
//!
//! A key is an ordered list of named fields. Field order is part of identity
//! because the canonical text form (`{eggs: 5, elec: true}`) is what the
//! histogram groups by.

use smallvec::SmallVec;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureValue {
    Flag(bool),
    Count(u32),
}

impl FeatureValue {
    #[must_use]
    pub const fn as_flag(self) -> Option<bool> {
        match self {
            Self::Flag(value) => Some(value),
            Self::Count(_) => None,
        }
    }

    #[must_use]
    pub const fn as_count(self) -> Option<u32> {
        match self {
            Self::Count(value) => Some(value),
            Self::Flag(_) => None,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(value) => write!(f, "{value}"),
            Self::Count(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureField {
    pub name: String,
    pub value: FeatureValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FeatureKey {
    fields: SmallVec<[FeatureField; 4]>,
}

impl FeatureKey {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_flag(mut self, name: impl Into<String>, value: bool) -> Self {
        self.push(name, FeatureValue::Flag(value));
        self
    }

    #[must_use]
    pub fn with_count(mut self, name: impl Into<String>, value: u32) -> Self {
        self.push(name, FeatureValue::Count(value));
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: FeatureValue) {
        self.fields.push(FeatureField {
            name: name.into(),
            value,
        });
    }

    #[must_use]
    pub fn fields(&self) -> &[FeatureField] {
        &self.fields
    }

    /// First field with `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<FeatureValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Canonical histogram grouping string.
    #[must_use]
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i != 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field.name, field.value)?;
        }
        f.write_str("}")
    }
}
