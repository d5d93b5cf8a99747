//! Target → rule lookup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::catalog;
use crate::rules::{ClassificationRule, RuleError};
use crate::target::TargetDescriptor;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no classification rule registered for target {0}")]
    UnsupportedTarget(TargetDescriptor),
    #[error("a classification rule is already registered for target {0}")]
    DuplicateRule(TargetDescriptor),
    #[error("rule for target {target} is invalid: {source}")]
    InvalidRule {
        target: TargetDescriptor,
        #[source]
        source: RuleError,
    },
    #[error("failed to parse rule file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One entry of a JSON rule file: a rule shared by one or more targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub targets: Vec<TargetDescriptor>,
    #[serde(flatten)]
    pub rule: ClassificationRule,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFile {
    pub rules: Vec<RuleEntry>,
}

/// Immutable-after-startup map from target to classification rule.
#[derive(Debug, Clone, Default)]
pub struct ClassificationRegistry {
    rules: BTreeMap<TargetDescriptor, ClassificationRule>,
}

impl ClassificationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in cave catalog.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            rules: catalog::builtin_rules().into_iter().collect(),
        }
    }

    /// Register `rule` for `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the target already has a rule or the rule is malformed.
    pub fn register(
        &mut self,
        target: TargetDescriptor,
        rule: ClassificationRule,
    ) -> Result<(), RegistryError> {
        if self.rules.contains_key(&target) {
            return Err(RegistryError::DuplicateRule(target));
        }
        if let Err(source) = rule.validate() {
            return Err(RegistryError::InvalidRule { target, source });
        }
        self.rules.insert(target, rule);
        Ok(())
    }

    /// Register every entry of a rule file.
    ///
    /// # Errors
    ///
    /// Returns the first registration error; earlier entries stay registered.
    pub fn extend(&mut self, file: RuleFile) -> Result<(), RegistryError> {
        for entry in file.rules {
            for target in entry.targets {
                self.register(target, entry.rule.clone())?;
            }
        }
        Ok(())
    }

    /// Parse and register a JSON rule file.
    ///
    /// # Errors
    ///
    /// Returns an error when the JSON is malformed or a registration fails.
    pub fn extend_from_json(&mut self, json: &str) -> Result<(), RegistryError> {
        let file: RuleFile = serde_json::from_str(json)?;
        self.extend(file)
    }

    /// Read, parse and register a JSON rule file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or registered.
    pub fn extend_from_path(&mut self, path: &Path) -> Result<(), RegistryError> {
        let json = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.extend_from_json(&json)
    }

    /// Rule registered for exactly `target`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnsupportedTarget`] when nothing is registered.
    pub fn resolve(&self, target: &TargetDescriptor) -> Result<&ClassificationRule, RegistryError> {
        self.rules
            .get(target)
            .ok_or_else(|| RegistryError::UnsupportedTarget(target.clone()))
    }

    pub fn targets(&self) -> impl Iterator<Item = &TargetDescriptor> {
        self.rules.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{EntityMatch, KeyTemplate};

    fn eggs_rule() -> ClassificationRule {
        ClassificationRule::single(KeyTemplate::new().count("eggs", EntityMatch::creature("Egg")))
    }

    #[test]
    fn resolves_exact_matches_only() {
        let mut registry = ClassificationRegistry::new();
        registry
            .register(TargetDescriptor::new("A", 1), eggs_rule())
            .unwrap();
        assert!(registry.resolve(&TargetDescriptor::new("A", 1)).is_ok());
        let err = registry.resolve(&TargetDescriptor::new("A", 2)).unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedTarget(t) if t == TargetDescriptor::new("A", 2)));
        assert!(registry.resolve(&TargetDescriptor::new("a", 1)).is_err());
    }

    #[test]
    fn rejects_duplicate_registration() {
        let mut registry = ClassificationRegistry::new();
        let target = TargetDescriptor::new("A", 1);
        registry.register(target.clone(), eggs_rule()).unwrap();
        let err = registry.register(target, eggs_rule()).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRule(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rejects_invalid_rules() {
        let mut registry = ClassificationRegistry::new();
        let err = registry
            .register(
                TargetDescriptor::new("A", 1),
                ClassificationRule::single(KeyTemplate::new()),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRule { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn rule_file_registers_shared_rule_for_each_target() {
        let json = r#"{
            "rules": [{
                "targets": ["ZZ-1", "ZZ-2"],
                "keys": [[{"probe": "presence", "field": "oogane", "entity": {"name": "Wealthy"}}]]
            }]
        }"#;
        let mut registry = ClassificationRegistry::new();
        registry.extend_from_json(json).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.resolve(&TargetDescriptor::new("ZZ", 1)).unwrap(),
            registry.resolve(&TargetDescriptor::new("ZZ", 2)).unwrap()
        );
    }

    #[test]
    fn rule_file_cannot_shadow_builtins() {
        let json = r#"{
            "rules": [{
                "targets": ["FC-7"],
                "keys": [[{"probe": "flag", "field": "geyser", "flag": "geyser"}]]
            }]
        }"#;
        let mut registry = ClassificationRegistry::builtin();
        let err = registry.extend_from_json(json).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateRule(t) if t.to_string() == "FC-7"));
    }

    #[test]
    fn malformed_rule_file_is_a_parse_error() {
        let mut registry = ClassificationRegistry::new();
        let err = registry.extend_from_json("{\"rules\": [{}]}").unwrap_err();
        assert!(matches!(err, RegistryError::Parse(_)));
    }
}
