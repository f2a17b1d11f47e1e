// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Instance specifier / instance identifier lookup.
//!
//! Configuration names a service port by an *instance specifier*
//! (e.g. `"rootSwc/rport0"`). Each transport binding names its concrete
//! instance by an *instance identifier* of the form
//! `"<binding>:<binding-specific-id>"` (e.g. `"Ipc:1"`). The lookup table
//! maps between the two, with 1..n fan-out from one specifier to several
//! bindings.
//!
//! Lifecycle: populated while bindings initialize, read during application
//! runtime, cleared at shutdown. No concurrent-mutation contract is offered
//! or needed.

use crate::com::{ComError, Result};
use crate::containers::{ArenaMap, HasKey};
use std::collections::BTreeSet;
use std::fmt;

/// Configuration-level name of a service port, independent of any binding.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceSpecifier(String);

impl InstanceSpecifier {
    /// Validate and wrap a specifier path. Segments are `/`-separated
    /// shortnames; empty strings and empty segments are rejected.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let valid = !path.is_empty()
            && path.split('/').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        if !valid {
            return Err(ComError::InvalidConfiguration(format!(
                "invalid instance specifier '{}'",
                path
            )));
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Binding-specific name of one concrete service instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceIdentifier(String);

impl InstanceIdentifier {
    /// Validate and wrap an identifier of the form `"<binding>:<id>"`.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        match value.split_once(':') {
            Some((binding, id)) if !binding.is_empty() && !id.is_empty() => {
                Ok(Self(value))
            }
            _ => Err(ComError::InvalidInstanceIdentifier(value)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The binding prefix (everything before the first `:`).
    pub fn binding(&self) -> &str {
        self.0.split_once(':').map(|(b, _)| b).unwrap_or("")
    }

    /// The binding-specific id (everything after the first `:`).
    pub fn binding_id(&self) -> &str {
        self.0.split_once(':').map(|(_, id)| id).unwrap_or("")
    }
}

impl fmt::Display for InstanceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Table key: (service shortname path, specifier), ordered lexicographically
/// by shortname path first so one service's ports are adjacent in-order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct TableKey {
    shortname_path: String,
    specifier: InstanceSpecifier,
}

struct TableSlot {
    key: TableKey,
    entries: BTreeSet<InstanceIdentifier>,
}

impl HasKey for TableSlot {
    type Key = TableKey;
    fn key(&self) -> &TableKey {
        &self.key
    }
}

/// Bidirectional specifier ↔ identifier lookup for one direction of traffic
/// (provided or required instances).
pub struct InstanceSpecifierLookupTable {
    map: ArenaMap<TableSlot>,
}

impl InstanceSpecifierLookupTable {
    pub fn new() -> Self {
        Self {
            map: ArenaMap::new(),
        }
    }

    /// Register a configuration-known specifier for `shortname_path`.
    ///
    /// Idempotent: registering the same pair again is a no-op. This
    /// establishes the key before any identifier mappings exist.
    pub fn add_instance_specifier(
        &mut self,
        specifier: InstanceSpecifier,
        shortname_path: impl Into<String>,
    ) {
        let key = TableKey {
            shortname_path: shortname_path.into(),
            specifier,
        };
        if self.map.find(&key).is_some() {
            return;
        }
        let inserted = self.map.insert(TableSlot {
            key,
            entries: BTreeSet::new(),
        });
        debug_assert!(inserted.is_ok(), "key existence was just checked");
    }

    /// Map a registered specifier to a binding instance identifier.
    ///
    /// Returns `false` without mutation when the pair is already mapped.
    /// Mapping against a specifier that was never registered is a wiring
    /// error in the binding initialization order and fatal.
    pub fn map_instance_specifier_to_instance_id(
        &mut self,
        specifier: &InstanceSpecifier,
        identifier: InstanceIdentifier,
    ) -> bool {
        match self.slot_for_specifier_mut(specifier) {
            Some(slot) => slot.entries.insert(identifier),
            None => {
                log::error!(
                    "[registry] mapping identifier '{}' for unregistered specifier '{}'",
                    identifier,
                    specifier
                );
                panic!(
                    "instance specifier '{}' must be registered before mapping identifiers",
                    specifier
                );
            }
        }
    }

    /// Remove a (specifier, identifier) pair.
    ///
    /// Returns `false` when the exact pair is not present.
    pub fn remove_instance_specifier_entry(
        &mut self,
        specifier: &InstanceSpecifier,
        identifier: &InstanceIdentifier,
    ) -> bool {
        match self.slot_for_specifier_mut(specifier) {
            Some(slot) => slot.entries.remove(identifier),
            None => false,
        }
    }

    /// Resolve a specifier to its identifier set.
    ///
    /// With a `shortname_path` filter, a specifier bound to a different
    /// service counts as unknown.
    pub fn resolve(
        &self,
        specifier: &InstanceSpecifier,
        shortname_path: Option<&str>,
    ) -> Result<BTreeSet<InstanceIdentifier>> {
        let slot = match shortname_path {
            Some(path) => {
                let key = TableKey {
                    shortname_path: path.to_string(),
                    specifier: specifier.clone(),
                };
                self.map.get_by_key(&key)
            }
            None => self.slot_for_specifier(specifier),
        };
        slot.map(|s| s.entries.clone())
            .ok_or(ComError::UnknownInstanceSpecifier)
    }

    /// Reverse-resolve an identifier to its stored entry.
    ///
    /// Linear over current entries; cardinality is bounded by configured
    /// service instances, not runtime traffic.
    pub fn resolve_identifier(
        &self,
        identifier: &InstanceIdentifier,
        shortname_path: Option<&str>,
    ) -> Result<InstanceIdentifier> {
        self.find_identifier(identifier, shortname_path)
            .map(|(_, entry)| entry.clone())
            .ok_or(ComError::UnknownInstanceIdentifier)
    }

    /// Reverse-resolve an identifier to its specifier.
    ///
    /// Precondition-only API: the caller must already know the identifier is
    /// registered; an unknown identifier is fatal.
    pub fn resolve_instance_specifier(
        &self,
        identifier: &InstanceIdentifier,
        shortname_path: &str,
    ) -> InstanceSpecifier {
        match self.find_identifier(identifier, Some(shortname_path)) {
            Some((slot, _)) => slot.key.specifier.clone(),
            None => {
                log::error!(
                    "[registry] reverse resolve of unregistered identifier '{}'",
                    identifier
                );
                panic!(
                    "instance identifier '{}' is not registered for '{}'",
                    identifier, shortname_path
                );
            }
        }
    }

    /// Number of registered specifier keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop all keys and mappings (shutdown).
    pub fn clear(&mut self) {
        self.map.clear();
    }

    fn slot_for_specifier(&self, specifier: &InstanceSpecifier) -> Option<&TableSlot> {
        self.map.iter().find(|slot| &slot.key.specifier == specifier)
    }

    fn slot_for_specifier_mut(
        &mut self,
        specifier: &InstanceSpecifier,
    ) -> Option<&mut TableSlot> {
        let key = self
            .map
            .iter()
            .find(|slot| &slot.key.specifier == specifier)
            .map(|slot| slot.key.clone())?;
        self.map.get_by_key_mut(&key)
    }

    fn find_identifier(
        &self,
        identifier: &InstanceIdentifier,
        shortname_path: Option<&str>,
    ) -> Option<(&TableSlot, &InstanceIdentifier)> {
        self.map
            .iter()
            .filter(|slot| {
                shortname_path.is_none_or(|path| slot.key.shortname_path == path)
            })
            .find_map(|slot| slot.entries.get(identifier).map(|entry| (slot, entry)))
    }
}

impl Default for InstanceSpecifierLookupTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> InstanceSpecifier {
        InstanceSpecifier::new(s).expect("valid specifier")
    }

    fn id(s: &str) -> InstanceIdentifier {
        InstanceIdentifier::new(s).expect("valid identifier")
    }

    #[test]
    fn test_specifier_validation() {
        assert!(InstanceSpecifier::new("rootSwc/rport0").is_ok());
        assert!(InstanceSpecifier::new("").is_err());
        assert!(InstanceSpecifier::new("a//b").is_err());
        assert!(InstanceSpecifier::new("a/b c").is_err());
    }

    #[test]
    fn test_identifier_validation() {
        let ipc = id("Ipc:1");
        assert_eq!(ipc.binding(), "Ipc");
        assert_eq!(ipc.binding_id(), "1");
        assert!(InstanceIdentifier::new("NoSeparator").is_err());
        assert!(InstanceIdentifier::new(":1").is_err());
        assert!(InstanceIdentifier::new("Ipc:").is_err());
    }

    #[test]
    fn test_map_then_resolve_roundtrip() {
        let mut table = InstanceSpecifierLookupTable::new();
        table.add_instance_specifier(spec("rootSwc/rport0"), "/Services/Foo");

        assert!(table.map_instance_specifier_to_instance_id(&spec("rootSwc/rport0"), id("Ipc:1")));
        let resolved = table
            .resolve_identifier(&id("Ipc:1"), None)
            .expect("identifier is mapped");
        assert_eq!(resolved, id("Ipc:1"));
    }

    #[test]
    fn test_duplicate_mapping_is_surfaced_not_applied() {
        let mut table = InstanceSpecifierLookupTable::new();
        table.add_instance_specifier(spec("rootSwc/rport0"), "/Services/Foo");

        assert!(table.map_instance_specifier_to_instance_id(&spec("rootSwc/rport0"), id("Ipc:1")));
        assert!(!table.map_instance_specifier_to_instance_id(&spec("rootSwc/rport0"), id("Ipc:1")));

        let entries = table
            .resolve(&spec("rootSwc/rport0"), None)
            .expect("specifier known");
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_resolve_fanout_in_sorted_order() {
        let mut table = InstanceSpecifierLookupTable::new();
        table.add_instance_specifier(spec("rootSwc/rport0"), "/Services/Foo");
        table.map_instance_specifier_to_instance_id(&spec("rootSwc/rport0"), id("Someip:2"));
        table.map_instance_specifier_to_instance_id(&spec("rootSwc/rport0"), id("Ipc:1"));

        let entries = table
            .resolve(&spec("rootSwc/rport0"), Some("/Services/Foo"))
            .expect("specifier known");
        let ordered: Vec<_> = entries.iter().map(InstanceIdentifier::as_str).collect();
        assert_eq!(ordered, vec!["Ipc:1", "Someip:2"]);
    }

    #[test]
    fn test_unknown_specifier_and_identifier() {
        let mut table = InstanceSpecifierLookupTable::new();
        table.add_instance_specifier(spec("rootSwc/rport0"), "/Services/Foo");

        assert!(matches!(
            table.resolve(&spec("other/port"), None),
            Err(ComError::UnknownInstanceSpecifier)
        ));
        assert!(matches!(
            table.resolve_identifier(&id("Ipc:9"), None),
            Err(ComError::UnknownInstanceIdentifier)
        ));
    }

    #[test]
    fn test_shortname_filter_treats_wrong_service_as_unknown() {
        let mut table = InstanceSpecifierLookupTable::new();
        table.add_instance_specifier(spec("rootSwc/rport0"), "/Services/Foo");
        table.map_instance_specifier_to_instance_id(&spec("rootSwc/rport0"), id("Ipc:1"));

        assert!(matches!(
            table.resolve(&spec("rootSwc/rport0"), Some("/Services/Bar")),
            Err(ComError::UnknownInstanceSpecifier)
        ));
        assert!(matches!(
            table.resolve_identifier(&id("Ipc:1"), Some("/Services/Bar")),
            Err(ComError::UnknownInstanceIdentifier)
        ));
    }

    #[test]
    fn test_remove_entry() {
        let mut table = InstanceSpecifierLookupTable::new();
        table.add_instance_specifier(spec("rootSwc/rport0"), "/Services/Foo");
        table.map_instance_specifier_to_instance_id(&spec("rootSwc/rport0"), id("Ipc:1"));

        assert!(table.remove_instance_specifier_entry(&spec("rootSwc/rport0"), &id("Ipc:1")));
        assert!(!table.remove_instance_specifier_entry(&spec("rootSwc/rport0"), &id("Ipc:1")));
        assert!(matches!(
            table.resolve_identifier(&id("Ipc:1"), None),
            Err(ComError::UnknownInstanceIdentifier)
        ));
    }

    #[test]
    fn test_reverse_resolve_specifier() {
        let mut table = InstanceSpecifierLookupTable::new();
        table.add_instance_specifier(spec("rootSwc/pport0"), "/Services/Foo");
        table.map_instance_specifier_to_instance_id(&spec("rootSwc/pport0"), id("Ipc:7"));

        let specifier = table.resolve_instance_specifier(&id("Ipc:7"), "/Services/Foo");
        assert_eq!(specifier.as_str(), "rootSwc/pport0");
    }

    #[test]
    #[should_panic(expected = "must be registered before mapping")]
    fn test_mapping_unregistered_specifier_is_fatal() {
        let mut table = InstanceSpecifierLookupTable::new();
        table.map_instance_specifier_to_instance_id(&spec("ghost/port"), id("Ipc:1"));
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn test_reverse_resolve_unknown_is_fatal() {
        let table = InstanceSpecifierLookupTable::new();
        let _ = table.resolve_instance_specifier(&id("Ipc:1"), "/Services/Foo");
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut table = InstanceSpecifierLookupTable::new();
        table.add_instance_specifier(spec("rootSwc/rport0"), "/Services/Foo");
        table.map_instance_specifier_to_instance_id(&spec("rootSwc/rport0"), id("Ipc:1"));

        table.clear();
        assert!(table.is_empty());
        assert!(table.resolve(&spec("rootSwc/rport0"), None).is_err());
    }
}
