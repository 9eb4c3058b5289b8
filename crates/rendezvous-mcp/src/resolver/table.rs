use std::collections::{BTreeSet, HashMap};

use super::default::BUILTIN_SERVICES;
use crate::discovery::{DiscoveredService, SourceKind};
use crate::model::{ServiceDescriptor, short_names};

/// Many-to-one mapping from identifiers to canonical service names.
///
/// Later insertions overwrite earlier ones for the same key; keys are never
/// removed except by `rebuild`.
#[derive(Debug, Clone, Default)]
pub struct NameResolver {
    table: HashMap<String, String>,
}

impl NameResolver {
    /// Resolver seeded with the built-in table.
    pub fn new() -> Self {
        let mut r = Self::default();
        r.register_builtin();
        r
    }

    /// Resolve `identifier`, falling back to the identifier itself.
    ///
    /// An unresolved name is returned unchanged; it may still not exist.
    pub fn resolve<'a>(&'a self, identifier: &'a str) -> &'a str {
        self.table
            .get(identifier)
            .map(String::as_str)
            .unwrap_or(identifier)
    }

    pub fn insert(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.table.insert(alias.into(), canonical.into());
    }

    fn register_builtin(&mut self) {
        for (name, aliases) in BUILTIN_SERVICES {
            self.insert(*name, *name);
            for alias in aliases.iter() {
                self.insert(*alias, *name);
            }
        }
    }

    /// Map a configured service's name, its suffix-derived short forms, and
    /// its declared aliases.
    pub fn register_configured(&mut self, service: &ServiceDescriptor) {
        if service.name.is_empty() {
            return;
        }
        self.insert(service.name.as_str(), service.name.as_str());
        for short in short_names(&service.name) {
            self.insert(short, service.name.as_str());
        }
        self.register_declared_aliases(service);
    }

    /// Map a service's name and declared aliases only.
    pub fn register_declared(&mut self, service: &ServiceDescriptor) {
        if service.name.is_empty() {
            return;
        }
        self.insert(service.name.as_str(), service.name.as_str());
        self.register_declared_aliases(service);
    }

    fn register_declared_aliases(&mut self, service: &ServiceDescriptor) {
        for alias in service.aliases.iter().flatten() {
            let alias = alias.trim();
            if !alias.is_empty() {
                self.insert(alias, service.name.as_str());
            }
        }
    }

    /// Rebuild from scratch: built-ins, then every discovered service in order.
    ///
    /// Suffix-derived short names apply only to services from the static
    /// config; every other source contributes its name and declared aliases.
    pub fn rebuild(&mut self, services: &[DiscoveredService]) {
        self.table.clear();
        self.register_builtin();
        for svc in services {
            match svc.origin.source {
                SourceKind::Config => self.register_configured(&svc.descriptor),
                SourceKind::Registry | SourceKind::ProcessTable | SourceKind::Local => {
                    self.register_declared(&svc.descriptor)
                }
            }
        }
        tracing::debug!("name resolver rebuilt ({} entries)", self.table.len());
    }

    /// Distinct canonical names, sorted.
    pub fn canonical_names(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self.table.values().collect();
        set.into_iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
