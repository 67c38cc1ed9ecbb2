use super::{NotificationBackend, Plugin, PluginTypes};
use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

type PluginFactory = Box<dyn Fn() -> Plugin + Send + Sync>;

/// A plugin the registry knows how to create.
pub struct PluginDescriptor {
    name: String,
    types: PluginTypes,
    factory: PluginFactory,
}

impl PluginDescriptor {
    pub fn new(
        name: impl Into<String>,
        types: PluginTypes,
        factory: impl Fn() -> Plugin + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            types,
            factory: Box::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn types(&self) -> PluginTypes {
        self.types
    }
}

struct LoadedPlugin {
    types: PluginTypes,
    plugin: Plugin,
}

/// Known plugins and the instances loaded from them, keyed by name.
///
/// Plugins are compiled in and registered by name; `load` instantiates them on
/// demand by capability type.
pub struct PluginRegistry {
    descriptors: Vec<PluginDescriptor>,
    loaded: RwLock<BTreeMap<String, LoadedPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            descriptors: vec![],
            loaded: RwLock::new(BTreeMap::new()),
        }
    }

    /// Registry with every plugin shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for descriptor in super::backends::builtin() {
            registry.register(descriptor);
        }
        for descriptor in super::frontends::builtin() {
            registry.register(descriptor);
        }
        registry
    }

    /// Add a descriptor. A later descriptor with the same name replaces the earlier one.
    pub fn register(&mut self, descriptor: PluginDescriptor) {
        self.descriptors.retain(|d| d.name != descriptor.name);
        self.descriptors.push(descriptor);
    }

    /// Instantiate every known plugin whose types intersect `types` and that is not
    /// loaded yet. Returns the newly loaded plugins.
    pub fn load(&self, types: PluginTypes) -> Vec<(String, Plugin)> {
        let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        let mut fresh = vec![];

        for descriptor in &self.descriptors {
            if !descriptor.types.intersects(types) || loaded.contains_key(&descriptor.name) {
                continue;
            }
            let plugin = (descriptor.factory)();
            info!("Loaded plugin {} ({:?})", descriptor.name, descriptor.types);
            loaded.insert(
                descriptor.name.clone(),
                LoadedPlugin {
                    types: descriptor.types,
                    plugin: plugin.clone(),
                },
            );
            fresh.push((descriptor.name.clone(), plugin));
        }

        debug!("{} plugins loaded in total", loaded.len());
        fresh
    }

    /// Names of loaded plugins with any of `types`, sorted.
    pub fn names(&self, types: PluginTypes) -> Vec<String> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, p)| p.types.intersects(types))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names of known plugins with any of `types`, loaded or not.
    pub fn available(&self, types: PluginTypes) -> Vec<String> {
        let mut names: Vec<String> = self
            .descriptors
            .iter()
            .filter(|d| d.types.intersects(types))
            .map(|d| d.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn types_of(&self, name: &str) -> Option<PluginTypes> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|p| p.types)
    }

    /// A loaded plugin usable as primary backend.
    pub fn backend(&self, name: &str) -> Option<Arc<dyn NotificationBackend>> {
        let loaded = self.loaded.read().unwrap_or_else(PoisonError::into_inner);
        let entry = loaded.get(name)?;
        if !entry.types.contains(PluginTypes::BACKEND) {
            return None;
        }
        entry.plugin.as_backend().cloned()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
