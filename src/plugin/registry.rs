//! Installed plugins of one scope.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::pipeline::Phase;
use crate::plugin::{PluginError, Stage};

/// Plugin identity. Also used as the owner tag of its interceptors.
pub type PluginId = &'static str;

/// Typed lookup key for an installed plugin's configuration.
pub struct PluginKey<Config> {
    id: PluginId,
    _marker: PhantomData<fn() -> Config>,
}

impl<Config> PluginKey<Config> {
    pub const fn new(id: PluginId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> PluginId {
        self.id
    }
}

impl<Config> Clone for PluginKey<Config> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Config> Copy for PluginKey<Config> {}

impl<Config> fmt::Debug for PluginKey<Config> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PluginKey({})", self.id)
    }
}

/// Phases a plugin registered interceptors on, per stage, in registration order.
#[derive(Debug, Clone, Default)]
pub struct StagePhases {
    call: Vec<Phase>,
    receive: Vec<Phase>,
    respond: Vec<Phase>,
    after_transform: Vec<Phase>,
}

impl StagePhases {
    pub fn get(&self, stage: Stage) -> &[Phase] {
        match stage {
            Stage::Call => &self.call,
            Stage::Receive => &self.receive,
            Stage::Respond => &self.respond,
            Stage::AfterTransform => &self.after_transform,
        }
    }

    pub(crate) fn record(&mut self, stage: Stage, phase: Phase) {
        let list = match stage {
            Stage::Call => &mut self.call,
            Stage::Receive => &mut self.receive,
            Stage::Respond => &mut self.respond,
            Stage::AfterTransform => &mut self.after_transform,
        };
        if !list.contains(&phase) {
            list.push(phase);
        }
    }
}

/// Hook run once when the application stops.
pub type ShutdownHook = Arc<dyn Fn() + Send + Sync>;

/// A plugin installed in a scope.
pub struct InstalledPlugin {
    id: PluginId,
    config: Arc<dyn Any + Send + Sync>,
    phases: StagePhases,
    inserted: StagePhases,
    shutdown_hooks: Vec<ShutdownHook>,
}

impl InstalledPlugin {
    pub(crate) fn new(id: PluginId, config: Arc<dyn Any + Send + Sync>, phases: StagePhases) -> Self {
        Self {
            id,
            config,
            phases,
            inserted: StagePhases::default(),
            shutdown_hooks: Vec::new(),
        }
    }

    /// Relative phases this install added to the pipelines.
    pub(crate) fn with_inserted(mut self, inserted: StagePhases) -> Self {
        self.inserted = inserted;
        self
    }

    pub(crate) fn with_shutdown_hooks(mut self, hooks: Vec<ShutdownHook>) -> Self {
        self.shutdown_hooks = hooks;
        self
    }

    pub(crate) fn inserted(&self) -> &StagePhases {
        &self.inserted
    }

    pub fn id(&self) -> PluginId {
        self.id
    }

    pub fn phases(&self) -> &StagePhases {
        &self.phases
    }

    /// Configuration, if it has type `Config`.
    pub fn config<Config: Send + Sync + 'static>(&self) -> Option<Arc<Config>> {
        Arc::clone(&self.config).downcast::<Config>().ok()
    }
}

impl fmt::Debug for InstalledPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstalledPlugin")
            .field("id", &self.id)
            .field("phases", &self.phases)
            .field("shutdown_hooks", &self.shutdown_hooks.len())
            .finish()
    }
}

/// Plugin id → installed plugin, one entry per id.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<PluginId, Arc<InstalledPlugin>>,
    order: Vec<PluginId>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: PluginId) -> bool {
        self.plugins.contains_key(id)
    }

    pub fn installed(&self, id: PluginId) -> Option<&Arc<InstalledPlugin>> {
        self.plugins.get(id)
    }

    /// Configuration of the plugin behind `key`, if installed here.
    pub fn get<Config: Send + Sync + 'static>(&self, key: &PluginKey<Config>) -> Option<Arc<Config>> {
        self.plugins.get(key.id)?.config::<Config>()
    }

    /// Like [`get`](Self::get), failing with [`PluginError::Missing`].
    pub fn plugin<Config: Send + Sync + 'static>(
        &self,
        key: &PluginKey<Config>,
    ) -> Result<Arc<Config>, PluginError> {
        self.get(key).ok_or(PluginError::Missing(key.id))
    }

    /// Store `plugin`, returning the entry it replaced. A replaced plugin
    /// moves to the end of the install order.
    pub(crate) fn insert(&mut self, plugin: InstalledPlugin) -> Option<Arc<InstalledPlugin>> {
        self.order.retain(|id| *id != plugin.id);
        self.order.push(plugin.id);
        self.plugins.insert(plugin.id, Arc::new(plugin))
    }

    /// Run every shutdown hook, plugins in install order. Returns the number run.
    pub(crate) fn run_shutdown_hooks(&self) -> usize {
        let mut ran = 0;
        for plugin in self.order.iter().filter_map(|id| self.plugins.get(id)) {
            for hook in &plugin.shutdown_hooks {
                tracing::debug!(plugin = plugin.id, "Running shutdown hook");
                hook();
                ran += 1;
            }
        }
        ran
    }

    pub fn ids(&self) -> Vec<PluginId> {
        let mut ids: Vec<PluginId> = self.plugins.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Settings {
        level: u8,
    }

    const SETTINGS: PluginKey<Settings> = PluginKey::new("Settings");

    #[test]
    fn test_lookup_by_typed_key() {
        let mut registry = PluginRegistry::new();
        assert_eq!(registry.plugin(&SETTINGS).unwrap_err(), PluginError::Missing("Settings"));

        registry.insert(InstalledPlugin::new(
            "Settings",
            Arc::new(Settings { level: 3 }),
            StagePhases::default(),
        ));
        assert_eq!(registry.plugin(&SETTINGS).unwrap().level, 3);
        assert!(registry.contains("Settings"));
    }

    #[test]
    fn test_insert_replaces_same_id() {
        let mut registry = PluginRegistry::new();
        registry.insert(InstalledPlugin::new("Settings", Arc::new(Settings { level: 1 }), StagePhases::default()));
        let previous = registry.insert(InstalledPlugin::new(
            "Settings",
            Arc::new(Settings { level: 2 }),
            StagePhases::default(),
        ));
        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.plugin(&SETTINGS).unwrap().level, 2);
    }

    #[test]
    fn test_shutdown_hooks_run_in_install_order() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let hook = |name: &'static str| -> ShutdownHook {
            let seen = Arc::clone(&seen);
            Arc::new(move || seen.lock().unwrap().push(name))
        };

        let mut registry = PluginRegistry::new();
        registry.insert(
            InstalledPlugin::new("First", Arc::new(()), StagePhases::default())
                .with_shutdown_hooks(vec![hook("first")]),
        );
        registry.insert(
            InstalledPlugin::new("Second", Arc::new(()), StagePhases::default())
                .with_shutdown_hooks(vec![hook("second-a"), hook("second-b")]),
        );
        // Replacing drops the old hooks and moves the plugin last.
        registry.insert(
            InstalledPlugin::new("First", Arc::new(()), StagePhases::default())
                .with_shutdown_hooks(vec![hook("first-again")]),
        );

        assert_eq!(registry.run_shutdown_hooks(), 3);
        assert_eq!(*seen.lock().unwrap(), vec!["second-a", "second-b", "first-again"]);
    }

    #[test]
    fn test_record_deduplicates_phases() {
        let phase = Phase::new("P");
        let mut phases = StagePhases::default();
        phases.record(Stage::Respond, phase.clone());
        phases.record(Stage::Respond, phase.clone());
        assert_eq!(phases.get(Stage::Respond), &[phase]);
        assert!(phases.get(Stage::Call).is_empty());
    }
}
