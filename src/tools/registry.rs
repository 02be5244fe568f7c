//! Tool registry for looking up adapters by name

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::ToolAdapter;
use super::command::CommandAdapter;
use super::kind::ToolKind;

/// Adapters indexed by tool name (e.g. `"httpx"`)
#[derive(Clone, Default)]
pub struct ToolRegistry {
    adapters: HashMap<String, Arc<dyn ToolAdapter>>,
}

impl ToolRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A [`CommandAdapter`] for every built-in tool.
    ///
    /// With a tools directory, binaries found there take precedence over PATH.
    pub fn with_defaults(tools_dir: Option<&Path>) -> Self {
        let mut registry = Self::new();
        for kind in ToolKind::ALL {
            let adapter = match tools_dir {
                Some(dir) => CommandAdapter::with_tools_dir(kind, dir),
                None => CommandAdapter::new(kind),
            };
            registry.register(Arc::new(adapter));
        }
        registry
    }

    /// Register an adapter under its name, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn ToolAdapter>) {
        self.adapters.insert(adapter.name().to_string(), adapter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Registered and reporting itself available
    pub fn is_available(&self, name: &str) -> bool {
        self.adapters
            .get(name)
            .map(|a| a.is_available())
            .unwrap_or(false)
    }

    /// Sorted names of all registered adapters
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort();
        names
    }

    /// Sorted names of adapters whose tool can run here
    pub fn list_available(&self) -> Vec<&str> {
        self.list()
            .into_iter()
            .filter(|name| self.is_available(name))
            .collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("adapters", &self.list())
            .finish()
    }
}
