//! Node registry.
//!
//! Maps a node-type key (`sub_type`, e.g. `"github.trigger"`) to the plugin
//! implementing it. Workflows reference plugins by key only; resolution
//! happens here at execution and activation time. A flat map of trait
//! objects — no inheritance hierarchy.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::node::NodeInstance;
use crate::plugin::{NodeCategory, NodePlugin};

/// Errors from registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No plugin is registered under the given key.
    UnknownNodeType { sub_type: String },
    /// A plugin is already registered under the given key.
    DuplicateNodeType { sub_type: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNodeType { sub_type } => {
                write!(f, "unknown node type: {sub_type}")
            }
            Self::DuplicateNodeType { sub_type } => {
                write!(f, "node type already registered: {sub_type}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Registry of node plugins keyed by `sub_type`.
#[derive(Default)]
pub struct NodeRegistry {
    plugins: HashMap<String, Arc<dyn NodePlugin>>,
}

impl NodeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-loaded with the built-in structural nodes.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for plugin in crate::nodes::builtins() {
            // Built-in keys are distinct by construction.
            let _ = registry.register(plugin);
        }
        registry
    }

    /// Registers a plugin under its definition's `sub_type`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is already taken.
    pub fn register(&mut self, plugin: Arc<dyn NodePlugin>) -> Result<(), RegistryError> {
        let sub_type = plugin.definition().sub_type;
        if self.plugins.contains_key(&sub_type) {
            return Err(RegistryError::DuplicateNodeType { sub_type });
        }
        self.plugins.insert(sub_type, plugin);
        Ok(())
    }

    /// Resolves a plugin by key.
    ///
    /// # Errors
    ///
    /// Returns an error if no plugin is registered under the key.
    pub fn resolve(&self, sub_type: &str) -> Result<Arc<dyn NodePlugin>, RegistryError> {
        self.plugins
            .get(sub_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownNodeType {
                sub_type: sub_type.to_string(),
            })
    }

    /// Resolves the plugin for a node instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance references an unregistered key.
    pub fn resolve_node(&self, node: &NodeInstance) -> Result<Arc<dyn NodePlugin>, RegistryError> {
        self.resolve(&node.sub_type)
    }

    /// Returns the category of the given node instance's type.
    ///
    /// # Errors
    ///
    /// Returns an error if the instance references an unregistered key.
    pub fn category_of(&self, node: &NodeInstance) -> Result<NodeCategory, RegistryError> {
        Ok(self.resolve_node(node)?.definition().category)
    }

    /// Returns true if a plugin is registered under the key.
    #[must_use]
    pub fn contains(&self, sub_type: &str) -> bool {
        self.plugins.contains_key(sub_type)
    }

    /// Returns all registered keys.
    pub fn sub_types(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}

impl fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("sub_types", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::DelayNode;

    #[test]
    fn register_and_resolve() {
        let mut registry = NodeRegistry::new();
        registry
            .register(Arc::new(DelayNode))
            .expect("should register");

        assert!(registry.contains("core.delay"));
        let plugin = registry.resolve("core.delay").expect("should resolve");
        assert_eq!(plugin.definition().sub_type, "core.delay");
    }

    #[test]
    fn resolve_unknown_key_fails() {
        let registry = NodeRegistry::new();
        let result = registry.resolve("missing.node");
        assert_eq!(
            result.err(),
            Some(RegistryError::UnknownNodeType {
                sub_type: "missing.node".to_string()
            })
        );
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = NodeRegistry::new();
        registry
            .register(Arc::new(DelayNode))
            .expect("first registration");

        let result = registry.register(Arc::new(DelayNode));
        assert_eq!(
            result.err(),
            Some(RegistryError::DuplicateNodeType {
                sub_type: "core.delay".to_string()
            })
        );
    }

    #[test]
    fn builtins_are_registered() {
        let registry = NodeRegistry::with_builtins();
        assert!(registry.contains("core.manual_trigger"));
        assert!(registry.contains("core.webhook_trigger"));
        assert!(registry.contains("core.delay"));
        assert!(registry.contains("core.set_values"));
    }
}
