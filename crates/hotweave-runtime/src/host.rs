//! Replacement registry
//!
//! The host side of the hot-reload contract. Woven code asks it for a
//! delegate by type and method key; a delegate found here replaces the
//! method's original instructions for that call.

use crate::value::{Delegate, Value};
use rustc_hash::FxHashMap;
use tracing::debug;

/// Registered replacement implementations
#[derive(Debug, Clone, Default)]
pub struct HostRuntime {
    static_methods: FxHashMap<(String, String), Delegate>,
    instance_methods: FxHashMap<(String, String), Delegate>,
}

impl HostRuntime {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a static method of `type_name`
    pub fn register_static(&mut self, type_name: &str, key: &str, delegate: Delegate) {
        debug!("Registered static replacement {}::{}", type_name, key);
        self.static_methods
            .insert((type_name.to_string(), key.to_string()), delegate);
    }

    /// Replace an instance method or constructor of `type_name`
    ///
    /// Instances pick up the entry when their method map is first created,
    /// so register before the first call on an instance.
    pub fn register_instance(&mut self, type_name: &str, key: &str, delegate: Delegate) {
        debug!("Registered instance replacement {}::{}", type_name, key);
        self.instance_methods
            .insert((type_name.to_string(), key.to_string()), delegate);
    }

    /// Static replacement lookup (`Runtime.GetMethodDelegate`)
    pub fn method_delegate(&self, type_name: &str, key: &str) -> Option<Delegate> {
        self.static_methods
            .get(&(type_name.to_string(), key.to_string()))
            .cloned()
    }

    /// Seed map for a new instance (`Runtime.GetInitialInstanceMethods`)
    ///
    /// `class_chain` lists the runtime class first, then its bases. An entry
    /// registered on a nearer class wins over one on a base.
    pub fn initial_instance_methods(&self, class_chain: &[String]) -> FxHashMap<String, Value> {
        let mut map = FxHashMap::default();
        for class in class_chain {
            for ((owner, key), delegate) in &self.instance_methods {
                if owner == class && !map.contains_key(key) {
                    map.insert(key.clone(), Value::Delegate(delegate.clone()));
                }
            }
        }
        map
    }

    /// Number of registered replacements
    pub fn len(&self) -> usize {
        self.static_methods.len() + self.instance_methods.len()
    }

    /// Check if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(text: &'static str) -> Delegate {
        Delegate::new(text, move |_, _| Ok(Value::string(text)))
    }

    #[test]
    fn test_static_lookup() {
        let mut host = HostRuntime::new();
        assert!(host.method_delegate("Zoo.Math", "Add()").is_none());

        host.register_static("Zoo.Math", "Add()", constant("x"));
        assert!(host.method_delegate("Zoo.Math", "Add()").is_some());
        assert!(host.method_delegate("Zoo.Other", "Add()").is_none());
        assert_eq!(host.len(), 1);
        assert!(!host.is_empty());
    }

    #[test]
    fn test_nearest_class_wins() {
        let mut host = HostRuntime::new();
        let near = constant("near");
        host.register_instance("Zoo.Animal", "Speak()", constant("far"));
        host.register_instance("Zoo.Dog", "Speak()", near.clone());
        host.register_instance("Zoo.Animal", "Sleep()", constant("zz"));

        let chain = vec!["Zoo.Dog".to_string(), "Zoo.Animal".to_string()];
        let map = host.initial_instance_methods(&chain);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("Speak()"), Some(&Value::Delegate(near)));
    }
}
