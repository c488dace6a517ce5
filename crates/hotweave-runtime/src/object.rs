//! Class instances

use crate::value::Value;
use hotweave_bytecode::FieldRef;
use rustc_hash::FxHashMap;

/// Heap-allocated class instance
///
/// Fields are keyed by declaring type and name, so a derived class may
/// declare a field with the same name as one of its bases.
#[derive(Debug, Clone)]
pub struct Object {
    /// Runtime class
    pub class: String,
    fields: FxHashMap<(String, String), Value>,
}

impl Object {
    /// Create an instance with all fields at their defaults
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: FxHashMap::default(),
        }
    }

    /// Read a field; unset fields hold the default of their type
    pub fn get_field(&self, field: &FieldRef) -> Value {
        self.fields
            .get(&(field.declaring_type.full_name.clone(), field.name.clone()))
            .cloned()
            .unwrap_or_else(|| Value::default_for(&field.field_type))
    }

    /// Write a field
    pub fn set_field(&mut self, field: &FieldRef, value: Value) {
        self.fields.insert(
            (field.declaring_type.full_name.clone(), field.name.clone()),
            value,
        );
    }

    /// Number of fields written so far
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }
}
