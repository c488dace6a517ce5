//! Constant and reference pool for modules
//!
//! Every string, type, field and method reference in an encoded module is
//! stored once in the pool and referred to by index. The pool is rebuilt on
//! each encode, so the in-memory module never holds indices itself.

use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::instruction::{FieldRef, MethodRef, TypeRef};
use rustc_hash::FxHashMap;

const TYPE_VALUE: u8 = 1 << 0;
const TYPE_BY_REF: u8 = 1 << 1;

/// Deduplicating pool of strings and symbolic references
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    /// String constants (names and literals)
    pub strings: Vec<String>,
    /// Type references
    pub types: Vec<TypeRef>,
    /// Field references
    pub fields: Vec<FieldRef>,
    /// Method references
    pub methods: Vec<MethodRef>,
    string_index: FxHashMap<String, u32>,
    type_index: FxHashMap<TypeRef, u32>,
    field_index: FxHashMap<FieldRef, u32>,
    method_index: FxHashMap<MethodRef, u32>,
}

impl ConstantPool {
    /// Create a new empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string and return its index
    pub fn add_string(&mut self, s: &str) -> u32 {
        if let Some(&index) = self.string_index.get(s) {
            return index;
        }
        let index = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.string_index.insert(s.to_string(), index);
        index
    }

    /// Intern a type reference and return its index
    pub fn add_type(&mut self, ty: &TypeRef) -> u32 {
        if let Some(&index) = self.type_index.get(ty) {
            return index;
        }
        self.add_string(&ty.full_name);
        let index = self.types.len() as u32;
        self.types.push(ty.clone());
        self.type_index.insert(ty.clone(), index);
        index
    }

    /// Intern a field reference and return its index
    pub fn add_field(&mut self, field: &FieldRef) -> u32 {
        if let Some(&index) = self.field_index.get(field) {
            return index;
        }
        self.add_type(&field.declaring_type);
        self.add_type(&field.field_type);
        self.add_string(&field.name);
        let index = self.fields.len() as u32;
        self.fields.push(field.clone());
        self.field_index.insert(field.clone(), index);
        index
    }

    /// Intern a method reference and return its index
    pub fn add_method(&mut self, method: &MethodRef) -> u32 {
        if let Some(&index) = self.method_index.get(method) {
            return index;
        }
        self.add_type(&method.declaring_type);
        self.add_type(&method.return_type);
        for param in &method.params {
            self.add_type(param);
        }
        self.add_string(&method.name);
        let index = self.methods.len() as u32;
        self.methods.push(method.clone());
        self.method_index.insert(method.clone(), index);
        index
    }

    /// Get a string by index
    pub fn get_string(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(|s| s.as_str())
    }

    /// Get a type reference by index
    pub fn get_type(&self, index: u32) -> Option<&TypeRef> {
        self.types.get(index as usize)
    }

    /// Get a field reference by index
    pub fn get_field(&self, index: u32) -> Option<&FieldRef> {
        self.fields.get(index as usize)
    }

    /// Get a method reference by index
    pub fn get_method(&self, index: u32) -> Option<&MethodRef> {
        self.methods.get(index as usize)
    }

    /// Resolve a string index read from the stream
    pub fn string_at(&self, index: u32) -> Result<String, DecodeError> {
        self.get_string(index)
            .map(str::to_string)
            .ok_or(DecodeError::InvalidPoolIndex {
                kind: "string",
                index,
            })
    }

    /// Resolve a type index read from the stream
    pub fn type_at(&self, index: u32) -> Result<TypeRef, DecodeError> {
        self.get_type(index)
            .cloned()
            .ok_or(DecodeError::InvalidPoolIndex {
                kind: "type",
                index,
            })
    }

    /// Resolve a field index read from the stream
    pub fn field_at(&self, index: u32) -> Result<FieldRef, DecodeError> {
        self.get_field(index)
            .cloned()
            .ok_or(DecodeError::InvalidPoolIndex {
                kind: "field",
                index,
            })
    }

    /// Resolve a method index read from the stream
    pub fn method_at(&self, index: u32) -> Result<MethodRef, DecodeError> {
        self.get_method(index)
            .cloned()
            .ok_or(DecodeError::InvalidPoolIndex {
                kind: "method",
                index,
            })
    }

    /// Encode the pool to binary format
    ///
    /// Format:
    /// - String count (u32), then each string: length (u32) + UTF-8 bytes
    /// - Type count (u32), then each type: name index (u32) + flags (u8)
    /// - Field count (u32), then each field: declaring type (u32) + name (u32) + type (u32)
    /// - Method count (u32), then each method: declaring type (u32) + name (u32)
    ///   + has_this (u8) + return type (u32) + param count (u32) + param types (u32 each)
    pub fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_u32(self.strings.len() as u32);
        for s in &self.strings {
            writer.emit_string(s);
        }

        writer.emit_u32(self.types.len() as u32);
        for ty in &self.types {
            writer.emit_u32(self.string_index[&ty.full_name]);
            let mut flags = 0u8;
            if ty.is_value_type {
                flags |= TYPE_VALUE;
            }
            if ty.is_by_ref {
                flags |= TYPE_BY_REF;
            }
            writer.emit_u8(flags);
        }

        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            writer.emit_u32(self.type_index[&field.declaring_type]);
            writer.emit_u32(self.string_index[&field.name]);
            writer.emit_u32(self.type_index[&field.field_type]);
        }

        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            writer.emit_u32(self.type_index[&method.declaring_type]);
            writer.emit_u32(self.string_index[&method.name]);
            writer.emit_bool(method.has_this);
            writer.emit_u32(self.type_index[&method.return_type]);
            writer.emit_u32(method.params.len() as u32);
            for param in &method.params {
                writer.emit_u32(self.type_index[param]);
            }
        }
    }

    /// Decode the pool from binary format
    ///
    /// Table order is preserved so indices in the stream stay valid.
    pub fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let mut pool = ConstantPool::new();

        let string_count = reader.read_u32()? as usize;
        for _ in 0..string_count {
            let s = reader.read_string()?;
            let index = pool.strings.len() as u32;
            pool.string_index.entry(s.clone()).or_insert(index);
            pool.strings.push(s);
        }

        let type_count = reader.read_u32()? as usize;
        for _ in 0..type_count {
            let name = pool.string_at(reader.read_u32()?)?;
            let flags = reader.read_u8()?;
            let ty = TypeRef {
                full_name: name,
                is_value_type: flags & TYPE_VALUE != 0,
                is_by_ref: flags & TYPE_BY_REF != 0,
            };
            let index = pool.types.len() as u32;
            pool.type_index.entry(ty.clone()).or_insert(index);
            pool.types.push(ty);
        }

        let field_count = reader.read_u32()? as usize;
        for _ in 0..field_count {
            let declaring_type = pool.type_at(reader.read_u32()?)?;
            let name = pool.string_at(reader.read_u32()?)?;
            let field_type = pool.type_at(reader.read_u32()?)?;
            let field = FieldRef {
                declaring_type,
                name,
                field_type,
            };
            let index = pool.fields.len() as u32;
            pool.field_index.entry(field.clone()).or_insert(index);
            pool.fields.push(field);
        }

        let method_count = reader.read_u32()? as usize;
        for _ in 0..method_count {
            let declaring_type = pool.type_at(reader.read_u32()?)?;
            let name = pool.string_at(reader.read_u32()?)?;
            let has_this = reader.read_bool()?;
            let return_type = pool.type_at(reader.read_u32()?)?;
            let param_count = reader.read_u32()? as usize;
            let mut params = Vec::with_capacity(param_count.min(reader.remaining()));
            for _ in 0..param_count {
                params.push(pool.type_at(reader.read_u32()?)?);
            }
            let method = MethodRef {
                declaring_type,
                name,
                has_this,
                return_type,
                params,
            };
            let index = pool.methods.len() as u32;
            pool.method_index.entry(method.clone()).or_insert(index);
            pool.methods.push(method);
        }

        Ok(pool)
    }
}
