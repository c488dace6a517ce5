//! Module format
//!
//! A [`Module`] is the writable in-memory document of a compiled binary: its
//! type definitions (with fields, methods, properties and instruction
//! streams), its list of referenced modules and a small metadata block.

use crate::constants::ConstantPool;
use crate::encoder::{BytecodeReader, BytecodeWriter, DecodeError};
use crate::instruction::{simple_name, FieldRef, Instruction, MethodRef, Operand, TypeRef};
use crate::method_key::method_key;
use crate::opcode::OperandKind;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Magic number for hotweave module files: "HWVM"
pub const MAGIC: [u8; 4] = *b"HWVM";

/// Current module format version
pub const VERSION: u32 = 1;

/// Header size: magic + version + flags + crc32 + sha256
pub const HEADER_SIZE: usize = 48;

/// File extension of encoded modules
pub const EXTENSION: &str = "hwm";

/// Module encoding/decoding errors
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Decode error
    #[error("Decode error: {0}")]
    DecodeError(#[from] DecodeError),

    /// Invalid magic number
    #[error("Invalid magic number: expected HWVM, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported version
    #[error("Unsupported version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),

    /// CRC32 mismatch
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Stored checksum value
        expected: u32,
        /// Computed checksum value
        actual: u32,
    },

    /// SHA-256 mismatch
    #[error("Content hash mismatch")]
    HashMismatch,

    /// Trailing bytes after the type table
    #[error("Unexpected {0} trailing bytes after module payload")]
    TrailingData(usize),

    /// I/O failure while reading a module file
    #[error("Failed to read module {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Module flags
pub mod flags {
    /// A `.hwsym` debug sidecar accompanies the module
    pub const HAS_DEBUG_INFO: u32 = 1 << 0;
    /// Methods have been rewritten with dispatch prologues
    pub const WOVEN: u32 = 1 << 1;
}

/// Type attribute flags
pub mod type_flags {
    /// Visible outside the module
    pub const PUBLIC: u32 = 1 << 0;
    /// Cannot be instantiated
    pub const ABSTRACT: u32 = 1 << 1;
    /// Cannot be derived from
    pub const SEALED: u32 = 1 << 2;
    /// Interface definition
    pub const INTERFACE: u32 = 1 << 3;
    /// Value type (struct)
    pub const VALUE_TYPE: u32 = 1 << 4;
    /// Enumeration
    pub const ENUM: u32 = 1 << 5;
}

/// Method attribute flags
///
/// The low three bits hold the access level.
pub mod method_flags {
    /// Access level mask
    pub const ACCESS_MASK: u32 = 0x0007;
    /// Accessible only from the declaring type
    pub const PRIVATE: u32 = 0x0001;
    /// Accessible from derived types inside the module
    pub const FAM_AND_ASSEM: u32 = 0x0002;
    /// Accessible inside the module
    pub const ASSEMBLY: u32 = 0x0003;
    /// Accessible from derived types (`protected`)
    pub const FAMILY: u32 = 0x0004;
    /// Accessible from derived types or inside the module
    pub const FAM_OR_ASSEM: u32 = 0x0005;
    /// Accessible everywhere
    pub const PUBLIC: u32 = 0x0006;
    /// No `this` argument
    pub const STATIC: u32 = 0x0010;
    /// Cannot be overridden further (`sealed override`)
    pub const FINAL: u32 = 0x0020;
    /// Dispatched through the runtime type
    pub const VIRTUAL: u32 = 0x0040;
    /// Hidden by name and signature
    pub const HIDE_BY_SIG: u32 = 0x0080;
    /// Introduces a new virtual slot instead of overriding
    pub const NEW_SLOT: u32 = 0x0100;
    /// No body
    pub const ABSTRACT: u32 = 0x0400;
    /// Name is special (accessors, operators)
    pub const SPECIAL_NAME: u32 = 0x0800;
    /// Name is special to the runtime (`.ctor`, `.cctor`)
    pub const RT_SPECIAL_NAME: u32 = 0x1000;
    /// Implemented by the runtime itself
    pub const INTERNAL_CALL: u32 = 0x2000;
}

/// Parameter attribute flags
pub mod param_flags {
    /// `in` parameter
    pub const IN: u8 = 1 << 0;
    /// `out` parameter
    pub const OUT: u8 = 1 << 1;
    /// Parameter has a default value
    pub const OPTIONAL: u8 = 1 << 4;
}

/// Field attribute flags
pub mod field_flags {
    /// Access level mask (same encoding as methods)
    pub const ACCESS_MASK: u16 = 0x0007;
    /// Private field
    pub const PRIVATE: u16 = 0x0001;
    /// Protected field
    pub const FAMILY: u16 = 0x0004;
    /// Public field
    pub const PUBLIC: u16 = 0x0006;
    /// Static field
    pub const STATIC: u16 = 0x0010;
}

/// Name of instance constructors
pub const CONSTRUCTOR_NAME: &str = ".ctor";

/// Name of type initializers
pub const TYPE_INITIALIZER_NAME: &str = ".cctor";

/// Index of a type definition within its module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Position in `Module::types`
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A compiled hotweave module
#[derive(Debug, Clone)]
pub struct Module {
    /// Magic number (must be "HWVM")
    pub magic: [u8; 4],
    /// Format version
    pub version: u32,
    /// Module flags
    pub flags: u32,
    /// Module metadata
    pub metadata: Metadata,
    /// Names of referenced modules
    pub references: Vec<String>,
    /// Type definitions
    pub types: Vec<TypeDef>,
    /// SHA-256 of the payload, filled by `encode`/`decode`
    pub checksum: [u8; 32],
}

/// Module metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Module name
    pub name: String,
    /// Source file path
    pub source_file: Option<String>,
}

impl Metadata {
    fn encode(&self, writer: &mut BytecodeWriter) {
        writer.emit_string(&self.name);
        match &self.source_file {
            Some(path) => {
                writer.emit_u8(1);
                writer.emit_string(path);
            }
            None => writer.emit_u8(0),
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>) -> Result<Self, DecodeError> {
        let name = reader.read_string()?;
        let source_file = if reader.read_bool()? {
            Some(reader.read_string()?)
        } else {
            None
        };
        Ok(Self { name, source_file })
    }
}

/// Type definition
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Fully qualified name
    pub name: String,
    /// Type attribute flags (see [`type_flags`])
    pub attributes: u32,
    /// Base type, `None` for interfaces and `System.Object`
    pub base: Option<TypeRef>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeRef>,
    /// Declared fields
    pub fields: Vec<FieldDef>,
    /// Declared methods
    pub methods: Vec<MethodDef>,
    /// Declared properties
    pub properties: Vec<PropertyDef>,
    /// Custom attribute type names
    pub custom_attributes: Vec<String>,
}

impl TypeDef {
    /// Create an empty type definition
    pub fn new(name: impl Into<String>, attributes: u32, base: Option<TypeRef>) -> Self {
        Self {
            name: name.into(),
            attributes,
            base,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            custom_attributes: Vec::new(),
        }
    }

    /// Type name without its namespace
    pub fn simple_name(&self) -> &str {
        simple_name(&self.name)
    }

    /// Reference to this type
    pub fn as_type_ref(&self) -> TypeRef {
        TypeRef {
            full_name: self.name.clone(),
            is_value_type: self.is_value_type(),
            is_by_ref: false,
        }
    }

    /// Check if the type is abstract
    pub fn is_abstract(&self) -> bool {
        self.attributes & type_flags::ABSTRACT != 0
    }

    /// Check if the type is sealed
    pub fn is_sealed(&self) -> bool {
        self.attributes & type_flags::SEALED != 0
    }

    /// Check if the type is an interface
    pub fn is_interface(&self) -> bool {
        self.attributes & type_flags::INTERFACE != 0
    }

    /// Check if the type is a value type
    pub fn is_value_type(&self) -> bool {
        self.attributes & type_flags::VALUE_TYPE != 0
    }

    /// Check if the type is an enum
    pub fn is_enum(&self) -> bool {
        self.attributes & type_flags::ENUM != 0
    }

    /// Check if the type carries a custom attribute
    pub fn has_attribute(&self, name: &str) -> bool {
        has_attribute(&self.custom_attributes, name)
    }

    /// Check if the type directly lists an interface
    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i.full_name == interface)
    }

    /// Find a method by name and parameter type names
    pub fn find_method(&self, name: &str, params: &[TypeRef]) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.param_types().eq(params.iter()))
    }

    /// Find a method by its method key
    pub fn find_method_by_key(&self, key: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.key() == key)
    }

    /// Find a field by name
    pub fn find_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Find a property by name
    pub fn find_property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Reference to a field declared on this type
    pub fn field_ref(&self, field: &FieldDef) -> FieldRef {
        FieldRef::new(self.as_type_ref(), field.name.clone(), field.field_type.clone())
    }

    fn encode(&self, writer: &mut BytecodeWriter, pool: &mut ConstantPool) {
        writer.emit_u32(pool.add_string(&self.name));
        writer.emit_u32(self.attributes);
        match &self.base {
            Some(base) => {
                writer.emit_u8(1);
                writer.emit_u32(pool.add_type(base));
            }
            None => writer.emit_u8(0),
        }
        writer.emit_u32(self.interfaces.len() as u32);
        for interface in &self.interfaces {
            writer.emit_u32(pool.add_type(interface));
        }
        encode_attributes(&self.custom_attributes, writer, pool);

        writer.emit_u32(self.fields.len() as u32);
        for field in &self.fields {
            writer.emit_u32(pool.add_string(&field.name));
            writer.emit_u32(pool.add_type(&field.field_type));
            writer.emit_u16(field.attributes);
        }

        writer.emit_u32(self.methods.len() as u32);
        for method in &self.methods {
            method.encode(writer, pool);
        }

        writer.emit_u32(self.properties.len() as u32);
        for property in &self.properties {
            writer.emit_u32(pool.add_string(&property.name));
            writer.emit_u32(pool.add_type(&property.property_type));
            encode_optional_name(property.getter.as_deref(), writer, pool);
            encode_optional_name(property.setter.as_deref(), writer, pool);
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>, pool: &ConstantPool) -> Result<Self, DecodeError> {
        let name = pool.string_at(reader.read_u32()?)?;
        let attributes = reader.read_u32()?;
        let base = if reader.read_bool()? {
            Some(pool.type_at(reader.read_u32()?)?)
        } else {
            None
        };
        let interface_count = reader.read_u32()? as usize;
        let mut interfaces = Vec::new();
        for _ in 0..interface_count {
            interfaces.push(pool.type_at(reader.read_u32()?)?);
        }
        let custom_attributes = decode_attributes(reader, pool)?;

        let field_count = reader.read_u32()? as usize;
        let mut fields = Vec::new();
        for _ in 0..field_count {
            fields.push(FieldDef {
                name: pool.string_at(reader.read_u32()?)?,
                field_type: pool.type_at(reader.read_u32()?)?,
                attributes: reader.read_u16()?,
            });
        }

        let method_count = reader.read_u32()? as usize;
        let mut methods = Vec::new();
        for _ in 0..method_count {
            methods.push(MethodDef::decode(reader, pool)?);
        }

        let property_count = reader.read_u32()? as usize;
        let mut properties = Vec::new();
        for _ in 0..property_count {
            properties.push(PropertyDef {
                name: pool.string_at(reader.read_u32()?)?,
                property_type: pool.type_at(reader.read_u32()?)?,
                getter: decode_optional_name(reader, pool)?,
                setter: decode_optional_name(reader, pool)?,
            });
        }

        Ok(Self {
            name,
            attributes,
            base,
            interfaces,
            fields,
            methods,
            properties,
            custom_attributes,
        })
    }
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: TypeRef,
    /// Field attribute flags (see [`field_flags`])
    pub attributes: u16,
}

impl FieldDef {
    /// Check if the field is static
    pub fn is_static(&self) -> bool {
        self.attributes & field_flags::STATIC != 0
    }
}

/// Property definition; accessors are named methods of the same type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDef {
    /// Property name
    pub name: String,
    /// Property type
    pub property_type: TypeRef,
    /// Getter method name
    pub getter: Option<String>,
    /// Setter method name
    pub setter: Option<String>,
}

/// Parameter definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDef {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub param_type: TypeRef,
    /// Parameter attribute flags (see [`param_flags`])
    pub attributes: u8,
}

impl ParamDef {
    /// Create a parameter
    pub fn new(name: impl Into<String>, param_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            param_type,
            attributes: 0,
        }
    }

    /// Check if the parameter has a default value
    pub fn is_optional(&self) -> bool {
        self.attributes & param_flags::OPTIONAL != 0
    }

    /// Check if the parameter is passed by reference
    pub fn is_by_ref(&self) -> bool {
        self.param_type.is_by_ref
    }
}

/// Method body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodBody {
    /// Zero-initialize locals on entry
    pub init_locals: bool,
    /// Local variable types
    pub locals: Vec<TypeRef>,
    /// Instruction stream
    pub instructions: Vec<Instruction>,
}

impl MethodBody {
    /// Create a body from instructions
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            init_locals: true,
            locals: Vec::new(),
            instructions,
        }
    }

    /// Append a local and return its slot, or `None` once every slot is taken
    pub fn add_local(&mut self, ty: TypeRef) -> Option<u16> {
        let slot = u16::try_from(self.locals.len()).ok()?;
        self.locals.push(ty);
        Some(slot)
    }

    /// Check if the body has no instructions
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

/// Method definition
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Method attribute flags (see [`method_flags`])
    pub attributes: u32,
    /// Return type
    pub return_type: TypeRef,
    /// Parameters
    pub params: Vec<ParamDef>,
    /// Body (empty for abstract and internal-call methods)
    pub body: MethodBody,
    /// Custom attribute type names
    pub custom_attributes: Vec<String>,
}

impl MethodDef {
    /// Create a method without body
    pub fn new(name: impl Into<String>, attributes: u32, return_type: TypeRef) -> Self {
        Self {
            name: name.into(),
            attributes,
            return_type,
            params: Vec::new(),
            body: MethodBody::default(),
            custom_attributes: Vec::new(),
        }
    }

    /// Access level (see [`method_flags::ACCESS_MASK`])
    pub fn access(&self) -> u32 {
        self.attributes & method_flags::ACCESS_MASK
    }

    /// Check if the method is static
    pub fn is_static(&self) -> bool {
        self.attributes & method_flags::STATIC != 0
    }

    /// Check if the method is virtual
    pub fn is_virtual(&self) -> bool {
        self.attributes & method_flags::VIRTUAL != 0
    }

    /// Check if the method is final
    pub fn is_final(&self) -> bool {
        self.attributes & method_flags::FINAL != 0
    }

    /// Check if the method is abstract
    pub fn is_abstract(&self) -> bool {
        self.attributes & method_flags::ABSTRACT != 0
    }

    /// Check if the method introduces a new virtual slot
    pub fn is_new_slot(&self) -> bool {
        self.attributes & method_flags::NEW_SLOT != 0
    }

    /// Check if the method has a special name
    pub fn is_special_name(&self) -> bool {
        self.attributes & (method_flags::SPECIAL_NAME | method_flags::RT_SPECIAL_NAME) != 0
    }

    /// Check if the runtime implements the method
    pub fn is_internal_call(&self) -> bool {
        self.attributes & method_flags::INTERNAL_CALL != 0
    }

    /// Check if the method is an instance constructor
    pub fn is_constructor(&self) -> bool {
        !self.is_static() && self.name == CONSTRUCTOR_NAME
    }

    /// Check if the method is a type initializer
    pub fn is_type_initializer(&self) -> bool {
        self.is_static() && self.name == TYPE_INITIALIZER_NAME
    }

    /// Check if the method is expected to carry an instruction stream
    pub fn has_body(&self) -> bool {
        !self.is_abstract() && !self.is_internal_call()
    }

    /// Check if the method takes `this`
    pub fn has_this(&self) -> bool {
        !self.is_static()
    }

    /// Number of argument slots (`this` included)
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(self.has_this())
    }

    /// Argument slot of the parameter at `index`, if it fits in a `u16`
    pub fn param_slot(&self, index: usize) -> Option<u16> {
        u16::try_from(index + usize::from(self.has_this())).ok()
    }

    /// Parameter types in declaration order
    pub fn param_types(&self) -> impl Iterator<Item = &TypeRef> + '_ {
        self.params.iter().map(|p| &p.param_type)
    }

    /// Method key (name plus parameter type names)
    pub fn key(&self) -> String {
        let names: Vec<String> = self.param_types().map(TypeRef::signature_name).collect();
        method_key(&self.name, &names)
    }

    /// Check if any parameter is by-reference
    pub fn has_by_ref_params(&self) -> bool {
        self.params.iter().any(ParamDef::is_by_ref)
    }

    /// Check if any parameter is optional
    pub fn has_optional_params(&self) -> bool {
        self.params.iter().any(ParamDef::is_optional)
    }

    /// Check if the method carries a custom attribute
    pub fn has_attribute(&self, name: &str) -> bool {
        has_attribute(&self.custom_attributes, name)
    }

    /// Same name and parameter types
    pub fn same_params(&self, other: &MethodDef) -> bool {
        self.name == other.name && self.param_types().eq(other.param_types())
    }

    /// Same name, parameter types and return type
    pub fn signature_eq(&self, other: &MethodDef) -> bool {
        self.same_params(other) && self.return_type == other.return_type
    }

    /// Reference to this method as declared on (or inherited by) `declaring_type`
    pub fn reference(&self, declaring_type: TypeRef) -> MethodRef {
        MethodRef {
            declaring_type,
            name: self.name.clone(),
            has_this: self.has_this(),
            return_type: self.return_type.clone(),
            params: self.param_types().cloned().collect(),
        }
    }

    fn encode(&self, writer: &mut BytecodeWriter, pool: &mut ConstantPool) {
        writer.emit_u32(pool.add_string(&self.name));
        writer.emit_u32(self.attributes);
        writer.emit_u32(pool.add_type(&self.return_type));
        writer.emit_u32(self.params.len() as u32);
        for param in &self.params {
            writer.emit_u32(pool.add_string(&param.name));
            writer.emit_u32(pool.add_type(&param.param_type));
            writer.emit_u8(param.attributes);
        }
        encode_attributes(&self.custom_attributes, writer, pool);

        writer.emit_bool(self.body.init_locals);
        writer.emit_u32(self.body.locals.len() as u32);
        for local in &self.body.locals {
            writer.emit_u32(pool.add_type(local));
        }
        writer.emit_u32(self.body.instructions.len() as u32);
        for instr in &self.body.instructions {
            encode_instruction(instr, writer, pool);
        }
    }

    fn decode(reader: &mut BytecodeReader<'_>, pool: &ConstantPool) -> Result<Self, DecodeError> {
        let name = pool.string_at(reader.read_u32()?)?;
        let attributes = reader.read_u32()?;
        let return_type = pool.type_at(reader.read_u32()?)?;
        let param_count = reader.read_u32()? as usize;
        let mut params = Vec::new();
        for _ in 0..param_count {
            params.push(ParamDef {
                name: pool.string_at(reader.read_u32()?)?,
                param_type: pool.type_at(reader.read_u32()?)?,
                attributes: reader.read_u8()?,
            });
        }
        let custom_attributes = decode_attributes(reader, pool)?;

        let init_locals = reader.read_bool()?;
        let local_count = reader.read_u32()? as usize;
        let mut locals = Vec::new();
        for _ in 0..local_count {
            locals.push(pool.type_at(reader.read_u32()?)?);
        }
        let instr_count = reader.read_u32()? as usize;
        let mut instructions = Vec::new();
        for _ in 0..instr_count {
            instructions.push(decode_instruction(reader, pool)?);
        }

        Ok(Self {
            name,
            attributes,
            return_type,
            params,
            body: MethodBody {
                init_locals,
                locals,
                instructions,
            },
            custom_attributes,
        })
    }
}

/// Attribute lookup accepting either the full name or the simple name
fn has_attribute(attributes: &[String], name: &str) -> bool {
    attributes
        .iter()
        .any(|a| a == name || simple_name(a) == name)
}

fn encode_attributes(attributes: &[String], writer: &mut BytecodeWriter, pool: &mut ConstantPool) {
    writer.emit_u32(attributes.len() as u32);
    for attribute in attributes {
        writer.emit_u32(pool.add_string(attribute));
    }
}

fn decode_attributes(
    reader: &mut BytecodeReader<'_>,
    pool: &ConstantPool,
) -> Result<Vec<String>, DecodeError> {
    let count = reader.read_u32()? as usize;
    let mut attributes = Vec::new();
    for _ in 0..count {
        attributes.push(pool.string_at(reader.read_u32()?)?);
    }
    Ok(attributes)
}

fn encode_optional_name(name: Option<&str>, writer: &mut BytecodeWriter, pool: &mut ConstantPool) {
    match name {
        Some(name) => {
            writer.emit_u8(1);
            writer.emit_u32(pool.add_string(name));
        }
        None => writer.emit_u8(0),
    }
}

fn decode_optional_name(
    reader: &mut BytecodeReader<'_>,
    pool: &ConstantPool,
) -> Result<Option<String>, DecodeError> {
    if reader.read_bool()? {
        Ok(Some(pool.string_at(reader.read_u32()?)?))
    } else {
        Ok(None)
    }
}

/// Encode one instruction: opcode byte, then the operand its kind calls for
fn encode_instruction(instr: &Instruction, writer: &mut BytecodeWriter, pool: &mut ConstantPool) {
    writer.emit_opcode(instr.opcode);
    match &instr.operand {
        Operand::None => {}
        Operand::I32(v) => writer.emit_i32(*v),
        Operand::I64(v) => writer.emit_i64(*v),
        Operand::F64(v) => writer.emit_f64(*v),
        Operand::String(s) => writer.emit_u32(pool.add_string(s)),
        Operand::Variable(i) => writer.emit_u16(*i),
        Operand::Target(t) => writer.emit_u32(*t),
        Operand::Type(ty) => writer.emit_u32(pool.add_type(ty)),
        Operand::Field(field) => writer.emit_u32(pool.add_field(field)),
        Operand::Method(method) => writer.emit_u32(pool.add_method(method)),
    }
}

fn decode_instruction(
    reader: &mut BytecodeReader<'_>,
    pool: &ConstantPool,
) -> Result<Instruction, DecodeError> {
    let opcode = reader.read_opcode()?;
    let operand = match opcode.operand_kind() {
        OperandKind::None => Operand::None,
        OperandKind::I32 => Operand::I32(reader.read_i32()?),
        OperandKind::I64 => Operand::I64(reader.read_i64()?),
        OperandKind::F64 => Operand::F64(reader.read_f64()?),
        OperandKind::String => Operand::String(pool.string_at(reader.read_u32()?)?),
        OperandKind::Variable => Operand::Variable(reader.read_u16()?),
        OperandKind::Target => Operand::Target(reader.read_u32()?),
        OperandKind::Type => Operand::Type(pool.type_at(reader.read_u32()?)?),
        OperandKind::Field => Operand::Field(pool.field_at(reader.read_u32()?)?),
        OperandKind::Method => Operand::Method(pool.method_at(reader.read_u32()?)?),
    };
    Ok(Instruction::new(opcode, operand))
}

impl Module {
    /// Create a new empty module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            metadata: Metadata {
                name: name.into(),
                source_file: None,
            },
            references: Vec::new(),
            types: Vec::new(),
            checksum: [0; 32],
        }
    }

    /// Module name
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Validate module structure
    pub fn validate(&self) -> Result<(), String> {
        if self.magic != MAGIC {
            return Err("Invalid magic number".to_string());
        }
        if self.version != VERSION {
            return Err(format!("Unsupported version: {}", self.version));
        }
        let mut seen = rustc_hash::FxHashSet::default();
        for ty in &self.types {
            if !seen.insert(ty.name.as_str()) {
                return Err(format!("Duplicate type definition: {}", ty.name));
            }
        }
        Ok(())
    }

    /// Check if the module has already been woven
    pub fn is_woven(&self) -> bool {
        self.flags & flags::WOVEN != 0
    }

    /// Add a module reference unless already present
    pub fn add_reference(&mut self, name: &str) {
        if !self.references.iter().any(|r| r == name) {
            self.references.push(name.to_string());
        }
    }

    /// Append a type definition
    pub fn add_type(&mut self, ty: TypeDef) -> TypeId {
        self.types.push(ty);
        TypeId((self.types.len() - 1) as u32)
    }

    /// Look up a type definition by full name
    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        self.types
            .iter()
            .position(|t| t.name == name)
            .map(|i| TypeId(i as u32))
    }

    /// All type ids in definition order
    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len() as u32).map(TypeId)
    }

    /// Borrow a type definition
    pub fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.index()]
    }

    /// Mutably borrow a type definition
    pub fn type_def_mut(&mut self, id: TypeId) -> &mut TypeDef {
        &mut self.types[id.index()]
    }

    /// Encode the module to binary format (.hwm)
    ///
    /// Format:
    /// - Header: magic (4 bytes) + version (u32) + flags (u32) + crc32 (u32) + sha256 (32 bytes)
    /// - Constant pool
    /// - Metadata
    /// - Reference table
    /// - Type table
    ///
    /// The type table is written first into a side buffer so that every name it
    /// mentions is interned before the pool is emitted.
    pub fn encode(&self) -> Vec<u8> {
        let mut pool = ConstantPool::new();
        let mut body = BytecodeWriter::new();

        self.metadata.encode(&mut body);
        body.emit_u32(self.references.len() as u32);
        for reference in &self.references {
            body.emit_string(reference);
        }
        body.emit_u32(self.types.len() as u32);
        for ty in &self.types {
            ty.encode(&mut body, &mut pool);
        }

        let mut writer = BytecodeWriter::with_capacity(HEADER_SIZE + body.offset());
        writer.emit_bytes(&self.magic);
        writer.emit_u32(self.version);
        writer.emit_u32(self.flags);
        let crc32_offset = writer.reserve_u32();
        let sha256_offset = writer.offset();
        writer.emit_bytes(&[0u8; 32]);

        pool.encode(&mut writer);
        writer.emit_bytes(body.buffer());

        let payload = &writer.buffer[HEADER_SIZE..];
        let crc32 = crc32fast::hash(payload);
        let hash: [u8; 32] = Sha256::digest(payload).into();

        writer.patch_u32(crc32_offset, crc32);
        writer.buffer[sha256_offset..sha256_offset + 32].copy_from_slice(&hash);

        writer.into_bytes()
    }

    /// Decode a module from binary format
    pub fn decode(data: &[u8]) -> Result<Self, ModuleError> {
        let mut reader = BytecodeReader::new(data);

        let magic: [u8; 4] = reader.read_array()?;
        if magic != MAGIC {
            return Err(ModuleError::InvalidMagic(magic));
        }

        let version = reader.read_u32()?;
        if version != VERSION {
            return Err(ModuleError::UnsupportedVersion(version));
        }

        let flags = reader.read_u32()?;
        let stored_crc32 = reader.read_u32()?;
        let checksum: [u8; 32] = reader.read_array()?;

        let payload = &data[HEADER_SIZE..];
        let calculated_crc32 = crc32fast::hash(payload);
        if stored_crc32 != calculated_crc32 {
            return Err(ModuleError::ChecksumMismatch {
                expected: stored_crc32,
                actual: calculated_crc32,
            });
        }
        if Sha256::digest(payload).as_slice() != checksum {
            return Err(ModuleError::HashMismatch);
        }

        let pool = ConstantPool::decode(&mut reader)?;
        let metadata = Metadata::decode(&mut reader)?;

        let reference_count = reader.read_u32()? as usize;
        let mut references = Vec::new();
        for _ in 0..reference_count {
            references.push(reader.read_string()?);
        }

        let type_count = reader.read_u32()? as usize;
        let mut types = Vec::new();
        for _ in 0..type_count {
            types.push(TypeDef::decode(&mut reader, &pool)?);
        }

        if reader.has_more() {
            return Err(ModuleError::TrailingData(reader.remaining()));
        }

        Ok(Self {
            magic,
            version,
            flags,
            metadata,
            references,
            types,
            checksum,
        })
    }

    /// Read and decode a module file
    pub fn load(path: &Path) -> Result<Self, ModuleError> {
        let bytes = std::fs::read(path).map_err(|source| ModuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MethodBuilder, TypeBuilder};

    fn sample_module() -> Module {
        let mut module = Module::new("Zoo");
        module.add_reference("Zoo.Common");
        module.add_type(
            TypeBuilder::class("Zoo.Animal")
                .field("name", TypeRef::string())
                .method(
                    MethodBuilder::new("Speak")
                        .virtual_slot()
                        .returns(TypeRef::string())
                        .code(vec![Instruction::ldstr("..."), Instruction::ret()])
                        .build(),
                )
                .build(),
        );
        module
    }

    #[test]
    fn test_module_creation() {
        let module = Module::new("test");
        assert_eq!(module.magic, MAGIC);
        assert_eq!(module.version, VERSION);
        assert_eq!(module.flags, 0);
        assert!(module.validate().is_ok());
        assert!(!module.is_woven());
    }

    #[test]
    fn test_empty_module_encoding() {
        let module = Module::new("test_module");
        let bytes = module.encode();
        assert_eq!(&bytes[..4], b"HWVM");

        let decoded = Module::decode(&bytes).unwrap();
        assert_eq!(decoded.metadata.name, "test_module");
        assert!(decoded.types.is_empty());
    }

    #[test]
    fn test_module_with_types_roundtrip() {
        let module = sample_module();
        let decoded = Module::decode(&module.encode()).unwrap();

        assert_eq!(decoded.references, vec!["Zoo.Common".to_string()]);
        assert_eq!(decoded.types, module.types);
        assert_ne!(decoded.checksum, [0; 32]);
    }

    #[test]
    fn test_module_checksum_validation() {
        let mut bytes = sample_module().encode();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        assert!(matches!(
            Module::decode(&bytes),
            Err(ModuleError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = Module::new("x").encode();
        bytes[0] = b'X';
        assert!(matches!(
            Module::decode(&bytes),
            Err(ModuleError::InvalidMagic(_))
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = Module::new("x").encode();
        bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            Module::decode(&bytes),
            Err(ModuleError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            Module::decode(b"HWVM"),
            Err(ModuleError::DecodeError(DecodeError::UnexpectedEnd(4)))
        ));
    }

    #[test]
    fn test_duplicate_types_fail_validation() {
        let mut module = sample_module();
        let dup = module.types[0].clone();
        module.add_type(dup);
        assert!(module.validate().is_err());
    }

    #[test]
    fn test_find_type_and_method() {
        let module = sample_module();
        let id = module.find_type("Zoo.Animal").unwrap();
        let animal = module.type_def(id);
        assert_eq!(animal.simple_name(), "Animal");
        assert!(animal.find_method("Speak", &[]).is_some());
        assert!(animal.find_method_by_key("Speak()").is_some());
        assert!(module.find_type("Zoo.Cat").is_none());
    }

    // ===== Method keys =====

    #[test]
    fn test_key_ignores_return_type() {
        let as_string = MethodBuilder::new("Parse")
            .param("text", TypeRef::string())
            .returns(TypeRef::string())
            .build();
        let as_int = MethodBuilder::new("Parse")
            .param("text", TypeRef::string())
            .returns(TypeRef::int32())
            .build();
        assert_eq!(as_string.key(), as_int.key());
        assert_eq!(as_string.key(), "Parse(System.String)");

        let owner = TypeRef::class("Zoo.Parser");
        let ref_string = MethodRef::instance(
            owner.clone(),
            "Parse",
            TypeRef::string(),
            vec![TypeRef::string()],
        );
        let ref_void = MethodRef::instance(owner, "Parse", TypeRef::void(), vec![TypeRef::string()]);
        assert_eq!(ref_string.key(), ref_void.key());
        assert_eq!(ref_string.key(), as_int.key());
    }

    // ===== Slots =====

    #[test]
    fn test_param_slot_bounds() {
        let instance = MethodBuilder::new("Run").build();
        assert_eq!(instance.param_slot(0), Some(1));
        assert_eq!(instance.param_slot(usize::from(u16::MAX) - 1), Some(u16::MAX));
        assert_eq!(instance.param_slot(usize::from(u16::MAX)), None);

        let stat = MethodBuilder::new("Run").static_member().build();
        assert_eq!(stat.param_slot(usize::from(u16::MAX)), Some(u16::MAX));
        assert_eq!(stat.param_slot(usize::from(u16::MAX) + 1), None);
    }

    #[test]
    fn test_add_local_stops_at_last_slot() {
        let mut body = MethodBody::new(vec![Instruction::ret()]);
        body.locals = vec![TypeRef::int32(); usize::from(u16::MAX)];
        assert_eq!(body.add_local(TypeRef::string()), Some(u16::MAX));
        assert_eq!(body.add_local(TypeRef::string()), None);
        assert_eq!(body.locals.len(), usize::from(u16::MAX) + 1);
    }
}
