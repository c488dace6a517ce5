//! Hotweave Module Format
//!
//! This crate provides the stack-machine instruction set, the in-memory module
//! document (types, methods, fields, instruction streams) and its checksummed
//! binary encoding (`.hwm`), plus the pieces shared verbatim between the weaver
//! and the runtime:
//! - **Method keys** (`method_key`): the canonical lookup identity of a method
//! - **Runtime contract** (`contract`): names of the external runtime services
//! - **Core library** (`corlib`): `System.Object` and the other root types

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod builder;
pub mod constants;
pub mod contract;
pub mod corlib;
pub mod debug;
pub mod encoder;
pub mod instruction;
pub mod method_key;
pub mod module;
pub mod opcode;
pub mod verify;

pub use builder::{MethodBuilder, TypeBuilder};
pub use constants::ConstantPool;
pub use debug::{DebugSymbols, MethodSymbols, SequencePoint};
pub use encoder::{BytecodeReader, BytecodeWriter, DecodeError};
pub use instruction::{FieldRef, Instruction, MethodRef, Operand, TypeRef};
pub use method_key::method_key;
pub use module::{
    FieldDef, Metadata, MethodBody, MethodDef, Module, ModuleError, ParamDef, PropertyDef,
    TypeDef, TypeId,
};
pub use opcode::{OperandKind, Opcode};
pub use verify::{verify_method, verify_module, VerifyError};
