//! Instructions and symbolic references
//!
//! Instructions carry their operands symbolically: branch targets are
//! instruction indices within the owning body, and type/field/method operands
//! are full-name references that the encoder interns into the reference pool.

use crate::corlib;
use crate::method_key::method_key;
use crate::opcode::{OperandKind, Opcode};
use std::fmt;

/// Reference to a type by full name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    /// Fully qualified name (`Namespace.Name`)
    pub full_name: String,
    /// Whether the type is a value type (needs boxing to become an object)
    pub is_value_type: bool,
    /// Whether this is a by-reference (`ref`/`out`) form of the type
    pub is_by_ref: bool,
}

impl TypeRef {
    /// Reference to a class (reference type)
    pub fn class(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            is_value_type: false,
            is_by_ref: false,
        }
    }

    /// Reference to a value type
    pub fn value(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            is_value_type: true,
            is_by_ref: false,
        }
    }

    /// By-reference form of this type
    pub fn by_ref(mut self) -> Self {
        self.is_by_ref = true;
        self
    }

    /// One-dimensional array of `element`
    pub fn array_of(element: &TypeRef) -> Self {
        Self::class(format!("{}[]", element.full_name))
    }

    /// `System.Void`
    pub fn void() -> Self {
        Self::value(corlib::VOID)
    }

    /// `System.Object`
    pub fn object() -> Self {
        Self::class(corlib::OBJECT)
    }

    /// `System.String`
    pub fn string() -> Self {
        Self::class(corlib::STRING)
    }

    /// `System.Int32`
    pub fn int32() -> Self {
        Self::value(corlib::INT32)
    }

    /// `System.Int64`
    pub fn int64() -> Self {
        Self::value(corlib::INT64)
    }

    /// `System.Double`
    pub fn double() -> Self {
        Self::value(corlib::DOUBLE)
    }

    /// `System.Boolean`
    pub fn boolean() -> Self {
        Self::value(corlib::BOOLEAN)
    }

    /// `System.Type`
    pub fn system_type() -> Self {
        Self::class(corlib::TYPE)
    }

    /// `System.Delegate`
    pub fn delegate() -> Self {
        Self::class(corlib::DELEGATE)
    }

    /// `System.Object[]`
    pub fn object_array() -> Self {
        Self::array_of(&Self::object())
    }

    /// Check if this is `System.Void`
    pub fn is_void(&self) -> bool {
        self.full_name == corlib::VOID
    }

    /// Check if this is an array type
    pub fn is_array(&self) -> bool {
        self.full_name.ends_with("[]")
    }

    /// Element type of an array type
    pub fn element_type(&self) -> Option<TypeRef> {
        self.full_name
            .strip_suffix("[]")
            .map(|name| TypeRef::class(name))
    }

    /// Type name without its namespace
    pub fn simple_name(&self) -> &str {
        simple_name(&self.full_name)
    }

    /// Name used in method keys and signatures (`&` suffix for by-ref)
    pub fn signature_name(&self) -> String {
        if self.is_by_ref {
            format!("{}&", self.full_name)
        } else {
            self.full_name.clone()
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name)?;
        if self.is_by_ref {
            write!(f, "&")?;
        }
        Ok(())
    }
}

/// Name after the last namespace separator
pub fn simple_name(full_name: &str) -> &str {
    full_name.rsplit('.').next().unwrap_or(full_name)
}

/// Reference to a field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Type declaring the field
    pub declaring_type: TypeRef,
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: TypeRef,
}

impl FieldRef {
    /// Create a field reference
    pub fn new(declaring_type: TypeRef, name: impl Into<String>, field_type: TypeRef) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            field_type,
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}::{}",
            self.field_type, self.declaring_type, self.name
        )
    }
}

/// Reference to a method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Type declaring (or inheriting) the method
    pub declaring_type: TypeRef,
    /// Method name
    pub name: String,
    /// Whether the method takes `this`
    pub has_this: bool,
    /// Return type
    pub return_type: TypeRef,
    /// Parameter types
    pub params: Vec<TypeRef>,
}

impl MethodRef {
    /// Reference to an instance method
    pub fn instance(
        declaring_type: TypeRef,
        name: impl Into<String>,
        return_type: TypeRef,
        params: Vec<TypeRef>,
    ) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            has_this: true,
            return_type,
            params,
        }
    }

    /// Reference to a static method
    pub fn static_method(
        declaring_type: TypeRef,
        name: impl Into<String>,
        return_type: TypeRef,
        params: Vec<TypeRef>,
    ) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            has_this: false,
            return_type,
            params,
        }
    }

    /// Reference to an instance constructor
    pub fn constructor(declaring_type: TypeRef, params: Vec<TypeRef>) -> Self {
        Self::instance(declaring_type, ".ctor", TypeRef::void(), params)
    }

    /// Method key of the referenced method
    pub fn key(&self) -> String {
        let names: Vec<String> = self.params.iter().map(TypeRef::signature_name).collect();
        method_key(&self.name, &names)
    }

    /// Check if this refers to an instance constructor
    pub fn is_constructor(&self) -> bool {
        self.has_this && self.name == ".ctor"
    }

    /// Check if a call leaves a value on the stack
    pub fn returns_value(&self) -> bool {
        !self.return_type.is_void()
    }

    /// Number of stack slots consumed by a call (`this` included)
    pub fn stack_arguments(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_this {
            write!(f, "instance ")?;
        }
        write!(
            f,
            "{} {}::{}(",
            self.return_type, self.declaring_type, self.name
        )?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", param)?;
        }
        write!(f, ")")
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// 32-bit integer constant
    I32(i32),
    /// 64-bit integer constant
    I64(i64),
    /// 64-bit float constant
    F64(f64),
    /// String literal
    String(String),
    /// Argument or local slot
    Variable(u16),
    /// Branch target (instruction index)
    Target(u32),
    /// Type reference
    Type(TypeRef),
    /// Field reference
    Field(FieldRef),
    /// Method reference
    Method(MethodRef),
}

impl Operand {
    /// Kind of this operand
    pub fn kind(&self) -> OperandKind {
        match self {
            Operand::None => OperandKind::None,
            Operand::I32(_) => OperandKind::I32,
            Operand::I64(_) => OperandKind::I64,
            Operand::F64(_) => OperandKind::F64,
            Operand::String(_) => OperandKind::String,
            Operand::Variable(_) => OperandKind::Variable,
            Operand::Target(_) => OperandKind::Target,
            Operand::Type(_) => OperandKind::Type,
            Operand::Field(_) => OperandKind::Field,
            Operand::Method(_) => OperandKind::Method,
        }
    }
}

/// A single stack-machine instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Operation
    pub opcode: Opcode,
    /// Operand, matching `opcode.operand_kind()`
    pub operand: Operand,
}

impl Instruction {
    /// Create an instruction
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        Self { opcode, operand }
    }

    /// Create an operand-less instruction
    pub fn simple(opcode: Opcode) -> Self {
        Self::new(opcode, Operand::None)
    }

    // ===== Constructors =====

    /// `nop`
    pub fn nop() -> Self {
        Self::simple(Opcode::Nop)
    }

    /// `pop`
    pub fn pop() -> Self {
        Self::simple(Opcode::Pop)
    }

    /// `dup`
    pub fn dup() -> Self {
        Self::simple(Opcode::Dup)
    }

    /// `ldnull`
    pub fn ldnull() -> Self {
        Self::simple(Opcode::LdNull)
    }

    /// `ldc.i4 value`
    pub fn ldc_i4(value: i32) -> Self {
        Self::new(Opcode::LdcI4, Operand::I32(value))
    }

    /// `ldc.i8 value`
    pub fn ldc_i8(value: i64) -> Self {
        Self::new(Opcode::LdcI8, Operand::I64(value))
    }

    /// `ldc.r8 value`
    pub fn ldc_r8(value: f64) -> Self {
        Self::new(Opcode::LdcR8, Operand::F64(value))
    }

    /// `ldstr value`
    pub fn ldstr(value: impl Into<String>) -> Self {
        Self::new(Opcode::LdStr, Operand::String(value.into()))
    }

    /// `ldarg index`
    pub fn ldarg(index: u16) -> Self {
        Self::new(Opcode::LdArg, Operand::Variable(index))
    }

    /// `starg index`
    pub fn starg(index: u16) -> Self {
        Self::new(Opcode::StArg, Operand::Variable(index))
    }

    /// `ldloc index`
    pub fn ldloc(index: u16) -> Self {
        Self::new(Opcode::LdLoc, Operand::Variable(index))
    }

    /// `stloc index`
    pub fn stloc(index: u16) -> Self {
        Self::new(Opcode::StLoc, Operand::Variable(index))
    }

    /// `br target`
    pub fn br(target: u32) -> Self {
        Self::new(Opcode::Br, Operand::Target(target))
    }

    /// `brtrue target`
    pub fn brtrue(target: u32) -> Self {
        Self::new(Opcode::BrTrue, Operand::Target(target))
    }

    /// `brfalse target`
    pub fn brfalse(target: u32) -> Self {
        Self::new(Opcode::BrFalse, Operand::Target(target))
    }

    /// `ret`
    pub fn ret() -> Self {
        Self::simple(Opcode::Ret)
    }

    /// `throw`
    pub fn throw() -> Self {
        Self::simple(Opcode::Throw)
    }

    /// `call method`
    pub fn call(method: MethodRef) -> Self {
        Self::new(Opcode::Call, Operand::Method(method))
    }

    /// `callvirt method`
    pub fn callvirt(method: MethodRef) -> Self {
        Self::new(Opcode::CallVirt, Operand::Method(method))
    }

    /// `newobj ctor`
    pub fn newobj(ctor: MethodRef) -> Self {
        Self::new(Opcode::NewObj, Operand::Method(ctor))
    }

    /// `ldfld field`
    pub fn ldfld(field: FieldRef) -> Self {
        Self::new(Opcode::LdFld, Operand::Field(field))
    }

    /// `stfld field`
    pub fn stfld(field: FieldRef) -> Self {
        Self::new(Opcode::StFld, Operand::Field(field))
    }

    /// `box type`
    pub fn box_value(ty: TypeRef) -> Self {
        Self::new(Opcode::Box, Operand::Type(ty))
    }

    /// `unbox.any type`
    pub fn unbox_any(ty: TypeRef) -> Self {
        Self::new(Opcode::UnboxAny, Operand::Type(ty))
    }

    /// `castclass type`
    pub fn castclass(ty: TypeRef) -> Self {
        Self::new(Opcode::CastClass, Operand::Type(ty))
    }

    /// `ldtoken type`
    pub fn ldtoken(ty: TypeRef) -> Self {
        Self::new(Opcode::LdToken, Operand::Type(ty))
    }

    /// `newarr element`
    pub fn newarr(element: TypeRef) -> Self {
        Self::new(Opcode::NewArr, Operand::Type(element))
    }

    // ===== Queries =====

    /// Branch target, if this is a branch
    pub fn branch_target(&self) -> Option<u32> {
        match (&self.operand, self.opcode.is_branch()) {
            (Operand::Target(target), true) => Some(*target),
            _ => None,
        }
    }

    /// Same instruction with a new branch target
    pub fn with_target(&self, target: u32) -> Self {
        Self::new(self.opcode, Operand::Target(target))
    }

    /// Slot index for argument/local access
    pub fn variable(&self) -> Option<u16> {
        match self.operand {
            Operand::Variable(index) => Some(index),
            _ => None,
        }
    }

    /// Method operand of call instructions
    pub fn method(&self) -> Option<&MethodRef> {
        match &self.operand {
            Operand::Method(method) => Some(method),
            _ => None,
        }
    }

    /// Store instruction writing the slot this load reads from
    ///
    /// Only `ldloc` and `ldarg` have a counterpart.
    pub fn store_counterpart(&self) -> Option<Instruction> {
        match (self.opcode, &self.operand) {
            (Opcode::LdLoc, Operand::Variable(index)) => Some(Self::stloc(*index)),
            (Opcode::LdArg, Operand::Variable(index)) => Some(Self::starg(*index)),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode.name())?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::I32(v) => write!(f, " {}", v),
            Operand::I64(v) => write!(f, " {}", v),
            Operand::F64(v) => write!(f, " {}", v),
            Operand::String(s) => write!(f, " {:?}", s),
            Operand::Variable(i) => write!(f, " {}", i),
            Operand::Target(t) => write!(f, " IL_{:04}", t),
            Operand::Type(t) => write!(f, " {}", t),
            Operand::Field(field) => write!(f, " {}", field),
            Operand::Method(m) => write!(f, " {}", m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ref_names() {
        let ty = TypeRef::class("Zoo.Animals.Dog");
        assert_eq!(ty.simple_name(), "Dog");
        assert_eq!(TypeRef::int32().by_ref().signature_name(), "System.Int32&");
        assert!(TypeRef::void().is_void());
        assert_eq!(TypeRef::object_array().full_name, "System.Object[]");
        assert_eq!(
            TypeRef::object_array().element_type(),
            Some(TypeRef::object())
        );
    }

    #[test]
    fn test_method_ref_key_excludes_return_type() {
        let a = MethodRef::instance(
            TypeRef::class("Zoo.Dog"),
            "Fetch",
            TypeRef::string(),
            vec![TypeRef::int32()],
        );
        let mut b = a.clone();
        b.return_type = TypeRef::void();
        assert_eq!(a.key(), "Fetch(System.Int32)");
        assert_eq!(a.key(), b.key());
        assert_eq!(a.stack_arguments(), 2);
    }

    #[test]
    fn test_branch_retarget() {
        let br = Instruction::brfalse(3);
        assert_eq!(br.branch_target(), Some(3));
        assert_eq!(br.with_target(9).branch_target(), Some(9));
        assert_eq!(Instruction::ldloc(1).branch_target(), None);
    }

    #[test]
    fn test_store_counterpart() {
        assert_eq!(
            Instruction::ldloc(2).store_counterpart(),
            Some(Instruction::stloc(2))
        );
        assert_eq!(
            Instruction::ldarg(1).store_counterpart(),
            Some(Instruction::starg(1))
        );
        assert_eq!(Instruction::ldnull().store_counterpart(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::ldstr("...").to_string(), "ldstr \"...\"");
        assert_eq!(Instruction::br(12).to_string(), "br IL_0012");
        let ctor = MethodRef::constructor(TypeRef::object(), vec![]);
        assert_eq!(
            Instruction::call(ctor).to_string(),
            "call instance System.Void System.Object::.ctor()"
        );
    }
}
