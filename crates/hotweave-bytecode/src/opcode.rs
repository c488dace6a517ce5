//! Instruction opcodes
//!
//! This module defines the instruction set of the hotweave stack machine. The
//! set mirrors the subset of a managed-runtime IL that compiled class libraries
//! need and that the weaver emits: typed argument/local access, field access,
//! static/virtual calls, object creation, boxing, type tokens and object arrays.

/// Bytecode opcode enumeration
///
/// All opcodes are single-byte. The kind of operand that follows the opcode in
/// the encoded stream is given by [`Opcode::operand_kind`].
///
/// Opcodes are organized into categories:
/// - 0x00-0x0F: Stack manipulation & constants
/// - 0x10-0x1F: Arguments and locals
/// - 0x20-0x2F: Arithmetic
/// - 0x30-0x3F: Comparison
/// - 0x40-0x4F: Control flow
/// - 0x50-0x5F: Calls
/// - 0x60-0x6F: Fields
/// - 0x70-0x7F: Type operations
/// - 0x80-0x8F: Arrays
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // ===== Stack Manipulation & Constants (0x00-0x0F) =====
    /// No operation
    Nop = 0x00,
    /// Pop top value from stack
    Pop = 0x01,
    /// Duplicate top stack value
    Dup = 0x02,
    /// Push null reference
    LdNull = 0x03,
    /// Push 32-bit integer constant (operand: i32)
    LdcI4 = 0x04,
    /// Push 64-bit integer constant (operand: i64)
    LdcI8 = 0x05,
    /// Push 64-bit float constant (operand: f64)
    LdcR8 = 0x06,
    /// Push string literal (operand: string pool index)
    LdStr = 0x07,

    // ===== Arguments and Locals (0x10-0x1F) =====
    /// Load argument (operand: u16 index, 0 is `this` for instance methods)
    LdArg = 0x10,
    /// Store to argument (operand: u16 index)
    StArg = 0x11,
    /// Load local variable (operand: u16 index)
    LdLoc = 0x12,
    /// Store to local variable (operand: u16 index)
    StLoc = 0x13,

    // ===== Arithmetic (0x20-0x2F) =====
    /// Addition: pop b, pop a, push a + b
    Add = 0x20,
    /// Subtraction: pop b, pop a, push a - b
    Sub = 0x21,
    /// Multiplication: pop b, pop a, push a * b
    Mul = 0x22,
    /// Division: pop b, pop a, push a / b
    Div = 0x23,
    /// Remainder: pop b, pop a, push a % b
    Rem = 0x24,

    // ===== Comparison (0x30-0x3F) =====
    /// Equality: pop b, pop a, push a == b
    Ceq = 0x30,
    /// Greater than: pop b, pop a, push a > b
    Cgt = 0x31,
    /// Unsigned/unordered greater than (also `ref != null`)
    CgtUn = 0x32,
    /// Less than: pop b, pop a, push a < b
    Clt = 0x33,

    // ===== Control Flow (0x40-0x4F) =====
    /// Unconditional branch (operand: instruction index)
    Br = 0x40,
    /// Branch if top of stack is true/non-null/non-zero (operand: instruction index)
    BrTrue = 0x41,
    /// Branch if top of stack is false/null/zero (operand: instruction index)
    BrFalse = 0x42,
    /// Return from method (pops the return value for non-void methods)
    Ret = 0x43,
    /// Throw the exception object on top of the stack
    Throw = 0x44,

    // ===== Calls (0x50-0x5F) =====
    /// Non-virtual call (operand: method reference)
    Call = 0x50,
    /// Virtual call dispatched on the runtime type of `this` (operand: method reference)
    CallVirt = 0x51,
    /// Allocate an object and run its constructor (operand: constructor reference)
    NewObj = 0x52,

    // ===== Fields (0x60-0x6F) =====
    /// Load instance field: pop obj, push obj.field (operand: field reference)
    LdFld = 0x60,
    /// Store instance field: pop value, pop obj (operand: field reference)
    StFld = 0x61,

    // ===== Type Operations (0x70-0x7F) =====
    /// Box a value type (operand: type reference)
    Box = 0x70,
    /// Unbox to a value type (operand: type reference)
    UnboxAny = 0x71,
    /// Checked reference cast (operand: type reference)
    CastClass = 0x72,
    /// Push a runtime type handle (operand: type reference)
    LdToken = 0x73,

    // ===== Arrays (0x80-0x8F) =====
    /// Create a one-dimensional array: pop length (operand: element type)
    NewArr = 0x80,
    /// Load array element: pop index, pop array, push element
    LdElemRef = 0x81,
    /// Store array element: pop value, pop index, pop array
    StElemRef = 0x82,
    /// Push array length: pop array
    LdLen = 0x83,
}

/// The kind of operand that follows an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 64-bit float
    F64,
    /// String literal
    String,
    /// Argument or local slot (u16)
    Variable,
    /// Branch target (instruction index)
    Target,
    /// Type reference
    Type,
    /// Field reference
    Field,
    /// Method reference
    Method,
}

impl Opcode {
    /// Convert byte to opcode
    ///
    /// Returns None if the byte does not correspond to a valid opcode.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Nop),
            0x01 => Some(Self::Pop),
            0x02 => Some(Self::Dup),
            0x03 => Some(Self::LdNull),
            0x04 => Some(Self::LdcI4),
            0x05 => Some(Self::LdcI8),
            0x06 => Some(Self::LdcR8),
            0x07 => Some(Self::LdStr),

            0x10 => Some(Self::LdArg),
            0x11 => Some(Self::StArg),
            0x12 => Some(Self::LdLoc),
            0x13 => Some(Self::StLoc),

            0x20 => Some(Self::Add),
            0x21 => Some(Self::Sub),
            0x22 => Some(Self::Mul),
            0x23 => Some(Self::Div),
            0x24 => Some(Self::Rem),

            0x30 => Some(Self::Ceq),
            0x31 => Some(Self::Cgt),
            0x32 => Some(Self::CgtUn),
            0x33 => Some(Self::Clt),

            0x40 => Some(Self::Br),
            0x41 => Some(Self::BrTrue),
            0x42 => Some(Self::BrFalse),
            0x43 => Some(Self::Ret),
            0x44 => Some(Self::Throw),

            0x50 => Some(Self::Call),
            0x51 => Some(Self::CallVirt),
            0x52 => Some(Self::NewObj),

            0x60 => Some(Self::LdFld),
            0x61 => Some(Self::StFld),

            0x70 => Some(Self::Box),
            0x71 => Some(Self::UnboxAny),
            0x72 => Some(Self::CastClass),
            0x73 => Some(Self::LdToken),

            0x80 => Some(Self::NewArr),
            0x81 => Some(Self::LdElemRef),
            0x82 => Some(Self::StElemRef),
            0x83 => Some(Self::LdLen),

            _ => None,
        }
    }

    /// Convert opcode to byte
    #[inline]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Get the human-readable mnemonic of the opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Pop => "pop",
            Self::Dup => "dup",
            Self::LdNull => "ldnull",
            Self::LdcI4 => "ldc.i4",
            Self::LdcI8 => "ldc.i8",
            Self::LdcR8 => "ldc.r8",
            Self::LdStr => "ldstr",
            Self::LdArg => "ldarg",
            Self::StArg => "starg",
            Self::LdLoc => "ldloc",
            Self::StLoc => "stloc",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::Ceq => "ceq",
            Self::Cgt => "cgt",
            Self::CgtUn => "cgt.un",
            Self::Clt => "clt",
            Self::Br => "br",
            Self::BrTrue => "brtrue",
            Self::BrFalse => "brfalse",
            Self::Ret => "ret",
            Self::Throw => "throw",
            Self::Call => "call",
            Self::CallVirt => "callvirt",
            Self::NewObj => "newobj",
            Self::LdFld => "ldfld",
            Self::StFld => "stfld",
            Self::Box => "box",
            Self::UnboxAny => "unbox.any",
            Self::CastClass => "castclass",
            Self::LdToken => "ldtoken",
            Self::NewArr => "newarr",
            Self::LdElemRef => "ldelem.ref",
            Self::StElemRef => "stelem.ref",
            Self::LdLen => "ldlen",
        }
    }

    /// Operand that follows this opcode in the instruction stream
    pub fn operand_kind(self) -> OperandKind {
        match self {
            Self::LdcI4 => OperandKind::I32,
            Self::LdcI8 => OperandKind::I64,
            Self::LdcR8 => OperandKind::F64,
            Self::LdStr => OperandKind::String,
            Self::LdArg | Self::StArg | Self::LdLoc | Self::StLoc => OperandKind::Variable,
            Self::Br | Self::BrTrue | Self::BrFalse => OperandKind::Target,
            Self::Call | Self::CallVirt | Self::NewObj => OperandKind::Method,
            Self::LdFld | Self::StFld => OperandKind::Field,
            Self::Box | Self::UnboxAny | Self::CastClass | Self::LdToken | Self::NewArr => {
                OperandKind::Type
            }
            _ => OperandKind::None,
        }
    }

    /// Check if this opcode is a branch instruction
    pub fn is_branch(self) -> bool {
        matches!(self, Self::Br | Self::BrTrue | Self::BrFalse)
    }

    /// Check if this opcode is a conditional branch
    pub fn is_conditional_branch(self) -> bool {
        matches!(self, Self::BrTrue | Self::BrFalse)
    }

    /// Check if this opcode is a call instruction
    pub fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::CallVirt | Self::NewObj)
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        matches!(self, Self::Br | Self::Ret | Self::Throw)
    }
}
