//! Instruction composer
//!
//! A fluent builder for instruction sequences with symbolic branch labels.
//! Sequences can be appended to one another, an existing method body can be
//! spliced in with its branches relinked to labels, and `finish` resolves all
//! labels to absolute instruction indices.

use hotweave_bytecode::{FieldRef, Instruction, MethodRef, Opcode, Operand, TypeRef};
use rustc_hash::FxHashMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

static NEXT_LABEL: AtomicU32 = AtomicU32::new(0);

/// Symbolic branch target
///
/// Labels are unique across composers so sequences can be appended freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(u32);

impl Label {
    /// Allocate a fresh label
    pub fn new() -> Self {
        Label(NEXT_LABEL.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for Label {
    fn default() -> Self {
        Self::new()
    }
}

/// Composition errors
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Branch to a label that was never marked
    #[error("Branch to unresolved label {0:?}")]
    UnresolvedLabel(Label),

    /// Label marked twice
    #[error("Label {0:?} marked more than once")]
    DuplicateMark(Label),

    /// Branch to a label marked past the last instruction
    #[error("Label {0:?} does not precede any instruction")]
    DanglingLabel(Label),

    /// Spliced body branches outside itself
    #[error("Branch target {target} outside body of {len} instructions")]
    TargetOutOfRange {
        /// Target index
        target: u32,
        /// Body length
        len: usize,
    },
}

#[derive(Debug, Clone)]
enum Item {
    Plain(Instruction),
    Branch(Opcode, Label),
}

/// Fluent instruction sequence builder
#[derive(Debug)]
pub struct InstructionComposer {
    items: Vec<Item>,
    marks: FxHashMap<Label, usize>,
    entry: Label,
}

/// Result of [`InstructionComposer::finish`]
#[derive(Debug, Clone)]
pub struct ComposedBody {
    /// Resolved instructions
    pub instructions: Vec<Instruction>,
    marks: FxHashMap<Label, u32>,
}

impl ComposedBody {
    /// Final index of a marked label
    pub fn position(&self, label: Label) -> Option<u32> {
        self.marks.get(&label).copied()
    }
}

impl InstructionComposer {
    /// Create an empty composer
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            marks: FxHashMap::default(),
            entry: Label::new(),
        }
    }

    /// Label of the first instruction of this sequence, wherever it ends up
    pub fn entry(&self) -> Label {
        self.entry
    }

    /// Number of instructions composed so far
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if nothing has been composed
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Mark the next instruction with `label`
    pub fn mark(&mut self, label: Label) -> Result<&mut Self, ComposeError> {
        if self.marks.insert(label, self.items.len()).is_some() {
            return Err(ComposeError::DuplicateMark(label));
        }
        Ok(self)
    }

    /// Append a raw instruction
    pub fn emit(&mut self, instr: Instruction) -> &mut Self {
        self.items.push(Item::Plain(instr));
        self
    }

    /// Append another sequence; its entry label now points at its first instruction here
    pub fn append(&mut self, other: InstructionComposer) -> Result<&mut Self, ComposeError> {
        let offset = self.items.len();
        self.mark(other.entry)?;
        for (label, pos) in other.marks {
            if self.marks.insert(label, pos + offset).is_some() {
                return Err(ComposeError::DuplicateMark(label));
            }
        }
        self.items.extend(other.items);
        Ok(self)
    }

    /// Allocate one label per instruction of an existing body
    pub fn labels_for(code: &[Instruction]) -> Vec<Label> {
        code.iter().map(|_| Label::new()).collect()
    }

    /// Splice `code[range]`, marking each instruction with its label and
    /// relinking every branch to the label of its original target.
    pub fn splice(
        &mut self,
        code: &[Instruction],
        labels: &[Label],
        range: Range<usize>,
    ) -> Result<&mut Self, ComposeError> {
        for index in range {
            self.mark(labels[index])?;
            let instr = &code[index];
            match instr.branch_target() {
                Some(target) => {
                    let label = labels.get(target as usize).copied().ok_or(
                        ComposeError::TargetOutOfRange {
                            target,
                            len: code.len(),
                        },
                    )?;
                    self.items.push(Item::Branch(instr.opcode, label));
                }
                None => self.items.push(Item::Plain(instr.clone())),
            }
        }
        Ok(self)
    }

    /// Resolve labels into absolute instruction indices
    pub fn finish(mut self) -> Result<ComposedBody, ComposeError> {
        self.marks.entry(self.entry).or_insert(0);
        let len = self.items.len();

        let mut instructions = Vec::with_capacity(len);
        for item in self.items {
            instructions.push(match item {
                Item::Plain(instr) => instr,
                Item::Branch(opcode, label) => {
                    let target = *self
                        .marks
                        .get(&label)
                        .ok_or(ComposeError::UnresolvedLabel(label))?;
                    if target >= len {
                        return Err(ComposeError::DanglingLabel(label));
                    }
                    Instruction::new(opcode, Operand::Target(target as u32))
                }
            });
        }

        let marks = self
            .marks
            .into_iter()
            .map(|(label, pos)| (label, pos as u32))
            .collect();
        Ok(ComposedBody {
            instructions,
            marks,
        })
    }

    // ===== Loads and Stores =====

    /// Load `this`
    pub fn load_this(&mut self) -> &mut Self {
        self.emit(Instruction::ldarg(0))
    }

    /// Load an argument slot
    pub fn load_arg(&mut self, slot: u16) -> &mut Self {
        self.emit(Instruction::ldarg(slot))
    }

    /// Load a local
    pub fn load_local(&mut self, slot: u16) -> &mut Self {
        self.emit(Instruction::ldloc(slot))
    }

    /// Store to a local
    pub fn store_local(&mut self, slot: u16) -> &mut Self {
        self.emit(Instruction::stloc(slot))
    }

    /// Load an instance field
    pub fn load_field(&mut self, field: FieldRef) -> &mut Self {
        self.emit(Instruction::ldfld(field))
    }

    /// Store an instance field
    pub fn store_field(&mut self, field: FieldRef) -> &mut Self {
        self.emit(Instruction::stfld(field))
    }

    /// Load a string literal
    pub fn load_str(&mut self, value: impl Into<String>) -> &mut Self {
        self.emit(Instruction::ldstr(value))
    }

    /// Load an integer constant
    pub fn load_int(&mut self, value: i32) -> &mut Self {
        self.emit(Instruction::ldc_i4(value))
    }

    /// Load null
    pub fn load_null(&mut self) -> &mut Self {
        self.emit(Instruction::ldnull())
    }

    /// Load a runtime type handle
    pub fn load_token(&mut self, ty: TypeRef) -> &mut Self {
        self.emit(Instruction::ldtoken(ty))
    }

    // ===== Calls and Objects =====

    /// Allocate an object
    pub fn new_object(&mut self, ctor: MethodRef) -> &mut Self {
        self.emit(Instruction::newobj(ctor))
    }

    /// Non-virtual call to a static method
    pub fn static_call(&mut self, method: MethodRef) -> &mut Self {
        self.emit(Instruction::call(method))
    }

    /// Virtual call to an instance method
    pub fn instance_call(&mut self, method: MethodRef) -> &mut Self {
        self.emit(Instruction::callvirt(method))
    }

    /// Non-virtual call to an inherited implementation
    pub fn base_call(&mut self, method: MethodRef) -> &mut Self {
        self.emit(Instruction::call(method))
    }

    /// Box a value type, leave references untouched
    pub fn box_if_value(&mut self, ty: &TypeRef) -> &mut Self {
        if ty.is_value_type {
            self.emit(Instruction::box_value(ty.clone()));
        }
        self
    }

    /// Convert an object back to `ty`: unbox value types, cast references
    pub fn unbox_or_cast(&mut self, ty: &TypeRef) -> &mut Self {
        if ty.is_value_type {
            self.emit(Instruction::unbox_any(ty.clone()))
        } else {
            self.emit(Instruction::castclass(ty.clone()))
        }
    }

    /// Build an `object[]` from `(slot, type)` pairs, boxing value types
    pub fn load_object_array(&mut self, items: &[(u16, TypeRef)]) -> &mut Self {
        self.load_int(items.len() as i32)
            .emit(Instruction::newarr(TypeRef::object()));
        for (i, (slot, ty)) in items.iter().enumerate() {
            self.emit(Instruction::dup())
                .load_int(i as i32)
                .load_arg(*slot)
                .box_if_value(ty)
                .emit(Instruction::simple(Opcode::StElemRef));
        }
        self
    }

    // ===== Comparison and Control Flow =====

    /// Compare the two top values for equality
    pub fn equal(&mut self) -> &mut Self {
        self.emit(Instruction::simple(Opcode::Ceq))
    }

    /// Replace the top reference with `ref != null`
    pub fn is_not_null(&mut self) -> &mut Self {
        self.load_null().emit(Instruction::simple(Opcode::CgtUn))
    }

    /// Unconditional branch
    pub fn branch(&mut self, label: Label) -> &mut Self {
        self.items.push(Item::Branch(Opcode::Br, label));
        self
    }

    /// Branch when the top value is false or null
    pub fn branch_if_false(&mut self, label: Label) -> &mut Self {
        self.items.push(Item::Branch(Opcode::BrFalse, label));
        self
    }

    /// Branch when the top value is true or non-null
    pub fn branch_if_true(&mut self, label: Label) -> &mut Self {
        self.items.push(Item::Branch(Opcode::BrTrue, label));
        self
    }

    /// No operation
    pub fn nop(&mut self) -> &mut Self {
        self.emit(Instruction::nop())
    }

    /// Discard the top value
    pub fn pop(&mut self) -> &mut Self {
        self.emit(Instruction::pop())
    }

    /// Return
    pub fn ret(&mut self) -> &mut Self {
        self.emit(Instruction::ret())
    }
}

impl Default for InstructionComposer {
    fn default() -> Self {
        Self::new()
    }
}
