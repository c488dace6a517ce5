//! Structural verification
//!
//! Checks every method body for operand/opcode agreement, valid branch
//! targets, in-range argument and local slots, and a consistent evaluation
//! stack depth along every control-flow path.

use crate::instruction::{Instruction, Operand};
use crate::module::{MethodDef, Module};
use crate::opcode::Opcode;

/// Maximum evaluation stack depth
pub const MAX_STACK_DEPTH: usize = 1024;

/// Verification errors
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Operand does not match what the opcode expects
    #[error("Operand mismatch for {opcode} at offset {offset}")]
    OperandMismatch {
        /// Opcode mnemonic
        opcode: &'static str,
        /// Instruction index
        offset: usize,
    },

    /// Stack underflow
    #[error("Stack underflow at offset {0}")]
    StackUnderflow(usize),

    /// Stack overflow
    #[error("Stack overflow at offset {0} (depth: {1})")]
    StackOverflow(usize, usize),

    /// Paths reach an instruction with different stack depths
    #[error("Inconsistent stack depth at offset {offset}: {expected} vs {actual}")]
    StackMismatch {
        /// Instruction index
        offset: usize,
        /// Depth recorded first
        expected: usize,
        /// Depth on the conflicting path
        actual: usize,
    },

    /// `ret` with the wrong number of values on the stack
    #[error("Return at offset {offset} with stack depth {depth}")]
    BadReturn {
        /// Instruction index
        offset: usize,
        /// Depth at the return
        depth: usize,
    },

    /// Invalid jump target
    #[error("Invalid jump target {target} at offset {offset}")]
    InvalidJumpTarget {
        /// Target index
        target: usize,
        /// Instruction index
        offset: usize,
    },

    /// Invalid local variable reference
    #[error("Invalid local variable reference: index {index} (max {max}) at offset {offset}")]
    InvalidLocalRef {
        /// Slot
        index: usize,
        /// Number of locals
        max: usize,
        /// Instruction index
        offset: usize,
    },

    /// Invalid argument reference
    #[error("Invalid argument reference: index {index} (max {max}) at offset {offset}")]
    InvalidArgRef {
        /// Slot
        index: usize,
        /// Number of arguments
        max: usize,
        /// Instruction index
        offset: usize,
    },

    /// Method that needs a body has none
    #[error("Method has an empty body")]
    EmptyBody,

    /// Execution falls off end
    #[error("Execution falls off end of method at offset {0}")]
    FallOffEnd(usize),

    /// Error inside a specific method
    #[error("{method}: {source}")]
    InMethod {
        /// `Type::Method(key)`
        method: String,
        /// Underlying error
        #[source]
        source: Box<VerifyError>,
    },

    /// Module validation error
    #[error("Module validation error: {0}")]
    ModuleValidation(String),
}

/// Verify every method body of a module
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    module.validate().map_err(VerifyError::ModuleValidation)?;

    for ty in &module.types {
        for method in &ty.methods {
            verify_method(method).map_err(|e| VerifyError::InMethod {
                method: format!("{}::{}", ty.name, method.key()),
                source: Box::new(e),
            })?;
        }
    }
    Ok(())
}

/// Verify a single method
pub fn verify_method(method: &MethodDef) -> Result<(), VerifyError> {
    let code = &method.body.instructions;
    if !method.has_body() {
        return Ok(());
    }
    if code.is_empty() {
        return Err(VerifyError::EmptyBody);
    }

    for (offset, instr) in code.iter().enumerate() {
        verify_operand(instr, offset)?;
        verify_slots(method, instr, offset)?;
        if let Some(target) = instr.branch_target() {
            if target as usize >= code.len() {
                return Err(VerifyError::InvalidJumpTarget {
                    target: target as usize,
                    offset,
                });
            }
        }
    }

    verify_stack_depth(method)
}

fn verify_operand(instr: &Instruction, offset: usize) -> Result<(), VerifyError> {
    if instr.operand.kind() != instr.opcode.operand_kind() {
        return Err(VerifyError::OperandMismatch {
            opcode: instr.opcode.name(),
            offset,
        });
    }
    Ok(())
}

fn verify_slots(method: &MethodDef, instr: &Instruction, offset: usize) -> Result<(), VerifyError> {
    let Operand::Variable(index) = instr.operand else {
        return Ok(());
    };
    let index = index as usize;
    match instr.opcode {
        Opcode::LdLoc | Opcode::StLoc => {
            let max = method.body.locals.len();
            if index >= max {
                return Err(VerifyError::InvalidLocalRef { index, max, offset });
            }
        }
        Opcode::LdArg | Opcode::StArg => {
            let max = method.arg_count();
            if index >= max {
                return Err(VerifyError::InvalidArgRef { index, max, offset });
            }
        }
        _ => {}
    }
    Ok(())
}

/// Values popped and pushed by an instruction
fn stack_effect(instr: &Instruction) -> (usize, usize) {
    match instr.opcode {
        Opcode::Nop | Opcode::Br => (0, 0),
        Opcode::Pop | Opcode::StArg | Opcode::StLoc => (1, 0),
        Opcode::BrTrue | Opcode::BrFalse | Opcode::Throw => (1, 0),
        Opcode::Dup => (1, 2),
        Opcode::LdNull
        | Opcode::LdcI4
        | Opcode::LdcI8
        | Opcode::LdcR8
        | Opcode::LdStr
        | Opcode::LdArg
        | Opcode::LdLoc
        | Opcode::LdToken => (0, 1),
        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Rem
        | Opcode::Ceq
        | Opcode::Cgt
        | Opcode::CgtUn
        | Opcode::Clt => (2, 1),
        Opcode::LdFld
        | Opcode::Box
        | Opcode::UnboxAny
        | Opcode::CastClass
        | Opcode::NewArr
        | Opcode::LdLen => (1, 1),
        Opcode::StFld => (2, 0),
        Opcode::LdElemRef => (2, 1),
        Opcode::StElemRef => (3, 0),
        Opcode::Call | Opcode::CallVirt => match instr.method() {
            Some(m) => (m.stack_arguments(), usize::from(m.returns_value())),
            None => (0, 0),
        },
        Opcode::NewObj => match instr.method() {
            Some(m) => (m.params.len(), 1),
            None => (0, 1),
        },
        // Checked separately against the method's return type
        Opcode::Ret => (0, 0),
    }
}

/// Dataflow over the instruction graph recording the depth at each index
fn verify_stack_depth(method: &MethodDef) -> Result<(), VerifyError> {
    let code = &method.body.instructions;
    let expected_return = usize::from(!method.return_type.is_void());
    let mut depths: Vec<Option<usize>> = vec![None; code.len()];
    let mut worklist = vec![(0usize, 0usize)];

    while let Some((offset, depth)) = worklist.pop() {
        if offset >= code.len() {
            return Err(VerifyError::FallOffEnd(offset.saturating_sub(1)));
        }
        match depths[offset] {
            Some(seen) if seen == depth => continue,
            Some(seen) => {
                return Err(VerifyError::StackMismatch {
                    offset,
                    expected: seen,
                    actual: depth,
                })
            }
            None => depths[offset] = Some(depth),
        }

        let instr = &code[offset];
        if instr.opcode == Opcode::Ret {
            if depth != expected_return {
                return Err(VerifyError::BadReturn { offset, depth });
            }
            continue;
        }

        let (pops, pushes) = stack_effect(instr);
        if depth < pops {
            return Err(VerifyError::StackUnderflow(offset));
        }
        let next_depth = depth - pops + pushes;
        if next_depth > MAX_STACK_DEPTH {
            return Err(VerifyError::StackOverflow(offset, next_depth));
        }

        if !instr.opcode.is_terminator() {
            worklist.push((offset + 1, next_depth));
        }
        if let Some(target) = instr.branch_target() {
            worklist.push((target as usize, next_depth));
        }
    }
    Ok(())
}
