//! Method weaving
//!
//! A woven method starts with a dispatcher prologue:
//!
//! ```text
//! key  = "Name(T1,T2)"
//! del  = GetInstanceMethod(key)              // instance methods
//!      | Runtime.GetMethodDelegate(T, key)   // static methods
//! if virtual && this.GetType().GetMethodDeclaringType(key) != typeof(T): del = null
//! if (del != null) return (R)del.DynamicInvoke(new object[] { this?, a1, a2 });
//! <original body>
//! ```
//!
//! The original instructions follow unchanged, with their branches relinked
//! to the shifted positions. Constructors keep their base/this constructor
//! call ahead of the prologue and record their arguments first.
//!
//! A virtual method runs on a derived instance either through its slot, when
//! no class below it redeclares the method, or through a base call (such as a
//! `HotReloadingBase_` shim) from a redeclaring class. Only the first path
//! dispatches; the instance map holds one entry per key and that entry belongs
//! to the redeclaring class.

use crate::composer::{ComposeError, InstructionComposer, Label};
use crate::error::{WeaveError, WeaveResult};
use hotweave_bytecode::module::method_flags;
use hotweave_bytecode::{
    contract, FieldRef, Instruction, MethodDef, MethodRef, Opcode, ParamDef, TypeRef,
};

/// Where the prologue looks for a replacement
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// `this.GetInstanceMethod(key)`
    Instance {
        /// Helper to call
        accessor: MethodRef,
    },
    /// `Runtime.GetMethodDelegate(typeof(T), key)`
    Static,
}

/// Rewrite `method` in place with a dispatcher prologue
///
/// `ctor_field` receives the captured arguments of constructors. Returns, for
/// every original instruction, its index in the woven body.
pub fn weave_method(
    method: &mut MethodDef,
    declaring: &TypeRef,
    dispatch: &Dispatch,
    ctor_field: Option<&FieldRef>,
) -> WeaveResult<Vec<u32>> {
    let name = format!("{}::{}", declaring, method.key());
    let invalid = |reason| WeaveError::InvalidBody {
        method: name.clone(),
        reason,
    };
    let code = std::mem::take(&mut method.body.instructions);
    let last = match code.last() {
        None => return Err(invalid("empty body")),
        Some(instr) if instr.opcode != Opcode::Ret => {
            return Err(invalid("body does not end in ret"))
        }
        Some(_) => code.len() - 1,
    };

    let prefix_len = if method.is_constructor() {
        constructor_prefix_len(&code)
    } else {
        0
    };
    let key = method.key();
    let labels = InstructionComposer::labels_for(&code);

    let mut add_local = |ty: TypeRef| {
        method
            .body
            .add_local(ty)
            .ok_or_else(|| invalid("too many locals"))
    };
    let key_slot = add_local(TypeRef::string())?;
    let delegate_slot = add_local(TypeRef::delegate())?;
    let flag_slot = add_local(TypeRef::boolean())?;
    method.body.init_locals = true;

    let mut composer = InstructionComposer::new();
    composer.splice(&code, &labels, 0..prefix_len)?;

    if let (true, Some(field)) = (method.is_constructor(), ctor_field) {
        capture_arguments(&mut composer, method, field)?;
    }

    composer.load_str(key).store_local(key_slot);
    match dispatch {
        Dispatch::Instance { accessor } => {
            composer
                .load_this()
                .load_local(key_slot)
                .base_call(accessor.clone());
            if method.is_virtual() {
                redeclared_slot_guard(&mut composer, declaring, key_slot)?;
            }
        }
        Dispatch::Static => {
            composer
                .load_token(declaring.clone())
                .static_call(contract::get_type_from_handle())
                .load_local(key_slot)
                .static_call(contract::get_method_delegate());
        }
    }
    composer
        .store_local(delegate_slot)
        .load_local(delegate_slot)
        .is_not_null()
        .store_local(flag_slot)
        .load_local(flag_slot)
        .branch_if_false(labels[prefix_len])
        .nop()
        .load_local(delegate_slot)
        .load_object_array(&invoke_arguments(method, declaring)?)
        .instance_call(contract::dynamic_invoke());

    if method.return_type.is_void() {
        composer.pop().branch(labels[last]);
    } else {
        composer.unbox_or_cast(&method.return_type);
        // `ldloc r; ret` tails: store into r and rejoin at the load
        let reload = last
            .checked_sub(1)
            .filter(|&i| i >= prefix_len)
            .and_then(|i| code[i].store_counterpart().map(|store| (i, store)));
        match reload {
            Some((load, store)) => {
                composer.emit(store).branch(labels[load]);
            }
            None => {
                composer.branch(labels[last]);
            }
        }
    }

    composer.splice(&code, &labels, prefix_len..code.len())?;
    let body = composer.finish()?;

    let positions = labels
        .iter()
        .map(|label| {
            body.position(*label)
                .ok_or(ComposeError::UnresolvedLabel(*label))
        })
        .collect::<Result<Vec<_>, _>>()?;
    method.body.instructions = body.instructions;
    Ok(positions)
}

/// Drop the delegate when a class below `declaring` redeclares the method
fn redeclared_slot_guard(
    composer: &mut InstructionComposer,
    declaring: &TypeRef,
    key_slot: u16,
) -> Result<(), ComposeError> {
    let own = Label::new();
    composer
        .load_this()
        .base_call(contract::get_type())
        .load_local(key_slot)
        .base_call(contract::get_method_declaring_type())
        .load_token(declaring.clone())
        .static_call(contract::get_type_from_handle())
        .equal()
        .branch_if_true(own)
        .pop()
        .load_null();
    composer.mark(own)?;
    Ok(())
}

/// Instructions up to and including the first constructor call
fn constructor_prefix_len(code: &[Instruction]) -> usize {
    code.iter()
        .position(|instr| {
            instr.opcode == Opcode::Call && instr.method().is_some_and(MethodRef::is_constructor)
        })
        .map_or(0, |i| i + 1)
}

/// Argument slot of parameter `index`, refusing slots past `u16::MAX`
fn param_slot(method: &MethodDef, index: usize) -> WeaveResult<u16> {
    method.param_slot(index).ok_or_else(|| WeaveError::InvalidBody {
        method: method.key(),
        reason: "too many parameters",
    })
}

/// `field = new ArrayList(); field.Add(arg)...`
fn capture_arguments(
    composer: &mut InstructionComposer,
    method: &MethodDef,
    field: &FieldRef,
) -> WeaveResult<()> {
    composer
        .load_this()
        .new_object(contract::array_list_ctor())
        .store_field(field.clone());
    for (index, param) in method.params.iter().enumerate() {
        composer
            .load_this()
            .load_field(field.clone())
            .load_arg(param_slot(method, index)?)
            .box_if_value(&param.param_type)
            .instance_call(contract::array_list_add())
            .pop();
    }
    Ok(())
}

/// Argument slots passed to the replacement: `this` first, then parameters
fn invoke_arguments(method: &MethodDef, declaring: &TypeRef) -> WeaveResult<Vec<(u16, TypeRef)>> {
    let mut items = Vec::with_capacity(method.arg_count());
    if method.has_this() {
        items.push((0, declaring.clone()));
    }
    for (index, param) in method.params.iter().enumerate() {
        items.push((param_slot(method, index)?, param.param_type.clone()));
    }
    Ok(items)
}

/// `ldarg.0` followed by every parameter
fn load_all_arguments(method: &MethodDef) -> WeaveResult<Vec<Instruction>> {
    let mut code = vec![Instruction::ldarg(0)];
    for index in 0..method.params.len() {
        code.push(Instruction::ldarg(param_slot(method, index)?));
    }
    Ok(code)
}

/// Forward every argument to `target` with a non-virtual call
fn forwarding_body(method: &mut MethodDef, target: MethodRef) -> WeaveResult<()> {
    let mut code = load_all_arguments(method)?;
    code.push(Instruction::call(target));
    if !method.return_type.is_void() {
        let slot = method
            .body
            .add_local(method.return_type.clone())
            .ok_or_else(|| WeaveError::InvalidBody {
                method: method.key(),
                reason: "too many locals",
            })?;
        code.push(Instruction::stloc(slot));
        code.push(Instruction::ldloc(slot));
    }
    code.push(Instruction::ret());
    method.body.instructions = code;
    method.body.init_locals = !method.body.locals.is_empty();
    Ok(())
}

/// Override of an inherited method that calls the base implementation
///
/// Access and virtual flags are copied from `base`; the new slot flag is
/// cleared so the override replaces the inherited slot.
pub fn override_method(base: &MethodDef, base_ref: MethodRef) -> WeaveResult<MethodDef> {
    let mut method = MethodDef::new(
        base.name.clone(),
        base.attributes
            & !(method_flags::NEW_SLOT | method_flags::ABSTRACT | method_flags::INTERNAL_CALL),
        base.return_type.clone(),
    );
    method.params = base.params.clone();
    forwarding_body(&mut method, base_ref)?;
    Ok(method)
}

/// Private `HotReloadingBase_<name>` method calling the base implementation
pub fn base_call_shim(signature: &MethodDef, base_ref: MethodRef) -> WeaveResult<MethodDef> {
    let mut method = MethodDef::new(
        format!("{}{}", contract::BASE_CALL_PREFIX, signature.name),
        method_flags::PRIVATE | method_flags::HIDE_BY_SIG,
        signature.return_type.clone(),
    );
    method.params = signature
        .params
        .iter()
        .map(|p| ParamDef::new(p.name.clone(), p.param_type.clone()))
        .collect();

    let mut code = load_all_arguments(&method)?;
    code.push(Instruction::call(base_ref));
    code.push(Instruction::ret());
    method.body.instructions = code;
    Ok(method)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotweave_bytecode::{verify_method, MethodBuilder};

    fn dog() -> TypeRef {
        TypeRef::class("Zoo.Dog")
    }

    fn instance_dispatch() -> Dispatch {
        Dispatch::Instance {
            accessor: MethodRef::instance(
                dog(),
                contract::GET_INSTANCE_METHOD,
                TypeRef::delegate(),
                vec![TypeRef::string()],
            ),
        }
    }

    fn speak() -> MethodDef {
        MethodBuilder::new("Speak")
            .virtual_slot()
            .returns(TypeRef::string())
            .local(TypeRef::string())
            .code(vec![
                Instruction::ldstr("..."),
                Instruction::stloc(0),
                Instruction::ldloc(0),
                Instruction::ret(),
            ])
            .build()
    }

    #[test]
    fn test_prologue_shape() {
        let mut method = speak();
        let positions = weave_method(&mut method, &dog(), &instance_dispatch(), None).unwrap();
        let code = &method.body.instructions;

        assert_eq!(code[0], Instruction::ldstr("Speak()"));
        assert_eq!(code[1], Instruction::stloc(1));
        assert_eq!(code[2], Instruction::ldarg(0));
        assert_eq!(code[3], Instruction::ldloc(1));
        assert_eq!(code[4].opcode, Opcode::Call);
        // Virtual: the delegate is dropped when a subclass redeclares the slot
        assert_eq!(code[5], Instruction::ldarg(0));
        assert_eq!(code[6], Instruction::call(contract::get_type()));
        assert_eq!(code[7], Instruction::ldloc(1));
        assert_eq!(code[8], Instruction::call(contract::get_method_declaring_type()));
        assert_eq!(code[9], Instruction::ldtoken(dog()));
        assert_eq!(method.body.locals.len(), 4);

        // The original body is shifted as a block
        assert_eq!(positions.len(), 4);
        let shift = positions[0];
        assert_eq!(positions, vec![shift, shift + 1, shift + 2, shift + 3]);
        assert_eq!(code[shift as usize], Instruction::ldstr("..."));
        assert_eq!(code[(shift - 2) as usize], Instruction::stloc(0));
        assert_eq!(code[(shift - 1) as usize], Instruction::br(shift + 2));

        verify_method(&method).unwrap();
    }

    #[test]
    fn test_non_virtual_method_has_no_slot_guard() {
        let mut method = MethodBuilder::new("Walk")
            .code(vec![Instruction::nop(), Instruction::ret()])
            .build();
        weave_method(&mut method, &dog(), &instance_dispatch(), None).unwrap();
        assert!(!method
            .body
            .instructions
            .contains(&Instruction::call(contract::get_method_declaring_type())));
        verify_method(&method).unwrap();
    }

    #[test]
    fn test_static_dispatch() {
        let mut method = MethodBuilder::new("Add")
            .static_member()
            .param("a", TypeRef::int32())
            .param("b", TypeRef::int32())
            .returns(TypeRef::int32())
            .code(vec![
                Instruction::ldarg(0),
                Instruction::ldarg(1),
                Instruction::simple(Opcode::Add),
                Instruction::ret(),
            ])
            .build();
        weave_method(&mut method, &dog(), &Dispatch::Static, None).unwrap();
        let code = &method.body.instructions;

        assert_eq!(code[0], Instruction::ldstr("Add(System.Int32,System.Int32)"));
        assert_eq!(code[2], Instruction::ldtoken(dog()));
        assert!(code.contains(&Instruction::call(contract::get_method_delegate())));
        assert!(code.contains(&Instruction::unbox_any(TypeRef::int32())));
        verify_method(&method).unwrap();
    }

    #[test]
    fn test_void_method_pops_result() {
        let mut method = MethodBuilder::new("Sleep")
            .code(vec![Instruction::nop(), Instruction::ret()])
            .build();
        weave_method(&mut method, &dog(), &instance_dispatch(), None).unwrap();
        let code = &method.body.instructions;
        let invoke = code
            .iter()
            .position(|i| *i == Instruction::callvirt(contract::dynamic_invoke()))
            .unwrap();
        assert_eq!(code[invoke + 1], Instruction::pop());
        assert_eq!(code[invoke + 2], Instruction::br(code.len() as u32 - 1));
        verify_method(&method).unwrap();
    }

    #[test]
    fn test_inner_branches_relinked() {
        let mut method = MethodBuilder::new("Pick")
            .param("flag", TypeRef::boolean())
            .returns(TypeRef::string())
            .code(vec![
                Instruction::ldarg(1),
                Instruction::brfalse(4),
                Instruction::ldstr("yes"),
                Instruction::ret(),
                Instruction::ldstr("no"),
                Instruction::ret(),
            ])
            .build();
        let positions = weave_method(&mut method, &dog(), &instance_dispatch(), None).unwrap();
        let branch = &method.body.instructions[positions[1] as usize];
        assert_eq!(*branch, Instruction::brfalse(positions[4]));
        verify_method(&method).unwrap();
    }

    #[test]
    fn test_constructor_prefix_and_capture() {
        let base_ctor = MethodRef::constructor(TypeRef::object(), vec![]);
        let field = FieldRef::new(dog(), contract::CTOR_PARAMETERS_FIELD, contract::array_list());
        let mut ctor = MethodBuilder::constructor()
            .param("name", TypeRef::string())
            .param("age", TypeRef::int32())
            .code(vec![
                Instruction::ldarg(0),
                Instruction::call(base_ctor.clone()),
                Instruction::ret(),
            ])
            .build();

        let positions = weave_method(&mut ctor, &dog(), &instance_dispatch(), Some(&field)).unwrap();
        let code = &ctor.body.instructions;
        assert_eq!(positions[0], 0);
        assert_eq!(positions[1], 1);
        assert_eq!(code[1], Instruction::call(base_ctor));
        assert_eq!(code[2], Instruction::ldarg(0));
        assert_eq!(code[3], Instruction::newobj(contract::array_list_ctor()));
        assert_eq!(code[4], Instruction::stfld(field.clone()));

        let adds = code
            .iter()
            .filter(|i| **i == Instruction::callvirt(contract::array_list_add()))
            .count();
        assert_eq!(adds, 2);
        assert!(code.contains(&Instruction::box_value(TypeRef::int32())));
        // Base constructor calls from subclasses dispatch too
        assert!(!code.contains(&Instruction::call(contract::get_method_declaring_type())));
        verify_method(&ctor).unwrap();
    }

    #[test]
    fn test_structural_violations() {
        let mut empty = MethodBuilder::new("Empty").build();
        assert!(matches!(
            weave_method(&mut empty, &dog(), &Dispatch::Static, None),
            Err(WeaveError::InvalidBody { reason: "empty body", .. })
        ));

        let mut no_ret = MethodBuilder::new("Spin")
            .code(vec![Instruction::br(0)])
            .build();
        assert!(matches!(
            weave_method(&mut no_ret, &dog(), &Dispatch::Static, None),
            Err(WeaveError::InvalidBody { .. })
        ));
    }

    #[test]
    fn test_override_and_shim_bodies() {
        let base = speak();
        let base_ref = base.reference(TypeRef::class("Zoo.Animal"));

        let synthesized = override_method(&base, base_ref.clone()).unwrap();
        assert!(synthesized.is_virtual());
        assert!(!synthesized.is_new_slot());
        assert_eq!(synthesized.body.locals, vec![TypeRef::string()]);
        verify_method(&synthesized).unwrap();

        let shim = base_call_shim(&base, base_ref.clone()).unwrap();
        assert_eq!(shim.name, "HotReloadingBase_Speak");
        assert_eq!(shim.access(), method_flags::PRIVATE);
        assert!(!shim.is_virtual());
        assert_eq!(
            shim.body.instructions,
            vec![Instruction::ldarg(0), Instruction::call(base_ref), Instruction::ret()]
        );
        verify_method(&shim).unwrap();
    }

    // ===== Slot limits =====

    #[test]
    fn test_local_slots_exhausted() {
        let mut method = speak();
        method.body.locals = vec![TypeRef::int32(); usize::from(u16::MAX) - 1];
        assert!(matches!(
            weave_method(&mut method, &dog(), &instance_dispatch(), None),
            Err(WeaveError::InvalidBody { reason: "too many locals", .. })
        ));
    }

    #[test]
    fn test_parameter_slots_exhausted() {
        let mut method = MethodBuilder::new("Wide")
            .code(vec![Instruction::nop(), Instruction::ret()])
            .build();
        method.params = (0..=usize::from(u16::MAX))
            .map(|i| ParamDef::new(format!("p{}", i), TypeRef::int32()))
            .collect();
        let base_ref = method.reference(TypeRef::class("Zoo.Animal"));

        assert!(matches!(
            override_method(&method, base_ref.clone()),
            Err(WeaveError::InvalidBody { reason: "too many parameters", .. })
        ));
        assert!(matches!(
            base_call_shim(&method, base_ref),
            Err(WeaveError::InvalidBody { reason: "too many parameters", .. })
        ));
        assert!(matches!(
            weave_method(&mut method, &dog(), &instance_dispatch(), None),
            Err(WeaveError::InvalidBody { reason: "too many parameters", .. })
        ));
    }
}
