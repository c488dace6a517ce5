//! Capability interface injection
//!
//! Every concrete woven class carries a lazily created map from method key
//! to replacement delegate, exposed through `IInstanceClass.InstanceMethods`.
//! Woven instance methods query it through the protected `GetInstanceMethod`
//! helper.

use crate::composer::{InstructionComposer, Label};
use crate::error::WeaveResult;
use crate::resolver::ModuleResolver;
use hotweave_bytecode::module::field_flags;
use hotweave_bytecode::{
    contract, FieldDef, FieldRef, MethodBuilder, MethodDef, MethodRef, Module, PropertyDef,
    TypeDef, TypeId, TypeRef,
};
use tracing::debug;

/// How woven instance methods of a type reach their replacement map
#[derive(Debug, Clone, PartialEq)]
pub enum Capability {
    /// Call this helper with the method key
    Instance {
        /// `GetInstanceMethod(string)` on the type or an ancestor
        accessor: MethodRef,
    },
    /// Abstract type without an implementing ancestor
    Unavailable,
}

/// Make sure `id` can look up per-instance replacements
pub fn ensure_capability(
    module: &mut Module,
    id: TypeId,
    resolver: &ModuleResolver,
) -> WeaveResult<Capability> {
    let ty = module.type_def(id);
    let is_abstract = ty.is_abstract();

    if resolver.implements(module, ty, contract::INSTANCE_CLASS_INTERFACE)? {
        if let Some(accessor) = find_helper(module, id, resolver)? {
            return Ok(Capability::Instance { accessor });
        }
        let ty = module.type_def_mut(id);
        ty.methods.push(helper_method()?);
        return Ok(Capability::Instance {
            accessor: helper_ref(ty.as_type_ref()),
        });
    }

    if is_abstract {
        return Ok(Capability::Unavailable);
    }

    let ty = module.type_def_mut(id);
    debug!("Injecting {} into {}", contract::INSTANCE_CLASS_INTERFACE, ty.name);
    inject(ty)?;
    Ok(Capability::Instance {
        accessor: helper_ref(ty.as_type_ref()),
    })
}

/// `GetInstanceMethod` declared on `id` or the nearest ancestor
fn find_helper(
    module: &Module,
    id: TypeId,
    resolver: &ModuleResolver,
) -> WeaveResult<Option<MethodRef>> {
    let params = [TypeRef::string()];
    let ty = module.type_def(id);
    if ty.find_method(contract::GET_INSTANCE_METHOD, &params).is_some() {
        return Ok(Some(helper_ref(ty.as_type_ref())));
    }
    for ancestor in resolver.ancestors(module, ty)? {
        let def = ancestor.def(module);
        if def.find_method(contract::GET_INSTANCE_METHOD, &params).is_some() {
            return Ok(Some(helper_ref(def.as_type_ref())));
        }
    }
    Ok(None)
}

fn helper_ref(owner: TypeRef) -> MethodRef {
    MethodRef::instance(
        owner,
        contract::GET_INSTANCE_METHOD,
        TypeRef::delegate(),
        vec![TypeRef::string()],
    )
}

/// Add field, lazy getter, property, interface and helper to `ty`
fn inject(ty: &mut TypeDef) -> WeaveResult<()> {
    let field = FieldDef {
        name: contract::INSTANCE_METHODS_FIELD.to_string(),
        field_type: contract::method_map(),
        attributes: field_flags::PRIVATE,
    };
    let field_ref = ty.field_ref(&field);
    ty.fields.push(field);

    ty.methods.push(getter_method(field_ref)?);
    ty.properties.push(PropertyDef {
        name: contract::INSTANCE_METHODS_PROPERTY.to_string(),
        property_type: contract::method_map(),
        getter: Some(contract::INSTANCE_METHODS_GETTER.to_string()),
        setter: None,
    });
    ty.interfaces.push(contract::instance_class());
    ty.methods.push(helper_method()?);
    Ok(())
}

/// `get_InstanceMethods`: create the map on first use, then return it
///
/// The check-then-store is not atomic; concurrent first calls may each ask
/// the runtime for a map and the last store wins.
fn getter_method(field: FieldRef) -> WeaveResult<MethodDef> {
    let ready = Label::new();
    let mut code = InstructionComposer::new();
    code.load_this()
        .load_field(field.clone())
        .branch_if_true(ready)
        .load_this()
        .load_this()
        .static_call(contract::get_initial_instance_methods())
        .store_field(field.clone());
    code.mark(ready)?.load_this().load_field(field).ret();

    Ok(MethodBuilder::new(contract::INSTANCE_METHODS_GETTER)
        .virtual_slot()
        .special_name()
        .returns(contract::method_map())
        .code(code.finish()?.instructions)
        .build())
}

/// `GetInstanceMethod(key)`: the map entry for `key`, or null
fn helper_method() -> WeaveResult<MethodDef> {
    let not_found = Label::new();
    let mut code = InstructionComposer::new();
    code.load_this()
        .instance_call(contract::interface_getter())
        .store_local(0)
        .load_local(0)
        .load_arg(1)
        .instance_call(contract::map_contains_key())
        .branch_if_false(not_found)
        .load_local(0)
        .load_arg(1)
        .instance_call(contract::map_get_item())
        .ret();
    code.mark(not_found)?.load_null().ret();

    Ok(MethodBuilder::new(contract::GET_INSTANCE_METHOD)
        .family()
        .param("key", TypeRef::string())
        .returns(TypeRef::delegate())
        .local(contract::method_map())
        .code(code.finish()?.instructions)
        .build())
}
