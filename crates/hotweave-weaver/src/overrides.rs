//! Override synthesis
//!
//! A concrete type gets an explicit override for every inherited virtual
//! method it does not redeclare, so that replacements can be registered for
//! inherited behavior too. Each override calls the base implementation and
//! is then woven like any other method.

use crate::config::WeavePolicy;
use crate::error::WeaveResult;
use crate::resolver::ModuleResolver;
use hotweave_bytecode::module::method_flags;
use hotweave_bytecode::{MethodDef, MethodRef, Module, TypeDef};

/// An inherited method that may be overridden
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideRecord {
    /// Copy of the inherited definition with the new-slot flag cleared
    pub method: MethodDef,
    /// Base implementation, referenced through the immediate base type
    pub base: MethodRef,
}

/// Inherited overridable methods of `ty`, nearest declaration first
///
/// Walks the base chain: each base contributes its own overridable virtual
/// methods, then the set it inherits minus methods it seals or redeclares.
pub fn overridable_methods(
    module: &Module,
    ty: &TypeDef,
    resolver: &ModuleResolver,
    policy: &WeavePolicy,
) -> WeaveResult<Vec<OverrideRecord>> {
    let Some(base) = resolver.base_of(module, ty)? else {
        return Ok(Vec::new());
    };
    let base = base.def(module);
    let base_ref = base.as_type_ref();

    let mut records: Vec<OverrideRecord> = Vec::new();
    let mut sealed: Vec<&MethodDef> = Vec::new();
    // A delegate-named base contributes no methods of its own
    let own_methods: &[MethodDef] = if policy.has_delegate_name(base) {
        &[]
    } else {
        &base.methods
    };
    let protocol = if own_methods.is_empty() {
        Vec::new()
    } else {
        protocol_methods(module, base, resolver, policy)?
    };
    for method in own_methods {
        if !is_overridable(method, policy) {
            continue;
        }
        if method.is_final() {
            sealed.push(method);
            continue;
        }
        if policy.is_exported(method) || protocol.iter().any(|p| p.same_params(method)) {
            continue;
        }
        let mut copy = method.clone();
        copy.attributes &= !method_flags::NEW_SLOT;
        records.push(OverrideRecord {
            method: copy,
            base: method.reference(base_ref.clone()),
        });
    }

    for inherited in overridable_methods(module, base, resolver, policy)? {
        let duplicate = records
            .iter()
            .any(|r| r.method.signature_eq(&inherited.method));
        let finalized = sealed.iter().any(|s| s.signature_eq(&inherited.method));
        if duplicate || finalized {
            continue;
        }
        records.push(OverrideRecord {
            base: MethodRef {
                declaring_type: base_ref.clone(),
                ..inherited.base
            },
            method: inherited.method,
        });
    }
    Ok(records)
}

/// Virtual, not special-name, not a finalizer, visible to derived types
fn is_overridable(method: &MethodDef, policy: &WeavePolicy) -> bool {
    let visible = matches!(
        method.access(),
        method_flags::PUBLIC | method_flags::FAMILY | method_flags::FAM_OR_ASSEM
    );
    method.is_virtual()
        && !method.is_special_name()
        && !policy.is_excluded_override(&method.name)
        && visible
}

/// Methods of `base`'s protocol interfaces (delegate-style callbacks)
fn protocol_methods(
    module: &Module,
    base: &TypeDef,
    resolver: &ModuleResolver,
    policy: &WeavePolicy,
) -> WeaveResult<Vec<MethodDef>> {
    let mut methods = Vec::new();
    for interface in &base.interfaces {
        if !policy.is_protocol_interface(interface.simple_name()) {
            continue;
        }
        let handle = resolver.resolve(module, &interface.full_name)?;
        methods.extend(handle.def(module).methods.iter().cloned());
    }
    Ok(methods)
}

/// Nearest inherited implementation with the same name and parameters
///
/// The reference goes through the immediate base type, matching how a
/// non-virtual `base.Method()` call is emitted.
pub fn find_base_method(
    module: &Module,
    ty: &TypeDef,
    method: &MethodDef,
    resolver: &ModuleResolver,
) -> WeaveResult<Option<MethodRef>> {
    let Some(immediate) = ty.base.clone() else {
        return Ok(None);
    };
    for ancestor in resolver.ancestors(module, ty)? {
        let def = ancestor.def(module);
        if let Some(found) = def.methods.iter().find(|m| m.same_params(method)) {
            if found.is_abstract() || found.is_static() {
                return Ok(None);
            }
            return Ok(Some(found.reference(immediate)));
        }
    }
    Ok(None)
}
